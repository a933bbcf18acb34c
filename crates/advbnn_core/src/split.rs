//! Data split types for train/validation/test.

use serde::{Deserialize, Serialize};

/// One of the three dataset splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Split {
    /// Training split.
    #[default]
    Train,
    /// Validation split, carved from the training data.
    Val,
    /// Test split, attacked and explained.
    Test,
}

impl Split {
    /// All splits in loading order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Lowercase name used in logs and file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
