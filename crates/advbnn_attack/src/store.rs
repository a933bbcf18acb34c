//! Cached attacks under `{savedir}/attacks/`.

use std::path::{Path, PathBuf};

use advbnn_data::{load_array4, save_array};
use ndarray::Array4;
use tracing::info;

use crate::error::Result;
use crate::method::AttackMethod;

/// Subdirectory of a model directory holding attacks.
pub const ATTACK_DIR: &str = "attacks";

/// `"{filename}_{method}[_attackSamp={n}]_attack"`.
#[must_use]
pub fn attack_name(filename: &str, method: AttackMethod, n_samples: Option<usize>) -> String {
    match n_samples {
        Some(n) => format!("{filename}_{method}_attackSamp={n}_attack"),
        None => format!("{filename}_{method}_attack"),
    }
}

/// Directory attacks are stored in.
#[must_use]
pub fn attack_dir(savedir: &Path) -> PathBuf {
    savedir.join(ATTACK_DIR)
}

/// Save attacks as `.npy`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_attack(
    attacks: &Array4<f32>,
    savedir: &Path,
    filename: &str,
    method: AttackMethod,
    n_samples: Option<usize>,
) -> Result<PathBuf> {
    let dir = attack_dir(savedir);
    let name = attack_name(filename, method, n_samples);
    save_array(attacks, &dir, &name)?;
    info!(name = %name, "Saved attacks");
    Ok(dir.join(format!("{name}.npy")))
}

/// Load attacks saved with [`save_attack`].
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_attack(
    savedir: &Path,
    filename: &str,
    method: AttackMethod,
    n_samples: Option<usize>,
) -> Result<Array4<f32>> {
    let name = attack_name(filename, method, n_samples);
    Ok(load_array4(&attack_dir(savedir), &name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttackError;

    #[test]
    fn test_attack_names() {
        assert_eq!(attack_name("net", AttackMethod::Fgsm, None), "net_fgsm_attack");
        assert_eq!(
            attack_name("net", AttackMethod::Pgd, Some(10)),
            "net_pgd_attackSamp=10_attack"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let attacks = Array4::from_elem((3, 1, 4, 4), 0.5f32);
        let path = save_attack(&attacks, dir.path(), "net", AttackMethod::Fgsm, Some(2)).unwrap();
        assert!(path.ends_with("attacks/net_fgsm_attackSamp=2_attack.npy"));

        let loaded = load_attack(dir.path(), "net", AttackMethod::Fgsm, Some(2)).unwrap();
        assert_eq!(loaded, attacks);
        assert!(matches!(
            load_attack(dir.path(), "net", AttackMethod::Pgd, None),
            Err(AttackError::DataError(_))
        ));
    }
}
