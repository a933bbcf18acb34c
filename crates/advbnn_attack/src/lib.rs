//! # advbnn_attack
//!
//! Gradient-sign adversarial attacks against deterministic and Bayesian
//! networks.
//!
//! - [`fgsm`] and [`pgd`] on batches of tensors, [`attack`] on whole arrays
//! - For Bayesian networks the gradient sign is averaged over posterior
//!   draws ([`loss_gradient_sign`])
//! - [`save_attack`] / [`load_attack`] cache attacks as `.npy`
//! - [`evaluation`] measures accuracy and softmax robustness under attack

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod attacks;
mod error;
pub mod evaluation;
mod gradient;
mod method;
mod store;

pub use attacks::{attack, fgsm, pgd};
pub use error::{AttackError, Result};
pub use evaluation::{evaluate_attack, softmax_robustness, AttackEvaluation};
pub use gradient::{attack_draws, loss_gradient_sign};
pub use method::{AttackConfig, AttackMethod, StepSize, DEFAULT_PGD_STEP};
pub use store::{attack_dir, attack_name, load_attack, save_attack, ATTACK_DIR};
