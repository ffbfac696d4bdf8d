#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Trajectory Evaluation
//!
//! Tools to compare an estimated trajectory against a ground truth:
//!
//! - [`io`]: TUM trajectory files, optionally with one covariance per pose.
//! - [`association`]: match two trajectories by timestamp.
//! - [`alignment`]: first-pose, Horn (closed-form) and manifold (iterative) alignment.
//! - [`metrics`]: ATE, RPE, DDT and error statistics.
//! - [`evaluation`]: the full pipeline producing an [`evaluation::EvaluationReport`].
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use kornia_lie::se3::SE3;
//! use kornia_traj::{evaluation::{evaluate, EvaluationConfig}, Trajectory};
//!
//! let stamps = (0..10).map(|i| i as f64).collect::<Vec<_>>();
//! let poses = (0..10)
//!     .map(|i| SE3::from_translation(DVec3::new(i as f64, 0.0, 0.0)))
//!     .collect::<Vec<_>>();
//! let gt = Trajectory::new(stamps.clone(), poses.clone()).unwrap();
//! let est = Trajectory::new(stamps, poses).unwrap();
//!
//! let evaluation = evaluate(&gt, &est, &EvaluationConfig::default()).unwrap();
//! assert!(evaluation.report.ate.rmse < 1e-9);
//! ```

/// Alignment of an estimated trajectory onto a ground truth.
pub mod alignment;

/// Timestamp association of two trajectories.
pub mod association;

/// End-to-end evaluation pipeline and report.
pub mod evaluation;

/// Reading and writing trajectory files.
pub mod io;

/// Trajectory error metrics.
pub mod metrics;

mod trajectory;

pub use trajectory::{extract_angles, Covariance, Trajectory, TrajectoryError};
