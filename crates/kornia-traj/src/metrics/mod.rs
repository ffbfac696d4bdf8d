//! Trajectory error metrics.
//!
//! All metrics take associated, aligned trajectories: `gt[i]` is compared with `est[i]`.

mod ate;
mod rpe;
mod statistics;

use kornia_lie::{convert, Vector6};

use crate::trajectory::Trajectory;

pub use ate::{ate, ate_manifold, Axis};
pub use rpe::{ddt, rpe, select_pairs, DeltaUnit, RelativePoseError, RpeConfig};
pub use statistics::ErrorStatistics;

/// Error types for the metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// The trajectories are not associated.
    #[error("Cannot compare trajectories of different lengths ({gt} and {est})")]
    LengthMismatch {
        /// Length of the ground truth.
        gt: usize,
        /// Length of the estimate.
        est: usize,
    },

    /// The RPE delta must be positive and finite.
    #[error("Invalid delta {0}, must be positive")]
    InvalidDelta(f64),

    /// Unknown delta unit.
    #[error("Unknown delta unit '{0}', expected one of s, m, rad, f")]
    UnknownDeltaUnit(String),

    /// Unknown coordinate axis.
    #[error("Unknown axis '{0}', expected one of x, y, z")]
    UnknownAxis(String),
}

pub(crate) fn check_lengths(gt: &Trajectory, est: &Trajectory) -> Result<(), MetricError> {
    if gt.len() != est.len() {
        return Err(MetricError::LengthMismatch {
            gt: gt.len(),
            est: est.len(),
        });
    }
    Ok(())
}

/// Norms of the translational parts of tangent errors.
pub fn translational_norms(errors: &[Vector6]) -> Vec<f64> {
    errors
        .iter()
        .map(|e| convert::upsilon(e).length())
        .collect()
}

/// Norms of the rotational parts of tangent errors.
pub fn rotational_norms(errors: &[Vector6]) -> Vec<f64> {
    errors.iter().map(|e| convert::omega(e).length()).collect()
}
