//! Alignment of an estimated trajectory onto its ground truth.
//!
//! All strategies consume two associated (index aligned) trajectories and return a
//! single transform, see [`align`].

mod first_pose;
mod horn;
mod manifold;

use std::str::FromStr;

use kornia_lie::se3::SE3;

use crate::trajectory::Trajectory;

pub use first_pose::align_first_pose;
pub use horn::{align_horn, estimate_scale, umeyama, HornConfig, Similarity};
pub use manifold::{align_manifold, ManifoldConfig};

/// Error types for the alignment.
#[derive(Debug, thiserror::Error)]
pub enum AlignmentError {
    /// The trajectories are not associated.
    #[error("Cannot align trajectories of different lengths ({gt} and {est})")]
    LengthMismatch {
        /// Length of the ground truth.
        gt: usize,
        /// Length of the estimate.
        est: usize,
    },

    /// There are not enough poses to align.
    #[error("Need at least {required} poses to align, got {got}")]
    InsufficientData {
        /// Number of poses.
        got: usize,
        /// Minimum number of poses.
        required: usize,
    },

    /// Unknown alignment method name.
    #[error("Unknown alignment method '{0}', expected one of first, horn, manifold")]
    UnknownMethod(String),
}

/// The alignment strategy.
#[derive(Debug, Clone)]
pub enum AlignmentMethod {
    /// Anchor the estimate on the first ground truth pose.
    FirstPose,
    /// Closed-form least squares alignment of the positions.
    Horn(HornConfig),
    /// Iterative alignment of the full poses on SE(3).
    Manifold(ManifoldConfig),
}

impl Default for AlignmentMethod {
    fn default() -> Self {
        Self::Horn(HornConfig::default())
    }
}

impl FromStr for AlignmentMethod {
    type Err = AlignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::FirstPose),
            "horn" => Ok(Self::Horn(HornConfig::default())),
            "manifold" => Ok(Self::Manifold(ManifoldConfig::default())),
            _ => Err(AlignmentError::UnknownMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstPose => write!(f, "first"),
            Self::Horn(_) => write!(f, "horn"),
            Self::Manifold(_) => write!(f, "manifold"),
        }
    }
}

/// A rigid transform with a global scale, mapping the estimate into the ground truth frame.
///
/// A pose `P` of the estimate is mapped to `transform * P'`, where `P'` is `P` with its
/// translation multiplied by `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentTransform {
    /// The rigid part.
    pub transform: SE3,
    /// The scale applied to the estimate before the rigid part.
    pub scale: f64,
}

impl Default for AlignmentTransform {
    fn default() -> Self {
        Self {
            transform: SE3::IDENTITY,
            scale: 1.0,
        }
    }
}

impl AlignmentTransform {
    /// Create a transform without scale.
    pub fn rigid(transform: SE3) -> Self {
        Self {
            transform,
            scale: 1.0,
        }
    }

    /// Map a trajectory expressed in the estimate frame into the ground truth frame.
    ///
    /// The translational covariance block follows the scale.
    pub fn apply(&self, traj: &Trajectory) -> Trajectory {
        if self.scale == 1.0 {
            traj.transform(&self.transform)
        } else {
            traj.scale(self.scale, true).transform(&self.transform)
        }
    }
}

/// Outcome of an iterative alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    /// Whether a stopping criterion was met before the iteration cap.
    pub converged: bool,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Cost at the initial guess.
    pub initial_cost: f64,
    /// Cost at the returned transform.
    pub final_cost: f64,
    /// Residuals weighted by the identity at the returned transform, because their
    /// covariance is not positive definite.
    pub singular_weights: usize,
}

/// The aligned trajectories and the transform used.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// The ground truth. Moved into the estimate frame by the manifold aligner with
    /// `align_gt` set, and anchored at its first pose by the first-pose aligner.
    pub gt: Trajectory,
    /// The estimate mapped into the frame of `gt`, or unchanged when the ground truth
    /// was moved instead.
    pub est: Trajectory,
    /// The transform mapping the estimate into the frame of `gt`.
    pub transform: AlignmentTransform,
    /// Solver statistics, only set by iterative methods.
    pub convergence: Option<Convergence>,
}

pub(crate) fn check_inputs(
    gt: &Trajectory,
    est: &Trajectory,
    required: usize,
) -> Result<(), AlignmentError> {
    if gt.len() != est.len() {
        return Err(AlignmentError::LengthMismatch {
            gt: gt.len(),
            est: est.len(),
        });
    }
    if gt.len() < required {
        return Err(AlignmentError::InsufficientData {
            got: gt.len(),
            required,
        });
    }
    Ok(())
}

/// Align `est` onto `gt` with the given method.
///
/// # Arguments
///
/// * `gt` - The associated ground truth.
/// * `est` - The associated estimate, `est[i]` matches `gt[i]`.
/// * `method` - The alignment strategy.
pub fn align(
    gt: &Trajectory,
    est: &Trajectory,
    method: &AlignmentMethod,
) -> Result<AlignmentResult, AlignmentError> {
    log::debug!("aligning {} poses with the {method} method", gt.len());
    match method {
        AlignmentMethod::FirstPose => align_first_pose(gt, est),
        AlignmentMethod::Horn(config) => align_horn(gt, est, config),
        AlignmentMethod::Manifold(config) => align_manifold(gt, est, config),
    }
}
