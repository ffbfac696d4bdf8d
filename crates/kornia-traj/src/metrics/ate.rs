use std::str::FromStr;

use glam::DVec3;
use kornia_lie::Vector6;

use crate::trajectory::Trajectory;

use super::{check_lengths, MetricError};

/// A coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// The x axis.
    X,
    /// The y axis.
    Y,
    /// The z axis.
    Z,
}

impl Axis {
    /// All axes, in order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn mask(&self) -> DVec3 {
        match self {
            Axis::X => DVec3::X,
            Axis::Y => DVec3::Y,
            Axis::Z => DVec3::Z,
        }
    }
}

impl FromStr for Axis {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" | "X" => Ok(Axis::X),
            "y" | "Y" => Ok(Axis::Y),
            "z" | "Z" => Ok(Axis::Z),
            _ => Err(MetricError::UnknownAxis(s.to_string())),
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// Absolute trajectory error on the positions.
///
/// # Arguments
///
/// * `gt` - The ground truth.
/// * `est` - The aligned estimate, `est[i]` matches `gt[i]`.
/// * `axis` - Only keep the error along this axis.
///
/// # Returns
///
/// The Euclidean position error of every pose.
pub fn ate(gt: &Trajectory, est: &Trajectory, axis: Option<Axis>) -> Result<Vec<f64>, MetricError> {
    check_lengths(gt, est)?;

    let errors = gt
        .poses()
        .iter()
        .zip(est.poses())
        .map(|(g, e)| {
            let diff = e.translation - g.translation;
            match axis {
                Some(axis) => (diff * axis.mask()).length(),
                None => diff.length(),
            }
        })
        .collect();

    Ok(errors)
}

/// Absolute trajectory error on SE(3), `log(gt_i^-1 * est_i)` for every pose.
///
/// Components 0 to 2 are the translational error, 3 to 5 the rotational error.
pub fn ate_manifold(gt: &Trajectory, est: &Trajectory) -> Result<Vec<Vector6>, MetricError> {
    check_lengths(gt, est)?;

    Ok(gt
        .poses()
        .iter()
        .zip(est.poses())
        .map(|(g, e)| (g.inverse() * *e).log())
        .collect())
}
