use glam::DVec3;
use kornia_lie::{se3::SE3, Matrix6};

/// Covariance of a pose in its local tangent space, ordered `[translation; rotation]`.
pub type Covariance = Matrix6;

/// Error types for the trajectory container.
#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    /// The number of timestamps and poses differ.
    #[error("Got {stamps} timestamps for {poses} poses")]
    LengthMismatch {
        /// Number of timestamps.
        stamps: usize,
        /// Number of poses.
        poses: usize,
    },

    /// The number of covariances and poses differ.
    #[error("Got {covariances} covariances for {poses} poses")]
    CovarianceLengthMismatch {
        /// Number of covariances.
        covariances: usize,
        /// Number of poses.
        poses: usize,
    },

    /// The same timestamp appears twice.
    #[error("Duplicate timestamp {0}")]
    DuplicateTimestamp(f64),

    /// A timestamp is NaN or infinite.
    #[error("Non-finite timestamp at index {0}")]
    NonFiniteTimestamp(usize),
}

/// A sequence of timestamped poses, optionally with one covariance per pose.
///
/// Trajectories are immutable: scaling and transforming return new instances.
///
/// Trajectories built with [`Trajectory::new`] are sorted by timestamp. Trajectories
/// produced by the associator keep the matching order instead, so that the i-th pose of the
/// ground truth corresponds to the i-th pose of the estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    stamps: Vec<f64>,
    poses: Vec<SE3>,
    covariances: Option<Vec<Covariance>>,
}

impl Trajectory {
    /// Create a trajectory from timestamps and poses.
    ///
    /// The entries are sorted by timestamp. Duplicate or non-finite timestamps are rejected.
    pub fn new(stamps: Vec<f64>, poses: Vec<SE3>) -> Result<Self, TrajectoryError> {
        Self::build(stamps, poses, None)
    }

    /// Create a trajectory carrying one covariance per pose.
    pub fn with_covariances(
        stamps: Vec<f64>,
        poses: Vec<SE3>,
        covariances: Vec<Covariance>,
    ) -> Result<Self, TrajectoryError> {
        Self::build(stamps, poses, Some(covariances))
    }

    fn build(
        stamps: Vec<f64>,
        poses: Vec<SE3>,
        covariances: Option<Vec<Covariance>>,
    ) -> Result<Self, TrajectoryError> {
        if stamps.len() != poses.len() {
            return Err(TrajectoryError::LengthMismatch {
                stamps: stamps.len(),
                poses: poses.len(),
            });
        }
        if let Some(covs) = &covariances {
            if covs.len() != poses.len() {
                return Err(TrajectoryError::CovarianceLengthMismatch {
                    covariances: covs.len(),
                    poses: poses.len(),
                });
            }
        }
        if let Some(idx) = stamps.iter().position(|t| !t.is_finite()) {
            return Err(TrajectoryError::NonFiniteTimestamp(idx));
        }

        let mut order = (0..stamps.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| stamps[a].total_cmp(&stamps[b]));

        if let Some(w) = order.windows(2).find(|w| stamps[w[0]] == stamps[w[1]]) {
            return Err(TrajectoryError::DuplicateTimestamp(stamps[w[0]]));
        }

        Ok(Self {
            stamps: order.iter().map(|&i| stamps[i]).collect(),
            poses: order.iter().map(|&i| poses[i]).collect(),
            covariances: covariances.map(|covs| order.iter().map(|&i| covs[i]).collect()),
        })
    }

    /// Number of poses.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Whether the trajectory has no poses.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Timestamps in storage order.
    pub fn timestamps(&self) -> &[f64] {
        &self.stamps
    }

    /// Timestamps sorted in increasing order.
    pub fn sorted_timestamps(&self) -> Vec<f64> {
        let mut stamps = self.stamps.clone();
        stamps.sort_by(f64::total_cmp);
        stamps
    }

    /// Poses in storage order.
    pub fn poses(&self) -> &[SE3] {
        &self.poses
    }

    /// Covariances in storage order, if the trajectory carries them.
    pub fn covariances(&self) -> Option<&[Covariance]> {
        self.covariances.as_deref()
    }

    /// Whether the trajectory carries covariances.
    pub fn has_covariances(&self) -> bool {
        self.covariances.is_some()
    }

    /// Iterate over `(timestamp, pose)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &SE3)> + '_ {
        self.stamps.iter().copied().zip(self.poses.iter())
    }

    /// First entry in storage order.
    pub fn first(&self) -> Option<(f64, &SE3)> {
        self.iter().next()
    }

    /// Pose stored at exactly `stamp`.
    pub fn get(&self, stamp: f64) -> Option<&SE3> {
        self.stamps
            .iter()
            .position(|&t| t == stamp)
            .map(|idx| &self.poses[idx])
    }

    /// Positions in storage order.
    pub fn positions(&self) -> Vec<DVec3> {
        self.poses.iter().map(|p| p.translation).collect()
    }

    /// Roll-pitch-yaw angles in storage order, see [`extract_angles`].
    pub fn orientations(&self) -> Vec<[f64; 3]> {
        self.poses.iter().map(extract_angles).collect()
    }

    /// Length of the polyline through the positions, in storage order.
    pub fn path_length(&self) -> f64 {
        self.poses
            .windows(2)
            .map(|w| w[1].translation.distance(w[0].translation))
            .sum()
    }

    /// Scale the translational part of every pose by `factor`.
    ///
    /// Rotations are untouched. When `scale_covariance` is set, the translational block of
    /// every covariance is scaled accordingly, i.e. `S' = D S D` with `D = diag(f, f, f, 1, 1, 1)`.
    pub fn scale(&self, factor: f64, scale_covariance: bool) -> Trajectory {
        let poses = self
            .poses
            .iter()
            .map(|p| SE3::new(p.rotation, p.translation * factor))
            .collect();

        let covariances = self.covariances.as_ref().map(|covs| {
            if !scale_covariance {
                return covs.clone();
            }
            let d = Covariance::from_diagonal(&kornia_lie::Vector6::new(
                factor, factor, factor, 1.0, 1.0, 1.0,
            ));
            covs.iter().map(|c| d * c * d).collect()
        });

        Trajectory {
            stamps: self.stamps.clone(),
            poses,
            covariances,
        }
    }

    /// Left-multiply every pose by `transform`.
    ///
    /// Covariances live in the local frame of each pose and are carried over unchanged.
    pub fn transform(&self, transform: &SE3) -> Trajectory {
        Trajectory {
            stamps: self.stamps.clone(),
            poses: self.poses.iter().map(|p| *transform * *p).collect(),
            covariances: self.covariances.clone(),
        }
    }

    /// Keep only the entries at the given indices, in the given order.
    pub(crate) fn select(&self, indices: &[usize]) -> Trajectory {
        Trajectory {
            stamps: indices.iter().map(|&i| self.stamps[i]).collect(),
            poses: indices.iter().map(|&i| self.poses[i]).collect(),
            covariances: self
                .covariances
                .as_ref()
                .map(|covs| indices.iter().map(|&i| covs[i]).collect()),
        }
    }
}

/// Roll, pitch and yaw of a pose's rotation, for the `R = Rz(yaw) Ry(pitch) Rx(roll)`
/// convention.
pub fn extract_angles(pose: &SE3) -> [f64; 3] {
    pose.rotation.to_rpy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kornia_lie::{so3::SO3, Vector6};

    fn line(n: usize) -> Vec<SE3> {
        (0..n)
            .map(|i| SE3::from_translation(DVec3::new(i as f64, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn test_new_sorts_by_timestamp() -> Result<(), TrajectoryError> {
        let traj = Trajectory::new(vec![2.0, 0.0, 1.0], line(3))?;
        assert_eq!(traj.timestamps(), &[0.0, 1.0, 2.0]);
        assert_eq!(traj.poses()[0].translation.x, 1.0);
        assert_eq!(traj.poses()[2].translation.x, 0.0);
        Ok(())
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let res = Trajectory::new(vec![0.0, 1.0, 1.0], line(3));
        assert!(matches!(res, Err(TrajectoryError::DuplicateTimestamp(t)) if t == 1.0));
    }

    #[test]
    fn test_new_rejects_mismatch_and_nan() {
        assert!(matches!(
            Trajectory::new(vec![0.0, 1.0], line(3)),
            Err(TrajectoryError::LengthMismatch { .. })
        ));
        assert!(matches!(
            Trajectory::new(vec![0.0, f64::NAN], line(2)),
            Err(TrajectoryError::NonFiniteTimestamp(1))
        ));
        assert!(matches!(
            Trajectory::with_covariances(vec![0.0, 1.0], line(2), vec![Covariance::identity()]),
            Err(TrajectoryError::CovarianceLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_scale_only_translation() -> Result<(), TrajectoryError> {
        let rot = SO3::from_axis_angle(DVec3::Z, 0.4);
        let poses = vec![
            SE3::new(rot, DVec3::new(1.0, 2.0, 3.0)),
            SE3::new(rot, DVec3::new(-1.0, 0.5, 0.0)),
        ];
        let traj = Trajectory::new(vec![0.0, 1.0], poses)?;
        let scaled = traj.scale(2.0, false);

        assert_eq!(scaled.poses()[0].translation, DVec3::new(2.0, 4.0, 6.0));
        assert_eq!(scaled.poses()[1].rotation, rot);
        // the original is untouched
        assert_eq!(traj.poses()[0].translation, DVec3::new(1.0, 2.0, 3.0));
        Ok(())
    }

    #[test]
    fn test_scale_covariance_blocks() -> Result<(), TrajectoryError> {
        let cov = Covariance::from_element(1.0);
        let traj = Trajectory::with_covariances(vec![0.0], line(1), vec![cov])?;

        let unscaled = traj.scale(3.0, false);
        assert_eq!(unscaled.covariances().map(|c| c[0]), Some(cov));

        let scaled = traj.scale(3.0, true);
        let c = scaled.covariances().map(|c| c[0]).unwrap_or_default();
        assert_relative_eq!(c[(0, 0)], 9.0);
        assert_relative_eq!(c[(0, 4)], 3.0);
        assert_relative_eq!(c[(4, 1)], 3.0);
        assert_relative_eq!(c[(5, 5)], 1.0);
        Ok(())
    }

    #[test]
    fn test_transform_left_multiplies() -> Result<(), TrajectoryError> {
        let traj = Trajectory::new(vec![0.0, 1.0], line(2))?;
        let t = SE3::new(
            SO3::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2),
            DVec3::new(0.0, 0.0, 1.0),
        );
        let moved = traj.transform(&t);
        let p = moved.poses()[1].translation;
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_accessors() -> Result<(), TrajectoryError> {
        let traj = Trajectory::new(vec![0.5, 0.0, 1.0], line(3))?;
        assert_eq!(traj.len(), 3);
        assert!(!traj.is_empty());
        assert_eq!(traj.sorted_timestamps(), vec![0.0, 0.5, 1.0]);
        assert_eq!(traj.get(0.5).map(|p| p.translation.x), Some(0.0));
        assert!(traj.get(0.25).is_none());
        assert_relative_eq!(traj.path_length(), 3.0);
        assert_eq!(traj.positions().len(), 3);
        assert_eq!(traj.orientations()[0], [0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_extract_angles_yaw() {
        let pose = SE3::new(SO3::exp(DVec3::new(0.0, 0.0, 0.7)), DVec3::ZERO);
        let rpy = extract_angles(&pose);
        assert_relative_eq!(rpy[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rpy[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rpy[2], 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_select_keeps_order() -> Result<(), TrajectoryError> {
        let covs = vec![
            Covariance::from_diagonal(&Vector6::repeat(1.0)),
            Covariance::from_diagonal(&Vector6::repeat(2.0)),
            Covariance::from_diagonal(&Vector6::repeat(3.0)),
        ];
        let traj = Trajectory::with_covariances(vec![0.0, 1.0, 2.0], line(3), covs)?;
        let sel = traj.select(&[2, 0]);
        assert_eq!(sel.timestamps(), &[2.0, 0.0]);
        assert_eq!(sel.covariances().map(|c| c[0][(0, 0)]), Some(3.0));
        Ok(())
    }
}
