use crate::trajectory::{Trajectory, TrajectoryError};

/// Minimum number of matched poses needed to align and evaluate two trajectories.
pub const MIN_MATCHES: usize = 2;

/// Error types for the association.
#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    /// Too few timestamps could be matched.
    #[error("Only {matches} timestamps matched, at least {required} are required")]
    InsufficientData {
        /// Number of matched pairs.
        matches: usize,
        /// Minimum number of pairs.
        required: usize,
    },

    /// Index based matching needs trajectories of the same length.
    #[error("Cannot match by index: ground truth has {gt} poses, estimate has {est}")]
    LengthMismatch {
        /// Length of the ground truth.
        gt: usize,
        /// Length of the estimate.
        est: usize,
    },

    /// Building the matched trajectories failed.
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

/// Configuration of the timestamp association.
#[derive(Debug, Clone)]
pub struct AssociationConfig {
    /// Time offset added to the ground truth timestamps before matching.
    pub offset: f64,
    /// Ground truth poses before this timestamp are ignored.
    pub offset_initial: f64,
    /// Maximum allowed time difference between matched timestamps.
    pub max_difference: f64,
    /// Replace `offset` by [`recommended_offset`].
    pub recommended_offset: bool,
    /// Match poses by index instead of timestamp. Both trajectories must have the same length.
    pub ignore_timestamps: bool,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            offset: 0.0,
            offset_initial: 0.0,
            max_difference: 0.02,
            recommended_offset: false,
            ignore_timestamps: false,
        }
    }
}

/// Offset aligning the start of both trajectories, `first(est) - first(gt)`.
///
/// Returns `None` if any of the trajectories is empty.
pub fn recommended_offset(gt: &Trajectory, est: &Trajectory) -> Option<f64> {
    let first_gt = gt.timestamps().iter().copied().reduce(f64::min)?;
    let first_est = est.timestamps().iter().copied().reduce(f64::min)?;
    Some(first_est - first_gt)
}

/// Tracks which entries of a sorted sequence are still free, answering "nearest free
/// index to the left/right of i" in amortized constant time.
struct FreeSlots {
    // right[i]: smallest free index >= i, len() if none
    right: Vec<usize>,
    // left[i]: 1 + largest free index < i, 0 if none
    left: Vec<usize>,
}

impl FreeSlots {
    fn new(len: usize) -> Self {
        Self {
            right: (0..=len).collect(),
            left: (0..=len).collect(),
        }
    }

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        while parent[i] != root {
            let next = parent[i];
            parent[i] = root;
            i = next;
        }
        root
    }

    /// Smallest free index `>= i`.
    fn next_free(&mut self, i: usize) -> Option<usize> {
        let idx = Self::find(&mut self.right, i);
        (idx < self.right.len() - 1).then_some(idx)
    }

    /// Largest free index `< i`.
    fn prev_free(&mut self, i: usize) -> Option<usize> {
        Self::find(&mut self.left, i).checked_sub(1)
    }

    fn take(&mut self, i: usize) {
        self.right[i] = i + 1;
        self.left[i + 1] = i;
    }
}

/// Greedy nearest-neighbour matching of timestamps.
///
/// Ground truth timestamps are processed in increasing order; each one is matched with
/// the closest estimate timestamp not matched yet, measured against `gt + offset`, if
/// the difference is within `max_difference`. Ground truth timestamps before
/// `offset_initial` are skipped. Equidistant candidates resolve to the earlier estimate.
///
/// # Returns
///
/// Pairs of `(gt index, est index)` into the input slices, ordered by ground truth time.
pub fn match_timestamps(
    gt_stamps: &[f64],
    est_stamps: &[f64],
    offset: f64,
    offset_initial: f64,
    max_difference: f64,
) -> Vec<(usize, usize)> {
    let mut gt_order = (0..gt_stamps.len()).collect::<Vec<_>>();
    gt_order.sort_by(|&a, &b| gt_stamps[a].total_cmp(&gt_stamps[b]));

    let mut est_order = (0..est_stamps.len()).collect::<Vec<_>>();
    est_order.sort_by(|&a, &b| est_stamps[a].total_cmp(&est_stamps[b]));
    let est_sorted = est_order
        .iter()
        .map(|&i| est_stamps[i])
        .collect::<Vec<_>>();

    let mut free = FreeSlots::new(est_sorted.len());
    let mut matches = Vec::new();

    for gt_idx in gt_order {
        let t = gt_stamps[gt_idx];
        if t < offset_initial {
            continue;
        }
        let target = t + offset;

        let pos = est_sorted.partition_point(|&s| s < target);
        let candidates = [free.prev_free(pos), free.next_free(pos)];

        let best = candidates
            .into_iter()
            .flatten()
            .map(|k| (k, (est_sorted[k] - target).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        if let Some((k, diff)) = best {
            if diff <= max_difference {
                free.take(k);
                matches.push((gt_idx, est_order[k]));
            }
        }
    }

    matches
}

/// Restrict two trajectories to their matched poses.
///
/// The returned trajectories have the same length and are index aligned: the i-th pose of
/// the ground truth is matched with the i-th pose of the estimate. Each keeps its own
/// timestamps and covariances.
///
/// # Errors
///
/// Fails with [`AssociationError::InsufficientData`] if fewer than [`MIN_MATCHES`] pairs
/// are found.
pub fn associate(
    gt: &Trajectory,
    est: &Trajectory,
    config: &AssociationConfig,
) -> Result<(Trajectory, Trajectory), AssociationError> {
    let pairs = if config.ignore_timestamps {
        if gt.len() != est.len() {
            return Err(AssociationError::LengthMismatch {
                gt: gt.len(),
                est: est.len(),
            });
        }
        let by_time = |traj: &Trajectory| {
            let stamps = traj.timestamps();
            let mut order = (0..traj.len()).collect::<Vec<_>>();
            order.sort_by(|&a, &b| stamps[a].total_cmp(&stamps[b]));
            order
        };
        by_time(gt).into_iter().zip(by_time(est)).collect::<Vec<_>>()
    } else {
        let offset = if config.recommended_offset {
            let offset = recommended_offset(gt, est).unwrap_or(config.offset);
            log::info!("using recommended time offset {offset:.6}s");
            offset
        } else {
            config.offset
        };
        match_timestamps(
            gt.timestamps(),
            est.timestamps(),
            offset,
            config.offset_initial,
            config.max_difference,
        )
    };

    log::debug!(
        "associated {} of {} ground truth and {} estimated poses",
        pairs.len(),
        gt.len(),
        est.len()
    );

    if pairs.len() < MIN_MATCHES {
        return Err(AssociationError::InsufficientData {
            matches: pairs.len(),
            required: MIN_MATCHES,
        });
    }

    let (gt_idx, est_idx): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
    Ok((gt.select(&gt_idx), est.select(&est_idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use kornia_lie::se3::SE3;

    fn traj(stamps: &[f64]) -> Result<Trajectory, TrajectoryError> {
        let poses = stamps
            .iter()
            .map(|&t| SE3::from_translation(DVec3::new(t, 0.0, 0.0)))
            .collect();
        Trajectory::new(stamps.to_vec(), poses)
    }

    #[test]
    fn test_match_nearest() {
        let gt = [0.0, 1.0, 2.0, 3.0];
        let est = [0.01, 0.99, 2.5, 3.015];
        let pairs = match_timestamps(&gt, &est, 0.0, 0.0, 0.02);
        assert_eq!(pairs, vec![(0, 0), (1, 1), (3, 3)]);
    }

    #[test]
    fn test_match_each_estimate_once() {
        // both ground truth stamps are closest to 1.0
        let gt = [0.99, 1.0];
        let est = [1.0, 1.01];
        let pairs = match_timestamps(&gt, &est, 0.0, 0.0, 0.05);
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);

        let pairs = match_timestamps(&gt, &[1.0], 0.0, 0.0, 0.05);
        assert_eq!(pairs, vec![(0, 0)]);
    }

    #[test]
    fn test_match_offset_and_cutoff() {
        let gt = [0.0, 1.0, 2.0, 3.0];
        let est = [10.0, 11.0, 12.0, 13.0];
        assert!(match_timestamps(&gt, &est, 0.0, 0.0, 0.02).is_empty());

        let pairs = match_timestamps(&gt, &est, 10.0, 0.0, 0.02);
        assert_eq!(pairs.len(), 4);

        let pairs = match_timestamps(&gt, &est, 10.0, 1.5, 0.02);
        assert_eq!(pairs, vec![(2, 2), (3, 3)]);
    }

    #[test]
    fn test_match_unsorted_input() {
        let gt = [2.0, 0.0, 1.0];
        let est = [1.0, 2.0, 0.0];
        let pairs = match_timestamps(&gt, &est, 0.0, 0.0, 0.01);
        assert_eq!(pairs, vec![(1, 2), (2, 0), (0, 1)]);
    }

    #[test]
    fn test_free_slots() {
        let mut free = FreeSlots::new(4);
        free.take(1);
        free.take(2);
        assert_eq!(free.next_free(1), Some(3));
        assert_eq!(free.prev_free(3), Some(0));
        free.take(0);
        assert_eq!(free.prev_free(3), None);
        free.take(3);
        assert_eq!(free.next_free(0), None);
        assert_eq!(free.next_free(4), None);
    }

    #[test]
    fn test_associate_identical_stamps() -> Result<(), Box<dyn std::error::Error>> {
        let stamps = (0..20).map(|i| i as f64 * 0.1).collect::<Vec<_>>();
        let gt = traj(&stamps)?;
        let est = traj(&stamps)?;

        let (gt_m, est_m) = associate(&gt, &est, &AssociationConfig::default())?;
        assert_eq!(gt_m.len(), 20);
        assert_eq!(gt_m.timestamps(), est_m.timestamps());
        for (a, b) in gt_m.poses().iter().zip(est_m.poses()) {
            assert_eq!(a, b);
        }
        Ok(())
    }

    #[test]
    fn test_associate_insufficient() -> Result<(), Box<dyn std::error::Error>> {
        let gt = traj(&[0.0, 1.0, 2.0])?;
        let est = traj(&[0.0, 5.0, 6.0])?;
        let res = associate(&gt, &est, &AssociationConfig::default());
        assert!(matches!(
            res,
            Err(AssociationError::InsufficientData {
                matches: 1,
                required: 2
            })
        ));
        Ok(())
    }

    #[test]
    fn test_associate_recommended_offset() -> Result<(), Box<dyn std::error::Error>> {
        let gt = traj(&[0.0, 1.0, 2.0])?;
        let est = traj(&[100.0, 101.0, 102.0])?;
        assert_eq!(recommended_offset(&gt, &est), Some(100.0));

        let config = AssociationConfig {
            recommended_offset: true,
            ..Default::default()
        };
        let (gt_m, est_m) = associate(&gt, &est, &config)?;
        assert_eq!(gt_m.timestamps(), &[0.0, 1.0, 2.0]);
        assert_eq!(est_m.timestamps(), &[100.0, 101.0, 102.0]);
        Ok(())
    }

    #[test]
    fn test_associate_by_index() -> Result<(), Box<dyn std::error::Error>> {
        let gt = traj(&[0.0, 1.0, 2.0])?;
        let est = traj(&[7.0, 8.5, 9.0])?;
        let config = AssociationConfig {
            ignore_timestamps: true,
            ..Default::default()
        };
        let (gt_m, est_m) = associate(&gt, &est, &config)?;
        assert_eq!(gt_m.len(), 3);
        assert_eq!(est_m.timestamps(), &[7.0, 8.5, 9.0]);

        let short = traj(&[0.0, 1.0])?;
        assert!(matches!(
            associate(&gt, &short, &config),
            Err(AssociationError::LengthMismatch { gt: 3, est: 2 })
        ));
        Ok(())
    }

    #[test]
    fn test_associate_keeps_covariances() -> Result<(), Box<dyn std::error::Error>> {
        let stamps = vec![0.0, 1.0, 2.0];
        let poses = vec![SE3::IDENTITY; 3];
        let covs = (0..3)
            .map(|i| crate::Covariance::identity() * (i + 1) as f64)
            .collect();
        let est = Trajectory::with_covariances(stamps.clone(), poses.clone(), covs)?;
        let gt = Trajectory::new(vec![1.0, 2.0], vec![SE3::IDENTITY; 2])?;

        let (_, est_m) = associate(&gt, &est, &AssociationConfig::default())?;
        let covs = est_m.covariances().map(|c| c.to_vec()).unwrap_or_default();
        assert_eq!(covs.len(), 2);
        assert_eq!(covs[0][(0, 0)], 2.0);
        Ok(())
    }
}
