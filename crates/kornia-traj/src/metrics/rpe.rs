use std::str::FromStr;

use kornia_lie::Vector6;

use crate::trajectory::Trajectory;

use super::{check_lengths, rotational_norms, translational_norms, MetricError};

/// Unit in which the RPE delta is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaUnit {
    /// Elapsed time.
    Seconds,
    /// Distance travelled along the ground truth.
    Meters,
    /// Accumulated rotation angle along the ground truth.
    Radians,
    /// Number of poses.
    Frames,
}

impl FromStr for DeltaUnit {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(DeltaUnit::Seconds),
            "m" => Ok(DeltaUnit::Meters),
            "rad" => Ok(DeltaUnit::Radians),
            "f" => Ok(DeltaUnit::Frames),
            _ => Err(MetricError::UnknownDeltaUnit(s.to_string())),
        }
    }
}

impl std::fmt::Display for DeltaUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeltaUnit::Seconds => write!(f, "s"),
            DeltaUnit::Meters => write!(f, "m"),
            DeltaUnit::Radians => write!(f, "rad"),
            DeltaUnit::Frames => write!(f, "f"),
        }
    }
}

/// Configuration of the relative pose error.
#[derive(Debug, Clone)]
pub struct RpeConfig {
    /// Separation between the poses of a pair.
    pub delta: f64,
    /// Unit of `delta`.
    pub unit: DeltaUnit,
    /// Only keep pairs whose separation is `delta` within `tolerance`.
    pub fixed_delta: bool,
    /// Subsample the pairs down to this number, `0` keeps all of them.
    pub max_pairs: usize,
    /// Accepted deviation from `delta` in fixed mode, as a fraction of `delta`.
    /// Ignored for frames, which must match exactly.
    pub tolerance: f64,
}

impl Default for RpeConfig {
    fn default() -> Self {
        Self {
            delta: 1.0,
            unit: DeltaUnit::Meters,
            fixed_delta: false,
            max_pairs: 10000,
            tolerance: 0.1,
        }
    }
}

/// Per pair relative motion errors.
#[derive(Debug, Clone, Default)]
pub struct RelativePoseError {
    /// `(i, j)` indices into the trajectories, `i` before `j`.
    pub pairs: Vec<(usize, usize)>,
    /// `log((gt_j^-1 gt_i)^-1 (est_j^-1 est_i))` for every pair.
    pub errors: Vec<Vector6>,
    /// Distance travelled along the ground truth between `i` and `j`.
    pub distances: Vec<f64>,
}

impl RelativePoseError {
    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair was selected.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Norms of the translational errors.
    pub fn translational(&self) -> Vec<f64> {
        translational_norms(&self.errors)
    }

    /// Norms of the rotational errors.
    pub fn rotational(&self) -> Vec<f64> {
        rotational_norms(&self.errors)
    }
}

/// Cumulative quantities along the trajectory, in time order.
struct Progress {
    // storage index of the k-th pose in time
    order: Vec<usize>,
    distance: Vec<f64>,
    measure: Vec<f64>,
}

impl Progress {
    fn new(traj: &Trajectory, unit: DeltaUnit) -> Self {
        let stamps = traj.timestamps();
        let poses = traj.poses();
        let mut order = (0..traj.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| stamps[a].total_cmp(&stamps[b]));

        let accumulate = |step: &dyn Fn(usize, usize) -> f64| {
            let mut acc = Vec::with_capacity(order.len());
            let mut total = 0.0;
            for (k, &idx) in order.iter().enumerate() {
                if k > 0 {
                    total += step(order[k - 1], idx);
                }
                acc.push(total);
            }
            acc
        };

        let distance =
            accumulate(&|a, b| poses[b].translation.distance(poses[a].translation));

        let measure = match unit {
            DeltaUnit::Seconds => order.iter().map(|&i| stamps[i]).collect(),
            DeltaUnit::Meters => distance.clone(),
            DeltaUnit::Radians => {
                accumulate(&|a, b| (poses[a].rotation.inverse() * poses[b].rotation).angle())
            }
            DeltaUnit::Frames => (0..order.len()).map(|k| k as f64).collect(),
        };

        Self {
            order,
            distance,
            measure,
        }
    }
}

/// Select the pose pairs compared by the RPE, based on the ground truth.
///
/// Every pose `i` is paired with the first later pose `j` whose separation from `i`
/// reaches `delta`. In fixed mode, `i` is instead paired with the later pose whose
/// separation is closest to `delta`, and dropped when it differs from `delta` by more than
/// the tolerance. Pairs are then uniformly subsampled to `max_pairs`.
///
/// # Returns
///
/// Pairs of storage indices `(i, j)` in time order of `i`.
pub fn select_pairs(
    traj: &Trajectory,
    config: &RpeConfig,
) -> Result<Vec<(usize, usize)>, MetricError> {
    Ok(select_pairs_with_progress(&Progress::new(traj, config.unit), config)?
        .into_iter()
        .map(|(a, b)| (a.0, b.0))
        .collect())
}

// pairs of (storage index, time rank)
type RankedPair = ((usize, usize), (usize, usize));

fn select_pairs_with_progress(
    progress: &Progress,
    config: &RpeConfig,
) -> Result<Vec<RankedPair>, MetricError> {
    if !(config.delta.is_finite() && config.delta > 0.0) {
        return Err(MetricError::InvalidDelta(config.delta));
    }

    let tolerance = match config.unit {
        DeltaUnit::Frames => 0.0,
        _ => config.tolerance * config.delta,
    };

    let measure = &progress.measure;
    let end = measure.len();
    let mut pairs = Vec::new();
    for i in 0..end {
        let target = measure[i] + config.delta;
        let mut j = i + 1 + measure[i + 1..].partition_point(|&m| m < target);
        if config.fixed_delta {
            // the pose right before the first one reaching delta may be closer to it
            if j > i + 1 && (j == end || target - measure[j - 1] <= measure[j] - target) {
                j -= 1;
            }
            if j == end || (measure[j] - measure[i] - config.delta).abs() > tolerance {
                continue;
            }
        } else if j == end {
            // the measure is non-decreasing, no later pose can reach delta
            break;
        }
        pairs.push(((progress.order[i], i), (progress.order[j], j)));
    }

    if config.max_pairs > 0 && pairs.len() > config.max_pairs {
        let len = pairs.len();
        log::debug!("subsampling {len} RPE pairs to {}", config.max_pairs);
        pairs = (0..config.max_pairs)
            .map(|k| pairs[k * len / config.max_pairs])
            .collect();
    }

    Ok(pairs)
}

/// Relative pose error between the ground truth and the aligned estimate.
pub fn rpe(
    gt: &Trajectory,
    est: &Trajectory,
    config: &RpeConfig,
) -> Result<RelativePoseError, MetricError> {
    check_lengths(gt, est)?;

    let progress = Progress::new(gt, config.unit);
    let ranked = select_pairs_with_progress(&progress, config)?;

    let gt_poses = gt.poses();
    let est_poses = est.poses();

    let mut result = RelativePoseError {
        pairs: Vec::with_capacity(ranked.len()),
        errors: Vec::with_capacity(ranked.len()),
        distances: Vec::with_capacity(ranked.len()),
    };

    for ((i, rank_i), (j, rank_j)) in ranked {
        let gt_motion = gt_poses[j].inverse() * gt_poses[i];
        let est_motion = est_poses[j].inverse() * est_poses[i];
        result.pairs.push((i, j));
        result.errors.push((gt_motion.inverse() * est_motion).log());
        result
            .distances
            .push(progress.distance[rank_j] - progress.distance[rank_i]);
    }

    log::debug!(
        "computed {} RPE pairs with delta {} {}",
        result.len(),
        config.delta,
        config.unit
    );

    Ok(result)
}

/// Drift per distance travelled: the RPE errors divided by the distance of their pair.
///
/// Pairs with zero travelled distance are skipped.
pub fn ddt(rpe: &RelativePoseError) -> Vec<Vector6> {
    let ddt = rpe
        .errors
        .iter()
        .zip(&rpe.distances)
        .filter(|(_, d)| **d > 0.0)
        .map(|(e, &d)| e / d)
        .collect::<Vec<_>>();

    if ddt.len() < rpe.len() {
        log::debug!(
            "skipped {} DDT pairs without travelled distance",
            rpe.len() - ddt.len()
        );
    }

    ddt
}
