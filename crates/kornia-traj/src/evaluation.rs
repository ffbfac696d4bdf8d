//! End-to-end evaluation: associate, scale, align and compute the metrics.

use std::path::{Path, PathBuf};

use kornia_lie::Vector6;
use serde::Serialize;

use crate::{
    alignment::{align, estimate_scale, AlignmentError, AlignmentMethod, AlignmentResult},
    association::{associate, AssociationConfig, AssociationError, MIN_MATCHES},
    io::{read_trajectory, TumError},
    metrics::{
        ate, ate_manifold, ddt, rotational_norms, rpe, translational_norms, Axis, ErrorStatistics,
        MetricError, RpeConfig,
    },
    trajectory::Trajectory,
};

/// Error types for the evaluation pipeline, one per stage.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// A trajectory file could not be loaded.
    #[error("Failed to load {path}: {source}")]
    Load {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: TumError,
    },

    /// The trajectories could not be associated.
    #[error("Association failed: {0}")]
    Association(#[from] AssociationError),

    /// The trajectories could not be aligned.
    #[error("Alignment failed: {0}")]
    Alignment(#[from] AlignmentError),

    /// A metric could not be computed.
    #[error("Metric computation failed: {0}")]
    Metric(#[from] MetricError),
}

/// Scale applied to the estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleMode {
    /// A known scale factor.
    Fixed(f64),
    /// The similarity scale between the associated positions.
    Automatic,
}

impl Default for ScaleMode {
    fn default() -> Self {
        Self::Fixed(1.0)
    }
}

/// Optional metrics. The ATE is always computed.
#[derive(Debug, Clone, Default)]
pub struct MetricSelection {
    /// ATE on SE(3).
    pub ate_manifold: bool,
    /// Relative pose error.
    pub rpe: bool,
    /// Drift per distance travelled, implies `rpe`.
    pub ddt: bool,
}

/// Configuration of the evaluation pipeline.
#[derive(Debug, Clone, Default)]
pub struct EvaluationConfig {
    /// Scale of the estimate.
    pub scale: ScaleMode,
    /// Timestamp association.
    pub association: AssociationConfig,
    /// Alignment strategy.
    pub alignment: AlignmentMethod,
    /// Optional metrics.
    pub metrics: MetricSelection,
    /// RPE pair selection, also used by the DDT.
    pub rpe: RpeConfig,
}

/// Statistics of the translational and rotational parts of SE(3) errors.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PoseErrorStatistics {
    /// Statistics of the translational error norms.
    pub translational: Option<ErrorStatistics>,
    /// Statistics of the rotational error norms.
    pub rotational: Option<ErrorStatistics>,
}

impl PoseErrorStatistics {
    fn from_errors(errors: &[Vector6]) -> Self {
        Self {
            translational: ErrorStatistics::from_samples(&translational_norms(errors)),
            rotational: ErrorStatistics::from_samples(&rotational_norms(errors)),
        }
    }
}

/// ATE restricted to each coordinate axis.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct AxisStatistics {
    /// Along x.
    pub x: Option<ErrorStatistics>,
    /// Along y.
    pub y: Option<ErrorStatistics>,
    /// Along z.
    pub z: Option<ErrorStatistics>,
}

/// The alignment used by the evaluation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    /// Name of the method.
    pub method: String,
    /// Homogeneous matrix mapping the estimate into the ground truth frame, row major.
    pub transform: [[f64; 4]; 4],
    /// Total scale applied to the input estimate: the fixed or automatic scale of the
    /// evaluation times the scale estimated by the alignment itself.
    pub scale: f64,
    /// Whether the iterative solver converged, `None` for closed-form methods.
    pub converged: Option<bool>,
    /// Number of solver iterations, `None` for closed-form methods.
    pub iterations: Option<usize>,
}

/// The relative pose error and its parameters.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RpeReport {
    /// Pair separation.
    pub delta: f64,
    /// Unit of `delta`.
    pub unit: String,
    /// Number of compared pairs.
    pub pairs: usize,
    /// Error statistics.
    pub error: PoseErrorStatistics,
}

/// All the numbers produced by an evaluation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// Scale applied to the estimate before the alignment.
    pub scale: f64,
    /// Number of associated poses.
    pub matched: usize,
    /// The alignment.
    pub alignment: AlignmentReport,
    /// Position error.
    pub ate: ErrorStatistics,
    /// Position error along each axis.
    pub ate_axes: AxisStatistics,
    /// Pose error on SE(3), if requested.
    pub ate_manifold: Option<PoseErrorStatistics>,
    /// Relative pose error, if requested.
    pub rpe: Option<RpeReport>,
    /// Drift per distance travelled, if requested.
    pub ddt: Option<PoseErrorStatistics>,
}

/// The report and the trajectories it was computed on.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The numbers.
    pub report: EvaluationReport,
    /// The associated and aligned trajectories. The transform includes every scale
    /// applied to the estimate, so it maps the associated input estimate onto `aligned.est`.
    pub aligned: AlignmentResult,
}

/// Load two TUM files and evaluate the second against the first.
pub fn evaluate_files(
    gt_path: impl AsRef<Path>,
    est_path: impl AsRef<Path>,
    config: &EvaluationConfig,
) -> Result<Evaluation, EvaluationError> {
    let load = |path: &Path| {
        read_trajectory(path).map_err(|source| EvaluationError::Load {
            path: path.to_path_buf(),
            source,
        })
    };
    let gt = load(gt_path.as_ref())?;
    let est = load(est_path.as_ref())?;
    log::info!("loaded {} ground truth and {} estimated poses", gt.len(), est.len());
    evaluate(&gt, &est, config)
}

/// Evaluate an estimated trajectory against its ground truth.
///
/// The estimate is scaled, associated with the ground truth by timestamp, optionally
/// rescaled automatically, aligned, and finally compared.
pub fn evaluate(
    gt: &Trajectory,
    est: &Trajectory,
    config: &EvaluationConfig,
) -> Result<Evaluation, EvaluationError> {
    let est = match config.scale {
        ScaleMode::Fixed(scale) if scale != 1.0 => est.scale(scale, true),
        _ => est.clone(),
    };

    let (gt, est) = associate(gt, &est, &config.association)?;
    log::info!("associated {} poses", gt.len());

    let (est, scale) = match config.scale {
        ScaleMode::Fixed(scale) => (est, scale),
        ScaleMode::Automatic => {
            let scale = estimate_scale(&gt, &est)?;
            (est.scale(scale, true), scale)
        }
    };
    log::info!("using scale {scale:.6}");

    let mut aligned = align(&gt, &est, &config.alignment)?;
    aligned.transform.scale *= scale;

    let (ate_all, ate_axes) = ate_statistics(&aligned)?;
    log::info!("ATE rmse {:.6}", ate_all.rmse);

    let ate_manifold = if config.metrics.ate_manifold {
        let errors = ate_manifold(&aligned.gt, &aligned.est)?;
        Some(PoseErrorStatistics::from_errors(&errors))
    } else {
        None
    };

    let (rpe_report, ddt_stats) = if config.metrics.rpe || config.metrics.ddt {
        let rpe = rpe(&aligned.gt, &aligned.est, &config.rpe)?;
        let report = RpeReport {
            delta: config.rpe.delta,
            unit: config.rpe.unit.to_string(),
            pairs: rpe.len(),
            error: PoseErrorStatistics::from_errors(&rpe.errors),
        };
        let ddt = config
            .metrics
            .ddt
            .then(|| PoseErrorStatistics::from_errors(&ddt(&rpe)));
        (Some(report), ddt)
    } else {
        (None, None)
    };

    // rows of the matrix are the columns of its transpose
    let transform = aligned.transform.transform.matrix().transpose().to_cols_array_2d();

    let alignment = AlignmentReport {
        method: config.alignment.to_string(),
        transform,
        scale: aligned.transform.scale,
        converged: aligned.convergence.map(|c| c.converged),
        iterations: aligned.convergence.map(|c| c.iterations),
    };

    let report = EvaluationReport {
        scale,
        matched: gt.len(),
        alignment,
        ate: ate_all,
        ate_axes,
        ate_manifold,
        rpe: rpe_report,
        ddt: ddt_stats,
    };

    Ok(Evaluation { report, aligned })
}

/// ATE statistics over all axes and per axis.
fn ate_statistics(
    aligned: &AlignmentResult,
) -> Result<(ErrorStatistics, AxisStatistics), EvaluationError> {
    let ate_stats = |axis: Option<Axis>| -> Result<Option<ErrorStatistics>, MetricError> {
        Ok(ErrorStatistics::from_samples(&ate(&aligned.gt, &aligned.est, axis)?))
    };
    let all = ate_stats(None)?.ok_or(AlignmentError::InsufficientData {
        got: aligned.est.len(),
        required: MIN_MATCHES,
    })?;
    let axes = AxisStatistics {
        x: ate_stats(Some(Axis::X))?,
        y: ate_stats(Some(Axis::Y))?,
        z: ate_stats(Some(Axis::Z))?,
    };
    Ok((all, axes))
}

impl EvaluationReport {
    /// Console rendering of the report. Without `verbose`, only the RMSE is printed.
    pub fn display(&self, verbose: bool) -> ReportDisplay<'_> {
        ReportDisplay {
            report: self,
            verbose,
        }
    }
}

/// Helper to print an [`EvaluationReport`] with [`std::fmt::Display`].
pub struct ReportDisplay<'a> {
    report: &'a EvaluationReport,
    verbose: bool,
}

impl ReportDisplay<'_> {
    fn stats(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        label: Option<&str>,
        stats: Option<&ErrorStatistics>,
    ) -> std::fmt::Result {
        if let Some(label) = label {
            writeln!(f, "{label}")?;
        }
        match stats {
            None => writeln!(f, "no data"),
            Some(s) if self.verbose => writeln!(f, "{s}"),
            Some(s) => writeln!(f, "rmse   {:.6}", s.rmse),
        }
    }

    fn pose_stats(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        stats: &PoseErrorStatistics,
    ) -> std::fmt::Result {
        self.stats(f, Some("Translational"), stats.translational.as_ref())?;
        self.stats(f, Some("Rotational"), stats.rotational.as_ref())
    }
}

impl std::fmt::Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = self.report;
        writeln!(f, "Using scale: {:.6}", r.scale)?;
        if self.verbose {
            writeln!(f, "Matched poses: {}", r.matched)?;
            write!(f, "Alignment: {}", r.alignment.method)?;
            match (r.alignment.converged, r.alignment.iterations) {
                (Some(true), Some(it)) => writeln!(f, " (converged in {it} iterations)")?,
                (Some(false), Some(it)) => writeln!(f, " (not converged after {it} iterations)")?,
                _ => writeln!(f)?,
            }
        }

        writeln!(f, "\nATE - Horn")?;
        self.stats(f, None, Some(&r.ate))?;
        for (axis, stats) in [
            (Axis::X, &r.ate_axes.x),
            (Axis::Y, &r.ate_axes.y),
            (Axis::Z, &r.ate_axes.z),
        ] {
            writeln!(f, "\nATE - Horn - {axis}")?;
            self.stats(f, None, stats.as_ref())?;
        }

        if let Some(stats) = &r.ate_manifold {
            writeln!(f, "\nATE - Manifold")?;
            self.pose_stats(f, stats)?;
        }

        if let Some(rpe) = &r.rpe {
            writeln!(f, "\nRPE - {} [{}]", rpe.delta, rpe.unit)?;
            self.pose_stats(f, &rpe.error)?;
        }

        if let Some(stats) = &r.ddt {
            writeln!(f, "\nDDT")?;
            self.pose_stats(f, stats)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::ManifoldConfig;
    use approx::assert_relative_eq;
    use glam::DVec3;
    use kornia_lie::{se3::SE3, so3::SO3};

    fn trajectories() -> Result<(Trajectory, Trajectory), crate::TrajectoryError> {
        let stamps = (0..30).map(|i| i as f64 * 0.1).collect::<Vec<_>>();
        let gt_poses = (0..30)
            .map(|i| {
                let t = i as f64 * 0.3;
                SE3::new(
                    SO3::from_axis_angle(DVec3::Z, 0.1 * t),
                    DVec3::new(t.cos() * 3.0, t.sin() * 3.0, 0.1 * t),
                )
            })
            .collect::<Vec<_>>();
        let world = SE3::new(
            SO3::from_axis_angle(DVec3::Y, 0.4),
            DVec3::new(1.0, 2.0, 3.0),
        );
        let est_poses = gt_poses.iter().map(|p| world * *p).collect();
        Ok((
            Trajectory::new(stamps.clone(), gt_poses)?,
            Trajectory::new(stamps, est_poses)?,
        ))
    }

    #[test]
    fn test_evaluate_all_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let (gt, est) = trajectories()?;
        let config = EvaluationConfig {
            metrics: MetricSelection {
                ate_manifold: true,
                rpe: false,
                ddt: true,
            },
            ..Default::default()
        };
        let eval = evaluate(&gt, &est, &config)?;
        let report = &eval.report;

        assert_eq!(report.matched, 30);
        assert_eq!(report.scale, 1.0);
        assert_eq!(report.alignment.method, "horn");
        assert!(report.alignment.converged.is_none());
        assert_relative_eq!(report.ate.rmse, 0.0, epsilon = 1e-9);

        let manifold = report.ate_manifold.ok_or("missing ATE manifold")?;
        let rot = manifold.rotational.ok_or("no data")?;
        assert_relative_eq!(rot.max, 0.0, epsilon = 1e-9);

        // ddt implies rpe
        let rpe = report.rpe.as_ref().ok_or("missing RPE")?;
        assert!(rpe.pairs > 0);
        assert!(report.ddt.is_some());
        Ok(())
    }

    #[test]
    fn test_evaluate_manifold_and_automatic_scale() -> Result<(), Box<dyn std::error::Error>> {
        let (gt, est) = trajectories()?;
        let est = est.scale(0.25, false);
        let config = EvaluationConfig {
            scale: ScaleMode::Automatic,
            alignment: AlignmentMethod::Manifold(ManifoldConfig::default()),
            ..Default::default()
        };
        let eval = evaluate(&gt, &est, &config)?;
        assert_relative_eq!(eval.report.scale, 4.0, epsilon = 1e-9);
        assert_relative_eq!(eval.report.alignment.scale, 4.0, epsilon = 1e-9);
        assert_eq!(eval.report.alignment.converged, Some(true));
        assert_relative_eq!(eval.report.ate.rmse, 0.0, epsilon = 1e-8);

        // the reported transform maps the unscaled estimate onto the aligned one
        let remapped = eval.aligned.transform.apply(&est);
        for (a, b) in remapped.poses().iter().zip(eval.aligned.est.poses()) {
            assert_relative_eq!((a.inverse() * *b).log().norm(), 0.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_ate_statistics_without_poses() -> Result<(), Box<dyn std::error::Error>> {
        let empty = Trajectory::new(vec![], vec![])?;
        let aligned = AlignmentResult {
            gt: empty.clone(),
            est: empty,
            transform: Default::default(),
            convergence: None,
        };
        assert!(matches!(
            ate_statistics(&aligned),
            Err(EvaluationError::Alignment(AlignmentError::InsufficientData {
                got: 0,
                required: MIN_MATCHES,
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_evaluate_fixed_scale() -> Result<(), Box<dyn std::error::Error>> {
        let (gt, est) = trajectories()?;
        let est = est.scale(0.5, false);
        let config = EvaluationConfig {
            scale: ScaleMode::Fixed(2.0),
            ..Default::default()
        };
        let eval = evaluate(&gt, &est, &config)?;
        assert_relative_eq!(eval.report.ate.rmse, 0.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_evaluate_association_failure() -> Result<(), Box<dyn std::error::Error>> {
        let (gt, est) = trajectories()?;
        let config = EvaluationConfig {
            association: AssociationConfig {
                offset: 100.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = evaluate(&gt, &est, &config).err().ok_or("expected a failure")?;
        assert!(matches!(err, EvaluationError::Association(_)));
        assert!(err.to_string().starts_with("Association failed"));
        Ok(())
    }

    #[test]
    fn test_report_display() -> Result<(), Box<dyn std::error::Error>> {
        let (gt, est) = trajectories()?;
        let config = EvaluationConfig {
            metrics: MetricSelection {
                rpe: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = evaluate(&gt, &est, &config)?.report;

        let short = report.display(false).to_string();
        assert!(short.contains("ATE - Horn - Z"));
        assert!(short.contains("RPE - 1 [m]"));
        assert!(!short.contains("median"));

        let long = report.display(true).to_string();
        assert!(long.contains("median"));
        assert!(long.contains("Matched poses: 30"));
        Ok(())
    }

    #[test]
    fn test_evaluate_files_reports_path() {
        let res = evaluate_files(
            "/nonexistent/gt.txt",
            "/nonexistent/est.txt",
            &EvaluationConfig::default(),
        );
        match res {
            Err(EvaluationError::Load { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/gt.txt"))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
