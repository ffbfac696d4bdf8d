use argh::FromArgs;
use std::path::PathBuf;

use kornia_traj::{
    alignment::AlignmentMethod,
    association::AssociationConfig,
    evaluation::{evaluate_files, EvaluationConfig, MetricSelection, ScaleMode},
    io::write_trajectory,
    metrics::{DeltaUnit, RpeConfig},
};

#[derive(FromArgs)]
/// Evaluate an estimated trajectory against a ground truth, both in TUM format
struct Args {
    /// path to the ground truth trajectory
    #[argh(positional)]
    gt_file: PathBuf,

    /// path to the estimated trajectory
    #[argh(positional)]
    est_file: PathBuf,

    /// time offset added to the ground truth timestamps
    #[argh(option, default = "0.0")]
    offset: f64,

    /// ignore ground truth poses before this timestamp
    #[argh(option, default = "0.0")]
    offset_initial: f64,

    /// use the offset between the first timestamps of both trajectories
    #[argh(switch)]
    recommended_offset: bool,

    /// maximum time difference between matched timestamps
    #[argh(option, default = "0.02")]
    max_difference: f64,

    /// match poses by index instead of timestamp
    #[argh(switch)]
    ignore_timestamp_match: bool,

    /// scale factor applied to the estimate
    #[argh(option, default = "1.0")]
    scale: f64,

    /// estimate the scale of the estimate with respect to the ground truth
    #[argh(switch)]
    automatic_scale: bool,

    /// alignment method: first, horn or manifold
    #[argh(option, default = "AlignmentMethod::default()")]
    alignment: AlignmentMethod,

    /// maximum number of iterations of the manifold alignment
    #[argh(option)]
    max_iterations: Option<usize>,

    /// align the ground truth onto the estimate in the manifold alignment
    #[argh(switch)]
    align_gt: bool,

    /// ignore the pose covariances in the manifold alignment
    #[argh(switch)]
    no_covariances: bool,

    /// compute the ATE on the SE(3) manifold
    #[argh(switch)]
    ate_manifold: bool,

    /// compute the relative pose error
    #[argh(switch)]
    rpe: bool,

    /// compute the drift per distance travelled
    #[argh(switch)]
    ddt: bool,

    /// separation between the poses of an RPE pair
    #[argh(option, default = "1.0")]
    delta: f64,

    /// unit of the RPE delta: s, m, rad or f
    #[argh(option, default = "DeltaUnit::Meters")]
    delta_unit: DeltaUnit,

    /// only keep RPE pairs separated by exactly delta
    #[argh(switch)]
    fixed_delta: bool,

    /// maximum number of RPE pairs, 0 keeps all of them
    #[argh(option, default = "10000")]
    max_pairs: usize,

    /// write the aligned estimate to this file
    #[argh(option)]
    save_aligned: Option<PathBuf>,

    /// print the report as JSON
    #[argh(switch)]
    json: bool,

    /// print all the statistics and debug logs
    #[argh(switch, short = 'v')]
    verbose: bool,
}

impl Args {
    fn config(&self) -> EvaluationConfig {
        let alignment = match &self.alignment {
            AlignmentMethod::Manifold(config) => {
                let mut config = config.clone();
                if let Some(max_iterations) = self.max_iterations {
                    config.max_iterations = max_iterations;
                }
                config.align_gt = self.align_gt;
                config.use_covariances = !self.no_covariances;
                AlignmentMethod::Manifold(config)
            }
            method => method.clone(),
        };

        EvaluationConfig {
            scale: if self.automatic_scale {
                ScaleMode::Automatic
            } else {
                ScaleMode::Fixed(self.scale)
            },
            association: AssociationConfig {
                offset: self.offset,
                offset_initial: self.offset_initial,
                max_difference: self.max_difference,
                recommended_offset: self.recommended_offset,
                ignore_timestamps: self.ignore_timestamp_match,
            },
            alignment,
            metrics: MetricSelection {
                ate_manifold: self.ate_manifold,
                rpe: self.rpe,
                ddt: self.ddt,
            },
            rpe: RpeConfig {
                delta: self.delta,
                unit: self.delta_unit,
                fixed_delta: self.fixed_delta,
                max_pairs: self.max_pairs,
                ..Default::default()
            },
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let evaluation = evaluate_files(&args.gt_file, &args.est_file, &args.config())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&evaluation.report)?);
    } else {
        print!("{}", evaluation.report.display(args.verbose));
    }

    if let Some(path) = &args.save_aligned {
        write_trajectory(path, &evaluation.aligned.est)?;
        log::info!("aligned estimate written to {}", path.display());
    }

    Ok(())
}
