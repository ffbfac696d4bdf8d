//! Iterative alignment on SE(3).
//!
//! The alignment `T` minimizes the sum of squared pose residuals
//!
//! ```text
//! r_i(T) = log(fixed_i^-1 * T * moving_i)
//! ```
//!
//! where `fixed` is the ground truth and `moving` the estimate (or the converse when
//! aligning the ground truth). Residuals are weighted by the inverse of their first order
//! covariance when the trajectories carry covariances. The problem is solved with
//! Levenberg-Marquardt using left perturbations `T <- exp(delta) * T`.

use kornia_lie::{se3::SE3, Matrix6, Vector6};

use crate::trajectory::{Covariance, Trajectory};

use super::{
    check_inputs, horn::umeyama, AlignmentError, AlignmentResult, AlignmentTransform, Convergence,
};

/// Smallest damping kept after a successful step.
const LAMBDA_MIN: f64 = 1e-12;

/// Configuration of the manifold alignment.
#[derive(Debug, Clone)]
pub struct ManifoldConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Converged when the update norm falls below this threshold
    pub step_tolerance: f64,
    /// Converged when the relative cost decrease falls below this threshold
    pub cost_tolerance: f64,
    /// Converged when the gradient norm falls below this threshold
    pub gradient_tolerance: f64,
    /// Initial damping parameter
    pub lambda_init: f64,
    /// Factor for lambda adaptation
    pub lambda_factor: f64,
    /// Maximum damping parameter
    pub lambda_max: f64,
    /// Start from the Horn solution instead of the identity
    pub warm_start: bool,
    /// Weight the residuals with the pose covariances, when available
    pub use_covariances: bool,
    /// Move the ground truth onto the estimate instead of the converse
    pub align_gt: bool,
}

impl Default for ManifoldConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            step_tolerance: 1e-10,
            cost_tolerance: 1e-12,
            gradient_tolerance: 1e-12,
            lambda_init: 1e-6,
            lambda_factor: 10.0,
            lambda_max: 1e10,
            warm_start: true,
            use_covariances: true,
            align_gt: false,
        }
    }
}

/// Normal equations of the weighted problem at a given alignment.
struct Linearization {
    cost: f64,
    hessian: Matrix6,
    gradient: Vector6,
    singular_weights: usize,
}

struct Problem<'a> {
    fixed: &'a [SE3],
    moving: &'a [SE3],
    fixed_cov: Option<&'a [Covariance]>,
    moving_cov: Option<&'a [Covariance]>,
}

impl Problem<'_> {
    fn linearize(&self, transform: &SE3) -> Linearization {
        let mut lin = Linearization {
            cost: 0.0,
            hessian: Matrix6::zeros(),
            gradient: Vector6::zeros(),
            singular_weights: 0,
        };

        for (i, (fixed, moving)) in self.fixed.iter().zip(self.moving).enumerate() {
            let fixed_inv = fixed.inverse();
            let error = fixed_inv * *transform * *moving;
            let r = error.log();
            let jl_inv = SE3::left_jacobian_inverse(&r);

            // d r / d delta for T <- exp(delta) * T
            let jac = jl_inv * fixed_inv.adjoint();

            let weight = match self.residual_covariance(i, &error) {
                Some(cov) => {
                    let cov = jl_inv * cov * jl_inv.transpose();
                    // a zero pivot passes the factorization but yields a non-finite inverse
                    let inverse = cov
                        .cholesky()
                        .map(|chol| chol.inverse())
                        .filter(|w| w.iter().all(|v| v.is_finite()));
                    match inverse {
                        Some(w) => w,
                        None => {
                            lin.singular_weights += 1;
                            Matrix6::identity()
                        }
                    }
                }
                None => Matrix6::identity(),
            };

            let wr = weight * r;
            lin.cost += r.dot(&wr);
            lin.hessian += jac.transpose() * weight * jac;
            lin.gradient += jac.transpose() * wr;
        }

        lin
    }

    /// Covariance of `log(error)` before the Jacobian of the logarithm is applied.
    fn residual_covariance(&self, i: usize, error: &SE3) -> Option<Matrix6> {
        let moving = self
            .moving_cov
            .map(|covs| error.propagate_covariance(&covs[i]));
        let fixed = self.fixed_cov.map(|covs| covs[i]);
        match (fixed, moving) {
            (Some(f), Some(m)) => Some(f + m),
            (f, m) => f.or(m),
        }
    }
}

/// Align the estimate onto the ground truth by optimizing over SE(3).
///
/// Non-convergence within `max_iterations` is not an error: the last iterate is returned
/// and [`Convergence::converged`] is `false`.
pub fn align_manifold(
    gt: &Trajectory,
    est: &Trajectory,
    config: &ManifoldConfig,
) -> Result<AlignmentResult, AlignmentError> {
    check_inputs(gt, est, 2)?;

    let (fixed, moving) = if config.align_gt { (est, gt) } else { (gt, est) };
    let (fixed_cov, moving_cov) = if config.use_covariances {
        (fixed.covariances(), moving.covariances())
    } else {
        (None, None)
    };

    let problem = Problem {
        fixed: fixed.poses(),
        moving: moving.poses(),
        fixed_cov,
        moving_cov,
    };

    let initial = if config.warm_start {
        let sim = umeyama(&moving.positions(), &fixed.positions(), false);
        SE3::new(sim.rotation, sim.translation)
    } else {
        SE3::IDENTITY
    };

    let (transform, convergence) = optimize(&problem, initial, config);

    if convergence.converged {
        log::debug!(
            "manifold alignment converged after {} iterations, cost {:.6e} -> {:.6e}",
            convergence.iterations,
            convergence.initial_cost,
            convergence.final_cost
        );
    } else {
        log::warn!(
            "manifold alignment did not converge after {} iterations, cost {:.6e} -> {:.6e}",
            convergence.iterations,
            convergence.initial_cost,
            convergence.final_cost
        );
    }

    let result = if config.align_gt {
        AlignmentResult {
            gt: gt.transform(&transform),
            est: est.clone(),
            transform: AlignmentTransform::rigid(transform.inverse()),
            convergence: Some(convergence),
        }
    } else {
        let transform = AlignmentTransform::rigid(transform);
        AlignmentResult {
            gt: gt.clone(),
            est: transform.apply(est),
            transform,
            convergence: Some(convergence),
        }
    };

    Ok(result)
}

fn optimize(problem: &Problem<'_>, initial: SE3, config: &ManifoldConfig) -> (SE3, Convergence) {
    let mut transform = initial;
    let mut lin = problem.linearize(&transform);
    let initial_cost = lin.cost;
    let mut lambda = config.lambda_init;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        if lin.gradient.norm() < config.gradient_tolerance {
            converged = true;
            break;
        }

        // Solve damped system: (J^T W J + λI) δ = -J^T W r
        let damped = lin.hessian + Matrix6::identity() * lambda;
        let rhs = -lin.gradient;
        let delta = match damped.cholesky() {
            Some(chol) => chol.solve(&rhs),
            None => match damped.lu().solve(&rhs) {
                Some(delta) => delta,
                None => {
                    log::warn!("normal equations are singular, stopping at iteration {iterations}");
                    break;
                }
            },
        };
        iterations += 1;

        if delta.norm() < config.step_tolerance {
            converged = true;
            break;
        }

        let candidate = SE3::exp(&delta) * transform;
        let candidate_lin = problem.linearize(&candidate);

        log::debug!(
            "iteration {iterations}: cost {:.6e}, candidate {:.6e}, lambda {lambda:.1e}, |delta| {:.3e}",
            lin.cost,
            candidate_lin.cost,
            delta.norm()
        );

        if candidate_lin.cost < lin.cost {
            let relative_decrease = (lin.cost - candidate_lin.cost) / lin.cost;
            transform = candidate;
            lin = candidate_lin;
            lambda = (lambda / config.lambda_factor).max(LAMBDA_MIN);
            if relative_decrease < config.cost_tolerance {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_factor;
            if lambda > config.lambda_max {
                log::debug!("damping exceeded {:.1e}, stopping", config.lambda_max);
                // stationary if the gradient is numerically zero
                converged = lin.gradient.norm() < config.gradient_tolerance.sqrt();
                break;
            }
        }
    }

    if lin.singular_weights > 0 {
        log::warn!(
            "{} residual covariances are not positive definite, using unit weights for them",
            lin.singular_weights
        );
    }

    (
        transform,
        Convergence {
            converged,
            iterations,
            initial_cost,
            final_cost: lin.cost,
            singular_weights: lin.singular_weights,
        },
    )
}
