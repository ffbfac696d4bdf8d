//! Closed-form absolute orientation (Horn / Umeyama).

use glam::DVec3;
use kornia_lie::{
    convert::{dvec3_to_vector3, matrix3_to_dmat3},
    se3::SE3,
    so3::SO3,
};
use nalgebra::{Matrix3, Vector3};

use crate::trajectory::Trajectory;

use super::{check_inputs, AlignmentError, AlignmentResult, AlignmentTransform};

/// Variance below which a point set is considered collapsed to a single point.
const DEGENERATE_VARIANCE: f64 = 1e-12;

/// Configuration of the Horn alignment.
#[derive(Debug, Clone, Default)]
pub struct HornConfig {
    /// Also estimate a global scale of the estimate (monocular case).
    pub estimate_scale: bool,
}

/// A similarity transform `dst = scale * rotation * src + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Rotation.
    pub rotation: SO3,
    /// Translation.
    pub translation: DVec3,
    /// Scale, `1.0` when not estimated.
    pub scale: f64,
}

/// Least squares similarity between two point sets, following Umeyama (1991).
///
/// Both sets are centered on their centroids, the cross-covariance is decomposed with an
/// SVD and the smallest singular direction is flipped if needed to obtain a proper
/// rotation. The scale is `tr(D S) / sigma_src^2`, with the population (`1/n`)
/// normalization in both terms.
///
/// # Arguments
///
/// * `src` - Points to be mapped.
/// * `dst` - Target points, `dst[i]` corresponds to `src[i]`.
/// * `with_scale` - Whether to estimate the scale.
///
/// PRECONDITION: `src` and `dst` are non-empty and of the same length.
pub fn umeyama(src: &[DVec3], dst: &[DVec3], with_scale: bool) -> Similarity {
    debug_assert_eq!(src.len(), dst.len());
    let n = src.len().max(1) as f64;

    // 1. centroids
    let mu_s = src.iter().copied().sum::<DVec3>() / n;
    let mu_d = dst.iter().copied().sum::<DVec3>() / n;

    // 2. cross-covariance H = 1/n sum (d - mu_d)(s - mu_s)^T and source variance
    let mut h = Matrix3::<f64>::zeros();
    let mut var_s = 0.0;
    for (s, d) in src.iter().zip(dst) {
        let sc = dvec3_to_vector3(*s - mu_s);
        let dc = dvec3_to_vector3(*d - mu_d);
        h += dc * sc.transpose();
        var_s += sc.norm_squared();
    }
    h /= n;
    var_s /= n;

    // 3. SVD and reflection correction on the smallest singular value
    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            log::warn!("SVD of the cross-covariance failed, falling back to identity");
            (Matrix3::identity(), Matrix3::identity())
        }
    };

    let mut signs = Vector3::new(1.0, 1.0, 1.0);
    if u.determinant() * v_t.determinant() < 0.0 {
        signs[svd.singular_values.imin()] = -1.0;
    }
    let rotation_mat = u * Matrix3::from_diagonal(&signs) * v_t;

    let scale = if !with_scale {
        1.0
    } else if var_s < DEGENERATE_VARIANCE {
        log::warn!("source points are degenerate (variance {var_s:e}), keeping scale 1");
        1.0
    } else {
        svd.singular_values.dot(&signs) / var_s
    };

    let rotation_mat = matrix3_to_dmat3(&rotation_mat);
    let rotation = SO3::new(glam::DQuat::from_mat3(&rotation_mat).normalize());

    let translation = mu_d - scale * (rotation * mu_s);

    Similarity {
        rotation,
        translation,
        scale,
    }
}

/// Scale that best maps the estimated positions onto the ground truth positions.
pub fn estimate_scale(gt: &Trajectory, est: &Trajectory) -> Result<f64, AlignmentError> {
    check_inputs(gt, est, 2)?;
    let sim = umeyama(&est.positions(), &gt.positions(), true);
    log::debug!("estimated scale {:.6}", sim.scale);
    Ok(sim.scale)
}

/// Align the estimate onto the ground truth with Horn's method on the positions.
pub fn align_horn(
    gt: &Trajectory,
    est: &Trajectory,
    config: &HornConfig,
) -> Result<AlignmentResult, AlignmentError> {
    check_inputs(gt, est, 2)?;

    let sim = umeyama(&est.positions(), &gt.positions(), config.estimate_scale);
    let transform = AlignmentTransform {
        transform: SE3::new(sim.rotation, sim.translation),
        scale: sim.scale,
    };

    let t = sim.translation;
    log::debug!(
        "horn alignment: angle {:.6} rad, translation [{:.6}, {:.6}, {:.6}], scale {:.6}",
        sim.rotation.angle(),
        t.x,
        t.y,
        t.z,
        sim.scale
    );

    Ok(AlignmentResult {
        gt: gt.clone(),
        est: transform.apply(est),
        transform,
        convergence: None,
    })
}
