use crate::trajectory::Trajectory;

use super::{check_inputs, AlignmentError, AlignmentResult, AlignmentTransform};

/// Anchor both trajectories at their first matched pose.
///
/// Every ground truth pose becomes `gt_0^-1 * gt_i` and every estimated pose
/// `est_0^-1 * est_i`, so both trajectories start at the identity and are expressed in the
/// body frame of their first pose. The returned transform is `est_0^-1`, mapping the
/// estimate into that common frame.
pub fn align_first_pose(
    gt: &Trajectory,
    est: &Trajectory,
) -> Result<AlignmentResult, AlignmentError> {
    check_inputs(gt, est, 1)?;

    let (gt_0, est_0) = match (gt.first(), est.first()) {
        (Some((_, g)), Some((_, e))) => (*g, *e),
        _ => {
            return Err(AlignmentError::InsufficientData {
                got: 0,
                required: 1,
            })
        }
    };

    let transform = AlignmentTransform::rigid(est_0.inverse());

    Ok(AlignmentResult {
        gt: gt.transform(&gt_0.inverse()),
        est: transform.apply(est),
        transform,
        convergence: None,
    })
}
