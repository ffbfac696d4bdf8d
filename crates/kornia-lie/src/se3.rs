//! # SE(3): rigid body transformations in 3D
//!
//! An element of SE(3) is a rotation followed by a translation, acting on points as
//! `x' = R x + t`. The tangent space se(3) is parameterised by 6-vectors `[upsilon; omega]`
//! where `omega` is the rotation vector and `upsilon` the translational velocity.
//!
//! The exponential map couples both parts through the left Jacobian of SO(3):
//!
//! ```text
//! exp([upsilon; omega]) = ( exp(omega), J_l(omega) upsilon )
//! ```
//!
//! Uncertainty is expressed in the local tangent space of a pose, i.e. a pose `T` with
//! covariance `S` is the distribution of `T exp(e)` with `e ~ N(0, S)`. Moving the
//! perturbation to the other side of `T` is a linear map given by the adjoint, which is
//! what [`SE3::propagate_covariance`] applies (first order transport).

use glam::{DMat3, DMat4, DVec3, DVec4};
use nalgebra::Matrix3;

use crate::convert::{dmat3_to_matrix3, omega, to_vector6, upsilon};
use crate::so3::SO3;
use crate::{LieError, Matrix6, Vector6};

/// Tolerance used to validate the last row of homogeneous matrices.
const HOMOGENEOUS_TOLERANCE: f64 = 1.0e-9;

/// Angle below which the coupling block of the Jacobian uses its Taylor expansion.
const Q_SERIES_THRESHOLD: f64 = 0.1;

/// A rigid body transformation in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    /// Rotation component.
    pub rotation: SO3,
    /// Translation component.
    pub translation: DVec3,
}

impl Default for SE3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SE3 {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        rotation: SO3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a new transformation from a rotation and a translation.
    pub fn new(rotation: SO3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pure translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self::new(SO3::IDENTITY, translation)
    }

    /// Create a transformation from a quaternion `[x, y, z, w]` and a translation.
    ///
    /// The quaternion is normalized; zero-norm or non-finite values are rejected.
    pub fn from_qxyz(quat: [f64; 4], translation: DVec3) -> Result<Self, LieError> {
        if !translation.is_finite() {
            return Err(LieError::NonFinite("translation"));
        }
        let rotation = SO3::from_xyzw(quat[0], quat[1], quat[2], quat[3])?;
        Ok(Self::new(rotation, translation))
    }

    /// Create a transformation from a 4x4 homogeneous matrix.
    ///
    /// The rotation block must be a proper rotation and the last row `[0 0 0 1]`.
    pub fn from_matrix(mat: &DMat4) -> Result<Self, LieError> {
        let last_row = [mat.x_axis.w, mat.y_axis.w, mat.z_axis.w, mat.w_axis.w];
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last_row
            .iter()
            .zip(expected.iter())
            .any(|(a, b)| !((a - b).abs() <= HOMOGENEOUS_TOLERANCE))
        {
            return Err(LieError::InvalidHomogeneousRow(last_row));
        }

        let translation = mat.w_axis.truncate();
        if !translation.is_finite() {
            return Err(LieError::NonFinite("translation"));
        }

        let rotation = SO3::from_matrix(&DMat3::from_mat4(*mat))?;
        Ok(Self::new(rotation, translation))
    }

    /// Sample a random transformation with a uniformly distributed rotation and a
    /// translation drawn from `[-1, 1)^3`.
    pub fn from_random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let translation = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        Self::new(SO3::from_random(), translation)
    }

    /// The 4x4 homogeneous matrix.
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation.q, self.translation)
    }

    /// The 3x3 rotation matrix.
    pub fn rotation_matrix(&self) -> DMat3 {
        self.rotation.matrix()
    }

    /// The inverse transformation.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        Self {
            rotation: inv_rot,
            translation: -(inv_rot * self.translation),
        }
    }

    /// Composition `self * other`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// Apply the transformation to a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// `self * exp(tau)`
    #[inline]
    pub fn rplus(&self, tau: &Vector6) -> Self {
        *self * SE3::exp(tau)
    }

    /// `log(self^-1 * other)`
    #[inline]
    pub fn rminus(&self, other: &Self) -> Vector6 {
        (self.inverse() * *other).log()
    }

    /// `exp(tau) * x`
    #[inline]
    pub fn lplus(tau: &Vector6, x: &Self) -> Self {
        SE3::exp(tau) * *x
    }

    /// `log(y * x^-1)`
    #[inline]
    pub fn lminus(y: &Self, x: &Self) -> Vector6 {
        (*y * x.inverse()).log()
    }

    /// Lie algebra -> Lie group
    pub fn exp(xi: &Vector6) -> Self {
        let rho = upsilon(xi);
        let phi = omega(xi);
        Self {
            rotation: SO3::exp(phi),
            translation: SO3::left_jacobian(phi) * rho,
        }
    }

    /// Lie group -> Lie algebra, principal branch (rotation angle in `[0, π]`).
    pub fn log(&self) -> Vector6 {
        let phi = self.rotation.log();
        let rho = SO3::left_jacobian_inverse(phi) * self.translation;
        to_vector6(rho, phi)
    }

    /// Vector space -> Lie algebra, as a 4x4 matrix.
    pub fn hat(xi: &Vector6) -> DMat4 {
        let omega_hat = SO3::hat(omega(xi));
        let rho = upsilon(xi);
        DMat4::from_cols(
            omega_hat.x_axis.extend(0.0),
            omega_hat.y_axis.extend(0.0),
            omega_hat.z_axis.extend(0.0),
            DVec4::new(rho.x, rho.y, rho.z, 0.0),
        )
    }

    /// Lie algebra -> vector space
    pub fn vee(omega_hat: DMat4) -> Vector6 {
        let rot = SO3::vee(DMat3::from_mat4(omega_hat));
        to_vector6(omega_hat.w_axis.truncate(), rot)
    }

    /// The 6x6 adjoint `[[R, [t]x R], [0, R]]`.
    ///
    /// Satisfies `T exp(xi) T^-1 == exp(Ad(T) xi)`.
    pub fn adjoint(&self) -> Matrix6 {
        let r = self.rotation.matrix();
        let t_hat_r = SO3::hat(self.translation) * r;

        let r_na = dmat3_to_matrix3(&r);
        let mut adj = Matrix6::zeros();
        adj.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_na);
        adj.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&dmat3_to_matrix3(&t_hat_r));
        adj.fixed_view_mut::<3, 3>(3, 3).copy_from(&r_na);
        adj
    }

    /// First order transport of a covariance, `Ad(T) S Ad(T)^T`.
    ///
    /// If `S` is the covariance of a perturbation applied on the right of `T`, the result is
    /// the covariance of the equivalent perturbation applied on the left.
    pub fn propagate_covariance(&self, covariance: &Matrix6) -> Matrix6 {
        let adj = self.adjoint();
        adj * covariance * adj.transpose()
    }

    /// Left Jacobian of SE(3).
    ///
    /// `exp(xi + d) ~ exp(J_l(xi) d) exp(xi)` for small `d`.
    pub fn left_jacobian(xi: &Vector6) -> Matrix6 {
        let phi = omega(xi);
        let j = dmat3_to_matrix3(&SO3::left_jacobian(phi));
        let q = dmat3_to_matrix3(&q_matrix(upsilon(xi), phi));

        let mut jac = Matrix6::zeros();
        jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&j);
        jac.fixed_view_mut::<3, 3>(0, 3).copy_from(&q);
        jac.fixed_view_mut::<3, 3>(3, 3).copy_from(&j);
        jac
    }

    /// Inverse of the left Jacobian of SE(3).
    pub fn left_jacobian_inverse(xi: &Vector6) -> Matrix6 {
        let phi = omega(xi);
        let j_inv = dmat3_to_matrix3(&SO3::left_jacobian_inverse(phi));
        let q = dmat3_to_matrix3(&q_matrix(upsilon(xi), phi));
        let off_diagonal: Matrix3<f64> = -(j_inv * q * j_inv);

        let mut jac = Matrix6::zeros();
        jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&j_inv);
        jac.fixed_view_mut::<3, 3>(0, 3).copy_from(&off_diagonal);
        jac.fixed_view_mut::<3, 3>(3, 3).copy_from(&j_inv);
        jac
    }

    /// Right Jacobian of SE(3), `J_r(xi) = J_l(-xi)`.
    pub fn right_jacobian(xi: &Vector6) -> Matrix6 {
        Self::left_jacobian(&(-xi))
    }
}

/// The coupling block of the SE(3) left Jacobian (Barfoot, "State Estimation for Robotics").
fn q_matrix(rho: DVec3, phi: DVec3) -> DMat3 {
    let rx = SO3::hat(rho);
    let px = SO3::hat(phi);
    let theta_sq = phi.dot(phi);
    let theta = theta_sq.sqrt();

    // the closed forms of c2 and c3 cancel catastrophically well above SMALL_ANGLE_EPSILON
    let (c1, c2, c3) = if theta < Q_SERIES_THRESHOLD {
        let theta_4 = theta_sq * theta_sq;
        (
            1.0 / 6.0 - theta_sq / 120.0 + theta_4 / 5040.0,
            1.0 / 24.0 - theta_sq / 720.0 + theta_4 / 40320.0,
            1.0 / 120.0 - theta_sq / 2520.0 + theta_4 / 120960.0,
        )
    } else {
        let (s, c) = theta.sin_cos();
        let theta_4 = theta_sq * theta_sq;
        (
            (theta - s) / (theta_sq * theta),
            (theta_sq + 2.0 * c - 2.0) / (2.0 * theta_4),
            (2.0 * theta - 3.0 * s + theta * c) / (2.0 * theta_4 * theta),
        )
    };

    let px_rx = px * rx;
    let rx_px = rx * px;
    let px_rx_px = px_rx * px;
    let px_px = px * px;

    rx * 0.5
        + (px_rx + rx_px + px_rx_px) * c1
        + (px_px * rx + rx_px * px - px_rx_px * 3.0) * c2
        + (px_rx_px * px + px_px * rx * px) * c3
}

impl std::ops::Mul<SE3> for SE3 {
    type Output = SE3;

    fn mul(self, rhs: SE3) -> Self::Output {
        self.compose(&rhs)
    }
}

impl std::ops::MulAssign<SE3> for SE3 {
    #[inline]
    fn mul_assign(&mut self, rhs: SE3) {
        *self = *self * rhs;
    }
}

impl std::ops::Mul<DVec3> for SE3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.transform_point(rhs)
    }
}
