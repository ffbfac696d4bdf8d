//! # SO(3): rotations in 3D
//!
//! Rotations are stored as unit quaternions. A unit quaternion lives in SU(2), the double
//! cover of SO(3), so `q` and `-q` describe the same rotation. The logarithm always returns
//! the principal branch, i.e. a rotation vector whose norm lies in `[0, π]`.
//!
//! The left Jacobian and its inverse are provided because they are the building blocks
//! of the SE(3) exponential/logarithm and of the Jacobians used by tangent-space solvers.
//! All maps switch to Taylor expansions below [`SMALL_ANGLE_EPSILON`].

use glam::{DMat3, DQuat, DVec3};
use rand::Rng;

use crate::LieError;

/// Angle below which the closed forms are replaced by their Taylor expansions.
pub const SMALL_ANGLE_EPSILON: f64 = 1.0e-5;

/// Tolerance used to validate that a matrix is a proper rotation.
pub const ROTATION_TOLERANCE: f64 = 1.0e-6;

/// A 3D rotation, stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3 {
    /// The unit quaternion.
    pub q: DQuat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// Create a new rotation from a quaternion.
    /// NOTE: quaternion should be normalized
    #[inline]
    pub fn new(q: DQuat) -> Self {
        Self { q }
    }

    /// Create a rotation from the quaternion coefficients in `x, y, z, w` order.
    ///
    /// The quaternion is normalized. Zero-norm or non-finite inputs are rejected.
    pub fn from_xyzw(x: f64, y: f64, z: f64, w: f64) -> Result<Self, LieError> {
        let q = DQuat::from_xyzw(x, y, z, w);
        let norm = q.length();
        if !norm.is_finite() || norm < f64::EPSILON {
            return Err(LieError::InvalidQuaternion([x, y, z, w]));
        }
        Ok(Self { q: q / norm })
    }

    /// Create a rotation from a 3x3 rotation matrix.
    ///
    /// The matrix must be orthonormal with determinant +1 within [`ROTATION_TOLERANCE`].
    pub fn from_matrix(mat: &DMat3) -> Result<Self, LieError> {
        let gram = mat.transpose() * *mat;
        let orthonormality_error = (gram - DMat3::IDENTITY)
            .to_cols_array()
            .iter()
            .fold(0.0f64, |acc, x| acc.max(x.abs()));
        let det = mat.determinant();

        if !orthonormality_error.is_finite()
            || orthonormality_error > ROTATION_TOLERANCE
            || (det - 1.0).abs() > ROTATION_TOLERANCE
        {
            return Err(LieError::InvalidRotation {
                orthonormality_error,
                determinant: det,
            });
        }

        Ok(Self {
            q: DQuat::from_mat3(mat).normalize(),
        })
    }

    /// Create a rotation of `angle` radians about `axis`.
    pub fn from_axis_angle(axis: DVec3, angle: f64) -> Self {
        Self {
            q: DQuat::from_axis_angle(axis.normalize(), angle),
        }
    }

    /// Sample a rotation uniformly at random (Shoemake method).
    pub fn from_random() -> Self {
        let mut rng = rand::rng();

        let r1: f64 = rng.random();
        let r2: f64 = rng.random();
        let r3: f64 = rng.random();

        let one_minus_r1_sqrt = (1.0 - r1).sqrt();
        let r1_sqrt = r1.sqrt();

        let w = one_minus_r1_sqrt * (2.0 * std::f64::consts::PI * r2).cos();
        let x = one_minus_r1_sqrt * (2.0 * std::f64::consts::PI * r2).sin();
        let y = r1_sqrt * (2.0 * std::f64::consts::PI * r3).cos();
        let z = r1_sqrt * (2.0 * std::f64::consts::PI * r3).sin();

        Self {
            q: DQuat::from_xyzw(x, y, z, w).normalize(),
        }
    }

    /// The 3x3 rotation matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// The adjoint of a rotation is the rotation matrix itself.
    pub fn adjoint(&self) -> DMat3 {
        self.matrix()
    }

    /// The inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Rotation angle in radians, in `[0, π]`.
    pub fn angle(&self) -> f64 {
        self.log().length()
    }

    /// Lie algebra -> Lie group
    pub fn exp(v: DVec3) -> Self {
        let theta_sq = v.dot(v);
        let theta = theta_sq.sqrt();

        let (w, b) = if theta < SMALL_ANGLE_EPSILON {
            // taylor expansion of cos(x/2) and sin(x/2)/x around 0
            (1.0 - theta_sq / 8.0, 0.5 - theta_sq / 48.0)
        } else {
            let theta_half = 0.5 * theta;
            (theta_half.cos(), theta_half.sin() / theta)
        };

        let xyz = b * v;

        Self {
            q: DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, w).normalize(),
        }
    }

    /// Lie group -> Lie algebra, principal branch.
    pub fn log(&self) -> DVec3 {
        let mut w = self.q.w;
        let mut vec = DVec3::new(self.q.x, self.q.y, self.q.z);

        // pick the hemisphere with w >= 0 so that the angle stays in [0, pi]
        if w < 0.0 {
            w = -w;
            vec = -vec;
        }

        let sin_half = vec.length();
        let half_theta = sin_half.atan2(w);

        if half_theta < 0.5 * SMALL_ANGLE_EPSILON {
            // 2 * atan(s / w) / s ~ (2 / w) * (1 - s^2 / (3 w^2))
            let scale = (2.0 / w) * (1.0 - sin_half * sin_half / (3.0 * w * w));
            vec * scale
        } else {
            vec * (2.0 * half_theta / sin_half)
        }
    }

    /// Vector space -> Lie algebra
    pub fn hat(v: DVec3) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(0.0, v.z, -v.y),
            DVec3::new(-v.z, 0.0, v.x),
            DVec3::new(v.y, -v.x, 0.0),
        )
    }

    /// Lie algebra -> vector space
    pub fn vee(omega: DMat3) -> DVec3 {
        DVec3::new(omega.y_axis.z, omega.z_axis.x, omega.x_axis.y)
    }

    /// Left Jacobian of SO(3), `J_l(v) = I + (1 - cos θ)/θ² [v]x + (θ - sin θ)/θ³ [v]x²`.
    pub fn left_jacobian(v: DVec3) -> DMat3 {
        let skew = Self::hat(v);
        let theta_sq = v.dot(v);
        let theta = theta_sq.sqrt();

        let (a, b) = if theta < SMALL_ANGLE_EPSILON {
            (0.5 - theta_sq / 24.0, 1.0 / 6.0 - theta_sq / 120.0)
        } else {
            let sin_half = (0.5 * theta).sin();
            (
                2.0 * sin_half * sin_half / theta_sq,
                (theta - theta.sin()) / (theta_sq * theta),
            )
        };

        DMat3::IDENTITY + skew * a + (skew * skew) * b
    }

    /// Inverse of the left Jacobian of SO(3).
    pub fn left_jacobian_inverse(v: DVec3) -> DMat3 {
        let skew = Self::hat(v);
        let theta_sq = v.dot(v);
        let theta = theta_sq.sqrt();

        let c = if theta < SMALL_ANGLE_EPSILON {
            1.0 / 12.0 + theta_sq / 720.0
        } else {
            // theta sin(theta) / (2 (1 - cos(theta))) == (theta / 2) cot(theta / 2)
            let half_theta = 0.5 * theta;
            (1.0 - half_theta * half_theta.cos() / half_theta.sin()) / theta_sq
        };

        DMat3::IDENTITY - skew * 0.5 + (skew * skew) * c
    }

    /// Right Jacobian of SO(3), `J_r(v) = J_l(-v)`.
    pub fn right_jacobian(v: DVec3) -> DMat3 {
        Self::left_jacobian(-v)
    }

    /// Roll, pitch and yaw (rotations about X, Y and Z) for the `R = Rz(yaw) Ry(pitch) Rx(roll)`
    /// convention.
    pub fn to_rpy(&self) -> [f64; 3] {
        let r = self.matrix();
        // glam matrices are column major: r.col(c)[row]
        let r00 = r.x_axis.x;
        let r10 = r.x_axis.y;
        let r20 = r.x_axis.z;
        let r21 = r.y_axis.z;
        let r22 = r.z_axis.z;

        let roll = r21.atan2(r22);
        let pitch = (-r20).atan2((r21 * r21 + r22 * r22).sqrt());
        let yaw = r10.atan2(r00);
        [roll, pitch, yaw]
    }
}

impl std::ops::Mul<SO3> for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            q: (self.q * rhs.q).normalize(),
        }
    }
}

impl std::ops::MulAssign<SO3> for SO3 {
    #[inline]
    fn mul_assign(&mut self, rhs: SO3) {
        *self = *self * rhs;
    }
}

impl std::ops::Mul<DVec3> for SO3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.q * rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-12;

    fn assert_mat3_eq(a: &DMat3, b: &DMat3, epsilon: f64) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert_relative_eq!(*x, *y, epsilon = epsilon);
        }
    }

    #[test]
    fn test_identity() {
        let s = SO3::IDENTITY;
        assert_eq!(s.q, DQuat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        assert_relative_eq!(s.log().length(), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_from_xyzw_normalizes() -> Result<(), LieError> {
        let s = SO3::from_xyzw(0.0, 0.0, 2.0, 2.0)?;
        assert_relative_eq!(s.q.length(), 1.0, epsilon = EPSILON);
        assert_relative_eq!(s.angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_from_xyzw_rejects_zero() {
        assert!(matches!(
            SO3::from_xyzw(0.0, 0.0, 0.0, 0.0),
            Err(LieError::InvalidQuaternion(_))
        ));
    }

    #[test]
    fn test_from_matrix() -> Result<(), LieError> {
        let mat = DMat3::from_cols_array(&[1.0, 0.0, 0.0, 0.0, 0.6, 0.8, 0.0, -0.8, 0.6]);
        let s = SO3::from_matrix(&mat)?;
        assert_mat3_eq(&s.matrix(), &mat, 1e-12);
        Ok(())
    }

    #[test]
    fn test_from_matrix_rejects_reflection() {
        let mat = DMat3::from_diagonal(DVec3::new(1.0, 1.0, -1.0));
        assert!(matches!(
            SO3::from_matrix(&mat),
            Err(LieError::InvalidRotation { .. })
        ));
    }

    #[test]
    fn test_from_matrix_rejects_scaled() {
        let mat = DMat3::from_diagonal(DVec3::splat(1.1));
        assert!(SO3::from_matrix(&mat).is_err());
    }

    #[test]
    fn test_exp_log() {
        let test_vectors = [
            DVec3::new(0.1, 0.2, 0.3),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 3.0),
            DVec3::new(-0.5, 0.3, -0.2),
            DVec3::new(1e-9, -2e-9, 5e-10),
        ];

        for v in test_vectors.iter() {
            let log = SO3::exp(*v).log();
            assert_relative_eq!(log.x, v.x, epsilon = 1e-12);
            assert_relative_eq!(log.y, v.y, epsilon = 1e-12);
            assert_relative_eq!(log.z, v.z, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_principal_branch() {
        // 3pi/2 about z is the same rotation as -pi/2 about z
        let s = SO3::from_axis_angle(DVec3::Z, 1.5 * std::f64::consts::PI);
        let log = s.log();
        assert!(log.length() <= std::f64::consts::PI + 1e-12);
        assert_relative_eq!(log.z, -std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_hat_vee() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        let hat_v = SO3::hat(v);
        assert_relative_eq!(hat_v.x_axis.y, 3.0);
        assert_relative_eq!(hat_v.x_axis.z, -2.0);
        assert_relative_eq!(hat_v.y_axis.x, -3.0);
        assert_relative_eq!(hat_v.y_axis.z, 1.0);
        assert_relative_eq!(hat_v.z_axis.x, 2.0);
        assert_relative_eq!(hat_v.z_axis.y, -1.0);
        assert_eq!(SO3::vee(hat_v), v);

        // hat(v) * w = v x w
        let w = DVec3::new(-0.4, 0.9, 0.2);
        let cross = hat_v * w;
        assert_relative_eq!((cross - v.cross(w)).length(), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_matrix_orthonormal() {
        for _ in 0..10 {
            let r = SO3::from_random().matrix();
            assert_mat3_eq(&(r.transpose() * r), &DMat3::IDENTITY, 1e-12);
            assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverse() {
        let s = SO3::exp(DVec3::new(0.5, -0.2, 0.1));
        let identity = s * s.inverse();
        assert_relative_eq!(identity.angle(), 0.0, epsilon = 1e-12);
        assert_mat3_eq(&s.inverse().matrix(), &s.matrix().transpose(), 1e-12);
    }

    #[test]
    fn test_mul_vec() {
        let s = SO3::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2);
        let v = s * DVec3::X;
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_left_jacobian_inverse() {
        let test_vectors = [
            DVec3::new(0.1, 0.2, 0.3),
            DVec3::new(1e-7, 0.0, -1e-7),
            DVec3::new(2.0, -0.5, 0.7),
        ];
        for v in test_vectors.iter() {
            let product = SO3::left_jacobian(*v) * SO3::left_jacobian_inverse(*v);
            assert_mat3_eq(&product, &DMat3::IDENTITY, 1e-10);

            // J_l(v) v = v
            let jv = SO3::left_jacobian(*v) * *v;
            assert_relative_eq!((jv - *v).length(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_left_jacobian_finite_difference() {
        // exp(v + dv) ~ exp(J_l(v) dv) exp(v)
        let v = DVec3::new(0.3, -0.4, 0.8);
        let dv = DVec3::new(1e-6, -2e-6, 1.5e-6);
        let lhs = SO3::exp(v + dv);
        let rhs = SO3::exp(SO3::left_jacobian(v) * dv) * SO3::exp(v);
        assert_relative_eq!((lhs.inverse() * rhs).angle(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rpy() {
        let roll = 0.1;
        let pitch = -0.3;
        let yaw = 1.2;
        let r = SO3::from_axis_angle(DVec3::Z, yaw)
            * SO3::from_axis_angle(DVec3::Y, pitch)
            * SO3::from_axis_angle(DVec3::X, roll);
        let rpy = r.to_rpy();
        assert_relative_eq!(rpy[0], roll, epsilon = 1e-12);
        assert_relative_eq!(rpy[1], pitch, epsilon = 1e-12);
        assert_relative_eq!(rpy[2], yaw, epsilon = 1e-12);
    }
}
