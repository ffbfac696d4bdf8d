#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Lie Groups
//!
//! Double precision implementations of the 3D rotation and rigid body groups used to
//! compare and align trajectories.
//!
//! ## Supported Groups
//!
//! - **SO(3)**: 3D rotation group
//! - **SE(3)**: 3D rigid body transformations (rotation + translation)
//!
//! Tangent vectors of SE(3) are 6-vectors ordered `[upsilon; omega]`: translational part
//! first, rotational part last. The same order is used by the 6x6 adjoint, the Jacobians
//! and every covariance propagated through [`se3::SE3::propagate_covariance`].
//!
//! ## Example
//!
//! ```rust
//! use kornia_lie::{se3::SE3, so3::SO3, Vector6};
//! use glam::DVec3;
//!
//! let pose = SE3::new(SO3::from_axis_angle(DVec3::Z, 0.3), DVec3::new(1.0, 2.0, 3.0));
//! let xi: Vector6 = pose.log();
//! let recovered = SE3::exp(&xi);
//! assert!((recovered.translation - pose.translation).length() < 1e-12);
//! ```

/// Conversions between the glam and nalgebra representations.
pub mod convert;

/// Special Euclidean group SE(3) for 3D rigid transformations.
pub mod se3;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;

/// A tangent vector of SE(3), `[upsilon; omega]`.
pub type Vector6 = nalgebra::Vector6<f64>;

/// A linear map on the tangent space of SE(3), e.g. an adjoint or a covariance.
pub type Matrix6 = nalgebra::Matrix6<f64>;

/// Error types for the Lie group constructors.
#[derive(Debug, thiserror::Error)]
pub enum LieError {
    /// The quaternion has zero or non-finite norm.
    #[error("Invalid quaternion (x, y, z, w) = {0:?}")]
    InvalidQuaternion([f64; 4]),

    /// The rotation block is not orthonormal with determinant +1.
    #[error(
        "Invalid rotation matrix: orthonormality error {orthonormality_error:e}, determinant {determinant}"
    )]
    InvalidRotation {
        /// Largest absolute entry of `R^T R - I`.
        orthonormality_error: f64,
        /// Determinant of the rotation block.
        determinant: f64,
    },

    /// The homogeneous matrix does not have `[0 0 0 1]` as last row.
    #[error("Invalid homogeneous matrix: last row is {0:?}")]
    InvalidHomogeneousRow([f64; 4]),

    /// A value is not finite.
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}
