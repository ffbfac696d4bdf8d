use glam::{DMat3, DVec3};
use nalgebra::{Matrix3, Vector3};

use crate::Vector6;

/// Convert a glam matrix into a nalgebra matrix.
pub fn dmat3_to_matrix3(m: &DMat3) -> Matrix3<f64> {
    // both are column major
    Matrix3::from_column_slice(&m.to_cols_array())
}

/// Convert a nalgebra matrix into a glam matrix.
pub fn matrix3_to_dmat3(m: &Matrix3<f64>) -> DMat3 {
    let mut cols = [0.0; 9];
    cols.copy_from_slice(m.as_slice());
    DMat3::from_cols_array(&cols)
}

/// Convert a glam vector into a nalgebra vector.
pub fn dvec3_to_vector3(v: DVec3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

/// Convert a nalgebra vector into a glam vector.
pub fn vector3_to_dvec3(v: &Vector3<f64>) -> DVec3 {
    DVec3::new(v.x, v.y, v.z)
}

/// Stack the translational and rotational parts into a tangent vector.
pub fn to_vector6(upsilon: DVec3, omega: DVec3) -> Vector6 {
    Vector6::new(upsilon.x, upsilon.y, upsilon.z, omega.x, omega.y, omega.z)
}

/// Translational part of a tangent vector.
pub fn upsilon(xi: &Vector6) -> DVec3 {
    DVec3::new(xi[0], xi[1], xi[2])
}

/// Rotational part of a tangent vector.
pub fn omega(xi: &Vector6) -> DVec3 {
    DVec3::new(xi[3], xi[4], xi[5])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat3_roundtrip_keeps_layout() {
        let m = DMat3::from_cols(
            DVec3::new(1.0, 2.0, 3.0),
            DVec3::new(4.0, 5.0, 6.0),
            DVec3::new(7.0, 8.0, 9.0),
        );
        let na = dmat3_to_matrix3(&m);
        // row 1, column 0
        assert_eq!(na[(1, 0)], 2.0);
        assert_eq!(na[(0, 2)], 7.0);
        assert_eq!(matrix3_to_dmat3(&na), m);
    }

    #[test]
    fn test_vector6_split() {
        let xi = to_vector6(DVec3::new(1.0, 2.0, 3.0), DVec3::new(4.0, 5.0, 6.0));
        assert_eq!(upsilon(&xi), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(omega(&xi), DVec3::new(4.0, 5.0, 6.0));
    }
}
