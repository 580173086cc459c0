//! Math type aliases and helpers used when packing GPU data.
//!
//! All matrices are `nalgebra` column-major values; the GPU records the HLMS
//! writes are row-major, so the `*_rows` helpers flatten row by row.

pub use nalgebra;

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 3x3 matrix (f32).
pub type Mat3 = nalgebra::Matrix3<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Quaternion (f32).
pub type Quat = nalgebra::UnitQuaternion<f32>;

/// Flatten a 4x4 matrix row by row.
pub fn mat4_rows(m: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    for row in 0..4 {
        for col in 0..4 {
            out[row * 4 + col] = m[(row, col)];
        }
    }
    out
}

/// The first three rows of an affine matrix, row by row.
pub fn mat4x3_rows(m: &Mat4) -> [f32; 12] {
    let mut out = [0.0; 12];
    for row in 0..3 {
        for col in 0..4 {
            out[row * 4 + col] = m[(row, col)];
        }
    }
    out
}

/// Upper-left 3x3 block of a 4x4 matrix.
pub fn mat4_linear(m: &Mat4) -> Mat3 {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// `a * b` treating both as affine transforms (last row `0 0 0 1`).
pub fn concatenate_affine(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = a * b;
    out[(3, 0)] = 0.0;
    out[(3, 1)] = 0.0;
    out[(3, 2)] = 0.0;
    out[(3, 3)] = 1.0;
    out
}

/// Transform a point by an affine matrix.
pub fn transform_affine(m: &Mat4, p: &Vec3) -> Vec3 {
    let v = m * Vec4::new(p.x, p.y, p.z, 1.0);
    Vec3::new(v.x, v.y, v.z)
}

/// Inverse of an affine transform. A singular linear part inverts to the identity.
pub fn inverse_affine(m: &Mat4) -> Mat4 {
    let linear = mat4_linear(m).try_inverse().unwrap_or_else(Mat3::identity);
    let translation = -(linear * Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]));
    let mut out = Mat4::identity();
    out.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
    out[(0, 3)] = translation.x;
    out[(1, 3)] = translation.y;
    out[(2, 3)] = translation.z;
    out
}

/// Right-handed look-at view matrix.
pub fn look_at_rh(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    let eye_point = nalgebra::Point3::from(*eye);
    let target_point = nalgebra::Point3::from(*target);
    nalgebra::Isometry3::look_at_rh(&eye_point, &target_point, up).to_homogeneous()
}

/// Right-handed perspective projection with depth range [0, 1].
pub fn perspective_rh(yfov: f32, aspect: f32, znear: f32, zfar: f32) -> Mat4 {
    let f = 1.0 / (yfov / 2.0).tan();
    let nf = 1.0 / (znear - zfar);
    #[rustfmt::skip]
    let result = Mat4::new(
        f / aspect, 0.0,  0.0,              0.0,
        0.0,        f,    0.0,              0.0,
        0.0,        0.0,  zfar * nf,        znear * zfar * nf,
        0.0,        0.0,  -1.0,             0.0,
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat4_rows_is_row_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let rows = mat4_rows(&m);
        assert_eq!(rows[3], 1.0);
        assert_eq!(rows[7], 2.0);
        assert_eq!(rows[11], 3.0);
        assert_eq!(rows[15], 1.0);
    }

    #[test]
    fn test_mat4x3_rows_drops_last_row() {
        let m = Mat4::new_translation(&Vec3::new(4.0, 5.0, 6.0));
        let rows = mat4x3_rows(&m);
        assert_eq!(rows, [1.0, 0.0, 0.0, 4.0, 0.0, 1.0, 0.0, 5.0, 0.0, 0.0, 1.0, 6.0]);
    }

    #[test]
    fn test_concatenate_affine() {
        let a = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));
        let b = Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0));
        let c = concatenate_affine(&a, &b);
        assert_eq!(transform_affine(&c, &Vec3::zeros()), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_inverse_affine() {
        let m = concatenate_affine(
            &Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)),
            &Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 2.0, 2.0)),
        );
        let p = Vec3::new(0.5, -1.0, 4.0);
        let back = transform_affine(&inverse_affine(&m), &transform_affine(&m, &p));
        assert!((back - p).norm() < 1e-5);
    }
}
