//! Math type aliases and helper functions.
//!
//! Rendering math is always `f32`. Projections follow the depth range
//! [0, 1] convention.

pub use nalgebra;

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32). Also used for planes as `(normal, distance)`.
pub type Vec4 = nalgebra::Vector4<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Build a right-handed perspective projection with depth range [0, 1].
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

/// Right-handed look-at view matrix.
pub fn look_at_rh(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    let eye_point = nalgebra::Point3::from(*eye);
    let target_point = nalgebra::Point3::from(*target);
    nalgebra::Isometry3::look_at_rh(&eye_point, &target_point, up).to_homogeneous()
}

/// Plane through `point` with the given normal, as `(n.x, n.y, n.z, d)`
/// with unit normal and `dot(n, p) + d = 0` on the plane.
pub fn plane_from_point_normal(point: &Vec3, normal: &Vec3) -> Vec4 {
    let n = normal.normalize();
    Vec4::new(n.x, n.y, n.z, -n.dot(point))
}

/// Signed distance from `point` to a normalized `plane`.
pub fn plane_distance(plane: &Vec4, point: &Vec3) -> f32 {
    plane.xyz().dot(point) + plane.w
}

/// Mirror a point across a normalized plane.
pub fn reflect_point(plane: &Vec4, point: &Vec3) -> Vec3 {
    point - plane.xyz() * (2.0 * plane_distance(plane, point))
}

/// Mirror a direction across a normalized plane.
pub fn reflect_vector(plane: &Vec4, v: &Vec3) -> Vec3 {
    let n = plane.xyz();
    v - n * (2.0 * n.dot(v))
}

/// Element `index` (1-based) of the Halton low-discrepancy sequence in `base`.
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0f32;
    let mut result = 0.0f32;
    while index > 0 {
        f /= base as f32;
        result += f * (index % base) as f32;
        index /= base;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perspective_maps_near_to_zero() {
        let p = perspective_rh(1.0, 1.0, 0.1, 100.0);
        let near = p * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = p * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_reflect_across_ground_plane() {
        let plane = plane_from_point_normal(&Vec3::new(0.0, 2.0, 0.0), &Vec3::new(0.0, 1.0, 0.0));
        let p = reflect_point(&plane, &Vec3::new(1.0, 5.0, 3.0));
        assert!((p - Vec3::new(1.0, -1.0, 3.0)).norm() < 1e-5);

        let v = reflect_vector(&plane, &Vec3::new(0.0, -1.0, 1.0));
        assert!((v - Vec3::new(0.0, 1.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_plane_distance_sign() {
        let plane = plane_from_point_normal(&Vec3::zeros(), &Vec3::new(0.0, 0.0, 2.0));
        assert!((plane_distance(&plane, &Vec3::new(0.0, 0.0, 3.0)) - 3.0).abs() < 1e-6);
        assert!(plane_distance(&plane, &Vec3::new(0.0, 0.0, -1.0)) < 0.0);
    }

    #[test]
    fn test_halton_sequence() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(halton(0, 2), 0.0);
    }
}
