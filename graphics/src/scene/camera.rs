//! Cameras and view frusta.

use lumen_core::math::{self, Mat4, Vec2, Vec3, Vec4};

use crate::types::Resolution;

/// Six normalized planes bounding a view volume. Normals point inwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract the planes of a [0, 1]-depth view-projection matrix.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let row = |i: usize| Vec4::new(m[(i, 0)], m[(i, 1)], m[(i, 2)], m[(i, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| {
            let len = p.xyz().norm();
            if len > 0.0 { p / len } else { p }
        });
        Self { planes }
    }

    /// Whether an axis-aligned box is at least partially inside.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Vec3::new(
                if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            math::plane_distance(plane, &positive) >= 0.0
        })
    }

    /// Whether a sphere is at least partially inside.
    pub fn intersects_sphere(&self, center: &Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| math::plane_distance(plane, center) >= -radius)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centered at `center` with half extents `half`.
    pub fn from_center(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// A perspective camera.
///
/// Setting the view or projection marks the camera dirty; consumers that
/// accumulate over frames (path tracing) reset when they observe it.
#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Layers this camera renders.
    pub layer_mask: u32,
    /// Sub-pixel projection offset in clip space.
    pub jitter: Vec2,
    /// Optional user clip plane (planar reflections).
    pub clip_plane: Option<Vec4>,
    /// Lens aperture for depth of field. Zero disables the effect.
    pub aperture_size: f32,
    /// Distance to the focal plane.
    pub focal_length: f32,
    resolution: Resolution,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    dirty: bool,
}

impl Camera {
    pub fn new(eye: Vec3, target: Vec3) -> Self {
        let mut camera = Self {
            eye,
            target,
            up: Vec3::y(),
            fov_y: std::f32::consts::FRAC_PI_3,
            z_near: 0.1,
            z_far: 1000.0,
            layer_mask: u32::MAX,
            jitter: Vec2::zeros(),
            clip_plane: None,
            aperture_size: 0.0,
            focal_length: 1.0,
            resolution: Resolution::new(1, 1),
            view: Mat4::identity(),
            projection: Mat4::identity(),
            view_projection: Mat4::identity(),
            dirty: true,
        };
        camera.update_transforms();
        camera
    }

    /// Move the camera.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        self.eye = eye;
        self.target = target;
        self.dirty = true;
        self.update_transforms();
    }

    /// Rebuild the projection for a render resolution.
    pub fn create_perspective(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        self.dirty = true;
        self.update_transforms();
    }

    /// Recompute matrices from the current parameters, including jitter.
    pub fn update_transforms(&mut self) {
        let aspect = if self.resolution.height == 0 {
            1.0
        } else {
            self.resolution.width as f32 / self.resolution.height as f32
        };
        self.view = math::look_at_rh(&self.eye, &self.target, &self.up);
        self.projection = math::perspective_rh(self.fov_y, aspect, self.z_near, self.z_far);
        self.projection[(0, 2)] += self.jitter.x;
        self.projection[(1, 2)] += self.jitter.y;
        self.view_projection = self.projection * self.view;
    }

    /// Mirror of this camera across `plane`, clipped to the plane.
    pub fn reflected(&self, plane: &Vec4) -> Self {
        let mut camera = self.clone();
        camera.eye = math::reflect_point(plane, &self.eye);
        camera.target = math::reflect_point(plane, &self.target);
        camera.up = math::reflect_vector(plane, &self.up);
        camera.clip_plane = Some(*plane);
        camera.update_transforms();
        camera
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 10.0), Vec3::zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros());
        camera.create_perspective(Resolution::new(1920, 1080));
        camera
    }

    #[test]
    fn test_frustum_contains_target() {
        let frustum = camera().frustum();
        let unit = Aabb::from_center(Vec3::zeros(), Vec3::repeat(0.5));
        assert!(frustum.intersects_aabb(&unit));
        assert!(frustum.intersects_sphere(&Vec3::zeros(), 0.1));
    }

    #[test]
    fn test_frustum_rejects_behind_and_far() {
        let frustum = camera().frustum();
        let behind = Aabb::from_center(Vec3::new(0.0, 0.0, 20.0), Vec3::repeat(0.5));
        let far = Aabb::from_center(Vec3::new(0.0, 0.0, -2000.0), Vec3::repeat(0.5));
        let side = Aabb::from_center(Vec3::new(500.0, 0.0, 0.0), Vec3::repeat(0.5));
        assert!(!frustum.intersects_aabb(&behind));
        assert!(!frustum.intersects_aabb(&far));
        assert!(!frustum.intersects_aabb(&side));
        assert!(!frustum.intersects_sphere(&Vec3::new(500.0, 0.0, 0.0), 1.0));
    }

    #[test]
    fn test_reflected_camera() {
        let mut camera = camera();
        camera.look_at(Vec3::new(0.0, 5.0, 10.0), Vec3::new(0.0, 0.0, 0.0));
        let plane = math::plane_from_point_normal(&Vec3::zeros(), &Vec3::y());
        let mirrored = camera.reflected(&plane);
        assert!((mirrored.eye - Vec3::new(0.0, -5.0, 10.0)).norm() < 1e-5);
        assert_eq!(mirrored.clip_plane, Some(plane));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut camera = camera();
        assert!(camera.is_dirty());
        camera.clear_dirty();
        assert!(!camera.is_dirty());
        camera.look_at(Vec3::new(1.0, 0.0, 10.0), Vec3::zeros());
        assert!(camera.is_dirty());
    }

    #[test]
    fn test_jitter_offsets_projection() {
        let mut camera = camera();
        let before = camera.projection()[(0, 2)];
        camera.jitter = Vec2::new(0.001, -0.002);
        camera.update_transforms();
        assert!((camera.projection()[(0, 2)] - before - 0.001).abs() < 1e-7);
    }
}
