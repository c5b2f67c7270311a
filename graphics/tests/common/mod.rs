//! Common utilities for render path integration tests.
//!
//! Tests run against the tracking device, parameterized over device
//! capability sets the way a renderer meets them in practice.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use lumen_core::jobs::JobSystem;
use lumen_core::math::Vec3;
use lumen_graphics::render_path::{FrameStatus, RenderPath3D, RenderStrategy};
use lumen_graphics::scene::{Aabb, ObjectFlags, Scene, SceneElement, SceneLight, SceneObject};
use lumen_graphics::scheduler::FrameReport;
use lumen_graphics::{DeviceCapabilities, GraphicsDevice, Resolution};

/// Initialize logging once for the test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Device Profiles
// ============================================================================

/// Device capability sets to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Rasterization only.
    Basic,
    /// Ray tracing and variable rate shading.
    Full,
}

impl Profile {
    pub fn capabilities(self) -> DeviceCapabilities {
        match self {
            Profile::Basic => DeviceCapabilities::default(),
            Profile::Full => DeviceCapabilities::full(),
        }
    }

    pub fn device(self) -> Arc<GraphicsDevice> {
        let name = match self {
            Profile::Basic => "Basic Adapter",
            Profile::Full => "Full Adapter",
        };
        GraphicsDevice::new(name, self.capabilities())
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A render path with its jobs and scene.
pub struct TestContext {
    pub device: Arc<GraphicsDevice>,
    pub jobs: JobSystem,
    pub scene: Scene,
    pub path: RenderPath3D,
}

impl TestContext {
    pub fn new(profile: Profile, strategy: RenderStrategy, width: u32, height: u32) -> Self {
        init_logging();
        let device = profile.device();
        let mut path = RenderPath3D::new(Arc::clone(&device), strategy);
        path.set_resolution(width, height);
        Self {
            device,
            jobs: JobSystem::new(2),
            scene: Scene::new(),
            path,
        }
    }

    /// Run `update` and, when ready, `render`. Returns whether a frame was submitted.
    pub fn frame(&mut self) -> bool {
        if self.path.update(&mut self.scene, 1.0 / 60.0, &self.jobs) != FrameStatus::Ready {
            return false;
        }
        self.path
            .render(&self.scene, &self.jobs)
            .expect("render failed")
            .is_some()
    }

    pub fn report(&self) -> &FrameReport {
        self.path.last_frame().expect("no frame submitted")
    }

    /// Resource names with their resolutions.
    pub fn snapshot(&self) -> BTreeMap<String, Resolution> {
        self.path.resource_snapshot()
    }
}

// ============================================================================
// Scenes
// ============================================================================

fn cube(center: Vec3, half: f32) -> Aabb {
    Aabb::new(center - Vec3::repeat(half), center + Vec3::repeat(half))
}

/// Opaque objects and lights in front of the default camera.
pub fn populate_basic(scene: &mut Scene) {
    for i in 0..8 {
        let x = i as f32 * 1.5 - 5.0;
        scene
            .objects
            .push(SceneObject::new(format!("box{i}"), cube(Vec3::new(x, 0.5, 0.0), 0.5)));
    }
    scene.lights.push(SceneLight::point(Vec3::new(0.0, 3.0, 2.0), 10.0));
    let mut volumetric = SceneLight::point(Vec3::new(2.0, 3.0, -1.0), 6.0);
    volumetric.volumetric = true;
    scene.lights.push(volumetric);
    scene.env_probes.push(SceneElement::new(cube(Vec3::zeros(), 10.0)));
}

/// Basic scene plus a water plane, a transparent object and particles.
pub fn populate_full(scene: &mut Scene) {
    populate_basic(scene);
    scene.objects.push(
        SceneObject::new(
            "water",
            Aabb::new(Vec3::new(-20.0, -0.1, -20.0), Vec3::new(20.0, 0.0, 20.0)),
        )
        .with_flags(ObjectFlags::PLANAR_REFLECTOR),
    );
    scene.objects.push(
        SceneObject::new("glass", cube(Vec3::new(0.0, 1.0, 3.0), 0.5)).with_flags(ObjectFlags::TRANSPARENT),
    );
    scene.emitters.push(SceneElement::new(cube(Vec3::new(1.0, 1.0, 1.0), 0.5)));
    scene.hairs.push(SceneElement::new(cube(Vec3::new(-1.0, 1.0, 1.0), 0.3)));
}

/// Enable every resource-backed feature the device supports.
pub fn enable_all_features(path: &mut RenderPath3D) {
    use lumen_graphics::render_path::AoMode;

    path.set_ao(AoMode::Ssao).unwrap();
    path.set_ssr_enabled(true).unwrap();
    path.set_ssgi_enabled(true).unwrap();
    path.set_raytraced_diffuse_enabled(true).unwrap();
    path.set_motion_blur_enabled(true).unwrap();
    path.set_depth_of_field_enabled(true).unwrap();
    path.set_eye_adaption_enabled(true).unwrap();
    path.set_reflections_enabled(true).unwrap();
    path.set_bloom_enabled(true).unwrap();
    path.set_volume_lights_enabled(true).unwrap();
    path.set_light_shafts_enabled(true).unwrap();
    path.set_outline_enabled(true).unwrap();

    let renderer = path.renderer_mut();
    renderer.shadows = true;
    renderer.screen_space_shadows = true;
    renderer.raytraced_shadows = true;
    renderer.temporal_aa = true;
    renderer.variable_rate_shading = true;
    renderer.surfel_gi = true;
    renderer.vxgi = true;

    let post = path.postprocess_mut();
    post.sharpen = true;
    post.fxaa = true;
    post.chromatic_aberration = true;
    post.crt = true;
    path.camera_mut().aperture_size = 0.1;
}

/// Kahn's algorithm over `(dependent, dependency)` edges between `count` nodes.
pub fn is_acyclic(count: usize, edges: &[(usize, usize)]) -> bool {
    let mut indegree = vec![0usize; count];
    for &(dependent, _) in edges {
        indegree[dependent] += 1;
    }
    let mut ready: Vec<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut visited = 0;
    while let Some(node) = ready.pop() {
        visited += 1;
        for &(dependent, dependency) in edges {
            if dependency == node {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }
    }
    visited == count
}
