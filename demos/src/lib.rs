//! # Lumen Demos
//!
//! Headless scenes and a frame loop for driving a [`RenderPath3D`] without a
//! window.
//!
//! ## Available Demos
//!
//! - `frame_sim` - runs a configured render path for a number of frames and
//!   reports what was allocated and scheduled

use lumen_core::jobs::JobSystem;
use lumen_core::math::Vec3;
use lumen_graphics::GraphicsError;
use lumen_graphics::render_path::{FrameStatus, RenderPath3D};
use lumen_graphics::scene::{Aabb, ObjectFlags, Scene, SceneElement, SceneLight, SceneObject, Terrain, Video};

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Built-in demo scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemoScene {
    /// Nothing but the sky.
    Empty,
    /// A grid of boxes lit by point lights.
    #[default]
    Courtyard,
    /// Courtyard plus water, glass, particles, a video screen and terrain.
    Harbor,
}

impl DemoScene {
    pub fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Courtyard => "courtyard",
            Self::Harbor => "harbor",
        }
    }

    /// Build a fresh scene.
    pub fn build(self) -> Scene {
        let mut scene = Scene::new();
        match self {
            Self::Empty => {}
            Self::Courtyard => populate_courtyard(&mut scene),
            Self::Harbor => {
                populate_courtyard(&mut scene);
                populate_harbor(&mut scene);
            }
        }
        scene
    }
}

fn cube(center: Vec3, half: f32) -> Aabb {
    Aabb::from_center(center, Vec3::repeat(half))
}

fn populate_courtyard(scene: &mut Scene) {
    for row in 0..6 {
        for column in 0..6 {
            let center = Vec3::new(column as f32 * 2.0 - 5.0, 0.5, -(row as f32) * 2.0);
            scene
                .objects
                .push(SceneObject::new(format!("crate_{row}_{column}"), cube(center, 0.5)));
        }
    }
    for i in 0..4 {
        let mut light = SceneLight::point(Vec3::new(i as f32 * 3.0 - 4.5, 3.0, -4.0), 8.0);
        light.volumetric = i == 0;
        scene.lights.push(light);
    }
    scene.env_probes.push(SceneElement::new(cube(Vec3::new(0.0, 2.0, -5.0), 12.0)));
    scene.decals.push(SceneElement::new(cube(Vec3::new(0.0, 0.0, -2.0), 0.5)));
}

fn populate_harbor(scene: &mut Scene) {
    scene.objects.push(
        SceneObject::new(
            "harbor_water",
            Aabb::new(Vec3::new(-40.0, -0.2, -40.0), Vec3::new(40.0, -0.1, 40.0)),
        )
        .with_flags(ObjectFlags::PLANAR_REFLECTOR),
    );
    scene.objects.push(
        SceneObject::new("lighthouse_glass", cube(Vec3::new(3.0, 2.0, -8.0), 0.75))
            .with_flags(ObjectFlags::TRANSPARENT),
    );
    scene.emitters.push(SceneElement::new(cube(Vec3::new(-2.0, 1.0, -3.0), 1.0)));
    scene.hairs.push(SceneElement::new(cube(Vec3::new(1.0, 1.0, -1.0), 0.3)));
    scene.videos.push(Video::new("harbor_billboard", 30.0));
    scene.terrains.push(Terrain {
        name: "coastline".into(),
    });
    scene.weather.realistic_sky = true;
    scene.weather.volumetric_clouds = true;
}

/// Totals collected over a frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimSummary {
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    /// Command lists submitted across all rendered frames.
    pub command_lists: u64,
    pub commands: u64,
    pub cross_queue_waits: u64,
    pub alias_barriers: u64,
}

/// Camera motion applied between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraMotion {
    Still,
    /// Orbit the origin at `radius`, `speed` radians per second.
    Orbit { radius: f32, speed: f32 },
}

/// Run `frames` iterations of update and render at a fixed timestep.
pub fn run_frames(
    path: &mut RenderPath3D,
    scene: &mut Scene,
    jobs: &JobSystem,
    frames: u64,
    dt: f32,
    motion: CameraMotion,
) -> Result<SimSummary, GraphicsError> {
    let mut summary = SimSummary::default();
    for frame in 0..frames {
        if let CameraMotion::Orbit { radius, speed } = motion {
            let angle = frame as f32 * dt * speed;
            let eye = Vec3::new(angle.cos() * radius, 4.0, angle.sin() * radius);
            path.camera_mut().look_at(eye, Vec3::new(0.0, 0.5, -4.0));
        }

        if path.update(scene, dt, jobs) == FrameStatus::Skipped {
            summary.frames_skipped += 1;
            continue;
        }
        let Some(report) = path.render(scene, jobs)? else {
            summary.frames_skipped += 1;
            continue;
        };

        summary.frames_rendered += 1;
        summary.command_lists += report.lists().len() as u64;
        summary.commands += report.command_count() as u64;
        summary.cross_queue_waits += report.wait_edges().len() as u64;
        summary.alias_barriers += report.aliasing_barriers().count() as u64;
        log::trace!("frame {}: {} lists", report.frame_index, report.lists().len());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_graphics::render_path::RenderStrategy;
    use lumen_graphics::{DeviceCapabilities, GraphicsDevice};
    use rstest::rstest;

    fn path(strategy: RenderStrategy) -> RenderPath3D {
        let device = GraphicsDevice::new("Demo Adapter", DeviceCapabilities::default());
        let mut path = RenderPath3D::new(device, strategy);
        path.set_resolution(320, 180);
        path
    }

    #[rstest]
    #[case::empty(DemoScene::Empty)]
    #[case::courtyard(DemoScene::Courtyard)]
    #[case::harbor(DemoScene::Harbor)]
    fn test_scenes_render(#[case] demo: DemoScene) {
        let jobs = JobSystem::new(2);
        let mut scene = demo.build();
        let mut path = path(RenderStrategy::TiledForward);

        let summary = run_frames(&mut path, &mut scene, &jobs, 3, 1.0 / 60.0, CameraMotion::Still).unwrap();
        assert_eq!(summary.frames_rendered, 3);
        assert_eq!(summary.frames_skipped, 0);
        assert!(summary.command_lists >= 3);
    }

    #[test]
    fn test_zero_resolution_skips_frames() {
        let jobs = JobSystem::new(1);
        let mut scene = DemoScene::Courtyard.build();
        let mut path = path(RenderStrategy::Deferred);
        path.set_resolution(0, 0);

        let summary = run_frames(&mut path, &mut scene, &jobs, 2, 1.0 / 60.0, CameraMotion::Still).unwrap();
        assert_eq!(summary.frames_rendered, 0);
        assert_eq!(summary.frames_skipped, 2);
    }

    #[test]
    fn test_orbit_keeps_rendering() {
        let jobs = JobSystem::new(2);
        let mut scene = DemoScene::Harbor.build();
        let mut path = path(RenderStrategy::Forward);
        let motion = CameraMotion::Orbit { radius: 12.0, speed: 0.5 };

        let summary = run_frames(&mut path, &mut scene, &jobs, 4, 1.0 / 30.0, motion).unwrap();
        assert_eq!(summary.frames_rendered, 4);
    }
}
