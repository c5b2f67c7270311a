//! Per-frame update: resize check, scene advance, camera jitter, culling and
//! the resources that depend on per-frame state.

use lumen_core::jobs::{JobScope, JobSystem};
use lumen_core::math::{Vec2, halton};

use crate::effects::EffectKind;
use crate::error::GraphicsError;
use crate::scene::{Scene, cull_visibility};
use crate::types::{Resolution, TextureFormat, TextureUsage};

use super::descriptors::CameraDescriptors;
use super::lifecycle::{FeatureResources, target_desc};
use super::settings::AoMode;
use super::targets::Rt;
use super::{FrameStatus, RenderPath3D};

/// Length of the temporal AA jitter sequence.
const TAA_JITTER_PHASES: u64 = 256;

/// Jitter sequence length of the temporal upscaler for a scale ratio.
fn fsr2_phase_count(display: Resolution, internal: Resolution) -> u32 {
    let ratio = display.width as f32 / internal.width.max(1) as f32;
    (8.0 * ratio * ratio).ceil() as u32
}

/// Sub-pixel offset in clip space for a frame of the jitter sequence.
pub(crate) fn jitter_offset(index: u32, internal: Resolution) -> Vec2 {
    let x = halton(index + 1, 2) - 0.5;
    let y = halton(index + 1, 3) - 0.5;
    Vec2::new(
        2.0 * x / internal.width.max(1) as f32,
        -2.0 * y / internal.height.max(1) as f32,
    )
}

impl RenderPath3D {
    /// Prepare the next frame.
    ///
    /// Returns [`FrameStatus::Skipped`] when the internal resolution is zero
    /// or a resource could not be created; both are retried on the next call.
    pub fn update(&mut self, scene: &mut Scene, dt: f32, jobs: &JobSystem) -> FrameStatus {
        lumen_core::profile_scope!("RenderPath3D::update");
        self.frame_ready = false;

        if self.internal_resolution().is_zero() {
            return FrameStatus::Skipped;
        }
        if (self.cache_key != Some(self.resize_key()) || self.needs_resize)
            && let Err(err) = self.resize_buffers()
        {
            log::warn!("RenderPath3D: skipping frame, resize failed: {err}");
            return FrameStatus::Skipped;
        }

        self.accumulation.set_target(self.renderer.path_tracing_target_samples);
        if !self.is_raster()
            && (self.camera.is_dirty() || scene.any_transform_dirty() || scene.any_material_dirty())
        {
            self.accumulation.reset();
        }

        self.update_scene(scene, dt);
        if let Err(err) = self.update_jitter() {
            log::warn!("RenderPath3D: skipping frame, temporal AA resources failed: {err}");
            return FrameStatus::Skipped;
        }

        // Main and reflection culling share one worker scope.
        let scene_view: &Scene = scene;
        jobs.scope(|scope| {
            cull_visibility(&mut self.visibility_main, scene_view, &self.camera, scope);
            self.update_reflection_camera(scene_view, scope);
        });

        if let Err(err) = self.ensure_frame_resources(scene) {
            log::warn!("RenderPath3D: skipping frame, per-frame resources failed: {err}");
            return FrameStatus::Skipped;
        }

        if self.is_raster() {
            self.targets.swap(Rt::DepthCopy, Rt::DepthCopy1);
        }

        self.descriptors = CameraDescriptors::main_camera(&self.device, &self.targets, &self.effects);
        self.descriptors_reflection =
            CameraDescriptors::reflection_camera(&self.device, &self.targets, &self.effects);

        self.frame_ready = true;
        self.frame_count += 1;
        FrameStatus::Ready
    }

    fn update_scene(&mut self, scene: &mut Scene, dt: f32) {
        self.video_decode_required = scene.is_video_decoding_required(dt);

        if self.ray_tracing_supported() && self.uses_ray_tracing() {
            scene.acceleration_structure_update_requested = true;
        }

        // A converged path traced image keeps the scene frozen.
        let tracing_idle = !self.is_raster() && self.accumulation.samples() > 0;
        if self.renderer.scene_update && !tracing_idle {
            scene.update(dt);
        }
    }

    /// Whether any enabled feature traces rays against the scene.
    fn uses_ray_tracing(&self) -> bool {
        !self.is_raster()
            || self.features.ao == AoMode::Rtao
            || self.features.raytraced_reflections
            || self.features.raytraced_diffuse
            || self.renderer.raytraced_shadows
            || self.renderer.surfel_gi
    }

    fn update_jitter(&mut self) -> Result<(), GraphicsError> {
        let internal = self.internal_resolution();
        let raster = self.is_raster();

        let jitter = if raster && self.features.fsr2 {
            let phases = fsr2_phase_count(self.display_resolution(), internal).max(1);
            jitter_offset((self.frame_count % phases as u64) as u32, internal)
        } else if raster && self.renderer.temporal_aa {
            let index = (self.frame_count % TAA_JITTER_PHASES) as u32;
            Vec2::new(
                (halton(index, 2) * 2.0 - 1.0) / internal.width as f32,
                (halton(index, 3) * 2.0 - 1.0) / internal.height as f32,
            )
        } else {
            Vec2::zeros()
        };

        let temporal_aa = raster && self.renderer.temporal_aa && !self.features.fsr2;
        self.ensure_effect(EffectKind::TemporalAa, temporal_aa, internal)?;

        self.camera.jitter = jitter;
        self.camera.update_transforms();
        self.camera.clear_dirty();
        Ok(())
    }

    /// Cull the planar reflection camera. Needs the main camera's culling results.
    fn update_reflection_camera<'env>(&mut self, scene: &'env Scene, scope: &JobScope<'_, 'env>) {
        let visible = self.is_raster()
            && self.features.reflections
            && self.visibility_main.planar_reflection_visible;
        if !visible {
            self.visibility_reflection.clear();
            return;
        }

        let mut camera = self.camera.reflected(&self.visibility_main.reflection_plane);
        camera.jitter = Vec2::zeros();
        camera.update_transforms();
        self.camera_reflection = camera;
        cull_visibility(&mut self.visibility_reflection, scene, &self.camera_reflection, scope);
    }

    /// Allocate or release resources whose need is decided per frame.
    fn ensure_frame_resources(&mut self, scene: &Scene) -> Result<(), GraphicsError> {
        let internal = self.internal_resolution();
        let half = internal.divided(2);
        let raster = self.is_raster();
        let rt_supported = self.ray_tracing_supported();
        let weather = scene.weather;

        let raytraced_shadows = raster && self.renderer.raytraced_shadows && rt_supported;
        self.ensure_effect(EffectKind::RtShadow, raytraced_shadows, internal)?;

        self.ensure_effect(EffectKind::AerialPerspective, weather.aerial_perspective, internal)?;
        self.ensure_effect(EffectKind::VolumetricClouds, weather.volumetric_clouds, internal)?;
        let reflection_pass = self.targets.is_valid(Rt::DepthReflection);
        self.ensure_effect(
            EffectKind::AerialPerspectiveReflection,
            weather.aerial_perspective && reflection_pass,
            half,
        )?;
        self.ensure_effect(
            EffectKind::VolumetricCloudsReflection,
            weather.volumetric_clouds && reflection_pass,
            half,
        )?;

        self.ensure_target(
            Rt::WaterRipple,
            raster && !scene.water_ripples.is_empty(),
            target_desc(internal.divided(8), TextureFormat::Rg16Float, TextureUsage::SAMPLED_ATTACHMENT),
        )?;

        self.ensure_effect(EffectKind::SurfelGi, raster && self.renderer.surfel_gi && rt_supported, internal)?;
        self.ensure_effect(EffectKind::Vxgi, raster && self.renderer.vxgi, internal)?;

        let variable_rate_shading =
            self.renderer.variable_rate_shading && self.device.capabilities().variable_rate_shading;
        let velocity = raster
            && (self.features.motion_blur
                || self.renderer.temporal_aa
                || self.features.ssr
                || self.features.raytraced_reflections
                || self.features.raytraced_diffuse
                || raytraced_shadows
                || self.features.ao == AoMode::Rtao
                || variable_rate_shading
                || self.features.fsr2);
        self.ensure_target(
            Rt::Velocity,
            velocity,
            target_desc(internal, TextureFormat::Rg16Float, TextureUsage::SAMPLED_ATTACHMENT),
        )?;

        let shadow_mask = raster && (self.renderer.screen_space_shadows || raytraced_shadows);
        self.ensure_target(
            Rt::ShadowMask,
            shadow_mask,
            target_desc(internal, TextureFormat::Rgba32Uint, TextureUsage::SAMPLED_STORAGE),
        )?;

        self.ensure(FeatureResources::MotionBlur)?;
        self.ensure(FeatureResources::DepthOfField)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCapabilities, GraphicsDevice};
    use crate::render_path::RenderStrategy;
    use crate::scene::{Aabb, Material, ObjectFlags, SceneObject, Video, WaterRipple};
    use lumen_core::math::Vec3;

    fn setup(strategy: RenderStrategy) -> (RenderPath3D, Scene, JobSystem) {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut path = RenderPath3D::new(device, strategy);
        path.set_resolution(320, 180);
        (path, Scene::new(), JobSystem::new(2))
    }

    #[test]
    fn test_zero_resolution_skips_without_allocating() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.set_resolution(0, 0);
        assert_eq!(path.update(&mut scene, 0.016, &jobs), FrameStatus::Skipped);
        assert_eq!(path.device().texture_count(), 0);
        assert_eq!(path.frame_count(), 0);
    }

    #[test]
    fn test_first_update_allocates() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        assert_eq!(path.update(&mut scene, 0.016, &jobs), FrameStatus::Ready);
        assert!(path.resources_ready());
        assert_eq!(path.resize_count(), 1);
        assert!(path.descriptors().depth >= 0);
    }

    #[test]
    fn test_resolution_change_resizes_once() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.update(&mut scene, 0.016, &jobs);
        path.set_resolution(640, 360);
        path.update(&mut scene, 0.016, &jobs);
        path.update(&mut scene, 0.016, &jobs);
        assert_eq!(path.resize_count(), 2);
        assert_eq!(path.targets().resolution(Rt::Main), Some(Resolution::new(640, 360)));
    }

    #[test]
    fn test_depth_copies_swap_every_frame() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.update(&mut scene, 0.016, &jobs);
        let first = path.texture(Rt::DepthCopy).unwrap().id();
        path.update(&mut scene, 0.016, &jobs);
        assert_eq!(path.texture(Rt::DepthCopy1).unwrap().id(), first);
        assert_ne!(path.texture(Rt::DepthCopy).unwrap().id(), first);
    }

    #[test]
    fn test_taa_jitter_and_history() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.renderer_mut().temporal_aa = true;
        path.update(&mut scene, 0.016, &jobs);
        path.update(&mut scene, 0.016, &jobs);
        assert_ne!(path.camera().jitter, Vec2::zeros());
        assert!(path.effect(EffectKind::TemporalAa).is_some());
        assert!(path.targets().is_valid(Rt::Velocity));

        path.renderer_mut().temporal_aa = false;
        path.update(&mut scene, 0.016, &jobs);
        assert_eq!(path.camera().jitter, Vec2::zeros());
        assert!(path.effect(EffectKind::TemporalAa).is_none());
        assert!(!path.targets().is_valid(Rt::Velocity));
    }

    #[test]
    fn test_fsr2_jitter_stays_within_a_pixel() {
        let internal = Resolution::new(1280, 720);
        assert_eq!(fsr2_phase_count(Resolution::new(1920, 1080), internal), 18);
        for index in 0..18 {
            let offset = jitter_offset(index, internal);
            assert!(offset.x.abs() <= 1.0 / internal.width as f32);
            assert!(offset.y.abs() <= 1.0 / internal.height as f32);
        }
    }

    #[test]
    fn test_per_frame_resources_follow_scene() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.renderer_mut().screen_space_shadows = true;
        scene.weather.volumetric_clouds = true;
        scene.water_ripples.push(WaterRipple {
            position: Vec3::zeros(),
            age: 0.0,
            lifetime: 10.0,
        });
        path.update(&mut scene, 0.016, &jobs);

        assert!(path.targets().is_valid(Rt::ShadowMask));
        assert_eq!(path.targets().resolution(Rt::WaterRipple), Some(Resolution::new(40, 22)));
        assert!(path.effect(EffectKind::VolumetricClouds).is_some());
        assert!(path.effect(EffectKind::VolumetricCloudsReflection).is_some());

        scene.weather.volumetric_clouds = false;
        scene.water_ripples.clear();
        path.update(&mut scene, 0.016, &jobs);
        assert!(!path.targets().is_valid(Rt::WaterRipple));
        assert!(path.effect(EffectKind::VolumetricClouds).is_none());
    }

    #[test]
    fn test_reflection_camera_follows_visible_reflector() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        scene.objects.push(
            SceneObject::new("water", Aabb::new(Vec3::new(-50.0, -0.1, -50.0), Vec3::new(50.0, 0.1, 50.0)))
                .with_flags(ObjectFlags::PLANAR_REFLECTOR),
        );
        path.update(&mut scene, 0.016, &jobs);
        assert!(path.visibility().planar_reflection_visible);
        assert!(path.reflection_camera().clip_plane.is_some());
        assert!(path.reflection_camera().eye.y < 0.0);
        assert!(path.reflection_descriptors().depth >= 0);
    }

    #[test]
    fn test_video_decode_snapshot() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        scene.videos.push(Video::new("intro", 30.0));
        path.update(&mut scene, 0.05, &jobs);
        assert!(path.video_decode_required());
    }

    #[test]
    fn test_path_tracing_resets_on_scene_change() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::PathTracing);
        path.update(&mut scene, 0.016, &jobs);
        path.render(&scene, &jobs).unwrap();
        path.update(&mut scene, 0.016, &jobs);
        path.render(&scene, &jobs).unwrap();
        assert_eq!(path.accumulation().samples(), 2);

        scene.materials.push(Material {
            name: "changed".into(),
            dirty: true,
        });
        path.update(&mut scene, 0.016, &jobs);
        assert_eq!(path.accumulation().samples(), 0);
    }

    #[test]
    fn test_failed_frame_resource_skips_and_recovers() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.update(&mut scene, 0.016, &jobs);
        path.renderer_mut().screen_space_shadows = true;
        path.device().inject_creation_failure("rtShadow", 1);
        assert_eq!(path.update(&mut scene, 0.016, &jobs), FrameStatus::Skipped);
        assert_eq!(path.update(&mut scene, 0.016, &jobs), FrameStatus::Ready);
        assert!(path.targets().is_valid(Rt::ShadowMask));
    }
}
