//! Resource lifecycle: full reallocation, teardown and feature setters.
//!
//! Every feature that owns resources is a [`FeatureResources`] entry. Its
//! `ensure` routine brings the resources in line with the stored flag:
//! creates them if wanted and missing (or sized for another resolution),
//! releases them if not wanted. `resize_buffers` runs every entry in
//! [`FeatureResources::ORDER`] after the base targets exist; setters run
//! only their own entry.

use crate::effects::{EffectKind, EffectResources};
use crate::error::GraphicsError;
use crate::types::{Resolution, TextureDescriptor, TextureFormat, TextureUsage, mip_count_for};

use super::settings::{AoMode, Fsr2Preset, RenderStrategy};
use super::targets::Rt;
use super::RenderPath3D;

/// Mips of the depth copies and linear depth pyramid.
const DEPTH_MIPS: u32 = 5;
/// Upper bound of the scene copy mip chain used for rough refraction.
const SCENE_COPY_MAX_MIPS: u32 = 8;

/// Features whose setters allocate resources, in reallocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FeatureResources {
    Ao,
    Ssr,
    Ssgi,
    RaytracedDiffuse,
    Fsr,
    MotionBlur,
    DepthOfField,
    EyeAdaption,
    Reflections,
    Bloom,
    VolumeLights,
    LightShafts,
    Outline,
}

impl FeatureResources {
    /// FSR must be settled before motion blur and depth of field, which
    /// size themselves from the upscaler's output resolution.
    pub(crate) const ORDER: [Self; 13] = [
        Self::Ao,
        Self::Ssr,
        Self::Ssgi,
        Self::RaytracedDiffuse,
        Self::Fsr,
        Self::MotionBlur,
        Self::DepthOfField,
        Self::EyeAdaption,
        Self::Reflections,
        Self::Bloom,
        Self::VolumeLights,
        Self::LightShafts,
        Self::Outline,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Ao => "ao",
            Self::Ssr => "ssr",
            Self::Ssgi => "ssgi",
            Self::RaytracedDiffuse => "raytraced_diffuse",
            Self::Fsr => "fsr",
            Self::MotionBlur => "motion_blur",
            Self::DepthOfField => "depth_of_field",
            Self::EyeAdaption => "eye_adaption",
            Self::Reflections => "reflections",
            Self::Bloom => "bloom",
            Self::VolumeLights => "volume_lights",
            Self::LightShafts => "light_shafts",
            Self::Outline => "outline",
        }
    }

    fn targets(self) -> &'static [Rt] {
        match self {
            Self::Ao => &[Rt::Ao],
            Self::Ssr => &[Rt::Ssr],
            Self::Ssgi => &[Rt::Ssgi],
            Self::RaytracedDiffuse => &[Rt::RaytracedDiffuse],
            Self::Fsr => &[Rt::Fsr0, Rt::Fsr1],
            Self::Reflections => &[Rt::Reflection, Rt::DepthReflection],
            Self::VolumeLights => &[Rt::VolumetricLights0, Rt::VolumetricLights1],
            Self::LightShafts => &[Rt::Sun0, Rt::Sun1, Rt::SunResolved],
            Self::Outline => &[Rt::OutlineSource],
            Self::MotionBlur | Self::DepthOfField | Self::EyeAdaption | Self::Bloom => &[],
        }
    }

    fn effects(self) -> &'static [EffectKind] {
        match self {
            Self::Ao => &[EffectKind::Ssao, EffectKind::Hbao, EffectKind::Msao, EffectKind::Rtao],
            Self::Ssr => &[EffectKind::Ssr, EffectKind::RtReflection],
            Self::Ssgi => &[EffectKind::Ssgi],
            Self::RaytracedDiffuse => &[EffectKind::RtDiffuse],
            Self::Fsr => &[EffectKind::Fsr2],
            Self::MotionBlur => &[EffectKind::MotionBlur],
            Self::DepthOfField => &[EffectKind::DepthOfField],
            Self::EyeAdaption => &[EffectKind::EyeAdaption],
            Self::Reflections => &[EffectKind::TiledLightsReflection],
            Self::Bloom => &[EffectKind::Bloom],
            Self::VolumeLights | Self::LightShafts | Self::Outline => &[],
        }
    }
}

fn ao_effect(mode: AoMode) -> Option<EffectKind> {
    match mode {
        AoMode::Disabled => None,
        AoMode::Ssao => Some(EffectKind::Ssao),
        AoMode::Hbao => Some(EffectKind::Hbao),
        AoMode::Msao => Some(EffectKind::Msao),
        AoMode::Rtao => Some(EffectKind::Rtao),
    }
}

/// 2D descriptor clamped to at least one texel.
pub(crate) fn target_desc(resolution: Resolution, format: TextureFormat, usage: TextureUsage) -> TextureDescriptor {
    let size = resolution.max(Resolution::new(1, 1));
    TextureDescriptor::new_2d(size.width, size.height, format, usage)
}

fn same_layout(a: &TextureDescriptor, b: &TextureDescriptor) -> bool {
    a.size == b.size && a.format == b.format && a.sample_count == b.sample_count && a.mip_level_count == b.mip_level_count
}

impl RenderPath3D {
    /// Create resources for the current parameters.
    pub fn start(&mut self) -> Result<(), GraphicsError> {
        log::info!(
            "RenderPath3D: starting {} path at {}",
            self.strategy.name(),
            self.internal_resolution()
        );
        self.resize_buffers()
    }

    /// Release every resource.
    pub fn stop(&mut self) {
        log::info!("RenderPath3D: stopping after {} frames", self.frame_count);
        self.delete_gpu_resources();
    }

    /// Reallocate every resource for the current resolution, sample count,
    /// format, strategy and feature flags.
    ///
    /// A no-op when those parameters match the last successful call.
    ///
    /// # Errors
    ///
    /// Returns the first creation error. All resources are released and the
    /// resize is retried on the next [`update`](Self::update).
    pub fn resize_buffers(&mut self) -> Result<(), GraphicsError> {
        let key = self.resize_key();
        if self.cache_key == Some(key) && !self.needs_resize {
            return Ok(());
        }
        lumen_core::profile_scope!("RenderPath3D::resize_buffers");

        self.delete_gpu_resources();
        if key.internal.is_zero() {
            log::debug!("RenderPath3D: internal resolution is zero, deferring allocation");
            return Ok(());
        }

        self.resize_count += 1;
        self.camera.create_perspective(key.internal);

        let result = if self.strategy.is_path_tracing() {
            self.create_path_tracing_resources()
        } else {
            self.create_raster_resources()
        };

        match result {
            Ok(()) => {
                self.cache_key = Some(key);
                self.needs_resize = false;
                log::debug!(
                    "RenderPath3D: resized to {} (internal {}, msaa {}, {} targets, {} bundles, {} bytes)",
                    key.physical,
                    key.internal,
                    key.sample_count,
                    self.targets.iter().count(),
                    self.effects.len(),
                    self.memory_size_in_bytes()
                );
                Ok(())
            }
            Err(err) => {
                self.delete_gpu_resources();
                self.needs_resize = true;
                log::warn!("RenderPath3D: resize to {} failed: {err}", key.internal);
                Err(err)
            }
        }
    }

    /// Release every target and bundle and forget the cached parameters.
    pub fn delete_gpu_resources(&mut self) {
        if let Some(report) = self.last_frame.take() {
            self.schedule.recycle(report);
        }
        self.targets.clear();
        self.effects.clear();
        self.cache_key = None;
        self.frame_ready = false;
        self.descriptors = Default::default();
        self.descriptors_reflection = Default::default();
    }

    /// Set the output resolution. Applied by the next `update`.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.physical = Resolution::new(width, height);
    }

    /// Set the internal-to-output resolution ratio. Applied by the next `update`.
    ///
    /// # Errors
    ///
    /// Fails unless `scale` is in `(0, 4]`.
    pub fn set_resolution_scale(&mut self, scale: f32) -> Result<(), GraphicsError> {
        if !(scale > 0.0 && scale <= 4.0) {
            return Err(GraphicsError::InvalidParameter(format!(
                "resolution scale {scale} outside (0, 4]"
            )));
        }
        self.resolution_scale = scale;
        Ok(())
    }

    /// Set the resolution scale from an upscaler quality preset.
    pub fn set_fsr2_preset(&mut self, preset: Fsr2Preset) {
        self.resolution_scale = preset.resolution_scale();
    }

    /// Set the MSAA sample count. Applied by the next `update`.
    ///
    /// # Errors
    ///
    /// Fails unless `count` is 1, 2, 4 or 8.
    pub fn set_msaa_sample_count(&mut self, count: u32) -> Result<(), GraphicsError> {
        if !matches!(count, 1 | 2 | 4 | 8) {
            return Err(GraphicsError::InvalidParameter(format!(
                "unsupported MSAA sample count {count}"
            )));
        }
        self.msaa = count;
        Ok(())
    }

    /// Switch shading strategy. Applied by the next `update`.
    pub fn set_strategy(&mut self, strategy: RenderStrategy) {
        self.strategy = strategy;
    }

    /// Set the HDR color format. Applied by the next `update`.
    pub fn set_main_format(&mut self, format: TextureFormat) {
        self.main_format = format;
    }

    /// Ambient occlusion technique. RTAO needs ray tracing and falls back to disabled.
    pub fn set_ao(&mut self, mode: AoMode) -> Result<(), GraphicsError> {
        self.features.ao = if mode == AoMode::Rtao && !self.ray_tracing_supported() {
            log::warn!("RenderPath3D: ray traced AO needs ray tracing, AO disabled");
            AoMode::Disabled
        } else {
            mode
        };
        self.refresh(FeatureResources::Ao)
    }

    /// Screen space reflections.
    pub fn set_ssr_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.ssr = enabled;
        self.refresh(FeatureResources::Ssr)
    }

    /// Ray traced reflections; shares `rtSSR` with screen space reflections.
    pub fn set_raytraced_reflections_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.raytraced_reflections = self.ray_traced_request("reflections", enabled);
        self.refresh(FeatureResources::Ssr)
    }

    /// Screen space global illumination at half resolution.
    pub fn set_ssgi_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.ssgi = enabled;
        self.refresh(FeatureResources::Ssgi)
    }

    /// Ray traced diffuse global illumination.
    pub fn set_raytraced_diffuse_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.raytraced_diffuse = self.ray_traced_request("diffuse", enabled);
        self.refresh(FeatureResources::RaytracedDiffuse)
    }

    /// Spatial upscaling; only allocates while the resolution scale is below one.
    pub fn set_fsr_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.fsr = enabled;
        self.refresh(FeatureResources::Fsr)
    }

    /// Temporal upscaling. Motion blur and depth of field move to the
    /// upscaled resolution, so their bundles are rebuilt.
    pub fn set_fsr2_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.fsr2 = enabled;
        self.refresh(FeatureResources::Fsr)?;
        self.refresh(FeatureResources::MotionBlur)?;
        self.refresh(FeatureResources::DepthOfField)
    }

    /// Motion blur; sized for display resolution while FSR2 is on.
    pub fn set_motion_blur_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.motion_blur = enabled;
        self.refresh(FeatureResources::MotionBlur)
    }

    /// Depth of field; sized like motion blur.
    pub fn set_depth_of_field_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.depth_of_field = enabled;
        self.refresh(FeatureResources::DepthOfField)
    }

    /// Automatic exposure.
    pub fn set_eye_adaption_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.eye_adaption = enabled;
        self.refresh(FeatureResources::EyeAdaption)
    }

    /// Planar reflections.
    pub fn set_reflections_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.reflections = enabled;
        self.refresh(FeatureResources::Reflections)
    }

    /// Bloom. Always allocated for path tracing.
    pub fn set_bloom_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.bloom = enabled;
        self.refresh(FeatureResources::Bloom)
    }

    /// Volumetric light scattering at quarter resolution.
    pub fn set_volume_lights_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.volume_lights = enabled;
        self.refresh(FeatureResources::VolumeLights)
    }

    /// Sun light shafts.
    pub fn set_light_shafts_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.light_shafts = enabled;
        self.refresh(FeatureResources::LightShafts)
    }

    /// Outline source target.
    pub fn set_outline_enabled(&mut self, enabled: bool) -> Result<(), GraphicsError> {
        self.features.outline = enabled;
        self.refresh(FeatureResources::Outline)
    }

    /// Downgrade a ray traced feature request on devices without ray tracing.
    fn ray_traced_request(&self, what: &str, enabled: bool) -> bool {
        if enabled && !self.ray_tracing_supported() {
            log::warn!("RenderPath3D: ray traced {what} needs ray tracing, kept disabled");
            return false;
        }
        enabled
    }

    /// Bring one feature's resources in line with its flag. Without
    /// resources the change is picked up by the next resize.
    fn refresh(&mut self, feature: FeatureResources) -> Result<(), GraphicsError> {
        if !self.resources_ready() {
            return Ok(());
        }
        lumen_core::profile_scope!("RenderPath3D::refresh");
        if let Err(err) = self.ensure(feature) {
            self.release_feature(feature);
            self.cache_key = None;
            self.needs_resize = true;
            log::warn!("RenderPath3D: {} resources failed: {err}", feature.name());
            return Err(err);
        }
        log::debug!("RenderPath3D: {} resources updated", feature.name());
        Ok(())
    }

    fn release_feature(&mut self, feature: FeatureResources) {
        for &rt in feature.targets() {
            self.targets.release(rt);
        }
        for kind in feature.effects() {
            self.effects.remove(kind);
        }
    }

    pub(crate) fn ensure(&mut self, feature: FeatureResources) -> Result<(), GraphicsError> {
        match feature {
            FeatureResources::Ao => self.ensure_ao(),
            FeatureResources::Ssr => self.ensure_ssr(),
            FeatureResources::Ssgi => self.ensure_ssgi(),
            FeatureResources::RaytracedDiffuse => self.ensure_raytraced_diffuse(),
            FeatureResources::Fsr => self.ensure_fsr(),
            FeatureResources::MotionBlur => {
                let wanted = self.is_raster() && self.features.motion_blur;
                self.ensure_effect(EffectKind::MotionBlur, wanted, self.postprocess_resolution())
            }
            FeatureResources::DepthOfField => {
                let wanted = self.is_raster() && self.features.depth_of_field;
                self.ensure_effect(EffectKind::DepthOfField, wanted, self.postprocess_resolution())
            }
            FeatureResources::EyeAdaption => {
                let wanted = !self.is_raster() || self.features.eye_adaption;
                self.ensure_effect(EffectKind::EyeAdaption, wanted, self.internal_resolution())
            }
            FeatureResources::Reflections => self.ensure_reflections(),
            FeatureResources::Bloom => {
                let wanted = !self.is_raster() || self.features.bloom;
                self.ensure_effect(EffectKind::Bloom, wanted, self.internal_resolution())
            }
            FeatureResources::VolumeLights => {
                let wanted = self.is_raster() && self.features.volume_lights;
                let quarter = self.internal_resolution().divided(4);
                for rt in [Rt::VolumetricLights0, Rt::VolumetricLights1] {
                    self.ensure_target(
                        rt,
                        wanted,
                        target_desc(quarter, TextureFormat::Rgba16Float, TextureUsage::SAMPLED_STORAGE),
                    )?;
                }
                Ok(())
            }
            FeatureResources::LightShafts => self.ensure_light_shafts(),
            FeatureResources::Outline => {
                let wanted = self.is_raster() && self.features.outline;
                self.ensure_target(
                    Rt::OutlineSource,
                    wanted,
                    target_desc(
                        self.internal_resolution(),
                        TextureFormat::R32Float,
                        TextureUsage::SAMPLED_ATTACHMENT,
                    ),
                )
            }
        }
    }

    /// Resolution of the chain stages that run after temporal upscaling.
    pub(crate) fn postprocess_resolution(&self) -> Resolution {
        if self.features.fsr2 {
            self.display_resolution()
        } else {
            self.internal_resolution()
        }
    }

    /// Keep, create or drop the bundle of `kind`.
    pub(crate) fn ensure_effect(
        &mut self,
        kind: EffectKind,
        wanted: bool,
        resolution: Resolution,
    ) -> Result<(), GraphicsError> {
        if !wanted {
            if self.effects.remove(&kind).is_some() {
                log::trace!("RenderPath3D: released {}", kind.name());
            }
            return Ok(());
        }
        if self.effects.get(&kind).is_some_and(|b| b.resolution() == resolution) {
            return Ok(());
        }
        self.effects.remove(&kind);
        let bundle = EffectResources::create(&self.device, kind, resolution)?;
        self.effects.insert(kind, bundle);
        Ok(())
    }

    /// Keep, create or release target `rt`.
    pub(crate) fn ensure_target(
        &mut self,
        rt: Rt,
        wanted: bool,
        descriptor: TextureDescriptor,
    ) -> Result<(), GraphicsError> {
        if !wanted {
            if self.targets.is_valid(rt) {
                self.targets.release(rt);
                log::trace!("RenderPath3D: released {}", rt.name());
            }
            return Ok(());
        }
        if self
            .targets
            .get(rt)
            .is_some_and(|existing| same_layout(existing.descriptor(), &descriptor))
        {
            return Ok(());
        }
        self.targets.create(&self.device, rt, descriptor)
    }

    fn ensure_features(&mut self) -> Result<(), GraphicsError> {
        for feature in FeatureResources::ORDER {
            self.ensure(feature)?;
        }
        Ok(())
    }

    fn create_raster_resources(&mut self) -> Result<(), GraphicsError> {
        let internal = self.internal_resolution();
        let samples = self.sample_count();
        let format = self.main_format;
        let attachment = TextureUsage::SAMPLED_ATTACHMENT;
        let storage = TextureUsage::SAMPLED_STORAGE;
        let device = std::sync::Arc::clone(&self.device);

        // Color, with a separate multisampled render target only under MSAA.
        self.targets
            .create(&device, Rt::Main, target_desc(internal, format, attachment | storage))?;
        self.create_msaa_pair(Rt::MainRender, Rt::Main, target_desc(internal, format, attachment))?;

        // Alias hosts first so the aliases below land in their memory.
        self.targets.create(
            &device,
            Rt::PrimitiveId,
            target_desc(internal, TextureFormat::R32Uint, attachment | storage),
        )?;
        self.create_msaa_pair(
            Rt::PrimitiveIdRender,
            Rt::PrimitiveId,
            target_desc(internal, TextureFormat::R32Uint, attachment),
        )?;
        self.targets.create(
            &device,
            Rt::ParticleDistortion,
            target_desc(internal, TextureFormat::Rgba16Float, attachment).with_sample_count(samples),
        )?;
        if samples > 1 {
            self.targets.create(
                &device,
                Rt::ParticleDistortionResolved,
                target_desc(internal, TextureFormat::Rgba16Float, attachment),
            )?;
        }

        let quarter = internal.divided(4);
        let scene_copy_mips = mip_count_for(quarter.width, quarter.height, SCENE_COPY_MAX_MIPS);
        for rt in [Rt::SceneCopy, Rt::SceneCopyTmp] {
            self.targets.create(
                &device,
                rt,
                target_desc(quarter, format, attachment | storage).with_mip_levels(scene_copy_mips),
            )?;
        }

        self.targets
            .create(&device, Rt::Postprocess, target_desc(internal, TextureFormat::Rg11b10Float, storage))?;
        self.create_gui_blur()?;

        let capabilities = *device.capabilities();
        if capabilities.variable_rate_shading {
            self.targets.create(
                &device,
                Rt::ShadingRate,
                target_desc(
                    internal.tiles(capabilities.vrs_tile_size),
                    TextureFormat::R8Uint,
                    TextureUsage::SHADING_RATE | TextureUsage::STORAGE_BINDING,
                ),
            )?;
        }

        self.targets.create(
            &device,
            Rt::DepthMain,
            target_desc(internal, TextureFormat::Depth32FloatStencil8, attachment).with_sample_count(samples),
        )?;
        let depth_mips = mip_count_for(internal.width, internal.height, DEPTH_MIPS);
        for rt in [Rt::DepthCopy, Rt::DepthCopy1, Rt::LinearDepth] {
            self.targets.create(
                &device,
                rt,
                target_desc(internal, TextureFormat::R32Float, storage).with_mip_levels(depth_mips),
            )?;
        }
        self.targets
            .create(&device, Rt::DebugUav, target_desc(internal, TextureFormat::Rgba8Unorm, storage))?;

        self.ensure_effect(EffectKind::Visibility, true, internal)?;
        self.ensure_effect(EffectKind::TiledLights, self.strategy.uses_tiled_lights(), internal)?;
        self.ensure_effect(EffectKind::ScreenSpaceShadow, true, internal)?;

        if self.strategy == RenderStrategy::Deferred {
            self.targets.create(
                &device,
                Rt::GBufferAlbedo,
                target_desc(internal, TextureFormat::Rgba8Unorm, attachment),
            )?;
            self.targets.create(
                &device,
                Rt::GBufferNormal,
                target_desc(internal, TextureFormat::Rg16Float, attachment),
            )?;
            for rt in [Rt::LightDiffuse, Rt::LightSpecular] {
                self.targets
                    .create(&device, rt, target_desc(internal, TextureFormat::Rg11b10Float, storage))?;
            }
        }

        self.ensure_features()
    }

    fn create_path_tracing_resources(&mut self) -> Result<(), GraphicsError> {
        let internal = self.internal_resolution();
        let attachment = TextureUsage::SAMPLED_ATTACHMENT;
        let storage = TextureUsage::SAMPLED_STORAGE;
        let device = std::sync::Arc::clone(&self.device);

        self.targets
            .create(&device, Rt::Main, target_desc(internal, self.main_format, attachment | storage))?;
        self.targets
            .create(&device, Rt::TraceResult, target_desc(internal, TextureFormat::Rgba32Float, storage))?;
        self.targets
            .create(&device, Rt::TraceDepth, target_desc(internal, TextureFormat::R32Float, storage))?;
        if let Some(depth) = self.targets.get(Rt::TraceDepth).cloned() {
            self.targets.share(Rt::DepthCopy, std::sync::Arc::clone(&depth));
            self.targets.share(Rt::DepthCopy1, depth);
        }
        self.targets
            .create(&device, Rt::TraceStencil, target_desc(internal, TextureFormat::R8Uint, storage))?;
        self.targets.create(
            &device,
            Rt::DepthMain,
            target_desc(internal, TextureFormat::Depth32FloatStencil8, attachment),
        )?;
        let depth_mips = mip_count_for(internal.width, internal.height, DEPTH_MIPS);
        self.targets.create(
            &device,
            Rt::LinearDepth,
            target_desc(internal, TextureFormat::R32Float, storage).with_mip_levels(depth_mips),
        )?;
        // No primitive id buffer here, so the postprocess target owns its memory.
        self.targets
            .create(&device, Rt::Postprocess, target_desc(internal, TextureFormat::Rg11b10Float, storage))?;
        self.create_gui_blur()?;

        self.ensure_features()?;
        self.accumulation.reset();
        Ok(())
    }

    /// Create `render` as a multisampled target when MSAA is on, otherwise
    /// make it the same texture as `resolved`.
    fn create_msaa_pair(&mut self, render: Rt, resolved: Rt, descriptor: TextureDescriptor) -> Result<(), GraphicsError> {
        let samples = self.sample_count();
        if samples > 1 {
            return self
                .targets
                .create(&self.device, render, descriptor.with_sample_count(samples));
        }
        match self.targets.get(resolved).cloned() {
            Some(texture) => {
                self.targets.share(render, texture);
                Ok(())
            }
            None => Err(GraphicsError::Internal(format!(
                "{} must exist before {}",
                resolved.name(),
                render.name()
            ))),
        }
    }

    fn create_gui_blur(&mut self) -> Result<(), GraphicsError> {
        let internal = self.internal_resolution();
        let usage = TextureUsage::SAMPLED_STORAGE;
        let device = std::sync::Arc::clone(&self.device);
        self.targets.create(
            &device,
            Rt::GuiBlur0,
            target_desc(internal.divided(4), TextureFormat::Rgb10a2Unorm, usage),
        )?;
        for rt in [Rt::GuiBlur1, Rt::GuiBlur2] {
            self.targets.create(
                &device,
                rt,
                target_desc(internal.divided(16), TextureFormat::Rgb10a2Unorm, usage),
            )?;
        }
        Ok(())
    }

    fn ensure_ao(&mut self) -> Result<(), GraphicsError> {
        let mode = if self.is_raster() { self.features.ao } else { AoMode::Disabled };
        let wanted_kind = ao_effect(mode);
        for &kind in FeatureResources::Ao.effects() {
            if Some(kind) != wanted_kind {
                self.effects.remove(&kind);
            }
        }

        let internal = self.internal_resolution();
        let resolution = if mode == AoMode::Msao { internal } else { internal.divided(2) };
        self.ensure_target(
            Rt::Ao,
            mode.is_enabled(),
            target_desc(resolution, TextureFormat::R8Unorm, TextureUsage::SAMPLED_STORAGE),
        )?;
        match wanted_kind {
            Some(kind) => self.ensure_effect(kind, true, internal),
            None => Ok(()),
        }
    }

    fn ensure_ssr(&mut self) -> Result<(), GraphicsError> {
        let raster = self.is_raster();
        let traced = raster && self.features.raytraced_reflections;
        let screen_space = raster && self.features.ssr && !traced;
        let internal = self.internal_resolution();

        self.ensure_target(
            Rt::Ssr,
            traced || screen_space,
            target_desc(internal, TextureFormat::Rgba16Float, TextureUsage::SAMPLED_STORAGE),
        )?;
        self.ensure_effect(EffectKind::RtReflection, traced, internal)?;
        self.ensure_effect(EffectKind::Ssr, screen_space, internal)
    }

    fn ensure_ssgi(&mut self) -> Result<(), GraphicsError> {
        let wanted = self.is_raster() && self.features.ssgi;
        let internal = self.internal_resolution();
        self.ensure_target(
            Rt::Ssgi,
            wanted,
            target_desc(internal.divided(2), TextureFormat::Rgba16Float, TextureUsage::SAMPLED_STORAGE),
        )?;
        self.ensure_effect(EffectKind::Ssgi, wanted, internal)
    }

    fn ensure_raytraced_diffuse(&mut self) -> Result<(), GraphicsError> {
        let wanted = self.is_raster() && self.features.raytraced_diffuse;
        let internal = self.internal_resolution();
        self.ensure_target(
            Rt::RaytracedDiffuse,
            wanted,
            target_desc(internal, TextureFormat::Rgba16Float, TextureUsage::SAMPLED_STORAGE),
        )?;
        self.ensure_effect(EffectKind::RtDiffuse, wanted, internal)
    }

    fn ensure_fsr(&mut self) -> Result<(), GraphicsError> {
        let raster = self.is_raster();
        let temporal = raster && self.features.fsr2;
        let spatial = raster && self.features.fsr && self.resolution_scale < 1.0;
        let display = self.display_resolution();

        for rt in [Rt::Fsr0, Rt::Fsr1] {
            self.ensure_target(
                rt,
                temporal || spatial,
                target_desc(display, self.main_format, TextureUsage::SAMPLED_STORAGE),
            )?;
        }
        self.ensure_effect(EffectKind::Fsr2, temporal, display)
    }

    fn ensure_reflections(&mut self) -> Result<(), GraphicsError> {
        let wanted = self.is_raster() && self.features.reflections;
        let half = self.internal_resolution().divided(2);
        self.ensure_target(
            Rt::Reflection,
            wanted,
            target_desc(half, self.main_format, TextureUsage::SAMPLED_ATTACHMENT),
        )?;
        self.ensure_target(
            Rt::DepthReflection,
            wanted,
            target_desc(half, TextureFormat::Depth32Float, TextureUsage::SAMPLED_ATTACHMENT),
        )?;
        self.ensure_effect(EffectKind::TiledLightsReflection, wanted, half)
    }

    fn ensure_light_shafts(&mut self) -> Result<(), GraphicsError> {
        let wanted = self.features.light_shafts;
        let internal = self.internal_resolution();
        let samples = self.sample_count();
        let attachment = TextureUsage::SAMPLED_ATTACHMENT;

        self.ensure_target(
            Rt::Sun0,
            wanted,
            target_desc(internal, self.main_format, attachment).with_sample_count(samples),
        )?;
        self.ensure_target(
            Rt::Sun1,
            wanted,
            target_desc(internal.divided(2), self.main_format, TextureUsage::SAMPLED_STORAGE),
        )?;
        self.ensure_target(
            Rt::SunResolved,
            wanted && samples > 1,
            target_desc(internal, self.main_format, attachment),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::device::{DeviceCapabilities, GraphicsDevice};

    fn path(width: u32, height: u32) -> RenderPath3D {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut path = RenderPath3D::new(device, RenderStrategy::TiledForward);
        path.set_resolution(width, height);
        path
    }

    #[test]
    fn test_resize_is_idempotent() {
        let mut path = path(640, 360);
        path.start().unwrap();
        let allocations = path.device().allocation_count();
        let creations = path.device().creation_count();

        path.resize_buffers().unwrap();
        assert_eq!(path.device().allocation_count(), allocations);
        assert_eq!(path.device().creation_count(), creations);
        assert_eq!(path.resize_count(), 1);
    }

    #[test]
    fn test_msaa_targets_are_distinct_only_when_multisampled() {
        let mut path = path(256, 128);
        path.start().unwrap();
        let main = path.texture(Rt::Main).unwrap().id();
        assert_eq!(path.texture(Rt::MainRender).unwrap().id(), main);
        assert!(!path.targets().is_valid(Rt::ParticleDistortionResolved));

        path.set_msaa_sample_count(4).unwrap();
        path.resize_buffers().unwrap();
        let render = path.texture(Rt::MainRender).unwrap();
        assert_ne!(render.id(), path.texture(Rt::Main).unwrap().id());
        assert_eq!(render.sample_count(), 4);
        assert!(path.targets().is_valid(Rt::ParticleDistortionResolved));
    }

    #[test]
    fn test_aliases_share_host_memory() {
        let mut path = path(320, 180);
        path.set_ao(AoMode::Ssao).unwrap();
        path.start().unwrap();

        let postprocess = path.texture(Rt::Postprocess).unwrap();
        assert!(postprocess.is_alias());
        assert_eq!(
            postprocess.alias_host().map(|h| h.id()),
            path.texture(Rt::PrimitiveId).map(|t| t.id())
        );
        let ao = path.texture(Rt::Ao).unwrap();
        assert!(ao.is_alias());
        assert!(ao.memory_size_in_bytes() <= path.texture(Rt::ParticleDistortion).unwrap().memory_size_in_bytes());
    }

    #[test]
    fn test_setter_before_start_only_stores() {
        let mut path = path(320, 180);
        path.set_ssgi_enabled(true).unwrap();
        assert!(path.features().ssgi);
        assert_eq!(path.device().texture_count(), 0);

        path.start().unwrap();
        assert_eq!(path.targets().resolution(Rt::Ssgi), Some(Resolution::new(160, 90)));
    }

    #[test]
    fn test_volumetric_lights_use_quarter_resolution() {
        let mut path = path(320, 180);
        path.set_volume_lights_enabled(true).unwrap();
        path.start().unwrap();

        for rt in [Rt::VolumetricLights0, Rt::VolumetricLights1] {
            assert_eq!(path.targets().resolution(rt), Some(Resolution::new(80, 45)));
        }

        path.set_volume_lights_enabled(false).unwrap();
        assert!(!path.targets().is_valid(Rt::VolumetricLights0));
    }

    #[test]
    fn test_zero_resolution_defers_allocation() {
        let mut path = path(0, 0);
        path.start().unwrap();
        assert!(!path.resources_ready());
        assert_eq!(path.resize_count(), 0);
        assert_eq!(path.device().texture_count(), 0);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let mut path = path(64, 64);
        assert!(path.set_msaa_sample_count(3).is_err());
        assert!(path.set_resolution_scale(0.0).is_err());
        assert!(path.set_resolution_scale(4.5).is_err());
        assert_eq!(path.msaa_sample_count(), 1);
        assert_eq!(path.resolution_scale(), 1.0);
    }

    #[test]
    fn test_failed_setter_releases_feature_and_schedules_resize() {
        let mut path = path(320, 180);
        path.start().unwrap();
        path.device().inject_creation_failure("ssgi", 1);

        assert_eq!(path.set_ssgi_enabled(true), Err(GraphicsError::OutOfMemory));
        assert!(!path.targets().is_valid(Rt::Ssgi));
        assert!(path.effect(EffectKind::Ssgi).is_none());
        assert!(!path.resources_ready());

        path.resize_buffers().unwrap();
        assert!(path.targets().is_valid(Rt::Ssgi));
        assert_eq!(path.resize_count(), 2);
    }

    #[test]
    fn test_failed_resize_releases_everything() {
        let mut path = path(320, 180);
        path.device().inject_creation_failure("depthBuffer_Main", 1);
        assert!(path.start().is_err());
        assert_eq!(path.device().texture_count(), 0);
        assert!(!path.resources_ready());

        path.start().unwrap();
        assert!(path.targets().is_valid(Rt::DepthMain));
    }

    #[test]
    fn test_ray_traced_requests_fall_back_without_support() {
        let mut path = path(128, 128);
        path.start().unwrap();
        path.set_raytraced_reflections_enabled(true).unwrap();
        path.set_ao(AoMode::Rtao).unwrap();
        assert!(!path.features().raytraced_reflections);
        assert_eq!(path.features().ao, AoMode::Disabled);
        assert!(!path.targets().is_valid(Rt::Ssr));

        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::full());
        let mut path = RenderPath3D::new(Arc::clone(&device), RenderStrategy::TiledForward);
        path.set_resolution(128, 128);
        path.start().unwrap();
        path.set_raytraced_reflections_enabled(true).unwrap();
        assert!(path.effect(EffectKind::RtReflection).is_some());
        assert!(path.targets().is_valid(Rt::Ssr));
    }

    #[test]
    fn test_path_tracing_allocation() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut path = RenderPath3D::new(device, RenderStrategy::PathTracing);
        path.set_resolution(200, 100);
        path.set_ssr_enabled(true).unwrap();
        path.start().unwrap();

        let trace_depth = path.texture(Rt::TraceDepth).unwrap().id();
        assert_eq!(path.texture(Rt::DepthCopy).unwrap().id(), trace_depth);
        assert_eq!(path.texture(Rt::TraceResult).unwrap().format(), TextureFormat::Rgba32Float);
        assert!(!path.texture(Rt::Postprocess).unwrap().is_alias());
        assert!(path.effect(EffectKind::EyeAdaption).is_some());
        assert!(path.effect(EffectKind::Bloom).is_some());
        assert!(!path.targets().is_valid(Rt::Ssr));
        assert!(!path.targets().is_valid(Rt::PrimitiveId));
    }

    #[test]
    fn test_deferred_adds_gbuffer() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut path = RenderPath3D::new(device, RenderStrategy::Deferred);
        path.set_resolution(64, 64);
        path.start().unwrap();
        for rt in [Rt::GBufferAlbedo, Rt::GBufferNormal, Rt::LightDiffuse, Rt::LightSpecular] {
            assert!(path.targets().is_valid(rt), "{}", rt.name());
        }
        assert!(path.effect(EffectKind::TiledLights).is_some());

        path.set_strategy(RenderStrategy::Forward);
        path.resize_buffers().unwrap();
        assert!(!path.targets().is_valid(Rt::GBufferAlbedo));
        assert!(path.effect(EffectKind::TiledLights).is_none());
    }
}
