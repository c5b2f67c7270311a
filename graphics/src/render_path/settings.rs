//! Render path settings.
//!
//! [`Features`] holds the toggles whose setters allocate or release GPU
//! resources. [`RendererSettings`] and [`PostprocessSettings`] hold the rest:
//! values read while planning and recording a frame, or by the per-frame
//! resource pass in `update`.

use serde::{Deserialize, Serialize};

/// Ambient occlusion technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AoMode {
    #[default]
    Disabled,
    Ssao,
    Hbao,
    Msao,
    /// Ray traced; requires a ray tracing capable device.
    Rtao,
}

impl AoMode {
    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }

    /// Effect name recorded for this mode.
    pub fn effect_name(self) -> &'static str {
        match self {
            Self::Disabled => "ao_disabled",
            Self::Ssao => "ssao",
            Self::Hbao => "hbao",
            Self::Msao => "msao",
            Self::Rtao => "rtao",
        }
    }
}

/// Temporal upscaler quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fsr2Preset {
    Quality,
    Balanced,
    Performance,
    UltraPerformance,
}

impl Fsr2Preset {
    /// Internal resolution scale the preset renders at.
    pub fn resolution_scale(self) -> f32 {
        match self {
            Self::Quality => 1.0 / 1.5,
            Self::Balanced => 1.0 / 1.7,
            Self::Performance => 1.0 / 2.0,
            Self::UltraPerformance => 1.0 / 3.0,
        }
    }
}

/// Shading strategy of a render path.
///
/// Every strategy shares resource management and frame scheduling; they
/// differ in the opaque shading stage and in which buffers exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    /// Forward shading without light culling.
    Forward,
    /// Forward shading with per-tile light lists.
    #[default]
    TiledForward,
    /// G-buffer fill followed by screen-space lighting.
    Deferred,
    /// Progressive path tracing with sample accumulation.
    PathTracing,
}

impl RenderStrategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::TiledForward => "tiled_forward",
            Self::Deferred => "deferred",
            Self::PathTracing => "path_tracing",
        }
    }

    /// Whether the strategy culls lights into screen tiles.
    pub fn uses_tiled_lights(self) -> bool {
        matches!(self, Self::TiledForward | Self::Deferred)
    }

    pub fn is_path_tracing(self) -> bool {
        self == Self::PathTracing
    }
}

impl std::str::FromStr for RenderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "tiled_forward" => Ok(Self::TiledForward),
            "deferred" => Ok(Self::Deferred),
            "path_tracing" => Ok(Self::PathTracing),
            other => Err(format!("unknown render strategy '{other}'")),
        }
    }
}

/// Feature toggles backed by GPU resources.
///
/// Changing one through its `RenderPath3D` setter reallocates immediately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub ao: AoMode,
    pub ssr: bool,
    pub ssgi: bool,
    pub raytraced_reflections: bool,
    pub raytraced_diffuse: bool,
    /// Spatial upscaling, active only while the resolution scale is below one.
    pub fsr: bool,
    pub fsr2: bool,
    pub motion_blur: bool,
    pub depth_of_field: bool,
    pub eye_adaption: bool,
    /// Planar reflections.
    pub reflections: bool,
    pub bloom: bool,
    pub volume_lights: bool,
    pub light_shafts: bool,
    pub outline: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            ao: AoMode::Disabled,
            ssr: false,
            ssgi: false,
            raytraced_reflections: false,
            raytraced_diffuse: false,
            fsr: true,
            fsr2: false,
            motion_blur: false,
            depth_of_field: true,
            eye_adaption: false,
            reflections: true,
            bloom: true,
            volume_lights: true,
            light_shafts: false,
            outline: false,
        }
    }
}

/// Frame planning switches that do not need eager reallocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub shadows: bool,
    pub screen_space_shadows: bool,
    /// Ray traced shadows; ignored on devices without ray tracing.
    pub raytraced_shadows: bool,
    pub temporal_aa: bool,
    pub variable_rate_shading: bool,
    pub surfel_gi: bool,
    pub vxgi: bool,
    pub occlusion_culling: bool,
    pub scene_update: bool,
    /// Overlay the light culling heatmap in `compose`.
    pub light_culling_debug: bool,
    /// Samples a path traced image accumulates before tracing stops.
    pub path_tracing_target_samples: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            shadows: true,
            screen_space_shadows: false,
            raytraced_shadows: false,
            temporal_aa: false,
            variable_rate_shading: false,
            surfel_gi: false,
            vxgi: false,
            occlusion_culling: true,
            scene_update: true,
            light_culling_debug: false,
            path_tracing_target_samples: 1024,
        }
    }
}

/// Tunable effect parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessSettings {
    pub exposure: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub dither: bool,
    pub bloom_threshold: f32,
    pub motion_blur_strength: f32,
    pub depth_of_field_strength: f32,
    pub sharpen: bool,
    pub sharpen_amount: f32,
    pub fxaa: bool,
    pub chromatic_aberration: bool,
    pub chromatic_aberration_amount: f32,
    pub crt: bool,
    pub eye_adaption_key: f32,
    pub eye_adaption_rate: f32,
    pub fsr_sharpness: f32,
    pub fsr2_sharpness: f32,
    pub ao_range: f32,
    pub ao_power: f32,
    pub ao_sample_count: u32,
    pub ssr_roughness_cutoff: f32,
    pub screen_space_shadow_range: f32,
    pub screen_space_shadow_samples: u32,
    pub outline_threshold: f32,
    pub outline_thickness: f32,
    /// Blur the final image into the GUI background targets.
    pub gui_blur: bool,
}

impl Default for PostprocessSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            dither: true,
            bloom_threshold: 1.0,
            motion_blur_strength: 100.0,
            depth_of_field_strength: 10.0,
            sharpen: false,
            sharpen_amount: 0.28,
            fxaa: false,
            chromatic_aberration: false,
            chromatic_aberration_amount: 2.0,
            crt: false,
            eye_adaption_key: 0.115,
            eye_adaption_rate: 1.0,
            fsr_sharpness: 1.0,
            fsr2_sharpness: 0.5,
            ao_range: 1.0,
            ao_power: 1.0,
            ao_sample_count: 16,
            ssr_roughness_cutoff: 0.6,
            screen_space_shadow_range: 1.0,
            screen_space_shadow_samples: 16,
            outline_threshold: 0.2,
            outline_thickness: 1.0,
            gui_blur: true,
        }
    }
}

/// Where a custom postprocess stage runs in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostprocessOrder {
    /// HDR, before depth of field.
    BeforeTonemap,
    /// LDR, before sharpen.
    AfterTonemap,
}

/// A user compute stage spliced into the postprocess chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomPostprocess {
    pub name: &'static str,
    pub order: PostprocessOrder,
    pub enabled: bool,
}

impl CustomPostprocess {
    pub fn new(name: &'static str, order: PostprocessOrder) -> Self {
        Self {
            name,
            order,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsr2_presets() {
        assert!((Fsr2Preset::Quality.resolution_scale() - 0.6667).abs() < 1e-3);
        assert!((Fsr2Preset::Balanced.resolution_scale() - 0.5882).abs() < 1e-3);
        assert_eq!(Fsr2Preset::Performance.resolution_scale(), 0.5);
        assert!((Fsr2Preset::UltraPerformance.resolution_scale() - 0.3333).abs() < 1e-3);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("deferred".parse::<RenderStrategy>(), Ok(RenderStrategy::Deferred));
        assert!("raster".parse::<RenderStrategy>().is_err());
        assert!(RenderStrategy::Deferred.uses_tiled_lights());
        assert!(!RenderStrategy::Forward.uses_tiled_lights());
    }

    #[test]
    fn test_partial_features_use_defaults() {
        let features: Features = toml::from_str("ssr = true\nao = \"msao\"").unwrap();
        assert!(features.ssr);
        assert_eq!(features.ao, AoMode::Msao);
        assert!(features.bloom);
        assert!(features.depth_of_field);
    }
}
