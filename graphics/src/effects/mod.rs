//! Rendering effects.
//!
//! Every screen-space or ray-traced technique owns a persistent bundle of
//! intermediate textures ([`EffectResources`]) sized from a reference
//! resolution. Bundles are created by the render path when a feature is
//! enabled or the resolution changes, and dropped when the feature is
//! disabled. Invocations are free functions in [`passes`] that record into a
//! command list.

pub mod passes;

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::types::{Resolution, TextureDescriptor, TextureFormat, TextureUsage};

/// Kinds of effect resource bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectKind {
    TiledLights,
    TiledLightsReflection,
    Visibility,
    ScreenSpaceShadow,
    Ssao,
    Hbao,
    Msao,
    Rtao,
    Ssr,
    RtReflection,
    Ssgi,
    RtDiffuse,
    RtShadow,
    Fsr2,
    MotionBlur,
    DepthOfField,
    EyeAdaption,
    Bloom,
    TemporalAa,
    AerialPerspective,
    AerialPerspectiveReflection,
    VolumetricClouds,
    VolumetricCloudsReflection,
    SurfelGi,
    Vxgi,
}

/// How a bundle texture is sized from the bundle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    Full,
    Div(u32),
    Tiles(u32),
    Fixed(u32, u32),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    name: &'static str,
    format: TextureFormat,
    scale: Scale,
    mips: u32,
}

const fn slot(name: &'static str, format: TextureFormat, scale: Scale) -> Slot {
    Slot {
        name,
        format,
        scale,
        mips: 1,
    }
}

use Scale::{Div, Fixed, Full, Tiles};
use TextureFormat::{
    R8Unorm, R16Float, R32Float, R32Uint, Rg11b10Float, Rg16Float, Rgba8Unorm, Rgba16Float,
    Rgba32Float,
};

const TILED_LIGHTS: &[Slot] = &[
    slot("tile_frustums", Rgba32Float, Tiles(16)),
    slot("entity_tiles", R32Uint, Tiles(16)),
];
const VISIBILITY: &[Slot] = &[
    slot("tile_bins", R32Uint, Tiles(8)),
    slot("normals", Rg16Float, Full),
    slot("roughness", R8Unorm, Full),
];
const SCREEN_SPACE_SHADOW: &[Slot] = &[slot("lowres", R8Unorm, Div(2))];
const SSAO: &[Slot] = &[slot("temp", R8Unorm, Div(2))];
const MSAO: &[Slot] = &[
    slot("depth_downsize1", R32Float, Div(2)),
    slot("depth_downsize2", R32Float, Div(4)),
    slot("depth_downsize3", R32Float, Div(8)),
    slot("depth_downsize4", R32Float, Div(16)),
    slot("ao_merged", R8Unorm, Div(2)),
];
const RTAO: &[Slot] = &[
    slot("normals", Rg16Float, Div(2)),
    slot("tiles", R32Uint, Tiles(8)),
    slot("denoised", R8Unorm, Div(2)),
];
const SSR: &[Slot] = &[
    slot("tile_min_max_roughness", Rg16Float, Tiles(8)),
    slot("ray_indirect", Rgba16Float, Div(2)),
    slot("ray_direction", Rgba16Float, Div(2)),
    slot("resolve", Rgba16Float, Full),
    slot("temporal[0]", Rgba16Float, Full),
    slot("temporal[1]", Rgba16Float, Full),
];
const RT_REFLECTION: &[Slot] = &[
    slot("ray_lengths", R16Float, Div(2)),
    slot("resolve", Rgba16Float, Full),
    slot("temporal[0]", Rgba16Float, Full),
    slot("temporal[1]", Rgba16Float, Full),
];
const SSGI: &[Slot] = &[
    slot("depth_atlas", R32Float, Div(2)),
    slot("color_atlas", Rg11b10Float, Div(2)),
    slot("diffuse_atlas", Rg11b10Float, Div(2)),
];
const RT_DIFFUSE: &[Slot] = &[
    slot("rayhit", Rgba16Float, Div(2)),
    slot("temporal[0]", Rgba16Float, Full),
    slot("temporal[1]", Rgba16Float, Full),
];
const RT_SHADOW: &[Slot] = &[
    slot("temp", R32Uint, Div(2)),
    slot("temporal[0]", R32Uint, Full),
    slot("temporal[1]", R32Uint, Full),
];
const FSR2: &[Slot] = &[
    slot("reactive_mask", R8Unorm, Full),
    slot("lock_status[0]", Rg16Float, Full),
    slot("lock_status[1]", Rg16Float, Full),
    slot("luma_history", Rgba8Unorm, Full),
    slot("upscaled_color[0]", Rgba16Float, Full),
    slot("upscaled_color[1]", Rgba16Float, Full),
];
const MOTION_BLUR: &[Slot] = &[
    slot("tile_min_max", Rg16Float, Tiles(32)),
    slot("tile_max", Rg16Float, Tiles(32)),
    slot("neighborhood_max", Rg16Float, Tiles(32)),
];
const DEPTH_OF_FIELD: &[Slot] = &[
    slot("tile_min_max_coc", Rg16Float, Tiles(32)),
    slot("presort", Rg11b10Float, Div(2)),
    slot("main", Rg11b10Float, Div(2)),
    slot("postfilter", Rg11b10Float, Div(2)),
    slot("alpha", R8Unorm, Div(2)),
];
const EYE_ADAPTION: &[Slot] = &[
    slot("histogram", R32Uint, Fixed(256, 1)),
    slot("luminance", R32Float, Fixed(1, 1)),
];
const BLOOM: &[Slot] = &[
    Slot {
        name: "texture",
        format: Rg11b10Float,
        scale: Div(4),
        mips: 5,
    },
    Slot {
        name: "temp",
        format: Rg11b10Float,
        scale: Div(4),
        mips: 5,
    },
];
const TEMPORAL_AA: &[Slot] = &[
    slot("history[0]", Rgba16Float, Full),
    slot("history[1]", Rgba16Float, Full),
];
const AERIAL_PERSPECTIVE: &[Slot] = &[slot("lowres", Rgba16Float, Div(2))];
const VOLUMETRIC_CLOUDS: &[Slot] = &[
    slot("render", Rgba16Float, Div(4)),
    slot("depth", Rg16Float, Div(4)),
    slot("reproject[0]", Rgba16Float, Div(2)),
    slot("reproject[1]", Rgba16Float, Div(2)),
];
const VOLUMETRIC_CLOUDS_REFLECTION: &[Slot] = &[slot("render", Rgba16Float, Div(4))];
const SURFEL_GI: &[Slot] = &[slot("result", Rg11b10Float, Full)];
const VXGI: &[Slot] = &[
    slot("diffuse", Rgba16Float, Full),
    slot("specular", Rgba16Float, Full),
    slot("radiance", Rgba16Float, Fixed(64, 64)),
];

impl EffectKind {
    /// Stable name used in texture labels and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::TiledLights => "tiled_lights",
            Self::TiledLightsReflection => "tiled_lights_reflection",
            Self::Visibility => "visibility",
            Self::ScreenSpaceShadow => "screen_space_shadow",
            Self::Ssao => "ssao",
            Self::Hbao => "hbao",
            Self::Msao => "msao",
            Self::Rtao => "rtao",
            Self::Ssr => "ssr",
            Self::RtReflection => "rt_reflection",
            Self::Ssgi => "ssgi",
            Self::RtDiffuse => "rt_diffuse",
            Self::RtShadow => "rt_shadow",
            Self::Fsr2 => "fsr2",
            Self::MotionBlur => "motion_blur",
            Self::DepthOfField => "depth_of_field",
            Self::EyeAdaption => "eye_adaption",
            Self::Bloom => "bloom",
            Self::TemporalAa => "temporal_aa",
            Self::AerialPerspective => "aerial_perspective",
            Self::AerialPerspectiveReflection => "aerial_perspective_reflection",
            Self::VolumetricClouds => "volumetric_clouds",
            Self::VolumetricCloudsReflection => "volumetric_clouds_reflection",
            Self::SurfelGi => "surfel_gi",
            Self::Vxgi => "vxgi",
        }
    }

    fn layout(self) -> &'static [Slot] {
        match self {
            Self::TiledLights | Self::TiledLightsReflection => TILED_LIGHTS,
            Self::Visibility => VISIBILITY,
            Self::ScreenSpaceShadow => SCREEN_SPACE_SHADOW,
            Self::Ssao | Self::Hbao => SSAO,
            Self::Msao => MSAO,
            Self::Rtao => RTAO,
            Self::Ssr => SSR,
            Self::RtReflection => RT_REFLECTION,
            Self::Ssgi => SSGI,
            Self::RtDiffuse => RT_DIFFUSE,
            Self::RtShadow => RT_SHADOW,
            Self::Fsr2 => FSR2,
            Self::MotionBlur => MOTION_BLUR,
            Self::DepthOfField => DEPTH_OF_FIELD,
            Self::EyeAdaption => EYE_ADAPTION,
            Self::Bloom => BLOOM,
            Self::TemporalAa => TEMPORAL_AA,
            Self::AerialPerspective | Self::AerialPerspectiveReflection => AERIAL_PERSPECTIVE,
            Self::VolumetricClouds => VOLUMETRIC_CLOUDS,
            Self::VolumetricCloudsReflection => VOLUMETRIC_CLOUDS_REFLECTION,
            Self::SurfelGi => SURFEL_GI,
            Self::Vxgi => VXGI,
        }
    }
}

/// Persistent intermediate textures of one effect.
#[derive(Debug, Clone)]
pub struct EffectResources {
    kind: EffectKind,
    resolution: Resolution,
    textures: Vec<(&'static str, Arc<Texture>)>,
}

impl EffectResources {
    /// Create the bundle for `kind` sized from `resolution`.
    ///
    /// # Errors
    ///
    /// Fails if any texture cannot be created; textures created before the
    /// failure are released.
    pub fn create(
        device: &Arc<GraphicsDevice>,
        kind: EffectKind,
        resolution: Resolution,
    ) -> Result<Self, GraphicsError> {
        let mut textures = Vec::with_capacity(kind.layout().len());
        for slot in kind.layout() {
            let size = match slot.scale {
                Scale::Full => resolution,
                Scale::Div(d) => resolution.divided(d),
                Scale::Tiles(t) => resolution.tiles(t),
                Scale::Fixed(w, h) => Resolution::new(w, h),
            }
            .max(Resolution::new(1, 1));
            let descriptor =
                TextureDescriptor::new_2d(size.width, size.height, slot.format, TextureUsage::SAMPLED_STORAGE)
                    .with_mip_levels(slot.mips)
                    .with_label(format!("{}.{}", kind.name(), slot.name));
            textures.push((slot.name, device.create_texture(&descriptor)?));
        }
        log::debug!("Effect resources {} created at {resolution}", kind.name());
        Ok(Self {
            kind,
            resolution,
            textures,
        })
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Reference resolution the bundle was sized from.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Texture by slot name.
    pub fn texture(&self, name: &str) -> Option<&Arc<Texture>> {
        self.textures.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
    }

    /// All textures with their slot names.
    pub fn textures(&self) -> &[(&'static str, Arc<Texture>)] {
        &self.textures
    }

    /// One of a `name[0]`/`name[1]` pair, alternating per frame.
    pub fn history(&self, base: &str, frame_index: u64) -> Option<&Arc<Texture>> {
        let index = frame_index % 2;
        self.textures
            .iter()
            .find(|(n, _)| n.strip_prefix(base).is_some_and(|rest| rest == format!("[{index}]")))
            .map(|(_, t)| t)
    }

    /// Total bytes of the bundle.
    pub fn memory_size_in_bytes(&self) -> u64 {
        self.textures.iter().map(|(_, t)| t.memory_size_in_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapabilities;

    fn device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default())
    }

    #[test]
    fn test_bundle_sizes_follow_resolution() {
        let device = device();
        let ssr = EffectResources::create(&device, EffectKind::Ssr, Resolution::new(1920, 1080)).unwrap();
        let tiles = ssr.texture("tile_min_max_roughness").unwrap();
        assert_eq!((tiles.width(), tiles.height()), (240, 135));
        let rays = ssr.texture("ray_indirect").unwrap();
        assert_eq!((rays.width(), rays.height()), (960, 540));
        assert_eq!(rays.label(), Some("ssr.ray_indirect"));
    }

    #[test]
    fn test_tiny_resolution_clamps_to_one() {
        let device = device();
        let msao = EffectResources::create(&device, EffectKind::Msao, Resolution::new(8, 8)).unwrap();
        let smallest = msao.texture("depth_downsize4").unwrap();
        assert_eq!((smallest.width(), smallest.height()), (1, 1));
    }

    #[test]
    fn test_history_alternates() {
        let device = device();
        let taa = EffectResources::create(&device, EffectKind::TemporalAa, Resolution::new(64, 64)).unwrap();
        let even = taa.history("history", 0).unwrap();
        let odd = taa.history("history", 1).unwrap();
        assert_ne!(even.id(), odd.id());
        assert_eq!(taa.history("history", 2).unwrap().id(), even.id());
    }

    #[test]
    fn test_failed_creation_releases_partial_bundle() {
        let device = device();
        device.inject_creation_failure("depth_of_field.main", 1);
        let result = EffectResources::create(&device, EffectKind::DepthOfField, Resolution::new(64, 64));
        assert_eq!(result.unwrap_err(), GraphicsError::OutOfMemory);
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn test_every_kind_has_a_layout() {
        let device = device();
        for kind in [
            EffectKind::TiledLights,
            EffectKind::Visibility,
            EffectKind::Rtao,
            EffectKind::Fsr2,
            EffectKind::EyeAdaption,
            EffectKind::Bloom,
            EffectKind::VolumetricClouds,
            EffectKind::Vxgi,
        ] {
            let bundle = EffectResources::create(&device, kind, Resolution::new(128, 72)).unwrap();
            assert!(!bundle.textures().is_empty(), "{}", kind.name());
            assert!(bundle.memory_size_in_bytes() > 0);
        }
    }
}
