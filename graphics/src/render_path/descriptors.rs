//! Per-camera bindless descriptor table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::device::{GraphicsDevice, Placeholder};
use crate::effects::{EffectKind, EffectResources};
use crate::resources::Texture;

use super::targets::{Rt, TargetSet};

/// Descriptor indices a camera's shaders read their inputs through.
///
/// `-1` means unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraDescriptors {
    pub primitive_id: i32,
    pub depth: i32,
    pub linear_depth: i32,
    pub velocity: i32,
    pub normals: i32,
    pub roughness: i32,
    pub entity_tiles: i32,
    pub reflection: i32,
    pub reflection_depth: i32,
    pub refraction: i32,
    pub water_ripples: i32,
    pub ao: i32,
    pub ssr: i32,
    pub ssgi: i32,
    pub shadow_mask: i32,
    pub raytraced_diffuse: i32,
    pub surfel_gi: i32,
    pub vxgi_diffuse: i32,
    pub vxgi_specular: i32,
}

impl Default for CameraDescriptors {
    fn default() -> Self {
        Self {
            primitive_id: -1,
            depth: -1,
            linear_depth: -1,
            velocity: -1,
            normals: -1,
            roughness: -1,
            entity_tiles: -1,
            reflection: -1,
            reflection_depth: -1,
            refraction: -1,
            water_ripples: -1,
            ao: -1,
            ssr: -1,
            ssgi: -1,
            shadow_mask: -1,
            raytraced_diffuse: -1,
            surfel_gi: -1,
            vxgi_diffuse: -1,
            vxgi_specular: -1,
        }
    }
}

fn bundle_texture<'a>(
    effects: &'a BTreeMap<EffectKind, EffectResources>,
    kind: EffectKind,
    name: &str,
) -> Option<&'a Arc<Texture>> {
    effects.get(&kind).and_then(|bundle| bundle.texture(name))
}

impl CameraDescriptors {
    /// Table of the main camera.
    ///
    /// Missing inputs bind a placeholder: white for AO and the shadow mask,
    /// transparent black for everything else.
    pub fn main_camera(
        device: &GraphicsDevice,
        targets: &TargetSet,
        effects: &BTreeMap<EffectKind, EffectResources>,
    ) -> Self {
        let bind = |texture: Option<&Arc<Texture>>, placeholder: Placeholder| match texture {
            Some(texture) => texture.descriptor_index(),
            None => device.placeholder_index(placeholder),
        };
        let black = |texture| bind(texture, Placeholder::TransparentBlack);
        let target = |rt| black(targets.get(rt));

        Self {
            primitive_id: target(Rt::PrimitiveId),
            depth: target(Rt::DepthCopy),
            linear_depth: target(Rt::LinearDepth),
            velocity: target(Rt::Velocity),
            normals: black(bundle_texture(effects, EffectKind::Visibility, "normals")),
            roughness: black(bundle_texture(effects, EffectKind::Visibility, "roughness")),
            entity_tiles: black(bundle_texture(effects, EffectKind::TiledLights, "entity_tiles")),
            reflection: target(Rt::Reflection),
            reflection_depth: target(Rt::DepthReflection),
            refraction: target(Rt::SceneCopy),
            water_ripples: target(Rt::WaterRipple),
            ao: bind(targets.get(Rt::Ao), Placeholder::White),
            ssr: target(Rt::Ssr),
            ssgi: target(Rt::Ssgi),
            shadow_mask: bind(targets.get(Rt::ShadowMask), Placeholder::White),
            raytraced_diffuse: target(Rt::RaytracedDiffuse),
            surfel_gi: black(bundle_texture(effects, EffectKind::SurfelGi, "result")),
            vxgi_diffuse: black(bundle_texture(effects, EffectKind::Vxgi, "diffuse")),
            vxgi_specular: black(bundle_texture(effects, EffectKind::Vxgi, "specular")),
        }
    }

    /// Table of the planar reflection camera: only its own depth and light
    /// tiles are bound.
    pub fn reflection_camera(
        device: &GraphicsDevice,
        targets: &TargetSet,
        effects: &BTreeMap<EffectKind, EffectResources>,
    ) -> Self {
        let index = |texture: Option<&Arc<Texture>>| device.descriptor_index(texture.map(Arc::as_ref));
        Self {
            depth: index(targets.get(Rt::DepthReflection)),
            entity_tiles: index(bundle_texture(effects, EffectKind::TiledLightsReflection, "entity_tiles")),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapabilities;
    use crate::types::{Resolution, TextureDescriptor, TextureFormat, TextureUsage};

    #[test]
    fn test_missing_inputs_bind_placeholders() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let targets = TargetSet::new();
        let table = CameraDescriptors::main_camera(&device, &targets, &BTreeMap::new());

        let white = device.placeholder_index(Placeholder::White);
        let black = device.placeholder_index(Placeholder::TransparentBlack);
        assert_eq!(table.ao, white);
        assert_eq!(table.shadow_mask, white);
        assert_eq!(table.ssr, black);
        assert_eq!(table.surfel_gi, black);
        assert_eq!(table.depth, black);
    }

    #[test]
    fn test_bound_inputs_use_texture_index() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut targets = TargetSet::new();
        targets
            .create(
                &device,
                Rt::Ssr,
                TextureDescriptor::new_2d(32, 32, TextureFormat::Rgba16Float, TextureUsage::SAMPLED_STORAGE),
            )
            .unwrap();
        let mut effects = BTreeMap::new();
        let tiles = EffectResources::create(&device, EffectKind::TiledLights, Resolution::new(32, 32)).unwrap();
        let entity_tiles = tiles.texture("entity_tiles").unwrap().descriptor_index();
        effects.insert(EffectKind::TiledLights, tiles);

        let table = CameraDescriptors::main_camera(&device, &targets, &effects);
        assert_eq!(table.ssr, targets.get(Rt::Ssr).unwrap().descriptor_index());
        assert_eq!(table.entity_tiles, entity_tiles);
    }

    #[test]
    fn test_reflection_camera_leaves_rest_unbound() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut targets = TargetSet::new();
        targets
            .create(
                &device,
                Rt::DepthReflection,
                TextureDescriptor::new_2d(16, 16, TextureFormat::Depth32Float, TextureUsage::SAMPLED_ATTACHMENT),
            )
            .unwrap();
        targets
            .create(
                &device,
                Rt::Ao,
                TextureDescriptor::new_2d(16, 16, TextureFormat::R8Unorm, TextureUsage::SAMPLED_STORAGE),
            )
            .unwrap();

        let table = CameraDescriptors::reflection_camera(&device, &targets, &BTreeMap::new());
        assert!(table.depth >= 0);
        assert_eq!(table.entity_tiles, -1);
        assert_eq!(table.ao, -1);
        assert_eq!(table.refraction, -1);
    }
}
