//! Named render targets of a render path.
//!
//! Every target the render path may allocate has an [`Rt`] key. A
//! [`TargetSet`] stores at most one texture per key; a missing entry means
//! the owning feature is disabled (or resources were never created).
//!
//! Two pairs of targets share memory: `rtPostprocess` lives in the memory of
//! `rtPrimitiveID`, and `rtAO` in the memory of `rtParticleDistortion`. The
//! hosts are registered as regions of an [`AliasArena`] when created; the
//! aliases are declared into those regions. Without a host (the path tracer
//! has no primitive id buffer) an alias gets its own allocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{AliasArena, AliasSlot, Texture};
use crate::types::{Resolution, TextureDescriptor, TextureFormat};

macro_rules! render_targets {
    ($($variant:ident => $name:literal,)*) => {
        /// Render target keys.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Rt {
            $($variant,)*
        }

        impl Rt {
            /// Every key in declaration order.
            pub const ALL: &'static [Rt] = &[$(Rt::$variant,)*];

            /// Number of keys.
            pub const COUNT: usize = Self::ALL.len();

            /// Debug name, also used as the texture label.
            pub fn name(self) -> &'static str {
                match self {
                    $(Rt::$variant => $name,)*
                }
            }
        }
    };
}

render_targets! {
    Main => "rtMain",
    MainRender => "rtMain_render",
    PrimitiveId => "rtPrimitiveID",
    PrimitiveIdRender => "rtPrimitiveID_render",
    ParticleDistortion => "rtParticleDistortion",
    ParticleDistortionResolved => "rtParticleDistortion_Resolved",
    SceneCopy => "rtSceneCopy",
    SceneCopyTmp => "rtSceneCopy_tmp",
    Postprocess => "rtPostprocess",
    GuiBlur0 => "rtGUIBlurredBackground[0]",
    GuiBlur1 => "rtGUIBlurredBackground[1]",
    GuiBlur2 => "rtGUIBlurredBackground[2]",
    ShadingRate => "rtShadingRate",
    DepthMain => "depthBuffer_Main",
    DepthCopy => "depthBuffer_Copy",
    DepthCopy1 => "depthBuffer_Copy1",
    LinearDepth => "rtLinearDepth",
    DebugUav => "debugUAV",
    Ao => "rtAO",
    Ssr => "rtSSR",
    Ssgi => "rtSSGI",
    RaytracedDiffuse => "rtRaytracedDiffuse",
    Fsr0 => "rtFSR[0]",
    Fsr1 => "rtFSR[1]",
    Reflection => "rtReflection",
    DepthReflection => "depthBuffer_Reflection",
    VolumetricLights0 => "rtVolumetricLights[0]",
    VolumetricLights1 => "rtVolumetricLights[1]",
    Sun0 => "rtSun[0]",
    Sun1 => "rtSun[1]",
    SunResolved => "rtSun_resolved",
    OutlineSource => "rtOutlineSource",
    Velocity => "rtVelocity",
    ShadowMask => "rtShadow",
    WaterRipple => "rtWaterRipple",
    TraceResult => "traceResult",
    TraceDepth => "traceDepth",
    TraceStencil => "traceStencil",
    GBufferAlbedo => "rtGBuffer_Albedo",
    GBufferNormal => "rtGBuffer_Normal",
    LightDiffuse => "lightbuffer_diffuse",
    LightSpecular => "lightbuffer_specular",
}

impl Rt {
    /// Target whose memory this target occupies, if it is an alias.
    pub fn alias_host(self) -> Option<Rt> {
        match self {
            Rt::Postprocess => Some(Rt::PrimitiveId),
            Rt::Ao => Some(Rt::ParticleDistortion),
            _ => None,
        }
    }

    /// Whether other targets alias into this one.
    pub fn is_alias_host(self) -> bool {
        matches!(self, Rt::PrimitiveId | Rt::ParticleDistortion)
    }

    /// Logical resource for dependency tracking.
    ///
    /// A multisampled target and its resolve are one logical resource, as
    /// are an alias and its host.
    pub fn logical(self) -> Rt {
        match self {
            Rt::MainRender => Rt::Main,
            Rt::PrimitiveIdRender | Rt::Postprocess => Rt::PrimitiveId,
            Rt::ParticleDistortionResolved | Rt::Ao => Rt::ParticleDistortion,
            Rt::SunResolved => Rt::Sun0,
            other => other,
        }
    }
}

/// Size and format of a target, for comparing resource sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetInfo {
    pub resolution: Resolution,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub mip_level_count: u32,
}

/// Textures of a render path, by key.
#[derive(Debug)]
pub struct TargetSet {
    textures: Vec<Option<Arc<Texture>>>,
    alias_slots: Vec<Option<AliasSlot>>,
    arena: AliasArena,
}

impl TargetSet {
    pub fn new() -> Self {
        Self {
            textures: vec![None; Rt::COUNT],
            alias_slots: vec![None; Rt::COUNT],
            arena: AliasArena::new(),
        }
    }

    pub fn get(&self, rt: Rt) -> Option<&Arc<Texture>> {
        self.textures[rt as usize].as_ref()
    }

    pub fn is_valid(&self, rt: Rt) -> bool {
        self.textures[rt as usize].is_some()
    }

    /// Resolution of a target, if allocated.
    pub fn resolution(&self, rt: Rt) -> Option<Resolution> {
        self.get(rt).map(|t| Resolution::new(t.width(), t.height()))
    }

    /// Allocated targets in key order.
    pub fn iter(&self) -> impl Iterator<Item = (Rt, &Arc<Texture>)> {
        Rt::ALL
            .iter()
            .filter_map(|&rt| self.get(rt).map(|texture| (rt, texture)))
    }

    /// Allocated keys with their size and format.
    pub fn snapshot(&self) -> BTreeMap<Rt, TargetInfo> {
        self.iter()
            .map(|(rt, t)| {
                (
                    rt,
                    TargetInfo {
                        resolution: Resolution::new(t.width(), t.height()),
                        format: t.format(),
                        sample_count: t.sample_count(),
                        mip_level_count: t.mip_level_count(),
                    },
                )
            })
            .collect()
    }

    /// Bytes of device memory owned by the targets. Aliases and shared
    /// handles are not counted twice.
    pub fn memory_size_in_bytes(&self) -> u64 {
        let mut seen: Vec<u64> = Vec::new();
        let mut total = 0;
        for (_, texture) in self.iter() {
            if texture.is_alias() || seen.contains(&texture.id()) {
                continue;
            }
            seen.push(texture.id());
            total += texture.memory_size_in_bytes();
        }
        total
    }

    /// Alias slot of `rt`, if it is registered with the arena.
    pub fn alias_slot(&self, rt: Rt) -> Option<AliasSlot> {
        self.alias_slots[rt as usize]
    }

    pub fn arena(&self) -> &AliasArena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut AliasArena {
        &mut self.arena
    }

    /// (Re)create `rt` from `descriptor`, labelled with the target name.
    ///
    /// Hosts become alias regions. Aliases are placed in their host's
    /// region when the host exists.
    pub(crate) fn create(
        &mut self,
        device: &Arc<GraphicsDevice>,
        rt: Rt,
        descriptor: TextureDescriptor,
    ) -> Result<(), GraphicsError> {
        self.release(rt);
        let descriptor = descriptor.with_label(rt.name());

        let host_slot = rt.alias_host().and_then(|host| self.alias_slot(host));
        let (texture, slot) = match host_slot {
            Some(host_slot) => {
                let (slot, texture) = self.arena.declare(device, host_slot.region(), &descriptor)?;
                (texture, Some(slot))
            }
            None => {
                let texture = device.create_texture(&descriptor)?;
                let slot = rt
                    .is_alias_host()
                    .then(|| self.arena.create_region(Arc::clone(&texture)));
                (texture, slot)
            }
        };

        self.textures[rt as usize] = Some(texture);
        self.alias_slots[rt as usize] = slot;
        Ok(())
    }

    /// Store an existing texture under `rt` (for targets that are the same
    /// handle as another target).
    pub(crate) fn share(&mut self, rt: Rt, texture: Arc<Texture>) {
        self.release(rt);
        self.textures[rt as usize] = Some(texture);
    }

    /// Release `rt`. Releasing an alias retires it from its region.
    pub(crate) fn release(&mut self, rt: Rt) {
        if let Some(slot) = self.alias_slots[rt as usize].take()
            && !slot.is_host()
            && let Err(err) = self.arena.retire(slot)
        {
            log::warn!("TargetSet: failed to retire {}: {err}", rt.name());
        }
        self.textures[rt as usize] = None;
    }

    /// Swap two targets, including alias registration.
    pub(crate) fn swap(&mut self, a: Rt, b: Rt) {
        self.textures.swap(a as usize, b as usize);
        self.alias_slots.swap(a as usize, b as usize);
    }

    /// Release every target and forget all alias regions.
    pub(crate) fn clear(&mut self) {
        self.textures.iter_mut().for_each(|t| *t = None);
        self.alias_slots.iter_mut().for_each(|s| *s = None);
        self.arena.clear();
    }
}

impl Default for TargetSet {
    fn default() -> Self {
        Self::new()
    }
}
