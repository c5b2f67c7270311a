//! The 3D render path.
//!
//! [`RenderPath3D`] owns every render target and effect bundle of one scene
//! view and turns a scene into a submitted frame. One frame goes through
//! three calls:
//!
//! 1. [`update`](RenderPath3D::update) - resize if the resolution, sample
//!    count, format or strategy changed, advance the scene, jitter the
//!    camera, cull, and allocate the resources that depend on per-frame
//!    state (velocity, shadow mask, temporal AA history...).
//! 2. [`render`](RenderPath3D::render) - plan the frame's stages with their
//!    resource accesses, derive the cross-queue waits from a
//!    [`FrameGraph`], begin command lists in dependency order, record them in
//!    parallel on the job system and submit.
//! 3. [`compose`](RenderPath3D::compose) - blit the final postprocess image
//!    into a caller's command list.
//!
//! Feature setters (`set_ssr_enabled`, `set_ao`...) allocate or release
//! their resources immediately when resources exist. Resolution, sample
//! count, format and strategy setters only store the value; the next
//! `update` notices the change and calls
//! [`resize_buffers`](RenderPath3D::resize_buffers) once.
//!
//! # Example
//!
//! ```
//! use lumen_core::jobs::JobSystem;
//! use lumen_graphics::render_path::{FrameStatus, RenderPath3D, RenderStrategy};
//! use lumen_graphics::scene::Scene;
//! use lumen_graphics::{DeviceCapabilities, GraphicsDevice};
//!
//! let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
//! let jobs = JobSystem::new(2);
//! let mut scene = Scene::new();
//!
//! let mut path = RenderPath3D::new(device, RenderStrategy::TiledForward);
//! path.set_resolution(320, 180);
//! path.start().unwrap();
//!
//! assert_eq!(path.update(&mut scene, 1.0 / 60.0, &jobs), FrameStatus::Ready);
//! let report = path.render(&scene, &jobs).unwrap().unwrap();
//! assert!(report.waits_on("compute_effects", "depth_prepass"));
//! ```

mod descriptors;
mod lifecycle;
mod path_tracing;
mod postprocess;
mod render;
mod settings;
mod targets;
mod update;

pub use descriptors::CameraDescriptors;
pub use path_tracing::Accumulation;
pub use postprocess::{ChainImage, ChainInputs, PingPong, PostEffect, PostStep, PostprocessPlan};
pub use render::{FrameResource, Stage};
pub use settings::{
    AoMode, CustomPostprocess, Features, Fsr2Preset, PostprocessOrder, PostprocessSettings, RenderStrategy,
    RendererSettings,
};
pub use targets::{Rt, TargetInfo, TargetSet};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::CompiledFrame;
use crate::device::GraphicsDevice;
use crate::effects::{EffectKind, EffectResources};
use crate::graph::FrameGraph;
use crate::resources::Texture;
use crate::scene::{Camera, Visibility, VisibilityFlags};
use crate::scheduler::{FrameReport, FrameSchedule};
use crate::types::{Resolution, TextureFormat};

/// Outcome of [`RenderPath3D::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Resources are valid and the frame can be rendered.
    Ready,
    /// The frame was skipped: zero resolution or a resource could not be
    /// created. The next `update` retries.
    Skipped,
}

/// Parameters whose change requires a full reallocation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ResizeKey {
    physical: Resolution,
    internal: Resolution,
    sample_count: u32,
    format: TextureFormat,
    strategy: RenderStrategy,
}

/// Culling flags of the planar reflection camera.
const REFLECTION_VISIBILITY: VisibilityFlags = VisibilityFlags::OBJECTS
    .union(VisibilityFlags::EMITTERS)
    .union(VisibilityFlags::HAIRS)
    .union(VisibilityFlags::LIGHTS);

/// Resource owner and frame builder of one 3D view.
pub struct RenderPath3D {
    device: Arc<GraphicsDevice>,
    strategy: RenderStrategy,
    physical: Resolution,
    resolution_scale: f32,
    msaa: u32,
    main_format: TextureFormat,

    features: Features,
    renderer: RendererSettings,
    postprocess: PostprocessSettings,
    custom_postprocess: Vec<CustomPostprocess>,

    targets: TargetSet,
    effects: BTreeMap<EffectKind, EffectResources>,

    camera: Camera,
    camera_reflection: Camera,
    visibility_main: Visibility,
    visibility_reflection: Visibility,
    descriptors: CameraDescriptors,
    descriptors_reflection: CameraDescriptors,

    cache_key: Option<ResizeKey>,
    needs_resize: bool,
    resize_count: u64,

    accumulation: Accumulation,
    frame_count: u64,
    frame_ready: bool,
    video_decode_required: bool,

    schedule: FrameSchedule,
    graph: FrameGraph<FrameResource>,
    compiled: CompiledFrame,
    last_postprocess: Rt,
    last_frame: Option<FrameReport>,
}

impl RenderPath3D {
    /// Create a render path. No resources exist until [`start`](Self::start)
    /// or the first [`update`](Self::update) with a non-zero resolution.
    pub fn new(device: Arc<GraphicsDevice>, strategy: RenderStrategy) -> Self {
        let renderer = RendererSettings::default();
        Self {
            device,
            strategy,
            physical: Resolution::ZERO,
            resolution_scale: 1.0,
            msaa: 1,
            main_format: TextureFormat::Rg11b10Float,
            features: Features::default(),
            renderer,
            postprocess: PostprocessSettings::default(),
            custom_postprocess: Vec::new(),
            targets: TargetSet::new(),
            effects: BTreeMap::new(),
            camera: Camera::default(),
            camera_reflection: Camera::default(),
            visibility_main: Visibility::new(VisibilityFlags::ALL),
            visibility_reflection: Visibility::new(REFLECTION_VISIBILITY),
            descriptors: CameraDescriptors::default(),
            descriptors_reflection: CameraDescriptors::default(),
            cache_key: None,
            needs_resize: false,
            resize_count: 0,
            accumulation: Accumulation::new(renderer.path_tracing_target_samples),
            frame_count: 0,
            frame_ready: false,
            video_decode_required: false,
            schedule: FrameSchedule::new(),
            graph: FrameGraph::new(),
            compiled: CompiledFrame::default(),
            last_postprocess: Rt::Postprocess,
            last_frame: None,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn strategy(&self) -> RenderStrategy {
        self.strategy
    }

    /// Output resolution.
    pub fn physical_resolution(&self) -> Resolution {
        self.physical
    }

    /// Resolution the scene is rendered at.
    pub fn internal_resolution(&self) -> Resolution {
        self.physical.scaled(self.resolution_scale)
    }

    /// Resolution of upscaled images.
    pub fn display_resolution(&self) -> Resolution {
        self.physical.max(self.internal_resolution())
    }

    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    pub fn msaa_sample_count(&self) -> u32 {
        self.msaa
    }

    pub fn main_format(&self) -> TextureFormat {
        self.main_format
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn renderer(&self) -> &RendererSettings {
        &self.renderer
    }

    /// Frame planning switches. Changes apply from the next `update`.
    pub fn renderer_mut(&mut self) -> &mut RendererSettings {
        &mut self.renderer
    }

    pub fn postprocess(&self) -> &PostprocessSettings {
        &self.postprocess
    }

    pub fn postprocess_mut(&mut self) -> &mut PostprocessSettings {
        &mut self.postprocess
    }

    /// Custom compute stages spliced into the postprocess chain.
    pub fn custom_postprocess(&self) -> &[CustomPostprocess] {
        &self.custom_postprocess
    }

    pub fn custom_postprocess_mut(&mut self) -> &mut Vec<CustomPostprocess> {
        &mut self.custom_postprocess
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// Texture of a render target, if allocated.
    pub fn texture(&self, rt: Rt) -> Option<&Arc<Texture>> {
        self.targets.get(rt)
    }

    /// Resource bundle of an effect, if allocated.
    pub fn effect(&self, kind: EffectKind) -> Option<&EffectResources> {
        self.effects.get(&kind)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Reflection camera of the last update.
    pub fn reflection_camera(&self) -> &Camera {
        &self.camera_reflection
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility_main
    }

    pub fn reflection_visibility(&self) -> &Visibility {
        &self.visibility_reflection
    }

    pub fn descriptors(&self) -> &CameraDescriptors {
        &self.descriptors
    }

    pub fn reflection_descriptors(&self) -> &CameraDescriptors {
        &self.descriptors_reflection
    }

    /// Number of full reallocations so far.
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    /// Whether resources match the current parameters.
    pub fn resources_ready(&self) -> bool {
        self.cache_key.is_some()
    }

    pub fn accumulation(&self) -> &Accumulation {
        &self.accumulation
    }

    /// Number of frames that completed `update`.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Whether the last `update` scheduled a video decode.
    pub fn video_decode_required(&self) -> bool {
        self.video_decode_required
    }

    /// Final image of the last rendered frame.
    pub fn last_postprocess(&self) -> Option<&Arc<Texture>> {
        self.targets.get(self.last_postprocess)
    }

    /// Key of the final image of the last rendered frame.
    pub fn last_postprocess_target(&self) -> Rt {
        self.last_postprocess
    }

    /// Report of the last submitted frame.
    pub fn last_frame(&self) -> Option<&FrameReport> {
        self.last_frame.as_ref()
    }

    /// Bytes owned by targets and effect bundles.
    pub fn memory_size_in_bytes(&self) -> u64 {
        self.targets.memory_size_in_bytes()
            + self.effects.values().map(EffectResources::memory_size_in_bytes).sum::<u64>()
    }

    /// Every allocated target and bundle by name, with its resolution.
    pub fn resource_snapshot(&self) -> BTreeMap<String, Resolution> {
        let targets = self
            .targets
            .snapshot()
            .into_iter()
            .map(|(rt, info)| (rt.name().to_string(), info.resolution));
        let effects = self
            .effects
            .iter()
            .map(|(kind, bundle)| (kind.name().to_string(), bundle.resolution()));
        targets.chain(effects).collect()
    }

    fn resize_key(&self) -> ResizeKey {
        ResizeKey {
            physical: self.physical,
            internal: self.internal_resolution(),
            sample_count: self.sample_count(),
            format: self.main_format,
            strategy: self.strategy,
        }
    }

    /// Effective sample count; the path tracer never multisamples.
    fn sample_count(&self) -> u32 {
        if self.strategy.is_path_tracing() { 1 } else { self.msaa }
    }

    fn is_raster(&self) -> bool {
        !self.strategy.is_path_tracing()
    }

    fn ray_tracing_supported(&self) -> bool {
        self.device.capabilities().ray_tracing
    }
}

impl std::fmt::Debug for RenderPath3D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPath3D")
            .field("strategy", &self.strategy)
            .field("physical", &self.physical)
            .field("internal", &self.internal_resolution())
            .field("msaa", &self.msaa)
            .field("targets", &self.targets.iter().count())
            .field("effects", &self.effects.len())
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderPath3D: Send, Sync);
