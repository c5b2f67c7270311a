//! Frame planning, scheduling and recording.
//!
//! `render` turns the state prepared by `update` into a submitted frame:
//!
//! 1. Plan the stages of the frame with the resources each reads and writes.
//! 2. Feed them to a [`FrameGraph`](crate::graph::FrameGraph) keyed by
//!    [`FrameResource`] and compile it into an execution order plus the
//!    cross-queue waits.
//! 3. Begin one command list per stage in that order, add the waits and
//!    hand aliased memory regions over between stages.
//! 4. Record every stage on the job system and submit.

use std::collections::HashMap;
use std::sync::Arc;

use lumen_core::jobs::{JobContext, JobSystem};

use crate::effects::EffectKind;
use crate::effects::passes::{self, AoParams, DepthOfFieldParams, TonemapParams};
use crate::error::GraphicsError;
use crate::resources::{AliasHandle, Barrier, Texture};
use crate::scene::Scene;
use crate::scheduler::{Command, CommandList, FrameReport, FrameSchedule, QueueType};

use super::postprocess::{ChainImage, ChainInputs, PostEffect, PostStep, PostprocessPlan};
use super::settings::{AoMode, RenderStrategy};
use super::targets::{Rt, TargetSet};
use super::RenderPath3D;

/// A resource stages communicate through, for dependency tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameResource {
    Target(Rt),
    Effect(EffectKind),
    FrameConstants,
    AccelerationStructure,
    TerrainPages,
    TerrainTileRequests,
    VideoTextures,
    ShadowAtlas,
    EnvProbes,
    OcclusionQueries,
}

impl FrameResource {
    /// Key used in the frame graph: targets sharing memory or a resolve
    /// collapse to one logical resource.
    pub fn key(self) -> Self {
        match self {
            Self::Target(rt) => Self::Target(rt.logical()),
            other => other,
        }
    }
}

impl From<Rt> for FrameResource {
    fn from(rt: Rt) -> Self {
        Self::Target(rt)
    }
}

impl From<EffectKind> for FrameResource {
    fn from(kind: EffectKind) -> Self {
        Self::Effect(kind)
    }
}

/// Unit of frame work recorded into its own command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    CopyPages,
    PrepareFrame,
    PrepareFrameAsync,
    VideoDecode,
    DepthPrepass,
    ComputeEffects,
    OcclusionCulling,
    ShadowMaps,
    VxgiVoxelize,
    UpdateTextures,
    PlanarReflectionPrepass,
    PlanarReflectionColor,
    OpaqueColorPass,
    TerrainTileRequests,
    TerrainTileWriteback,
    TransparentAndPostprocess,
    PostprocessChain,
    TraceScene,
}

impl Stage {
    /// Command list name.
    pub fn name(self) -> &'static str {
        match self {
            Self::CopyPages => "copy_pages",
            Self::PrepareFrame => "prepare_frame",
            Self::PrepareFrameAsync => "prepare_frame_async",
            Self::VideoDecode => "video_decode",
            Self::DepthPrepass => "depth_prepass",
            Self::ComputeEffects => "compute_effects",
            Self::OcclusionCulling => "occlusion_culling",
            Self::ShadowMaps => "shadow_maps",
            Self::VxgiVoxelize => "vxgi_voxelize",
            Self::UpdateTextures => "update_textures",
            Self::PlanarReflectionPrepass => "planar_reflection_prepass",
            Self::PlanarReflectionColor => "planar_reflection_color",
            Self::OpaqueColorPass => "opaque_color_pass",
            Self::TerrainTileRequests => "terrain_tile_requests",
            Self::TerrainTileWriteback => "terrain_tile_writeback",
            Self::TransparentAndPostprocess => "transparent_and_postprocess",
            Self::PostprocessChain => "postprocess_chain",
            Self::TraceScene => "trace_scene",
        }
    }

    pub fn queue(self) -> QueueType {
        match self {
            Self::CopyPages | Self::TerrainTileWriteback => QueueType::Copy,
            Self::PrepareFrameAsync | Self::ComputeEffects | Self::TerrainTileRequests => QueueType::Compute,
            Self::VideoDecode => QueueType::VideoDecode,
            _ => QueueType::Graphics,
        }
    }
}

/// A planned stage with its raw (not yet logical) resource accesses.
#[derive(Debug, Clone)]
pub(crate) struct StageDecl {
    stage: Stage,
    reads: Vec<FrameResource>,
    writes: Vec<FrameResource>,
}

impl StageDecl {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    fn read(mut self, resource: impl Into<Option<FrameResource>>) -> Self {
        self.reads.extend(resource.into());
        self
    }

    fn write(mut self, resource: impl Into<Option<FrameResource>>) -> Self {
        self.writes.extend(resource.into());
        self
    }

    fn reads_all(mut self, resources: impl IntoIterator<Item = Option<FrameResource>>) -> Self {
        self.reads.extend(resources.into_iter().flatten());
        self
    }

    fn writes_all(mut self, resources: impl IntoIterator<Item = Option<FrameResource>>) -> Self {
        self.writes.extend(resources.into_iter().flatten());
        self
    }

    fn targets(resources: &[FrameResource]) -> impl Iterator<Item = Rt> + '_ {
        resources.iter().filter_map(|r| match r {
            FrameResource::Target(rt) => Some(*rt),
            _ => None,
        })
    }
}

/// Hand aliased regions over between stages in execution order.
///
/// A stage writing an aliased target acquires its region; a stage reading
/// one must find it still held by the handle of its writer. Returns the
/// aliasing barriers each stage records before its work.
pub(crate) fn resolve_aliases<'a>(
    targets: &mut TargetSet,
    stages: impl IntoIterator<Item = &'a StageDecl>,
) -> Result<Vec<Vec<Barrier>>, GraphicsError> {
    let mut handles: HashMap<Rt, AliasHandle> = HashMap::new();
    let mut barriers = Vec::new();

    for decl in stages {
        let mut stage_barriers = Vec::new();
        for rt in StageDecl::targets(&decl.writes) {
            let Some(slot) = targets.alias_slot(rt) else {
                continue;
            };
            let (handle, barrier) = targets.arena_mut().acquire(slot)?;
            stage_barriers.extend(barrier);
            handles.insert(rt, handle);
        }
        for rt in StageDecl::targets(&decl.reads) {
            let Some(slot) = targets.alias_slot(rt) else {
                continue;
            };
            match handles.get(&rt) {
                Some(&handle) => {
                    targets.arena().resolve(handle)?;
                }
                None => {
                    let (handle, barrier) = targets.arena_mut().acquire(slot)?;
                    stage_barriers.extend(barrier);
                    handles.insert(rt, handle);
                }
            }
        }
        barriers.push(stage_barriers);
    }
    Ok(barriers)
}

impl RenderPath3D {
    /// Record and submit the frame prepared by the last [`update`](Self::update).
    ///
    /// Returns `Ok(None)` when there is no prepared frame (the update was
    /// skipped, or this frame was already rendered).
    ///
    /// # Errors
    ///
    /// Fails on a dependency cycle between stages or a stale alias handle.
    /// Lists begun for the frame are discarded.
    pub fn render(&mut self, scene: &Scene, jobs: &JobSystem) -> Result<Option<&FrameReport>, GraphicsError> {
        if !self.frame_ready {
            return Ok(None);
        }
        lumen_core::profile_scope!("RenderPath3D::render");

        let plan = PostprocessPlan::build(&self.chain_inputs(scene));
        let (stages, manual) = if self.is_raster() {
            self.plan_raster(scene, &plan)
        } else {
            self.plan_path_tracing(scene, &plan)
        };

        self.graph.clear();
        let mut handles = Vec::with_capacity(stages.len());
        for decl in &stages {
            let reads: Vec<FrameResource> = decl.reads.iter().map(|r| r.key()).collect();
            let writes: Vec<FrameResource> = decl.writes.iter().map(|r| r.key()).collect();
            handles.push(self.graph.add_job(decl.stage.name(), decl.stage.queue(), &reads, &writes));
        }
        for (dependent, dependency) in manual {
            let find = |stage: Stage| stages.iter().position(|d| d.stage == stage);
            if let (Some(a), Some(b)) = (find(dependent), find(dependency)) {
                self.graph.add_dependency(handles[a], handles[b]);
            }
        }
        self.graph.compile_into(&mut self.compiled)?;

        let order: Vec<usize> = self.compiled.order().iter().map(|h| h.index()).collect();
        let mut lists: Vec<Option<CommandList>> = vec![None; stages.len()];
        for &index in &order {
            let stage = stages[index].stage;
            lists[index] = Some(self.schedule.begin_command_list(stage.name(), stage.queue()));
        }
        for &(dependent, dependency) in self.compiled.waits() {
            if let (Some(a), Some(b)) = (lists[dependent.index()], lists[dependency.index()]) {
                self.schedule.wait_command_list(a, b);
            }
        }

        let barriers = match resolve_aliases(&mut self.targets, order.iter().map(|&i| &stages[i])) {
            Ok(barriers) => barriers,
            Err(err) => {
                self.schedule.discard();
                log::warn!("RenderPath3D: discarding frame: {err}");
                return Err(err);
            }
        };
        for (&index, stage_barriers) in order.iter().zip(barriers) {
            if let Some(cmd) = lists[index] {
                self.schedule
                    .record_all(cmd, stage_barriers.into_iter().map(Command::Barrier));
            }
        }

        {
            lumen_core::profile_scope!("RenderPath3D::record");
            let this = &*self;
            let plan = &plan;
            let stages = &stages;
            let lists = &lists;
            jobs.scope(|scope| {
                let ctx = JobContext::new();
                for &index in &order {
                    let Some(cmd) = lists[index] else {
                        continue;
                    };
                    let stage = stages[index].stage;
                    scope.execute(&ctx, move |_| this.record_stage(stage, cmd, scene, plan));
                }
                scope.wait(&ctx);
            });
        }

        let traced = stages.iter().any(|d| d.stage == Stage::TraceScene);
        let mut report = self.schedule.submit()?;
        report.last_postprocess = self.targets.get(plan.last()).cloned();
        self.last_postprocess = plan.last();
        log::trace!(
            "RenderPath3D: frame {} submitted {} lists, {} commands",
            report.frame_index,
            report.lists().len(),
            report.command_count()
        );

        if let Some(previous) = self.last_frame.replace(report) {
            self.schedule.recycle(previous);
        }
        if traced {
            self.accumulation.advance();
        }
        self.frame_ready = false;
        lumen_core::frame_mark!();
        Ok(self.last_frame.as_ref())
    }

    /// Draw the final image of the last frame into `cmd`, plus the light
    /// culling heatmap when enabled.
    pub fn compose(&self, schedule: &FrameSchedule, cmd: CommandList) {
        let Some(image) = self.last_postprocess() else {
            log::trace!("RenderPath3D: nothing to compose");
            return;
        };
        passes::record_effect(schedule, cmd, "compose", None, &[image], None, &[]);
        if self.renderer.light_culling_debug
            && let Some(debug) = self.targets.get(Rt::DebugUav)
        {
            passes::record_effect(schedule, cmd, "light_culling_debug", None, &[debug], None, &[]);
        }
    }

    /// Which chain stages run for the current settings and resources.
    pub(crate) fn chain_inputs(&self, scene: &Scene) -> ChainInputs {
        let raster = self.is_raster();
        let has = |kind: EffectKind| self.effects.contains_key(&kind);
        let post = &self.postprocess;
        let fsr2 = raster && self.features.fsr2 && has(EffectKind::Fsr2) && self.targets.is_valid(Rt::Fsr0);

        ChainInputs {
            fsr2,
            temporal_aa: raster && self.renderer.temporal_aa && !fsr2 && has(EffectKind::TemporalAa),
            underwater: scene.weather.is_underwater(&self.camera.eye),
            custom: self.custom_postprocess.clone(),
            depth_of_field: raster
                && self.features.depth_of_field
                && self.camera.aperture_size > 0.001
                && post.depth_of_field_strength > 0.001
                && has(EffectKind::DepthOfField),
            motion_blur: raster
                && self.features.motion_blur
                && post.motion_blur_strength > 0.0
                && has(EffectKind::MotionBlur),
            eye_adaption: has(EffectKind::EyeAdaption),
            bloom: has(EffectKind::Bloom),
            sharpen: post.sharpen,
            fxaa: post.fxaa,
            chromatic_aberration: post.chromatic_aberration,
            crt: post.crt,
            gui_blur: post.gui_blur && self.targets.is_valid(Rt::GuiBlur0),
            fsr: raster && self.features.fsr && !self.features.fsr2 && self.targets.is_valid(Rt::Fsr0),
        }
    }

    fn target_resource(&self, rt: Rt) -> Option<FrameResource> {
        self.targets.is_valid(rt).then_some(FrameResource::Target(rt))
    }

    fn effect_resource(&self, kind: EffectKind) -> Option<FrameResource> {
        self.effects.contains_key(&kind).then_some(FrameResource::Effect(kind))
    }

    fn reflection_pass_scheduled(&self) -> bool {
        self.targets.is_valid(Rt::DepthReflection) && self.visibility_main.planar_reflection_visible
    }

    fn plan_raster(&self, scene: &Scene, plan: &PostprocessPlan) -> (Vec<StageDecl>, Vec<(Stage, Stage)>) {
        let t = |rt| self.target_resource(rt);
        let e = |kind| self.effect_resource(kind);
        let terrains = !scene.terrains.is_empty();
        let video = self.video_decode_required;
        let ray_traced = [
            EffectKind::Rtao,
            EffectKind::RtReflection,
            EffectKind::RtDiffuse,
            EffectKind::RtShadow,
            EffectKind::SurfelGi,
        ]
        .iter()
        .any(|kind| self.effects.contains_key(kind));
        let acceleration = (ray_traced && scene.acceleration_structure_update_requested)
            .then_some(FrameResource::AccelerationStructure);

        let mut stages = Vec::new();
        let mut manual = Vec::new();

        if terrains {
            stages.push(StageDecl::new(Stage::CopyPages).write(FrameResource::TerrainPages));
        }
        stages.push(
            StageDecl::new(Stage::PrepareFrame)
                .read(terrains.then_some(FrameResource::TerrainPages))
                .write(FrameResource::FrameConstants)
                .write(t(Rt::WaterRipple)),
        );
        stages.push(
            StageDecl::new(Stage::PrepareFrameAsync)
                .read(FrameResource::FrameConstants)
                .write(acceleration)
                .write(e(EffectKind::SurfelGi)),
        );
        if video {
            stages.push(StageDecl::new(Stage::VideoDecode).write(FrameResource::VideoTextures));
        }
        stages.push(
            StageDecl::new(Stage::DepthPrepass)
                .read(FrameResource::FrameConstants)
                .writes_all([
                    t(Rt::DepthMain),
                    t(Rt::PrimitiveId),
                    t(Rt::DepthCopy),
                    t(Rt::LinearDepth),
                    t(Rt::Velocity),
                ]),
        );
        stages.push(
            StageDecl::new(Stage::ComputeEffects)
                .reads_all([t(Rt::DepthCopy), t(Rt::LinearDepth), t(Rt::PrimitiveId), t(Rt::Velocity)])
                .read(video.then_some(FrameResource::VideoTextures))
                .read(ray_traced.then_some(FrameResource::AccelerationStructure))
                .writes_all([
                    e(EffectKind::TiledLights),
                    e(EffectKind::Visibility),
                    e(EffectKind::ScreenSpaceShadow),
                    e(EffectKind::Ssao),
                    e(EffectKind::Hbao),
                    e(EffectKind::Msao),
                    e(EffectKind::Rtao),
                    e(EffectKind::Ssr),
                    e(EffectKind::RtReflection),
                    e(EffectKind::Ssgi),
                    e(EffectKind::RtDiffuse),
                    e(EffectKind::RtShadow),
                    t(Rt::Ao),
                    t(Rt::Ssr),
                    t(Rt::Ssgi),
                    t(Rt::RaytracedDiffuse),
                    t(Rt::ShadowMask),
                ])
                .write(self.renderer.light_culling_debug.then(|| t(Rt::DebugUav)).flatten()),
        );
        if self.renderer.occlusion_culling {
            stages.push(
                StageDecl::new(Stage::OcclusionCulling)
                    .read(t(Rt::DepthCopy))
                    .write(FrameResource::OcclusionQueries),
            );
        }
        if self.renderer.shadows {
            stages.push(
                StageDecl::new(Stage::ShadowMaps)
                    .read(FrameResource::FrameConstants)
                    .write(FrameResource::ShadowAtlas),
            );
        }
        if self.effects.contains_key(&EffectKind::Vxgi) {
            stages.push(
                StageDecl::new(Stage::VxgiVoxelize)
                    .read(FrameResource::FrameConstants)
                    .write(e(EffectKind::Vxgi)),
            );
        }
        stages.push(
            StageDecl::new(Stage::UpdateTextures)
                .read(FrameResource::FrameConstants)
                .read(acceleration)
                .write(FrameResource::EnvProbes),
        );

        let reflection_pass = self.reflection_pass_scheduled();
        if reflection_pass {
            stages.push(
                StageDecl::new(Stage::PlanarReflectionPrepass)
                    .read(FrameResource::FrameConstants)
                    .write(t(Rt::DepthReflection))
                    .write(e(EffectKind::TiledLightsReflection)),
            );
            stages.push(
                StageDecl::new(Stage::PlanarReflectionColor)
                    .reads_all([
                        t(Rt::DepthReflection),
                        e(EffectKind::TiledLightsReflection),
                        Some(FrameResource::ShadowAtlas),
                        Some(FrameResource::EnvProbes),
                    ])
                    .writes_all([
                        t(Rt::Reflection),
                        e(EffectKind::AerialPerspectiveReflection),
                        e(EffectKind::VolumetricCloudsReflection),
                    ]),
            );
        }

        let shadows = if self.targets.is_valid(Rt::ShadowMask) {
            t(Rt::ShadowMask)
        } else {
            Some(FrameResource::ShadowAtlas)
        };
        let deferred = self.strategy == RenderStrategy::Deferred;
        stages.push(
            StageDecl::new(Stage::OpaqueColorPass)
                .reads_all([
                    e(EffectKind::TiledLights),
                    t(Rt::Ao),
                    t(Rt::Ssr),
                    t(Rt::Ssgi),
                    t(Rt::RaytracedDiffuse),
                    shadows,
                    reflection_pass.then(|| t(Rt::Reflection)).flatten(),
                    Some(FrameResource::EnvProbes),
                    e(EffectKind::Vxgi),
                    e(EffectKind::SurfelGi),
                    video.then_some(FrameResource::VideoTextures),
                    self.renderer.occlusion_culling.then_some(FrameResource::OcclusionQueries),
                ])
                .writes_all([t(Rt::MainRender), t(Rt::ShadingRate)])
                .writes_all(
                    [
                        t(Rt::GBufferAlbedo),
                        t(Rt::GBufferNormal),
                        t(Rt::LightDiffuse),
                        t(Rt::LightSpecular),
                    ]
                    .map(|r| r.filter(|_| deferred)),
                ),
        );

        if terrains {
            stages.push(
                StageDecl::new(Stage::TerrainTileRequests)
                    .read(FrameResource::FrameConstants)
                    .write(FrameResource::TerrainTileRequests),
            );
            stages.push(
                StageDecl::new(Stage::TerrainTileWriteback)
                    .read(FrameResource::TerrainTileRequests)
                    .write(FrameResource::TerrainPages),
            );
        }

        stages.push(
            StageDecl::new(Stage::TransparentAndPostprocess)
                .reads_all([
                    t(Rt::DepthCopy),
                    t(Rt::WaterRipple),
                    e(EffectKind::TiledLights),
                    reflection_pass.then(|| t(Rt::Reflection)).flatten(),
                ])
                .writes_all([
                    t(Rt::SceneCopy),
                    t(Rt::SceneCopyTmp),
                    t(Rt::ParticleDistortion),
                    t(Rt::ParticleDistortionResolved),
                    t(Rt::Main),
                    t(Rt::VolumetricLights0),
                    t(Rt::VolumetricLights1),
                    t(Rt::Sun0),
                    t(Rt::Sun1),
                    t(Rt::SunResolved),
                    t(Rt::OutlineSource),
                    e(EffectKind::AerialPerspective),
                    e(EffectKind::VolumetricClouds),
                ]),
        );
        manual.push((Stage::TransparentAndPostprocess, Stage::OcclusionCulling));

        stages.push(self.plan_postprocess_chain(plan));
        (stages, manual)
    }

    fn plan_path_tracing(&self, scene: &Scene, plan: &PostprocessPlan) -> (Vec<StageDecl>, Vec<(Stage, Stage)>) {
        let t = |rt| self.target_resource(rt);
        let terrains = !scene.terrains.is_empty();
        let mut stages = Vec::new();

        if terrains {
            stages.push(StageDecl::new(Stage::CopyPages).write(FrameResource::TerrainPages));
        }
        stages.push(
            StageDecl::new(Stage::PrepareFrame)
                .read(terrains.then_some(FrameResource::TerrainPages))
                .write(FrameResource::FrameConstants)
                .write(FrameResource::AccelerationStructure),
        );
        if !self.accumulation.is_complete() {
            stages.push(
                StageDecl::new(Stage::TraceScene)
                    .read(FrameResource::FrameConstants)
                    .read(FrameResource::AccelerationStructure)
                    .writes_all([
                        t(Rt::TraceResult),
                        t(Rt::Main),
                        t(Rt::TraceDepth),
                        t(Rt::DepthCopy),
                        t(Rt::TraceStencil),
                    ]),
            );
        }
        if terrains {
            stages.push(
                StageDecl::new(Stage::TerrainTileRequests)
                    .read(FrameResource::FrameConstants)
                    .write(FrameResource::TerrainTileRequests),
            );
            stages.push(
                StageDecl::new(Stage::TerrainTileWriteback)
                    .read(FrameResource::TerrainTileRequests)
                    .write(FrameResource::TerrainPages),
            );
        }
        stages.push(self.plan_postprocess_chain(plan));
        (stages, Vec::new())
    }

    fn plan_postprocess_chain(&self, plan: &PostprocessPlan) -> StageDecl {
        let t = |rt| self.target_resource(rt);
        let e = |kind| self.effect_resource(kind);
        let bundles = plan.steps().iter().filter_map(|step| match step.effect {
            PostEffect::Fsr2 => e(EffectKind::Fsr2),
            PostEffect::TemporalAa => e(EffectKind::TemporalAa),
            PostEffect::DepthOfField => e(EffectKind::DepthOfField),
            PostEffect::MotionBlur => e(EffectKind::MotionBlur),
            PostEffect::EyeAdaption => e(EffectKind::EyeAdaption),
            PostEffect::Bloom => e(EffectKind::Bloom),
            _ => None,
        });

        StageDecl::new(Stage::PostprocessChain)
            .reads_all(plan.read_targets().into_iter().map(t))
            .reads_all([
                t(Rt::DepthCopy),
                t(Rt::Velocity),
                t(Rt::ParticleDistortion),
                t(Rt::ParticleDistortionResolved),
            ])
            .writes_all(plan.written_targets().into_iter().map(t))
            .writes_all(bundles.map(Some))
    }

    fn record_stage(&self, stage: Stage, cmd: CommandList, scene: &Scene, plan: &PostprocessPlan) {
        let schedule = &self.schedule;
        schedule.record(cmd, Command::BeginEvent(stage.name()));
        match stage {
            Stage::CopyPages => {
                schedule.record(cmd, Command::Dispatch { label: "terrain_page_copy" });
            }
            Stage::PrepareFrame => self.record_prepare_frame(cmd, scene),
            Stage::PrepareFrameAsync => self.record_prepare_frame_async(cmd, scene),
            Stage::VideoDecode => {
                for _ in scene.videos.iter().filter(|v| v.playing) {
                    schedule.record(cmd, Command::Dispatch { label: "video_decode" });
                }
            }
            Stage::DepthPrepass => self.record_depth_prepass(cmd),
            Stage::ComputeEffects => self.record_compute_effects(cmd),
            Stage::OcclusionCulling => {
                schedule.record(cmd, Command::Dispatch { label: "occlusion_queries" });
            }
            Stage::ShadowMaps => {
                schedule.record_all(
                    cmd,
                    [
                        Command::RenderPassBegin {
                            label: "shadow_maps",
                            targets: Vec::new(),
                        },
                        Command::Draw {
                            label: "shadow_casters",
                            count: self.visibility_main.visible_lights.len() as u32,
                        },
                        Command::RenderPassEnd,
                    ],
                );
            }
            Stage::VxgiVoxelize => {
                if let Some(vxgi) = self.effects.get(&EffectKind::Vxgi) {
                    passes::record_effect(schedule, cmd, "vxgi_voxelize", Some(vxgi), &[], None, &[]);
                }
            }
            Stage::UpdateTextures => {
                for _ in &self.visibility_main.visible_env_probes {
                    schedule.record(cmd, Command::Dispatch { label: "env_probe_refresh" });
                }
            }
            Stage::PlanarReflectionPrepass => self.record_reflection_prepass(cmd),
            Stage::PlanarReflectionColor => self.record_reflection_color(cmd),
            Stage::OpaqueColorPass => self.record_opaque(cmd),
            Stage::TerrainTileRequests => {
                schedule.record(cmd, Command::Dispatch { label: "terrain_tile_requests" });
            }
            Stage::TerrainTileWriteback => {
                schedule.record(cmd, Command::Dispatch { label: "terrain_tile_writeback" });
            }
            Stage::TransparentAndPostprocess => self.record_transparent(cmd),
            Stage::PostprocessChain => self.record_postprocess_chain(cmd, plan),
            Stage::TraceScene => self.record_trace(cmd),
        }
        schedule.record(cmd, Command::EndEvent);
    }

    fn record_prepare_frame(&self, cmd: CommandList, scene: &Scene) {
        let schedule = &self.schedule;
        schedule.record(cmd, Command::Dispatch { label: "frame_constants" });
        if !self.is_raster() {
            schedule.record(cmd, Command::Dispatch { label: "acceleration_structure_build" });
        }
        if let Some(ripples) = self.targets.get(Rt::WaterRipple) {
            schedule.record_all(
                cmd,
                [
                    Command::RenderPassBegin {
                        label: "water_ripples",
                        targets: vec![Arc::clone(ripples)],
                    },
                    Command::Draw {
                        label: "ripples",
                        count: scene.water_ripples.len() as u32,
                    },
                    Command::RenderPassEnd,
                ],
            );
        }
    }

    fn record_prepare_frame_async(&self, cmd: CommandList, scene: &Scene) {
        let schedule = &self.schedule;
        if scene.acceleration_structure_update_requested && self.ray_tracing_supported() {
            schedule.record(cmd, Command::Dispatch { label: "acceleration_structure_update" });
        }
        if let Some(surfels) = self.effects.get(&EffectKind::SurfelGi) {
            let output = surfels.texture("result");
            passes::record_effect(schedule, cmd, "surfel_gi", Some(surfels), &[], output, &[]);
        }
    }

    fn record_depth_prepass(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let Some(depth) = self.targets.get(Rt::DepthMain) else {
            return;
        };
        let mut attachments = vec![Arc::clone(depth)];
        attachments.extend(self.targets.get(Rt::PrimitiveIdRender).cloned());
        schedule.record_all(
            cmd,
            [
                Command::RenderPassBegin {
                    label: "depth_prepass",
                    targets: attachments,
                },
                Command::Draw {
                    label: "opaque_depth",
                    count: self.visibility_main.visible_objects.len() as u32,
                },
                Command::RenderPassEnd,
            ],
        );

        if self.sample_count() > 1
            && let (Some(render), Some(resolved)) =
                (self.targets.get(Rt::PrimitiveIdRender), self.targets.get(Rt::PrimitiveId))
        {
            schedule.record(
                cmd,
                Command::Copy {
                    label: "primitive_id_resolve",
                    source: Arc::clone(render),
                    destination: Arc::clone(resolved),
                },
            );
        }
        let Some(copy) = self.targets.get(Rt::DepthCopy) else {
            return;
        };
        schedule.record(
            cmd,
            Command::Copy {
                label: "depth_copy",
                source: Arc::clone(depth),
                destination: Arc::clone(copy),
            },
        );
        if let Some(linear) = self.targets.get(Rt::LinearDepth) {
            passes::record_effect(schedule, cmd, "linear_depth", None, &[copy], Some(linear), &[]);
            passes::generate_mips(schedule, cmd, linear);
        }
        if let Some(velocity) = self.targets.get(Rt::Velocity) {
            passes::record_effect(schedule, cmd, "velocity", None, &[copy], Some(velocity), &[]);
        }
    }

    fn record_compute_effects(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let post = &self.postprocess;
        let Some(depth) = self.targets.get(Rt::DepthCopy) else {
            return;
        };

        if let Some(tiles) = self.effects.get(&EffectKind::TiledLights) {
            passes::tiled_light_culling(schedule, cmd, tiles, depth);
            if self.renderer.light_culling_debug
                && let Some(debug) = self.targets.get(Rt::DebugUav)
            {
                passes::record_effect(schedule, cmd, "light_culling_heatmap", Some(tiles), &[depth], Some(debug), &[]);
            }
        }
        if let Some(visibility) = self.effects.get(&EffectKind::Visibility) {
            let mut inputs = vec![depth];
            inputs.extend(self.targets.get(Rt::PrimitiveId));
            passes::record_effect(schedule, cmd, "visibility_resolve", Some(visibility), &inputs, None, &[]);
        }

        let ao_kind = match self.features.ao {
            AoMode::Disabled => None,
            AoMode::Ssao => Some(EffectKind::Ssao),
            AoMode::Hbao => Some(EffectKind::Hbao),
            AoMode::Msao => Some(EffectKind::Msao),
            AoMode::Rtao => Some(EffectKind::Rtao),
        };
        if let Some(kind) = ao_kind
            && let (Some(bundle), Some(output)) = (self.effects.get(&kind), self.targets.get(Rt::Ao))
        {
            passes::ambient_occlusion(
                schedule,
                cmd,
                self.features.ao.effect_name(),
                bundle,
                depth,
                output,
                AoParams {
                    range: post.ao_range,
                    power: post.ao_power,
                    sample_count: post.ao_sample_count,
                },
            );
        }

        if let Some(output) = self.targets.get(Rt::Ssr) {
            let mut inputs = vec![depth];
            inputs.extend(self.targets.get(Rt::Velocity));
            let reflection = [(EffectKind::RtReflection, "rt_reflection"), (EffectKind::Ssr, "ssr")]
                .into_iter()
                .find_map(|(kind, name)| self.effects.get(&kind).map(|bundle| (bundle, name)));
            if let Some((bundle, name)) = reflection {
                passes::reflections(schedule, cmd, name, bundle, &inputs, output, post.ssr_roughness_cutoff);
            }
        }
        for (kind, rt, name) in [
            (EffectKind::Ssgi, Rt::Ssgi, "ssgi"),
            (EffectKind::RtDiffuse, Rt::RaytracedDiffuse, "rt_diffuse"),
        ] {
            if let (Some(bundle), Some(output)) = (self.effects.get(&kind), self.targets.get(rt)) {
                passes::record_effect(schedule, cmd, name, Some(bundle), &[depth], Some(output), &[]);
            }
        }

        if let Some(mask) = self.targets.get(Rt::ShadowMask) {
            if let Some(bundle) = self.effects.get(&EffectKind::RtShadow) {
                passes::record_effect(schedule, cmd, "rt_shadows", Some(bundle), &[depth], Some(mask), &[]);
            } else if let Some(bundle) = self.effects.get(&EffectKind::ScreenSpaceShadow) {
                passes::record_effect(
                    schedule,
                    cmd,
                    "screen_space_shadows",
                    Some(bundle),
                    &[depth],
                    Some(mask),
                    &[
                        ("range", post.screen_space_shadow_range),
                        ("samples", post.screen_space_shadow_samples as f32),
                    ],
                );
            }
        }
    }

    fn record_reflection_prepass(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let Some(depth) = self.targets.get(Rt::DepthReflection) else {
            return;
        };
        schedule.record_all(
            cmd,
            [
                Command::RenderPassBegin {
                    label: "planar_reflection_depth",
                    targets: vec![Arc::clone(depth)],
                },
                Command::Draw {
                    label: "reflection_depth",
                    count: self.visibility_reflection.visible_objects.len() as u32,
                },
                Command::RenderPassEnd,
            ],
        );
        if let Some(tiles) = self.effects.get(&EffectKind::TiledLightsReflection) {
            passes::tiled_light_culling(schedule, cmd, tiles, depth);
        }
    }

    fn record_reflection_color(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let (Some(color), Some(depth)) = (self.targets.get(Rt::Reflection), self.targets.get(Rt::DepthReflection)) else {
            return;
        };
        schedule.record_all(
            cmd,
            [
                Command::RenderPassBegin {
                    label: "planar_reflection",
                    targets: vec![Arc::clone(color), Arc::clone(depth)],
                },
                Command::Draw {
                    label: "reflection_opaque",
                    count: self.visibility_reflection.visible_objects.len() as u32,
                },
                Command::Draw {
                    label: "reflection_sky",
                    count: 1,
                },
                Command::RenderPassEnd,
            ],
        );
        for (kind, name) in [
            (EffectKind::AerialPerspectiveReflection, "aerial_perspective_reflection"),
            (EffectKind::VolumetricCloudsReflection, "volumetric_clouds_reflection"),
        ] {
            if let Some(bundle) = self.effects.get(&kind) {
                passes::record_effect(schedule, cmd, name, Some(bundle), &[depth], Some(color), &[]);
            }
        }
    }

    fn record_opaque(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let (Some(color), Some(depth)) = (self.targets.get(Rt::MainRender), self.targets.get(Rt::DepthMain)) else {
            return;
        };
        let opaque_count = self.visibility_main.visible_objects.len() as u32;

        if self.renderer.variable_rate_shading
            && let Some(rate) = self.targets.get(Rt::ShadingRate)
        {
            let inputs: Vec<&Arc<Texture>> = self.targets.get(Rt::Velocity).into_iter().collect();
            passes::record_effect(schedule, cmd, "shading_rate_classification", None, &inputs, Some(rate), &[]);
        }

        if self.strategy == RenderStrategy::Deferred
            && let (Some(albedo), Some(normal), Some(diffuse), Some(specular)) = (
                self.targets.get(Rt::GBufferAlbedo),
                self.targets.get(Rt::GBufferNormal),
                self.targets.get(Rt::LightDiffuse),
                self.targets.get(Rt::LightSpecular),
            )
        {
            schedule.record_all(
                cmd,
                [
                    Command::RenderPassBegin {
                        label: "gbuffer",
                        targets: vec![Arc::clone(albedo), Arc::clone(normal), Arc::clone(depth)],
                    },
                    Command::Draw {
                        label: "opaque",
                        count: opaque_count,
                    },
                    Command::RenderPassEnd,
                ],
            );
            let tiles = self.effects.get(&EffectKind::TiledLights);
            passes::record_effect(schedule, cmd, "deferred_lighting", tiles, &[albedo, normal, depth], Some(diffuse), &[]);
            passes::record_effect(schedule, cmd, "deferred_specular", tiles, &[albedo, normal, depth], Some(specular), &[]);
            passes::record_effect(schedule, cmd, "deferred_composite", None, &[diffuse, specular], Some(color), &[]);
            schedule.record_all(
                cmd,
                [
                    Command::RenderPassBegin {
                        label: "sky",
                        targets: vec![Arc::clone(color), Arc::clone(depth)],
                    },
                    Command::Draw { label: "sky", count: 1 },
                    Command::RenderPassEnd,
                ],
            );
        } else {
            schedule.record_all(
                cmd,
                [
                    Command::RenderPassBegin {
                        label: "opaque",
                        targets: vec![Arc::clone(color), Arc::clone(depth)],
                    },
                    Command::Draw {
                        label: "opaque",
                        count: opaque_count,
                    },
                    Command::Draw { label: "sky", count: 1 },
                    Command::RenderPassEnd,
                ],
            );
        }

        if self.sample_count() > 1
            && let Some(main) = self.targets.get(Rt::Main)
        {
            schedule.record(
                cmd,
                Command::Copy {
                    label: "main_resolve",
                    source: Arc::clone(color),
                    destination: Arc::clone(main),
                },
            );
        }
    }

    fn record_transparent(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let (Some(main), Some(color), Some(depth)) = (
            self.targets.get(Rt::Main),
            self.targets.get(Rt::MainRender),
            self.targets.get(Rt::DepthMain),
        ) else {
            return;
        };
        let vis = &self.visibility_main;

        if let (Some(copy), Some(temp)) = (self.targets.get(Rt::SceneCopy), self.targets.get(Rt::SceneCopyTmp)) {
            passes::downsample(schedule, cmd, main, copy);
            passes::generate_mips(schedule, cmd, copy);
            passes::gaussian_blur(schedule, cmd, copy, temp, copy);
        }
        let depth_copy = self.targets.get(Rt::DepthCopy);
        for (kind, name) in [
            (EffectKind::AerialPerspective, "aerial_perspective"),
            (EffectKind::VolumetricClouds, "volumetric_clouds"),
        ] {
            if let Some(bundle) = self.effects.get(&kind) {
                let inputs: Vec<&Arc<Texture>> = depth_copy.into_iter().collect();
                passes::record_effect(schedule, cmd, name, Some(bundle), &inputs, Some(main), &[]);
            }
        }

        schedule.record_all(
            cmd,
            [
                Command::RenderPassBegin {
                    label: "transparent",
                    targets: vec![Arc::clone(color), Arc::clone(depth)],
                },
                Command::Draw {
                    label: "transparent",
                    count: if vis.transparents_visible { vis.visible_objects.len() as u32 } else { 0 },
                },
                Command::Draw {
                    label: "emitters",
                    count: vis.visible_emitters.len() as u32,
                },
                Command::Draw {
                    label: "hair",
                    count: vis.visible_hairs.len() as u32,
                },
                Command::RenderPassEnd,
            ],
        );

        if let Some(distortion) = self.targets.get(Rt::ParticleDistortion) {
            schedule.record_all(
                cmd,
                [
                    Command::RenderPassBegin {
                        label: "particle_distortion",
                        targets: vec![Arc::clone(distortion), Arc::clone(depth)],
                    },
                    Command::Draw {
                        label: "distortion_emitters",
                        count: vis.visible_emitters.len() as u32,
                    },
                    Command::RenderPassEnd,
                ],
            );
            if let Some(resolved) = self.targets.get(Rt::ParticleDistortionResolved) {
                schedule.record(
                    cmd,
                    Command::Copy {
                        label: "particle_distortion_resolve",
                        source: Arc::clone(distortion),
                        destination: Arc::clone(resolved),
                    },
                );
            }
        }

        if vis.volumetric_lights_visible
            && let (Some(lights), Some(temp)) =
                (self.targets.get(Rt::VolumetricLights0), self.targets.get(Rt::VolumetricLights1))
        {
            passes::record_effect(schedule, cmd, "volumetric_lights", None, &[depth], Some(lights), &[]);
            passes::gaussian_blur(schedule, cmd, lights, temp, lights);
        }

        if let (Some(sun), Some(shafts)) = (self.targets.get(Rt::Sun0), self.targets.get(Rt::Sun1)) {
            schedule.record_all(
                cmd,
                [
                    Command::RenderPassBegin {
                        label: "sun",
                        targets: vec![Arc::clone(sun), Arc::clone(depth)],
                    },
                    Command::Draw { label: "sun", count: 1 },
                    Command::RenderPassEnd,
                ],
            );
            let source = match self.targets.get(Rt::SunResolved) {
                Some(resolved) => {
                    schedule.record(
                        cmd,
                        Command::Copy {
                            label: "sun_resolve",
                            source: Arc::clone(sun),
                            destination: Arc::clone(resolved),
                        },
                    );
                    resolved
                }
                None => sun,
            };
            passes::record_effect(schedule, cmd, "light_shafts", None, &[source], Some(shafts), &[]);
        }

        if let Some(outline) = self.targets.get(Rt::OutlineSource) {
            passes::record_effect(schedule, cmd, "outline_source", None, &[depth], Some(outline), &[]);
            passes::record_effect(
                schedule,
                cmd,
                "outline",
                None,
                &[outline],
                Some(main),
                &[
                    ("threshold", self.postprocess.outline_threshold),
                    ("thickness", self.postprocess.outline_thickness),
                ],
            );
        }

        if self.sample_count() > 1 {
            schedule.record(
                cmd,
                Command::Copy {
                    label: "main_resolve",
                    source: Arc::clone(color),
                    destination: Arc::clone(main),
                },
            );
        }
    }

    fn record_trace(&self, cmd: CommandList) {
        let schedule = &self.schedule;
        let (Some(result), Some(main)) = (self.targets.get(Rt::TraceResult), self.targets.get(Rt::Main)) else {
            return;
        };
        let sample = self.accumulation.samples() as f32;
        passes::record_effect(schedule, cmd, "path_trace", None, &[], Some(result), &[("sample", sample)]);
        for rt in [Rt::TraceDepth, Rt::TraceStencil] {
            if let Some(aux) = self.targets.get(rt) {
                passes::record_effect(schedule, cmd, "trace_gbuffer", None, &[], Some(aux), &[]);
            }
        }
        passes::record_effect(schedule, cmd, "trace_accumulate", None, &[result], Some(main), &[("sample", sample)]);
    }

    /// Texture behind a chain image.
    fn chain_texture(&self, image: ChainImage) -> Option<&Arc<Texture>> {
        match image {
            ChainImage::Target(rt) => self.targets.get(rt),
            ChainImage::TemporalAaHistory => self
                .effects
                .get(&EffectKind::TemporalAa)
                .and_then(|bundle| bundle.history("history", self.frame_count)),
        }
    }

    fn record_postprocess_chain(&self, cmd: CommandList, plan: &PostprocessPlan) {
        for step in plan.steps() {
            if !self.record_post_step(cmd, step) {
                log::trace!("RenderPath3D: skipped {} (missing resources)", step.effect.name());
            }
        }
    }

    /// Record one chain step; `false` when a resource it needs is missing.
    fn record_post_step(&self, cmd: CommandList, step: &PostStep) -> bool {
        let schedule = &self.schedule;
        let post = &self.postprocess;
        let Some(input) = self.chain_texture(step.input) else {
            return false;
        };
        let output = step.output.and_then(|image| self.chain_texture(image));
        let temp = step.temp.and_then(|rt| self.targets.get(rt));
        let bundle = |kind: EffectKind| self.effects.get(&kind);
        let depth = self.targets.get(Rt::DepthCopy);
        let velocity = self.targets.get(Rt::Velocity);

        match step.effect {
            PostEffect::Fsr2 => {
                let (Some(bundle), Some(depth), Some(output)) = (bundle(EffectKind::Fsr2), depth, output) else {
                    return false;
                };
                passes::fsr2_upscale(schedule, cmd, bundle, input, depth, velocity, output, post.fsr2_sharpness);
            }
            PostEffect::TemporalAa => {
                let Some(bundle) = bundle(EffectKind::TemporalAa) else {
                    return false;
                };
                let (Some(history), Some(output)) = (bundle.history("history", self.frame_count + 1), output) else {
                    return false;
                };
                passes::temporal_aa(schedule, cmd, bundle, input, history, output);
            }
            PostEffect::DepthOfField => {
                let (Some(bundle), Some(output)) = (bundle(EffectKind::DepthOfField), output) else {
                    return false;
                };
                let internal = self.internal_resolution();
                let params = DepthOfFieldParams {
                    focus: self.camera.focal_length,
                    scale: self.camera.aperture_size * post.depth_of_field_strength,
                    aspect: internal.width as f32 / internal.height.max(1) as f32,
                };
                passes::depth_of_field(schedule, cmd, bundle, input, output, params);
            }
            PostEffect::MotionBlur => {
                let (Some(bundle), Some(output)) = (bundle(EffectKind::MotionBlur), output) else {
                    return false;
                };
                passes::motion_blur(schedule, cmd, bundle, input, velocity, output, post.motion_blur_strength);
            }
            PostEffect::EyeAdaption => {
                let Some(bundle) = bundle(EffectKind::EyeAdaption) else {
                    return false;
                };
                passes::eye_adaption(schedule, cmd, bundle, input, post.eye_adaption_rate);
            }
            PostEffect::Bloom => {
                let Some(bundle) = bundle(EffectKind::Bloom) else {
                    return false;
                };
                passes::bloom(schedule, cmd, bundle, input, post.bloom_threshold);
            }
            PostEffect::Tonemap => {
                let Some(output) = output else {
                    return false;
                };
                let distortion = self
                    .targets
                    .get(Rt::ParticleDistortionResolved)
                    .or_else(|| self.targets.get(Rt::ParticleDistortion));
                let extra: Vec<&Arc<Texture>> = [
                    bundle(EffectKind::EyeAdaption).and_then(|b| b.texture("luminance")),
                    bundle(EffectKind::Bloom).and_then(|b| b.texture("texture")),
                    distortion,
                ]
                .into_iter()
                .flatten()
                .collect();
                let params = TonemapParams {
                    exposure: post.exposure,
                    brightness: post.brightness,
                    contrast: post.contrast,
                    saturation: post.saturation,
                    dither: post.dither,
                };
                passes::tonemap(schedule, cmd, input, &extra, output, params);
            }
            PostEffect::Downsample => {
                let Some(output) = output else {
                    return false;
                };
                passes::downsample(schedule, cmd, input, output);
            }
            PostEffect::GaussianBlur => {
                let (Some(temp), Some(output)) = (temp, output) else {
                    return false;
                };
                passes::gaussian_blur(schedule, cmd, input, temp, output);
            }
            PostEffect::Fsr => {
                let Some(output) = output else {
                    return false;
                };
                passes::fsr_upscale(schedule, cmd, input, output, post.fsr_sharpness);
            }
            PostEffect::Underwater
            | PostEffect::Custom(_)
            | PostEffect::Sharpen
            | PostEffect::Fxaa
            | PostEffect::ChromaticAberration
            | PostEffect::Crt => {
                let Some(output) = output else {
                    return false;
                };
                let amount = match step.effect {
                    PostEffect::Sharpen => post.sharpen_amount,
                    PostEffect::ChromaticAberration => post.chromatic_aberration_amount,
                    _ => 1.0,
                };
                passes::filter(schedule, cmd, step.effect.name(), input, output, amount);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCapabilities, GraphicsDevice};
    use crate::render_path::FrameStatus;
    use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

    fn setup(strategy: RenderStrategy) -> (RenderPath3D, Scene, JobSystem) {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut path = RenderPath3D::new(device, strategy);
        path.set_resolution(320, 180);
        (path, Scene::new(), JobSystem::new(2))
    }

    fn frame(path: &mut RenderPath3D, scene: &mut Scene, jobs: &JobSystem) {
        assert_eq!(path.update(scene, 1.0 / 60.0, jobs), FrameStatus::Ready);
        path.render(scene, jobs).unwrap();
    }

    #[test]
    fn test_stage_keys_collapse_aliases() {
        assert_eq!(
            FrameResource::Target(Rt::Postprocess).key(),
            FrameResource::Target(Rt::PrimitiveId)
        );
        assert_eq!(FrameResource::ShadowAtlas.key(), FrameResource::ShadowAtlas);
        assert_eq!(Stage::ComputeEffects.queue(), QueueType::Compute);
        assert_eq!(Stage::CopyPages.queue(), QueueType::Copy);
    }

    #[test]
    fn test_render_without_update_returns_none() {
        let (mut path, scene, jobs) = setup(RenderStrategy::TiledForward);
        path.start().unwrap();
        assert!(path.render(&scene, &jobs).unwrap().is_none());
    }

    #[test]
    fn test_render_consumes_prepared_frame() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        frame(&mut path, &mut scene, &jobs);
        assert!(path.last_frame().is_some());
        assert!(path.render(&scene, &jobs).unwrap().is_none());
    }

    #[test]
    fn test_async_compute_waits_on_depth_prepass() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        frame(&mut path, &mut scene, &jobs);
        let report = path.last_frame().unwrap();

        assert!(report.waits_on("compute_effects", "depth_prepass"));
        assert!(report.waits_on("opaque_color_pass", "compute_effects"));
        for list in report.lists() {
            for &wait in &list.waits {
                assert_ne!(report.lists()[wait].queue, list.queue, "{} waits on its own queue", list.name);
            }
        }
    }

    #[test]
    fn test_postprocess_alias_hands_region_over() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        frame(&mut path, &mut scene, &jobs);
        frame(&mut path, &mut scene, &jobs);
        let report = path.last_frame().unwrap();

        let names: Vec<&str> = report.aliasing_barriers().map(|(list, _)| list).collect();
        assert!(names.contains(&"depth_prepass"));
        assert!(names.contains(&"postprocess_chain"));
    }

    #[test]
    fn test_stale_alias_handle_is_rejected() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let mut targets = TargetSet::new();
        let desc = |format| TextureDescriptor::new_2d(64, 64, format, TextureUsage::SAMPLED_STORAGE);
        targets
            .create(&device, Rt::ParticleDistortion, desc(TextureFormat::Rgba16Float))
            .unwrap();
        targets.create(&device, Rt::Ao, desc(TextureFormat::R8Unorm)).unwrap();

        let write_ao = StageDecl::new(Stage::ComputeEffects).write(FrameResource::Target(Rt::Ao));
        let write_host = StageDecl::new(Stage::TransparentAndPostprocess).write(FrameResource::Target(Rt::ParticleDistortion));
        let read_ao = StageDecl::new(Stage::OpaqueColorPass).read(FrameResource::Target(Rt::Ao));

        let barriers = resolve_aliases(&mut targets, [&write_ao, &read_ao, &write_host]).unwrap();
        assert_eq!(barriers[0].len(), 1);
        assert!(barriers[1].is_empty());
        assert_eq!(barriers[2].len(), 1);

        let err = resolve_aliases(&mut targets, [&write_ao, &write_host, &read_ao]).unwrap_err();
        assert!(matches!(err, GraphicsError::StaleAliasHandle { .. }));
    }

    #[test]
    fn test_chain_publishes_last_postprocess() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        frame(&mut path, &mut scene, &jobs);
        let report = path.last_frame().unwrap();
        let last = report.last_postprocess.as_ref().unwrap();
        assert_eq!(last.id(), path.last_postprocess().unwrap().id());
        assert_eq!(path.last_postprocess_target(), Rt::Postprocess);
        assert!(report.effects().contains(&"tonemap"));
    }

    #[test]
    fn test_path_tracing_stops_when_converged() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::PathTracing);
        path.renderer_mut().path_tracing_target_samples = 2;
        for _ in 0..3 {
            frame(&mut path, &mut scene, &jobs);
        }
        let report = path.last_frame().unwrap();
        assert!(report.find("trace_scene").is_none());
        assert!(report.find("postprocess_chain").is_some());
        assert_eq!(path.accumulation().samples(), 2);
        assert!(report.effects().contains(&"bloom"));
    }

    #[test]
    fn test_terrain_uses_copy_queue() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        scene.terrains.push(crate::scene::Terrain {
            name: "hills".into(),
        });
        frame(&mut path, &mut scene, &jobs);
        let report = path.last_frame().unwrap();
        assert!(report.waits_on("prepare_frame", "copy_pages"));
        assert!(report.waits_on("terrain_tile_writeback", "terrain_tile_requests"));
    }

    #[test]
    fn test_compose_records_final_image() {
        let (mut path, mut scene, jobs) = setup(RenderStrategy::TiledForward);
        path.renderer_mut().light_culling_debug = true;
        frame(&mut path, &mut scene, &jobs);

        let mut schedule = FrameSchedule::new();
        let cmd = schedule.begin_command_list("present", QueueType::Graphics);
        path.compose(&schedule, cmd);
        let report = schedule.submit().unwrap();
        assert_eq!(report.effects(), vec!["compose", "light_culling_debug"]);
    }
}
