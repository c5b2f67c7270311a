//! Frustum culling.
//!
//! [`update_visibility`] culls every requested element category against a
//! camera in parallel on the job system, then derives the aggregate flags
//! the render path plans the frame from (planar reflection visible,
//! transparents visible, and so on).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use lumen_core::jobs::{JobContext, JobScope, JobSystem};
use lumen_core::math::Vec4;

use super::{Aabb, Camera, Frustum, ObjectFlags, Scene, SceneElement};

const CULL_GROUP_SIZE: u32 = 64;

bitflags! {
    /// Element categories a visibility query collects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VisibilityFlags: u32 {
        const OBJECTS = 1 << 0;
        const LIGHTS = 1 << 1;
        const DECALS = 1 << 2;
        const ENVPROBES = 1 << 3;
        const EMITTERS = 1 << 4;
        const HAIRS = 1 << 5;
        const ALL = Self::OBJECTS.bits()
            | Self::LIGHTS.bits()
            | Self::DECALS.bits()
            | Self::ENVPROBES.bits()
            | Self::EMITTERS.bits()
            | Self::HAIRS.bits();
    }
}

/// Result of culling a scene against one camera.
#[derive(Debug, Clone)]
pub struct Visibility {
    pub flags: VisibilityFlags,
    pub visible_objects: Vec<u32>,
    pub visible_lights: Vec<u32>,
    pub visible_decals: Vec<u32>,
    pub visible_env_probes: Vec<u32>,
    pub visible_emitters: Vec<u32>,
    pub visible_hairs: Vec<u32>,
    /// A planar reflector is on screen.
    pub planar_reflection_visible: bool,
    /// Plane of the first visible planar reflector.
    pub reflection_plane: Vec4,
    pub transparents_visible: bool,
    pub mesh_blend_visible: bool,
    /// A visible light asked for volumetric scattering.
    pub volumetric_lights_visible: bool,
}

impl Visibility {
    pub fn new(flags: VisibilityFlags) -> Self {
        Self {
            flags,
            visible_objects: Vec::new(),
            visible_lights: Vec::new(),
            visible_decals: Vec::new(),
            visible_env_probes: Vec::new(),
            visible_emitters: Vec::new(),
            visible_hairs: Vec::new(),
            planar_reflection_visible: false,
            reflection_plane: Vec4::new(0.0, 1.0, 0.0, 0.0),
            transparents_visible: false,
            mesh_blend_visible: false,
            volumetric_lights_visible: false,
        }
    }

    /// Reset results, keeping allocations and the requested flags.
    pub fn clear(&mut self) {
        self.visible_objects.clear();
        self.visible_lights.clear();
        self.visible_decals.clear();
        self.visible_env_probes.clear();
        self.visible_emitters.clear();
        self.visible_hairs.clear();
        self.planar_reflection_visible = false;
        self.transparents_visible = false;
        self.mesh_blend_visible = false;
        self.volumetric_lights_visible = false;
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(VisibilityFlags::ALL)
    }
}

fn element_visible(element: &SceneElement, layer_mask: u32, frustum: &Frustum) -> bool {
    element.layer_mask & layer_mask != 0 && frustum.intersects_aabb(&element.aabb)
}

fn hit_flags(len: usize) -> Arc<[AtomicBool]> {
    (0..len).map(|_| AtomicBool::new(false)).collect()
}

fn collect_hits(hits: &[AtomicBool], output: &mut Vec<u32>) {
    output.extend(
        hits.iter()
            .enumerate()
            .filter(|(_, hit)| hit.load(Ordering::Relaxed))
            .map(|(i, _)| i as u32),
    );
}

/// Cull `scene` against `camera` into `vis`.
///
/// Results are sorted by element index regardless of how culling jobs were
/// scheduled.
pub fn update_visibility(vis: &mut Visibility, scene: &Scene, camera: &Camera, jobs: &JobSystem) {
    jobs.scope(|scope| cull_visibility(vis, scene, camera, scope));
}

/// [`update_visibility`] on the workers of an open job scope.
///
/// Returns once every culling job has finished.
pub fn cull_visibility<'env>(vis: &mut Visibility, scene: &'env Scene, camera: &Camera, scope: &JobScope<'_, 'env>) {
    lumen_core::profile_scope!("cull_visibility");
    vis.clear();

    let frustum = camera.frustum();
    let layer_mask = camera.layer_mask;
    let flags = vis.flags;
    let enabled = |f: VisibilityFlags, len: usize| hit_flags(if flags.contains(f) { len } else { 0 });

    let objects = enabled(VisibilityFlags::OBJECTS, scene.objects.len());
    let lights = enabled(VisibilityFlags::LIGHTS, scene.lights.len());
    let decals = enabled(VisibilityFlags::DECALS, scene.decals.len());
    let probes = enabled(VisibilityFlags::ENVPROBES, scene.env_probes.len());
    let emitters = enabled(VisibilityFlags::EMITTERS, scene.emitters.len());
    let hairs = enabled(VisibilityFlags::HAIRS, scene.hairs.len());

    let ctx = JobContext::new();

    let hits = Arc::clone(&objects);
    scope.dispatch(&ctx, hits.len() as u32, CULL_GROUP_SIZE, move |args| {
        let object = &scene.objects[args.job_index as usize];
        let visible = object.layer_mask & layer_mask != 0 && frustum.intersects_aabb(&object.aabb);
        hits[args.job_index as usize].store(visible, Ordering::Relaxed);
    });

    let hits = Arc::clone(&lights);
    scope.dispatch(&ctx, hits.len() as u32, CULL_GROUP_SIZE, move |args| {
        let light = &scene.lights[args.job_index as usize];
        let visible = light.layer_mask & layer_mask != 0 && frustum.intersects_sphere(&light.position, light.range);
        hits[args.job_index as usize].store(visible, Ordering::Relaxed);
    });

    for (target, elements) in [
        (&decals, &scene.decals),
        (&probes, &scene.env_probes),
        (&emitters, &scene.emitters),
        (&hairs, &scene.hairs),
    ] {
        let hits = Arc::clone(target);
        scope.dispatch(&ctx, hits.len() as u32, CULL_GROUP_SIZE, move |args| {
            let visible = element_visible(&elements[args.job_index as usize], layer_mask, &frustum);
            hits[args.job_index as usize].store(visible, Ordering::Relaxed);
        });
    }

    scope.wait(&ctx);

    collect_hits(&objects, &mut vis.visible_objects);
    collect_hits(&lights, &mut vis.visible_lights);
    collect_hits(&decals, &mut vis.visible_decals);
    collect_hits(&probes, &mut vis.visible_env_probes);
    collect_hits(&emitters, &mut vis.visible_emitters);
    collect_hits(&hairs, &mut vis.visible_hairs);

    for &index in &vis.visible_objects {
        let object = &scene.objects[index as usize];
        if object.flags.contains(ObjectFlags::PLANAR_REFLECTOR) && !vis.planar_reflection_visible {
            vis.planar_reflection_visible = true;
            vis.reflection_plane = object.reflection_plane();
        }
        vis.transparents_visible |= object.flags.contains(ObjectFlags::TRANSPARENT);
        vis.mesh_blend_visible |= object.flags.contains(ObjectFlags::MESH_BLEND);
    }
    vis.volumetric_lights_visible = vis
        .visible_lights
        .iter()
        .any(|&i| scene.lights[i as usize].volumetric);

    log::trace!(
        "Visibility: {} objects, {} lights, planar_reflection={}",
        vis.visible_objects.len(),
        vis.visible_lights.len(),
        vis.planar_reflection_visible
    );
}

/// Whether any element of `aabbs` intersects the camera frustum.
pub(crate) fn any_visible<'a>(camera: &Camera, aabbs: impl IntoIterator<Item = &'a Aabb>) -> bool {
    let frustum = camera.frustum();
    aabbs.into_iter().any(|aabb| frustum.intersects_aabb(aabb))
}
