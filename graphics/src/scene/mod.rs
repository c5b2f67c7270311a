//! Scene data consumed by the render path.
//!
//! The scene is a flat set of bounded elements plus a few global settings
//! (weather, terrains, videos). It carries no GPU resources; the render path
//! reads it to decide which frame work is needed.

mod camera;
mod visibility;

pub use camera::{Aabb, Camera, Frustum};
pub use visibility::{Visibility, VisibilityFlags, cull_visibility, update_visibility};

use bitflags::bitflags;
use lumen_core::math::{self, Vec3, Vec4};

bitflags! {
    /// Per-object properties relevant to frame planning.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Rendered in the transparent pass.
        const TRANSPARENT = 1 << 0;
        /// Acts as a planar reflector (water, mirrors).
        const PLANAR_REFLECTOR = 1 << 1;
        /// Uses mesh blending against opaque geometry.
        const MESH_BLEND = 1 << 2;
        /// Casts shadows.
        const CASTS_SHADOW = 1 << 3;
    }
}

/// A renderable object.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub aabb: Aabb,
    pub layer_mask: u32,
    pub flags: ObjectFlags,
    /// Set when the object's transform changed since the last scene update.
    pub transform_dirty: bool,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, aabb: Aabb) -> Self {
        Self {
            name: name.into(),
            aabb,
            layer_mask: u32::MAX,
            flags: ObjectFlags::CASTS_SHADOW,
            transform_dirty: false,
        }
    }

    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Reflection plane of a planar reflector: the top face of its bounds.
    pub fn reflection_plane(&self) -> Vec4 {
        math::plane_from_point_normal(&Vec3::new(0.0, self.aabb.max.y, 0.0), &Vec3::y())
    }
}

/// A light source.
#[derive(Debug, Clone)]
pub struct SceneLight {
    pub position: Vec3,
    pub range: f32,
    pub layer_mask: u32,
    /// Requests volumetric light scattering.
    pub volumetric: bool,
}

impl SceneLight {
    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            position,
            range,
            layer_mask: u32::MAX,
            volumetric: false,
        }
    }
}

/// A bounded element without extra state (decals, probes, emitters, hair).
#[derive(Debug, Clone)]
pub struct SceneElement {
    pub aabb: Aabb,
    pub layer_mask: u32,
}

impl SceneElement {
    pub fn new(aabb: Aabb) -> Self {
        Self {
            aabb,
            layer_mask: u32::MAX,
        }
    }
}

/// Material with change tracking.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub dirty: bool,
}

/// A playing video that needs decoding when its next frame is due.
#[derive(Debug, Clone)]
pub struct Video {
    pub name: String,
    pub playing: bool,
    pub frame_interval: f32,
    pub time_to_next_frame: f32,
}

impl Video {
    pub fn new(name: impl Into<String>, fps: f32) -> Self {
        Self {
            name: name.into(),
            playing: true,
            frame_interval: 1.0 / fps.max(1.0),
            time_to_next_frame: 0.0,
        }
    }

    /// Whether a new frame must be decoded within the next `dt` seconds.
    pub fn is_decoding_required(&self, dt: f32) -> bool {
        self.playing && self.time_to_next_frame <= dt
    }

    fn advance(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        self.time_to_next_frame -= dt;
        while self.time_to_next_frame <= 0.0 {
            self.time_to_next_frame += self.frame_interval;
        }
    }
}

/// A terrain streaming virtual texture pages.
#[derive(Debug, Clone)]
pub struct Terrain {
    pub name: String,
}

/// A short-lived water ripple.
#[derive(Debug, Clone)]
pub struct WaterRipple {
    pub position: Vec3,
    pub age: f32,
    pub lifetime: f32,
}

/// Global atmosphere and water settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Weather {
    pub realistic_sky: bool,
    pub aerial_perspective: bool,
    pub volumetric_clouds: bool,
    pub ocean: bool,
    /// Height of the ocean surface; cameras below it render underwater.
    pub ocean_level: f32,
}

impl Weather {
    /// Whether `eye` is below the ocean surface.
    pub fn is_underwater(&self, eye: &Vec3) -> bool {
        self.ocean && eye.y < self.ocean_level
    }
}

/// Scene container.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub lights: Vec<SceneLight>,
    pub decals: Vec<SceneElement>,
    pub env_probes: Vec<SceneElement>,
    pub emitters: Vec<SceneElement>,
    pub hairs: Vec<SceneElement>,
    pub materials: Vec<Material>,
    pub videos: Vec<Video>,
    pub terrains: Vec<Terrain>,
    pub water_ripples: Vec<WaterRipple>,
    pub weather: Weather,
    /// Set by the render path when ray tracing or surfel GI needs a fresh
    /// acceleration structure this frame.
    pub acceleration_structure_update_requested: bool,
    time: f32,
    update_count: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance simulation state by `dt` seconds and consume change flags.
    pub fn update(&mut self, dt: f32) {
        lumen_core::profile_scope!("Scene::update");
        self.time += dt;
        self.update_count += 1;

        for video in &mut self.videos {
            video.advance(dt);
        }
        for ripple in &mut self.water_ripples {
            ripple.age += dt;
        }
        self.water_ripples.retain(|r| r.age < r.lifetime);

        for object in &mut self.objects {
            object.transform_dirty = false;
        }
        for material in &mut self.materials {
            material.dirty = false;
        }
    }

    /// Whether any object moved since the last update.
    pub fn any_transform_dirty(&self) -> bool {
        self.objects.iter().any(|o| o.transform_dirty)
    }

    /// Whether any material changed since the last update.
    pub fn any_material_dirty(&self) -> bool {
        self.materials.iter().any(|m| m.dirty)
    }

    /// Whether any video needs a decode this frame.
    pub fn is_video_decoding_required(&self, dt: f32) -> bool {
        self.videos.iter().any(|v| v.is_decoding_required(dt))
    }

    /// Seconds of simulated time.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Number of completed updates.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}
