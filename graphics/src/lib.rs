//! # Lumen Graphics
//!
//! Frame orchestration for a 3D render path: which GPU resources exist, when
//! they are (re)allocated, how frame work is split into command lists across
//! queues, and how those lists synchronize.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`render_path::RenderPath3D`] - resource owner and frame builder of one 3D view
//! - [`graph::FrameGraph`] - jobs with declared resource accesses; dependencies
//!   are derived from the declarations
//! - [`compiler`] - topological order and cross-queue waits of a frame graph
//! - [`scheduler::FrameSchedule`] - multi-queue command lists and submission
//! - [`resources`] - textures, the aliasing arena and barriers
//! - [`effects`] - effect resource bundles and invocations
//! - [`scene`] - scene data, cameras and visibility culling
//! - [`config`] - TOML render path configuration
//!
//! All work runs against a [`GraphicsDevice`] that tracks allocations without
//! touching a GPU.
//!
//! ## Example
//!
//! ```
//! use lumen_core::jobs::JobSystem;
//! use lumen_graphics::render_path::{FrameStatus, RenderPath3D, RenderStrategy};
//! use lumen_graphics::scene::Scene;
//! use lumen_graphics::{DeviceCapabilities, GraphicsDevice};
//!
//! lumen_graphics::init();
//! let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
//! let jobs = JobSystem::new(2);
//! let mut scene = Scene::new();
//!
//! let mut path = RenderPath3D::new(device, RenderStrategy::Deferred);
//! path.set_resolution(640, 360);
//! if path.update(&mut scene, 1.0 / 60.0, &jobs) == FrameStatus::Ready {
//!     let report = path.render(&scene, &jobs).unwrap().unwrap();
//!     assert!(report.find("opaque_color_pass").is_some());
//! }
//! ```

pub mod compiler;
pub mod config;
pub mod device;
pub mod effects;
pub mod error;
pub mod graph;
pub mod render_path;
pub mod resources;
pub mod scene;
pub mod scheduler;
pub mod types;

pub use config::{ConfigError, RenderPathConfig};
pub use device::{DeviceCapabilities, GraphicsDevice};
pub use error::GraphicsError;
pub use types::{Extent3d, Resolution, TextureDescriptor, TextureFormat, TextureUsage};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
pub fn init() {
    log::info!("Lumen Graphics v{} initialized", VERSION);
}
