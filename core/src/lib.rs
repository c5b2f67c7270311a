//! # Lumen Core
//!
//! Engine-agnostic utilities shared by the Lumen crates: the frame job
//! system, free-list pooling for per-frame allocations, rendering math
//! helpers and Tracy profiling macros.

pub mod jobs;
pub mod math;
pub mod pool;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the crate version once at startup.
pub fn init() {
    log::info!("Lumen Core v{} initialized", VERSION);
}
