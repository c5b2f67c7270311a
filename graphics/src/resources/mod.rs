//! GPU resources.
//!
//! - [`Texture`] - GPU texture, optionally aliasing another texture's memory
//! - [`AliasArena`] - tracks which alias currently occupies a shared allocation
//! - [`Barrier`] - state transitions recorded between uses
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//!
//! [`Arc`]: std::sync::Arc

mod alias;
mod barrier;
mod texture;

pub use alias::{AliasArena, AliasHandle, AliasSlot, RegionId};
pub use barrier::{Barrier, ResourceState};
pub use texture::Texture;
