//! Core graphics types.

mod common;
mod texture;

pub use common::{Extent3d, Resolution};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage, mip_count_for};
