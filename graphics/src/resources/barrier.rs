//! Resource state transitions.

use std::sync::Arc;

use super::Texture;

/// How a texture is being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents are undefined.
    Undefined,
    /// Sampled in a shader.
    ShaderResource,
    /// Read/write storage access.
    UnorderedAccess,
    /// Color attachment.
    RenderTarget,
    /// Depth/stencil attachment, writable.
    DepthWrite,
    /// Depth/stencil attachment, read-only.
    DepthRead,
    /// Source of a copy or resolve.
    CopySource,
    /// Destination of a copy or resolve.
    CopyDestination,
    /// Variable-rate shading image.
    ShadingRateSource,
}

impl ResourceState {
    /// Whether a resource in this state may be modified.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::UnorderedAccess | Self::RenderTarget | Self::DepthWrite | Self::CopyDestination
        )
    }
}

/// A synchronization point recorded into a command list.
#[derive(Debug, Clone)]
pub enum Barrier {
    /// Layout/state transition of one texture.
    Image {
        texture: Arc<Texture>,
        before: ResourceState,
        after: ResourceState,
    },
    /// Hand shared memory from one alias to another.
    ///
    /// `before` is `None` when the memory had no prior occupant.
    Aliasing {
        before: Option<Arc<Texture>>,
        after: Arc<Texture>,
    },
    /// Global memory barrier for storage writes.
    Memory,
}

impl Barrier {
    /// Shorthand for an image transition.
    pub fn image(texture: &Arc<Texture>, before: ResourceState, after: ResourceState) -> Self {
        Self::Image {
            texture: Arc::clone(texture),
            before,
            after,
        }
    }

    /// Whether this is an aliasing barrier.
    pub fn is_aliasing(&self) -> bool {
        matches!(self, Self::Aliasing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_states() {
        assert!(ResourceState::UnorderedAccess.is_write());
        assert!(ResourceState::DepthWrite.is_write());
        assert!(!ResourceState::DepthRead.is_write());
        assert!(!ResourceState::ShaderResource.is_write());
    }

    #[test]
    fn test_memory_barrier_is_not_aliasing() {
        assert!(!Barrier::Memory.is_aliasing());
    }
}
