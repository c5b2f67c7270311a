//! GPU texture resource.

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::types::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] and are
/// reference-counted. Dropping the last reference returns the bindless
/// descriptor slot to the device.
///
/// An aliased texture (see [`GraphicsDevice::create_aliased_texture`]) keeps
/// its host alive and shares the host's memory instead of owning its own.
pub struct Texture {
    device: Arc<GraphicsDevice>,
    descriptor: TextureDescriptor,
    id: u64,
    descriptor_index: i32,
    alias_host: Option<Arc<Texture>>,
}

impl Texture {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        descriptor: TextureDescriptor,
        id: u64,
        descriptor_index: i32,
        alias_host: Option<Arc<Texture>>,
    ) -> Self {
        Self {
            device,
            descriptor,
            id,
            descriptor_index,
            alias_host,
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Unique id within the device.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bindless descriptor index for shader access.
    pub fn descriptor_index(&self) -> i32 {
        self.descriptor_index
    }

    /// Texture whose memory this one aliases, if any.
    pub fn alias_host(&self) -> Option<&Arc<Texture>> {
        self.alias_host.as_ref()
    }

    /// Whether this texture shares another texture's memory.
    pub fn is_alias(&self) -> bool {
        self.alias_host.is_some()
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    /// Get the sample count.
    pub fn sample_count(&self) -> u32 {
        self.descriptor.sample_count
    }

    /// Bytes of memory this texture occupies.
    pub fn memory_size_in_bytes(&self) -> u64 {
        self.descriptor.memory_size_in_bytes()
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Label for logs, falling back to the id.
    pub fn debug_name(&self) -> String {
        match self.label() {
            Some(label) => label.to_string(),
            None => format!("texture#{}", self.id),
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.device.release_descriptor(self.descriptor_index);
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Texture {}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("label", &self.descriptor.label)
            .field("aliased", &self.alias_host.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapabilities;

    fn create_test_device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default())
    }

    #[test]
    fn test_texture_debug() {
        let device = create_test_device();
        let texture = device
            .create_texture(
                &TextureDescriptor::new_2d(
                    1920,
                    1080,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::RENDER_ATTACHMENT,
                )
                .with_label("rtMain"),
            )
            .unwrap();
        let debug = format!("{:?}", texture);
        assert!(debug.contains("Texture"));
        assert!(debug.contains("1920"));
        assert!(debug.contains("rtMain"));
    }

    #[test]
    fn test_debug_name_falls_back_to_id() {
        let device = create_test_device();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::R8Unorm,
                TextureUsage::TEXTURE_BINDING,
            ))
            .unwrap();
        assert_eq!(texture.debug_name(), format!("texture#{}", texture.id()));
    }
}
