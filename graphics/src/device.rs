//! Graphics device.
//!
//! The [`GraphicsDevice`] creates textures, hands out bindless descriptor
//! indices and tracks live resources. It has no backend: resource creation
//! validates descriptors, reserves ids and descriptor slots, and records
//! counters the frame scheduler and tests observe.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::types::TextureDescriptor;

/// Capabilities of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Whether hardware ray tracing is supported.
    pub ray_tracing: bool,
    /// Whether image-based variable-rate shading is supported.
    pub variable_rate_shading: bool,
    /// Pixel footprint of one shading-rate texel.
    pub vrs_tile_size: u32,
}

impl DeviceCapabilities {
    /// Capabilities with every optional feature enabled.
    pub fn full() -> Self {
        Self {
            ray_tracing: true,
            variable_rate_shading: true,
            ..Self::default()
        }
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            ray_tracing: false,
            variable_rate_shading: false,
            vrs_tile_size: 16,
        }
    }
}

/// Built-in textures bound when an optional input is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Opaque white, used where a missing input should not attenuate.
    White,
    /// Transparent black, used where a missing input should contribute nothing.
    TransparentBlack,
}

impl Placeholder {
    const COUNT: i32 = 2;

    fn index(self) -> i32 {
        match self {
            Self::White => 0,
            Self::TransparentBlack => 1,
        }
    }
}

#[derive(Debug)]
struct DescriptorAllocator {
    free: Vec<i32>,
    next: i32,
}

impl DescriptorAllocator {
    fn allocate(&mut self) -> i32 {
        self.free.pop().unwrap_or_else(|| {
            let index = self.next;
            self.next += 1;
            index
        })
    }
}

/// Injected creation failure, consumed by matching texture creations.
#[derive(Debug, Clone)]
struct CreationFault {
    label_contains: String,
    remaining: u32,
}

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be safely shared across threads.
/// All creation methods take `&Arc<Self>` and use interior mutability.
///
/// # Example
///
/// ```
/// use lumen_graphics::{DeviceCapabilities, GraphicsDevice, TextureDescriptor, TextureFormat, TextureUsage};
///
/// let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
/// let texture = device
///     .create_texture(&TextureDescriptor::new_2d(
///         1920,
///         1080,
///         TextureFormat::Rgba8Unorm,
///         TextureUsage::RENDER_ATTACHMENT,
///     ))
///     .unwrap();
/// assert_eq!(device.texture_count(), 1);
/// assert!(texture.descriptor_index() >= 2);
/// ```
pub struct GraphicsDevice {
    name: String,
    capabilities: DeviceCapabilities,
    textures: RwLock<Vec<Weak<Texture>>>,
    next_texture_id: AtomicU64,
    allocations: AtomicU64,
    creations: AtomicU64,
    descriptors: Mutex<DescriptorAllocator>,
    fault: Mutex<Option<CreationFault>>,
}

impl GraphicsDevice {
    /// Create a device with the given adapter name and capabilities.
    pub fn new(name: impl Into<String>, capabilities: DeviceCapabilities) -> Arc<Self> {
        let name = name.into();
        log::info!("GraphicsDevice: created '{name}' ({capabilities:?})");
        Arc::new(Self {
            name,
            capabilities,
            textures: RwLock::new(Vec::new()),
            next_texture_id: AtomicU64::new(1),
            allocations: AtomicU64::new(0),
            creations: AtomicU64::new(0),
            descriptors: Mutex::new(DescriptorAllocator {
                free: Vec::new(),
                next: Placeholder::COUNT,
            }),
            fault: Mutex::new(None),
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Create a GPU texture with its own memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the texture dimensions are zero, exceed device
    /// limits, or allocation fails.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        self.validate(descriptor)?;
        self.check_fault(descriptor)?;

        let texture = self.register(descriptor, None);
        self.allocations.fetch_add(1, Ordering::Relaxed);

        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}, {} bytes",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.memory_size_in_bytes()
        );

        Ok(texture)
    }

    /// Create a texture placed in the memory of `host`.
    ///
    /// The alias must not need more bytes than the host provides. Contents
    /// are undefined until the alias is written after an aliasing barrier.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::AliasTooLarge`] when the alias does not fit,
    /// or the same validation errors as [`create_texture`](Self::create_texture).
    pub fn create_aliased_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        host: &Arc<Texture>,
    ) -> Result<Arc<Texture>, GraphicsError> {
        self.validate(descriptor)?;

        let alias_bytes = descriptor.memory_size_in_bytes();
        let host_bytes = host.memory_size_in_bytes();
        if alias_bytes > host_bytes {
            return Err(GraphicsError::AliasTooLarge {
                alias: descriptor.label.clone().unwrap_or_default(),
                alias_bytes,
                host: host.debug_name(),
                host_bytes,
            });
        }
        self.check_fault(descriptor)?;

        // Aliases share the host allocation, so only the creation counter moves.
        let texture = self.register(descriptor, Some(Arc::clone(host)));

        log::trace!(
            "GraphicsDevice: created alias {:?} in {} ({alias_bytes}/{host_bytes} bytes)",
            descriptor.label,
            host.debug_name()
        );

        Ok(texture)
    }

    /// Descriptor index of a built-in placeholder texture.
    pub fn placeholder_index(&self, placeholder: Placeholder) -> i32 {
        placeholder.index()
    }

    /// Descriptor index of `texture`, or -1 when there is none.
    pub fn descriptor_index(&self, texture: Option<&Texture>) -> i32 {
        texture.map_or(-1, Texture::descriptor_index)
    }

    /// Make the next `count` texture creations whose label contains
    /// `label_contains` fail with [`GraphicsError::OutOfMemory`].
    ///
    /// An empty pattern matches every creation.
    pub fn inject_creation_failure(&self, label_contains: impl Into<String>, count: u32) {
        *self.fault.lock() = Some(CreationFault {
            label_contains: label_contains.into(),
            remaining: count,
        });
    }

    /// Remove any pending injected failure.
    pub fn clear_creation_failure(&self) {
        *self.fault.lock() = None;
    }

    /// Number of textures created with their own memory since device creation.
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of texture objects created since device creation, aliases included.
    pub fn creation_count(&self) -> u64 {
        self.creations.load(Ordering::Relaxed)
    }

    /// Get the number of live textures created by this device.
    pub fn texture_count(&self) -> usize {
        self.textures
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Labels of live textures, sorted.
    pub fn live_texture_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .textures
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|t| t.debug_name())
            .collect();
        labels.sort();
        labels
    }

    /// Clean up dead weak references to released resources.
    pub fn cleanup_dead_resources(&self) {
        self.textures.write().retain(|w| w.strong_count() > 0);
    }

    pub(crate) fn release_descriptor(&self, index: i32) {
        if index >= Placeholder::COUNT {
            self.descriptors.lock().free.push(index);
        }
    }

    fn validate(&self, descriptor: &TextureDescriptor) -> Result<(), GraphicsError> {
        let max_dim = self.capabilities.max_texture_dimension;
        if descriptor.size.width > max_dim
            || descriptor.size.height > max_dim
            || descriptor.size.depth > max_dim
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} dimension exceeds maximum {max_dim}",
                descriptor.label
            )));
        }

        if descriptor.size.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} dimensions cannot be zero",
                descriptor.label
            )));
        }

        if descriptor.sample_count > 1 && descriptor.mip_level_count > 1 {
            return Err(GraphicsError::InvalidParameter(format!(
                "multisampled texture {:?} cannot have mips",
                descriptor.label
            )));
        }

        Ok(())
    }

    fn check_fault(&self, descriptor: &TextureDescriptor) -> Result<(), GraphicsError> {
        let mut fault = self.fault.lock();
        let Some(active) = fault.as_mut() else {
            return Ok(());
        };
        let label = descriptor.label.as_deref().unwrap_or("");
        if !label.contains(active.label_contains.as_str()) {
            return Ok(());
        }
        active.remaining = active.remaining.saturating_sub(1);
        if active.remaining == 0 {
            *fault = None;
        }
        log::error!("GraphicsDevice: out of memory creating {label:?} (injected)");
        Err(GraphicsError::OutOfMemory)
    }

    fn register(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        alias_host: Option<Arc<Texture>>,
    ) -> Arc<Texture> {
        let id = self.next_texture_id.fetch_add(1, Ordering::Relaxed);
        let descriptor_index = self.descriptors.lock().allocate();
        let texture = Arc::new(Texture::new(
            Arc::clone(self),
            descriptor.clone(),
            id,
            descriptor_index,
            alias_host,
        ));

        let mut textures = self.textures.write();
        // Keep the tracking list bounded across resizes.
        if textures.len() > 256 && textures.len().is_power_of_two() {
            textures.retain(|w| w.strong_count() > 0);
        }
        textures.push(Arc::downgrade(&texture));
        self.creations.fetch_add(1, Ordering::Relaxed);

        texture
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureFormat, TextureUsage};

    fn create_test_device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default())
    }

    fn desc(label: &str, width: u32, height: u32, format: TextureFormat) -> TextureDescriptor {
        TextureDescriptor::new_2d(width, height, format, TextureUsage::TEXTURE_BINDING)
            .with_label(label)
    }

    #[test]
    fn test_device_name() {
        let device = create_test_device();
        assert_eq!(device.name(), "Dummy Adapter");
    }

    #[test]
    fn test_create_texture() {
        let device = create_test_device();
        let texture = device
            .create_texture(&desc("a", 512, 512, TextureFormat::Rgba8Unorm))
            .unwrap();
        assert_eq!(texture.width(), 512);
        assert_eq!(texture.height(), 512);
        assert_eq!(device.texture_count(), 1);
        assert_eq!(device.allocation_count(), 1);
    }

    #[test]
    fn test_create_texture_zero_size() {
        let device = create_test_device();
        let result = device.create_texture(&desc("a", 0, 512, TextureFormat::Rgba8Unorm));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_create_texture_too_large() {
        let device = create_test_device();
        let result = device.create_texture(&desc("a", 32768, 4, TextureFormat::Rgba8Unorm));
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_cleanup() {
        let device = create_test_device();
        {
            let _texture = device
                .create_texture(&desc("a", 4, 4, TextureFormat::R8Unorm))
                .unwrap();
            assert_eq!(device.texture_count(), 1);
        }
        device.cleanup_dead_resources();
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn test_descriptor_indices_skip_placeholders_and_recycle() {
        let device = create_test_device();
        assert_eq!(device.placeholder_index(Placeholder::White), 0);
        assert_eq!(device.placeholder_index(Placeholder::TransparentBlack), 1);

        let a = device
            .create_texture(&desc("a", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        let b = device
            .create_texture(&desc("b", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        assert_eq!(a.descriptor_index(), 2);
        assert_eq!(b.descriptor_index(), 3);

        drop(a);
        let c = device
            .create_texture(&desc("c", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        assert_eq!(c.descriptor_index(), 2);
        assert_eq!(device.descriptor_index(Some(&c)), 2);
        assert_eq!(device.descriptor_index(None), -1);
    }

    #[test]
    fn test_aliased_texture_shares_host() {
        let device = create_test_device();
        let host = device
            .create_texture(&desc("host", 64, 64, TextureFormat::R32Uint))
            .unwrap();
        let alias = device
            .create_aliased_texture(&desc("alias", 64, 64, TextureFormat::Rgba8Unorm), &host)
            .unwrap();
        assert!(alias.is_alias());
        assert_eq!(alias.alias_host().map(|h| h.id()), Some(host.id()));
        assert_eq!(device.allocation_count(), 1);
        assert_eq!(device.creation_count(), 2);
    }

    #[test]
    fn test_aliased_texture_too_large() {
        let device = create_test_device();
        let host = device
            .create_texture(&desc("host", 64, 64, TextureFormat::R8Unorm))
            .unwrap();
        let result =
            device.create_aliased_texture(&desc("alias", 64, 64, TextureFormat::Rgba16Float), &host);
        match result {
            Err(GraphicsError::AliasTooLarge {
                alias_bytes,
                host_bytes,
                ..
            }) => {
                assert_eq!(alias_bytes, 64 * 64 * 8);
                assert_eq!(host_bytes, 64 * 64);
            }
            other => panic!("expected AliasTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_injected_failure_matches_label() {
        let device = create_test_device();
        device.inject_creation_failure("rtSSR", 1);

        assert!(
            device
                .create_texture(&desc("rtMain", 4, 4, TextureFormat::R8Unorm))
                .is_ok()
        );
        assert_eq!(
            device
                .create_texture(&desc("rtSSR", 4, 4, TextureFormat::R8Unorm))
                .unwrap_err(),
            GraphicsError::OutOfMemory
        );
        // Consumed after one failure.
        assert!(
            device
                .create_texture(&desc("rtSSR", 4, 4, TextureFormat::R8Unorm))
                .is_ok()
        );
    }

    #[test]
    fn test_live_texture_labels() {
        let device = create_test_device();
        let _b = device
            .create_texture(&desc("b", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        let _a = device
            .create_texture(&desc("a", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        assert_eq!(device.live_texture_labels(), vec!["a", "b"]);
    }
}
