//! Object header and two-phase lifecycle shared by every managed object
//!
//! Objects are built by composition: each one embeds an [`ObjectHeader`] (kind, ownership,
//! name, parent back-reference) and implements [`DeviceObject`], whose provided
//! [`create`](DeviceObject::create) and [`destroy`](DeviceObject::destroy) methods wrap the
//! kind-specific `create_api_objects`/`destroy_api_objects` steps.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use bitflags::bitflags;

use crate::device::Device;
use crate::error::RhiResult;
use crate::foundation::sync::{read, write};
use crate::ownership::{Ownership, OwnershipCell};
use crate::registry::Registry;

/// Every kind of object managed by a device or instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum ObjectKind {
    Device,
    Queue,
    DrawPass,
    FullscreenQuad,
    Texture,
    Mesh,
    RenderPass,
    Buffer,
    CommandBuffer,
    CommandPool,
    ComputePipeline,
    GraphicsPipeline,
    PipelineInterface,
    DescriptorSet,
    DescriptorPool,
    DescriptorSetLayout,
    Fence,
    Semaphore,
    RenderTargetView,
    DepthStencilView,
    SampledImageView,
    StorageImageView,
    Image,
    Sampler,
    ShaderModule,
    Swapchain,
}

bitflags! {
    /// Capability set attached to an object kind
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectCapabilities: u32 {
        /// Backed by a native API object
        const NATIVE = 1 << 0;
        /// A view over an image subresource range
        const IMAGE_VIEW = 1 << 1;
        /// Creates and owns other managed objects
        const COMPOSITE = 1 << 2;
        /// Records commands
        const RECORDABLE = 1 << 3;
        /// Accepts submissions
        const SUBMITTABLE = 1 << 4;
    }
}

impl ObjectKind {
    /// Lower-case name used in logs and errors
    pub const fn name(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Queue => "queue",
            Self::DrawPass => "draw pass",
            Self::FullscreenQuad => "fullscreen quad",
            Self::Texture => "texture",
            Self::Mesh => "mesh",
            Self::RenderPass => "render pass",
            Self::Buffer => "buffer",
            Self::CommandBuffer => "command buffer",
            Self::CommandPool => "command pool",
            Self::ComputePipeline => "compute pipeline",
            Self::GraphicsPipeline => "graphics pipeline",
            Self::PipelineInterface => "pipeline interface",
            Self::DescriptorSet => "descriptor set",
            Self::DescriptorPool => "descriptor pool",
            Self::DescriptorSetLayout => "descriptor set layout",
            Self::Fence => "fence",
            Self::Semaphore => "semaphore",
            Self::RenderTargetView => "render target view",
            Self::DepthStencilView => "depth stencil view",
            Self::SampledImageView => "sampled image view",
            Self::StorageImageView => "storage image view",
            Self::Image => "image",
            Self::Sampler => "sampler",
            Self::ShaderModule => "shader module",
            Self::Swapchain => "swapchain",
        }
    }

    /// Capabilities of this kind
    pub const fn capabilities(self) -> ObjectCapabilities {
        match self {
            Self::DrawPass | Self::FullscreenQuad | Self::Texture | Self::Mesh => {
                ObjectCapabilities::COMPOSITE
            }
            Self::RenderPass => ObjectCapabilities::COMPOSITE.union(ObjectCapabilities::NATIVE),
            Self::RenderTargetView
            | Self::DepthStencilView
            | Self::SampledImageView
            | Self::StorageImageView => {
                ObjectCapabilities::NATIVE.union(ObjectCapabilities::IMAGE_VIEW)
            }
            Self::CommandBuffer => ObjectCapabilities::NATIVE.union(ObjectCapabilities::RECORDABLE),
            Self::Queue => ObjectCapabilities::NATIVE.union(ObjectCapabilities::SUBMITTABLE),
            Self::Device => ObjectCapabilities::empty(),
            _ => ObjectCapabilities::NATIVE,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State embedded in every managed object
pub struct ObjectHeader<P = Device> {
    kind: ObjectKind,
    ownership: OwnershipCell,
    name: RwLock<String>,
    parent: Weak<P>,
}

impl<P> ObjectHeader<P> {
    /// Create a Reference-owned header pointing back at `parent`
    pub fn new(kind: ObjectKind, parent: Weak<P>) -> Self {
        Self {
            kind,
            ownership: OwnershipCell::default(),
            name: RwLock::new(String::new()),
            parent,
        }
    }

    /// Kind of the object
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Capabilities of the object's kind
    pub const fn capabilities(&self) -> ObjectCapabilities {
        self.kind.capabilities()
    }

    /// Current ownership
    pub fn ownership(&self) -> Ownership {
        self.ownership.get()
    }

    /// Request an ownership change; Restricted objects ignore the request
    pub fn set_ownership(&self, ownership: Ownership) -> Ownership {
        self.ownership.set(ownership)
    }

    /// Atomically move from `expected` to `new`, reporting the ownership found on mismatch
    pub fn exchange_ownership(&self, expected: Ownership, new: Ownership) -> Result<(), Ownership> {
        self.ownership.exchange(expected, new)
    }

    /// Debug name, empty if none was set
    pub fn name(&self) -> String {
        read(&self.name).clone()
    }

    /// Set the debug name
    pub fn set_name(&self, name: impl Into<String>) {
        *write(&self.name) = name.into();
    }

    /// Owning registry, if it is still alive
    pub fn parent(&self) -> Option<Arc<P>> {
        self.parent.upgrade()
    }
}

impl<P> fmt::Debug for ObjectHeader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeader")
            .field("kind", &self.kind)
            .field("ownership", &self.ownership())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Two-phase lifecycle implemented by every device-owned object kind
pub trait DeviceObject: Sized + Send + Sync + 'static {
    /// Create-info copied into the object at creation
    type CreateInfo: Clone + fmt::Debug + Send + Sync;
    /// Registry handle type
    type Handle: slotmap::Key;
    /// Kind tag for logging and backend allocation
    const KIND: ObjectKind;

    /// Construct an empty object, asking the backend for whatever native state it needs
    fn allocate(device: &Device) -> RhiResult<Self>;

    /// Embedded header
    fn header(&self) -> &ObjectHeader;

    /// Create-info the object was built from
    fn create_info(&self) -> &Self::CreateInfo;

    /// Store the copied create-info
    fn set_create_info(&mut self, info: Self::CreateInfo);

    /// Build native objects and sub-objects
    fn create_api_objects(&mut self, device: &Device, info: &Self::CreateInfo) -> RhiResult<()>;

    /// Release native objects and owned sub-objects; must tolerate partial creation
    fn destroy_api_objects(&self, device: &Device);

    /// Registry holding objects of this kind
    fn registry(device: &Device) -> &Registry<Self::Handle, Self>;

    /// Ownership the object takes once created
    fn declared_ownership(_info: &Self::CreateInfo) -> Ownership {
        Ownership::Reference
    }

    /// Copy `info` and build the object, releasing partial state on failure
    fn create(&mut self, device: &Device, info: &Self::CreateInfo) -> RhiResult<()> {
        self.set_create_info(info.clone());
        if let Err(err) = self.create_api_objects(device, info) {
            self.destroy_api_objects(device);
            return Err(err);
        }
        self.header().set_ownership(Self::declared_ownership(info));
        Ok(())
    }

    /// Tear the object down
    fn destroy(&self, device: &Device) {
        self.destroy_api_objects(device);
    }

    /// Current ownership
    fn ownership(&self) -> Ownership {
        self.header().ownership()
    }

    /// Request an ownership change
    fn set_ownership(&self, ownership: Ownership) -> Ownership {
        self.header().set_ownership(ownership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_defaults() {
        let header: ObjectHeader<()> = ObjectHeader::new(ObjectKind::Image, Weak::new());
        assert_eq!(header.kind(), ObjectKind::Image);
        assert_eq!(header.ownership(), Ownership::Reference);
        assert!(header.name().is_empty());
        assert!(header.parent().is_none());
    }

    #[test]
    fn test_header_name_and_parent() {
        let parent = Arc::new(7_u32);
        let header = ObjectHeader::new(ObjectKind::Buffer, Arc::downgrade(&parent));
        header.set_name("staging");

        assert_eq!(header.name(), "staging");
        assert_eq!(header.parent().as_deref(), Some(&7));

        drop(parent);
        assert!(header.parent().is_none());
    }

    #[test]
    fn test_capabilities() {
        assert!(ObjectKind::RenderTargetView.capabilities().contains(ObjectCapabilities::IMAGE_VIEW));
        assert!(ObjectKind::DrawPass.capabilities().contains(ObjectCapabilities::COMPOSITE));
        assert!(!ObjectKind::DrawPass.capabilities().contains(ObjectCapabilities::NATIVE));
        assert!(ObjectKind::CommandBuffer.capabilities().contains(ObjectCapabilities::RECORDABLE));
    }
}
