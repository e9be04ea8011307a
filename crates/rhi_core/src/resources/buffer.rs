//! Linear GPU memory

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::BufferHandle;
use crate::object::ObjectKind;
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};
use crate::types::{BufferUsageFlags, MemoryUsage, ResourceState};

/// Description of a buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferCreateInfo {
    /// Size in bytes, must be non-zero
    pub size: u64,
    /// Allowed uses
    pub usage: BufferUsageFlags,
    /// Where the memory lives
    pub memory_usage: MemoryUsage,
    /// State the buffer starts in
    pub initial_state: ResourceState,
    /// Ownership the created buffer takes
    pub ownership: Ownership,
}

impl BufferCreateInfo {
    /// GPU-only buffer of `size` bytes
    pub fn new(size: u64, usage: BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            ..Self::default()
        }
    }

    /// CPU-visible staging buffer used as a copy source
    pub fn staging(size: u64) -> Self {
        Self {
            size,
            usage: BufferUsageFlags::TRANSFER_SRC,
            memory_usage: MemoryUsage::CpuToGpu,
            initial_state: ResourceState::CopySrc,
            ..Self::default()
        }
    }

    /// Set the memory usage
    #[must_use]
    pub const fn with_memory_usage(mut self, memory_usage: MemoryUsage) -> Self {
        self.memory_usage = memory_usage;
        self
    }

    /// Set the initial state
    #[must_use]
    pub const fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    /// Set the ownership the buffer is created with
    #[must_use]
    pub const fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }
}

impl ResourceInfo for BufferCreateInfo {
    type Handle = BufferHandle;
    const KIND: ObjectKind = ObjectKind::Buffer;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if self.size == 0 {
            return Err(RhiError::invalid_create_argument("buffer size must be non-zero"));
        }
        Ok(ApiObjectDesc::Buffer(self))
    }

    fn registry(device: &Device) -> &Registry<BufferHandle, Buffer> {
        &device.registries().buffers
    }
}

/// Managed buffer
pub type Buffer = Resource<BufferCreateInfo>;

impl Buffer {
    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.create_info.size
    }

    /// Allowed uses
    pub fn usage(&self) -> BufferUsageFlags {
        self.create_info.usage
    }

    /// Where the memory lives
    pub fn memory_usage(&self) -> MemoryUsage {
        self.create_info.memory_usage
    }
}
