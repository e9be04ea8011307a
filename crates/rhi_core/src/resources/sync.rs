//! Fences and semaphores

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::RhiResult;
use crate::foundation::collections::{FenceHandle, SemaphoreHandle};
use crate::object::ObjectKind;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};

/// Description of a fence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceCreateInfo {
    /// Start in the signaled state
    pub signaled: bool,
}

impl ResourceInfo for FenceCreateInfo {
    type Handle = FenceHandle;
    const KIND: ObjectKind = ObjectKind::Fence;

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        Ok(ApiObjectDesc::Fence(self))
    }

    fn registry(device: &Device) -> &Registry<FenceHandle, Fence> {
        &device.registries().fences
    }
}

/// Managed fence
pub type Fence = Resource<FenceCreateInfo>;

impl Fence {
    /// True if the fence was created signaled
    pub fn created_signaled(&self) -> bool {
        self.create_info.signaled
    }
}

/// Semaphore flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SemaphoreType {
    /// Signaled once per submission
    #[default]
    Binary,
    /// Monotonically increasing counter
    Timeline,
}

/// Description of a semaphore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemaphoreCreateInfo {
    /// Binary or timeline
    pub semaphore_type: SemaphoreType,
    /// Starting counter value for timeline semaphores
    pub initial_value: u64,
}

impl ResourceInfo for SemaphoreCreateInfo {
    type Handle = SemaphoreHandle;
    const KIND: ObjectKind = ObjectKind::Semaphore;

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        Ok(ApiObjectDesc::Semaphore(self))
    }

    fn registry(device: &Device) -> &Registry<SemaphoreHandle, Semaphore> {
        &device.registries().semaphores
    }
}

/// Managed semaphore
pub type Semaphore = Resource<SemaphoreCreateInfo>;

impl Semaphore {
    /// Binary or timeline
    pub fn semaphore_type(&self) -> SemaphoreType {
        self.create_info.semaphore_type
    }
}
