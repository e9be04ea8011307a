//! Swapchains
//!
//! Only the object lifecycle lives here. Image acquisition and presentation belong to the
//! native backend.

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::SwapchainHandle;
use crate::format::Format;
use crate::object::ObjectKind;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};
use crate::types::ImageUsageFlags;

/// Description of a swapchain
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SwapchainCreateInfo {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub image_count: u32,
    pub image_usage: ImageUsageFlags,
    pub vsync: bool,
}

impl Default for SwapchainCreateInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: Format::B8G8R8A8Unorm,
            image_count: 2,
            image_usage: ImageUsageFlags::COLOR_ATTACHMENT,
            vsync: true,
        }
    }
}

impl ResourceInfo for SwapchainCreateInfo {
    type Handle = SwapchainHandle;
    const KIND: ObjectKind = ObjectKind::Swapchain;

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::invalid_create_argument("swapchain extent has a zero dimension"));
        }
        if self.image_count < 2 {
            return Err(RhiError::invalid_create_argument("swapchain needs at least two images"));
        }
        Ok(ApiObjectDesc::Swapchain(self))
    }

    fn registry(device: &Device) -> &Registry<SwapchainHandle, Swapchain> {
        &device.registries().swapchains
    }
}

/// Managed swapchain
pub type Swapchain = Resource<SwapchainCreateInfo>;

impl Swapchain {
    /// Number of presentable images
    pub fn image_count(&self) -> u32 {
        self.create_info.image_count
    }

    /// Presentable image format
    pub fn format(&self) -> Format {
        self.create_info.format
    }
}
