//! # Backend Module
//!
//! The capability traits a native graphics API implements to plug into the resource layer.
//!
//! ## Organization
//!
//! - [`Backend`]: factory that allocates per-kind native objects
//! - [`ApiObject`]: create/destroy of a primitive native object from an [`ApiObjectDesc`]
//! - [`CommandBufferApi`]: recording hooks driven by [`CommandBuffer`](crate::command::CommandBuffer)
//! - [`QueueApi`]: submission hooks driven by [`Queue`](crate::queue::Queue)
//! - [`headless`]: in-process backend without a GPU
//! - [`vulkan`]: enum conversions for a Vulkan backend
//!
//! Backends never see registries or handles. Everything they need is resolved into native
//! handles before a hook is invoked.

pub mod headless;
pub mod vulkan;

use std::fmt;
use std::sync::Mutex;

use crate::command::{
    BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBufferCreateInfo, RenderPassBeginInfo, RenderingInfo,
};
use crate::error::RhiResult;
use crate::foundation::sync::lock;
use crate::object::ObjectKind;
use crate::pass::render_pass::RenderPassLayout;
use crate::queue::QueueCreateInfo;
use crate::resources::buffer::BufferCreateInfo;
use crate::resources::command_pool::CommandPoolCreateInfo;
use crate::resources::descriptor::{DescriptorPoolCreateInfo, DescriptorSetCreateInfo, DescriptorSetLayoutCreateInfo};
use crate::resources::image::{
    DepthStencilViewCreateInfo, ImageCreateInfo, RenderTargetViewCreateInfo, SampledImageViewCreateInfo,
    StorageImageViewCreateInfo,
};
use crate::resources::pipeline::{ComputePipelineCreateInfo, GraphicsPipelineCreateInfo, PipelineInterfaceCreateInfo};
use crate::resources::sampler::SamplerCreateInfo;
use crate::resources::shader::ShaderModuleCreateInfo;
use crate::resources::swapchain::SwapchainCreateInfo;
use crate::resources::sync::{FenceCreateInfo, SemaphoreCreateInfo};
use crate::types::{Api, ResourceState, SubresourceRange};

/// Opaque native object handle
pub type NativeHandle = u64;

/// Description handed to a backend when a primitive object is created
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub enum ApiObjectDesc<'a> {
    Buffer(&'a BufferCreateInfo),
    Image(&'a ImageCreateInfo),
    RenderTargetView {
        info: &'a RenderTargetViewCreateInfo,
        image: NativeHandle,
    },
    DepthStencilView {
        info: &'a DepthStencilViewCreateInfo,
        image: NativeHandle,
    },
    SampledImageView {
        info: &'a SampledImageViewCreateInfo,
        image: NativeHandle,
    },
    StorageImageView {
        info: &'a StorageImageViewCreateInfo,
        image: NativeHandle,
    },
    Sampler(&'a SamplerCreateInfo),
    Fence(&'a FenceCreateInfo),
    Semaphore(&'a SemaphoreCreateInfo),
    ShaderModule(&'a ShaderModuleCreateInfo),
    CommandPool(&'a CommandPoolCreateInfo),
    DescriptorPool(&'a DescriptorPoolCreateInfo),
    DescriptorSetLayout(&'a DescriptorSetLayoutCreateInfo),
    DescriptorSet {
        info: &'a DescriptorSetCreateInfo,
        pool: NativeHandle,
        layout: NativeHandle,
    },
    PipelineInterface(&'a PipelineInterfaceCreateInfo),
    GraphicsPipeline(&'a GraphicsPipelineCreateInfo),
    ComputePipeline(&'a ComputePipelineCreateInfo),
    Swapchain(&'a SwapchainCreateInfo),
    RenderPass(&'a RenderPassLayout),
}

impl ApiObjectDesc<'_> {
    /// Kind of object being described
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Buffer(_) => ObjectKind::Buffer,
            Self::Image(_) => ObjectKind::Image,
            Self::RenderTargetView { .. } => ObjectKind::RenderTargetView,
            Self::DepthStencilView { .. } => ObjectKind::DepthStencilView,
            Self::SampledImageView { .. } => ObjectKind::SampledImageView,
            Self::StorageImageView { .. } => ObjectKind::StorageImageView,
            Self::Sampler(_) => ObjectKind::Sampler,
            Self::Fence(_) => ObjectKind::Fence,
            Self::Semaphore(_) => ObjectKind::Semaphore,
            Self::ShaderModule(_) => ObjectKind::ShaderModule,
            Self::CommandPool(_) => ObjectKind::CommandPool,
            Self::DescriptorPool(_) => ObjectKind::DescriptorPool,
            Self::DescriptorSetLayout(_) => ObjectKind::DescriptorSetLayout,
            Self::DescriptorSet { .. } => ObjectKind::DescriptorSet,
            Self::PipelineInterface(_) => ObjectKind::PipelineInterface,
            Self::GraphicsPipeline(_) => ObjectKind::GraphicsPipeline,
            Self::ComputePipeline(_) => ObjectKind::ComputePipeline,
            Self::Swapchain(_) => ObjectKind::Swapchain,
            Self::RenderPass(_) => ObjectKind::RenderPass,
        }
    }
}

/// Native half of a primitive object
pub trait ApiObject: Send + fmt::Debug {
    /// Create the native object
    fn create_api_objects(&mut self, desc: &ApiObjectDesc<'_>) -> RhiResult<()>;

    /// Destroy the native object; called after partial creation too
    fn destroy_api_objects(&mut self);

    /// Native handle, zero before creation
    fn native_handle(&self) -> NativeHandle;
}

/// Native half of a command buffer
pub trait CommandBufferApi: Send + fmt::Debug {
    /// Allocate the native command buffer from `pool`
    fn create_api_objects(&mut self, info: &CommandBufferCreateInfo, pool: NativeHandle) -> RhiResult<()>;

    /// Free the native command buffer
    fn destroy_api_objects(&mut self);

    /// Native handle, zero before creation
    fn native_handle(&self) -> NativeHandle;

    /// Start recording
    fn begin(&mut self) -> RhiResult<()>;

    /// Finish recording
    fn end(&mut self) -> RhiResult<()>;

    /// Record the start of a render pass object
    fn begin_render_pass_impl(&mut self, render_pass: NativeHandle, begin_info: &RenderPassBeginInfo);

    /// Record the end of a render pass object
    fn end_render_pass_impl(&mut self);

    /// Record the start of dynamic rendering
    fn begin_rendering_impl(
        &mut self,
        info: &RenderingInfo,
        render_targets: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    );

    /// Record the end of dynamic rendering
    fn end_rendering_impl(&mut self);

    /// Record an image layout transition
    fn transition_image_layout(
        &mut self,
        image: NativeHandle,
        range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
    );

    /// Record a buffer state transition
    fn buffer_resource_barrier(&mut self, buffer: NativeHandle, before: ResourceState, after: ResourceState);

    /// Record a buffer to buffer copy
    fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: NativeHandle, dst: NativeHandle);

    /// Record a buffer to image copy
    fn copy_buffer_to_image(&mut self, info: &BufferToImageCopyInfo, src: NativeHandle, dst: NativeHandle);
}

/// Native half of a queue
pub trait QueueApi: Send + fmt::Debug {
    /// Acquire the native queue
    fn create_api_objects(&mut self, info: &QueueCreateInfo) -> RhiResult<()>;

    /// Release the native queue
    fn destroy_api_objects(&mut self);

    /// Submit recorded command buffers, optionally signalling `fence`
    fn submit(&mut self, command_buffers: &[NativeHandle], fence: Option<NativeHandle>) -> RhiResult<()>;

    /// Block until all submitted work has completed
    fn wait_idle(&mut self) -> RhiResult<()>;
}

/// Factory implemented once per native graphics API
pub trait Backend: Send + Sync + fmt::Debug {
    /// API this backend drives
    fn api(&self) -> Api;

    /// Allocate the native half of a primitive object
    fn allocate_object(&self, kind: ObjectKind) -> RhiResult<Box<dyn ApiObject>>;

    /// Allocate the native half of a command buffer
    fn allocate_command_buffer(&self) -> RhiResult<Box<dyn CommandBufferApi>>;

    /// Allocate the native half of a queue
    fn allocate_queue(&self) -> RhiResult<Box<dyn QueueApi>>;
}

/// Lock-protected storage for an object's native half
///
/// Objects are shared through `Arc`, so the native half lives behind a mutex and is taken out
/// on destruction. A slot that has been destroyed ignores further calls.
pub struct ApiSlot<A: ?Sized> {
    inner: Mutex<Option<Box<A>>>,
}

impl<A: ?Sized> ApiSlot<A> {
    /// Wrap a freshly allocated native half
    pub fn new(api: Box<A>) -> Self {
        Self {
            inner: Mutex::new(Some(api)),
        }
    }

    /// Run `f` against the native half, `None` once destroyed
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> Option<R> {
        lock(&self.inner).as_mut().map(|api| f(&mut **api))
    }

    /// Remove the native half
    pub fn take(&self) -> Option<Box<A>> {
        lock(&self.inner).take()
    }

    /// True once the native half has been removed
    pub fn is_destroyed(&self) -> bool {
        lock(&self.inner).is_none()
    }
}

impl ApiSlot<dyn ApiObject> {
    /// Native handle, zero once destroyed
    pub fn native_handle(&self) -> NativeHandle {
        self.with(|api| api.native_handle()).unwrap_or_default()
    }

    /// Destroy and drop the native half
    pub fn destroy(&self) {
        if let Some(mut api) = self.take() {
            api.destroy_api_objects();
        }
    }
}

impl<A: ?Sized> fmt::Debug for ApiSlot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSlot")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
