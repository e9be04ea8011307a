//! # Device
//!
//! A [`Device`] owns one [`Registry`] per object kind and is the only way objects are created or
//! destroyed. Creation is uniform for every kind:
//!
//! 1. the backend allocates the native half ([`DeviceObject::allocate`])
//! 2. the object is built ([`DeviceObject::create`]), which releases partial state on failure
//! 3. only a fully built object is inserted into its registry
//!
//! Destroying a stale handle is a logged no-op.
//!
//! ## Teardown
//!
//! Device teardown follows a fixed order. Queues go first so no in-flight work still references
//! anything. Composite objects follow, and they destroy the sub-objects they own. Render passes
//! come next because they still reference images and views. The remaining primitive kinds go
//! last, with descriptor sets before their pools and views before their images.

use std::sync::{Arc, Weak};

use crate::backend::Backend;
use crate::command::{CommandBuffer, CommandBufferCreateInfo};
use crate::config::{Config, ConfigError, Deserialize, Serialize};
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, ComputePipelineHandle, DepthStencilViewHandle,
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, DrawPassHandle, FenceHandle,
    FullscreenQuadHandle, GraphicsPipelineHandle, ImageHandle, MeshHandle, PipelineInterfaceHandle, QueueHandle,
    RenderPassHandle, RenderTargetViewHandle, SampledImageViewHandle, SamplerHandle, SemaphoreHandle,
    ShaderModuleHandle, StorageImageViewHandle, SwapchainHandle, TextureHandle,
};
use crate::instance::Instance;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::pass::draw_pass::{
    DrawPass, DrawPassCreateInfo, DrawPassCreateInfo2, DrawPassCreateInfo3, VersionedDrawPassCreateInfo,
};
use crate::pass::render_pass::{
    RenderPass, RenderPassCreateInfo, RenderPassCreateInfo2, RenderPassCreateInfo3, VersionedRenderPassCreateInfo,
};
use crate::queue::{Queue, QueueCreateInfo};
use crate::registry::Registry;
use crate::resources::buffer::{Buffer, BufferCreateInfo};
use crate::resources::command_pool::{CommandPool, CommandPoolCreateInfo};
use crate::resources::descriptor::{
    DescriptorPool, DescriptorPoolCreateInfo, DescriptorSet, DescriptorSetCreateInfo, DescriptorSetLayout,
    DescriptorSetLayoutCreateInfo,
};
use crate::resources::fullscreen_quad::{FullscreenQuad, FullscreenQuadCreateInfo};
use crate::resources::image::{
    DepthStencilView, DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetView,
    RenderTargetViewCreateInfo, SampledImageView, SampledImageViewCreateInfo, StorageImageView,
    StorageImageViewCreateInfo,
};
use crate::resources::mesh::{Mesh, MeshCreateInfo};
use crate::resources::pipeline::{
    ComputePipeline, ComputePipelineCreateInfo, GraphicsPipeline, GraphicsPipelineCreateInfo, PipelineInterface,
    PipelineInterfaceCreateInfo,
};
use crate::resources::sampler::{Sampler, SamplerCreateInfo};
use crate::resources::shader::{ShaderModule, ShaderModuleCreateInfo};
use crate::resources::swapchain::{Swapchain, SwapchainCreateInfo};
use crate::resources::sync::{Fence, FenceCreateInfo, Semaphore, SemaphoreCreateInfo};
use crate::resources::texture::{Texture, TextureCreateInfo};
use crate::types::CommandType;

/// Upper bound on queues of one capability
pub const MAX_QUEUES_PER_TYPE: u32 = 16;

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCreateInfo {
    /// Debug name, also used to pick an adapter when a backend offers several
    pub name: String,
    /// Graphics queues to create
    pub graphics_queue_count: u32,
    /// Compute queues to create
    pub compute_queue_count: u32,
    /// Transfer queues to create
    pub transfer_queue_count: u32,
}

impl Default for DeviceCreateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            graphics_queue_count: 1,
            compute_queue_count: 0,
            transfer_queue_count: 0,
        }
    }
}

impl Config for DeviceCreateInfo {}

impl DeviceCreateInfo {
    /// Set the debug name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of queues of one capability
    #[must_use]
    pub const fn with_queue_count(mut self, command_type: CommandType, count: u32) -> Self {
        match command_type {
            CommandType::Graphics => self.graphics_queue_count = count,
            CommandType::Compute => self.compute_queue_count = count,
            CommandType::Transfer => self.transfer_queue_count = count,
        }
        self
    }

    /// Queues requested for `command_type`
    pub const fn queue_count(&self, command_type: CommandType) -> u32 {
        match command_type {
            CommandType::Graphics => self.graphics_queue_count,
            CommandType::Compute => self.compute_queue_count,
            CommandType::Transfer => self.transfer_queue_count,
        }
    }

    /// Check queue counts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            self.graphics_queue_count,
            self.compute_queue_count,
            self.transfer_queue_count,
        ];
        if counts.iter().all(|&count| count == 0) {
            return Err(ConfigError::Invalid("device needs at least one queue".to_string()));
        }
        if let Some(&count) = counts.iter().find(|&&count| count > MAX_QUEUES_PER_TYPE) {
            return Err(ConfigError::Invalid(format!(
                "{count} queues requested, at most {MAX_QUEUES_PER_TYPE} per type are supported"
            )));
        }
        Ok(())
    }
}

/// One registry per object kind
#[allow(missing_docs)]
pub struct DeviceRegistries {
    pub queues: Registry<QueueHandle, Queue>,
    pub draw_passes: Registry<DrawPassHandle, DrawPass>,
    pub fullscreen_quads: Registry<FullscreenQuadHandle, FullscreenQuad>,
    pub textures: Registry<TextureHandle, Texture>,
    pub meshes: Registry<MeshHandle, Mesh>,
    pub render_passes: Registry<RenderPassHandle, RenderPass>,
    pub buffers: Registry<BufferHandle, Buffer>,
    pub command_buffers: Registry<CommandBufferHandle, CommandBuffer>,
    pub command_pools: Registry<CommandPoolHandle, CommandPool>,
    pub compute_pipelines: Registry<ComputePipelineHandle, ComputePipeline>,
    pub graphics_pipelines: Registry<GraphicsPipelineHandle, GraphicsPipeline>,
    pub pipeline_interfaces: Registry<PipelineInterfaceHandle, PipelineInterface>,
    pub descriptor_sets: Registry<DescriptorSetHandle, DescriptorSet>,
    pub descriptor_pools: Registry<DescriptorPoolHandle, DescriptorPool>,
    pub descriptor_set_layouts: Registry<DescriptorSetLayoutHandle, DescriptorSetLayout>,
    pub fences: Registry<FenceHandle, Fence>,
    pub semaphores: Registry<SemaphoreHandle, Semaphore>,
    pub render_target_views: Registry<RenderTargetViewHandle, RenderTargetView>,
    pub depth_stencil_views: Registry<DepthStencilViewHandle, DepthStencilView>,
    pub sampled_image_views: Registry<SampledImageViewHandle, SampledImageView>,
    pub storage_image_views: Registry<StorageImageViewHandle, StorageImageView>,
    pub images: Registry<ImageHandle, Image>,
    pub samplers: Registry<SamplerHandle, Sampler>,
    pub shader_modules: Registry<ShaderModuleHandle, ShaderModule>,
    pub swapchains: Registry<SwapchainHandle, Swapchain>,
}

impl DeviceRegistries {
    fn new() -> Self {
        Self {
            queues: Registry::new(),
            draw_passes: Registry::new(),
            fullscreen_quads: Registry::new(),
            textures: Registry::new(),
            meshes: Registry::new(),
            render_passes: Registry::new(),
            buffers: Registry::new(),
            command_buffers: Registry::new(),
            command_pools: Registry::new(),
            compute_pipelines: Registry::new(),
            graphics_pipelines: Registry::new(),
            pipeline_interfaces: Registry::new(),
            descriptor_sets: Registry::new(),
            descriptor_pools: Registry::new(),
            descriptor_set_layouts: Registry::new(),
            fences: Registry::new(),
            semaphores: Registry::new(),
            render_target_views: Registry::new(),
            depth_stencil_views: Registry::new(),
            sampled_image_views: Registry::new(),
            storage_image_views: Registry::new(),
            images: Registry::new(),
            samplers: Registry::new(),
            shader_modules: Registry::new(),
            swapchains: Registry::new(),
        }
    }

    /// Total number of live objects across every kind
    fn object_count(&self) -> usize {
        self.queues.len()
            + self.draw_passes.len()
            + self.fullscreen_quads.len()
            + self.textures.len()
            + self.meshes.len()
            + self.render_passes.len()
            + self.buffers.len()
            + self.command_buffers.len()
            + self.command_pools.len()
            + self.compute_pipelines.len()
            + self.graphics_pipelines.len()
            + self.pipeline_interfaces.len()
            + self.descriptor_sets.len()
            + self.descriptor_pools.len()
            + self.descriptor_set_layouts.len()
            + self.fences.len()
            + self.semaphores.len()
            + self.render_target_views.len()
            + self.depth_stencil_views.len()
            + self.sampled_image_views.len()
            + self.storage_image_views.len()
            + self.images.len()
            + self.samplers.len()
            + self.shader_modules.len()
            + self.swapchains.len()
    }
}

/// Logical device owning every GPU object created through it
pub struct Device {
    header: ObjectHeader<Instance>,
    create_info: DeviceCreateInfo,
    backend: Arc<dyn Backend>,
    registries: DeviceRegistries,
    weak_self: Weak<Device>,
}

impl Device {
    /// Build a device and its queues
    pub(crate) fn create(
        instance: Weak<Instance>,
        backend: Arc<dyn Backend>,
        info: &DeviceCreateInfo,
    ) -> RhiResult<Arc<Self>> {
        info.validate()?;

        let device = Arc::new_cyclic(|weak_self| Self {
            header: ObjectHeader::new(ObjectKind::Device, instance),
            create_info: info.clone(),
            backend,
            registries: DeviceRegistries::new(),
            weak_self: weak_self.clone(),
        });
        device.header.set_name(info.name.clone());

        if let Err(err) = device.create_queues(info) {
            log::error!("Failed to create device queues: {err}");
            device.destroy_all();
            return Err(err);
        }
        log::info!(
            "Created device '{}' with {} graphics, {} compute and {} transfer queues",
            info.name,
            info.graphics_queue_count,
            info.compute_queue_count,
            info.transfer_queue_count
        );
        Ok(device)
    }

    fn create_queues(&self, info: &DeviceCreateInfo) -> RhiResult<()> {
        for command_type in [CommandType::Graphics, CommandType::Compute, CommandType::Transfer] {
            for queue_index in 0..info.queue_count(command_type) {
                self.create_object::<Queue>(&QueueCreateInfo {
                    command_type,
                    queue_index,
                })?;
            }
        }
        Ok(())
    }

    /// Backend driving this device
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Weak reference handed to objects as their parent
    pub fn weak(&self) -> Weak<Self> {
        self.weak_self.clone()
    }

    /// Instance that created this device, if it is still alive
    pub fn instance(&self) -> Option<Arc<Instance>> {
        self.header.parent()
    }

    /// Configuration the device was created with
    pub const fn create_info(&self) -> &DeviceCreateInfo {
        &self.create_info
    }

    /// Debug name
    pub fn name(&self) -> String {
        self.header.name()
    }

    pub(crate) const fn registries(&self) -> &DeviceRegistries {
        &self.registries
    }

    /// Number of live objects of every kind, queues included
    pub fn object_count(&self) -> usize {
        self.registries.object_count()
    }

    /// Create an object of any kind
    ///
    /// On failure nothing is inserted and every partially created native object is released.
    pub fn create_object<T: DeviceObject>(&self, info: &T::CreateInfo) -> RhiResult<T::Handle> {
        let mut object = T::allocate(self).map_err(|err| {
            log::error!("Failed to allocate {}: {err}", T::KIND);
            err
        })?;
        if let Err(err) = object.create(self, info) {
            log::error!("Failed to create {}: {err}", T::KIND);
            return Err(err);
        }
        let handle = T::registry(self).insert(Arc::new(object));
        log::debug!("Created {} {handle:?}", T::KIND);
        Ok(handle)
    }

    /// Destroy an object of any kind; stale handles are ignored
    pub fn destroy_object<T: DeviceObject>(&self, handle: T::Handle) {
        match T::registry(self).remove(handle) {
            Some(object) => {
                object.destroy(self);
                log::debug!("Destroyed {} {handle:?}", T::KIND);
            }
            None => log::warn!("Ignoring destroy of stale {} handle {handle:?}", T::KIND),
        }
    }

    /// Destroy every object of one kind regardless of ownership
    pub(crate) fn destroy_all_objects<T: DeviceObject>(&self) {
        let objects = T::registry(self).drain();
        if !objects.is_empty() {
            log::debug!("Destroying {} remaining {} objects", objects.len(), T::KIND);
        }
        for (_, object) in objects {
            object.destroy(self);
        }
    }

    /// Destroy a sub-object only if a containing object owns it
    pub(crate) fn destroy_owned<T: DeviceObject>(&self, handle: T::Handle) {
        let owned = T::registry(self)
            .get(handle)
            .is_some_and(|object| object.ownership().is_owned_by_parent());
        if owned {
            self.destroy_object::<T>(handle);
        }
    }

    /// Look up an object of any kind
    pub fn object<T: DeviceObject>(&self, handle: T::Handle) -> Option<Arc<T>> {
        T::registry(self).get(handle)
    }

    /// Tear down every object in dependency order
    pub(crate) fn destroy_all(&self) {
        self.destroy_all_objects::<Queue>();

        self.destroy_all_objects::<DrawPass>();
        self.destroy_all_objects::<FullscreenQuad>();
        self.destroy_all_objects::<Texture>();
        self.destroy_all_objects::<Mesh>();

        self.destroy_all_objects::<RenderPass>();

        self.destroy_all_objects::<Buffer>();
        self.destroy_all_objects::<CommandBuffer>();
        self.destroy_all_objects::<CommandPool>();
        self.destroy_all_objects::<ComputePipeline>();
        self.destroy_all_objects::<GraphicsPipeline>();
        self.destroy_all_objects::<PipelineInterface>();
        self.destroy_all_objects::<DescriptorSet>();
        self.destroy_all_objects::<DescriptorPool>();
        self.destroy_all_objects::<DescriptorSetLayout>();
        self.destroy_all_objects::<Fence>();
        self.destroy_all_objects::<Semaphore>();
        self.destroy_all_objects::<RenderTargetView>();
        self.destroy_all_objects::<DepthStencilView>();
        self.destroy_all_objects::<SampledImageView>();
        self.destroy_all_objects::<StorageImageView>();
        self.destroy_all_objects::<Image>();
        self.destroy_all_objects::<Sampler>();
        self.destroy_all_objects::<ShaderModule>();
        self.destroy_all_objects::<Swapchain>();
    }

    fn queue_at(&self, command_type: CommandType, index: usize) -> RhiResult<Arc<Queue>> {
        let queues: Vec<Arc<Queue>> = self
            .registries
            .queues
            .entries()
            .into_iter()
            .map(|(_, queue)| queue)
            .filter(|queue| queue.command_type() == command_type)
            .collect();
        let count = queues.len();
        queues
            .into_iter()
            .nth(index)
            .ok_or(RhiError::OutOfRange { index, count })
    }

    fn queue_count(&self, command_type: CommandType) -> usize {
        self.registries
            .queues
            .entries()
            .iter()
            .filter(|(_, queue)| queue.command_type() == command_type)
            .count()
    }

    /// Graphics queue at `index`
    pub fn graphics_queue(&self, index: usize) -> RhiResult<Arc<Queue>> {
        self.queue_at(CommandType::Graphics, index)
    }

    /// Compute queue at `index`
    pub fn compute_queue(&self, index: usize) -> RhiResult<Arc<Queue>> {
        self.queue_at(CommandType::Compute, index)
    }

    /// Transfer queue at `index`
    pub fn transfer_queue(&self, index: usize) -> RhiResult<Arc<Queue>> {
        self.queue_at(CommandType::Transfer, index)
    }

    /// Number of graphics queues
    pub fn graphics_queue_count(&self) -> usize {
        self.queue_count(CommandType::Graphics)
    }

    /// Number of compute queues
    pub fn compute_queue_count(&self) -> usize {
        self.queue_count(CommandType::Compute)
    }

    /// Number of transfer queues
    pub fn transfer_queue_count(&self) -> usize {
        self.queue_count(CommandType::Transfer)
    }

    /// Queue by handle
    pub fn queue(&self, handle: QueueHandle) -> Option<Arc<Queue>> {
        self.object::<Queue>(handle)
    }

    /// Wait for every queue to drain
    pub fn wait_idle(&self) -> RhiResult<()> {
        for (_, queue) in self.registries.queues.entries() {
            queue.wait_idle()?;
        }
        Ok(())
    }

    /// Allocate a command buffer from a pool
    pub fn allocate_command_buffer(&self, info: &CommandBufferCreateInfo) -> RhiResult<CommandBufferHandle> {
        self.create_object::<CommandBuffer>(info)
    }

    /// Return a command buffer to its pool
    pub fn free_command_buffer(&self, handle: CommandBufferHandle) {
        self.destroy_object::<CommandBuffer>(handle);
    }

    /// Command buffer by handle
    pub fn command_buffer(&self, handle: CommandBufferHandle) -> Option<Arc<CommandBuffer>> {
        self.object::<CommandBuffer>(handle)
    }

    /// Allocate a descriptor set; pushable layouts are rejected
    pub fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> RhiResult<DescriptorSetHandle> {
        self.create_object::<DescriptorSet>(&DescriptorSetCreateInfo { pool, layout })
    }

    /// Return a descriptor set to its pool
    pub fn free_descriptor_set(&self, handle: DescriptorSetHandle) {
        self.destroy_object::<DescriptorSet>(handle);
    }

    /// Descriptor set by handle
    pub fn descriptor_set(&self, handle: DescriptorSetHandle) -> Option<Arc<DescriptorSet>> {
        self.object::<DescriptorSet>(handle)
    }

    /// Render pass over existing views
    pub fn create_render_pass(&self, info: &RenderPassCreateInfo) -> RhiResult<RenderPassHandle> {
        self.create_object::<RenderPass>(&VersionedRenderPassCreateInfo::from(info.clone()))
    }

    /// Render pass that creates its images and views from formats
    pub fn create_render_pass2(&self, info: &RenderPassCreateInfo2) -> RhiResult<RenderPassHandle> {
        self.create_object::<RenderPass>(&VersionedRenderPassCreateInfo::from(info.clone()))
    }

    /// Render pass over existing images
    pub fn create_render_pass3(&self, info: &RenderPassCreateInfo3) -> RhiResult<RenderPassHandle> {
        self.create_object::<RenderPass>(&VersionedRenderPassCreateInfo::from(info.clone()))
    }

    /// Destroy a render pass and the attachments it owns
    pub fn destroy_render_pass(&self, handle: RenderPassHandle) {
        self.destroy_object::<RenderPass>(handle);
    }

    /// Render pass by handle
    pub fn render_pass(&self, handle: RenderPassHandle) -> Option<Arc<RenderPass>> {
        self.object::<RenderPass>(handle)
    }

    /// Draw pass that creates its textures from formats
    pub fn create_draw_pass(&self, info: &DrawPassCreateInfo) -> RhiResult<DrawPassHandle> {
        self.create_object::<DrawPass>(&VersionedDrawPassCreateInfo::from(info.clone()))
    }

    /// Draw pass over existing images
    pub fn create_draw_pass2(&self, info: &DrawPassCreateInfo2) -> RhiResult<DrawPassHandle> {
        self.create_object::<DrawPass>(&VersionedDrawPassCreateInfo::from(info.clone()))
    }

    /// Draw pass over existing textures
    pub fn create_draw_pass3(&self, info: &DrawPassCreateInfo3) -> RhiResult<DrawPassHandle> {
        self.create_object::<DrawPass>(&VersionedDrawPassCreateInfo::from(info.clone()))
    }

    /// Destroy a draw pass, its cached passes and the textures it owns
    pub fn destroy_draw_pass(&self, handle: DrawPassHandle) {
        self.destroy_object::<DrawPass>(handle);
    }

    /// Draw pass by handle
    pub fn draw_pass(&self, handle: DrawPassHandle) -> Option<Arc<DrawPass>> {
        self.object::<DrawPass>(handle)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.object_count() > 0 {
            log::warn!("Device '{}' dropped with live objects, tearing down", self.name());
            self.destroy_all();
        }
    }
}

/// Generates `create_*`, `destroy_*` and a lookup for kinds created straight from their info
macro_rules! device_objects {
    ($($name:literal: $ty:ty, $info:ty, $handle:ty => $create:ident, $destroy:ident, $get:ident;)*) => {
        impl Device {
            $(
                #[doc = concat!("Create a ", $name)]
                pub fn $create(&self, info: &$info) -> RhiResult<$handle> {
                    self.create_object::<$ty>(info)
                }

                #[doc = concat!("Destroy a ", $name, "; stale handles are ignored")]
                pub fn $destroy(&self, handle: $handle) {
                    self.destroy_object::<$ty>(handle);
                }

                #[doc = concat!("Look up a ", $name)]
                pub fn $get(&self, handle: $handle) -> Option<Arc<$ty>> {
                    self.object::<$ty>(handle)
                }
            )*
        }
    };
}

device_objects! {
    "fullscreen quad": FullscreenQuad, FullscreenQuadCreateInfo, FullscreenQuadHandle
        => create_fullscreen_quad, destroy_fullscreen_quad, fullscreen_quad;
    "texture": Texture, TextureCreateInfo, TextureHandle => create_texture, destroy_texture, texture;
    "mesh": Mesh, MeshCreateInfo, MeshHandle => create_mesh, destroy_mesh, mesh;
    "buffer": Buffer, BufferCreateInfo, BufferHandle => create_buffer, destroy_buffer, buffer;
    "command pool": CommandPool, CommandPoolCreateInfo, CommandPoolHandle
        => create_command_pool, destroy_command_pool, command_pool;
    "compute pipeline": ComputePipeline, ComputePipelineCreateInfo, ComputePipelineHandle
        => create_compute_pipeline, destroy_compute_pipeline, compute_pipeline;
    "graphics pipeline": GraphicsPipeline, GraphicsPipelineCreateInfo, GraphicsPipelineHandle
        => create_graphics_pipeline, destroy_graphics_pipeline, graphics_pipeline;
    "pipeline interface": PipelineInterface, PipelineInterfaceCreateInfo, PipelineInterfaceHandle
        => create_pipeline_interface, destroy_pipeline_interface, pipeline_interface;
    "descriptor pool": DescriptorPool, DescriptorPoolCreateInfo, DescriptorPoolHandle
        => create_descriptor_pool, destroy_descriptor_pool, descriptor_pool;
    "descriptor set layout": DescriptorSetLayout, DescriptorSetLayoutCreateInfo, DescriptorSetLayoutHandle
        => create_descriptor_set_layout, destroy_descriptor_set_layout, descriptor_set_layout;
    "fence": Fence, FenceCreateInfo, FenceHandle => create_fence, destroy_fence, fence;
    "semaphore": Semaphore, SemaphoreCreateInfo, SemaphoreHandle => create_semaphore, destroy_semaphore, semaphore;
    "render target view": RenderTargetView, RenderTargetViewCreateInfo, RenderTargetViewHandle
        => create_render_target_view, destroy_render_target_view, render_target_view;
    "depth stencil view": DepthStencilView, DepthStencilViewCreateInfo, DepthStencilViewHandle
        => create_depth_stencil_view, destroy_depth_stencil_view, depth_stencil_view;
    "sampled image view": SampledImageView, SampledImageViewCreateInfo, SampledImageViewHandle
        => create_sampled_image_view, destroy_sampled_image_view, sampled_image_view;
    "storage image view": StorageImageView, StorageImageViewCreateInfo, StorageImageViewHandle
        => create_storage_image_view, destroy_storage_image_view, storage_image_view;
    "image": Image, ImageCreateInfo, ImageHandle => create_image, destroy_image, image;
    "sampler": Sampler, SamplerCreateInfo, SamplerHandle => create_sampler, destroy_sampler, sampler;
    "shader module": ShaderModule, ShaderModuleCreateInfo, ShaderModuleHandle
        => create_shader_module, destroy_shader_module, shader_module;
    "swapchain": Swapchain, SwapchainCreateInfo, SwapchainHandle => create_swapchain, destroy_swapchain, swapchain;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::ownership::Ownership;
    use crate::pass::draw_pass::{DrawPassClearFlags, DrawPassCreateInfo};
    use crate::resources::buffer::BufferCreateInfo;
    use crate::resources::descriptor::{DescriptorBinding, DescriptorType};
    use crate::testing::Fixture;
    use crate::types::{BufferUsageFlags, ImageUsageFlags, ResourceState};

    fn assert_failed_create_rolls_back<T: DeviceObject>(fixture: &Fixture, info: &T::CreateInfo) {
        let device = &fixture.device;
        let before = T::registry(device).len();

        fixture.backend.fail_next_create(T::KIND);
        let err = device.create_object::<T>(info).unwrap_err();
        assert!(matches!(err, RhiError::Backend(_)), "{}: {err:?}", T::KIND);
        assert_eq!(T::registry(device).len(), before, "{}", T::KIND);

        device.create_object::<T>(info).unwrap();
        assert_eq!(T::registry(device).len(), before + 1, "{}", T::KIND);
    }

    #[test]
    fn test_create_destroy_round_trip() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let before = device.registries().buffers.handles();

        let handle = device
            .create_buffer(&BufferCreateInfo::new(16, BufferUsageFlags::UNIFORM_BUFFER))
            .unwrap();
        device.destroy_buffer(handle);
        assert_eq!(device.registries().buffers.handles(), before);

        device.destroy_buffer(handle);
        assert_eq!(device.registries().buffers.handles(), before);
        assert_eq!(fixture.backend.live_count(ObjectKind::Buffer), 0);
    }

    #[test]
    fn test_failed_allocation_leaves_registry_unchanged() {
        let fixture = Fixture::new();
        let device = &fixture.device;

        fixture.backend.fail_next_allocation(ObjectKind::Fence);
        assert_eq!(
            device.create_fence(&FenceCreateInfo::default()).unwrap_err(),
            RhiError::AllocationFailed { kind: ObjectKind::Fence }
        );
        assert_eq!(device.registries().fences.len(), 0);
    }

    #[test]
    fn test_failed_native_create_for_every_kind() {
        let fixture = Fixture::new();
        let device = &fixture.device;

        let color_info = ImageCreateInfo::sampled_2d(16, 16, Format::R8G8B8A8Unorm)
            .with_usage(ImageUsageFlags::SAMPLED | ImageUsageFlags::STORAGE | ImageUsageFlags::COLOR_ATTACHMENT);
        assert_failed_create_rolls_back::<Image>(&fixture, &color_info);
        let color = device.create_image(&color_info).unwrap();
        let color_image = device.image(color).unwrap();
        let depth = device
            .create_image(&ImageCreateInfo::depth_stencil_target_2d(16, 16, Format::D32Float))
            .unwrap();
        let depth_image = device.image(depth).unwrap();

        assert_failed_create_rolls_back::<RenderTargetView>(
            &fixture,
            &RenderTargetViewCreateInfo::guess_from_image(color, &color_image),
        );
        assert_failed_create_rolls_back::<DepthStencilView>(
            &fixture,
            &DepthStencilViewCreateInfo::guess_from_image(depth, &depth_image),
        );
        assert_failed_create_rolls_back::<SampledImageView>(
            &fixture,
            &SampledImageViewCreateInfo::guess_from_image(color, &color_image),
        );
        assert_failed_create_rolls_back::<StorageImageView>(
            &fixture,
            &StorageImageViewCreateInfo::guess_from_image(color, &color_image),
        );

        let buffer_info = BufferCreateInfo::new(64, BufferUsageFlags::UNIFORM_BUFFER);
        assert_failed_create_rolls_back::<Buffer>(&fixture, &buffer_info);
        assert_failed_create_rolls_back::<Sampler>(&fixture, &SamplerCreateInfo::default());
        assert_failed_create_rolls_back::<Fence>(&fixture, &FenceCreateInfo::default());
        assert_failed_create_rolls_back::<Semaphore>(&fixture, &SemaphoreCreateInfo::default());
        let shader_info = ShaderModuleCreateInfo::new(vec![1, 2, 3, 4]);
        assert_failed_create_rolls_back::<ShaderModule>(&fixture, &shader_info);
        assert_failed_create_rolls_back::<Swapchain>(
            &fixture,
            &SwapchainCreateInfo {
                width: 16,
                height: 16,
                ..SwapchainCreateInfo::default()
            },
        );

        let pool_info = CommandPoolCreateInfo::default();
        assert_failed_create_rolls_back::<CommandPool>(&fixture, &pool_info);
        let pool = device.create_command_pool(&pool_info).unwrap();
        assert_failed_create_rolls_back::<CommandBuffer>(
            &fixture,
            &CommandBufferCreateInfo {
                pool,
                resource_descriptor_count: 0,
                sampler_descriptor_count: 0,
            },
        );
        assert_failed_create_rolls_back::<Queue>(
            &fixture,
            &QueueCreateInfo {
                command_type: CommandType::Compute,
                queue_index: 0,
            },
        );

        let descriptor_pool_info = DescriptorPoolCreateInfo::uniform(4, 4);
        assert_failed_create_rolls_back::<DescriptorPool>(&fixture, &descriptor_pool_info);
        let layout_info = DescriptorSetLayoutCreateInfo {
            bindings: vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer)],
            pushable: false,
        };
        assert_failed_create_rolls_back::<DescriptorSetLayout>(&fixture, &layout_info);
        let descriptor_pool = device.create_descriptor_pool(&descriptor_pool_info).unwrap();
        let layout = device.create_descriptor_set_layout(&layout_info).unwrap();
        assert_failed_create_rolls_back::<DescriptorSet>(
            &fixture,
            &DescriptorSetCreateInfo {
                pool: descriptor_pool,
                layout,
            },
        );

        let interface_info = PipelineInterfaceCreateInfo::default();
        assert_failed_create_rolls_back::<PipelineInterface>(&fixture, &interface_info);
        let interface = device.create_pipeline_interface(&interface_info).unwrap();
        let shader = device.create_shader_module(&shader_info).unwrap();
        assert_failed_create_rolls_back::<GraphicsPipeline>(
            &fixture,
            &GraphicsPipelineCreateInfo {
                interface,
                vertex_shader: shader,
                pixel_shader: Some(shader),
                render_target_formats: vec![Format::R8G8B8A8Unorm],
                ..GraphicsPipelineCreateInfo::default()
            },
        );
        assert_failed_create_rolls_back::<ComputePipeline>(
            &fixture,
            &ComputePipelineCreateInfo {
                interface,
                compute_shader: shader,
                ownership: Ownership::Reference,
            },
        );
    }

    #[test]
    fn test_restricted_is_sticky_through_device() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let handle = device
            .create_buffer(&BufferCreateInfo::new(16, BufferUsageFlags::VERTEX_BUFFER))
            .unwrap();
        let buffer = device.buffer(handle).unwrap();

        buffer.set_ownership(Ownership::Restricted);
        buffer.set_ownership(Ownership::Reference);
        buffer.set_ownership(Ownership::Exclusive);
        assert_eq!(buffer.ownership(), Ownership::Restricted);
    }

    #[test]
    fn test_queues_from_create_info() {
        let info = DeviceCreateInfo::default()
            .with_queue_count(CommandType::Compute, 2)
            .with_name("compute heavy");
        let fixture = Fixture::with_device_info(&info);
        let device = &fixture.device;

        assert_eq!(device.graphics_queue_count(), 1);
        assert_eq!(device.compute_queue_count(), 2);
        assert_eq!(device.transfer_queue_count(), 0);
        assert_eq!(device.compute_queue(1).unwrap().queue_index(), 1);
        assert!(matches!(
            device.transfer_queue(0),
            Err(RhiError::OutOfRange { index: 0, count: 0 })
        ));
        assert_eq!(device.name(), "compute heavy");
        device.wait_idle().unwrap();
    }

    #[test]
    fn test_invalid_queue_counts_rejected() {
        let none = DeviceCreateInfo::default().with_queue_count(CommandType::Graphics, 0);
        assert!(matches!(none.validate(), Err(ConfigError::Invalid(_))));
        let too_many = DeviceCreateInfo::default().with_queue_count(CommandType::Transfer, MAX_QUEUES_PER_TYPE + 1);
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_config_round_trip_ron() {
        let dir = std::env::temp_dir().join(format!("rhi_device_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device.ron");

        let info = DeviceCreateInfo::default()
            .with_name("gpu0")
            .with_queue_count(CommandType::Transfer, 2);
        info.save_to_file(&path).unwrap();
        let loaded = DeviceCreateInfo::load_from_file(&path).unwrap();
        assert_eq!(loaded, info);
        assert!(loaded.validate().is_ok());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_teardown_releases_everything() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        device
            .create_draw_pass(&DrawPassCreateInfo {
                width: 32,
                height: 32,
                render_target_formats: vec![Format::R8G8B8A8Unorm],
                depth_stencil_format: Format::D32Float,
                depth_stencil_initial_state: ResourceState::DepthStencilWrite,
                ..DrawPassCreateInfo::default()
            })
            .unwrap();
        device
            .create_image(&ImageCreateInfo::sampled_2d(4, 4, Format::R8G8B8A8Unorm))
            .unwrap();
        let queue = device.graphics_queue(0).unwrap();
        queue.create_command_buffer(device, 0, 0).unwrap();

        device.destroy_all();
        assert_eq!(device.object_count(), 0);
        assert_eq!(fixture.backend.live_total(), 0);
        assert_eq!(fixture.backend.destroyed_kinds().first(), Some(&ObjectKind::CommandBuffer));
    }

    #[test]
    fn test_teardown_order_across_groups() {
        let fixture = Fixture::new();
        let device = &fixture.device;

        let draw_pass = device
            .create_draw_pass(&DrawPassCreateInfo {
                width: 32,
                height: 32,
                render_target_formats: vec![Format::R8G8B8A8Unorm],
                depth_stencil_format: Format::D24UnormS8Uint,
                depth_stencil_initial_state: ResourceState::DepthStencilWrite,
                ..DrawPassCreateInfo::default()
            })
            .unwrap();
        let draw_pass = device.draw_pass(draw_pass).unwrap();
        let draw_render_pass = device
            .render_pass(draw_pass.render_pass(DrawPassClearFlags::CLEAR_ALL).unwrap())
            .unwrap()
            .native_handle();
        let draw_texture = device.texture(draw_pass.render_target_texture(0).unwrap()).unwrap();
        let draw_image = device.image(draw_texture.image()).unwrap().native_handle();

        let pass_image = device
            .create_image(&ImageCreateInfo::render_target_2d(32, 32, Format::R8G8B8A8Unorm))
            .unwrap();
        let render_pass = device
            .create_render_pass3(&RenderPassCreateInfo3 {
                width: 32,
                height: 32,
                render_target_images: vec![pass_image],
                ..RenderPassCreateInfo3::default()
            })
            .unwrap();
        let render_pass = device.render_pass(render_pass).unwrap().native_handle();

        let pool = device
            .create_descriptor_pool(&DescriptorPoolCreateInfo::uniform(2, 2))
            .unwrap();
        let layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutCreateInfo {
                bindings: vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer)],
                pushable: false,
            })
            .unwrap();
        let set = device.allocate_descriptor_set(pool, layout).unwrap();
        let set = device.descriptor_set(set).unwrap().native_handle();
        let pool = device.descriptor_pool(pool).unwrap().native_handle();

        let image = device
            .create_image(&ImageCreateInfo::render_target_2d(16, 16, Format::R8G8B8A8Unorm))
            .unwrap();
        let view_info = RenderTargetViewCreateInfo::guess_from_image(image, &device.image(image).unwrap());
        let view = device.create_render_target_view(&view_info).unwrap();
        let view = device.render_target_view(view).unwrap().native_handle();
        let image = device.image(image).unwrap().native_handle();

        device.destroy_all();
        assert_eq!(fixture.backend.live_total(), 0);

        let destroyed = fixture.backend.destroyed_handles();
        let position = |handle| destroyed.iter().position(|&logged| logged == handle).unwrap();
        assert!(position(draw_render_pass) < position(render_pass));
        assert!(position(draw_image) < position(render_pass));
        assert!(position(render_pass) < position(set));
        assert!(position(render_pass) < position(image));
        assert!(position(set) < position(pool));
        assert!(position(view) < position(image));
    }
}
