//! Queues
//!
//! Besides submission, a queue hands out transient command buffers. Each one gets its own
//! command pool, and the (pool, buffer) pairs live in a list behind a mutex so several threads
//! can request and return transient buffers on the same queue.
//!
//! The blocking copy helpers record into a transient buffer, submit and wait for the queue to
//! drain. They are meant for uploads outside the frame loop.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::backend::{ApiSlot, NativeHandle, QueueApi};
use crate::command::{BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBuffer, CommandBufferCreateInfo};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, FenceHandle, ImageHandle, QueueHandle,
};
use crate::foundation::sync::lock;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::registry::Registry;
use crate::resources::command_pool::CommandPoolCreateInfo;
use crate::scope::ScopeDestroyer;
use crate::types::{CommandType, ResourceState, SubresourceRange};

/// Description of a device queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCreateInfo {
    /// Capability of the queue
    pub command_type: CommandType,
    /// Index among queues of the same capability
    pub queue_index: u32,
}

/// Work handed to [`Queue::submit`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Recorded command buffers, executed in order
    pub command_buffers: Vec<CommandBufferHandle>,
    /// Fence signalled when the work completes
    pub fence: Option<FenceHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransientCommandBuffer {
    pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
}

/// Managed device queue
pub struct Queue {
    header: ObjectHeader,
    create_info: QueueCreateInfo,
    api: ApiSlot<dyn QueueApi>,
    transient: Mutex<Vec<TransientCommandBuffer>>,
}

impl Queue {
    /// Capability of the queue
    pub const fn command_type(&self) -> CommandType {
        self.create_info.command_type
    }

    /// Index among queues of the same capability
    pub const fn queue_index(&self) -> u32 {
        self.create_info.queue_index
    }

    fn with_api<R>(&self, f: impl FnOnce(&mut (dyn QueueApi + 'static)) -> RhiResult<R>) -> RhiResult<R> {
        self.api
            .with(f)
            .unwrap_or_else(|| Err(RhiError::invalid_operation("queue has been destroyed")))
    }

    /// Submit recorded command buffers
    pub fn submit(&self, device: &Device, info: &SubmitInfo) -> RhiResult<()> {
        let command_buffers = info
            .command_buffers
            .iter()
            .enumerate()
            .map(|(index, &handle)| {
                device
                    .command_buffer(handle)
                    .map(|cmd| cmd.native_handle())
                    .ok_or_else(|| RhiError::null_argument(format!("submit command buffer {index}")))
            })
            .collect::<RhiResult<Vec<NativeHandle>>>()?;
        let fence = info
            .fence
            .map(|fence| {
                device
                    .fence(fence)
                    .map(|fence| fence.native_handle())
                    .ok_or_else(|| RhiError::null_argument("submit fence"))
            })
            .transpose()?;
        self.with_api(|api| api.submit(&command_buffers, fence))
    }

    /// Block until every submission on this queue has completed
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.with_api(|api| api.wait_idle())
    }

    /// Create a transient command buffer with its own pool
    pub fn create_command_buffer(
        &self,
        device: &Device,
        resource_descriptor_count: u32,
        sampler_descriptor_count: u32,
    ) -> RhiResult<CommandBufferHandle> {
        let mut transient = lock(&self.transient);

        let pool = device.create_command_pool(&CommandPoolCreateInfo {
            command_type: self.command_type(),
        })?;
        let command_buffer = match device.allocate_command_buffer(&CommandBufferCreateInfo {
            pool,
            resource_descriptor_count,
            sampler_descriptor_count,
        }) {
            Ok(handle) => handle,
            Err(err) => {
                device.destroy_command_pool(pool);
                return Err(err);
            }
        };

        transient.push(TransientCommandBuffer { pool, command_buffer });
        Ok(command_buffer)
    }

    /// Free a transient command buffer and its pool; unknown buffers are ignored
    pub fn destroy_command_buffer(&self, device: &Device, command_buffer: CommandBufferHandle) {
        let mut transient = lock(&self.transient);
        let Some(index) = transient
            .iter()
            .position(|entry| entry.command_buffer == command_buffer)
        else {
            log::warn!("Queue does not own command buffer {command_buffer:?}");
            return;
        };
        let entry = transient.remove(index);
        device.free_command_buffer(entry.command_buffer);
        device.destroy_command_pool(entry.pool);
    }

    /// Number of transient command buffers currently handed out
    pub fn transient_command_buffer_count(&self) -> usize {
        lock(&self.transient).len()
    }

    fn record_and_wait(
        self: &Arc<Self>,
        device: &Device,
        record: impl FnOnce(&CommandBuffer) -> RhiResult<()>,
    ) -> RhiResult<()> {
        let mut scope = ScopeDestroyer::new(device);
        let handle = self.create_command_buffer(device, 0, 0)?;
        scope.add_command_buffer(self, handle)?;

        let cmd = device
            .command_buffer(handle)
            .ok_or_else(|| RhiError::null_argument("transient command buffer"))?;
        cmd.begin()?;
        record(&cmd)?;
        cmd.end()?;

        self.submit(
            device,
            &SubmitInfo {
                command_buffers: vec![handle],
                fence: None,
            },
        )?;
        self.wait_idle()
    }

    /// Copy between buffers and wait for completion
    ///
    /// The destination moves from `before` to the copy state and then to `after`.
    pub fn copy_buffer_to_buffer(
        self: &Arc<Self>,
        device: &Device,
        info: &BufferToBufferCopyInfo,
        src: BufferHandle,
        dst: BufferHandle,
        before: ResourceState,
        after: ResourceState,
    ) -> RhiResult<()> {
        self.record_and_wait(device, |cmd| {
            cmd.buffer_resource_barrier(device, dst, before, ResourceState::CopyDst)?;
            cmd.copy_buffer_to_buffer(device, info, src, dst)?;
            cmd.buffer_resource_barrier(device, dst, ResourceState::CopyDst, after)
        })
    }

    /// Copy buffer regions into an image and wait for completion
    ///
    /// `range` of the destination moves from `before` to the copy state and then to `after`.
    pub fn copy_buffer_to_image(
        self: &Arc<Self>,
        device: &Device,
        regions: &[BufferToImageCopyInfo],
        src: BufferHandle,
        dst: ImageHandle,
        range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
    ) -> RhiResult<()> {
        self.record_and_wait(device, |cmd| {
            cmd.transition_image_layout(device, dst, range, before, ResourceState::CopyDst)?;
            for region in regions {
                cmd.copy_buffer_to_image(device, region, src, dst)?;
            }
            cmd.transition_image_layout(device, dst, range, ResourceState::CopyDst, after)
        })
    }
}

impl DeviceObject for Queue {
    type CreateInfo = QueueCreateInfo;
    type Handle = QueueHandle;
    const KIND: ObjectKind = ObjectKind::Queue;

    fn allocate(device: &Device) -> RhiResult<Self> {
        let api = device.backend().allocate_queue()?;
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: QueueCreateInfo::default(),
            api: ApiSlot::new(api),
            transient: Mutex::new(Vec::new()),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &QueueCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: QueueCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, _device: &Device, info: &QueueCreateInfo) -> RhiResult<()> {
        self.with_api(|api| api.create_api_objects(info))
    }

    fn destroy_api_objects(&self, device: &Device) {
        let transient = std::mem::take(&mut *lock(&self.transient));
        for entry in transient {
            device.free_command_buffer(entry.command_buffer);
            device.destroy_command_pool(entry.pool);
        }
        if let Some(mut api) = self.api.take() {
            api.destroy_api_objects();
        }
    }

    fn registry(device: &Device) -> &Registry<QueueHandle, Self> {
        &device.registries().queues
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("header", &self.header)
            .field("create_info", &self.create_info)
            .field("transient", &self.transient_command_buffer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::RecordedCommand;
    use crate::format::Format;
    use crate::resources::buffer::BufferCreateInfo;
    use crate::resources::image::ImageCreateInfo;
    use crate::testing::Fixture;
    use crate::types::BufferUsageFlags;

    #[test]
    fn test_transient_command_buffers() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let queue = device.graphics_queue(0).unwrap();

        let first = queue.create_command_buffer(device, 0, 0).unwrap();
        let second = queue.create_command_buffer(device, 4, 2).unwrap();
        assert_eq!(queue.transient_command_buffer_count(), 2);
        assert_eq!(device.registries().command_pools.len(), 2);

        queue.destroy_command_buffer(device, first);
        assert_eq!(queue.transient_command_buffer_count(), 1);
        assert!(device.command_buffer(first).is_none());
        queue.destroy_command_buffer(device, first);
        assert_eq!(queue.transient_command_buffer_count(), 1);

        assert!(device.command_buffer(second).is_some());
        assert_eq!(device.registries().command_pools.len(), 1);
    }

    #[test]
    fn test_failed_allocation_releases_pool() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let queue = device.graphics_queue(0).unwrap();

        fixture.backend.fail_next_allocation(ObjectKind::CommandBuffer);
        assert!(queue.create_command_buffer(device, 0, 0).is_err());
        assert_eq!(queue.transient_command_buffer_count(), 0);
        assert_eq!(device.registries().command_pools.len(), 0);
    }

    #[test]
    fn test_blocking_buffer_copy() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let queue = device.graphics_queue(0).unwrap();
        let src = device.create_buffer(&BufferCreateInfo::staging(128)).unwrap();
        let dst = device
            .create_buffer(&BufferCreateInfo::new(128, BufferUsageFlags::TRANSFER_DST))
            .unwrap();
        fixture.backend.clear_log();

        let info = BufferToBufferCopyInfo {
            size: 128,
            ..BufferToBufferCopyInfo::default()
        };
        queue
            .copy_buffer_to_buffer(device, &info, src, dst, ResourceState::General, ResourceState::General)
            .unwrap();

        let commands = fixture.backend.commands();
        assert!(commands
            .iter()
            .any(|command| matches!(command, RecordedCommand::CopyBufferToBuffer { size: 128, .. })));
        assert!(matches!(commands.last(), Some(RecordedCommand::WaitIdle)));
        assert_eq!(queue.transient_command_buffer_count(), 0);
        assert_eq!(device.registries().command_buffers.len(), 0);
        assert_eq!(device.registries().command_pools.len(), 0);
    }

    #[test]
    fn test_failed_copy_still_frees_command_buffer() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let queue = device.graphics_queue(0).unwrap();
        let src = device.create_buffer(&BufferCreateInfo::staging(16)).unwrap();
        let image = device
            .create_image(&ImageCreateInfo::sampled_2d(4, 4, Format::R8G8B8A8Unorm))
            .unwrap();

        let region = BufferToImageCopyInfo {
            mip_level: 3,
            ..BufferToImageCopyInfo::default()
        };
        let result = queue.copy_buffer_to_image(
            device,
            &[region],
            src,
            image,
            SubresourceRange::ALL,
            ResourceState::Undefined,
            ResourceState::ShaderResource,
        );
        assert!(matches!(result, Err(RhiError::OutOfRange { index: 3, count: 1 })));
        assert_eq!(queue.transient_command_buffer_count(), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::CommandBuffer), 0);
    }
}
