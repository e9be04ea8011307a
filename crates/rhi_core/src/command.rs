//! Command buffers and the render-pass recording state machine
//!
//! A command buffer is one linear recording stream. At most one render pass is open on it at a
//! time, either a render pass object (`begin_render_pass`/`end_render_pass`) or dynamic rendering
//! (`begin_rendering`/`end_rendering`). Mixing the two, nesting passes, or ending a pass that was
//! never begun is reported as [`RhiError::InvalidOperation`] and leaves the state untouched.

use std::fmt;
use std::sync::Mutex;

use crate::backend::{ApiSlot, CommandBufferApi, NativeHandle};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DepthStencilViewHandle, DrawPassHandle, ImageHandle,
    RenderPassHandle, RenderTargetViewHandle,
};
use crate::foundation::sync::lock;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::pass::draw_pass::DrawPassClearFlags;
use crate::registry::Registry;
use crate::types::{DepthStencilClearValue, Rect, RenderTargetClearValue, ResourceState, SubresourceRange};

/// Description of a command buffer allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBufferCreateInfo {
    /// Pool the buffer is allocated from
    pub pool: CommandPoolHandle,
    /// Resource descriptors the buffer may bind, zero for none
    pub resource_descriptor_count: u32,
    /// Sampler descriptors the buffer may bind, zero for none
    pub sampler_descriptor_count: u32,
}

/// Arguments for beginning a render pass object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassBeginInfo {
    /// Pass to begin
    pub render_pass: RenderPassHandle,
    /// Area rendered to
    pub render_area: Rect,
    /// Clear colors, at least one per render target when the pass clears
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
}

/// Arguments for beginning dynamic rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderingInfo {
    /// Area rendered to
    pub render_area: Rect,
    /// Render-target views, in attachment order
    pub render_target_views: Vec<RenderTargetViewHandle>,
    /// Optional depth/stencil view
    pub depth_stencil_view: Option<DepthStencilViewHandle>,
    /// Clear colors for render targets whose view clears
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
}

/// Region of a buffer to buffer copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferToBufferCopyInfo {
    /// Bytes to copy
    pub size: u64,
    /// Offset into the source buffer
    pub src_offset: u64,
    /// Offset into the destination buffer
    pub dst_offset: u64,
}

/// Region of a buffer to image copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct BufferToImageCopyInfo {
    pub buffer_offset: u64,
    /// Texels per row in the buffer, zero for tightly packed
    pub buffer_row_length: u32,
    /// Rows per image in the buffer, zero for tightly packed
    pub buffer_image_height: u32,
    pub mip_level: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Render pass currently open on a command buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActivePass {
    /// No pass open
    #[default]
    Idle,
    /// A render pass object is open
    RenderPass {
        /// Pass that was begun
        render_pass: RenderPassHandle,
        /// Area being rendered
        render_area: Rect,
    },
    /// Dynamic rendering is open
    DynamicRendering {
        /// Area being rendered
        render_area: Rect,
        /// Render-target views being written
        render_targets: Vec<RenderTargetViewHandle>,
        /// Depth/stencil view being written
        depth_stencil: Option<DepthStencilViewHandle>,
    },
}

impl ActivePass {
    const fn render_area(&self) -> Option<Rect> {
        match self {
            Self::Idle => None,
            Self::RenderPass { render_area, .. } | Self::DynamicRendering { render_area, .. } => Some(*render_area),
        }
    }
}

fn violation(reason: &str) -> RhiError {
    log::error!("Command buffer: {reason}");
    RhiError::invalid_operation(reason)
}

/// Managed command buffer
pub struct CommandBuffer {
    header: ObjectHeader,
    create_info: CommandBufferCreateInfo,
    api: ApiSlot<dyn CommandBufferApi>,
    active: Mutex<ActivePass>,
}

impl CommandBuffer {
    /// Pool the buffer was allocated from
    pub const fn pool(&self) -> CommandPoolHandle {
        self.create_info.pool
    }

    /// Native handle, zero once destroyed
    pub fn native_handle(&self) -> NativeHandle {
        self.api.with(|api| api.native_handle()).unwrap_or_default()
    }

    /// True while a render pass or dynamic rendering is open
    pub fn has_active_render_pass(&self) -> bool {
        *lock(&self.active) != ActivePass::Idle
    }

    /// Render area of the open pass
    pub fn active_render_area(&self) -> Option<Rect> {
        lock(&self.active).render_area()
    }

    /// Snapshot of the open pass
    pub fn active_pass(&self) -> ActivePass {
        lock(&self.active).clone()
    }

    fn with_api<R>(&self, f: impl FnOnce(&mut (dyn CommandBufferApi + 'static)) -> R) -> RhiResult<R> {
        self.api
            .with(f)
            .ok_or_else(|| RhiError::invalid_operation("command buffer has been destroyed"))
    }

    /// Start recording
    pub fn begin(&self) -> RhiResult<()> {
        self.with_api(|api| api.begin())?
    }

    /// Finish recording; fails while a pass is still open
    pub fn end(&self) -> RhiResult<()> {
        if self.has_active_render_pass() {
            return Err(violation("cannot end recording while a render pass is active"));
        }
        self.with_api(|api| api.end())?
    }

    /// Begin a render pass object
    pub fn begin_render_pass(&self, device: &Device, begin_info: &RenderPassBeginInfo) -> RhiResult<()> {
        let mut active = lock(&self.active);
        if *active != ActivePass::Idle {
            return Err(violation("cannot nest render passes"));
        }

        let render_pass = device
            .render_pass(begin_info.render_pass)
            .ok_or_else(|| RhiError::null_argument("render pass begin info render pass"))?;
        if render_pass.has_load_op_clear()
            && begin_info.render_target_clear_values.len() < render_pass.render_target_count()
        {
            return Err(violation(&format!(
                "render pass clears {} render targets but only {} clear values were supplied",
                render_pass.render_target_count(),
                begin_info.render_target_clear_values.len()
            )));
        }

        let native = render_pass.native_handle();
        self.with_api(|api| api.begin_render_pass_impl(native, begin_info))?;
        *active = ActivePass::RenderPass {
            render_pass: begin_info.render_pass,
            render_area: begin_info.render_area,
        };
        Ok(())
    }

    /// Begin a render pass over its full area with its own clear values
    pub fn begin_render_pass_with(&self, device: &Device, render_pass: RenderPassHandle) -> RhiResult<()> {
        let pass = device
            .render_pass(render_pass)
            .ok_or_else(|| RhiError::null_argument("render pass"))?;
        let mut render_target_clear_values = pass.render_target_clear_values().to_vec();
        render_target_clear_values.resize(pass.render_target_count(), RenderTargetClearValue::default());
        let begin_info = RenderPassBeginInfo {
            render_pass,
            render_area: pass.render_area(),
            render_target_clear_values,
            depth_stencil_clear_value: pass.depth_stencil_clear_value(),
        };
        self.begin_render_pass(device, &begin_info)
    }

    /// Begin the pass a draw pass cached for `clear_flags`
    pub fn begin_draw_pass(
        &self,
        device: &Device,
        draw_pass: DrawPassHandle,
        clear_flags: DrawPassClearFlags,
    ) -> RhiResult<()> {
        let pass = device
            .draw_pass(draw_pass)
            .ok_or_else(|| RhiError::null_argument("draw pass"))?;
        let begin_info = pass.prepare_render_pass_begin_info(clear_flags)?;
        self.begin_render_pass(device, &begin_info)
    }

    /// End the open render pass object
    pub fn end_render_pass(&self) -> RhiResult<()> {
        let mut active = lock(&self.active);
        match *active {
            ActivePass::Idle => Err(violation("no render pass is active")),
            ActivePass::DynamicRendering { .. } => {
                Err(violation("dynamic rendering is active, it must be ended with end_rendering"))
            }
            ActivePass::RenderPass { .. } => {
                self.with_api(|api| api.end_render_pass_impl())?;
                *active = ActivePass::Idle;
                Ok(())
            }
        }
    }

    /// Begin dynamic rendering into the given views
    pub fn begin_rendering(&self, device: &Device, info: &RenderingInfo) -> RhiResult<()> {
        let mut active = lock(&self.active);
        if *active != ActivePass::Idle {
            return Err(violation("cannot nest render passes"));
        }

        let render_targets = info
            .render_target_views
            .iter()
            .enumerate()
            .map(|(index, &view)| {
                device
                    .render_target_view(view)
                    .map(|view| view.native_handle())
                    .ok_or_else(|| RhiError::null_argument(format!("rendering info render target view {index}")))
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let depth_stencil = info
            .depth_stencil_view
            .map(|view| {
                device
                    .depth_stencil_view(view)
                    .map(|view| view.native_handle())
                    .ok_or_else(|| RhiError::null_argument("rendering info depth stencil view"))
            })
            .transpose()?;

        self.with_api(|api| api.begin_rendering_impl(info, &render_targets, depth_stencil))?;
        *active = ActivePass::DynamicRendering {
            render_area: info.render_area,
            render_targets: info.render_target_views.clone(),
            depth_stencil: info.depth_stencil_view,
        };
        Ok(())
    }

    /// End dynamic rendering
    pub fn end_rendering(&self) -> RhiResult<()> {
        let mut active = lock(&self.active);
        match *active {
            ActivePass::Idle => Err(violation("no dynamic rendering is active")),
            ActivePass::RenderPass { .. } => {
                Err(violation("a render pass is active, it must be ended with end_render_pass"))
            }
            ActivePass::DynamicRendering { .. } => {
                self.with_api(|api| api.end_rendering_impl())?;
                *active = ActivePass::Idle;
                Ok(())
            }
        }
    }

    /// Transition a subresource range of an image; equal states record nothing
    pub fn transition_image_layout(
        &self,
        device: &Device,
        image: ImageHandle,
        range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
    ) -> RhiResult<()> {
        if before == after {
            return Ok(());
        }
        let native = device
            .image(image)
            .map(|image| image.native_handle())
            .ok_or_else(|| RhiError::null_argument("transition image"))?;
        self.with_api(|api| api.transition_image_layout(native, range, before, after))
    }

    /// Transition every attachment image of a render pass
    pub fn transition_render_pass(
        &self,
        device: &Device,
        render_pass: RenderPassHandle,
        render_target_before: ResourceState,
        render_target_after: ResourceState,
        depth_stencil_before: ResourceState,
        depth_stencil_after: ResourceState,
    ) -> RhiResult<()> {
        let pass = device
            .render_pass(render_pass)
            .ok_or_else(|| RhiError::null_argument("render pass"))?;
        for index in 0..pass.render_target_count() {
            let image = pass.render_target_image(index)?;
            self.transition_image_layout(
                device,
                image,
                SubresourceRange::ALL,
                render_target_before,
                render_target_after,
            )?;
        }
        if pass.has_depth_stencil() {
            let image = pass.depth_stencil_image()?;
            self.transition_image_layout(
                device,
                image,
                SubresourceRange::ALL,
                depth_stencil_before,
                depth_stencil_after,
            )?;
        }
        Ok(())
    }

    /// Transition a buffer; equal states record nothing
    pub fn buffer_resource_barrier(
        &self,
        device: &Device,
        buffer: BufferHandle,
        before: ResourceState,
        after: ResourceState,
    ) -> RhiResult<()> {
        if before == after {
            return Ok(());
        }
        let native = device
            .buffer(buffer)
            .map(|buffer| buffer.native_handle())
            .ok_or_else(|| RhiError::null_argument("barrier buffer"))?;
        self.with_api(|api| api.buffer_resource_barrier(native, before, after))
    }

    /// Copy a region between buffers; the region must fit both
    pub fn copy_buffer_to_buffer(
        &self,
        device: &Device,
        info: &BufferToBufferCopyInfo,
        src: BufferHandle,
        dst: BufferHandle,
    ) -> RhiResult<()> {
        let src = device.buffer(src).ok_or_else(|| RhiError::null_argument("copy source buffer"))?;
        let dst = device
            .buffer(dst)
            .ok_or_else(|| RhiError::null_argument("copy destination buffer"))?;
        let fits = |offset: u64, size: u64| offset.checked_add(info.size).is_some_and(|end| end <= size);
        if !fits(info.src_offset, src.size()) || !fits(info.dst_offset, dst.size()) {
            return Err(RhiError::invalid_operation(format!(
                "copy of {} bytes does not fit source ({} bytes) or destination ({} bytes)",
                info.size,
                src.size(),
                dst.size()
            )));
        }
        let (src, dst) = (src.native_handle(), dst.native_handle());
        self.with_api(|api| api.copy_buffer_to_buffer(info, src, dst))
    }

    /// Copy buffer contents into an image region
    pub fn copy_buffer_to_image(
        &self,
        device: &Device,
        info: &BufferToImageCopyInfo,
        src: BufferHandle,
        dst: ImageHandle,
    ) -> RhiResult<()> {
        let src = device
            .buffer(src)
            .map(|buffer| buffer.native_handle())
            .ok_or_else(|| RhiError::null_argument("copy source buffer"))?;
        let image = device
            .image(dst)
            .ok_or_else(|| RhiError::null_argument("copy destination image"))?;
        if info.mip_level >= image.mip_level_count() {
            return Err(RhiError::OutOfRange {
                index: info.mip_level as usize,
                count: image.mip_level_count() as usize,
            });
        }
        let dst = image.native_handle();
        self.with_api(|api| api.copy_buffer_to_image(info, src, dst))
    }
}

impl DeviceObject for CommandBuffer {
    type CreateInfo = CommandBufferCreateInfo;
    type Handle = CommandBufferHandle;
    const KIND: ObjectKind = ObjectKind::CommandBuffer;

    fn allocate(device: &Device) -> RhiResult<Self> {
        let api = device.backend().allocate_command_buffer()?;
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: CommandBufferCreateInfo::default(),
            api: ApiSlot::new(api),
            active: Mutex::new(ActivePass::Idle),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &CommandBufferCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: CommandBufferCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &CommandBufferCreateInfo) -> RhiResult<()> {
        let pool = device
            .command_pool(info.pool)
            .ok_or_else(|| RhiError::null_argument("command buffer pool"))?;
        let pool = pool.native_handle();
        self.with_api(|api| api.create_api_objects(info, pool))?
    }

    fn destroy_api_objects(&self, _device: &Device) {
        if let Some(mut api) = self.api.take() {
            api.destroy_api_objects();
        }
    }

    fn registry(device: &Device) -> &Registry<CommandBufferHandle, Self> {
        &device.registries().command_buffers
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("header", &self.header)
            .field("pool", &self.create_info.pool)
            .field("active", &self.active_pass())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::RecordedCommand;
    use crate::format::Format;
    use crate::pass::draw_pass::DrawPassCreateInfo2;
    use crate::pass::render_pass::RenderPassCreateInfo2;
    use crate::resources::buffer::BufferCreateInfo;
    use crate::resources::command_pool::CommandPoolCreateInfo;
    use crate::resources::image::{ImageCreateInfo, RenderTargetViewCreateInfo};
    use crate::testing::Fixture;
    use crate::types::{AttachmentLoadOp, BufferUsageFlags};

    fn command_buffer(device: &Device) -> std::sync::Arc<CommandBuffer> {
        let pool = device.create_command_pool(&CommandPoolCreateInfo::default()).unwrap();
        let handle = device
            .allocate_command_buffer(&CommandBufferCreateInfo {
                pool,
                ..CommandBufferCreateInfo::default()
            })
            .unwrap();
        device.command_buffer(handle).unwrap()
    }

    fn clearing_pass(device: &Device) -> RenderPassHandle {
        let mut info = RenderPassCreateInfo2 {
            width: 64,
            height: 64,
            render_target_formats: vec![Format::R8G8B8A8Unorm, Format::R8G8B8A8Unorm],
            ..RenderPassCreateInfo2::default()
        };
        info.set_all_render_target_load_op(AttachmentLoadOp::Clear);
        device.create_render_pass2(&info).unwrap()
    }

    #[test]
    fn test_render_pass_begin_end() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let cmd = command_buffer(device);
        let pass = clearing_pass(device);

        cmd.begin().unwrap();
        cmd.begin_render_pass_with(device, pass).unwrap();
        assert!(cmd.has_active_render_pass());
        assert_eq!(cmd.active_render_area(), Some(Rect::from_extent(64, 64)));
        cmd.end_render_pass().unwrap();
        cmd.end().unwrap();
        assert!(!cmd.has_active_render_pass());

        let commands = fixture.backend.commands();
        assert!(commands.contains(&RecordedCommand::EndRenderPass));
        assert!(commands
            .iter()
            .any(|command| matches!(command, RecordedCommand::BeginRenderPass { clear_value_count: 2, .. })));
    }

    #[test]
    fn test_nested_render_pass_rejected() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let cmd = command_buffer(device);
        let pass = clearing_pass(device);

        cmd.begin_render_pass_with(device, pass).unwrap();
        let err = cmd.begin_render_pass_with(device, pass).unwrap_err();
        assert!(matches!(err, RhiError::InvalidOperation { .. }));
        assert!(matches!(
            cmd.begin_rendering(device, &RenderingInfo::default()),
            Err(RhiError::InvalidOperation { .. })
        ));
        assert!(matches!(cmd.end_rendering(), Err(RhiError::InvalidOperation { .. })));
        cmd.end_render_pass().unwrap();
    }

    #[test]
    fn test_end_without_begin_rejected() {
        let fixture = Fixture::new();
        let cmd = command_buffer(&fixture.device);
        assert!(matches!(cmd.end_render_pass(), Err(RhiError::InvalidOperation { .. })));
        assert!(matches!(cmd.end_rendering(), Err(RhiError::InvalidOperation { .. })));
    }

    #[test]
    fn test_clear_count_checked() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let cmd = command_buffer(device);
        let pass = clearing_pass(device);

        let begin_info = RenderPassBeginInfo {
            render_pass: pass,
            render_area: Rect::from_extent(64, 64),
            render_target_clear_values: vec![RenderTargetClearValue::default()],
            ..RenderPassBeginInfo::default()
        };
        assert!(matches!(
            cmd.begin_render_pass(device, &begin_info),
            Err(RhiError::InvalidOperation { .. })
        ));
        assert!(!cmd.has_active_render_pass());
    }

    #[test]
    fn test_dynamic_rendering_tracks_targets() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let cmd = command_buffer(device);
        let image_handle = device
            .create_image(&ImageCreateInfo::render_target_2d(32, 32, Format::B8G8R8A8Unorm))
            .unwrap();
        let image = device.image(image_handle).unwrap();
        let view = device
            .create_render_target_view(&RenderTargetViewCreateInfo::guess_from_image(image_handle, &image))
            .unwrap();

        let info = RenderingInfo {
            render_area: Rect::from_extent(32, 32),
            render_target_views: vec![view],
            ..RenderingInfo::default()
        };
        cmd.begin_rendering(device, &info).unwrap();
        assert_eq!(
            cmd.active_pass(),
            ActivePass::DynamicRendering {
                render_area: Rect::from_extent(32, 32),
                render_targets: vec![view],
                depth_stencil: None,
            }
        );
        assert!(matches!(cmd.end_render_pass(), Err(RhiError::InvalidOperation { .. })));
        assert!(matches!(cmd.end(), Err(RhiError::InvalidOperation { .. })));
        cmd.end_rendering().unwrap();
        assert!(!cmd.has_active_render_pass());
    }

    #[test]
    fn test_begin_draw_pass_uses_cached_pass() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let cmd = command_buffer(device);
        let image = device
            .create_image(&ImageCreateInfo::render_target_2d(16, 16, Format::R8G8B8A8Unorm))
            .unwrap();
        let draw_pass = device
            .create_draw_pass2(&DrawPassCreateInfo2 {
                width: 16,
                height: 16,
                render_target_images: vec![image],
                ..DrawPassCreateInfo2::default()
            })
            .unwrap();

        cmd.begin_draw_pass(device, draw_pass, DrawPassClearFlags::CLEAR_RENDER_TARGETS)
            .unwrap();
        cmd.end_render_pass().unwrap();
        assert!(cmd
            .begin_draw_pass(device, draw_pass, DrawPassClearFlags::CLEAR_DEPTH)
            .is_err());
        assert!(!cmd.has_active_render_pass());
    }

    #[test]
    fn test_copy_range_checked() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let cmd = command_buffer(device);
        let src = device.create_buffer(&BufferCreateInfo::staging(64)).unwrap();
        let dst = device
            .create_buffer(&BufferCreateInfo::new(32, BufferUsageFlags::TRANSFER_DST))
            .unwrap();

        let info = BufferToBufferCopyInfo {
            size: 32,
            ..BufferToBufferCopyInfo::default()
        };
        cmd.copy_buffer_to_buffer(device, &info, src, dst).unwrap();
        let too_big = BufferToBufferCopyInfo { size: 48, ..info };
        assert!(cmd.copy_buffer_to_buffer(device, &too_big, src, dst).is_err());
    }
}
