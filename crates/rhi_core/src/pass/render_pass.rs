//! Render passes
//!
//! A render pass can be described three ways, all converging on one build path:
//!
//! - [`RenderPassCreateInfo`] adopts existing render-target and depth/stencil views
//! - [`RenderPassCreateInfo2`] describes attachments by format; the pass creates the images
//!   and views
//! - [`RenderPassCreateInfo3`] adopts existing images; the pass derives views over them
//!
//! Each shape converts into a [`VersionedRenderPassCreateInfo`] whose [`AttachmentSource`]
//! carries the shape-specific payload. Images and views a pass creates are destroyed with it
//! unless their ownership is Reference.

use crate::backend::{ApiObject, ApiObjectDesc, ApiSlot, NativeHandle};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{DepthStencilViewHandle, ImageHandle, RenderPassHandle, RenderTargetViewHandle};
use crate::format::Format;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::image::{
    DepthStencilView, DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetView,
    RenderTargetViewCreateInfo,
};
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, DepthStencilClearValue, ImageType, ImageUsageFlags, ImageViewType,
    MemoryUsage, Rect, RenderTargetClearValue, ResourceState, SampleCount, Viewport, MAX_RENDER_TARGETS,
};

/// Resolved attachment description handed to the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPassLayout {
    /// One format per render target
    pub render_target_formats: Vec<Format>,
    /// One load op per render target
    pub render_target_load_ops: Vec<AttachmentLoadOp>,
    /// One store op per render target
    pub render_target_store_ops: Vec<AttachmentStoreOp>,
    /// Depth/stencil format, undefined when there is no depth/stencil target
    pub depth_stencil_format: Format,
    /// Depth aspect load op
    pub depth_load_op: AttachmentLoadOp,
    /// Depth aspect store op
    pub depth_store_op: AttachmentStoreOp,
    /// Stencil aspect load op
    pub stencil_load_op: AttachmentLoadOp,
    /// Stencil aspect store op
    pub stencil_store_op: AttachmentStoreOp,
    /// State the depth/stencil target is in during the pass
    pub depth_stencil_state: ResourceState,
    /// Samples per pixel of every attachment
    pub sample_count: SampleCount,
}

impl RenderPassLayout {
    /// True if a depth/stencil attachment is present
    pub const fn has_depth_stencil(&self) -> bool {
        !self.depth_stencil_format.is_undefined()
    }

    /// True if any attachment clears on load
    pub fn has_load_op_clear(&self) -> bool {
        self.render_target_load_ops.contains(&AttachmentLoadOp::Clear)
            || (self.has_depth_stencil()
                && (self.depth_load_op == AttachmentLoadOp::Clear || self.stencil_load_op == AttachmentLoadOp::Clear))
    }
}

fn entry_or_default<T: Copy + Default>(values: &[T], index: usize) -> T {
    values.get(index).copied().unwrap_or_default()
}

fn fill<T: Copy>(values: &mut Vec<T>, count: usize, value: T) {
    values.clear();
    values.resize(count, value);
}

/// Render pass over existing views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassCreateInfo {
    /// Render area width
    pub width: u32,
    /// Render area height
    pub height: u32,
    /// Render-target views, in attachment order
    pub render_target_views: Vec<RenderTargetViewHandle>,
    /// Optional depth/stencil view
    pub depth_stencil_view: Option<DepthStencilViewHandle>,
    /// State the depth/stencil target is in during the pass
    pub depth_stencil_state: ResourceState,
    /// Clear colors, one per render target
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
    /// Ownership the created pass takes
    pub ownership: Ownership,
}

impl RenderPassCreateInfo {
    /// Use `value` for every render target
    pub fn set_all_render_target_clear_value(&mut self, value: RenderTargetClearValue) {
        fill(&mut self.render_target_clear_values, self.render_target_views.len(), value);
    }
}

/// Render pass that creates its images and views from formats
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassCreateInfo2 {
    /// Attachment width
    pub width: u32,
    /// Attachment height
    pub height: u32,
    /// Array layers of every attachment image
    pub array_layer_count: u32,
    /// Samples per pixel
    pub sample_count: SampleCount,
    /// Render-target formats, in attachment order
    pub render_target_formats: Vec<Format>,
    /// Depth/stencil format, undefined for none
    pub depth_stencil_format: Format,
    /// Extra usage per render-target image
    pub render_target_usage_flags: Vec<ImageUsageFlags>,
    /// Extra usage for the depth/stencil image
    pub depth_stencil_usage_flags: ImageUsageFlags,
    /// Initial state per render target, `Undefined` for RenderTarget
    pub render_target_initial_states: Vec<ResourceState>,
    /// Initial depth/stencil state, `Undefined` for DepthStencilWrite
    pub depth_stencil_initial_state: ResourceState,
    /// Clear colors, one per render target
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
    /// Load op per render target
    pub render_target_load_ops: Vec<AttachmentLoadOp>,
    /// Store op per render target
    pub render_target_store_ops: Vec<AttachmentStoreOp>,
    /// Depth aspect load op
    pub depth_load_op: AttachmentLoadOp,
    /// Depth aspect store op
    pub depth_store_op: AttachmentStoreOp,
    /// Stencil aspect load op
    pub stencil_load_op: AttachmentLoadOp,
    /// Stencil aspect store op
    pub stencil_store_op: AttachmentStoreOp,
    /// Ownership of the pass and everything it creates
    pub ownership: Ownership,
}

impl Default for RenderPassCreateInfo2 {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            array_layer_count: 1,
            sample_count: SampleCount::Count1,
            render_target_formats: Vec::new(),
            depth_stencil_format: Format::Undefined,
            render_target_usage_flags: Vec::new(),
            depth_stencil_usage_flags: ImageUsageFlags::empty(),
            render_target_initial_states: Vec::new(),
            depth_stencil_initial_state: ResourceState::Undefined,
            render_target_clear_values: Vec::new(),
            depth_stencil_clear_value: DepthStencilClearValue::default(),
            render_target_load_ops: Vec::new(),
            render_target_store_ops: Vec::new(),
            depth_load_op: AttachmentLoadOp::Load,
            depth_store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Load,
            stencil_store_op: AttachmentStoreOp::Store,
            ownership: Ownership::Reference,
        }
    }
}

impl RenderPassCreateInfo2 {
    /// Use `flags` as extra usage for every render target
    pub fn set_all_render_target_usage_flags(&mut self, flags: ImageUsageFlags) {
        fill(&mut self.render_target_usage_flags, self.render_target_formats.len(), flags);
    }

    /// Use `value` for every render target
    pub fn set_all_render_target_clear_value(&mut self, value: RenderTargetClearValue) {
        fill(&mut self.render_target_clear_values, self.render_target_formats.len(), value);
    }

    /// Use `op` for every render target
    pub fn set_all_render_target_load_op(&mut self, op: AttachmentLoadOp) {
        fill(&mut self.render_target_load_ops, self.render_target_formats.len(), op);
    }

    /// Use `op` for every render target
    pub fn set_all_render_target_store_op(&mut self, op: AttachmentStoreOp) {
        fill(&mut self.render_target_store_ops, self.render_target_formats.len(), op);
    }

    /// Clear every render target on load
    pub fn set_all_render_target_to_clear(&mut self) {
        self.set_all_render_target_load_op(AttachmentLoadOp::Clear);
    }
}

/// Render pass over existing images
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassCreateInfo3 {
    /// Render area width
    pub width: u32,
    /// Render area height
    pub height: u32,
    /// Render-target images, in attachment order
    pub render_target_images: Vec<ImageHandle>,
    /// Optional depth/stencil image
    pub depth_stencil_image: Option<ImageHandle>,
    /// State the depth/stencil target is in during the pass
    pub depth_stencil_state: ResourceState,
    /// Clear colors, one per render target
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
    /// Load op per render target
    pub render_target_load_ops: Vec<AttachmentLoadOp>,
    /// Store op per render target
    pub render_target_store_ops: Vec<AttachmentStoreOp>,
    /// Depth aspect load op
    pub depth_load_op: AttachmentLoadOp,
    /// Depth aspect store op
    pub depth_store_op: AttachmentStoreOp,
    /// Stencil aspect load op
    pub stencil_load_op: AttachmentLoadOp,
    /// Stencil aspect store op
    pub stencil_store_op: AttachmentStoreOp,
    /// Ownership of the pass and the views it creates
    pub ownership: Ownership,
}

impl RenderPassCreateInfo3 {
    /// Use `value` for every render target
    pub fn set_all_render_target_clear_value(&mut self, value: RenderTargetClearValue) {
        fill(&mut self.render_target_clear_values, self.render_target_images.len(), value);
    }

    /// Use `op` for every render target
    pub fn set_all_render_target_load_op(&mut self, op: AttachmentLoadOp) {
        fill(&mut self.render_target_load_ops, self.render_target_images.len(), op);
    }

    /// Use `op` for every render target
    pub fn set_all_render_target_store_op(&mut self, op: AttachmentStoreOp) {
        fill(&mut self.render_target_store_ops, self.render_target_images.len(), op);
    }

    /// Clear every render target on load
    pub fn set_all_render_target_to_clear(&mut self) {
        self.set_all_render_target_load_op(AttachmentLoadOp::Clear);
    }
}

/// Shape-specific part of a render pass description
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AttachmentSource {
    /// Existing views are adopted as-is
    Views {
        render_target_views: Vec<RenderTargetViewHandle>,
        depth_stencil_view: Option<DepthStencilViewHandle>,
    },
    /// Images and views are created from formats
    Formats {
        render_target_formats: Vec<Format>,
        depth_stencil_format: Format,
        sample_count: SampleCount,
        render_target_usage_flags: Vec<ImageUsageFlags>,
        depth_stencil_usage_flags: ImageUsageFlags,
        render_target_initial_states: Vec<ResourceState>,
        depth_stencil_initial_state: ResourceState,
    },
    /// Existing images are adopted and views are derived over them
    Images {
        render_target_images: Vec<ImageHandle>,
        depth_stencil_image: Option<ImageHandle>,
    },
}

impl AttachmentSource {
    /// Version number of the public description this came from
    pub const fn version(&self) -> u32 {
        match self {
            Self::Views { .. } => 1,
            Self::Formats { .. } => 2,
            Self::Images { .. } => 3,
        }
    }

    /// Number of render targets
    pub fn render_target_count(&self) -> usize {
        match self {
            Self::Views { render_target_views, .. } => render_target_views.len(),
            Self::Formats { render_target_formats, .. } => render_target_formats.len(),
            Self::Images { render_target_images, .. } => render_target_images.len(),
        }
    }
}

/// Normalized render pass description stored with the pass
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct VersionedRenderPassCreateInfo {
    pub width: u32,
    pub height: u32,
    pub array_layer_count: u32,
    pub depth_stencil_state: ResourceState,
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    pub depth_stencil_clear_value: DepthStencilClearValue,
    pub render_target_load_ops: Vec<AttachmentLoadOp>,
    pub render_target_store_ops: Vec<AttachmentStoreOp>,
    pub depth_load_op: AttachmentLoadOp,
    pub depth_store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub ownership: Ownership,
    pub source: AttachmentSource,
}

impl VersionedRenderPassCreateInfo {
    /// Version number of the public description this came from
    pub const fn version(&self) -> u32 {
        self.source.version()
    }

    /// Number of render targets
    pub fn render_target_count(&self) -> usize {
        self.source.render_target_count()
    }
}

impl Default for VersionedRenderPassCreateInfo {
    fn default() -> Self {
        RenderPassCreateInfo::default().into()
    }
}

impl From<RenderPassCreateInfo> for VersionedRenderPassCreateInfo {
    fn from(info: RenderPassCreateInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            array_layer_count: 1,
            depth_stencil_state: info.depth_stencil_state,
            render_target_clear_values: info.render_target_clear_values,
            depth_stencil_clear_value: info.depth_stencil_clear_value,
            render_target_load_ops: Vec::new(),
            render_target_store_ops: Vec::new(),
            depth_load_op: AttachmentLoadOp::Load,
            depth_store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Load,
            stencil_store_op: AttachmentStoreOp::Store,
            ownership: info.ownership,
            source: AttachmentSource::Views {
                render_target_views: info.render_target_views,
                depth_stencil_view: info.depth_stencil_view,
            },
        }
    }
}

impl From<RenderPassCreateInfo2> for VersionedRenderPassCreateInfo {
    fn from(info: RenderPassCreateInfo2) -> Self {
        let depth_stencil_state = match info.depth_stencil_initial_state {
            ResourceState::Undefined => ResourceState::DepthStencilWrite,
            state => state,
        };
        Self {
            width: info.width,
            height: info.height,
            array_layer_count: info.array_layer_count,
            depth_stencil_state,
            render_target_clear_values: info.render_target_clear_values,
            depth_stencil_clear_value: info.depth_stencil_clear_value,
            render_target_load_ops: info.render_target_load_ops,
            render_target_store_ops: info.render_target_store_ops,
            depth_load_op: info.depth_load_op,
            depth_store_op: info.depth_store_op,
            stencil_load_op: info.stencil_load_op,
            stencil_store_op: info.stencil_store_op,
            ownership: info.ownership,
            source: AttachmentSource::Formats {
                render_target_formats: info.render_target_formats,
                depth_stencil_format: info.depth_stencil_format,
                sample_count: info.sample_count,
                render_target_usage_flags: info.render_target_usage_flags,
                depth_stencil_usage_flags: info.depth_stencil_usage_flags,
                render_target_initial_states: info.render_target_initial_states,
                depth_stencil_initial_state: depth_stencil_state,
            },
        }
    }
}

impl From<RenderPassCreateInfo3> for VersionedRenderPassCreateInfo {
    fn from(info: RenderPassCreateInfo3) -> Self {
        Self {
            width: info.width,
            height: info.height,
            array_layer_count: 1,
            depth_stencil_state: info.depth_stencil_state,
            render_target_clear_values: info.render_target_clear_values,
            depth_stencil_clear_value: info.depth_stencil_clear_value,
            render_target_load_ops: info.render_target_load_ops,
            render_target_store_ops: info.render_target_store_ops,
            depth_load_op: info.depth_load_op,
            depth_store_op: info.depth_store_op,
            stencil_load_op: info.stencil_load_op,
            stencil_store_op: info.stencil_store_op,
            ownership: info.ownership,
            source: AttachmentSource::Images {
                render_target_images: info.render_target_images,
                depth_stencil_image: info.depth_stencil_image,
            },
        }
    }
}

/// Managed render pass
pub struct RenderPass {
    header: ObjectHeader,
    create_info: VersionedRenderPassCreateInfo,
    api: ApiSlot<dyn ApiObject>,
    render_area: Rect,
    viewport: Viewport,
    render_target_views: Vec<RenderTargetViewHandle>,
    render_target_images: Vec<ImageHandle>,
    depth_stencil_view: Option<DepthStencilViewHandle>,
    depth_stencil_image: Option<ImageHandle>,
    layout: RenderPassLayout,
}

impl RenderPass {
    /// Render area anchored at the origin
    pub const fn render_area(&self) -> Rect {
        self.render_area
    }

    /// Viewport covering the render area
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Scissor covering the render area
    pub const fn scissor(&self) -> Rect {
        self.render_area
    }

    /// Number of render targets
    pub fn render_target_count(&self) -> usize {
        self.render_target_views.len()
    }

    /// True if a depth/stencil target is attached
    pub const fn has_depth_stencil(&self) -> bool {
        self.depth_stencil_view.is_some()
    }

    /// True if any attachment clears on load
    pub fn has_load_op_clear(&self) -> bool {
        self.layout.has_load_op_clear()
    }

    /// Attachment layout the backend pass was built from
    pub const fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }

    /// Clear colors the pass was described with
    pub fn render_target_clear_values(&self) -> &[RenderTargetClearValue] {
        &self.create_info.render_target_clear_values
    }

    /// Depth/stencil clear value the pass was described with
    pub const fn depth_stencil_clear_value(&self) -> DepthStencilClearValue {
        self.create_info.depth_stencil_clear_value
    }

    /// Native handle, zero once destroyed
    pub fn native_handle(&self) -> NativeHandle {
        self.api.native_handle()
    }

    /// Render-target view at `index`
    pub fn render_target_view(&self, index: usize) -> RhiResult<RenderTargetViewHandle> {
        self.render_target_views
            .get(index)
            .copied()
            .ok_or(RhiError::OutOfRange {
                index,
                count: self.render_target_views.len(),
            })
    }

    /// Render-target image at `index`
    pub fn render_target_image(&self, index: usize) -> RhiResult<ImageHandle> {
        self.render_target_images
            .get(index)
            .copied()
            .ok_or(RhiError::OutOfRange {
                index,
                count: self.render_target_images.len(),
            })
    }

    /// Depth/stencil view
    pub fn depth_stencil_view(&self) -> RhiResult<DepthStencilViewHandle> {
        self.depth_stencil_view
            .ok_or_else(|| RhiError::not_found("render pass depth stencil view"))
    }

    /// Depth/stencil image
    pub fn depth_stencil_image(&self) -> RhiResult<ImageHandle> {
        self.depth_stencil_image
            .ok_or_else(|| RhiError::not_found("render pass depth stencil image"))
    }

    /// Attachment index of `image`, if it is one of the render targets
    pub fn render_target_image_index(&self, image: ImageHandle) -> Option<usize> {
        self.render_target_images.iter().position(|&candidate| candidate == image)
    }

    /// Hand the render-target view at `index` back to the caller
    ///
    /// The view becomes Reference-owned, so destroying the pass leaves it alive.
    pub fn disown_render_target_view(&self, device: &Device, index: usize) -> RhiResult<RenderTargetViewHandle> {
        let handle = self.render_target_view(index)?;
        disown(device.object::<RenderTargetView>(handle).as_deref())?;
        Ok(handle)
    }

    /// Hand the render-target image at `index` back to the caller
    pub fn disown_render_target_image(&self, device: &Device, index: usize) -> RhiResult<ImageHandle> {
        let handle = self.render_target_image(index)?;
        disown(device.object::<Image>(handle).as_deref())?;
        Ok(handle)
    }

    /// Hand the depth/stencil view back to the caller
    pub fn disown_depth_stencil_view(&self, device: &Device) -> RhiResult<DepthStencilViewHandle> {
        let handle = self.depth_stencil_view()?;
        disown(device.object::<DepthStencilView>(handle).as_deref())?;
        Ok(handle)
    }

    /// Hand the depth/stencil image back to the caller
    pub fn disown_depth_stencil_image(&self, device: &Device) -> RhiResult<ImageHandle> {
        let handle = self.depth_stencil_image()?;
        disown(device.object::<Image>(handle).as_deref())?;
        Ok(handle)
    }

    fn adopt_views(
        &mut self,
        device: &Device,
        render_target_views: &[RenderTargetViewHandle],
        depth_stencil_view: Option<DepthStencilViewHandle>,
    ) -> RhiResult<()> {
        for (index, &handle) in render_target_views.iter().enumerate() {
            let view = device
                .render_target_view(handle)
                .ok_or_else(|| RhiError::null_argument(format!("render target view {index}")))?;
            let image = device
                .image(view.image())
                .ok_or_else(|| RhiError::null_argument(format!("render target image {index}")))?;

            self.render_target_views.push(handle);
            self.render_target_images.push(view.image());
            self.layout.render_target_formats.push(view.format());
            self.layout.render_target_load_ops.push(view.load_op());
            self.layout.render_target_store_ops.push(view.store_op());
            self.layout.sample_count = image.sample_count();
        }

        if let Some(handle) = depth_stencil_view {
            let view = device
                .depth_stencil_view(handle)
                .ok_or_else(|| RhiError::null_argument("depth stencil view"))?;
            let image = device
                .image(view.image())
                .ok_or_else(|| RhiError::null_argument("depth stencil image"))?;

            self.depth_stencil_view = Some(handle);
            self.depth_stencil_image = Some(view.image());
            self.layout.depth_stencil_format = view.format();
            (self.layout.depth_load_op, self.layout.stencil_load_op) = view.load_ops();
            (self.layout.depth_store_op, self.layout.stencil_store_op) = view.store_ops();
            self.layout.sample_count = image.sample_count();
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_images_and_views(
        &mut self,
        device: &Device,
        info: &VersionedRenderPassCreateInfo,
        render_target_formats: &[Format],
        depth_stencil_format: Format,
        sample_count: SampleCount,
        render_target_usage_flags: &[ImageUsageFlags],
        depth_stencil_usage_flags: ImageUsageFlags,
        render_target_initial_states: &[ResourceState],
    ) -> RhiResult<()> {
        let view_type = if info.array_layer_count > 1 {
            ImageViewType::Type2DArray
        } else {
            ImageViewType::Type2D
        };

        for (index, &format) in render_target_formats.iter().enumerate() {
            let initial_state = match entry_or_default(render_target_initial_states, index) {
                ResourceState::Undefined => ResourceState::RenderTarget,
                state => state,
            };
            let image = device.create_object::<Image>(&ImageCreateInfo {
                image_type: ImageType::Type2D,
                width: info.width,
                height: info.height,
                depth: 1,
                format,
                sample_count,
                mip_level_count: 1,
                array_layer_count: info.array_layer_count,
                usage: entry_or_default(render_target_usage_flags, index) | ImageUsageFlags::COLOR_ATTACHMENT,
                memory_usage: MemoryUsage::GpuOnly,
                initial_state,
                rtv_clear_value: entry_or_default(&info.render_target_clear_values, index),
                ownership: Ownership::Exclusive,
                ..ImageCreateInfo::default()
            })?;
            self.render_target_images.push(image);
        }

        if !depth_stencil_format.is_undefined() {
            let image = device.create_object::<Image>(&ImageCreateInfo {
                image_type: ImageType::Type2D,
                width: info.width,
                height: info.height,
                depth: 1,
                format: depth_stencil_format,
                sample_count,
                mip_level_count: 1,
                array_layer_count: info.array_layer_count,
                usage: depth_stencil_usage_flags | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                memory_usage: MemoryUsage::GpuOnly,
                initial_state: info.depth_stencil_state,
                dsv_clear_value: info.depth_stencil_clear_value,
                ownership: Ownership::Exclusive,
                ..ImageCreateInfo::default()
            })?;
            self.depth_stencil_image = Some(image);
        }

        for index in 0..render_target_formats.len() {
            let view = RenderTargetViewCreateInfo {
                image: self.render_target_images[index],
                view_type,
                format: render_target_formats[index],
                mip_level: 0,
                mip_level_count: 1,
                array_layer: 0,
                array_layer_count: info.array_layer_count,
                load_op: entry_or_default(&info.render_target_load_ops, index),
                store_op: entry_or_default(&info.render_target_store_ops, index),
                ownership: Ownership::Exclusive,
            };
            self.render_target_views.push(device.create_object::<RenderTargetView>(&view)?);
        }

        if let Some(image) = self.depth_stencil_image {
            let view = DepthStencilViewCreateInfo {
                image,
                view_type,
                format: depth_stencil_format,
                mip_level: 0,
                mip_level_count: 1,
                array_layer: 0,
                array_layer_count: info.array_layer_count,
                depth_load_op: info.depth_load_op,
                depth_store_op: info.depth_store_op,
                stencil_load_op: info.stencil_load_op,
                stencil_store_op: info.stencil_store_op,
                ownership: Ownership::Exclusive,
            };
            self.depth_stencil_view = Some(device.create_object::<DepthStencilView>(&view)?);
        }

        self.layout.render_target_formats = render_target_formats.to_vec();
        self.layout.depth_stencil_format = depth_stencil_format;
        self.layout.sample_count = sample_count;
        self.copy_ops(info);
        Ok(())
    }

    fn derive_views(
        &mut self,
        device: &Device,
        info: &VersionedRenderPassCreateInfo,
        render_target_images: &[ImageHandle],
        depth_stencil_image: Option<ImageHandle>,
    ) -> RhiResult<()> {
        for (index, &handle) in render_target_images.iter().enumerate() {
            let image = device
                .image(handle)
                .ok_or_else(|| RhiError::null_argument(format!("render target image {index}")))?;
            self.render_target_images.push(handle);

            let view = RenderTargetViewCreateInfo {
                mip_level_count: image.mip_level_count(),
                array_layer_count: image.array_layer_count(),
                load_op: entry_or_default(&info.render_target_load_ops, index),
                store_op: entry_or_default(&info.render_target_store_ops, index),
                ownership: Ownership::Exclusive,
                ..RenderTargetViewCreateInfo::guess_from_image(handle, &image)
            };
            self.render_target_views.push(device.create_object::<RenderTargetView>(&view)?);
            self.layout.render_target_formats.push(image.format());
            self.layout.sample_count = image.sample_count();
        }

        if let Some(handle) = depth_stencil_image {
            let image = device
                .image(handle)
                .ok_or_else(|| RhiError::null_argument("depth stencil image"))?;
            self.depth_stencil_image = Some(handle);

            let view = DepthStencilViewCreateInfo {
                mip_level_count: image.mip_level_count(),
                array_layer_count: image.array_layer_count(),
                depth_load_op: info.depth_load_op,
                depth_store_op: info.depth_store_op,
                stencil_load_op: info.stencil_load_op,
                stencil_store_op: info.stencil_store_op,
                ownership: Ownership::Exclusive,
                ..DepthStencilViewCreateInfo::guess_from_image(handle, &image)
            };
            self.depth_stencil_view = Some(device.create_object::<DepthStencilView>(&view)?);
            self.layout.depth_stencil_format = image.format();
            self.layout.sample_count = image.sample_count();
        }

        self.copy_ops(info);
        Ok(())
    }

    fn copy_ops(&mut self, info: &VersionedRenderPassCreateInfo) {
        let count = self.render_target_images.len();
        self.layout.render_target_load_ops = (0..count)
            .map(|index| entry_or_default(&info.render_target_load_ops, index))
            .collect();
        self.layout.render_target_store_ops = (0..count)
            .map(|index| entry_or_default(&info.render_target_store_ops, index))
            .collect();
        self.layout.depth_load_op = info.depth_load_op;
        self.layout.depth_store_op = info.depth_store_op;
        self.layout.stencil_load_op = info.stencil_load_op;
        self.layout.stencil_store_op = info.stencil_store_op;
    }

    /// Give the images and views this pass created the ownership it was described with
    fn apply_declared_ownership(&self, device: &Device, info: &VersionedRenderPassCreateInfo) {
        let created_images = matches!(info.source, AttachmentSource::Formats { .. });
        let created_views = !matches!(info.source, AttachmentSource::Views { .. });
        if created_images {
            for &image in self.render_target_images.iter().chain(self.depth_stencil_image.iter()) {
                if let Some(image) = device.object::<Image>(image) {
                    image.set_ownership(info.ownership);
                }
            }
        }
        if created_views {
            for &view in &self.render_target_views {
                if let Some(view) = device.object::<RenderTargetView>(view) {
                    view.set_ownership(info.ownership);
                }
            }
            if let Some(view) = self.depth_stencil_view.and_then(|view| device.object::<DepthStencilView>(view)) {
                view.set_ownership(info.ownership);
            }
        }
    }
}

fn disown<T: DeviceObject>(object: Option<&T>) -> RhiResult<()> {
    let object = object.ok_or_else(|| RhiError::not_found(format!("{} owned by render pass", T::KIND)))?;
    let found = object.ownership();
    if found == Ownership::Restricted {
        return Err(RhiError::InvalidOwnership {
            kind: T::KIND,
            expected: Ownership::Exclusive,
            found,
        });
    }
    object.set_ownership(Ownership::Reference);
    Ok(())
}

impl DeviceObject for RenderPass {
    type CreateInfo = VersionedRenderPassCreateInfo;
    type Handle = RenderPassHandle;
    const KIND: ObjectKind = ObjectKind::RenderPass;

    fn allocate(device: &Device) -> RhiResult<Self> {
        let api = device.backend().allocate_object(Self::KIND)?;
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: VersionedRenderPassCreateInfo::default(),
            api: ApiSlot::new(api),
            render_area: Rect::default(),
            viewport: Viewport::default(),
            render_target_views: Vec::new(),
            render_target_images: Vec::new(),
            depth_stencil_view: None,
            depth_stencil_image: None,
            layout: RenderPassLayout::default(),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &VersionedRenderPassCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: VersionedRenderPassCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &VersionedRenderPassCreateInfo) -> RhiResult<()> {
        let count = info.render_target_count();
        if count > MAX_RENDER_TARGETS {
            return Err(RhiError::invalid_create_argument(format!(
                "render pass has {count} render targets, at most {MAX_RENDER_TARGETS} are supported"
            )));
        }
        if info.width == 0 || info.height == 0 {
            return Err(RhiError::invalid_create_argument("render pass has a zero extent"));
        }

        self.render_area = Rect::from_extent(info.width, info.height);
        self.viewport = Viewport::from_extent(info.width, info.height);
        self.layout.depth_stencil_state = info.depth_stencil_state;

        match &info.source {
            AttachmentSource::Views {
                render_target_views,
                depth_stencil_view,
            } => self.adopt_views(device, render_target_views, *depth_stencil_view)?,
            AttachmentSource::Formats {
                render_target_formats,
                depth_stencil_format,
                sample_count,
                render_target_usage_flags,
                depth_stencil_usage_flags,
                render_target_initial_states,
                depth_stencil_initial_state: _,
            } => self.create_images_and_views(
                device,
                info,
                render_target_formats,
                *depth_stencil_format,
                *sample_count,
                render_target_usage_flags,
                *depth_stencil_usage_flags,
                render_target_initial_states,
            )?,
            AttachmentSource::Images {
                render_target_images,
                depth_stencil_image,
            } => self.derive_views(device, info, render_target_images, *depth_stencil_image)?,
        }

        let desc = ApiObjectDesc::RenderPass(&self.layout);
        self.api
            .with(|api| api.create_api_objects(&desc))
            .unwrap_or_else(|| Err(RhiError::Backend("render pass native object already destroyed".to_string())))?;

        self.apply_declared_ownership(device, info);
        Ok(())
    }

    fn destroy_api_objects(&self, device: &Device) {
        for (&view, &image) in self.render_target_views.iter().zip(&self.render_target_images) {
            device.destroy_owned::<RenderTargetView>(view);
            device.destroy_owned::<Image>(image);
        }
        // Images without a view exist when view creation failed part way
        for &image in self.render_target_images.iter().skip(self.render_target_views.len()) {
            device.destroy_owned::<Image>(image);
        }
        if let Some(view) = self.depth_stencil_view {
            device.destroy_owned::<DepthStencilView>(view);
        }
        if let Some(image) = self.depth_stencil_image {
            device.destroy_owned::<Image>(image);
        }
        self.api.destroy();
    }

    fn registry(device: &Device) -> &Registry<RenderPassHandle, Self> {
        &device.registries().render_passes
    }

    fn declared_ownership(info: &VersionedRenderPassCreateInfo) -> Ownership {
        info.ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn color_and_depth(width: u32, height: u32) -> RenderPassCreateInfo2 {
        let mut info = RenderPassCreateInfo2 {
            width,
            height,
            render_target_formats: vec![Format::R8G8B8A8Unorm, Format::R16G16B16A16Float],
            depth_stencil_format: Format::D32Float,
            depth_load_op: AttachmentLoadOp::Clear,
            ownership: Ownership::Exclusive,
            ..RenderPassCreateInfo2::default()
        };
        info.set_all_render_target_to_clear();
        info
    }

    #[test]
    fn test_versions_normalize() {
        let by_view: VersionedRenderPassCreateInfo = RenderPassCreateInfo::default().into();
        let by_format: VersionedRenderPassCreateInfo = color_and_depth(4, 4).into();
        let by_image: VersionedRenderPassCreateInfo = RenderPassCreateInfo3::default().into();
        assert_eq!(by_view.version(), 1);
        assert_eq!(by_format.version(), 2);
        assert_eq!(by_image.version(), 3);
        assert_eq!(by_format.render_target_count(), 2);
        assert_eq!(by_format.depth_stencil_state, ResourceState::DepthStencilWrite);
    }

    #[test]
    fn test_render_pass_from_formats() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let handle = device.create_render_pass2(&color_and_depth(640, 480)).unwrap();
        let pass = device.render_pass(handle).unwrap();

        assert_eq!(pass.render_target_count(), 2);
        assert!(pass.has_depth_stencil());
        assert!(pass.has_load_op_clear());
        assert_eq!(pass.render_area(), Rect::from_extent(640, 480));
        assert_eq!(pass.layout().render_target_load_ops, vec![AttachmentLoadOp::Clear; 2]);
        assert_ne!(pass.native_handle(), 0);

        let image = device.image(pass.render_target_image(1).unwrap()).unwrap();
        assert_eq!(image.format(), Format::R16G16B16A16Float);
        assert!(image.usage().contains(ImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(image.initial_state(), ResourceState::RenderTarget);
        assert_eq!(pass.render_target_image_index(image_handle(&pass, 1)), Some(1));

        device.destroy_render_pass(handle);
        assert_eq!(fixture.backend.live_count(ObjectKind::Image), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::RenderTargetView), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::DepthStencilView), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::RenderPass), 0);
    }

    fn image_handle(pass: &RenderPass, index: usize) -> ImageHandle {
        pass.render_target_image(index).unwrap()
    }

    #[test]
    fn test_render_pass_from_views_leaves_views_alive() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let image = device.create_image(&ImageCreateInfo::render_target_2d(64, 64, Format::B8G8R8A8Unorm)).unwrap();
        let view = {
            let image_ref = device.image(image).unwrap();
            RenderTargetViewCreateInfo {
                load_op: AttachmentLoadOp::Clear,
                ..RenderTargetViewCreateInfo::guess_from_image(image, &image_ref)
            }
        };
        let view = device.create_render_target_view(&view).unwrap();

        let handle = device
            .create_render_pass(&RenderPassCreateInfo {
                width: 64,
                height: 64,
                render_target_views: vec![view],
                ..RenderPassCreateInfo::default()
            })
            .unwrap();
        let pass = device.render_pass(handle).unwrap();
        assert!(pass.has_load_op_clear());
        assert!(!pass.has_depth_stencil());
        assert_eq!(pass.render_target_image(0).unwrap(), image);
        assert!(matches!(pass.depth_stencil_view(), Err(RhiError::ElementNotFound { .. })));

        device.destroy_render_pass(handle);
        assert!(device.render_target_view(view).is_some());
        assert!(device.image(image).is_some());
    }

    #[test]
    fn test_missing_view_is_null_argument() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let image = device.create_image(&ImageCreateInfo::render_target_2d(8, 8, Format::R8G8B8A8Unorm)).unwrap();
        let view = device
            .create_render_target_view(&RenderTargetViewCreateInfo::guess_from_image(
                image,
                &device.image(image).unwrap(),
            ))
            .unwrap();
        device.destroy_render_target_view(view);

        let result = device.create_render_pass(&RenderPassCreateInfo {
            width: 8,
            height: 8,
            render_target_views: vec![view],
            ..RenderPassCreateInfo::default()
        });
        assert!(matches!(result, Err(RhiError::UnexpectedNullArgument { .. })));
        assert_eq!(device.registries().render_passes.len(), 0);
    }

    #[test]
    fn test_render_pass_from_images_derives_views() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let color = device.create_image(&ImageCreateInfo::render_target_2d(32, 32, Format::R8G8B8A8Unorm)).unwrap();
        let depth = device
            .create_image(&ImageCreateInfo::depth_stencil_target_2d(32, 32, Format::D24UnormS8Uint))
            .unwrap();

        let handle = device
            .create_render_pass3(&RenderPassCreateInfo3 {
                width: 32,
                height: 32,
                render_target_images: vec![color],
                depth_stencil_image: Some(depth),
                depth_stencil_state: ResourceState::DepthStencilWrite,
                ownership: Ownership::Exclusive,
                ..RenderPassCreateInfo3::default()
            })
            .unwrap();
        let pass = device.render_pass(handle).unwrap();
        let view = device.render_target_view(pass.render_target_view(0).unwrap()).unwrap();
        assert_eq!(view.format(), Format::R8G8B8A8Unorm);
        assert_eq!(view.ownership(), Ownership::Exclusive);
        assert_eq!(pass.layout().depth_stencil_format, Format::D24UnormS8Uint);

        device.destroy_render_pass(handle);
        assert_eq!(fixture.backend.live_count(ObjectKind::RenderTargetView), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::DepthStencilView), 0);
        assert!(device.image(color).is_some());
        assert!(device.image(depth).is_some());
    }

    #[test]
    fn test_reference_pass_leaves_created_images() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let mut info = color_and_depth(16, 16);
        info.ownership = Ownership::Reference;
        let handle = device.create_render_pass2(&info).unwrap();

        device.destroy_render_pass(handle);
        assert_eq!(device.registries().images.len(), 3);
        assert_eq!(device.registries().render_target_views.len(), 2);
    }

    #[test]
    fn test_failed_view_releases_created_images() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        fixture.backend.fail_next_create(ObjectKind::DepthStencilView);

        let result = device.create_render_pass2(&color_and_depth(16, 16));
        assert!(result.is_err());
        assert_eq!(device.registries().render_passes.len(), 0);
        assert_eq!(device.registries().images.len(), 0);
        assert_eq!(device.registries().render_target_views.len(), 0);
    }

    #[test]
    fn test_disown_keeps_object_alive() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let handle = device.create_render_pass2(&color_and_depth(16, 16)).unwrap();
        let pass = device.render_pass(handle).unwrap();

        let image = pass.disown_render_target_image(device, 0).unwrap();
        assert_eq!(device.image(image).unwrap().ownership(), Ownership::Reference);
        assert!(matches!(
            pass.disown_render_target_view(device, 5),
            Err(RhiError::OutOfRange { index: 5, count: 2 })
        ));

        let depth = pass.depth_stencil_image().unwrap();
        device.image(depth).unwrap().set_ownership(Ownership::Restricted);
        assert!(matches!(
            pass.disown_depth_stencil_image(device),
            Err(RhiError::InvalidOwnership { found: Ownership::Restricted, .. })
        ));

        // Restricted still counts as owned by the pass
        device.destroy_render_pass(handle);
        assert!(device.image(image).is_some());
        assert_eq!(device.registries().images.len(), 1);
    }
}
