//! Draw passes
//!
//! A draw pass is a set of render-target textures and an optional depth/stencil texture, plus
//! one prebuilt render pass per clear mask. Beginning a draw pass with a set of
//! [`DrawPassClearFlags`] is a lookup into that cache instead of a render pass build.
//!
//! Masks are only built when every bit targets an attachment that exists and can be written:
//! a depth clear is never built for a read-only depth state, a stencil clear never for a
//! read-only stencil state.

use bitflags::bitflags;

use crate::command::RenderPassBeginInfo;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{DrawPassHandle, ImageHandle, RenderPassHandle, TextureHandle};
use crate::format::Format;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::ownership::Ownership;
use crate::pass::render_pass::{RenderPass, RenderPassCreateInfo3, VersionedRenderPassCreateInfo};
use crate::registry::Registry;
use crate::resources::image::ImageCreateInfo;
use crate::resources::texture::{Texture, TextureCreateInfo};
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, DepthStencilClearValue, ImageType, ImageUsageFlags, MemoryUsage, Rect,
    RenderTargetClearValue, ResourceState, SampleCount, Viewport, MAX_RENDER_TARGETS,
};

bitflags! {
    /// Attachments a draw pass clears when it begins
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawPassClearFlags: u32 {
        /// Clear every render target
        const CLEAR_RENDER_TARGETS = 1 << 0;
        /// Clear the depth aspect
        const CLEAR_DEPTH = 1 << 1;
        /// Clear the stencil aspect
        const CLEAR_STENCIL = 1 << 2;
        /// Clear everything
        const CLEAR_ALL = Self::CLEAR_RENDER_TARGETS.bits() | Self::CLEAR_DEPTH.bits() | Self::CLEAR_STENCIL.bits();
    }
}

fn resolve_initial_state(state: ResourceState, fallback: ResourceState) -> ResourceState {
    if state == ResourceState::Undefined {
        fallback
    } else {
        state
    }
}

/// Draw pass that creates its textures from formats
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawPassCreateInfo {
    /// Attachment width
    pub width: u32,
    /// Attachment height
    pub height: u32,
    /// Samples per pixel
    pub sample_count: SampleCount,
    /// Render-target formats, in attachment order
    pub render_target_formats: Vec<Format>,
    /// Depth/stencil format, undefined for none
    pub depth_stencil_format: Format,
    /// Extra usage per render-target texture
    pub render_target_usage_flags: Vec<ImageUsageFlags>,
    /// Extra usage for the depth/stencil texture
    pub depth_stencil_usage_flags: ImageUsageFlags,
    /// Initial state per render target, `Undefined` for RenderTarget
    pub render_target_initial_states: Vec<ResourceState>,
    /// Initial depth/stencil state, `Undefined` for DepthStencilWrite; also the pass state
    pub depth_stencil_initial_state: ResourceState,
    /// Clear colors, one per render target
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
    /// Ownership the created draw pass takes
    pub ownership: Ownership,
}

/// Draw pass over existing images
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawPassCreateInfo2 {
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
    /// Clear colors, one per render target; missing entries use the image's
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Depth/stencil clear value
    pub depth_stencil_clear_value: DepthStencilClearValue,
    /// Ownership the created draw pass takes
    pub ownership: Ownership,
}

/// Draw pass over existing textures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawPassCreateInfo3 {
    /// Render area width
    pub width: u32,
    /// Render area height
    pub height: u32,
    /// Render-target textures, in attachment order
    pub render_target_textures: Vec<TextureHandle>,
    /// Optional depth/stencil texture
    pub depth_stencil_texture: Option<TextureHandle>,
    /// State the depth/stencil target is in during the pass
    pub depth_stencil_state: ResourceState,
    /// Ownership the created draw pass takes
    pub ownership: Ownership,
}

/// Shape-specific part of a draw pass description
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TextureSource {
    /// Textures are created from formats
    Formats {
        render_target_formats: Vec<Format>,
        depth_stencil_format: Format,
        sample_count: SampleCount,
        render_target_usage_flags: Vec<ImageUsageFlags>,
        depth_stencil_usage_flags: ImageUsageFlags,
        render_target_initial_states: Vec<ResourceState>,
    },
    /// Textures are created around existing images
    Images {
        render_target_images: Vec<ImageHandle>,
        depth_stencil_image: Option<ImageHandle>,
    },
    /// Existing textures are adopted
    Textures {
        render_target_textures: Vec<TextureHandle>,
        depth_stencil_texture: Option<TextureHandle>,
    },
}

impl TextureSource {
    /// Version number of the public description this came from
    pub const fn version(&self) -> u32 {
        match self {
            Self::Formats { .. } => 1,
            Self::Images { .. } => 2,
            Self::Textures { .. } => 3,
        }
    }

    /// Number of render targets
    pub fn render_target_count(&self) -> usize {
        match self {
            Self::Formats { render_target_formats, .. } => render_target_formats.len(),
            Self::Images { render_target_images, .. } => render_target_images.len(),
            Self::Textures { render_target_textures, .. } => render_target_textures.len(),
        }
    }
}

/// Normalized draw pass description stored with the pass
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct VersionedDrawPassCreateInfo {
    pub width: u32,
    pub height: u32,
    pub depth_stencil_state: ResourceState,
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    /// Absent when the textures carry their own clear values
    pub depth_stencil_clear_value: Option<DepthStencilClearValue>,
    pub ownership: Ownership,
    pub source: TextureSource,
}

impl VersionedDrawPassCreateInfo {
    /// Version number of the public description this came from
    pub const fn version(&self) -> u32 {
        self.source.version()
    }

    /// Number of render targets
    pub fn render_target_count(&self) -> usize {
        self.source.render_target_count()
    }
}

impl Default for VersionedDrawPassCreateInfo {
    fn default() -> Self {
        DrawPassCreateInfo3::default().into()
    }
}

impl From<DrawPassCreateInfo> for VersionedDrawPassCreateInfo {
    fn from(info: DrawPassCreateInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            depth_stencil_state: resolve_initial_state(
                info.depth_stencil_initial_state,
                ResourceState::DepthStencilWrite,
            ),
            render_target_clear_values: info.render_target_clear_values,
            depth_stencil_clear_value: Some(info.depth_stencil_clear_value),
            ownership: info.ownership,
            source: TextureSource::Formats {
                render_target_formats: info.render_target_formats,
                depth_stencil_format: info.depth_stencil_format,
                sample_count: info.sample_count,
                render_target_usage_flags: info.render_target_usage_flags,
                depth_stencil_usage_flags: info.depth_stencil_usage_flags,
                render_target_initial_states: info.render_target_initial_states,
            },
        }
    }
}

impl From<DrawPassCreateInfo2> for VersionedDrawPassCreateInfo {
    fn from(info: DrawPassCreateInfo2) -> Self {
        Self {
            width: info.width,
            height: info.height,
            depth_stencil_state: info.depth_stencil_state,
            render_target_clear_values: info.render_target_clear_values,
            depth_stencil_clear_value: Some(info.depth_stencil_clear_value),
            ownership: info.ownership,
            source: TextureSource::Images {
                render_target_images: info.render_target_images,
                depth_stencil_image: info.depth_stencil_image,
            },
        }
    }
}

impl From<DrawPassCreateInfo3> for VersionedDrawPassCreateInfo {
    fn from(info: DrawPassCreateInfo3) -> Self {
        Self {
            width: info.width,
            height: info.height,
            depth_stencil_state: info.depth_stencil_state,
            render_target_clear_values: Vec::new(),
            depth_stencil_clear_value: None,
            ownership: info.ownership,
            source: TextureSource::Textures {
                render_target_textures: info.render_target_textures,
                depth_stencil_texture: info.depth_stencil_texture,
            },
        }
    }
}

/// Render pass built for one clear mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CachedPass {
    clear_flags: DrawPassClearFlags,
    render_pass: RenderPassHandle,
}

/// Managed draw pass
pub struct DrawPass {
    header: ObjectHeader,
    create_info: VersionedDrawPassCreateInfo,
    render_area: Rect,
    render_target_textures: Vec<TextureHandle>,
    depth_stencil_texture: Option<TextureHandle>,
    depth_stencil_format: Format,
    render_target_clear_values: Vec<RenderTargetClearValue>,
    depth_stencil_clear_value: DepthStencilClearValue,
    passes: Vec<CachedPass>,
}

impl DrawPass {
    /// Render area anchored at the origin
    pub const fn render_area(&self) -> Rect {
        self.render_area
    }

    /// Viewport covering the render area
    pub fn viewport(&self) -> Viewport {
        Viewport::from_extent(self.render_area.width, self.render_area.height)
    }

    /// Scissor covering the render area
    pub const fn scissor(&self) -> Rect {
        self.render_area
    }

    /// Number of render targets
    pub fn render_target_count(&self) -> usize {
        self.render_target_textures.len()
    }

    /// True if a depth/stencil texture is attached
    pub const fn has_depth_stencil(&self) -> bool {
        self.depth_stencil_texture.is_some()
    }

    /// Render-target texture at `index`
    pub fn render_target_texture(&self, index: usize) -> RhiResult<TextureHandle> {
        self.render_target_textures
            .get(index)
            .copied()
            .ok_or(RhiError::OutOfRange {
                index,
                count: self.render_target_textures.len(),
            })
    }

    /// Depth/stencil texture
    pub fn depth_stencil_texture(&self) -> RhiResult<TextureHandle> {
        self.depth_stencil_texture
            .ok_or_else(|| RhiError::not_found("draw pass depth stencil texture"))
    }

    /// Number of cached render passes
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// True if a render pass was built for exactly `clear_flags`
    pub fn has_clear_mask(&self, clear_flags: DrawPassClearFlags) -> bool {
        self.passes.iter().any(|pass| pass.clear_flags == clear_flags)
    }

    /// Render pass built for exactly `clear_flags`
    pub fn render_pass(&self, clear_flags: DrawPassClearFlags) -> RhiResult<RenderPassHandle> {
        self.passes
            .iter()
            .find(|pass| pass.clear_flags == clear_flags)
            .map(|pass| pass.render_pass)
            .ok_or_else(|| {
                log::error!("Draw pass has no render pass for clear mask {:#05b}", clear_flags.bits());
                RhiError::not_found(format!("draw pass render pass for clear mask {:#05b}", clear_flags.bits()))
            })
    }

    /// Begin-info for the cached pass matching `clear_flags`
    ///
    /// Clear values are filled in only for the aspects being cleared.
    pub fn prepare_render_pass_begin_info(&self, clear_flags: DrawPassClearFlags) -> RhiResult<RenderPassBeginInfo> {
        let render_pass = self.render_pass(clear_flags)?;
        let count = self.render_target_count();
        let render_target_clear_values = if clear_flags.contains(DrawPassClearFlags::CLEAR_RENDER_TARGETS) {
            self.render_target_clear_values.clone()
        } else {
            vec![RenderTargetClearValue::default(); count]
        };
        let depth_stencil_clear_value =
            if clear_flags.intersects(DrawPassClearFlags::CLEAR_DEPTH | DrawPassClearFlags::CLEAR_STENCIL) {
                self.depth_stencil_clear_value
            } else {
                DepthStencilClearValue::default()
            };
        Ok(RenderPassBeginInfo {
            render_pass,
            render_area: self.render_area,
            render_target_clear_values,
            depth_stencil_clear_value,
        })
    }

    fn create_textures_from_formats(
        &mut self,
        device: &Device,
        info: &VersionedDrawPassCreateInfo,
        source: &TextureSource,
    ) -> RhiResult<()> {
        let TextureSource::Formats {
            render_target_formats,
            depth_stencil_format,
            sample_count,
            render_target_usage_flags,
            depth_stencil_usage_flags,
            render_target_initial_states,
        } = source
        else {
            return Ok(());
        };

        for (index, &format) in render_target_formats.iter().enumerate() {
            let image_info = ImageCreateInfo {
                image_type: ImageType::Type2D,
                width: info.width,
                height: info.height,
                format,
                sample_count: *sample_count,
                usage: render_target_usage_flags.get(index).copied().unwrap_or_default()
                    | ImageUsageFlags::COLOR_ATTACHMENT,
                memory_usage: MemoryUsage::GpuOnly,
                initial_state: resolve_initial_state(
                    render_target_initial_states.get(index).copied().unwrap_or_default(),
                    ResourceState::RenderTarget,
                ),
                rtv_clear_value: info.render_target_clear_values.get(index).copied().unwrap_or_default(),
                ..ImageCreateInfo::default()
            };
            let texture_info = TextureCreateInfo::new(image_info).with_ownership(Ownership::Exclusive);
            let texture = device.create_object::<Texture>(&texture_info)?;
            self.render_target_textures.push(texture);
        }

        if !depth_stencil_format.is_undefined() {
            let image_info = ImageCreateInfo {
                image_type: ImageType::Type2D,
                width: info.width,
                height: info.height,
                format: *depth_stencil_format,
                sample_count: *sample_count,
                usage: *depth_stencil_usage_flags | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                memory_usage: MemoryUsage::GpuOnly,
                initial_state: info.depth_stencil_state,
                dsv_clear_value: info.depth_stencil_clear_value.unwrap_or_default(),
                ..ImageCreateInfo::default()
            };
            let texture_info = TextureCreateInfo::new(image_info).with_ownership(Ownership::Exclusive);
            let texture = device.create_object::<Texture>(&texture_info)?;
            self.depth_stencil_texture = Some(texture);
        }
        Ok(())
    }

    fn wrap_images(
        &mut self,
        device: &Device,
        render_target_images: &[ImageHandle],
        depth_stencil_image: Option<ImageHandle>,
    ) -> RhiResult<()> {
        for &image in render_target_images {
            let info = TextureCreateInfo::from_image(image).with_ownership(Ownership::Exclusive);
            self.render_target_textures.push(device.create_object::<Texture>(&info)?);
        }
        if let Some(image) = depth_stencil_image {
            let info = TextureCreateInfo::from_image(image).with_ownership(Ownership::Exclusive);
            self.depth_stencil_texture = Some(device.create_object::<Texture>(&info)?);
        }
        Ok(())
    }

    fn adopt_textures(
        &mut self,
        device: &Device,
        render_target_textures: &[TextureHandle],
        depth_stencil_texture: Option<TextureHandle>,
    ) -> RhiResult<()> {
        for (index, &texture) in render_target_textures.iter().enumerate() {
            if device.texture(texture).is_none() {
                return Err(RhiError::null_argument(format!("draw pass render target texture {index}")));
            }
            self.render_target_textures.push(texture);
        }
        if let Some(texture) = depth_stencil_texture {
            if device.texture(texture).is_none() {
                return Err(RhiError::null_argument("draw pass depth stencil texture"));
            }
            self.depth_stencil_texture = Some(texture);
        }
        Ok(())
    }

    /// Resolve clear values and images from the textures now that they exist
    fn resolve_attachments(
        &mut self,
        device: &Device,
        info: &VersionedDrawPassCreateInfo,
    ) -> RhiResult<(Vec<ImageHandle>, Option<ImageHandle>)> {
        let mut images = Vec::with_capacity(self.render_target_textures.len());
        self.render_target_clear_values.clear();
        for (index, &handle) in self.render_target_textures.iter().enumerate() {
            let texture = device
                .texture(handle)
                .ok_or_else(|| RhiError::null_argument(format!("draw pass render target texture {index}")))?;
            images.push(texture.image());
            self.render_target_clear_values.push(
                info.render_target_clear_values
                    .get(index)
                    .copied()
                    .unwrap_or_else(|| texture.rtv_clear_value()),
            );
        }

        let mut depth_stencil_image = None;
        if let Some(handle) = self.depth_stencil_texture {
            let texture = device
                .texture(handle)
                .ok_or_else(|| RhiError::null_argument("draw pass depth stencil texture"))?;
            depth_stencil_image = Some(texture.image());
            self.depth_stencil_format = texture.image_format();
            self.depth_stencil_clear_value = info
                .depth_stencil_clear_value
                .unwrap_or_else(|| texture.dsv_clear_value());
        }
        Ok((images, depth_stencil_image))
    }

    /// Clear bits that target an attachment that exists
    ///
    /// Depth and stencil bits stay available for any depth/stencil attachment, even when the
    /// format lacks one of the aspects; such a bit then loads instead of clearing.
    fn available_clear_flags(&self) -> DrawPassClearFlags {
        let mut flags = DrawPassClearFlags::empty();
        flags.set(DrawPassClearFlags::CLEAR_RENDER_TARGETS, !self.render_target_textures.is_empty());
        flags.set(
            DrawPassClearFlags::CLEAR_DEPTH | DrawPassClearFlags::CLEAR_STENCIL,
            self.depth_stencil_texture.is_some(),
        );
        flags
    }

    /// Whether `clear_flags` actually clears the depth and stencil aspects of the attachment
    fn clears_depth_stencil(&self, clear_flags: DrawPassClearFlags) -> (bool, bool) {
        let format = self.depth_stencil_format;
        (
            clear_flags.contains(DrawPassClearFlags::CLEAR_DEPTH) && format.has_depth(),
            clear_flags.contains(DrawPassClearFlags::CLEAR_STENCIL) && format.has_stencil(),
        )
    }

    fn is_buildable(&self, clear_flags: DrawPassClearFlags, state: ResourceState) -> bool {
        if !self.available_clear_flags().contains(clear_flags) {
            return false;
        }
        let (clears_depth, clears_stencil) = self.clears_depth_stencil(clear_flags);
        !(clears_depth && state.is_depth_read_only()) && !(clears_stencil && state.is_stencil_read_only())
    }

    fn build_passes(
        &mut self,
        device: &Device,
        info: &VersionedDrawPassCreateInfo,
        render_target_images: &[ImageHandle],
        depth_stencil_image: Option<ImageHandle>,
    ) -> RhiResult<()> {
        let load_op = |clear: bool| {
            if clear {
                AttachmentLoadOp::Clear
            } else {
                AttachmentLoadOp::Load
            }
        };

        for bits in 0..=DrawPassClearFlags::CLEAR_ALL.bits() {
            let clear_flags = DrawPassClearFlags::from_bits_truncate(bits);
            if !self.is_buildable(clear_flags, info.depth_stencil_state) {
                continue;
            }

            let (clears_depth, clears_stencil) = self.clears_depth_stencil(clear_flags);
            let count = render_target_images.len();
            let pass_info = RenderPassCreateInfo3 {
                width: info.width,
                height: info.height,
                render_target_images: render_target_images.to_vec(),
                depth_stencil_image,
                depth_stencil_state: info.depth_stencil_state,
                render_target_clear_values: self.render_target_clear_values.clone(),
                depth_stencil_clear_value: self.depth_stencil_clear_value,
                render_target_load_ops: vec![
                    load_op(clear_flags.contains(DrawPassClearFlags::CLEAR_RENDER_TARGETS));
                    count
                ],
                render_target_store_ops: vec![AttachmentStoreOp::Store; count],
                depth_load_op: load_op(clears_depth),
                depth_store_op: AttachmentStoreOp::Store,
                stencil_load_op: load_op(clears_stencil),
                stencil_store_op: AttachmentStoreOp::Store,
                ownership: Ownership::Exclusive,
            };

            let render_pass = device
                .create_object::<RenderPass>(&VersionedRenderPassCreateInfo::from(pass_info))
                .map_err(|err| {
                    log::error!("Failed to build render pass for clear mask {bits:#05b}: {err}");
                    err
                })?;
            self.passes.push(CachedPass {
                clear_flags,
                render_pass,
            });
        }
        Ok(())
    }
}

impl DeviceObject for DrawPass {
    type CreateInfo = VersionedDrawPassCreateInfo;
    type Handle = DrawPassHandle;
    const KIND: ObjectKind = ObjectKind::DrawPass;

    fn allocate(device: &Device) -> RhiResult<Self> {
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: VersionedDrawPassCreateInfo::default(),
            render_area: Rect::default(),
            render_target_textures: Vec::new(),
            depth_stencil_texture: None,
            depth_stencil_format: Format::Undefined,
            render_target_clear_values: Vec::new(),
            depth_stencil_clear_value: DepthStencilClearValue::default(),
            passes: Vec::new(),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &VersionedDrawPassCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: VersionedDrawPassCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &VersionedDrawPassCreateInfo) -> RhiResult<()> {
        let count = info.render_target_count();
        if count > MAX_RENDER_TARGETS {
            return Err(RhiError::invalid_create_argument(format!(
                "draw pass has {count} render targets, at most {MAX_RENDER_TARGETS} are supported"
            )));
        }
        self.render_area = Rect::from_extent(info.width, info.height);

        match &info.source {
            source @ TextureSource::Formats { .. } => self.create_textures_from_formats(device, info, source)?,
            TextureSource::Images {
                render_target_images,
                depth_stencil_image,
            } => self.wrap_images(device, render_target_images, *depth_stencil_image)?,
            TextureSource::Textures {
                render_target_textures,
                depth_stencil_texture,
            } => self.adopt_textures(device, render_target_textures, *depth_stencil_texture)?,
        }

        let (render_target_images, depth_stencil_image) = self.resolve_attachments(device, info)?;
        self.build_passes(device, info, &render_target_images, depth_stencil_image)?;
        log::debug!(
            "Draw pass {}x{} cached {} render passes",
            info.width,
            info.height,
            self.passes.len()
        );
        Ok(())
    }

    fn destroy_api_objects(&self, device: &Device) {
        for pass in &self.passes {
            device.destroy_owned::<RenderPass>(pass.render_pass);
        }
        for &texture in &self.render_target_textures {
            device.destroy_owned::<Texture>(texture);
        }
        if let Some(texture) = self.depth_stencil_texture {
            device.destroy_owned::<Texture>(texture);
        }
    }

    fn registry(device: &Device) -> &Registry<DrawPassHandle, Self> {
        &device.registries().draw_passes
    }

    fn declared_ownership(info: &VersionedDrawPassCreateInfo) -> Ownership {
        info.ownership
    }
}
