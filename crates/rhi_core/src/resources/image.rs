//! Images and image views
//!
//! Views reference their image by handle. The image must stay live while a view is created;
//! the backend receives the image's native handle in the view description.

use std::sync::Arc;

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    DepthStencilViewHandle, ImageHandle, RenderTargetViewHandle, SampledImageViewHandle, StorageImageViewHandle,
};
use crate::format::Format;
use crate::object::ObjectKind;
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, DepthStencilClearValue, ImageType, ImageUsageFlags, ImageViewType,
    MemoryUsage, RenderTargetClearValue, ResourceState, SampleCount, SubresourceRange,
};

/// Description of an image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCreateInfo {
    /// Dimensionality
    pub image_type: ImageType,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels, 1 for non-3D images
    pub depth: u32,
    /// Texel format
    pub format: Format,
    /// Samples per texel
    pub sample_count: SampleCount,
    /// Number of mip levels
    pub mip_level_count: u32,
    /// Number of array layers
    pub array_layer_count: u32,
    /// Allowed uses
    pub usage: ImageUsageFlags,
    /// Where the memory lives
    pub memory_usage: MemoryUsage,
    /// State the image starts in
    pub initial_state: ResourceState,
    /// Clear color used when the image is a cleared render target
    pub rtv_clear_value: RenderTargetClearValue,
    /// Clear values used when the image is a cleared depth/stencil target
    pub dsv_clear_value: DepthStencilClearValue,
    /// Ownership the created image takes
    pub ownership: Ownership,
}

impl Default for ImageCreateInfo {
    fn default() -> Self {
        Self {
            image_type: ImageType::Type2D,
            width: 0,
            height: 0,
            depth: 1,
            format: Format::Undefined,
            sample_count: SampleCount::Count1,
            mip_level_count: 1,
            array_layer_count: 1,
            usage: ImageUsageFlags::empty(),
            memory_usage: MemoryUsage::GpuOnly,
            initial_state: ResourceState::Undefined,
            rtv_clear_value: RenderTargetClearValue::default(),
            dsv_clear_value: DepthStencilClearValue::default(),
            ownership: Ownership::Reference,
        }
    }
}

impl ImageCreateInfo {
    /// 2D render target that can also be sampled
    pub fn render_target_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::SAMPLED,
            initial_state: ResourceState::RenderTarget,
            ..Self::default()
        }
    }

    /// 2D depth/stencil target
    pub fn depth_stencil_target_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            initial_state: ResourceState::DepthStencilWrite,
            ..Self::default()
        }
    }

    /// 2D image sampled in shaders and filled by transfers
    pub fn sampled_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: ImageUsageFlags::SAMPLED | ImageUsageFlags::TRANSFER_DST,
            initial_state: ResourceState::ShaderResource,
            ..Self::default()
        }
    }

    /// Set the usage flags
    #[must_use]
    pub const fn with_usage(mut self, usage: ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Set the ownership the image is created with
    #[must_use]
    pub const fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    /// Set the render-target clear color
    #[must_use]
    pub const fn with_rtv_clear_value(mut self, value: RenderTargetClearValue) -> Self {
        self.rtv_clear_value = value;
        self
    }
}

impl ResourceInfo for ImageCreateInfo {
    type Handle = ImageHandle;
    const KIND: ObjectKind = ObjectKind::Image;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(RhiError::invalid_create_argument(format!(
                "image extent {}x{}x{} has a zero dimension",
                self.width, self.height, self.depth
            )));
        }
        if self.format.is_undefined() {
            return Err(RhiError::invalid_create_argument("image format is undefined"));
        }
        if self.mip_level_count == 0 || self.array_layer_count == 0 {
            return Err(RhiError::invalid_create_argument(
                "image needs at least one mip level and one array layer",
            ));
        }
        let attachment = ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        if self.usage.contains(attachment) {
            return Err(RhiError::invalid_create_argument(
                "image cannot be both a color and a depth/stencil attachment",
            ));
        }
        Ok(ApiObjectDesc::Image(self))
    }

    fn registry(device: &Device) -> &Registry<ImageHandle, Image> {
        &device.registries().images
    }
}

/// Managed image
pub type Image = Resource<ImageCreateInfo>;

impl Image {
    /// Dimensionality
    pub fn image_type(&self) -> ImageType {
        self.create_info.image_type
    }

    /// Width in texels
    pub fn width(&self) -> u32 {
        self.create_info.width
    }

    /// Height in texels
    pub fn height(&self) -> u32 {
        self.create_info.height
    }

    /// Depth in texels
    pub fn depth(&self) -> u32 {
        self.create_info.depth
    }

    /// Texel format
    pub fn format(&self) -> Format {
        self.create_info.format
    }

    /// Samples per texel
    pub fn sample_count(&self) -> SampleCount {
        self.create_info.sample_count
    }

    /// Number of mip levels
    pub fn mip_level_count(&self) -> u32 {
        self.create_info.mip_level_count
    }

    /// Number of array layers
    pub fn array_layer_count(&self) -> u32 {
        self.create_info.array_layer_count
    }

    /// Allowed uses
    pub fn usage(&self) -> ImageUsageFlags {
        self.create_info.usage
    }

    /// State the image was created in
    pub fn initial_state(&self) -> ResourceState {
        self.create_info.initial_state
    }

    /// Render-target clear color
    pub fn rtv_clear_value(&self) -> RenderTargetClearValue {
        self.create_info.rtv_clear_value
    }

    /// Depth/stencil clear values
    pub fn dsv_clear_value(&self) -> DepthStencilClearValue {
        self.create_info.dsv_clear_value
    }

    /// Whole-image subresource range
    pub fn full_range(&self) -> SubresourceRange {
        SubresourceRange {
            mip_level: 0,
            mip_level_count: self.mip_level_count(),
            array_layer: 0,
            array_layer_count: self.array_layer_count(),
        }
    }

    /// View type that covers the image's layers
    ///
    /// Layered 1D and 2D images get array views. Cube images, or any image when `is_cube` is
    /// set, get a cube view, or a cube-array view past six layers.
    pub fn guess_image_view_type(&self, is_cube: bool) -> ImageViewType {
        let layered = self.array_layer_count() > 1;
        if is_cube || self.image_type() == ImageType::Cube {
            return if self.array_layer_count() > 6 {
                ImageViewType::CubeArray
            } else {
                ImageViewType::Cube
            };
        }
        match (self.image_type(), layered) {
            (ImageType::Type1D, false) => ImageViewType::Type1D,
            (ImageType::Type1D, true) => ImageViewType::Type1DArray,
            (ImageType::Type3D, _) => ImageViewType::Type3D,
            (_, false) => ImageViewType::Type2D,
            (_, true) => ImageViewType::Type2DArray,
        }
    }
}

fn resolve_image(device: &Device, handle: ImageHandle, view: ObjectKind) -> RhiResult<Arc<Image>> {
    device
        .image(handle)
        .ok_or_else(|| RhiError::null_argument(format!("{view} image")))
}

fn check_view_range(image: &Image, range: SubresourceRange, format: Format) -> RhiResult<()> {
    if format.is_undefined() {
        return Err(RhiError::invalid_create_argument("view format is undefined"));
    }
    let mips = u64::from(range.mip_level) + u64::from(range.mip_level_count);
    let layers = u64::from(range.array_layer) + u64::from(range.array_layer_count);
    if range.mip_level_count == 0
        || range.array_layer_count == 0
        || mips > u64::from(image.mip_level_count())
        || layers > u64::from(image.array_layer_count())
    {
        return Err(RhiError::invalid_create_argument(format!(
            "view range {range:?} exceeds image with {} mips and {} layers",
            image.mip_level_count(),
            image.array_layer_count()
        )));
    }
    Ok(())
}

/// Description of a render-target view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTargetViewCreateInfo {
    /// Image the view selects from
    pub image: ImageHandle,
    /// View dimensionality
    pub view_type: ImageViewType,
    /// View format
    pub format: Format,
    /// Mip level rendered to
    pub mip_level: u32,
    /// Number of mip levels
    pub mip_level_count: u32,
    /// First array layer
    pub array_layer: u32,
    /// Number of array layers
    pub array_layer_count: u32,
    /// Load op when used as an attachment
    pub load_op: AttachmentLoadOp,
    /// Store op when used as an attachment
    pub store_op: AttachmentStoreOp,
    /// Ownership the created view takes
    pub ownership: Ownership,
}

impl RenderTargetViewCreateInfo {
    /// Single-mip, single-layer view matching `image`
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self {
            image: handle,
            view_type: image.guess_image_view_type(false),
            format: image.format(),
            mip_level: 0,
            mip_level_count: 1,
            array_layer: 0,
            array_layer_count: 1,
            load_op: AttachmentLoadOp::Load,
            store_op: AttachmentStoreOp::Store,
            ownership: Ownership::Reference,
        }
    }

    fn range(&self) -> SubresourceRange {
        SubresourceRange {
            mip_level: self.mip_level,
            mip_level_count: self.mip_level_count,
            array_layer: self.array_layer,
            array_layer_count: self.array_layer_count,
        }
    }
}

impl ResourceInfo for RenderTargetViewCreateInfo {
    type Handle = RenderTargetViewHandle;
    const KIND: ObjectKind = ObjectKind::RenderTargetView;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        let image = resolve_image(device, self.image, Self::KIND)?;
        check_view_range(&image, self.range(), self.format)?;
        if self.format.has_depth() || self.format.has_stencil() {
            return Err(RhiError::invalid_create_argument(format!(
                "render target view format {} is a depth/stencil format",
                self.format
            )));
        }
        Ok(ApiObjectDesc::RenderTargetView {
            info: self,
            image: image.native_handle(),
        })
    }

    fn registry(device: &Device) -> &Registry<RenderTargetViewHandle, RenderTargetView> {
        &device.registries().render_target_views
    }
}

/// Managed render-target view
pub type RenderTargetView = Resource<RenderTargetViewCreateInfo>;

impl RenderTargetView {
    /// Image the view selects from
    pub fn image(&self) -> ImageHandle {
        self.create_info.image
    }

    /// View format
    pub fn format(&self) -> Format {
        self.create_info.format
    }

    /// View dimensionality
    pub fn view_type(&self) -> ImageViewType {
        self.create_info.view_type
    }

    /// Load op when used as an attachment
    pub fn load_op(&self) -> AttachmentLoadOp {
        self.create_info.load_op
    }

    /// Store op when used as an attachment
    pub fn store_op(&self) -> AttachmentStoreOp {
        self.create_info.store_op
    }
}

/// Description of a depth/stencil view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DepthStencilViewCreateInfo {
    pub image: ImageHandle,
    pub view_type: ImageViewType,
    pub format: Format,
    pub mip_level: u32,
    pub mip_level_count: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
    pub depth_load_op: AttachmentLoadOp,
    pub depth_store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub ownership: Ownership,
}

impl DepthStencilViewCreateInfo {
    /// Single-mip, single-layer view matching `image`
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self {
            image: handle,
            view_type: image.guess_image_view_type(false),
            format: image.format(),
            mip_level: 0,
            mip_level_count: 1,
            array_layer: 0,
            array_layer_count: 1,
            depth_load_op: AttachmentLoadOp::Load,
            depth_store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Load,
            stencil_store_op: AttachmentStoreOp::Store,
            ownership: Ownership::Reference,
        }
    }

    fn range(&self) -> SubresourceRange {
        SubresourceRange {
            mip_level: self.mip_level,
            mip_level_count: self.mip_level_count,
            array_layer: self.array_layer,
            array_layer_count: self.array_layer_count,
        }
    }
}

impl ResourceInfo for DepthStencilViewCreateInfo {
    type Handle = DepthStencilViewHandle;
    const KIND: ObjectKind = ObjectKind::DepthStencilView;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        let image = resolve_image(device, self.image, Self::KIND)?;
        check_view_range(&image, self.range(), self.format)?;
        if !(self.format.has_depth() || self.format.has_stencil()) {
            return Err(RhiError::invalid_create_argument(format!(
                "depth stencil view format {} has no depth or stencil aspect",
                self.format
            )));
        }
        Ok(ApiObjectDesc::DepthStencilView {
            info: self,
            image: image.native_handle(),
        })
    }

    fn registry(device: &Device) -> &Registry<DepthStencilViewHandle, DepthStencilView> {
        &device.registries().depth_stencil_views
    }
}

/// Managed depth/stencil view
pub type DepthStencilView = Resource<DepthStencilViewCreateInfo>;

impl DepthStencilView {
    /// Image the view selects from
    pub fn image(&self) -> ImageHandle {
        self.create_info.image
    }

    /// View format
    pub fn format(&self) -> Format {
        self.create_info.format
    }

    /// Depth and stencil load ops
    pub fn load_ops(&self) -> (AttachmentLoadOp, AttachmentLoadOp) {
        (self.create_info.depth_load_op, self.create_info.stencil_load_op)
    }

    /// Depth and stencil store ops
    pub fn store_ops(&self) -> (AttachmentStoreOp, AttachmentStoreOp) {
        (self.create_info.depth_store_op, self.create_info.stencil_store_op)
    }
}

/// Description of a view sampled in shaders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SampledImageViewCreateInfo {
    pub image: ImageHandle,
    pub view_type: ImageViewType,
    pub format: Format,
    pub mip_level: u32,
    pub mip_level_count: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
    pub ownership: Ownership,
}

impl SampledImageViewCreateInfo {
    /// View over every mip and layer of `image`
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self {
            image: handle,
            view_type: image.guess_image_view_type(false),
            format: image.format(),
            mip_level: 0,
            mip_level_count: image.mip_level_count(),
            array_layer: 0,
            array_layer_count: image.array_layer_count(),
            ownership: Ownership::Reference,
        }
    }
}

impl ResourceInfo for SampledImageViewCreateInfo {
    type Handle = SampledImageViewHandle;
    const KIND: ObjectKind = ObjectKind::SampledImageView;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        let image = resolve_image(device, self.image, Self::KIND)?;
        let range = SubresourceRange {
            mip_level: self.mip_level,
            mip_level_count: self.mip_level_count,
            array_layer: self.array_layer,
            array_layer_count: self.array_layer_count,
        };
        check_view_range(&image, range, self.format)?;
        Ok(ApiObjectDesc::SampledImageView {
            info: self,
            image: image.native_handle(),
        })
    }

    fn registry(device: &Device) -> &Registry<SampledImageViewHandle, SampledImageView> {
        &device.registries().sampled_image_views
    }
}

/// Managed sampled image view
pub type SampledImageView = Resource<SampledImageViewCreateInfo>;

impl SampledImageView {
    /// Image the view selects from
    pub fn image(&self) -> ImageHandle {
        self.create_info.image
    }

    /// View format
    pub fn format(&self) -> Format {
        self.create_info.format
    }
}

/// Description of a read/write storage view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StorageImageViewCreateInfo {
    pub image: ImageHandle,
    pub view_type: ImageViewType,
    pub format: Format,
    pub mip_level: u32,
    pub mip_level_count: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
    pub ownership: Ownership,
}

impl StorageImageViewCreateInfo {
    /// View over every mip and layer of `image`
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self {
            image: handle,
            view_type: image.guess_image_view_type(false),
            format: image.format(),
            mip_level: 0,
            mip_level_count: image.mip_level_count(),
            array_layer: 0,
            array_layer_count: image.array_layer_count(),
            ownership: Ownership::Reference,
        }
    }
}

impl ResourceInfo for StorageImageViewCreateInfo {
    type Handle = StorageImageViewHandle;
    const KIND: ObjectKind = ObjectKind::StorageImageView;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        let image = resolve_image(device, self.image, Self::KIND)?;
        if !image.usage().contains(ImageUsageFlags::STORAGE) {
            return Err(RhiError::invalid_create_argument("storage view of an image without storage usage"));
        }
        let range = SubresourceRange {
            mip_level: self.mip_level,
            mip_level_count: self.mip_level_count,
            array_layer: self.array_layer,
            array_layer_count: self.array_layer_count,
        };
        check_view_range(&image, range, self.format)?;
        Ok(ApiObjectDesc::StorageImageView {
            info: self,
            image: image.native_handle(),
        })
    }

    fn registry(device: &Device) -> &Registry<StorageImageViewHandle, StorageImageView> {
        &device.registries().storage_image_views
    }
}

/// Managed storage image view
pub type StorageImageView = Resource<StorageImageViewCreateInfo>;

impl StorageImageView {
    /// Image the view selects from
    pub fn image(&self) -> ImageHandle {
        self.create_info.image
    }

    /// View format
    pub fn format(&self) -> Format {
        self.create_info.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_guess_image_view_type() {
        let fixture = Fixture::new();
        let device = &fixture.device;

        let mut info = ImageCreateInfo::sampled_2d(64, 64, Format::R8G8B8A8Unorm);
        let flat = device.image(device.create_image(&info).unwrap()).unwrap();
        assert_eq!(flat.guess_image_view_type(false), ImageViewType::Type2D);
        assert_eq!(flat.guess_image_view_type(true), ImageViewType::Cube);

        info.array_layer_count = 4;
        let layered = device.image(device.create_image(&info).unwrap()).unwrap();
        assert_eq!(layered.guess_image_view_type(false), ImageViewType::Type2DArray);

        info.image_type = ImageType::Cube;
        info.array_layer_count = 12;
        let cubes = device.image(device.create_image(&info).unwrap()).unwrap();
        assert_eq!(cubes.guess_image_view_type(false), ImageViewType::CubeArray);

        info.image_type = ImageType::Type1D;
        info.array_layer_count = 1;
        let line = device.image(device.create_image(&info).unwrap()).unwrap();
        assert_eq!(line.guess_image_view_type(false), ImageViewType::Type1D);
    }

    #[test]
    fn test_view_guesses_select_ranges() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let mut info = ImageCreateInfo::sampled_2d(128, 128, Format::R8G8B8A8Unorm)
            .with_usage(ImageUsageFlags::SAMPLED | ImageUsageFlags::COLOR_ATTACHMENT);
        info.mip_level_count = 5;
        info.array_layer_count = 3;
        let handle = device.create_image(&info).unwrap();
        let image = device.image(handle).unwrap();

        let rtv = RenderTargetViewCreateInfo::guess_from_image(handle, &image);
        assert_eq!((rtv.mip_level_count, rtv.array_layer_count), (1, 1));
        assert_eq!(rtv.view_type, ImageViewType::Type2DArray);

        let srv = SampledImageViewCreateInfo::guess_from_image(handle, &image);
        assert_eq!((srv.mip_level_count, srv.array_layer_count), (5, 3));
        assert!(device.create_sampled_image_view(&srv).is_ok());
        assert!(device.create_render_target_view(&rtv).is_ok());
    }

    #[test]
    fn test_view_of_missing_image() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let handle = device
            .create_image(&ImageCreateInfo::render_target_2d(32, 32, Format::R8G8B8A8Unorm))
            .unwrap();
        let image = device.image(handle).unwrap();
        let info = RenderTargetViewCreateInfo::guess_from_image(handle, &image);
        device.destroy_image(handle);

        let err = device.create_render_target_view(&info).unwrap_err();
        assert!(matches!(err, RhiError::UnexpectedNullArgument { .. }));
        assert_eq!(device.registries().render_target_views.len(), 0);
    }

    #[test]
    fn test_invalid_image_extent() {
        let fixture = Fixture::new();
        let info = ImageCreateInfo::render_target_2d(0, 32, Format::R8G8B8A8Unorm);
        let err = fixture.device.create_image(&info).unwrap_err();
        assert!(matches!(err, RhiError::InvalidCreateArgument { .. }));
    }

    #[test]
    fn test_depth_view_needs_depth_format() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let handle = device
            .create_image(&ImageCreateInfo::render_target_2d(32, 32, Format::R8G8B8A8Unorm))
            .unwrap();
        let image = device.image(handle).unwrap();
        let info = DepthStencilViewCreateInfo::guess_from_image(handle, &image);
        assert!(device.create_depth_stencil_view(&info).is_err());
    }
}
