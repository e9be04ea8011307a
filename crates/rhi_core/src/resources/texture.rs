//! Textures: an image bundled with the views its usage calls for
//!
//! A texture either wraps an existing image or creates its own. The image's usage flags decide
//! which views get built. Everything the texture creates is marked exclusive and torn down with
//! the texture; a wrapped image keeps whatever ownership it already had.

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    DepthStencilViewHandle, ImageHandle, RenderTargetViewHandle, SampledImageViewHandle, StorageImageViewHandle,
    TextureHandle,
};
use crate::format::Format;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::image::{
    DepthStencilView, DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetView,
    RenderTargetViewCreateInfo, SampledImageView, SampledImageViewCreateInfo, StorageImageView,
    StorageImageViewCreateInfo,
};
use crate::types::{
    DepthStencilClearValue, ImageType, ImageUsageFlags, ImageViewType, RenderTargetClearValue, ResourceState,
};

/// Description of a texture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureCreateInfo {
    /// Existing image to wrap; `image_info` is ignored when set
    pub image: Option<ImageHandle>,
    /// Image to create when no image is wrapped
    pub image_info: ImageCreateInfo,
    /// Sampled view type override
    pub sampled_view_type: ImageViewType,
    /// Sampled view format override
    pub sampled_view_format: Format,
    /// Render-target view format override
    pub render_target_view_format: Format,
    /// Depth/stencil view format override
    pub depth_stencil_view_format: Format,
    /// Storage view format override
    pub storage_view_format: Format,
    /// Ownership the created texture takes
    pub ownership: Ownership,
}

impl TextureCreateInfo {
    /// Texture that creates its own image
    pub fn new(image_info: ImageCreateInfo) -> Self {
        Self {
            image_info,
            ..Self::default()
        }
    }

    /// Texture wrapping an existing image
    pub fn from_image(image: ImageHandle) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }

    /// Set the ownership the texture is created with
    #[must_use]
    pub const fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }
}

/// Managed texture
pub struct Texture {
    header: ObjectHeader,
    create_info: TextureCreateInfo,
    image_info: ImageCreateInfo,
    image: Option<ImageHandle>,
    sampled_view: Option<SampledImageViewHandle>,
    render_target_view: Option<RenderTargetViewHandle>,
    depth_stencil_view: Option<DepthStencilViewHandle>,
    storage_view: Option<StorageImageViewHandle>,
}

impl Texture {
    /// The texture's image
    pub fn image(&self) -> ImageHandle {
        self.image.unwrap_or_default()
    }

    /// Sampled view, present when the image is sampled
    pub const fn sampled_view(&self) -> Option<SampledImageViewHandle> {
        self.sampled_view
    }

    /// Render-target view, present for color attachments
    pub const fn render_target_view(&self) -> Option<RenderTargetViewHandle> {
        self.render_target_view
    }

    /// Depth/stencil view, present for depth/stencil attachments
    pub const fn depth_stencil_view(&self) -> Option<DepthStencilViewHandle> {
        self.depth_stencil_view
    }

    /// Storage view, present for storage images
    pub const fn storage_view(&self) -> Option<StorageImageViewHandle> {
        self.storage_view
    }

    /// Image dimensionality
    pub const fn image_type(&self) -> ImageType {
        self.image_info.image_type
    }

    /// Width in texels
    pub const fn width(&self) -> u32 {
        self.image_info.width
    }

    /// Height in texels
    pub const fn height(&self) -> u32 {
        self.image_info.height
    }

    /// Image format
    pub const fn image_format(&self) -> Format {
        self.image_info.format
    }

    /// Image usage flags
    pub const fn usage(&self) -> ImageUsageFlags {
        self.image_info.usage
    }

    /// State the image was created in
    pub const fn initial_state(&self) -> ResourceState {
        self.image_info.initial_state
    }

    /// Render-target clear color of the image
    pub const fn rtv_clear_value(&self) -> RenderTargetClearValue {
        self.image_info.rtv_clear_value
    }

    /// Depth/stencil clear values of the image
    pub const fn dsv_clear_value(&self) -> DepthStencilClearValue {
        self.image_info.dsv_clear_value
    }

    /// Debug name
    pub fn name(&self) -> String {
        self.header.name()
    }

    fn build_views(
        &mut self,
        device: &Device,
        info: &TextureCreateInfo,
        handle: ImageHandle,
        image: &Image,
    ) -> RhiResult<()> {
        let usage = image.usage();

        if usage.contains(ImageUsageFlags::SAMPLED) {
            let mut view = SampledImageViewCreateInfo::guess_from_image(handle, image);
            if info.sampled_view_type != ImageViewType::Undefined {
                view.view_type = info.sampled_view_type;
            }
            if !info.sampled_view_format.is_undefined() {
                view.format = info.sampled_view_format;
            }
            view.ownership = Ownership::Exclusive;
            self.sampled_view = Some(device.create_object::<SampledImageView>(&view)?);
        }

        if usage.contains(ImageUsageFlags::COLOR_ATTACHMENT) {
            let mut view = RenderTargetViewCreateInfo::guess_from_image(handle, image);
            if !info.render_target_view_format.is_undefined() {
                view.format = info.render_target_view_format;
            }
            view.ownership = Ownership::Exclusive;
            self.render_target_view = Some(device.create_object::<RenderTargetView>(&view)?);
        }

        if usage.contains(ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
            let mut view = DepthStencilViewCreateInfo::guess_from_image(handle, image);
            if !info.depth_stencil_view_format.is_undefined() {
                view.format = info.depth_stencil_view_format;
            }
            view.ownership = Ownership::Exclusive;
            self.depth_stencil_view = Some(device.create_object::<DepthStencilView>(&view)?);
        }

        if usage.contains(ImageUsageFlags::STORAGE) {
            let mut view = StorageImageViewCreateInfo::guess_from_image(handle, image);
            if !info.storage_view_format.is_undefined() {
                view.format = info.storage_view_format;
            }
            view.ownership = Ownership::Exclusive;
            self.storage_view = Some(device.create_object::<StorageImageView>(&view)?);
        }

        Ok(())
    }
}

impl DeviceObject for Texture {
    type CreateInfo = TextureCreateInfo;
    type Handle = TextureHandle;
    const KIND: ObjectKind = ObjectKind::Texture;

    fn allocate(device: &Device) -> RhiResult<Self> {
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: TextureCreateInfo::default(),
            image_info: ImageCreateInfo::default(),
            image: None,
            sampled_view: None,
            render_target_view: None,
            depth_stencil_view: None,
            storage_view: None,
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &TextureCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: TextureCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &TextureCreateInfo) -> RhiResult<()> {
        let handle = if let Some(handle) = info.image {
            handle
        } else {
            let attachment = ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
            if info.image_info.usage.contains(attachment) {
                return Err(RhiError::invalid_create_argument(
                    "texture cannot be both color attachment and depth stencil attachment",
                ));
            }
            let image_info = info.image_info.clone().with_ownership(Ownership::Exclusive);
            device.create_object::<Image>(&image_info)?
        };
        self.image = Some(handle);

        let image = device
            .image(handle)
            .ok_or_else(|| RhiError::null_argument("texture image"))?;
        self.image_info = image.create_info().clone();
        self.build_views(device, info, handle, &image)
    }

    fn destroy_api_objects(&self, device: &Device) {
        if let Some(view) = self.sampled_view {
            device.destroy_owned::<SampledImageView>(view);
        }
        if let Some(view) = self.render_target_view {
            device.destroy_owned::<RenderTargetView>(view);
        }
        if let Some(view) = self.depth_stencil_view {
            device.destroy_owned::<DepthStencilView>(view);
        }
        if let Some(view) = self.storage_view {
            device.destroy_owned::<StorageImageView>(view);
        }
        if let Some(image) = self.image {
            device.destroy_owned::<Image>(image);
        }
    }

    fn registry(device: &Device) -> &Registry<TextureHandle, Self> {
        &device.registries().textures
    }

    fn declared_ownership(info: &TextureCreateInfo) -> Ownership {
        info.ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_texture_creates_views_from_usage() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let image_info = ImageCreateInfo::render_target_2d(64, 64, Format::R8G8B8A8Unorm);

        let handle = device.create_texture(&TextureCreateInfo::new(image_info)).unwrap();
        let texture = device.texture(handle).unwrap();
        assert!(texture.sampled_view().is_some());
        assert!(texture.render_target_view().is_some());
        assert!(texture.depth_stencil_view().is_none());
        assert_eq!(device.image(texture.image()).unwrap().ownership(), Ownership::Exclusive);

        device.destroy_texture(handle);
        assert!(device.image(texture.image()).is_none());
        assert_eq!(device.registries().sampled_image_views.len(), 0);
        assert_eq!(device.registries().render_target_views.len(), 0);
    }

    #[test]
    fn test_wrapped_image_survives_texture() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let image = device
            .create_image(&ImageCreateInfo::sampled_2d(16, 16, Format::R8G8B8A8Srgb))
            .unwrap();

        let info = TextureCreateInfo {
            sampled_view_format: Format::R8G8B8A8Unorm,
            ..TextureCreateInfo::from_image(image)
        };
        let handle = device.create_texture(&info).unwrap();
        let texture = device.texture(handle).unwrap();
        assert_eq!(texture.width(), 16);
        let view = device.sampled_image_view(texture.sampled_view().unwrap()).unwrap();
        assert_eq!(view.format(), Format::R8G8B8A8Unorm);

        device.destroy_texture(handle);
        assert!(device.image(image).is_some());
        assert_eq!(device.image(image).unwrap().ownership(), Ownership::Reference);
        assert_eq!(device.registries().sampled_image_views.len(), 0);
    }

    #[test]
    fn test_color_and_depth_usage_rejected() {
        let fixture = Fixture::new();
        let image_info = ImageCreateInfo::render_target_2d(8, 8, Format::R8G8B8A8Unorm)
            .with_usage(ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        let err = fixture.device.create_texture(&TextureCreateInfo::new(image_info)).unwrap_err();
        assert!(matches!(err, RhiError::InvalidCreateArgument { .. }));
        assert_eq!(fixture.device.registries().images.len(), 0);
    }

    #[test]
    fn test_failed_view_releases_image() {
        let fixture = Fixture::new();
        fixture.backend.fail_next_create(ObjectKind::RenderTargetView);
        let image_info = ImageCreateInfo::render_target_2d(8, 8, Format::R8G8B8A8Unorm);

        assert!(fixture.device.create_texture(&TextureCreateInfo::new(image_info)).is_err());
        assert_eq!(fixture.device.registries().textures.len(), 0);
        assert_eq!(fixture.device.registries().images.len(), 0);
        assert_eq!(fixture.device.registries().sampled_image_views.len(), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::Image), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::SampledImageView), 0);
    }
}
