//! Scoped escrow for short-lived objects
//!
//! [`ScopeDestroyer`] takes Reference-owned objects, marks them Exclusive and destroys whatever
//! is still Exclusive when it is dropped. Multi-step operations add their temporaries as they go
//! and return early with `?` freely; the drop runs on every path.
//!
//! To keep objects past the scope, reset their ownership to Reference and call
//! [`ScopeDestroyer::release_all`].

use std::sync::Arc;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    BufferHandle, CommandBufferHandle, ImageHandle, MeshHandle, SampledImageViewHandle, SamplerHandle, TextureHandle,
};
use crate::object::DeviceObject;
use crate::ownership::Ownership;
use crate::queue::Queue;
use crate::resources::buffer::Buffer;
use crate::resources::image::{Image, SampledImageView};
use crate::resources::mesh::Mesh;
use crate::resources::sampler::Sampler;
use crate::resources::texture::Texture;

/// Object held by a scope, listed in teardown order
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum Escrowed {
    Image(ImageHandle),
    Buffer(BufferHandle),
    Mesh(MeshHandle),
    Texture(TextureHandle),
    Sampler(SamplerHandle),
    SampledImageView(SampledImageViewHandle),
    CommandBuffer(Arc<Queue>, CommandBufferHandle),
}

impl Escrowed {
    const fn rank(&self) -> u8 {
        match self {
            Self::Image(_) => 0,
            Self::Buffer(_) => 1,
            Self::Mesh(_) => 2,
            Self::Texture(_) => 3,
            Self::Sampler(_) => 4,
            Self::SampledImageView(_) => 5,
            Self::CommandBuffer(..) => 6,
        }
    }
}

/// Object kinds a [`ScopeDestroyer`] accepts
pub trait Escrow: DeviceObject {
    /// Wrap a handle of this kind
    fn escrowed(handle: Self::Handle) -> Escrowed;
}

macro_rules! escrow_kinds {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Escrow for $ty {
                fn escrowed(handle: Self::Handle) -> Escrowed {
                    Escrowed::$variant(handle)
                }
            }
        )*
    };
}

escrow_kinds! {
    Image => Image,
    Buffer => Buffer,
    Mesh => Mesh,
    Texture => Texture,
    Sampler => Sampler,
    SampledImageView => SampledImageView,
}

fn take_exclusive<T: DeviceObject>(device: &Device, handle: T::Handle) -> RhiResult<()> {
    let object = device
        .object::<T>(handle)
        .ok_or_else(|| RhiError::null_argument(format!("escrowed {}", T::KIND)))?;
    object
        .header()
        .exchange_ownership(Ownership::Reference, Ownership::Exclusive)
        .map_err(|found| {
            log::error!("Cannot escrow {} with {found} ownership", T::KIND);
            RhiError::InvalidOwnership {
                kind: T::KIND,
                expected: Ownership::Reference,
                found,
            }
        })
}

fn destroy_if_exclusive<T: DeviceObject>(device: &Device, handle: T::Handle) {
    if device
        .object::<T>(handle)
        .is_some_and(|object| object.ownership() == Ownership::Exclusive)
    {
        device.destroy_object::<T>(handle);
    }
}

/// Escrow that destroys its still-Exclusive objects when dropped
pub struct ScopeDestroyer<'a> {
    device: &'a Device,
    objects: Vec<Escrowed>,
}

impl<'a> ScopeDestroyer<'a> {
    /// Empty escrow over `device`
    pub const fn new(device: &'a Device) -> Self {
        Self {
            device,
            objects: Vec::new(),
        }
    }

    /// Take a Reference-owned object into the escrow
    ///
    /// Fails with [`RhiError::InvalidOwnership`] for any other ownership; the object is then
    /// left untouched and not recorded.
    pub fn add_object<T: Escrow>(&mut self, handle: T::Handle) -> RhiResult<()> {
        take_exclusive::<T>(self.device, handle)?;
        self.objects.push(T::escrowed(handle));
        Ok(())
    }

    /// Take a transient command buffer; it is returned to `queue` on teardown
    pub fn add_command_buffer(&mut self, queue: &Arc<Queue>, handle: CommandBufferHandle) -> RhiResult<()> {
        take_exclusive::<crate::command::CommandBuffer>(self.device, handle)?;
        self.objects.push(Escrowed::CommandBuffer(Arc::clone(queue), handle));
        Ok(())
    }

    /// Number of objects currently held
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing is held
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Forget every held object without destroying anything
    pub fn release_all(&mut self) {
        if !self.objects.is_empty() {
            log::warn!("Scope released {} objects without destroying them", self.objects.len());
        }
        self.objects.clear();
    }
}

impl Drop for ScopeDestroyer<'_> {
    fn drop(&mut self) {
        let mut objects = std::mem::take(&mut self.objects);
        objects.sort_by_key(Escrowed::rank);
        let device = self.device;
        for object in objects {
            match object {
                Escrowed::Image(handle) => destroy_if_exclusive::<Image>(device, handle),
                Escrowed::Buffer(handle) => destroy_if_exclusive::<Buffer>(device, handle),
                Escrowed::Mesh(handle) => destroy_if_exclusive::<Mesh>(device, handle),
                Escrowed::Texture(handle) => destroy_if_exclusive::<Texture>(device, handle),
                Escrowed::Sampler(handle) => destroy_if_exclusive::<Sampler>(device, handle),
                Escrowed::SampledImageView(handle) => destroy_if_exclusive::<SampledImageView>(device, handle),
                Escrowed::CommandBuffer(queue, handle) => {
                    if device
                        .command_buffer(handle)
                        .is_some_and(|cmd| cmd.ownership() == Ownership::Exclusive)
                    {
                        queue.destroy_command_buffer(device, handle);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::object::ObjectKind;
    use crate::resources::buffer::BufferCreateInfo;
    use crate::resources::image::ImageCreateInfo;
    use crate::testing::Fixture;
    use crate::types::BufferUsageFlags;

    fn staging_then_fail(device: &Device, fail: bool) -> RhiResult<BufferHandle> {
        let mut scope = ScopeDestroyer::new(device);
        let buffer = device.create_buffer(&BufferCreateInfo::staging(64))?;
        scope.add_object::<Buffer>(buffer)?;
        if fail {
            return Err(RhiError::invalid_operation("upload failed"));
        }
        Ok(buffer)
    }

    #[test]
    fn test_early_return_destroys_once() {
        let fixture = Fixture::new();
        let device = &fixture.device;

        assert!(staging_then_fail(device, true).is_err());
        assert_eq!(device.registries().buffers.len(), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::Buffer), 0);
        let destroyed = fixture
            .backend
            .destroyed_kinds()
            .into_iter()
            .filter(|&kind| kind == ObjectKind::Buffer)
            .count();
        assert_eq!(destroyed, 1);

        let handle = staging_then_fail(device, false).unwrap();
        assert!(device.buffer(handle).is_none());
    }

    #[test]
    fn test_exclusive_object_rejected() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let info = BufferCreateInfo::new(32, BufferUsageFlags::UNIFORM_BUFFER).with_ownership(Ownership::Exclusive);
        let owned = device.create_buffer(&info).unwrap();
        let free = device
            .create_buffer(&BufferCreateInfo::new(32, BufferUsageFlags::UNIFORM_BUFFER))
            .unwrap();

        {
            let mut scope = ScopeDestroyer::new(device);
            let err = scope.add_object::<Buffer>(owned).unwrap_err();
            assert!(matches!(
                err,
                RhiError::InvalidOwnership {
                    expected: Ownership::Reference,
                    found: Ownership::Exclusive,
                    ..
                }
            ));
            assert!(scope.is_empty());

            scope.add_object::<Buffer>(free).unwrap();
            assert!(scope.add_object::<Buffer>(free).is_err());
            assert_eq!(scope.len(), 1);
        }

        assert!(device.buffer(owned).is_some());
        assert!(device.buffer(free).is_none());
    }

    #[test]
    fn test_release_all_keeps_objects() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let image = device
            .create_image(&ImageCreateInfo::sampled_2d(8, 8, Format::R8G8B8A8Unorm))
            .unwrap();

        {
            let mut scope = ScopeDestroyer::new(device);
            scope.add_object::<Image>(image).unwrap();
            device.image(image).unwrap().set_ownership(Ownership::Reference);
            scope.release_all();
        }

        let kept = device.image(image).unwrap();
        assert_eq!(kept.ownership(), Ownership::Reference);
    }

    #[test]
    fn test_reset_ownership_skips_destroy() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let image = device
            .create_image(&ImageCreateInfo::sampled_2d(8, 8, Format::R8G8B8A8Unorm))
            .unwrap();

        {
            let mut scope = ScopeDestroyer::new(device);
            scope.add_object::<Image>(image).unwrap();
            device.image(image).unwrap().set_ownership(Ownership::Reference);
        }

        assert!(device.image(image).is_some());
    }

    #[test]
    fn test_command_buffer_returned_to_queue() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let queue = device.graphics_queue(0).unwrap();
        let cmd = queue.create_command_buffer(device, 0, 0).unwrap();

        {
            let mut scope = ScopeDestroyer::new(device);
            scope.add_command_buffer(&queue, cmd).unwrap();
        }

        assert_eq!(queue.transient_command_buffer_count(), 0);
        assert!(device.command_buffer(cmd).is_none());
    }
}
