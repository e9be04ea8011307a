//! # Resources Module
//!
//! Managed GPU resources owned by a [`Device`].
//!
//! ## Organization
//!
//! Primitive kinds are a single native object described by a create-info. They all share one
//! storage type, [`Resource`], parameterized by the create-info:
//!
//! - [`buffer`]: linear memory
//! - [`image`]: images and the four view kinds
//! - [`sampler`], [`shader`], [`sync`] (fences and semaphores), [`swapchain`]
//! - [`pipeline`]: pipeline interfaces, graphics and compute pipelines
//! - [`descriptor`]: descriptor pools, set layouts and sets
//! - [`command_pool`]: pools command buffers are allocated from
//!
//! Composite kinds own other managed objects and implement
//! [`DeviceObject`] directly:
//!
//! - [`texture`]: an image plus the views its usage calls for
//! - [`mesh`]: index and vertex buffers with a derived attribute layout
//! - [`fullscreen_quad`]: a pipeline interface and graphics pipeline for full-screen draws

pub mod buffer;
pub mod command_pool;
pub mod descriptor;
pub mod fullscreen_quad;
pub mod image;
pub mod mesh;
pub mod pipeline;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

use std::fmt;

use slotmap::Key;

use crate::backend::{ApiObject, ApiObjectDesc, ApiSlot, NativeHandle};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::ownership::Ownership;
use crate::registry::Registry;

/// Create-info of a primitive resource kind
///
/// Ties a create-info to its handle type, object kind and device registry. Validation of the
/// create-info happens in [`describe`](ResourceInfo::describe), before the backend sees it.
pub trait ResourceInfo: Clone + fmt::Debug + Default + Send + Sync + 'static {
    /// Typed handle for objects built from this create-info
    type Handle: Key;

    /// Kind of object built from this create-info
    const KIND: ObjectKind;

    /// Ownership the created object takes
    fn ownership(&self) -> Ownership {
        Ownership::Reference
    }

    /// Validate and describe this create-info for the backend
    ///
    /// Handles to other objects are resolved to native handles through `device`.
    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>>;

    /// Registry that stores objects of this kind
    fn registry(device: &Device) -> &Registry<Self::Handle, Resource<Self>>;
}

/// Primitive managed object: a header, its create-info and one native object
pub struct Resource<I: ResourceInfo> {
    header: ObjectHeader,
    create_info: I,
    api: ApiSlot<dyn ApiObject>,
}

impl<I: ResourceInfo> Resource<I> {
    /// Native handle, zero once destroyed
    pub fn native_handle(&self) -> NativeHandle {
        self.api.native_handle()
    }

    /// Debug name
    pub fn name(&self) -> String {
        self.header.name()
    }

    /// Set the debug name
    pub fn set_name(&self, name: impl Into<String>) {
        self.header.set_name(name);
    }

    /// True once the native object has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.api.is_destroyed()
    }
}

impl<I: ResourceInfo> DeviceObject for Resource<I> {
    type CreateInfo = I;
    type Handle = I::Handle;
    const KIND: ObjectKind = I::KIND;

    fn allocate(device: &Device) -> RhiResult<Self> {
        let api = device.backend().allocate_object(I::KIND)?;
        Ok(Self {
            header: ObjectHeader::new(I::KIND, device.weak()),
            create_info: I::default(),
            api: ApiSlot::new(api),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &I {
        &self.create_info
    }

    fn set_create_info(&mut self, info: I) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &I) -> RhiResult<()> {
        let desc = info.describe(device)?;
        self.api
            .with(|api| api.create_api_objects(&desc))
            .unwrap_or_else(|| Err(RhiError::Backend(format!("{} native object already destroyed", I::KIND))))
    }

    fn destroy_api_objects(&self, _device: &Device) {
        self.api.destroy();
    }

    fn registry(device: &Device) -> &Registry<I::Handle, Self> {
        I::registry(device)
    }

    fn declared_ownership(info: &I) -> Ownership {
        info.ownership()
    }
}

impl<I: ResourceInfo> fmt::Debug for Resource<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("header", &self.header)
            .field("create_info", &self.create_info)
            .field("api", &self.api)
            .finish()
    }
}
