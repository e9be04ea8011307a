//! # RHI Core
//!
//! Lifecycle management for GPU objects behind a backend-neutral interface.
//!
//! ## Features
//!
//! - **Ownership**: every object is Reference, Exclusive or Restricted owned, which decides
//!   whether a containing object destroys it
//! - **Registries**: one per object kind on each [`Device`], with stale-handle-safe destroy
//! - **Two-phase creation**: objects only enter a registry once fully built
//! - **Passes**: render passes described by view, format or image, and draw passes caching one
//!   render pass per clear mask
//! - **Recording**: command buffers track the active pass and reject invalid nesting
//! - **Scoped cleanup**: [`ScopeDestroyer`] releases temporaries on every return path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rhi_core::backend::headless::HeadlessBackend;
//! use rhi_core::prelude::*;
//!
//! fn main() -> Result<(), RhiError> {
//!     let info = InstanceCreateInfo::default().with_api(Api::Headless);
//!     let instance = Instance::create(&info, Arc::new(HeadlessBackend::new()))?;
//!     let handle = instance.create_device(&DeviceCreateInfo::default())?;
//!     let device = instance.device(handle).ok_or_else(|| RhiError::not_found("device"))?;
//!
//!     let buffer = device.create_buffer(&BufferCreateInfo::staging(256))?;
//!     device.destroy_buffer(buffer);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod backend;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod foundation;
pub mod instance;
pub mod object;
pub mod ownership;
pub mod pass;
pub mod queue;
pub mod registry;
pub mod resources;
pub mod scope;
pub mod types;

#[cfg(test)]
mod testing;

pub use device::Device;
pub use error::{RhiError, RhiResult};
pub use instance::Instance;
pub use scope::ScopeDestroyer;

/// Common imports for users of the resource layer
pub mod prelude {
    pub use crate::{
        command::{CommandBuffer, CommandBufferCreateInfo, RenderPassBeginInfo},
        config::Config,
        device::{Device, DeviceCreateInfo},
        error::{RhiError, RhiResult},
        format::Format,
        instance::{Instance, InstanceCreateInfo},
        object::{DeviceObject, ObjectKind},
        ownership::Ownership,
        pass::{
            DrawPass, DrawPassClearFlags, DrawPassCreateInfo, DrawPassCreateInfo2, DrawPassCreateInfo3, RenderPass,
            RenderPassCreateInfo, RenderPassCreateInfo2, RenderPassCreateInfo3,
        },
        queue::{Queue, SubmitInfo},
        resources::{
            buffer::{Buffer, BufferCreateInfo},
            image::{Image, ImageCreateInfo},
            texture::{Texture, TextureCreateInfo},
        },
        scope::ScopeDestroyer,
        types::{Api, CommandType, ResourceState},
    };
}
