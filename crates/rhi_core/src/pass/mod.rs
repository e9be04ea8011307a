//! # Pass Module
//!
//! Render passes and the draw passes built on top of them.
//!
//! ## Organization
//!
//! - [`render_pass`]: render targets plus an optional depth/stencil target, described by view,
//!   by format or by image, and the backend render pass object over them
//! - [`draw_pass`]: textures plus one cached render pass per reachable clear mask

pub mod draw_pass;
pub mod render_pass;

pub use draw_pass::{DrawPass, DrawPassClearFlags, DrawPassCreateInfo, DrawPassCreateInfo2, DrawPassCreateInfo3};
pub use render_pass::{
    RenderPass, RenderPassCreateInfo, RenderPassCreateInfo2, RenderPassCreateInfo3, RenderPassLayout,
};
