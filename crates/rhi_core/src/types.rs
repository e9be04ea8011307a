//! Value types shared across resource kinds

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Maximum number of simultaneously bound render targets
pub const MAX_RENDER_TARGETS: usize = 8;

/// Native graphics API selected for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Api {
    /// Vulkan 1.1 or later
    #[default]
    Vulkan,
    /// Direct3D 12
    Dx12,
    /// In-process backend without a GPU
    Headless,
}

/// Queue and command pool capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandType {
    /// Graphics, compute and transfer work
    #[default]
    Graphics,
    /// Compute and transfer work
    Compute,
    /// Transfer work only
    Transfer,
}

/// Resource state used for layout transitions and attachment setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum ResourceState {
    #[default]
    Undefined,
    General,
    ConstantBuffer,
    VertexBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthStencilRead,
    DepthStencilWrite,
    DepthWriteStencilRead,
    DepthReadStencilWrite,
    ShaderResource,
    CopySrc,
    CopyDst,
    Present,
}

impl ResourceState {
    /// True if the depth aspect cannot be written in this state
    pub const fn is_depth_read_only(self) -> bool {
        matches!(self, Self::DepthStencilRead | Self::DepthReadStencilWrite)
    }

    /// True if the stencil aspect cannot be written in this state
    pub const fn is_stencil_read_only(self) -> bool {
        matches!(self, Self::DepthStencilRead | Self::DepthWriteStencilRead)
    }
}

/// What happens to attachment contents when a pass begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentLoadOp {
    /// Preserve existing contents
    #[default]
    Load,
    /// Clear to the begin-info clear value
    Clear,
    /// Contents are undefined
    DontCare,
}

/// What happens to attachment contents when a pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentStoreOp {
    /// Write results back
    #[default]
    Store,
    /// Results may be discarded
    DontCare,
}

/// Image dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum ImageType {
    Type1D,
    #[default]
    Type2D,
    Type3D,
    Cube,
}

/// View dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum ImageViewType {
    #[default]
    Undefined,
    Type1D,
    Type1DArray,
    Type2D,
    Type2DArray,
    Type3D,
    Cube,
    CubeArray,
}

/// Multisample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum SampleCount {
    #[default]
    Count1,
    Count2,
    Count4,
    Count8,
    Count16,
}

impl SampleCount {
    /// Number of samples per pixel
    pub const fn samples(self) -> u32 {
        match self {
            Self::Count1 => 1,
            Self::Count2 => 2,
            Self::Count4 => 4,
            Self::Count8 => 8,
            Self::Count16 => 16,
        }
    }
}

/// Where a resource's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuOnly,
    CpuToGpu,
    GpuToCpu,
}

/// Index element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum IndexType {
    #[default]
    Undefined,
    Uint16,
    Uint32,
}

impl IndexType {
    /// Size of one index in bytes, zero when undefined
    pub const fn size(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

bitflags! {
    /// How an image may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsageFlags: u32 {
        /// Source of transfer commands
        const TRANSFER_SRC = 1 << 0;
        /// Destination of transfer commands
        const TRANSFER_DST = 1 << 1;
        /// Sampled in shaders
        const SAMPLED = 1 << 2;
        /// Read/write storage image
        const STORAGE = 1 << 3;
        /// Color attachment
        const COLOR_ATTACHMENT = 1 << 4;
        /// Depth/stencil attachment
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// How a buffer may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageFlags: u32 {
        /// Source of transfer commands
        const TRANSFER_SRC = 1 << 0;
        /// Destination of transfer commands
        const TRANSFER_DST = 1 << 1;
        /// Uniform buffer
        const UNIFORM_BUFFER = 1 << 2;
        /// Storage buffer
        const STORAGE_BUFFER = 1 << 3;
        /// Index buffer
        const INDEX_BUFFER = 1 << 4;
        /// Vertex buffer
        const VERTEX_BUFFER = 1 << 5;
        /// Indirect argument buffer
        const INDIRECT_BUFFER = 1 << 6;
    }
}

/// Integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Rectangle anchored at the origin
    pub const fn from_extent(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[allow(missing_docs)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with a `[0, 1]` depth range
    #[allow(clippy::cast_precision_loss)]
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Clear color for a render target
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[allow(missing_docs)]
pub struct RenderTargetClearValue {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl RenderTargetClearValue {
    /// Build a clear color from components
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Clear values for a depth/stencil target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClearValue {
    /// Depth clear value
    pub depth: f32,
    /// Stencil clear value
    pub stencil: u32,
}

impl Default for DepthStencilClearValue {
    fn default() -> Self {
        Self {
            depth: 1.0,
            stencil: 0xFF,
        }
    }
}

/// Mip and array range of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    /// First mip level
    pub mip_level: u32,
    /// Number of mip levels
    pub mip_level_count: u32,
    /// First array layer
    pub array_layer: u32,
    /// Number of array layers
    pub array_layer_count: u32,
}

impl SubresourceRange {
    /// Range covering every mip and layer
    pub const ALL: Self = Self {
        mip_level: 0,
        mip_level_count: u32::MAX,
        array_layer: 0,
        array_layer_count: u32::MAX,
    };
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::ALL
    }
}
