//! Pixel formats and their aspect description

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Which aspects a format carries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatAspect: u32 {
        /// Color data
        const COLOR = 1 << 0;
        /// Depth data
        const DEPTH = 1 << 1;
        /// Stencil data
        const STENCIL = 1 << 2;
        /// Depth and stencil data
        const DEPTH_STENCIL = Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

/// Pixel formats understood by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Format {
    #[default]
    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16Uint,
    R16G16B16A16Float,
    R32Uint,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    D16Unorm,
    D32Float,
    S8Uint,
    D16UnormS8Uint,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

/// Static description of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescription {
    /// Human readable name
    pub name: &'static str,
    /// Size of one texel or vertex element in bytes
    pub bytes_per_texel: u32,
    /// Aspects present in the format
    pub aspect: FormatAspect,
}

impl Format {
    /// Describe the format
    pub const fn description(self) -> FormatDescription {
        let (name, bytes_per_texel, aspect) = match self {
            Self::Undefined => ("UNDEFINED", 0, FormatAspect::empty()),
            Self::R8Unorm => ("R8_UNORM", 1, FormatAspect::COLOR),
            Self::R8G8Unorm => ("R8G8_UNORM", 2, FormatAspect::COLOR),
            Self::R8G8B8A8Unorm => ("R8G8B8A8_UNORM", 4, FormatAspect::COLOR),
            Self::R8G8B8A8Srgb => ("R8G8B8A8_SRGB", 4, FormatAspect::COLOR),
            Self::B8G8R8A8Unorm => ("B8G8R8A8_UNORM", 4, FormatAspect::COLOR),
            Self::B8G8R8A8Srgb => ("B8G8R8A8_SRGB", 4, FormatAspect::COLOR),
            Self::R16Uint => ("R16_UINT", 2, FormatAspect::COLOR),
            Self::R16G16B16A16Float => ("R16G16B16A16_FLOAT", 8, FormatAspect::COLOR),
            Self::R32Uint => ("R32_UINT", 4, FormatAspect::COLOR),
            Self::R32Float => ("R32_FLOAT", 4, FormatAspect::COLOR),
            Self::R32G32Float => ("R32G32_FLOAT", 8, FormatAspect::COLOR),
            Self::R32G32B32Float => ("R32G32B32_FLOAT", 12, FormatAspect::COLOR),
            Self::R32G32B32A32Float => ("R32G32B32A32_FLOAT", 16, FormatAspect::COLOR),
            Self::D16Unorm => ("D16_UNORM", 2, FormatAspect::DEPTH),
            Self::D32Float => ("D32_FLOAT", 4, FormatAspect::DEPTH),
            Self::S8Uint => ("S8_UINT", 1, FormatAspect::STENCIL),
            Self::D16UnormS8Uint => ("D16_UNORM_S8_UINT", 3, FormatAspect::DEPTH_STENCIL),
            Self::D24UnormS8Uint => ("D24_UNORM_S8_UINT", 4, FormatAspect::DEPTH_STENCIL),
            Self::D32FloatS8Uint => ("D32_FLOAT_S8_UINT", 5, FormatAspect::DEPTH_STENCIL),
        };
        FormatDescription {
            name,
            bytes_per_texel,
            aspect,
        }
    }

    /// Aspects present in the format
    pub const fn aspect(self) -> FormatAspect {
        self.description().aspect
    }

    /// Size of one texel in bytes
    pub const fn bytes_per_texel(self) -> u32 {
        self.description().bytes_per_texel
    }

    /// True for [`Format::Undefined`]
    pub const fn is_undefined(self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// True if the format has a depth aspect
    pub const fn has_depth(self) -> bool {
        self.aspect().contains(FormatAspect::DEPTH)
    }

    /// True if the format has a stencil aspect
    pub const fn has_stencil(self) -> bool {
        self.aspect().contains(FormatAspect::STENCIL)
    }

    /// True if the format has a depth or stencil aspect
    pub const fn is_depth_stencil(self) -> bool {
        self.aspect().intersects(FormatAspect::DEPTH_STENCIL)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_stencil_aspects() {
        assert!(Format::D24UnormS8Uint.has_depth());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(Format::D32Float.has_depth());
        assert!(!Format::D32Float.has_stencil());
        assert!(Format::S8Uint.is_depth_stencil());
        assert!(!Format::R8G8B8A8Unorm.is_depth_stencil());
    }

    #[test]
    fn test_undefined_has_no_size() {
        assert!(Format::Undefined.is_undefined());
        assert_eq!(Format::Undefined.bytes_per_texel(), 0);
        assert_eq!(Format::R32G32B32Float.bytes_per_texel(), 12);
        assert_eq!(Format::R8G8B8A8Unorm.to_string(), "R8G8B8A8_UNORM");
    }
}
