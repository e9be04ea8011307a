//! Texture samplers

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::SamplerHandle;
use crate::object::ObjectKind;
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};

/// Texel filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Behavior outside the `[0, 1]` texture coordinate range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Description of a sampler
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct SamplerCreateInfo {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: Filter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mip_lod_bias: f32,
    pub anisotropy: Option<f32>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub ownership: Ownership,
}

impl Default for SamplerCreateInfo {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: Filter::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            mip_lod_bias: 0.0,
            anisotropy: None,
            min_lod: 0.0,
            max_lod: f32::MAX,
            ownership: Ownership::Reference,
        }
    }
}

impl SamplerCreateInfo {
    /// Sampler that clamps on every axis with the given filter
    pub fn clamped(filter: Filter) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            mipmap_mode: filter,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            ..Self::default()
        }
    }
}

impl ResourceInfo for SamplerCreateInfo {
    type Handle = SamplerHandle;
    const KIND: ObjectKind = ObjectKind::Sampler;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if self.min_lod > self.max_lod {
            return Err(RhiError::invalid_create_argument(format!(
                "sampler min lod {} exceeds max lod {}",
                self.min_lod, self.max_lod
            )));
        }
        if matches!(self.anisotropy, Some(max) if max < 1.0) {
            return Err(RhiError::invalid_create_argument("sampler anisotropy must be at least 1"));
        }
        Ok(ApiObjectDesc::Sampler(self))
    }

    fn registry(device: &Device) -> &Registry<SamplerHandle, Sampler> {
        &device.registries().samplers
    }
}

/// Managed sampler
pub type Sampler = Resource<SamplerCreateInfo>;

impl Sampler {
    /// Magnification and minification filters
    pub fn filters(&self) -> (Filter, Filter) {
        (self.create_info.mag_filter, self.create_info.min_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_lod_range_validated() {
        let fixture = Fixture::new();
        let info = SamplerCreateInfo {
            min_lod: 4.0,
            max_lod: 1.0,
            ..SamplerCreateInfo::default()
        };
        assert!(fixture.device.create_sampler(&info).is_err());

        let handle = fixture.device.create_sampler(&SamplerCreateInfo::clamped(Filter::Nearest)).unwrap();
        let sampler = fixture.device.sampler(handle).unwrap();
        assert_eq!(sampler.filters(), (Filter::Nearest, Filter::Nearest));
    }
}
