//! Descriptor pools, set layouts and sets

use std::collections::HashSet;

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle};
use crate::object::ObjectKind;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};

/// Kind of resource a descriptor binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
    Sampler,
}

/// One binding slot in a set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    /// Binding number, unique within the layout
    pub binding: u32,
    /// Resource kind bound here
    pub descriptor_type: DescriptorType,
    /// Array size of the binding
    pub count: u32,
}

impl DescriptorBinding {
    /// Single-descriptor binding
    pub const fn new(binding: u32, descriptor_type: DescriptorType) -> Self {
        Self {
            binding,
            descriptor_type,
            count: 1,
        }
    }
}

/// Description of a descriptor pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DescriptorPoolCreateInfo {
    pub max_sets: u32,
    pub uniform_buffer_count: u32,
    pub storage_buffer_count: u32,
    pub sampled_image_count: u32,
    pub storage_image_count: u32,
    pub sampler_count: u32,
}

impl DescriptorPoolCreateInfo {
    /// Pool sized for `max_sets` sets of up to `per_set` descriptors of every type
    pub const fn uniform(max_sets: u32, per_set: u32) -> Self {
        let count = max_sets.saturating_mul(per_set);
        Self {
            max_sets,
            uniform_buffer_count: count,
            storage_buffer_count: count,
            sampled_image_count: count,
            storage_image_count: count,
            sampler_count: count,
        }
    }
}

impl ResourceInfo for DescriptorPoolCreateInfo {
    type Handle = DescriptorPoolHandle;
    const KIND: ObjectKind = ObjectKind::DescriptorPool;

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if self.max_sets == 0 {
            return Err(RhiError::invalid_create_argument("descriptor pool max sets must be non-zero"));
        }
        Ok(ApiObjectDesc::DescriptorPool(self))
    }

    fn registry(device: &Device) -> &Registry<DescriptorPoolHandle, DescriptorPool> {
        &device.registries().descriptor_pools
    }
}

/// Managed descriptor pool
pub type DescriptorPool = Resource<DescriptorPoolCreateInfo>;

impl DescriptorPool {
    /// Maximum number of sets the pool can hold
    pub fn max_sets(&self) -> u32 {
        self.create_info.max_sets
    }
}

/// Description of a descriptor set layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutCreateInfo {
    /// Binding slots
    pub bindings: Vec<DescriptorBinding>,
    /// Descriptors are pushed while recording rather than allocated from a pool
    pub pushable: bool,
}

impl ResourceInfo for DescriptorSetLayoutCreateInfo {
    type Handle = DescriptorSetLayoutHandle;
    const KIND: ObjectKind = ObjectKind::DescriptorSetLayout;

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if binding.count == 0 {
                return Err(RhiError::invalid_create_argument(format!(
                    "descriptor binding {} has a zero count",
                    binding.binding
                )));
            }
            if !seen.insert(binding.binding) {
                return Err(RhiError::invalid_create_argument(format!(
                    "descriptor binding {} declared twice",
                    binding.binding
                )));
            }
        }
        Ok(ApiObjectDesc::DescriptorSetLayout(self))
    }

    fn registry(device: &Device) -> &Registry<DescriptorSetLayoutHandle, DescriptorSetLayout> {
        &device.registries().descriptor_set_layouts
    }
}

/// Managed descriptor set layout
pub type DescriptorSetLayout = Resource<DescriptorSetLayoutCreateInfo>;

impl DescriptorSetLayout {
    /// Binding slots
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.create_info.bindings
    }

    /// True for push-descriptor layouts
    pub fn is_pushable(&self) -> bool {
        self.create_info.pushable
    }
}

/// Description of a descriptor set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorSetCreateInfo {
    /// Pool the set is allocated from
    pub pool: DescriptorPoolHandle,
    /// Layout of the set
    pub layout: DescriptorSetLayoutHandle,
}

impl ResourceInfo for DescriptorSetCreateInfo {
    type Handle = DescriptorSetHandle;
    const KIND: ObjectKind = ObjectKind::DescriptorSet;

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        let pool = device
            .descriptor_pool(self.pool)
            .ok_or_else(|| RhiError::null_argument("descriptor set pool"))?;
        let layout = device
            .descriptor_set_layout(self.layout)
            .ok_or_else(|| RhiError::null_argument("descriptor set layout"))?;
        if layout.is_pushable() {
            return Err(RhiError::OperationNotPermitted {
                reason: "descriptor sets cannot be allocated from a pushable layout".to_string(),
            });
        }
        Ok(ApiObjectDesc::DescriptorSet {
            info: self,
            pool: pool.native_handle(),
            layout: layout.native_handle(),
        })
    }

    fn registry(device: &Device) -> &Registry<DescriptorSetHandle, DescriptorSet> {
        &device.registries().descriptor_sets
    }
}

/// Managed descriptor set
pub type DescriptorSet = Resource<DescriptorSetCreateInfo>;

impl DescriptorSet {
    /// Pool the set was allocated from
    pub fn pool(&self) -> DescriptorPoolHandle {
        self.create_info.pool
    }

    /// Layout of the set
    pub fn layout(&self) -> DescriptorSetLayoutHandle {
        self.create_info.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn layout(pushable: bool) -> DescriptorSetLayoutCreateInfo {
        DescriptorSetLayoutCreateInfo {
            bindings: vec![
                DescriptorBinding::new(0, DescriptorType::UniformBuffer),
                DescriptorBinding::new(1, DescriptorType::SampledImage),
            ],
            pushable,
        }
    }

    #[test]
    fn test_allocate_and_free_set() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let pool = device
            .create_descriptor_pool(&DescriptorPoolCreateInfo::uniform(4, 8))
            .unwrap();
        let layout = device.create_descriptor_set_layout(&layout(false)).unwrap();

        let set = device.allocate_descriptor_set(pool, layout).unwrap();
        assert_eq!(device.descriptor_set(set).unwrap().pool(), pool);
        device.free_descriptor_set(set);
        assert!(device.descriptor_set(set).is_none());
    }

    #[test]
    fn test_pushable_layout_rejected() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let pool = device
            .create_descriptor_pool(&DescriptorPoolCreateInfo::uniform(1, 1))
            .unwrap();
        let layout = device.create_descriptor_set_layout(&layout(true)).unwrap();

        let err = device.allocate_descriptor_set(pool, layout).unwrap_err();
        assert!(matches!(err, RhiError::OperationNotPermitted { .. }));
        assert_eq!(device.registries().descriptor_sets.len(), 0);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let fixture = Fixture::new();
        let info = DescriptorSetLayoutCreateInfo {
            bindings: vec![
                DescriptorBinding::new(2, DescriptorType::Sampler),
                DescriptorBinding::new(2, DescriptorType::StorageImage),
            ],
            pushable: false,
        };
        assert!(fixture.device.create_descriptor_set_layout(&info).is_err());
    }
}
