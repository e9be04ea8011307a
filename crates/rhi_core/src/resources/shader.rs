//! Shader modules

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::ShaderModuleHandle;
use crate::object::ObjectKind;
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};

/// Description of a shader module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderModuleCreateInfo {
    /// Compiled shader bytecode
    pub code: Vec<u8>,
    /// Entry point name
    pub entry_point: String,
    /// Ownership the created module takes
    pub ownership: Ownership,
}

impl ShaderModuleCreateInfo {
    /// Module with a `main` entry point
    pub fn new(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            entry_point: "main".to_string(),
            ownership: Ownership::Reference,
        }
    }
}

impl ResourceInfo for ShaderModuleCreateInfo {
    type Handle = ShaderModuleHandle;
    const KIND: ObjectKind = ObjectKind::ShaderModule;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if self.code.is_empty() {
            return Err(RhiError::invalid_create_argument("shader module code is empty"));
        }
        Ok(ApiObjectDesc::ShaderModule(self))
    }

    fn registry(device: &Device) -> &Registry<ShaderModuleHandle, ShaderModule> {
        &device.registries().shader_modules
    }
}

/// Managed shader module
pub type ShaderModule = Resource<ShaderModuleCreateInfo>;

impl ShaderModule {
    /// Size of the bytecode in bytes
    pub fn code_size(&self) -> usize {
        self.create_info.code.len()
    }

    /// Entry point name
    pub fn entry_point(&self) -> &str {
        &self.create_info.entry_point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_empty_code_rejected() {
        let fixture = Fixture::new();
        let err = fixture
            .device
            .create_shader_module(&ShaderModuleCreateInfo::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, RhiError::InvalidCreateArgument { .. }));

        let handle = fixture
            .device
            .create_shader_module(&ShaderModuleCreateInfo::new(vec![0x03, 0x02, 0x23, 0x07]))
            .unwrap();
        assert_eq!(fixture.device.shader_module(handle).unwrap().entry_point(), "main");
    }
}
