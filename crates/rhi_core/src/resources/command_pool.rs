//! Command pools

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::RhiResult;
use crate::foundation::collections::CommandPoolHandle;
use crate::object::ObjectKind;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};
use crate::types::CommandType;

/// Description of a command pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandPoolCreateInfo {
    /// Queue capability the pool's buffers are submitted to
    pub command_type: CommandType,
}

impl ResourceInfo for CommandPoolCreateInfo {
    type Handle = CommandPoolHandle;
    const KIND: ObjectKind = ObjectKind::CommandPool;

    fn describe<'a>(&'a self, _device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        Ok(ApiObjectDesc::CommandPool(self))
    }

    fn registry(device: &Device) -> &Registry<CommandPoolHandle, CommandPool> {
        &device.registries().command_pools
    }
}

/// Managed command pool
pub type CommandPool = Resource<CommandPoolCreateInfo>;

impl CommandPool {
    /// Queue capability of the pool
    pub fn command_type(&self) -> CommandType {
        self.create_info.command_type
    }
}
