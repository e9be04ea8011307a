//! Pipeline interfaces and pipelines

use crate::backend::ApiObjectDesc;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{
    ComputePipelineHandle, DescriptorSetLayoutHandle, GraphicsPipelineHandle, PipelineInterfaceHandle,
    ShaderModuleHandle,
};
use crate::format::Format;
use crate::object::ObjectKind;
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::{Resource, ResourceInfo};
use crate::types::{SampleCount, MAX_RENDER_TARGETS};

/// Description of a pipeline interface: the set layouts and push constants shaders see
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineInterfaceCreateInfo {
    /// Set layouts in set-number order
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    /// Number of 32-bit push constants
    pub push_constant_count: u32,
    /// Ownership the created interface takes
    pub ownership: Ownership,
}

impl ResourceInfo for PipelineInterfaceCreateInfo {
    type Handle = PipelineInterfaceHandle;
    const KIND: ObjectKind = ObjectKind::PipelineInterface;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if let Some(index) = self
            .set_layouts
            .iter()
            .position(|&layout| device.descriptor_set_layout(layout).is_none())
        {
            return Err(RhiError::null_argument(format!("pipeline interface set layout {index}")));
        }
        Ok(ApiObjectDesc::PipelineInterface(self))
    }

    fn registry(device: &Device) -> &Registry<PipelineInterfaceHandle, PipelineInterface> {
        &device.registries().pipeline_interfaces
    }
}

/// Managed pipeline interface
pub type PipelineInterface = Resource<PipelineInterfaceCreateInfo>;

impl PipelineInterface {
    /// Set layouts in set-number order
    pub fn set_layouts(&self) -> &[DescriptorSetLayoutHandle] {
        &self.create_info.set_layouts
    }

    /// Number of 32-bit push constants
    pub fn push_constant_count(&self) -> u32 {
        self.create_info.push_constant_count
    }
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Description of a graphics pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct GraphicsPipelineCreateInfo {
    pub interface: PipelineInterfaceHandle,
    pub vertex_shader: ShaderModuleHandle,
    /// Absent for depth-only pipelines
    pub pixel_shader: Option<ShaderModuleHandle>,
    pub topology: PrimitiveTopology,
    pub render_target_formats: Vec<Format>,
    pub depth_stencil_format: Format,
    pub sample_count: SampleCount,
    pub ownership: Ownership,
}

impl ResourceInfo for GraphicsPipelineCreateInfo {
    type Handle = GraphicsPipelineHandle;
    const KIND: ObjectKind = ObjectKind::GraphicsPipeline;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if device.pipeline_interface(self.interface).is_none() {
            return Err(RhiError::null_argument("graphics pipeline interface"));
        }
        if device.shader_module(self.vertex_shader).is_none() {
            return Err(RhiError::null_argument("graphics pipeline vertex shader"));
        }
        if matches!(self.pixel_shader, Some(ps) if device.shader_module(ps).is_none()) {
            return Err(RhiError::null_argument("graphics pipeline pixel shader"));
        }
        if self.render_target_formats.len() > MAX_RENDER_TARGETS {
            return Err(RhiError::invalid_create_argument(format!(
                "graphics pipeline has {} render targets, at most {MAX_RENDER_TARGETS} are supported",
                self.render_target_formats.len()
            )));
        }
        if let Some(format) = self
            .render_target_formats
            .iter()
            .find(|format| format.is_undefined() || format.has_depth() || format.has_stencil())
        {
            return Err(RhiError::invalid_create_argument(format!(
                "graphics pipeline render target format {format} is not a color format"
            )));
        }
        Ok(ApiObjectDesc::GraphicsPipeline(self))
    }

    fn registry(device: &Device) -> &Registry<GraphicsPipelineHandle, GraphicsPipeline> {
        &device.registries().graphics_pipelines
    }
}

/// Managed graphics pipeline
pub type GraphicsPipeline = Resource<GraphicsPipelineCreateInfo>;

impl GraphicsPipeline {
    /// Interface the pipeline was built against
    pub fn interface(&self) -> PipelineInterfaceHandle {
        self.create_info.interface
    }

    /// Render target formats
    pub fn render_target_formats(&self) -> &[Format] {
        &self.create_info.render_target_formats
    }

    /// Depth/stencil format, undefined when absent
    pub fn depth_stencil_format(&self) -> Format {
        self.create_info.depth_stencil_format
    }
}

/// Description of a compute pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ComputePipelineCreateInfo {
    pub interface: PipelineInterfaceHandle,
    pub compute_shader: ShaderModuleHandle,
    pub ownership: Ownership,
}

impl ResourceInfo for ComputePipelineCreateInfo {
    type Handle = ComputePipelineHandle;
    const KIND: ObjectKind = ObjectKind::ComputePipeline;

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn describe<'a>(&'a self, device: &Device) -> RhiResult<ApiObjectDesc<'a>> {
        if device.pipeline_interface(self.interface).is_none() {
            return Err(RhiError::null_argument("compute pipeline interface"));
        }
        if device.shader_module(self.compute_shader).is_none() {
            return Err(RhiError::null_argument("compute pipeline shader"));
        }
        Ok(ApiObjectDesc::ComputePipeline(self))
    }

    fn registry(device: &Device) -> &Registry<ComputePipelineHandle, ComputePipeline> {
        &device.registries().compute_pipelines
    }
}

/// Managed compute pipeline
pub type ComputePipeline = Resource<ComputePipelineCreateInfo>;

impl ComputePipeline {
    /// Interface the pipeline was built against
    pub fn interface(&self) -> PipelineInterfaceHandle {
        self.create_info.interface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::shader::ShaderModuleCreateInfo;
    use crate::testing::Fixture;

    #[test]
    fn test_pipeline_requires_live_interface() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let shader = device
            .create_shader_module(&ShaderModuleCreateInfo::new(vec![1, 2, 3, 4]))
            .unwrap();

        let info = ComputePipelineCreateInfo {
            interface: PipelineInterfaceHandle::default(),
            compute_shader: shader,
            ownership: Ownership::Reference,
        };
        let err = device.create_compute_pipeline(&info).unwrap_err();
        assert!(matches!(err, RhiError::UnexpectedNullArgument { .. }));

        let interface = device
            .create_pipeline_interface(&PipelineInterfaceCreateInfo::default())
            .unwrap();
        let handle = device
            .create_compute_pipeline(&ComputePipelineCreateInfo { interface, ..info })
            .unwrap();
        assert_eq!(device.compute_pipeline(handle).unwrap().interface(), interface);
    }

    #[test]
    fn test_graphics_pipeline_rejects_depth_as_color() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let shader = device
            .create_shader_module(&ShaderModuleCreateInfo::new(vec![1, 2, 3, 4]))
            .unwrap();
        let interface = device
            .create_pipeline_interface(&PipelineInterfaceCreateInfo::default())
            .unwrap();

        let info = GraphicsPipelineCreateInfo {
            interface,
            vertex_shader: shader,
            pixel_shader: Some(shader),
            render_target_formats: vec![Format::D32Float],
            ..GraphicsPipelineCreateInfo::default()
        };
        assert!(matches!(
            device.create_graphics_pipeline(&info),
            Err(RhiError::InvalidCreateArgument { .. })
        ));
    }
}
