//! Full-screen draw helper
//!
//! Bundles a pipeline interface and a graphics pipeline that draws a single screen-covering
//! triangle with depth testing off. Both are owned by the quad.

use crate::device::Device;
use crate::error::RhiResult;
use crate::foundation::collections::{
    DescriptorSetLayoutHandle, FullscreenQuadHandle, GraphicsPipelineHandle, PipelineInterfaceHandle,
    ShaderModuleHandle,
};
use crate::format::Format;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::pipeline::{
    GraphicsPipeline, GraphicsPipelineCreateInfo, PipelineInterface, PipelineInterfaceCreateInfo,
    PrimitiveTopology,
};
use crate::types::SampleCount;

/// Vertices drawn by a full-screen quad
pub const FULLSCREEN_VERTEX_COUNT: u32 = 3;

/// Description of a full-screen quad
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullscreenQuadCreateInfo {
    /// Vertex shader generating the covering triangle
    pub vertex_shader: ShaderModuleHandle,
    /// Pixel shader
    pub pixel_shader: ShaderModuleHandle,
    /// Set layouts in set-number order
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    /// Formats of the targets drawn into
    pub render_target_formats: Vec<Format>,
    /// Depth/stencil format of the pass, undefined when absent
    pub depth_stencil_format: Format,
    /// Ownership the created quad takes
    pub ownership: Ownership,
}

/// Managed full-screen quad
pub struct FullscreenQuad {
    header: ObjectHeader,
    create_info: FullscreenQuadCreateInfo,
    interface: Option<PipelineInterfaceHandle>,
    pipeline: Option<GraphicsPipelineHandle>,
}

impl FullscreenQuad {
    /// Pipeline interface, present once created
    pub const fn pipeline_interface(&self) -> Option<PipelineInterfaceHandle> {
        self.interface
    }

    /// Graphics pipeline, present once created
    pub const fn pipeline(&self) -> Option<GraphicsPipelineHandle> {
        self.pipeline
    }

    /// Number of vertices to draw
    pub const fn vertex_count(&self) -> u32 {
        FULLSCREEN_VERTEX_COUNT
    }
}

impl DeviceObject for FullscreenQuad {
    type CreateInfo = FullscreenQuadCreateInfo;
    type Handle = FullscreenQuadHandle;
    const KIND: ObjectKind = ObjectKind::FullscreenQuad;

    fn allocate(device: &Device) -> RhiResult<Self> {
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: FullscreenQuadCreateInfo::default(),
            interface: None,
            pipeline: None,
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &FullscreenQuadCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: FullscreenQuadCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &FullscreenQuadCreateInfo) -> RhiResult<()> {
        let interface = device.create_object::<PipelineInterface>(&PipelineInterfaceCreateInfo {
            set_layouts: info.set_layouts.clone(),
            push_constant_count: 0,
            ownership: Ownership::Exclusive,
        })?;
        self.interface = Some(interface);

        let pipeline = device.create_object::<GraphicsPipeline>(&GraphicsPipelineCreateInfo {
            interface,
            vertex_shader: info.vertex_shader,
            pixel_shader: Some(info.pixel_shader),
            topology: PrimitiveTopology::TriangleList,
            render_target_formats: info.render_target_formats.clone(),
            depth_stencil_format: info.depth_stencil_format,
            sample_count: SampleCount::Count1,
            ownership: Ownership::Exclusive,
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn destroy_api_objects(&self, device: &Device) {
        if let Some(pipeline) = self.pipeline {
            device.destroy_owned::<GraphicsPipeline>(pipeline);
        }
        if let Some(interface) = self.interface {
            device.destroy_owned::<PipelineInterface>(interface);
        }
    }

    fn registry(device: &Device) -> &Registry<FullscreenQuadHandle, Self> {
        &device.registries().fullscreen_quads
    }

    fn declared_ownership(info: &FullscreenQuadCreateInfo) -> Ownership {
        info.ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::shader::ShaderModuleCreateInfo;
    use crate::testing::Fixture;

    fn quad_info(device: &Device) -> FullscreenQuadCreateInfo {
        FullscreenQuadCreateInfo {
            vertex_shader: device.create_shader_module(&ShaderModuleCreateInfo::new(vec![1, 2, 3, 4])).unwrap(),
            pixel_shader: device.create_shader_module(&ShaderModuleCreateInfo::new(vec![5, 6, 7, 8])).unwrap(),
            render_target_formats: vec![Format::R8G8B8A8Unorm],
            ..FullscreenQuadCreateInfo::default()
        }
    }

    #[test]
    fn test_quad_owns_pipeline() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let handle = device.create_fullscreen_quad(&quad_info(device)).unwrap();

        let quad = device.fullscreen_quad(handle).unwrap();
        let pipeline = device.graphics_pipeline(quad.pipeline().unwrap()).unwrap();
        assert_eq!(pipeline.render_target_formats(), &[Format::R8G8B8A8Unorm]);
        assert_eq!(pipeline.ownership(), Ownership::Exclusive);
        assert_eq!(quad.vertex_count(), 3);

        device.destroy_fullscreen_quad(handle);
        assert_eq!(device.registries().graphics_pipelines.len(), 0);
        assert_eq!(device.registries().pipeline_interfaces.len(), 0);
        assert_eq!(device.registries().shader_modules.len(), 2);
    }

    #[test]
    fn test_failed_pipeline_releases_interface() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let info = quad_info(device);

        fixture.backend.fail_next_create(ObjectKind::GraphicsPipeline);
        assert!(device.create_fullscreen_quad(&info).is_err());
        assert_eq!(device.registries().pipeline_interfaces.len(), 0);
        assert_eq!(device.registries().fullscreen_quads.len(), 0);
    }
}
