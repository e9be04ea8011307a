//! GPU geometry container
//!
//! A mesh owns an optional index buffer and one vertex buffer per description. Strides and
//! attribute offsets are derived from formats when left at zero, and the resulting vertex
//! bindings are kept for pipeline setup.

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::{BufferHandle, MeshHandle};
use crate::format::Format;
use crate::object::{DeviceObject, ObjectHeader, ObjectKind};
use crate::ownership::Ownership;
use crate::registry::Registry;
use crate::resources::buffer::{Buffer, BufferCreateInfo};
use crate::types::{BufferUsageFlags, IndexType, MemoryUsage, ResourceState};

/// Meaning of a vertex attribute, for debugging and shader matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum VertexSemantic {
    #[default]
    Undefined,
    Position,
    Normal,
    Color,
    Texcoord,
    Tangent,
    Bitangent,
}

/// Whether a binding advances per vertex or per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

/// One attribute inside a vertex buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshVertexAttribute {
    /// Attribute format
    pub format: Format,
    /// Bytes the attribute occupies, 0 to use the format size
    pub stride: u32,
    /// Byte offset inside the vertex, filled in during creation
    pub offset: u32,
    /// Optional meaning of the attribute
    pub semantic: VertexSemantic,
}

impl MeshVertexAttribute {
    /// Attribute with a format-derived stride
    pub const fn new(format: Format, semantic: VertexSemantic) -> Self {
        Self {
            format,
            stride: 0,
            offset: 0,
            semantic,
        }
    }
}

/// Layout of one vertex buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshVertexBufferDescription {
    /// Interleaved attributes
    pub attributes: Vec<MeshVertexAttribute>,
    /// Vertex stride, 0 to sum the attribute strides
    pub stride: u32,
    /// Step rate
    pub input_rate: VertexInputRate,
}

impl MeshVertexBufferDescription {
    /// Per-vertex buffer with derived stride
    pub fn new(attributes: Vec<MeshVertexAttribute>) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Fill in attribute strides, offsets and the vertex stride
    fn derive(&self) -> RhiResult<Self> {
        if self.attributes.is_empty() {
            return Err(RhiError::invalid_geometry("vertex buffer has no attributes"));
        }
        let mut derived = self.clone();
        let derive_stride = derived.stride == 0;
        let mut offset = 0;
        for attribute in &mut derived.attributes {
            if attribute.format.is_undefined() {
                return Err(RhiError::invalid_geometry("vertex attribute format is undefined"));
            }
            let size = attribute.format.bytes_per_texel();
            if size == 0 || (attribute.stride != 0 && attribute.stride < size) {
                return Err(RhiError::invalid_geometry(format!(
                    "vertex attribute stride {} is smaller than its {} format",
                    attribute.stride, attribute.format
                )));
            }
            if attribute.stride == 0 {
                attribute.stride = size;
            }
            attribute.offset = offset;
            offset += attribute.stride;
        }
        if derive_stride {
            derived.stride = offset;
        }
        Ok(derived)
    }
}

/// Attribute as seen by a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
    pub input_rate: VertexInputRate,
    pub semantic: VertexSemantic,
}

/// Vertex buffer binding as seen by a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

/// Description of a mesh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshCreateInfo {
    /// Index element type, `Undefined` for non-indexed meshes
    pub index_type: IndexType,
    /// Number of indices
    pub index_count: u32,
    /// Number of vertices
    pub vertex_count: u32,
    /// One description per vertex buffer
    pub vertex_buffers: Vec<MeshVertexBufferDescription>,
    /// Where buffer memory lives
    pub memory_usage: MemoryUsage,
    /// Ownership the created mesh takes
    pub ownership: Ownership,
}

/// Managed mesh
pub struct Mesh {
    header: ObjectHeader,
    create_info: MeshCreateInfo,
    index_buffer: Option<BufferHandle>,
    vertex_buffers: Vec<(BufferHandle, MeshVertexBufferDescription)>,
    derived_bindings: Vec<VertexBinding>,
}

impl Mesh {
    /// Index element type
    pub const fn index_type(&self) -> IndexType {
        self.create_info.index_type
    }

    /// Number of indices
    pub const fn index_count(&self) -> u32 {
        self.create_info.index_count
    }

    /// Number of vertices
    pub const fn vertex_count(&self) -> u32 {
        self.create_info.vertex_count
    }

    /// Index buffer, absent for non-indexed meshes
    pub const fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }

    /// Number of vertex buffers
    pub fn vertex_buffer_count(&self) -> usize {
        self.vertex_buffers.len()
    }

    /// Vertex buffer at `index`
    pub fn vertex_buffer(&self, index: usize) -> RhiResult<BufferHandle> {
        self.vertex_buffers
            .get(index)
            .map(|(buffer, _)| *buffer)
            .ok_or(RhiError::OutOfRange {
                index,
                count: self.vertex_buffers.len(),
            })
    }

    /// Derived layout of the vertex buffer at `index`
    pub fn vertex_buffer_description(&self, index: usize) -> RhiResult<&MeshVertexBufferDescription> {
        self.vertex_buffers
            .get(index)
            .map(|(_, description)| description)
            .ok_or(RhiError::OutOfRange {
                index,
                count: self.vertex_buffers.len(),
            })
    }

    /// Bindings for pipeline creation, attribute locations numbered across buffers
    pub fn derived_vertex_bindings(&self) -> &[VertexBinding] {
        &self.derived_bindings
    }

    fn validate(info: &MeshCreateInfo) -> RhiResult<Vec<MeshVertexBufferDescription>> {
        if info.index_count == 0 && info.vertex_count == 0 {
            return Err(RhiError::invalid_geometry("mesh has neither indices nor vertices"));
        }
        if info.vertex_count > 0 && info.vertex_buffers.is_empty() {
            return Err(RhiError::invalid_geometry("mesh has vertices but no vertex buffers"));
        }
        if info.index_count > 0 && info.index_type.size() == 0 {
            return Err(RhiError::invalid_geometry("mesh index type must be 16 or 32 bit"));
        }
        if info.vertex_count == 0 {
            return Ok(Vec::new());
        }
        info.vertex_buffers.iter().map(MeshVertexBufferDescription::derive).collect()
    }

    fn derive_bindings(&mut self) {
        let mut location = 0;
        self.derived_bindings = self
            .vertex_buffers
            .iter()
            .zip(0_u32..)
            .map(|((_, description), binding)| {
                let attributes = description
                    .attributes
                    .iter()
                    .map(|attribute| {
                        let derived = VertexAttribute {
                            location,
                            binding,
                            format: attribute.format,
                            offset: attribute.offset,
                            input_rate: description.input_rate,
                            semantic: attribute.semantic,
                        };
                        location += 1;
                        derived
                    })
                    .collect();
                VertexBinding {
                    binding,
                    stride: description.stride,
                    input_rate: description.input_rate,
                    attributes,
                }
            })
            .collect();
    }
}

impl DeviceObject for Mesh {
    type CreateInfo = MeshCreateInfo;
    type Handle = MeshHandle;
    const KIND: ObjectKind = ObjectKind::Mesh;

    fn allocate(device: &Device) -> RhiResult<Self> {
        Ok(Self {
            header: ObjectHeader::new(Self::KIND, device.weak()),
            create_info: MeshCreateInfo::default(),
            index_buffer: None,
            vertex_buffers: Vec::new(),
            derived_bindings: Vec::new(),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_info(&self) -> &MeshCreateInfo {
        &self.create_info
    }

    fn set_create_info(&mut self, info: MeshCreateInfo) {
        self.create_info = info;
    }

    fn create_api_objects(&mut self, device: &Device, info: &MeshCreateInfo) -> RhiResult<()> {
        let descriptions = Self::validate(info)?;

        if info.index_count > 0 {
            let buffer = BufferCreateInfo {
                size: u64::from(info.index_count) * u64::from(info.index_type.size()),
                usage: BufferUsageFlags::INDEX_BUFFER | BufferUsageFlags::TRANSFER_DST,
                memory_usage: info.memory_usage,
                initial_state: ResourceState::General,
                ownership: Ownership::Exclusive,
            };
            self.index_buffer = Some(device.create_object::<Buffer>(&buffer)?);
        }

        for description in descriptions {
            let buffer = BufferCreateInfo {
                size: u64::from(info.vertex_count) * u64::from(description.stride),
                usage: BufferUsageFlags::VERTEX_BUFFER | BufferUsageFlags::TRANSFER_DST,
                memory_usage: info.memory_usage,
                initial_state: ResourceState::General,
                ownership: Ownership::Exclusive,
            };
            let handle = device.create_object::<Buffer>(&buffer)?;
            self.vertex_buffers.push((handle, description));
        }

        self.derive_bindings();
        Ok(())
    }

    fn destroy_api_objects(&self, device: &Device) {
        if let Some(buffer) = self.index_buffer {
            device.destroy_owned::<Buffer>(buffer);
        }
        for &(buffer, _) in &self.vertex_buffers {
            device.destroy_owned::<Buffer>(buffer);
        }
    }

    fn registry(device: &Device) -> &Registry<MeshHandle, Self> {
        &device.registries().meshes
    }

    fn declared_ownership(info: &MeshCreateInfo) -> Ownership {
        info.ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn position_color() -> MeshVertexBufferDescription {
        MeshVertexBufferDescription::new(vec![
            MeshVertexAttribute::new(Format::R32G32B32Float, VertexSemantic::Position),
            MeshVertexAttribute::new(Format::R32G32B32A32Float, VertexSemantic::Color),
        ])
    }

    #[test]
    fn test_mesh_derives_layout() {
        let fixture = Fixture::new();
        let device = &fixture.device;
        let info = MeshCreateInfo {
            index_type: IndexType::Uint16,
            index_count: 36,
            vertex_count: 24,
            vertex_buffers: vec![
                position_color(),
                MeshVertexBufferDescription::new(vec![MeshVertexAttribute::new(
                    Format::R32G32Float,
                    VertexSemantic::Texcoord,
                )]),
            ],
            ..MeshCreateInfo::default()
        };

        let handle = device.create_mesh(&info).unwrap();
        let mesh = device.mesh(handle).unwrap();
        assert_eq!(mesh.vertex_buffer_count(), 2);

        let description = mesh.vertex_buffer_description(0).unwrap();
        assert_eq!(description.stride, 28);
        assert_eq!(description.attributes[1].offset, 12);

        let bindings = mesh.derived_vertex_bindings();
        assert_eq!(bindings[1].attributes[0].location, 2);
        assert_eq!(bindings[1].stride, 8);

        let index_buffer = device.buffer(mesh.index_buffer().unwrap()).unwrap();
        assert_eq!(index_buffer.size(), 72);
        let vertex_buffer = device.buffer(mesh.vertex_buffer(0).unwrap()).unwrap();
        assert_eq!(vertex_buffer.size(), 24 * 28);
        assert!(matches!(mesh.vertex_buffer(2), Err(RhiError::OutOfRange { index: 2, count: 2 })));

        device.destroy_mesh(handle);
        assert_eq!(device.registries().buffers.len(), 0);
    }

    #[test]
    fn test_invalid_geometry() {
        let fixture = Fixture::new();
        let device = &fixture.device;

        let empty = MeshCreateInfo::default();
        assert!(matches!(device.create_mesh(&empty), Err(RhiError::InvalidGeometry { .. })));

        let no_buffers = MeshCreateInfo {
            vertex_count: 3,
            ..MeshCreateInfo::default()
        };
        assert!(matches!(device.create_mesh(&no_buffers), Err(RhiError::InvalidGeometry { .. })));

        let bad_index = MeshCreateInfo {
            index_count: 3,
            index_type: IndexType::Undefined,
            ..MeshCreateInfo::default()
        };
        assert!(matches!(device.create_mesh(&bad_index), Err(RhiError::InvalidGeometry { .. })));

        let mut narrow = position_color();
        narrow.attributes[0].stride = 4;
        let bad_stride = MeshCreateInfo {
            vertex_count: 3,
            vertex_buffers: vec![narrow],
            ..MeshCreateInfo::default()
        };
        assert!(matches!(device.create_mesh(&bad_stride), Err(RhiError::InvalidGeometry { .. })));

        assert_eq!(device.registries().meshes.len(), 0);
        assert_eq!(device.registries().buffers.len(), 0);
    }

    #[test]
    fn test_failed_buffer_leaves_no_mesh() {
        let fixture = Fixture::new();
        let info = MeshCreateInfo {
            vertex_count: 4,
            vertex_buffers: vec![position_color(), position_color()],
            ..MeshCreateInfo::default()
        };
        fixture.backend.fail_next_create(ObjectKind::Buffer);
        assert!(fixture.device.create_mesh(&info).is_err());
        assert_eq!(fixture.device.registries().meshes.len(), 0);
        assert_eq!(fixture.backend.live_count(ObjectKind::Buffer), 0);

        let handle = fixture.device.create_mesh(&info).unwrap();
        assert_eq!(fixture.device.registries().buffers.len(), 2);
        fixture.device.destroy_mesh(handle);
        assert_eq!(fixture.backend.live_count(ObjectKind::Buffer), 0);
    }
}
