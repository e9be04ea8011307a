//! Vulkan translation of resource-layer value types
//!
//! Pure conversions from the API-neutral enums and create infos into `ash` structures. A Vulkan
//! backend builds its native objects from these; nothing here touches a live device.

use ash::vk;

use crate::command::RenderPassBeginInfo;
use crate::format::Format;
use crate::pass::render_pass::RenderPassLayout;
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, BufferUsageFlags, ImageUsageFlags, ImageViewType, ResourceState, SampleCount,
};

/// Vulkan format for `format`
pub const fn to_vk_format(format: Format) -> vk::Format {
    match format {
        Format::Undefined => vk::Format::UNDEFINED,
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8G8Unorm => vk::Format::R8G8_UNORM,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R16Uint => vk::Format::R16_UINT,
        Format::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32Uint => vk::Format::R32_UINT,
        Format::R32Float => vk::Format::R32_SFLOAT,
        Format::R32G32Float => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32Float => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        Format::D16Unorm => vk::Format::D16_UNORM,
        Format::D32Float => vk::Format::D32_SFLOAT,
        Format::S8Uint => vk::Format::S8_UINT,
        Format::D16UnormS8Uint => vk::Format::D16_UNORM_S8_UINT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Image layout an image must be in for `state`
pub const fn to_vk_image_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Undefined => vk::ImageLayout::UNDEFINED,
        // Buffer states carry no layout
        ResourceState::General
        | ResourceState::ConstantBuffer
        | ResourceState::VertexBuffer
        | ResourceState::IndexBuffer
        | ResourceState::UnorderedAccess => vk::ImageLayout::GENERAL,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthStencilRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::DepthStencilWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWriteStencilRead => vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::DepthReadStencilWrite => vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceState::CopySrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::CopyDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Vulkan load op
pub const fn to_vk_load_op(op: AttachmentLoadOp) -> vk::AttachmentLoadOp {
    match op {
        AttachmentLoadOp::Load => vk::AttachmentLoadOp::LOAD,
        AttachmentLoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        AttachmentLoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

/// Vulkan store op
pub const fn to_vk_store_op(op: AttachmentStoreOp) -> vk::AttachmentStoreOp {
    match op {
        AttachmentStoreOp::Store => vk::AttachmentStoreOp::STORE,
        AttachmentStoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

/// Vulkan sample count flag
pub const fn to_vk_sample_count(count: SampleCount) -> vk::SampleCountFlags {
    match count {
        SampleCount::Count1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::Count2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::Count4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::Count8 => vk::SampleCountFlags::TYPE_8,
        SampleCount::Count16 => vk::SampleCountFlags::TYPE_16,
    }
}

/// Vulkan view type, `None` for [`ImageViewType::Undefined`]
pub const fn to_vk_image_view_type(view_type: ImageViewType) -> Option<vk::ImageViewType> {
    match view_type {
        ImageViewType::Undefined => None,
        ImageViewType::Type1D => Some(vk::ImageViewType::TYPE_1D),
        ImageViewType::Type1DArray => Some(vk::ImageViewType::TYPE_1D_ARRAY),
        ImageViewType::Type2D => Some(vk::ImageViewType::TYPE_2D),
        ImageViewType::Type2DArray => Some(vk::ImageViewType::TYPE_2D_ARRAY),
        ImageViewType::Type3D => Some(vk::ImageViewType::TYPE_3D),
        ImageViewType::Cube => Some(vk::ImageViewType::CUBE),
        ImageViewType::CubeArray => Some(vk::ImageViewType::CUBE_ARRAY),
    }
}

/// Vulkan image usage flags
pub fn to_vk_image_usage(usage: ImageUsageFlags) -> vk::ImageUsageFlags {
    let pairs = [
        (ImageUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (ImageUsageFlags::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (ImageUsageFlags::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (ImageUsageFlags::STORAGE, vk::ImageUsageFlags::STORAGE),
        (ImageUsageFlags::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
        (ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    ];
    pairs
        .iter()
        .filter(|(flag, _)| usage.contains(*flag))
        .fold(vk::ImageUsageFlags::empty(), |acc, (_, vk_flag)| acc | *vk_flag)
}

/// Vulkan buffer usage flags
pub fn to_vk_buffer_usage(usage: BufferUsageFlags) -> vk::BufferUsageFlags {
    let pairs = [
        (BufferUsageFlags::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsageFlags::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsageFlags::UNIFORM_BUFFER, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsageFlags::STORAGE_BUFFER, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsageFlags::INDEX_BUFFER, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsageFlags::VERTEX_BUFFER, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsageFlags::INDIRECT_BUFFER, vk::BufferUsageFlags::INDIRECT_BUFFER),
    ];
    pairs
        .iter()
        .filter(|(flag, _)| usage.contains(*flag))
        .fold(vk::BufferUsageFlags::empty(), |acc, (_, vk_flag)| acc | *vk_flag)
}

/// Attachment descriptions for a render pass, render targets first
///
/// Attachments stay in their working layout for the whole pass; transitions in and out are
/// recorded explicitly by the command buffer.
pub fn attachment_descriptions(layout: &RenderPassLayout) -> Vec<vk::AttachmentDescription> {
    let samples = to_vk_sample_count(layout.sample_count);
    let mut attachments: Vec<vk::AttachmentDescription> = layout
        .render_target_formats
        .iter()
        .enumerate()
        .map(|(index, &format)| {
            let load_op = layout.render_target_load_ops.get(index).copied().unwrap_or_default();
            let store_op = layout.render_target_store_ops.get(index).copied().unwrap_or_default();
            vk::AttachmentDescription::builder()
                .format(to_vk_format(format))
                .samples(samples)
                .load_op(to_vk_load_op(load_op))
                .store_op(to_vk_store_op(store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build()
        })
        .collect();

    if layout.has_depth_stencil() {
        let depth_layout = to_vk_image_layout(layout.depth_stencil_state);
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(to_vk_format(layout.depth_stencil_format))
                .samples(samples)
                .load_op(to_vk_load_op(layout.depth_load_op))
                .store_op(to_vk_store_op(layout.depth_store_op))
                .stencil_load_op(to_vk_load_op(layout.stencil_load_op))
                .stencil_store_op(to_vk_store_op(layout.stencil_store_op))
                .initial_layout(depth_layout)
                .final_layout(depth_layout)
                .build(),
        );
    }

    attachments
}

/// Color and depth/stencil references for the single subpass
pub fn subpass_references(
    layout: &RenderPassLayout,
) -> (Vec<vk::AttachmentReference>, Option<vk::AttachmentReference>) {
    let color: Vec<vk::AttachmentReference> = (0..layout.render_target_formats.len())
        .map(|index| {
            vk::AttachmentReference::builder()
                .attachment(index as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build()
        })
        .collect();

    let depth = layout.has_depth_stencil().then(|| {
        vk::AttachmentReference::builder()
            .attachment(color.len() as u32)
            .layout(to_vk_image_layout(layout.depth_stencil_state))
            .build()
    });

    (color, depth)
}

/// Clear values in attachment order
pub fn clear_values(begin_info: &RenderPassBeginInfo, has_depth_stencil: bool) -> Vec<vk::ClearValue> {
    let mut values: Vec<vk::ClearValue> = begin_info
        .render_target_clear_values
        .iter()
        .map(|clear| vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [clear.r, clear.g, clear.b, clear.a],
            },
        })
        .collect();

    if has_depth_stencil {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: begin_info.depth_stencil_clear_value.depth,
                stencil: begin_info.depth_stencil_clear_value.stencil,
            },
        });
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_with_depth() -> RenderPassLayout {
        RenderPassLayout {
            render_target_formats: vec![Format::R8G8B8A8Unorm, Format::R16G16B16A16Float],
            render_target_load_ops: vec![AttachmentLoadOp::Clear],
            render_target_store_ops: vec![AttachmentStoreOp::Store, AttachmentStoreOp::DontCare],
            depth_stencil_format: Format::D24UnormS8Uint,
            depth_load_op: AttachmentLoadOp::Clear,
            depth_store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::DontCare,
            stencil_store_op: AttachmentStoreOp::DontCare,
            depth_stencil_state: ResourceState::DepthStencilWrite,
            sample_count: SampleCount::Count4,
        }
    }

    #[test]
    fn test_attachment_descriptions() {
        let attachments = attachment_descriptions(&layout_with_depth());
        assert_eq!(attachments.len(), 3);
        assert_eq!(attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        // Missing load op falls back to Load
        assert_eq!(attachments[1].load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachments[2].format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(attachments[2].final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert!(attachments.iter().all(|a| a.samples == vk::SampleCountFlags::TYPE_4));
    }

    #[test]
    fn test_subpass_references() {
        let (color, depth) = subpass_references(&layout_with_depth());
        assert_eq!(color.len(), 2);
        assert_eq!(depth.map(|d| d.attachment), Some(2));

        let mut layout = layout_with_depth();
        layout.depth_stencil_format = Format::Undefined;
        assert!(subpass_references(&layout).1.is_none());
        assert_eq!(attachment_descriptions(&layout).len(), 2);
    }

    #[test]
    fn test_flag_conversions() {
        let usage = to_vk_image_usage(ImageUsageFlags::SAMPLED | ImageUsageFlags::COLOR_ATTACHMENT);
        assert_eq!(usage, vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT);
        assert_eq!(to_vk_buffer_usage(BufferUsageFlags::empty()), vk::BufferUsageFlags::empty());
        assert_eq!(to_vk_image_view_type(ImageViewType::Undefined), None);
        assert_eq!(
            to_vk_image_layout(ResourceState::DepthReadStencilWrite),
            vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL
        );
    }
}
