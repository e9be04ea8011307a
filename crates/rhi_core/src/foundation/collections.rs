//! Handle types for registry-managed objects
//!
//! Each resource kind gets its own generational slot-map key so a stale handle can never be
//! confused with a live object of another kind. A handle outliving its object simply fails
//! the generation check on lookup.

pub use slotmap::{Key, SlotMap};

slotmap::new_key_type! {
    /// Handle to a [`Device`](crate::device::Device) owned by an instance
    pub struct DeviceHandle;
    /// Handle to a [`Queue`](crate::queue::Queue)
    pub struct QueueHandle;
    /// Handle to a [`DrawPass`](crate::pass::draw_pass::DrawPass)
    pub struct DrawPassHandle;
    /// Handle to a [`FullscreenQuad`](crate::resources::fullscreen_quad::FullscreenQuad)
    pub struct FullscreenQuadHandle;
    /// Handle to a [`Texture`](crate::resources::texture::Texture)
    pub struct TextureHandle;
    /// Handle to a [`Mesh`](crate::resources::mesh::Mesh)
    pub struct MeshHandle;
    /// Handle to a [`RenderPass`](crate::pass::render_pass::RenderPass)
    pub struct RenderPassHandle;
    /// Handle to a buffer
    pub struct BufferHandle;
    /// Handle to a [`CommandBuffer`](crate::command::CommandBuffer)
    pub struct CommandBufferHandle;
    /// Handle to a command pool
    pub struct CommandPoolHandle;
    /// Handle to a compute pipeline
    pub struct ComputePipelineHandle;
    /// Handle to a graphics pipeline
    pub struct GraphicsPipelineHandle;
    /// Handle to a pipeline interface
    pub struct PipelineInterfaceHandle;
    /// Handle to a descriptor set
    pub struct DescriptorSetHandle;
    /// Handle to a descriptor pool
    pub struct DescriptorPoolHandle;
    /// Handle to a descriptor set layout
    pub struct DescriptorSetLayoutHandle;
    /// Handle to a fence
    pub struct FenceHandle;
    /// Handle to a semaphore
    pub struct SemaphoreHandle;
    /// Handle to a render target view
    pub struct RenderTargetViewHandle;
    /// Handle to a depth stencil view
    pub struct DepthStencilViewHandle;
    /// Handle to a sampled image view
    pub struct SampledImageViewHandle;
    /// Handle to a storage image view
    pub struct StorageImageViewHandle;
    /// Handle to an image
    pub struct ImageHandle;
    /// Handle to a sampler
    pub struct SamplerHandle;
    /// Handle to a shader module
    pub struct ShaderModuleHandle;
    /// Handle to a swapchain
    pub struct SwapchainHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handle_is_null() {
        assert!(ImageHandle::default().is_null());
        assert!(ImageHandle::null().is_null());
    }

    #[test]
    fn test_stale_handle_misses() {
        let mut map: SlotMap<BufferHandle, u32> = SlotMap::with_key();
        let first = map.insert(1);
        map.remove(first);
        let second = map.insert(2);

        assert!(map.get(first).is_none());
        assert_eq!(map.get(second), Some(&2));
        assert_ne!(first, second);
    }
}
