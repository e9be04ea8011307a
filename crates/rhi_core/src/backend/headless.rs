//! In-process backend without a GPU
//!
//! Every native object is a counter value tracked in a shared table. Recording hooks append to a
//! command log, and failures can be injected per object kind. This is the backend used by the
//! crate's own tests and by tools that only need the object graph.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::backend::{ApiObject, ApiObjectDesc, Backend, CommandBufferApi, NativeHandle, QueueApi};
use crate::command::{
    BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBufferCreateInfo, RenderPassBeginInfo, RenderingInfo,
};
use crate::error::{RhiError, RhiResult};
use crate::foundation::sync::lock;
use crate::object::ObjectKind;
use crate::queue::QueueCreateInfo;
use crate::types::{Api, ResourceState, SubresourceRange};

/// Command captured by a headless command buffer or queue
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RecordedCommand {
    Begin,
    End,
    BeginRenderPass {
        render_pass: NativeHandle,
        clear_value_count: usize,
    },
    EndRenderPass,
    BeginRendering {
        render_targets: Vec<NativeHandle>,
        depth_stencil: Option<NativeHandle>,
    },
    EndRendering,
    TransitionImage {
        image: NativeHandle,
        before: ResourceState,
        after: ResourceState,
    },
    BufferBarrier {
        buffer: NativeHandle,
        before: ResourceState,
        after: ResourceState,
    },
    CopyBufferToBuffer {
        src: NativeHandle,
        dst: NativeHandle,
        size: u64,
    },
    CopyBufferToImage {
        src: NativeHandle,
        dst: NativeHandle,
    },
    Submit {
        command_buffers: Vec<NativeHandle>,
    },
    WaitIdle,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_handle: NativeHandle,
    live: BTreeMap<NativeHandle, ObjectKind>,
    allocation_failures: HashMap<ObjectKind, usize>,
    create_failures: HashMap<ObjectKind, usize>,
    destroyed: Vec<(ObjectKind, NativeHandle)>,
    commands: Vec<RecordedCommand>,
}

impl HeadlessState {
    fn take_failure(failures: &mut HashMap<ObjectKind, usize>, kind: ObjectKind) -> bool {
        match failures.get_mut(&kind) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Backend that keeps every native object in memory
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessBackend {
    /// Create a backend with no live objects
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next allocation of `kind` fail
    pub fn fail_next_allocation(&self, kind: ObjectKind) {
        *lock(&self.state).allocation_failures.entry(kind).or_default() += 1;
    }

    /// Make the next native creation of `kind` fail
    pub fn fail_next_create(&self, kind: ObjectKind) {
        *lock(&self.state).create_failures.entry(kind).or_default() += 1;
    }

    /// Number of live native objects of `kind`
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        lock(&self.state).live.values().filter(|&&live| live == kind).count()
    }

    /// Number of live native objects of any kind
    pub fn live_total(&self) -> usize {
        lock(&self.state).live.len()
    }

    /// Kinds of every destroyed native object, in destruction order
    pub fn destroyed_kinds(&self) -> Vec<ObjectKind> {
        lock(&self.state).destroyed.iter().map(|&(kind, _)| kind).collect()
    }

    /// Native handles of every destroyed object, in destruction order
    pub fn destroyed_handles(&self) -> Vec<NativeHandle> {
        lock(&self.state).destroyed.iter().map(|&(_, handle)| handle).collect()
    }

    /// Every recorded command and queue operation, in order
    pub fn commands(&self) -> Vec<RecordedCommand> {
        lock(&self.state).commands.clone()
    }

    /// Forget recorded commands and destruction history
    pub fn clear_log(&self) {
        let mut state = lock(&self.state);
        state.commands.clear();
        state.destroyed.clear();
    }

    fn allocate(&self, kind: ObjectKind) -> RhiResult<HeadlessObject> {
        let mut state = lock(&self.state);
        if HeadlessState::take_failure(&mut state.allocation_failures, kind) {
            return Err(RhiError::AllocationFailed { kind });
        }
        Ok(HeadlessObject {
            kind,
            handle: 0,
            state: Arc::clone(&self.state),
        })
    }
}

impl Backend for HeadlessBackend {
    fn api(&self) -> Api {
        Api::Headless
    }

    fn allocate_object(&self, kind: ObjectKind) -> RhiResult<Box<dyn ApiObject>> {
        Ok(Box::new(self.allocate(kind)?))
    }

    fn allocate_command_buffer(&self) -> RhiResult<Box<dyn CommandBufferApi>> {
        Ok(Box::new(self.allocate(ObjectKind::CommandBuffer)?))
    }

    fn allocate_queue(&self) -> RhiResult<Box<dyn QueueApi>> {
        Ok(Box::new(self.allocate(ObjectKind::Queue)?))
    }
}

#[derive(Debug)]
struct HeadlessObject {
    kind: ObjectKind,
    handle: NativeHandle,
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessObject {
    fn create(&mut self, dependencies: &[NativeHandle]) -> RhiResult<()> {
        let mut state = lock(&self.state);
        if HeadlessState::take_failure(&mut state.create_failures, self.kind) {
            return Err(RhiError::Backend(format!("injected {} creation failure", self.kind)));
        }
        if let Some(missing) = dependencies.iter().find(|handle| !state.live.contains_key(handle)) {
            return Err(RhiError::Backend(format!(
                "{} depends on native handle {missing} which is not live",
                self.kind
            )));
        }
        state.next_handle += 1;
        self.handle = state.next_handle;
        state.live.insert(self.handle, self.kind);
        Ok(())
    }

    fn destroy(&mut self) {
        if self.handle == 0 {
            return;
        }
        let mut state = lock(&self.state);
        state.live.remove(&self.handle);
        state.destroyed.push((self.kind, self.handle));
        self.handle = 0;
    }

    fn record(&self, command: RecordedCommand) {
        lock(&self.state).commands.push(command);
    }
}

impl ApiObject for HeadlessObject {
    fn create_api_objects(&mut self, desc: &ApiObjectDesc<'_>) -> RhiResult<()> {
        match *desc {
            ApiObjectDesc::RenderTargetView { image, .. }
            | ApiObjectDesc::DepthStencilView { image, .. }
            | ApiObjectDesc::SampledImageView { image, .. }
            | ApiObjectDesc::StorageImageView { image, .. } => self.create(&[image]),
            ApiObjectDesc::DescriptorSet { pool, layout, .. } => self.create(&[pool, layout]),
            _ => self.create(&[]),
        }
    }

    fn destroy_api_objects(&mut self) {
        self.destroy();
    }

    fn native_handle(&self) -> NativeHandle {
        self.handle
    }
}

impl CommandBufferApi for HeadlessObject {
    fn create_api_objects(&mut self, _info: &CommandBufferCreateInfo, pool: NativeHandle) -> RhiResult<()> {
        self.create(&[pool])
    }

    fn destroy_api_objects(&mut self) {
        self.destroy();
    }

    fn native_handle(&self) -> NativeHandle {
        self.handle
    }

    fn begin(&mut self) -> RhiResult<()> {
        self.record(RecordedCommand::Begin);
        Ok(())
    }

    fn end(&mut self) -> RhiResult<()> {
        self.record(RecordedCommand::End);
        Ok(())
    }

    fn begin_render_pass_impl(&mut self, render_pass: NativeHandle, begin_info: &RenderPassBeginInfo) {
        self.record(RecordedCommand::BeginRenderPass {
            render_pass,
            clear_value_count: begin_info.render_target_clear_values.len(),
        });
    }

    fn end_render_pass_impl(&mut self) {
        self.record(RecordedCommand::EndRenderPass);
    }

    fn begin_rendering_impl(
        &mut self,
        _info: &RenderingInfo,
        render_targets: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    ) {
        self.record(RecordedCommand::BeginRendering {
            render_targets: render_targets.to_vec(),
            depth_stencil,
        });
    }

    fn end_rendering_impl(&mut self) {
        self.record(RecordedCommand::EndRendering);
    }

    fn transition_image_layout(
        &mut self,
        image: NativeHandle,
        _range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.record(RecordedCommand::TransitionImage { image, before, after });
    }

    fn buffer_resource_barrier(&mut self, buffer: NativeHandle, before: ResourceState, after: ResourceState) {
        self.record(RecordedCommand::BufferBarrier { buffer, before, after });
    }

    fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: NativeHandle, dst: NativeHandle) {
        self.record(RecordedCommand::CopyBufferToBuffer {
            src,
            dst,
            size: info.size,
        });
    }

    fn copy_buffer_to_image(&mut self, _info: &BufferToImageCopyInfo, src: NativeHandle, dst: NativeHandle) {
        self.record(RecordedCommand::CopyBufferToImage { src, dst });
    }
}

impl QueueApi for HeadlessObject {
    fn create_api_objects(&mut self, _info: &QueueCreateInfo) -> RhiResult<()> {
        self.create(&[])
    }

    fn destroy_api_objects(&mut self) {
        self.destroy();
    }

    fn submit(&mut self, command_buffers: &[NativeHandle], _fence: Option<NativeHandle>) -> RhiResult<()> {
        self.record(RecordedCommand::Submit {
            command_buffers: command_buffers.to_vec(),
        });
        Ok(())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.record(RecordedCommand::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::sync::FenceCreateInfo;

    #[test]
    fn test_create_and_destroy_tracks_live_objects() {
        let backend = HeadlessBackend::new();
        let mut fence = backend.allocate_object(ObjectKind::Fence).unwrap();
        let info = FenceCreateInfo::default();

        fence.create_api_objects(&ApiObjectDesc::Fence(&info)).unwrap();
        assert_ne!(fence.native_handle(), 0);
        assert_eq!(backend.live_count(ObjectKind::Fence), 1);

        fence.destroy_api_objects();
        fence.destroy_api_objects();
        assert_eq!(backend.live_total(), 0);
        assert_eq!(backend.destroyed_kinds(), vec![ObjectKind::Fence]);
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let backend = HeadlessBackend::new();
        backend.fail_next_allocation(ObjectKind::Sampler);
        assert_eq!(
            backend.allocate_object(ObjectKind::Sampler).unwrap_err(),
            RhiError::AllocationFailed { kind: ObjectKind::Sampler }
        );
        assert!(backend.allocate_object(ObjectKind::Sampler).is_ok());

        backend.fail_next_create(ObjectKind::Fence);
        let info = FenceCreateInfo::default();
        let mut fence = backend.allocate_object(ObjectKind::Fence).unwrap();
        assert!(matches!(
            fence.create_api_objects(&ApiObjectDesc::Fence(&info)),
            Err(RhiError::Backend(_))
        ));
        assert!(fence.create_api_objects(&ApiObjectDesc::Fence(&info)).is_ok());
    }
}
