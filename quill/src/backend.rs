//! Forwarding-side collaborator traits: the real queue underneath the layer
//! and the application's recorded command buffers.

use std::time::Duration;

use bitflags::bitflags;

use crate::device::{Fence, GpuMemoryId, MemoryBinding, NestedCmdBuffer, ProfilingSession, QueryPool, TargetCmdBuffer};
use crate::error::Result;
use crate::log::LogItem;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct MemoryRefFlags: u32 {
        const READ_ONLY = 1 << 0;
    }
}

/// A GPU memory reference attached to a submission.
#[derive(Copy, Clone, Debug)]
pub struct MemoryRef {
    pub memory: GpuMemoryId,
    pub flags: MemoryRefFlags,
}

/// An opaque queue semaphore handle, forwarded untouched.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SemaphoreHandle(pub u64);

/// One page range of a virtual-memory remap operation.
#[derive(Copy, Clone, Debug)]
pub struct VirtualRemapRange {
    pub virtual_addr: u64,
    /// `None` unmaps the range.
    pub real_memory: Option<GpuMemoryId>,
    pub real_offset: u64,
    pub size: u64,
}

/// One page range of a virtual-memory mapping copy.
#[derive(Copy, Clone, Debug)]
pub struct VirtualCopyRange {
    pub src_addr: u64,
    pub dst_addr: u64,
    pub size: u64,
}

/// Arguments of a direct present, forwarded untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct PresentDirectInfo {
    pub fullscreen: bool,
    pub flip_interval: u32,
}

/// Arguments of a swap-chain present, forwarded untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct PresentSwapChainInfo {
    pub image_index: u32,
}

/// One application submission as observed by the instrumented queue.
pub struct SubmitInfo<'a> {
    pub cmd_buffers: &'a [&'a dyn RecordedCmdBuffer],
    pub memory_refs: &'a [MemoryRef],
    /// Memory the submission must not touch while a flip is outstanding.
    pub block_if_flipping: &'a [GpuMemoryId],
    /// Signalled once all work of this submit has completed.
    pub fence: Option<&'a mut dyn Fence>,
}

/// A submission forwarded to the real queue. The command buffers are
/// layer-owned replays, not the application's recorded buffers.
pub struct ForwardedSubmit<'a> {
    pub cmd_buffers: &'a mut [Box<dyn TargetCmdBuffer>],
    pub memory_refs: &'a [MemoryRef],
    pub block_if_flipping: &'a [GpuMemoryId],
    pub fence: Option<&'a mut dyn Fence>,
}

/// The real, in-order execution queue underneath this layer.
///
/// Completion is strictly FIFO with respect to `submit` calls; the layer's
/// reclamation logic depends on that ordering.
pub trait QueueBackend {
    fn submit(&mut self, submit: ForwardedSubmit<'_>) -> Result<()>;
    /// Blocks until all work submitted on this queue has completed.
    fn wait_idle(&mut self) -> Result<()>;
    fn signal_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<()>;
    fn wait_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<()>;
    fn present_direct(&mut self, info: &PresentDirectInfo) -> Result<()>;
    fn present_swap_chain(&mut self, info: &PresentSwapChainInfo) -> Result<()>;
    fn delay(&mut self, delay: Duration) -> Result<()>;
    fn remap_virtual_memory_pages(
        &mut self,
        ranges: &[VirtualRemapRange],
        do_not_wait: bool,
        fence: Option<&mut dyn Fence>,
    ) -> Result<()>;
    fn copy_virtual_memory_page_mappings(
        &mut self,
        ranges: &[VirtualCopyRange],
        do_not_wait: bool,
    ) -> Result<()>;
    /// Re-arms `fence` so it reports signalled once all work submitted on
    /// this queue so far has completed. Unlike a fence passed to `submit`,
    /// an associated fence cannot be blocked on, only polled; this keeps the
    /// layer's internal fences from interfering with application fences.
    fn associate_fence_with_last_submit(&mut self, fence: &mut dyn Fence) -> Result<()>;
}

/// A pre-recorded application command buffer.
///
/// While the layer is active the application's buffers are tokenized call
/// streams; at submit time they are deterministically replayed into a
/// queue-owned [`TargetCmdBuffer`], possibly with extra instrumentation.
pub trait RecordedCmdBuffer {
    fn replay(
        &self,
        resources: &mut dyn ReplayResources,
        target: &mut dyn TargetCmdBuffer,
        frame_id: u64,
    ) -> Result<()>;
    /// Whether a present operation is embedded in the recorded stream.
    fn contains_present(&self) -> bool;
}

/// Queue-owned resources a replay may draw on while re-recording.
///
/// Everything acquired here is pinned until the submission it ends up in has
/// provably completed on the GPU.
pub trait ReplayResources {
    fn acquire_nested_cmd_buffer(&mut self) -> Result<&mut NestedCmdBuffer>;
    fn acquire_session(&mut self) -> Result<&mut dyn ProfilingSession>;
    /// Legacy mode only: a query with freshly bound backing storage.
    fn acquire_query(&mut self) -> Result<&mut dyn QueryPool>;
    /// Legacy mode only: a suballocation from the queue-owned memory pool.
    fn acquire_gpu_memory(&mut self, size: u64, alignment: u64) -> Result<MemoryBinding>;
    /// Queues a log item for output once the owning submission completes.
    fn push_log_item(&mut self, item: LogItem);
    fn frame_id(&self) -> u64;
}
