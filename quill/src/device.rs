//! Construction-side collaborator traits.
//!
//! Everything the queue pools is created through [`Device`] and driven
//! through the object traits below. The layer never interprets the GPU
//! command stream itself; it only owns the lifecycle of these objects.

use std::any::Any;

use crate::error::Result;

/// Device clock behavior while profiling.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockMode {
    Default,
    /// Stable engine and memory clocks, required for comparable samples.
    Profiling,
}

/// Opaque identifier of a GPU memory allocation, assigned by the device.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct GpuMemoryId(pub u64);

/// Opaque identifier of one sample within a profiling session. Stored in log
/// items and checked for presence, never interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SampleId(pub u32);

/// A CPU-observable signal set once all GPU work submitted before it has
/// finished.
///
/// `Any` is a supertrait so a [`QueueBackend`](crate::QueueBackend) can
/// recover its concrete fence type when asked to associate one with a
/// submission.
pub trait Fence: Any {
    fn is_signaled(&self) -> bool;
}

/// A command buffer owned by this layer, the target of replayed application
/// work and of instrumentation commands.
pub trait TargetCmdBuffer {
    fn begin(&mut self) -> Result<()>;
    fn end(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
}

/// A command allocator backing exactly one nested command buffer.
pub trait CmdAllocator {
    fn reset(&mut self) -> Result<()>;
}

/// A nested command buffer paired with its dedicated allocator.
///
/// Nested buffers get their own small allocator so an application that plays
/// back hundreds of them cannot exhaust the shared allocator; the pair is
/// pooled and reset as a unit.
pub struct NestedCmdBuffer {
    pub buffer: Box<dyn TargetCmdBuffer>,
    pub allocator: Box<dyn CmdAllocator>,
}

impl NestedCmdBuffer {
    /// Automatic memory reuse is not enabled for nested allocators, so both
    /// halves are reset by hand on reclamation.
    pub(crate) fn recycle(&mut self) -> Result<()> {
        self.buffer.reset()?;
        self.allocator.reset()
    }
}

/// A raw GPU memory allocation, used only by the legacy self-managed pool.
pub trait GpuMemory {
    fn id(&self) -> GpuMemoryId;
    fn size(&self) -> u64;
}

/// Where a bound object writes its GPU-side results.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryBinding {
    pub memory: GpuMemoryId,
    pub offset: u64,
}

/// A pipeline-stats query object (legacy mode only).
pub trait QueryPool {
    /// Required backing storage as `(size, alignment)`.
    fn memory_requirements(&self) -> (u64, u64);
    /// Binds or unbinds the query's backing storage.
    fn bind_memory(&mut self, binding: Option<MemoryBinding>) -> Result<()>;
}

/// A collaborator-managed capture of counters and/or execution traces bound
/// to a span of GPU work.
pub trait ProfilingSession {
    /// Prepares a previously used session for reuse.
    fn reset(&mut self) -> Result<()>;
    /// Records the start of the session into `cmd`.
    fn begin(&mut self, cmd: &mut dyn TargetCmdBuffer) -> Result<()>;
    /// Records the end of the session into `cmd`.
    fn end(&mut self, cmd: &mut dyn TargetCmdBuffer) -> Result<()>;
    /// Records the start of one sample, returning its opaque id.
    fn begin_sample(&mut self, cmd: &mut dyn TargetCmdBuffer) -> Result<SampleId>;
    /// Records the end of the sample started with `sample`.
    fn end_sample(&mut self, cmd: &mut dyn TargetCmdBuffer, sample: SampleId) -> Result<()>;
}

/// Creates every pooled-resource kind and controls the device clock.
///
/// Construction is fallible; an error from any `create_*` is surfaced to the
/// application as a failure of the call that needed the object.
pub trait Device {
    fn create_cmd_buffer(&self) -> Result<Box<dyn TargetCmdBuffer>>;
    fn create_nested_cmd_buffer(&self) -> Result<NestedCmdBuffer>;
    fn create_fence(&self) -> Result<Box<dyn Fence>>;
    fn create_session(&self) -> Result<Box<dyn ProfilingSession>>;
    /// Legacy mode only.
    fn create_gpu_memory(&self, size: u64) -> Result<Box<dyn GpuMemory>>;
    /// Legacy mode only.
    fn create_query(&self) -> Result<Box<dyn QueryPool>>;
    fn set_clock_mode(&self, mode: ClockMode) -> Result<()>;
}
