//! A queue instrumentation layer for GPU profiling.
//!
//! `quill` sits between an application and an in-order GPU execution queue.
//! Application submissions are replayed into layer-owned command buffers,
//! augmented with profiling instrumentation, and forwarded; pooled resources
//! backing each submission are reclaimed once a fence proves the GPU is done
//! with it, and the instrumentation log stream is emitted in call order.
//!
//! The layer is backend-agnostic: the device, the real queue, the recorded
//! command buffers and the profiling sessions are all collaborator traits
//! supplied by the embedder.
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use quill::*;
//! # fn demo(device: Rc<dyn Device>, backend: Box<dyn QueueBackend>, sink: Box<dyn LogSink>) -> Result<()> {
//! let config = ProfilerConfig {
//!     granularity: Granularity::FRAME,
//!     ..ProfilerConfig::default()
//! };
//! let queue = Queue::new(device, backend, sink, config);
//! // ... queue.submit(...), queue.present_direct(...) ...
//! queue.shutdown()
//! # }
//! ```

mod backend;
mod config;
mod device;
mod error;
mod frame;
mod log;
mod memory;
mod pool;
mod queue;
mod tracker;

pub use crate::backend::{
    ForwardedSubmit, MemoryRef, MemoryRefFlags, PresentDirectInfo, PresentSwapChainInfo,
    QueueBackend, RecordedCmdBuffer, ReplayResources, SemaphoreHandle, SubmitInfo,
    VirtualCopyRange, VirtualRemapRange,
};
pub use crate::config::{Granularity, ProfilerConfig};
pub use crate::device::{
    ClockMode, CmdAllocator, Device, Fence, GpuMemory, GpuMemoryId, MemoryBinding,
    NestedCmdBuffer, ProfilingSession, QueryPool, SampleId, TargetCmdBuffer,
};
pub use crate::error::{Error, Result};
pub use crate::log::{LogItem, LogItemKind, LogSink, QueueCall, SampleTokens};
pub use crate::queue::{PoolCount, PoolStats, Queue};
pub use crate::tracker::ResourceCounts;
