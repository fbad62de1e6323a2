//! The instrumentation log stream: items are appended in call order and
//! written to the sink strictly in that order, but only once the GPU has
//! completed the submission that owns them.

use std::collections::VecDeque;

use crate::device::SampleId;
use crate::error::Result;

/// Identifies which queue-level entry point produced a log item.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QueueCall {
    Submit,
    WaitIdle,
    SignalQueueSemaphore,
    WaitQueueSemaphore,
    PresentDirect,
    PresentSwapChain,
    Delay,
    RemapVirtualMemoryPages,
    CopyVirtualMemoryPageMappings,
}

/// Opaque sample tokens handed back by a profiling session.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SampleTokens {
    pub sample: Option<SampleId>,
    pub timing_sample: Option<SampleId>,
}

impl SampleTokens {
    pub fn is_valid(&self) -> bool {
        self.sample.is_some() || self.timing_sample.is_some()
    }
}

/// What one log item describes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogItemKind {
    /// A queue-level entry point was invoked.
    QueueCall(QueueCall),
    /// A whole frame capture, present to present.
    Frame(SampleTokens),
    /// One replayed command buffer.
    CmdBuffer(SampleTokens),
    /// One draw-level event inside a command buffer.
    Draw(SampleTokens),
}

/// One entry of the instrumentation log stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LogItem {
    pub frame_id: u64,
    pub kind: LogItemKind,
}

/// Append-only destination for the log stream, opened at queue construction
/// and flushed at teardown. No output format is prescribed here.
pub trait LogSink {
    fn write(&mut self, item: &LogItem) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Ordered queue of log items waiting for their owning submission to
/// complete on the GPU.
#[derive(Default)]
pub(crate) struct LogQueue {
    items: VecDeque<LogItem>,
}

impl LogQueue {
    pub fn push(&mut self, item: LogItem) {
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Writes the `count` oldest items to the sink in insertion order,
    /// decrementing `count` as each one lands. A failed write leaves the
    /// item queued and the remaining count in place, so the flush can be
    /// retried without losing or duplicating items.
    pub fn flush_to(&mut self, count: &mut usize, sink: &mut dyn LogSink) -> Result<()> {
        debug_assert!(*count <= self.items.len(), "flushing more log items than were queued");
        while *count > 0 {
            let Some(item) = self.items.front() else { break };
            sink.write(item)?;
            self.items.pop_front();
            *count -= 1;
        }
        Ok(())
    }
}
