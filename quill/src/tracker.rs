//! In-flight submission records: what each forwarded submission pinned, and
//! when the GPU is provably done with it.

use std::collections::VecDeque;
use std::mem;

use crate::device::Fence;
use crate::error::Result;
use crate::pool::ResourcePool;

/// Per-kind tallies of pooled objects and log items held by one submission
/// record.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceCounts {
    pub cmd_buffers: usize,
    pub nested_cmd_buffers: usize,
    pub sessions: usize,
    pub memory_chunks: usize,
    pub queries: usize,
    pub log_items: usize,
}

/// The single open submission record.
///
/// Accumulates tallies as resources are committed and log items queued;
/// sealing consumes the tallies and leaves a fresh, empty record.
#[derive(Default)]
pub(crate) struct RecordBuilder {
    counts: ResourceCounts,
}

impl RecordBuilder {
    pub fn note_cmd_buffer(&mut self) {
        self.counts.cmd_buffers += 1;
    }

    pub fn note_nested_cmd_buffer(&mut self) {
        self.counts.nested_cmd_buffers += 1;
    }

    pub fn note_session(&mut self) {
        self.counts.sessions += 1;
    }

    pub fn note_memory_chunk(&mut self) {
        self.counts.memory_chunks += 1;
    }

    pub fn note_query(&mut self) {
        self.counts.queries += 1;
    }

    pub fn note_log_item(&mut self) {
        self.counts.log_items += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.counts == ResourceCounts::default()
    }

    /// Takes the accumulated tallies, resetting the builder.
    pub fn take_counts(&mut self) -> ResourceCounts {
        mem::take(&mut self.counts)
    }

    /// Seals the open record against `fence`, which the queue has associated
    /// with the forwarded submission carrying these resources.
    pub fn seal(&mut self, fence: Box<dyn Fence>) -> PendingSubmit {
        PendingSubmit {
            fence,
            counts: self.take_counts(),
        }
    }
}

/// One sealed, in-flight submission record.
pub(crate) struct PendingSubmit {
    pub fence: Box<dyn Fence>,
    pub counts: ResourceCounts,
}

/// FIFO queue of sealed submission records whose GPU work may still be in
/// flight.
#[derive(Default)]
pub(crate) struct PendingSubmitTracker {
    pending: VecDeque<PendingSubmit>,
}

impl PendingSubmitTracker {
    pub fn push(&mut self, record: PendingSubmit) {
        self.pending.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Completes every record at the head whose fence has signalled: hands
    /// its tallies to `complete`, then pops it and returns its fence to
    /// `fences`. A record is popped only after `complete` succeeds; a failed
    /// flush or recycle pass stays queued and is retried on the next call.
    /// Idempotent: with no new completions a second call does nothing.
    pub fn drain_completed(
        &mut self,
        fences: &mut ResourcePool<Box<dyn Fence>>,
        mut complete: impl FnMut(&mut ResourceCounts) -> Result<()>,
    ) -> Result<()> {
        while self.pending.front().map_or(false, |p| p.fence.is_signaled()) {
            complete(&mut self.pending.front_mut().unwrap().counts)?;
            let record = self.pending.pop_front().unwrap();
            fences.release(record.fence);
        }
        // The queue completes strictly in submission order; a signalled
        // record behind an unsignalled head means the completion source
        // misbehaved.
        debug_assert!(
            self.pending.iter().skip(1).all(|p| !p.fence.is_signaled()),
            "a submission completed out of order"
        );
        Ok(())
    }
}
