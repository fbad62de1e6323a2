//! The instrumented queue: batches or splits application submissions into
//! forwarded submissions, inserts frame-boundary instrumentation, and owns
//! every pooled object the instrumentation needs.

use std::mem;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::backend::{
    ForwardedSubmit, MemoryRef, PresentDirectInfo, PresentSwapChainInfo, QueueBackend,
    RecordedCmdBuffer, ReplayResources, SemaphoreHandle, SubmitInfo, VirtualCopyRange,
    VirtualRemapRange,
};
use crate::config::ProfilerConfig;
use crate::device::{
    Device, Fence, GpuMemoryId, MemoryBinding, NestedCmdBuffer, ProfilingSession, QueryPool,
    TargetCmdBuffer,
};
use crate::error::{Error, Result};
use crate::frame::{FrameSession, FrameTracker};
use crate::log::{LogItem, LogItemKind, LogQueue, LogSink, QueueCall};
use crate::memory::LegacyMemoryPool;
use crate::pool::ResourcePool;
use crate::tracker::{PendingSubmitTracker, RecordBuilder, ResourceCounts};

/// Available/busy tally of one pool.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolCount {
    pub available: usize,
    pub busy: usize,
}

/// Snapshot of every pool, for diagnostics and tests.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub cmd_buffers: PoolCount,
    pub nested_cmd_buffers: PoolCount,
    /// Busy fences are the ones gating pending submission records.
    pub fences: PoolCount,
    pub sessions: PoolCount,
    pub memory_chunks: PoolCount,
    pub queries: PoolCount,
    pub pending_submits: usize,
    pub queued_log_items: usize,
}

struct Pools {
    cmd_bufs: ResourcePool<Box<dyn TargetCmdBuffer>>,
    nested_cmd_bufs: ResourcePool<NestedCmdBuffer>,
    sessions: ResourcePool<Box<dyn ProfilingSession>>,
    queries: ResourcePool<Box<dyn QueryPool>>,
    memory: Option<LegacyMemoryPool>,
}

impl Pools {
    /// Returns every object tallied in `counts` to its available list. The
    /// tallies are consumed as each pool is processed, so a retried record
    /// never reclaims twice; a recycle error does not stop the pass and the
    /// first one is reported once everything is back.
    fn reclaim(&mut self, counts: &mut ResourceCounts) -> Result<()> {
        let mut first_err = None;
        let mut note = |result: Result<()>| {
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        };
        note(self.cmd_bufs.reclaim(mem::take(&mut counts.cmd_buffers), |_| Ok(())));
        note(
            self.nested_cmd_bufs
                .reclaim(mem::take(&mut counts.nested_cmd_buffers), NestedCmdBuffer::recycle),
        );
        note(self.sessions.reclaim(mem::take(&mut counts.sessions), |s| s.reset()));
        note(self.queries.reclaim(mem::take(&mut counts.queries), |q| q.bind_memory(None)));
        match self.memory.as_mut() {
            Some(memory) => note(memory.reclaim(mem::take(&mut counts.memory_chunks))),
            None => debug_assert_eq!(counts.memory_chunks, 0),
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn teardown(&mut self) {
        self.cmd_bufs.teardown();
        self.nested_cmd_bufs.teardown();
        self.sessions.teardown();
        self.queries.teardown();
        if let Some(memory) = self.memory.as_mut() {
            memory.teardown();
        }
    }
}

/// An instrumented queue sitting between the application and the real
/// execution queue.
///
/// Every application submission is replayed into queue-owned command buffers
/// augmented with profiling instructions and forwarded; the application
/// observes the same ordering, completion and success/failure it would see
/// on an uninstrumented queue.
///
/// A `Queue` performs no internal threading and must be driven by a single
/// thread; the only concurrency is the GPU itself, bridged through fences.
pub struct Queue {
    device: Rc<dyn Device>,
    backend: Box<dyn QueueBackend>,
    sink: Box<dyn LogSink>,
    config: ProfilerConfig,
    pools: Pools,
    fences: ResourcePool<Box<dyn Fence>>,
    pending: PendingSubmitTracker,
    record: RecordBuilder,
    log_queue: LogQueue,
    frame: FrameTracker,
}

impl Queue {
    pub fn new(
        device: Rc<dyn Device>,
        backend: Box<dyn QueueBackend>,
        sink: Box<dyn LogSink>,
        config: ProfilerConfig,
    ) -> Queue {
        let memory = config
            .legacy_memory_pool
            .then(|| LegacyMemoryPool::new(config.memory_chunk_size));
        Queue {
            device,
            backend,
            sink,
            config,
            pools: Pools {
                cmd_bufs: ResourcePool::default(),
                nested_cmd_bufs: ResourcePool::default(),
                sessions: ResourcePool::default(),
                queries: ResourcePool::default(),
                memory,
            },
            fences: ResourcePool::default(),
            pending: PendingSubmitTracker::default(),
            record: RecordBuilder::default(),
            log_queue: LogQueue::default(),
            frame: FrameTracker::new(),
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Replays the application's command buffers into pooled buffers and
    /// forwards them, splitting into one submission per buffer when batch
    /// breaking is configured and inserting frame-boundary instrumentation
    /// around embedded presents.
    pub fn submit(&mut self, mut info: SubmitInfo<'_>) -> Result<()> {
        self.log_queue_call(QueueCall::Submit);

        // The reference arrays are translated once up front; scratch
        // exhaustion here fails the whole call before anything is forwarded.
        let memory_refs = copy_refs(info.memory_refs)?;
        let block_if_flipping = copy_refs(info.block_if_flipping)?;

        let total = info.cmd_buffers.len();
        let frame_logging = self.config.frame_granularity();
        let mut begin_new_frame = false;

        if total == 0 {
            // Nothing to replay, but an empty forwarded submission still
            // lets a caller fence signal once prior work completes.
            self.forward(Vec::new(), &memory_refs, &block_if_flipping, info.fence.take(), !frame_logging)?;
            return self.after_submit(false);
        }

        let per_batch = if self.config.break_submit_batches { 1 } else { total };
        let mut idx = 0;

        while idx < total {
            let end = (idx + per_batch).min(total);

            // Frame-granularity captures pin their resources until the frame
            // ends; everything else is released with each submission.
            let mut seal = !frame_logging;

            let mut cbs: Vec<Box<dyn TargetCmdBuffer>> = Vec::new();
            // One per application buffer plus a possible frame-end buffer.
            cbs.try_reserve_exact(end - idx + 1)?;

            let mut failed = None;
            while idx < end {
                let recorded = info.cmd_buffers[idx];

                if frame_logging && recorded.contains_present() {
                    // End the frame-long capture just before the buffer that
                    // carries the present.
                    if let Some(open) = self.frame.take_open() {
                        match self.finish_frame(open) {
                            Ok(cb) => {
                                cbs.push(cb);
                                seal = true;
                            }
                            Err(err) => {
                                failed = Some(err);
                                break;
                            }
                        }
                    }
                }

                let device = &self.device;
                let mut target = match self.pools.cmd_bufs.acquire_with(|| device.create_cmd_buffer()) {
                    Ok(target) => target,
                    Err(err) => {
                        failed = Some(err);
                        break;
                    }
                };

                let frame_id = self.frame.frame_id();
                if let Err(err) = recorded.replay(self, &mut *target, frame_id) {
                    self.pools.cmd_bufs.cancel(target);
                    failed = Some(err);
                    break;
                }
                cbs.push(target);

                if recorded.contains_present() {
                    // Only the last buffer of a submit is expected to
                    // request a present.
                    debug_assert_eq!(idx, total - 1, "present in a non-final command buffer");
                    self.frame.advance_frame();
                    begin_new_frame = true;
                }
                idx += 1;
            }

            if let Some(err) = failed {
                // Unsubmitted replays go back to the available list; earlier
                // forwarded sub-batches are not rolled back.
                for cb in cbs {
                    self.pools.cmd_bufs.cancel(cb);
                }
                return Err(err);
            }

            // The caller's fence only rides on the submission carrying the
            // last application buffer, so waiting on it covers the whole
            // submit.
            let fence = if idx == total { info.fence.take() } else { None };
            self.forward(cbs, &memory_refs, &block_if_flipping, fence, seal)?;
        }

        self.after_submit(begin_new_frame)
    }

    /// Waits for all work on the underlying queue to complete.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.log_queue_call(QueueCall::WaitIdle);
        self.backend.wait_idle()
    }

    pub fn signal_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<()> {
        self.log_queue_call(QueueCall::SignalQueueSemaphore);
        self.backend.signal_semaphore(semaphore)
    }

    pub fn wait_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<()> {
        self.log_queue_call(QueueCall::WaitQueueSemaphore);
        self.backend.wait_semaphore(semaphore)
    }

    pub fn delay(&mut self, delay: Duration) -> Result<()> {
        self.log_queue_call(QueueCall::Delay);
        self.backend.delay(delay)
    }

    pub fn remap_virtual_memory_pages(
        &mut self,
        ranges: &[VirtualRemapRange],
        do_not_wait: bool,
        fence: Option<&mut dyn Fence>,
    ) -> Result<()> {
        self.log_queue_call(QueueCall::RemapVirtualMemoryPages);
        self.backend.remap_virtual_memory_pages(ranges, do_not_wait, fence)
    }

    pub fn copy_virtual_memory_page_mappings(
        &mut self,
        ranges: &[VirtualCopyRange],
        do_not_wait: bool,
    ) -> Result<()> {
        self.log_queue_call(QueueCall::CopyVirtualMemoryPageMappings);
        self.backend.copy_virtual_memory_page_mappings(ranges, do_not_wait)
    }

    pub fn present_direct(&mut self, info: &PresentDirectInfo) -> Result<()> {
        self.log_queue_call(QueueCall::PresentDirect);

        // Present first so present-time GPU work lands inside the frame
        // capture.
        let result = self.backend.present_direct(info);

        self.finish_open_frame()?;
        self.frame.advance_frame();
        self.begin_next_frame()?;
        result
    }

    pub fn present_swap_chain(&mut self, info: &PresentSwapChainInfo) -> Result<()> {
        self.log_queue_call(QueueCall::PresentSwapChain);

        // The present is always forwarded, even mid-capture: ownership of
        // the swap-chain image index must be released.
        let result = self.backend.present_swap_chain(info);

        self.finish_open_frame()?;
        self.frame.advance_frame();
        self.begin_next_frame()?;
        result
    }

    /// Reclaims every pooled object whose owning submission has provably
    /// completed, and flushes the log items those submissions cover.
    ///
    /// Safe to call at any time; never required for forward progress, only
    /// to bound resource growth. A sink or recycle failure leaves the
    /// affected record queued with its remaining work; a later call picks
    /// it up where the failure happened.
    pub fn process_completed(&mut self) -> Result<()> {
        let Queue {
            pending,
            pools,
            fences,
            log_queue,
            sink,
            ..
        } = self;
        pending.drain_completed(fences, |counts| {
            trace!(
                cmd_buffers = counts.cmd_buffers,
                log_items = counts.log_items,
                "reclaiming completed submission"
            );
            log_queue.flush_to(&mut counts.log_items, sink.as_mut())?;
            pools.reclaim(counts)
        })
    }

    /// Tears the queue down: waits for all outstanding GPU work, drains
    /// every pending record, flushes the log stream and destroys the pooled
    /// objects.
    pub fn shutdown(mut self) -> Result<()> {
        self.backend.wait_idle()?;
        self.process_completed()?;

        // A call that failed before forwarding can leave busy resources
        // tallied on the open record with no pending submission to gate
        // them. The queue is idle now, so they are reclaimable directly.
        if !self.record.is_empty() {
            let mut counts = self.record.take_counts();
            self.log_queue.flush_to(&mut counts.log_items, self.sink.as_mut())?;
            self.pools.reclaim(&mut counts)?;
        }

        debug_assert!(self.pending.is_empty(), "pending submissions survived wait-idle");
        self.sink.flush()?;
        self.pools.teardown();
        self.fences.teardown();
        Ok(())
    }

    pub fn pool_stats(&self) -> PoolStats {
        let pools = &self.pools;
        PoolStats {
            cmd_buffers: PoolCount {
                available: pools.cmd_bufs.available_len(),
                busy: pools.cmd_bufs.busy_len(),
            },
            nested_cmd_buffers: PoolCount {
                available: pools.nested_cmd_bufs.available_len(),
                busy: pools.nested_cmd_bufs.busy_len(),
            },
            fences: PoolCount {
                available: self.fences.available_len(),
                busy: self.pending.len(),
            },
            sessions: PoolCount {
                available: pools.sessions.available_len(),
                busy: pools.sessions.busy_len(),
            },
            memory_chunks: match pools.memory.as_ref() {
                Some(memory) => PoolCount {
                    available: memory.available_len(),
                    busy: memory.busy_len(),
                },
                None => PoolCount::default(),
            },
            queries: PoolCount {
                available: pools.queries.available_len(),
                busy: pools.queries.busy_len(),
            },
            pending_submits: self.pending.len(),
            queued_log_items: self.log_queue.len(),
        }
    }

    /// Forwards one submission to the real queue. When `seal` is set, the
    /// open record is sealed against an internally pooled fence associated
    /// with this submission, making everything the record pinned reclaimable
    /// once the fence signals.
    fn forward(
        &mut self,
        mut cbs: Vec<Box<dyn TargetCmdBuffer>>,
        memory_refs: &[MemoryRef],
        block_if_flipping: &[GpuMemoryId],
        fence: Option<&mut dyn Fence>,
        seal: bool,
    ) -> Result<()> {
        let result = self.backend.submit(ForwardedSubmit {
            cmd_buffers: &mut cbs,
            memory_refs,
            block_if_flipping,
            fence,
        });

        // Bookkeeping reflects what was attempted even if the backend
        // failed: the GPU-side effect of a failed submit is unknown, so the
        // buffers stay busy until a later fence proves the queue idle.
        for cb in cbs {
            self.pools.cmd_bufs.commit(cb);
            self.record.note_cmd_buffer();
        }

        if result.is_ok() && seal {
            let device = &self.device;
            let mut fence = self.fences.acquire_with(|| device.create_fence())?;
            match self.backend.associate_fence_with_last_submit(&mut *fence) {
                Ok(()) => self.pending.push(self.record.seal(fence)),
                Err(err) => {
                    self.fences.release(fence);
                    return Err(err);
                }
            }
        }
        result
    }

    fn after_submit(&mut self, begin_new_frame: bool) -> Result<()> {
        if begin_new_frame {
            self.begin_next_frame()
        } else if !self.config.frame_granularity() {
            // Reclaim newly idle objects on each submit. Skipped during a
            // per-frame trace, where the extra CPU work could starve the
            // GPU.
            self.process_completed()
        } else {
            Ok(())
        }
    }

    /// Drains completed submissions and stages sampling for the coming
    /// frame: stable-clock mode, and under frame granularity the frame-begin
    /// instrumentation submission.
    fn begin_next_frame(&mut self) -> Result<()> {
        self.process_completed()?;

        let sampling = self.config.sampling_enabled();
        self.frame.update_clock_mode(&*self.device, sampling)?;

        if sampling && self.config.frame_granularity() {
            let device = &self.device;
            let session = self.pools.sessions.acquire_with(|| device.create_session())?;
            let mut cb = match self.pools.cmd_bufs.acquire_with(|| device.create_cmd_buffer()) {
                Ok(cb) => cb,
                Err(err) => {
                    self.pools.sessions.cancel(session);
                    return Err(err);
                }
            };
            cb.begin()?;
            self.frame.open(session, &mut *cb)?;
            cb.end()?;
            // Frame-begin work is internal and never seals the record.
            self.forward(vec![cb], &[], &[], None, false)?;
        }
        Ok(())
    }

    /// Builds the internal command buffer that closes the open frame
    /// capture: the session goes busy and the Frame log item is queued.
    fn finish_frame(&mut self, open: FrameSession) -> Result<Box<dyn TargetCmdBuffer>> {
        let device = &self.device;
        let mut cb = self.pools.cmd_bufs.acquire_with(|| device.create_cmd_buffer())?;
        cb.begin()?;
        let (session, item) = open.finish(&mut *cb)?;
        cb.end()?;

        self.pools.sessions.commit(session);
        self.record.note_session();
        self.add_log_item(item);
        debug!(frame = item.frame_id, "closed frame profiling session");
        Ok(cb)
    }

    /// Ends the frame-long capture, if one is open, with its own sealed
    /// internal submission.
    fn finish_open_frame(&mut self) -> Result<()> {
        if let Some(open) = self.frame.take_open() {
            let cb = self.finish_frame(open)?;
            self.forward(vec![cb], &[], &[], None, true)?;
        }
        Ok(())
    }

    fn legacy_memory_binding(&mut self, size: u64, alignment: u64) -> Result<MemoryBinding> {
        if self.pools.memory.is_none() {
            debug_assert!(false, "GPU memory acquisition requires the legacy memory pool");
            return Err(Error::OutOfMemory);
        }

        let first = self
            .pools
            .memory
            .as_mut()
            .unwrap()
            .acquire(&*self.device, &mut self.record, size, alignment);
        match first {
            Err(Error::OutOfMemory) => {
                // Last-resort low-memory remediation, for this pool only:
                // let the queue drain, pull everything back and retry once.
                debug!("legacy memory pool exhausted, draining the queue");
                self.backend.wait_idle()?;
                self.process_completed()?;
                self.pools
                    .memory
                    .as_mut()
                    .unwrap()
                    .acquire(&*self.device, &mut self.record, size, alignment)
            }
            other => other,
        }
    }

    fn add_log_item(&mut self, item: LogItem) {
        self.log_queue.push(item);
        self.record.note_log_item();
    }

    fn log_queue_call(&mut self, call: QueueCall) {
        if self.config.log_queue_calls() {
            let item = LogItem {
                frame_id: self.frame.frame_id(),
                kind: LogItemKind::QueueCall(call),
            };
            self.add_log_item(item);
        }
    }
}

impl ReplayResources for Queue {
    fn acquire_nested_cmd_buffer(&mut self) -> Result<&mut NestedCmdBuffer> {
        let device = &self.device;
        let nested = self
            .pools
            .nested_cmd_bufs
            .acquire_with(|| device.create_nested_cmd_buffer())?;
        self.record.note_nested_cmd_buffer();
        Ok(self.pools.nested_cmd_bufs.commit(nested))
    }

    fn acquire_session(&mut self) -> Result<&mut dyn ProfilingSession> {
        let device = &self.device;
        let session = self.pools.sessions.acquire_with(|| device.create_session())?;
        self.record.note_session();
        Ok(self.pools.sessions.commit(session).as_mut())
    }

    fn acquire_query(&mut self) -> Result<&mut dyn QueryPool> {
        if self.pools.memory.is_none() {
            debug_assert!(false, "query acquisition requires the legacy memory pool");
            return Err(Error::OutOfMemory);
        }

        let device = &self.device;
        let mut query = self.pools.queries.acquire_with(|| device.create_query())?;
        let (size, alignment) = query.memory_requirements();
        let binding = match self.legacy_memory_binding(size, alignment) {
            Ok(binding) => binding,
            Err(err) => {
                self.pools.queries.cancel(query);
                return Err(err);
            }
        };
        if let Err(err) = query.bind_memory(Some(binding)) {
            self.pools.queries.cancel(query);
            return Err(err);
        }
        self.record.note_query();
        Ok(self.pools.queries.commit(query).as_mut())
    }

    fn acquire_gpu_memory(&mut self, size: u64, alignment: u64) -> Result<MemoryBinding> {
        self.legacy_memory_binding(size, alignment)
    }

    fn push_log_item(&mut self, item: LogItem) {
        self.add_log_item(item);
    }

    fn frame_id(&self) -> u64 {
        self.frame.frame_id()
    }
}

fn copy_refs<T: Copy>(refs: &[T]) -> Result<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(refs.len())?;
    out.extend_from_slice(refs);
    Ok(out)
}
