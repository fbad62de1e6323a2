use bitflags::bitflags;

bitflags! {
    /// Profiling capture granularities. Several may be enabled at once.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct Granularity: u32 {
        /// One sample per draw-level command.
        const DRAW = 1 << 0;
        /// One sample per replayed command buffer.
        const COMMAND_BUFFER = 1 << 1;
        /// One sample per frame, present to present.
        const FRAME = 1 << 2;
    }
}

/// Configuration of an instrumented queue, fixed at construction.
#[derive(Clone, Debug)]
pub struct ProfilerConfig {
    pub granularity: Granularity,
    /// Forward each application command buffer as its own submission instead
    /// of coalescing a whole submit into one.
    pub break_submit_batches: bool,
    /// Use the queue-owned GPU memory and query pools instead of letting the
    /// profiling-session collaborator manage its own storage.
    pub legacy_memory_pool: bool,
    /// Size of each chunk suballocated by the legacy memory pool.
    pub memory_chunk_size: u64,
}

impl Default for ProfilerConfig {
    fn default() -> ProfilerConfig {
        ProfilerConfig {
            granularity: Granularity::empty(),
            break_submit_batches: false,
            legacy_memory_pool: false,
            memory_chunk_size: 4 * 1024 * 1024,
        }
    }
}

impl ProfilerConfig {
    /// Whether any granularity requires sampling this frame.
    pub(crate) fn sampling_enabled(&self) -> bool {
        !self.granularity.is_empty()
    }

    pub(crate) fn frame_granularity(&self) -> bool {
        self.granularity.contains(Granularity::FRAME)
    }

    /// Queue-level calls are only logged when fine-grained logging is on;
    /// a frame-only capture does not care about individual queue calls.
    pub(crate) fn log_queue_calls(&self) -> bool {
        self.granularity
            .intersects(Granularity::DRAW | Granularity::COMMAND_BUFFER)
    }
}
