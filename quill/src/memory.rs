//! Legacy self-managed GPU memory pool.
//!
//! Used when the profiling-session collaborator does not own its backing
//! storage. Storage is suballocated from pooled fixed-size chunks; a chunk
//! goes busy once it is exhausted and comes back only after the submission
//! that last touched it has completed.

use tracing::debug;

use crate::device::{Device, GpuMemory, MemoryBinding};
use crate::error::{Error, Result};
use crate::pool::ResourcePool;
use crate::tracker::RecordBuilder;

fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

pub(crate) struct LegacyMemoryPool {
    chunks: ResourcePool<Box<dyn GpuMemory>>,
    current: Option<Box<dyn GpuMemory>>,
    offset: u64,
    chunk_size: u64,
}

impl LegacyMemoryPool {
    pub fn new(chunk_size: u64) -> LegacyMemoryPool {
        LegacyMemoryPool {
            chunks: ResourcePool::default(),
            current: None,
            offset: 0,
            chunk_size,
        }
    }

    /// Suballocates `size` bytes from the current chunk. An exhausted chunk
    /// is committed busy (tallied on `record`) and replaced from the pool,
    /// constructing a new chunk if none is available. A construction failure
    /// is returned to the caller, which may reclaim and retry.
    pub fn acquire(
        &mut self,
        device: &dyn Device,
        record: &mut RecordBuilder,
        size: u64,
        alignment: u64,
    ) -> Result<MemoryBinding> {
        debug_assert!(size <= self.chunk_size, "suballocation larger than a pool chunk");
        if size > self.chunk_size {
            return Err(Error::OutOfMemory);
        }

        self.offset = align_up(self.offset, alignment.max(1));

        loop {
            match &self.current {
                Some(chunk) if self.offset + size <= chunk.size() => break,
                _ => {
                    if let Some(chunk) = self.current.take() {
                        self.chunks.commit(chunk);
                        record.note_memory_chunk();
                    }
                    let chunk_size = self.chunk_size;
                    let chunk = self
                        .chunks
                        .acquire_with(|| device.create_gpu_memory(chunk_size))?;
                    if chunk.size() < size {
                        // An undersized chunk can never satisfy the request;
                        // report exhaustion instead of spinning on fresh
                        // chunks.
                        return Err(Error::OutOfMemory);
                    }
                    debug!(size = chunk.size(), "took a fresh memory chunk");
                    self.current = Some(chunk);
                    self.offset = 0;
                }
            }
        }

        let chunk = self.current.as_ref().unwrap();
        let binding = MemoryBinding {
            memory: chunk.id(),
            offset: self.offset,
        };
        self.offset += size;
        Ok(binding)
    }

    pub fn reclaim(&mut self, count: usize) -> Result<()> {
        self.chunks.reclaim(count, |_| Ok(()))
    }

    pub fn available_len(&self) -> usize {
        self.chunks.available_len()
    }

    pub fn busy_len(&self) -> usize {
        self.chunks.busy_len()
    }

    pub fn teardown(&mut self) {
        // The partially used current chunk was never associated with a
        // submission; it is destroyed directly.
        self.current = None;
        self.offset = 0;
        self.chunks.teardown();
    }
}
