//! Fixed-capacity ring of published sample blocks
//!
//! One writer (the acquisition thread) and any number of readers. The lock is
//! held only to move `Arc` handles in or out of the slot array; decoding,
//! filtering and every reader-side computation happen outside it. Writes past
//! capacity overwrite the oldest block and never wait on readers.

use exg_core::{critical, ExgError, ExgResult, SampleBlock};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lock usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub acquisitions: u64,
    pub total_hold_ns: u64,
    pub max_hold_ns: u64,
}

impl LockStats {
    pub fn mean_hold_ns(&self) -> u64 {
        if self.acquisitions == 0 {
            0
        } else {
            self.total_hold_ns / self.acquisitions
        }
    }
}

#[derive(Debug, Default)]
struct LockCounters {
    acquisitions: AtomicU64,
    total_hold_ns: AtomicU64,
    max_hold_ns: AtomicU64,
}

impl LockCounters {
    fn record(&self, started: Instant) {
        let held = started.elapsed().as_nanos() as u64;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.total_hold_ns.fetch_add(held, Ordering::Relaxed);
        self.max_hold_ns.fetch_max(held, Ordering::Relaxed);
    }

    fn load(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            total_hold_ns: self.total_hold_ns.load(Ordering::Relaxed),
            max_hold_ns: self.max_hold_ns.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the most recent blocks, oldest first
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub blocks: Vec<Arc<SampleBlock>>,
    /// Number of times the write cursor had wrapped when the copy was taken
    pub generation: u64,
    /// Blocks written since the last reset when the copy was taken
    pub total_written: u64,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn latest(&self) -> Option<&Arc<SampleBlock>> {
        self.blocks.last()
    }
}

/// Blocks written after a cursor, returned by [`RingBuffer::read_since`]
#[derive(Debug, Clone, Default)]
pub struct ReadSince {
    pub blocks: Vec<Arc<SampleBlock>>,
    /// Cursor to pass to the next call
    pub next: u64,
    /// Blocks overwritten before the reader got to them
    pub missed: u64,
}

#[derive(Debug)]
struct RingState {
    slots: Vec<Option<Arc<SampleBlock>>>,
    /// Next slot to write
    cursor: usize,
    len: usize,
    generation: u64,
    total_written: u64,
    overwritten: u64,
}

impl RingState {
    fn new(capacity: usize) -> Self {
        RingState {
            slots: vec![None; capacity],
            cursor: 0,
            len: 0,
            generation: 0,
            total_written: 0,
            overwritten: 0,
        }
    }

    /// Clone the last `count` handles, oldest first
    fn copy_last(&self, count: usize) -> Vec<Arc<SampleBlock>> {
        let capacity = self.slots.len();
        let count = count.min(self.len);
        let start = (self.cursor + capacity - count) % capacity;
        (0..count)
            .filter_map(|i| self.slots[(start + i) % capacity].clone())
            .collect()
    }
}

/// Single-writer, multi-reader ring of sample blocks
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    state: RwLock<RingState>,
    lock_stats: LockCounters,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> ExgResult<Self> {
        if capacity == 0 {
            return Err(ExgError::config("ring buffer capacity must be at least 1"));
        }
        Ok(RingBuffer {
            capacity,
            state: RwLock::new(RingState::new(capacity)),
            lock_stats: LockCounters::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish a block, overwriting the oldest one when full
    pub fn write(&self, block: SampleBlock) {
        // The last handle to an overwritten block is freed here, outside the lock
        drop(self.store(Arc::new(block)));
    }

    /// Locked half of [`write`](Self::write); hands back the evicted block
    fn store(&self, block: Arc<SampleBlock>) -> Option<Arc<SampleBlock>> {
        let mut state = self.state.write();
        let _critical = critical::enter();
        let started = Instant::now();

        let cursor = state.cursor;
        let evicted = std::mem::replace(&mut state.slots[cursor], Some(block));
        if evicted.is_some() {
            state.overwritten += 1;
        }
        state.cursor = (cursor + 1) % self.capacity;
        if state.cursor == 0 {
            state.generation += 1;
        }
        state.len = (state.len + 1).min(self.capacity);
        state.total_written += 1;

        self.lock_stats.record(started);
        evicted
    }

    /// Copy of the last `count` blocks (fewer if fewer are retained), oldest first
    pub fn snapshot(&self, count: usize) -> Snapshot {
        let state = self.state.read();
        let _critical = critical::enter();
        let started = Instant::now();

        let snapshot = Snapshot {
            blocks: state.copy_last(count),
            generation: state.generation,
            total_written: state.total_written,
        };

        self.lock_stats.record(started);
        snapshot
    }

    /// Blocks written at or after write index `cursor`
    ///
    /// Write indices count from zero at the last reset. Blocks that were
    /// overwritten before this call are reported in `missed`.
    pub fn read_since(&self, cursor: u64) -> ReadSince {
        let state = self.state.read();
        let _critical = critical::enter();
        let started = Instant::now();

        let oldest = state.total_written - state.len as u64;
        let from = cursor.clamp(oldest, state.total_written);
        let read = ReadSince {
            blocks: state.copy_last((state.total_written - from) as usize),
            next: state.total_written,
            missed: from.saturating_sub(cursor),
        };

        self.lock_stats.record(started);
        read
    }

    /// Number of retained blocks
    pub fn len(&self) -> usize {
        self.state.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn total_written(&self) -> u64 {
        self.state.read().total_written
    }

    /// Blocks lost to overwrite-on-full since the last reset
    pub fn overwritten(&self) -> u64 {
        self.state.read().overwritten
    }

    pub fn lock_stats(&self) -> LockStats {
        self.lock_stats.load()
    }

    /// Drop every block and rewind all cursors
    pub fn reset(&self) {
        let mut state = self.state.write();
        let _critical = critical::enter();
        *state = RingState::new(self.capacity);
    }
}
