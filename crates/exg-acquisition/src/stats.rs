//! Throughput and loss counters
//!
//! Counters are plain atomics bumped by the acquisition thread; readers take
//! a serialisable [`AcquisitionStats`] copy at any time.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// Counters kept by packet-framing transports
#[derive(Debug, Default)]
pub struct LinkCounters {
    pub(crate) packets: AtomicU64,
    pub(crate) bytes: AtomicU64,
    pub(crate) crc_errors: AtomicU64,
    pub(crate) lost_packets: AtomicU64,
    pub(crate) resyncs: AtomicU64,
    pub(crate) overflows: AtomicU64,
}

impl LinkCounters {
    pub(crate) fn add(counter: &AtomicU64, by: u64) {
        bump(counter, by);
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn crc_errors(&self) -> u64 {
        self.crc_errors.load(Ordering::Relaxed)
    }

    pub fn lost_packets(&self) -> u64 {
        self.lost_packets.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }
}

/// Counters kept by the acquisition loop
#[derive(Debug, Default)]
pub struct AcquisitionCounters {
    pub(crate) frames_received: AtomicU64,
    pub(crate) bytes_received: AtomicU64,
    pub(crate) blocks_written: AtomicU64,
    pub(crate) samples_written: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) timeouts: AtomicU64,
}

impl AcquisitionCounters {
    pub(crate) fn frame_received(&self, bytes: usize) {
        bump(&self.frames_received, 1);
        bump(&self.bytes_received, bytes as u64);
    }

    pub(crate) fn block_written(&self, samples: usize) {
        bump(&self.blocks_written, 1);
        bump(&self.samples_written, samples as u64);
    }

    pub(crate) fn frame_dropped(&self) {
        bump(&self.frames_dropped, 1);
    }

    pub(crate) fn timeout(&self) {
        bump(&self.timeouts, 1);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.bytes_received,
            &self.blocks_written,
            &self.samples_written,
            &self.frames_dropped,
            &self.timeouts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy, merged with link counters when the transport has them
    pub fn load(&self, link: Option<&LinkCounters>, overwritten: u64) -> AcquisitionStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        AcquisitionStats {
            frames_received: load(&self.frames_received),
            bytes_received: load(&self.bytes_received),
            blocks_written: load(&self.blocks_written),
            samples_written: load(&self.samples_written),
            frames_dropped: load(&self.frames_dropped),
            timeouts: load(&self.timeouts),
            blocks_overwritten: overwritten,
            packets: link.map_or(0, |l| load(&l.packets)),
            link_bytes: link.map_or(0, |l| load(&l.bytes)),
            crc_errors: link.map_or(0, |l| load(&l.crc_errors)),
            lost_packets: link.map_or(0, |l| load(&l.lost_packets)),
            resyncs: link.map_or(0, |l| load(&l.resyncs)),
            buffer_overflows: link.map_or(0, |l| load(&l.overflows)),
        }
    }
}

/// Aggregate counters of one streaming run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub blocks_written: u64,
    pub samples_written: u64,
    /// Frames rejected with `FrameSizeMismatch`
    pub frames_dropped: u64,
    pub timeouts: u64,
    /// Blocks lost to overwrite-on-full in the ring buffer
    pub blocks_overwritten: u64,
    pub packets: u64,
    pub link_bytes: u64,
    pub crc_errors: u64,
    pub lost_packets: u64,
    pub resyncs: u64,
    pub buffer_overflows: u64,
}
