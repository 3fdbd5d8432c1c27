//! Reader-side access to the ring buffer
//!
//! Every method takes one short-held copy from the ring and does all further
//! work (concatenation, decimation, statistics, spectra) on that copy.

use crate::ring_buffer::{RingBuffer, Snapshot};
use exg_core::{ChannelStats, SampleBlock};
use exg_processing::{Spectrum, SpectrumAnalyzer};
use std::sync::Arc;

/// Channels × samples matrix assembled from consecutive blocks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelWindow {
    pub channels: Vec<Vec<f32>>,
    /// Sequence of the first block in the window
    pub first_sequence: Option<u64>,
    /// Sequence of the last block in the window
    pub last_sequence: Option<u64>,
}

impl ChannelWindow {
    /// Concatenate blocks channel by channel
    pub fn from_blocks(blocks: &[Arc<SampleBlock>]) -> Self {
        let channel_count = blocks.first().map_or(0, |b| b.channel_count());
        let total: usize = blocks.iter().map(|b| b.samples_per_channel()).sum();

        let mut channels = vec![Vec::with_capacity(total); channel_count];
        for block in blocks.iter().filter(|b| b.channel_count() == channel_count) {
            for (index, samples) in channels.iter_mut().enumerate() {
                if let Ok(data) = block.channel(index) {
                    samples.extend_from_slice(data);
                }
            }
        }

        ChannelWindow {
            channels,
            first_sequence: blocks.first().map(|b| b.sequence()),
            last_sequence: blocks.last().map(|b| b.sequence()),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn samples_per_channel(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Keep only the last `samples` samples of every channel
    pub fn tail(mut self, samples: usize) -> Self {
        for channel in &mut self.channels {
            let excess = channel.len().saturating_sub(samples);
            channel.drain(..excess);
        }
        self
    }

    /// Every `factor`-th sample, starting with the first
    pub fn downsample(&self, factor: usize) -> ChannelWindow {
        let factor = factor.max(1);
        ChannelWindow {
            channels: self
                .channels
                .iter()
                .map(|c| c.iter().step_by(factor).copied().collect())
                .collect(),
            first_sequence: self.first_sequence,
            last_sequence: self.last_sequence,
        }
    }

    pub fn stats(&self) -> Vec<ChannelStats> {
        self.channels.iter().map(|c| ChannelStats::calculate(c)).collect()
    }
}

impl From<&Snapshot> for ChannelWindow {
    fn from(snapshot: &Snapshot) -> Self {
        ChannelWindow::from_blocks(&snapshot.blocks)
    }
}

/// Handle used by renderers, recorders and analyzers to read the ring
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    ring: Arc<RingBuffer>,
}

impl SnapshotReader {
    pub fn new(ring: Arc<RingBuffer>) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    /// Copy of the last `count` blocks
    pub fn snapshot(&self, count: usize) -> Snapshot {
        self.ring.snapshot(count)
    }

    /// Last `count` blocks as a channel matrix
    pub fn window(&self, count: usize) -> ChannelWindow {
        ChannelWindow::from(&self.ring.snapshot(count))
    }

    /// Decimated matrix for plotting
    pub fn display(&self, count: usize, factor: usize) -> ChannelWindow {
        self.window(count).downsample(factor)
    }

    /// Spectrum over the analyzer's window, or `None` until enough samples exist
    pub fn spectrum(&self, analyzer: &SpectrumAnalyzer) -> Option<Spectrum> {
        // Enough blocks to cover the window whatever the block size
        let window = self.window(self.ring.capacity());
        if window.samples_per_channel() < analyzer.len() {
            return None;
        }
        analyzer.spectrum(&window.channels).ok()
    }
}
