//! SampleBlock: one decoded, calibrated unit of multi-channel signal data

use crate::error::{ExgError, ExgResult};
use serde::{Deserialize, Serialize};

/// Rectangular block of `channel_count × samples_per_channel` samples.
///
/// Samples are stored channel-major: all samples of channel 0, then channel 1,
/// and so on, so each channel is a contiguous slice for filtering and
/// plotting. Blocks are published behind an `Arc` and never mutated after
/// that.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    sequence: u64,
    timestamp_us: u64,
    channel_count: usize,
    samples_per_channel: usize,
    data: Vec<f32>,
}

impl SampleBlock {
    /// Create a block from channel-major data
    pub fn new(data: Vec<f32>, channel_count: usize, sequence: u64, timestamp_us: u64) -> ExgResult<Self> {
        if channel_count == 0 {
            return Err(ExgError::config("sample block needs at least one channel"));
        }
        if data.len() % channel_count != 0 {
            return Err(ExgError::config(format!(
                "data length {} is not a multiple of {} channels",
                data.len(),
                channel_count
            )));
        }

        Ok(SampleBlock {
            sequence,
            timestamp_us,
            channel_count,
            samples_per_channel: data.len() / channel_count,
            data,
        })
    }

    /// Create a block from one vector per channel
    pub fn from_channels(channels: &[Vec<f32>], sequence: u64, timestamp_us: u64) -> ExgResult<Self> {
        let samples = channels.first().map(Vec::len).unwrap_or(0);
        if channels.iter().any(|c| c.len() != samples) {
            return Err(ExgError::config("channels have different lengths"));
        }
        let data = channels.iter().flat_map(|c| c.iter().copied()).collect();
        SampleBlock::new(data, channels.len(), sequence, timestamp_us)
    }

    /// Re-stamp an unpublished block with its sequence index and timestamp
    pub fn stamped(mut self, sequence: u64, timestamp_us: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Microseconds since the Unix epoch at which the block was acquired
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Total number of samples across all channels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Channel-major sample storage
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Samples of one channel
    pub fn channel(&self, index: usize) -> ExgResult<&[f32]> {
        if index >= self.channel_count {
            return Err(ExgError::ChannelOutOfRange {
                index,
                channel_count: self.channel_count,
            });
        }
        let start = index * self.samples_per_channel;
        Ok(&self.data[start..start + self.samples_per_channel])
    }

    /// Mutable samples of one channel, for in-place processing before publish
    pub fn channel_mut(&mut self, index: usize) -> ExgResult<&mut [f32]> {
        if index >= self.channel_count {
            return Err(ExgError::ChannelOutOfRange {
                index,
                channel_count: self.channel_count,
            });
        }
        let start = index * self.samples_per_channel;
        Ok(&mut self.data[start..start + self.samples_per_channel])
    }

    /// Iterate channels in order
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.samples_per_channel.max(1))
    }

    /// Iterate channels mutably in order
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.data.chunks_exact_mut(self.samples_per_channel.max(1))
    }

    /// Basic statistics for one channel
    pub fn channel_stats(&self, index: usize) -> ExgResult<ChannelStats> {
        Ok(ChannelStats::calculate(self.channel(index)?))
    }
}

/// Microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Basic statistics for a signal channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f32,
    pub rms: f32,
    pub std_dev: f32,
    pub min: f32,
    pub max: f32,
    pub peak_to_peak: f32,
}

impl ChannelStats {
    pub fn calculate(data: &[f32]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                peak_to_peak: 0.0,
            };
        }

        let n = data.len() as f64;
        let mean = data.iter().map(|&x| x as f64).sum::<f64>() / n;
        let mean_sq = data.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / n;
        let variance = data.iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>() / n;

        let min = data.iter().fold(f32::INFINITY, |a, &b| a.min(b));
        let max = data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            mean: mean as f32,
            rms: mean_sq.sqrt() as f32,
            std_dev: variance.sqrt() as f32,
            min,
            max,
            peak_to_peak: max - min,
        }
    }
}
