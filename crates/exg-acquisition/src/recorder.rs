//! Recorder: follows the ring buffer by sequence and accumulates a recording

use crate::ring_buffer::RingBuffer;
use chrono::{DateTime, Utc};
use exg_core::{ExgError, ExgResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Text marker placed at a recorded sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Index of the next sample recorded after the marker was placed
    pub sample_index: u64,
    pub label: String,
    pub at: DateTime<Utc>,
}

/// Finished recording, one row per channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub sampling_rate: f64,
    pub channel_names: Vec<String>,
    pub data: Vec<Vec<f32>>,
    pub markers: Vec<Marker>,
    pub started_at: DateTime<Utc>,
    /// Blocks overwritten in the ring before the recorder read them
    pub missed_blocks: u64,
}

impl Recording {
    pub fn samples_per_channel(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples_per_channel() as f64 / self.sampling_rate
    }

    pub fn to_json(&self) -> ExgResult<String> {
        serde_json::to_string(self).map_err(|e| ExgError::Serialization { reason: e.to_string() })
    }

    pub fn from_json(json: &str) -> ExgResult<Self> {
        serde_json::from_str(json).map_err(|e| ExgError::Serialization { reason: e.to_string() })
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> ExgResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| ExgError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| ExgError::Serialization { reason: e.to_string() })?;
        writer.flush()?;
        info!(
            path = %path.display(),
            samples = self.samples_per_channel(),
            markers = self.markers.len(),
            "Recording saved"
        );
        Ok(())
    }
}

/// Consumer that copies every block it can reach into a recording
///
/// Blocks overwritten before a poll are lost and counted in
/// [`Recording::missed_blocks`]; the producer is never slowed down.
#[derive(Debug)]
pub struct Recorder {
    ring: Arc<RingBuffer>,
    cursor: u64,
    recording: Recording,
}

impl Recorder {
    /// Start recording with the next block written to `ring`
    pub fn start(ring: Arc<RingBuffer>, sampling_rate: f64, channel_names: Vec<String>) -> Self {
        let cursor = ring.total_written();
        info!(channels = channel_names.len(), cursor, "Recording started");
        Recorder {
            ring,
            cursor,
            recording: Recording {
                sampling_rate,
                data: vec![Vec::new(); channel_names.len()],
                channel_names,
                markers: Vec::new(),
                started_at: Utc::now(),
                missed_blocks: 0,
            },
        }
    }

    /// Append the blocks written since the last poll; returns how many
    pub fn poll(&mut self) -> usize {
        let read = self.ring.read_since(self.cursor);
        self.cursor = read.next;
        if read.missed > 0 {
            warn!(missed = read.missed, "Recorder fell behind the ring buffer");
            self.recording.missed_blocks += read.missed;
        }

        let mut appended = 0;
        for block in &read.blocks {
            if block.channel_count() != self.recording.data.len() {
                debug!(
                    sequence = block.sequence(),
                    channels = block.channel_count(),
                    "Skipping block with a different channel count"
                );
                continue;
            }
            for (row, samples) in self.recording.data.iter_mut().zip(block.channels()) {
                row.extend_from_slice(samples);
            }
            appended += 1;
        }
        appended
    }

    /// Place a marker at the current end of the recording
    pub fn mark(&mut self, label: impl Into<String>) -> u64 {
        self.poll();
        let sample_index = self.recorded_samples() as u64;
        let label = label.into();
        debug!(sample_index, label = %label, "Marker added");
        self.recording.markers.push(Marker { sample_index, label, at: Utc::now() });
        sample_index
    }

    pub fn recorded_samples(&self) -> usize {
        self.recording.samples_per_channel()
    }

    pub fn missed_blocks(&self) -> u64 {
        self.recording.missed_blocks
    }

    /// Drain what is left in the ring and hand over the recording
    pub fn finish(mut self) -> Recording {
        self.poll();
        info!(
            samples = self.recorded_samples(),
            missed_blocks = self.recording.missed_blocks,
            "Recording finished"
        );
        self.recording
    }
}
