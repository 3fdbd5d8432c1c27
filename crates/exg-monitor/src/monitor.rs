//! Renderer role without a window: periodic snapshots, statistics and band power

use chrono::{DateTime, Utc};
use exg_acquisition::{AcquisitionStats, ChannelWindow, LockStats, Session, SnapshotReader};
use exg_core::{AcquisitionStatus, ChannelStats, ExgResult};
use exg_processing::{SpectrumAnalyzer, BANDS};
use serde::Serialize;
use tracing::info;

/// Per-channel line of a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub stats: ChannelStats,
    /// Power per band, in [`BANDS`] order
    pub band_powers: Option<[f64; 5]>,
    pub dominant_band: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub at: DateTime<Utc>,
    pub status: AcquisitionStatus,
    pub stats: AcquisitionStats,
    pub lock: LockStats,
    /// Sequence of the newest block, once anything has been written
    pub last_sequence: Option<u64>,
    /// Power per band averaged over all channels
    pub band_powers: Option<[f64; 5]>,
    pub dominant_band: Option<&'static str>,
    pub channels: Vec<ChannelSummary>,
}

/// Polls the ring the way a plot widget would
#[derive(Debug)]
pub struct Monitor {
    reader: SnapshotReader,
    analyzer: SpectrumAnalyzer,
    channel_names: Vec<String>,
    snapshot_blocks: usize,
    downsample_factor: usize,
    frames_rendered: u64,
}

impl Monitor {
    pub fn new(
        reader: SnapshotReader,
        analyzer: SpectrumAnalyzer,
        channel_names: Vec<String>,
        snapshot_blocks: usize,
        downsample_factor: usize,
    ) -> Self {
        Monitor {
            reader,
            analyzer,
            channel_names,
            snapshot_blocks,
            downsample_factor,
            frames_rendered: 0,
        }
    }

    /// Monitor configured from the session's display section
    pub fn for_session(session: &Session) -> ExgResult<Self> {
        let config = session.config();
        Ok(Self::new(
            session.reader(),
            config.spectrum_analyzer()?,
            config.device.channel_names.clone(),
            config.display.snapshot_blocks,
            config.display.downsample_factor,
        ))
    }

    /// One display refresh: decimated copy of the recent blocks
    pub fn render(&mut self) -> ChannelWindow {
        self.frames_rendered += 1;
        self.reader.display(self.snapshot_blocks, self.downsample_factor)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn report(&self, status: AcquisitionStatus, stats: AcquisitionStats) -> MonitorReport {
        let window = self.reader.window(self.snapshot_blocks);
        let channel_stats = window.stats();
        let spectrum = self.reader.spectrum(&self.analyzer);

        let channels = self
            .channel_names
            .iter()
            .zip(channel_stats)
            .enumerate()
            .map(|(index, (name, stats))| {
                let band_powers = spectrum.as_ref().and_then(|s| s.band_powers(index));
                ChannelSummary {
                    name: name.clone(),
                    stats,
                    band_powers,
                    dominant_band: band_powers.and_then(dominant_band),
                }
            })
            .collect();
        let band_powers = spectrum.as_ref().and_then(|s| s.mean_band_powers());

        MonitorReport {
            at: Utc::now(),
            status,
            stats,
            lock: self.reader.ring().lock_stats(),
            last_sequence: window.last_sequence,
            band_powers,
            dominant_band: band_powers.and_then(dominant_band),
            channels,
        }
    }
}

fn dominant_band(powers: [f64; 5]) -> Option<&'static str> {
    powers
        .iter()
        .zip(BANDS.iter())
        .filter(|(power, _)| power.is_finite() && **power > 0.0)
        .max_by(|a, b| a.0.total_cmp(b.0))
        .map(|(_, band)| band.name)
}

/// Write a report to the log
pub fn log_report(report: &MonitorReport) {
    info!(
        status = %report.status,
        blocks = report.stats.blocks_written,
        dropped = report.stats.frames_dropped,
        overwritten = report.stats.blocks_overwritten,
        lost_packets = report.stats.lost_packets,
        crc_errors = report.stats.crc_errors,
        lock_max_ns = report.lock.max_hold_ns,
        lock_mean_ns = report.lock.mean_hold_ns(),
        dominant = report.dominant_band.unwrap_or("-"),
        "Acquisition"
    );
    if let Some(powers) = report.band_powers {
        info!(
            delta = powers[0],
            theta = powers[1],
            alpha = powers[2],
            beta = powers[3],
            gamma = powers[4],
            "Band power"
        );
    }
    for channel in &report.channels {
        info!(
            channel = %channel.name,
            mean = channel.stats.mean,
            rms = channel.stats.rms,
            p2p = channel.stats.peak_to_peak,
            dominant = channel.dominant_band.unwrap_or("-"),
            "Channel"
        );
    }
}
