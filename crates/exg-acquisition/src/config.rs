//! Session configuration
//!
//! A session is described by one TOML document. Every section has defaults
//! matching the 8-channel ADS-style amplifier, so an empty file is a valid
//! configuration for the simulated device.

use crate::framing::{connect_tcp, PacketDeframer};
use crate::simulator::{SimulatedDevice, SimulatorConfig};
use crate::transport::Transport;
use exg_core::{Calibration, ExgError, ExgResult, FrameLayout};
use exg_processing::{FilterConfig, FilterSpec, SpatialFilterConfig, SpectrumAnalyzer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Complete configuration of one acquisition session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub device: DeviceConfig,
    pub filters: FilterConfig,
    /// Artifact-cleaning matrix applied after the filter bank
    pub spatial_filter: Option<SpatialFilterConfig>,
    pub buffer: BufferConfig,
    pub acquisition: AcquisitionConfig,
    pub source: SourceConfig,
    pub display: DisplayConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            filters: FilterConfig::new(vec![FilterSpec::Passband { high_pass: 0.0, low_pass: 100.0, order: 4 }]),
            spatial_filter: None,
            buffer: BufferConfig::default(),
            acquisition: AcquisitionConfig::default(),
            source: SourceConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Amplifier description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub sampling_rate: f64,
    pub channel_names: Vec<String>,
    pub layout: FrameLayout,
    pub calibration: CalibrationConfig,
    /// Sample frames carried by one transport frame
    pub frames_per_packet: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let layout = FrameLayout::ads24(8);
        Self {
            sampling_rate: 1000.0,
            channel_names: (1..=layout.channel_count).map(|i| format!("CH {}", i)).collect(),
            layout,
            calibration: CalibrationConfig::default(),
            frames_per_packet: 50,
        }
    }
}

impl DeviceConfig {
    pub fn channel_count(&self) -> usize {
        self.layout.channel_count
    }

    /// Bytes in one transport frame
    pub fn packet_payload_size(&self) -> usize {
        self.frames_per_packet * self.layout.stride()
    }
}

/// ADC calibration: derived from reference voltage and gain unless an
/// explicit scale is given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub v_ref: f64,
    pub gain: f64,
    /// Microvolts per count, overrides `v_ref`/`gain`
    pub scale: Option<f32>,
    pub offset: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { v_ref: 4.5, gain: 24.0, scale: None, offset: 0.0 }
    }
}

impl CalibrationConfig {
    pub fn resolve(&self, bits: u32) -> ExgResult<Calibration> {
        match self.scale {
            Some(scale) if scale.is_finite() && scale != 0.0 => Ok(Calibration::new(scale, self.offset)),
            Some(scale) => Err(ExgError::config(format!("calibration scale {} is not usable", scale))),
            None => {
                let mut calibration = Calibration::from_reference(self.v_ref, self.gain, bits)?;
                calibration.offset = self.offset;
                Ok(calibration)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Ring buffer capacity in blocks
    pub capacity_blocks: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity_blocks: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Upper bound on one transport read, and so on stop latency
    pub read_timeout_ms: u64,
    /// Consecutive `FrameSizeMismatch` frames after which the stream is
    /// declared malformed
    pub max_consecutive_mismatches: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self { read_timeout_ms: 100, max_consecutive_mismatches: 100 }
    }
}

impl AcquisitionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Where raw frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Simulated(SimulatorConfig),
    Tcp {
        host: String,
        port: u16,
        #[serde(default = "default_true")]
        verify_crc: bool,
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Simulated(SimulatorConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub downsample_factor: usize,
    /// Blocks taken per display snapshot
    pub snapshot_blocks: usize,
    pub spectrum_window_seconds: f64,
    pub refresh_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            downsample_factor: 10,
            snapshot_blocks: 100,
            spectrum_window_seconds: 1.0,
            refresh_ms: 33,
        }
    }
}

impl SessionConfig {
    /// Read and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> ExgResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ExgError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let config = Self::from_toml(&text)?;
        info!(path = %path.display(), "Loaded session configuration");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> ExgResult<Self> {
        let config: SessionConfig = toml::from_str(text).map_err(|e| ExgError::Serialization {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ExgResult<String> {
        toml::to_string_pretty(self).map_err(|e| ExgError::Serialization { reason: e.to_string() })
    }

    pub fn calibration(&self) -> ExgResult<Calibration> {
        self.device.calibration.resolve(self.device.layout.bits())
    }

    /// Reject inconsistent values before any session is created
    pub fn validate(&self) -> ExgResult<()> {
        let device = &self.device;
        if !(device.sampling_rate.is_finite() && device.sampling_rate > 0.0) {
            return Err(ExgError::config(format!("sampling rate {} must be positive", device.sampling_rate)));
        }
        device.layout.validate()?;
        if device.channel_names.len() != device.channel_count() {
            return Err(ExgError::config(format!(
                "{} channel names for {} channels",
                device.channel_names.len(),
                device.channel_count()
            )));
        }
        if device.frames_per_packet == 0 {
            return Err(ExgError::config("frames per packet must be positive"));
        }
        self.calibration()?;

        if self.buffer.capacity_blocks == 0 {
            return Err(ExgError::config("ring buffer capacity must be positive"));
        }
        if self.acquisition.read_timeout_ms == 0 {
            return Err(ExgError::config("read timeout must be positive"));
        }
        if self.acquisition.max_consecutive_mismatches == 0 {
            return Err(ExgError::config("mismatch limit must be positive"));
        }

        let display = &self.display;
        if display.downsample_factor == 0 {
            return Err(ExgError::config("downsample factor must be positive"));
        }
        if display.snapshot_blocks == 0 || display.snapshot_blocks > self.buffer.capacity_blocks {
            return Err(ExgError::config(format!(
                "snapshot of {} blocks does not fit a {} block buffer",
                display.snapshot_blocks, self.buffer.capacity_blocks
            )));
        }
        if display.refresh_ms == 0 {
            return Err(ExgError::config("display refresh interval must be positive"));
        }
        self.spectrum_analyzer()?;

        if let SourceConfig::Tcp { host, .. } = &self.source {
            if host.trim().is_empty() {
                return Err(ExgError::config("tcp source needs a host"));
            }
        }

        self.filters.build(device.channel_count(), device.sampling_rate)?;
        if let Some(spatial) = &self.spatial_filter {
            spatial.build(device.channel_count())?;
        }
        Ok(())
    }

    pub fn spectrum_analyzer(&self) -> ExgResult<SpectrumAnalyzer> {
        SpectrumAnalyzer::for_window(self.display.spectrum_window_seconds, self.device.sampling_rate)
    }

    /// Open the configured transport
    pub fn open_transport(&self) -> ExgResult<Box<dyn Transport>> {
        let device = &self.device;
        match &self.source {
            SourceConfig::Simulated(simulator) => Ok(Box::new(SimulatedDevice::new(
                simulator.clone(),
                device.layout.clone(),
                self.calibration()?,
                device.sampling_rate,
                device.frames_per_packet,
            )?)),
            SourceConfig::Tcp { host, port, verify_crc, connect_timeout_ms } => {
                let stream = connect_tcp(&format!("{}:{}", host, port), Duration::from_millis(*connect_timeout_ms))?;
                Ok(Box::new(PacketDeframer::new(stream, device.packet_payload_size(), *verify_crc)?))
            }
        }
    }
}
