//! Simulated ExG device
//!
//! Produces raw frames in the configured device layout: per-channel alpha
//! rhythm, slow drift, powerline interference, DC offset and Gaussian noise,
//! encoded through the same layout and calibration the decoder uses. In
//! real-time mode frames are paced at the sampling rate.

use crate::transport::Transport;
use exg_core::{Calibration, ExgError, ExgResult, FrameLayout, SampleBlock};
use exg_processing::FrameEncoder;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

/// Signal model of the simulated device, amplitudes in microvolts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub seed: Option<u64>,
    /// Pace frames at the sampling rate instead of producing them on demand
    pub realtime: bool,
    pub alpha_frequency: f64,
    pub alpha_amplitude: f64,
    pub drift_amplitude: f64,
    pub line_frequency: Option<f64>,
    pub line_amplitude: f64,
    pub dc_offset: f64,
    pub noise_std: f64,
    /// Disconnect after this many frames
    pub disconnect_after: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            realtime: true,
            alpha_frequency: 10.0,
            alpha_amplitude: 20.0,
            drift_amplitude: 15.0,
            line_frequency: Some(50.0),
            line_amplitude: 5.0,
            dc_offset: 300.0,
            noise_std: 2.0,
            disconnect_after: None,
        }
    }
}

/// Device simulator acting as a transport
pub struct SimulatedDevice {
    config: SimulatorConfig,
    encoder: FrameEncoder,
    sampling_rate: f64,
    frames_per_read: usize,
    rng: rand::rngs::StdRng,
    noise: Normal<f64>,
    phases: Vec<f64>,
    sample_index: u64,
    frames_sent: u64,
    next_due: Option<Instant>,
}

impl SimulatedDevice {
    pub fn new(
        config: SimulatorConfig,
        layout: FrameLayout,
        calibration: Calibration,
        sampling_rate: f64,
        frames_per_read: usize,
    ) -> ExgResult<Self> {
        if !(sampling_rate > 0.0) {
            return Err(ExgError::config("simulator sampling rate must be positive"));
        }
        if frames_per_read == 0 {
            return Err(ExgError::config("simulator needs at least one sample per frame"));
        }

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| ExgError::config(format!("invalid noise level: {}", e)))?;
        let phases = (0..layout.channel_count).map(|_| rng.gen_range(0.0..2.0 * PI)).collect();

        Ok(SimulatedDevice {
            encoder: FrameEncoder::new(layout, calibration)?,
            config,
            sampling_rate,
            frames_per_read,
            rng,
            noise,
            phases,
            sample_index: 0,
            frames_sent: 0,
            next_due: None,
        })
    }

    /// Duration covered by one raw frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_read as f64 / self.sampling_rate)
    }

    fn sample_at(&mut self, channel: usize, t: f64) -> f64 {
        let phase = self.phases[channel];
        let c = &self.config;
        // Alpha waxes and wanes over a few seconds
        let envelope = 0.6 + 0.4 * (2.0 * PI * 0.2 * t + phase).sin();
        let mut value = c.dc_offset + channel as f64 * 10.0;
        value += c.alpha_amplitude * envelope * (2.0 * PI * c.alpha_frequency * t + phase).sin();
        value += c.drift_amplitude * (2.0 * PI * 0.1 * t + phase).sin();
        if let Some(line) = c.line_frequency {
            value += c.line_amplitude * (2.0 * PI * line * t).sin();
        }
        value + self.noise.sample(&mut self.rng)
    }

    /// Generate the next block of samples, channel-major
    pub fn generate(&mut self) -> ExgResult<SampleBlock> {
        let channels = self.encoder.layout().channel_count;
        let start = self.sample_index;
        let mut data = Vec::with_capacity(channels * self.frames_per_read);
        for channel in 0..channels {
            for n in 0..self.frames_per_read as u64 {
                let t = (start + n) as f64 / self.sampling_rate;
                data.push(self.sample_at(channel, t) as f32);
            }
        }
        self.sample_index += self.frames_per_read as u64;
        SampleBlock::new(data, channels, 0, 0)
    }

    /// Wait until the next frame is due, or time out
    fn pace(&mut self, timeout: Duration) -> ExgResult<()> {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now + timeout {
            std::thread::sleep(timeout);
            return Err(ExgError::TransportTimeout);
        }
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due + self.frame_duration());
        Ok(())
    }
}

impl Transport for SimulatedDevice {
    fn read_frame(&mut self, timeout: Duration) -> ExgResult<Vec<u8>> {
        if let Some(limit) = self.config.disconnect_after {
            if self.frames_sent >= limit {
                return Err(ExgError::TransportDisconnected {
                    reason: format!("simulated device disconnected after {} frames", limit),
                });
            }
        }
        if self.config.realtime {
            self.pace(timeout)?;
        }

        let block = self.generate()?;
        let raw = self.encoder.encode(&block)?;
        self.frames_sent += 1;
        Ok(raw)
    }

    fn describe(&self) -> String {
        format!(
            "simulated:{}ch@{}Hz",
            self.encoder.layout().channel_count,
            self.sampling_rate
        )
    }
}
