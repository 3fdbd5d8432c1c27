//! Filter configuration: declarative specs that build an SOS filter bank

use crate::design::{self, FilterKind, DEFAULT_NOTCH_Q};
use crate::sos::{InitialState, SosFilterBank, SosSection};
use exg_core::{ExgError, ExgResult};
use serde::{Deserialize, Serialize};

fn default_order() -> usize {
    4
}

fn default_q() -> f64 {
    DEFAULT_NOTCH_Q
}

/// One stage of the per-channel cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Explicit `[b0, b1, b2, a0, a1, a2]` rows applied to every channel
    Sos { sections: Vec<[f64; 6]> },
    /// Explicit rows per channel
    PerChannelSos { channels: Vec<Vec<[f64; 6]>> },
    Butterworth {
        kind: FilterKind,
        #[serde(default = "default_order")]
        order: usize,
        /// Cutoff for low/high-pass
        #[serde(default)]
        cutoff: Option<f64>,
        /// Band edges for band-pass
        #[serde(default)]
        low: Option<f64>,
        #[serde(default)]
        high: Option<f64>,
    },
    Notch {
        freq: f64,
        #[serde(default = "default_q")]
        q: f64,
    },
    /// Main display filter: low-pass when `high_pass == 0`, band-pass otherwise
    Passband {
        high_pass: f64,
        low_pass: f64,
        #[serde(default = "default_order")]
        order: usize,
    },
}

impl FilterSpec {
    pub fn lowpass(order: usize, cutoff: f64) -> Self {
        FilterSpec::Butterworth { kind: FilterKind::Lowpass, order, cutoff: Some(cutoff), low: None, high: None }
    }

    pub fn highpass(order: usize, cutoff: f64) -> Self {
        FilterSpec::Butterworth { kind: FilterKind::Highpass, order, cutoff: Some(cutoff), low: None, high: None }
    }

    pub fn bandpass(order: usize, low: f64, high: f64) -> Self {
        FilterSpec::Butterworth { kind: FilterKind::Bandpass, order, cutoff: None, low: Some(low), high: Some(high) }
    }

    pub fn notch(freq: f64) -> Self {
        FilterSpec::Notch { freq, q: DEFAULT_NOTCH_Q }
    }

    /// Sections this stage contributes to `channel`
    pub fn sections(&self, channel: usize, channel_count: usize, fs: f64) -> ExgResult<Vec<SosSection>> {
        match self {
            FilterSpec::Sos { sections } => rows_to_sections(sections),
            FilterSpec::PerChannelSos { channels } => {
                if channels.len() != channel_count {
                    return Err(ExgError::config(format!(
                        "per-channel SOS lists {} channels, device has {}",
                        channels.len(),
                        channel_count
                    )));
                }
                rows_to_sections(&channels[channel])
            }
            FilterSpec::Butterworth { kind, order, cutoff, low, high } => match kind {
                FilterKind::Lowpass => design::butter_lowpass(*order, require(*cutoff, "cutoff")?, fs),
                FilterKind::Highpass => design::butter_highpass(*order, require(*cutoff, "cutoff")?, fs),
                FilterKind::Bandpass => {
                    design::butter_bandpass(*order, require(*low, "low")?, require(*high, "high")?, fs)
                }
            },
            FilterSpec::Notch { freq, q } => Ok(vec![design::notch(*freq, *q, fs)?]),
            FilterSpec::Passband { high_pass, low_pass, order } => {
                let nyquist = fs / 2.0;
                if *high_pass < 0.0 || low_pass <= high_pass || *low_pass >= nyquist {
                    return Err(ExgError::config(format!(
                        "passband {}-{} Hz invalid for Nyquist {} Hz",
                        high_pass, low_pass, nyquist
                    )));
                }
                if *high_pass == 0.0 {
                    design::butter_lowpass(*order, *low_pass, fs)
                } else {
                    design::butter_bandpass(*order, *high_pass, *low_pass, fs)
                }
            }
        }
    }
}

fn require(value: Option<f64>, name: &str) -> ExgResult<f64> {
    value.ok_or_else(|| ExgError::config(format!("butterworth filter requires `{}`", name)))
}

fn rows_to_sections(rows: &[[f64; 6]]) -> ExgResult<Vec<SosSection>> {
    rows.iter().map(|row| SosSection::from_row(*row)).collect()
}

/// Filter chain of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Stages, cascaded in declaration order
    #[serde(default)]
    pub stages: Vec<FilterSpec>,
    #[serde(default)]
    pub initial_state: InitialState,
}

impl FilterConfig {
    pub fn new(stages: Vec<FilterSpec>) -> Self {
        Self { stages, initial_state: InitialState::Zero }
    }

    pub fn with_initial_state(mut self, initial_state: InitialState) -> Self {
        self.initial_state = initial_state;
        self
    }

    /// Concatenated sections per channel
    pub fn cascades(&self, channel_count: usize, fs: f64) -> ExgResult<Vec<Vec<SosSection>>> {
        (0..channel_count)
            .map(|channel| {
                let mut sections = Vec::new();
                for stage in &self.stages {
                    sections.extend(stage.sections(channel, channel_count, fs)?);
                }
                Ok(sections)
            })
            .collect()
    }

    /// Build the filter bank, failing with `UnstableFilter` on any pole at or
    /// outside the unit circle
    pub fn build(&self, channel_count: usize, fs: f64) -> ExgResult<SosFilterBank> {
        SosFilterBank::new(self.cascades(channel_count, fs)?, self.initial_state.clone())
    }
}
