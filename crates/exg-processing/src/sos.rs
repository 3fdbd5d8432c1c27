//! Cascaded second-order-section filtering
//!
//! Each channel owns an independent cascade of biquads in transposed direct
//! form II with two delay-line values per section. Coefficients and delay
//! lines are kept in `f64`; samples stay `f32`. Construction checks every
//! section's poles and refuses coefficient sets with a pole on or outside the
//! unit circle.

use exg_core::{critical, ExgError, ExgResult, SampleBlock};
use serde::{Deserialize, Serialize};

/// Single biquad section, normalised so that `a0 == 1`:
/// `y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SosSection {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl SosSection {
    pub fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self { b0, b1, b2, a1, a2 }
    }

    /// Build from a `[b0, b1, b2, a0, a1, a2]` row, normalising by `a0`
    pub fn from_row(row: [f64; 6]) -> ExgResult<Self> {
        let [b0, b1, b2, a0, a1, a2] = row;
        if row.iter().any(|c| !c.is_finite()) {
            return Err(ExgError::config("SOS coefficients must be finite"));
        }
        if a0 == 0.0 {
            return Err(ExgError::config("SOS row has a0 == 0"));
        }
        Ok(Self::new(b0 / a0, b1 / a0, b2 / a0, a1 / a0, a2 / a0))
    }

    /// Section that passes its input through unchanged
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn to_row(&self) -> [f64; 6] {
        [self.b0, self.b1, self.b2, 1.0, self.a1, self.a2]
    }

    /// Largest pole magnitude: roots of `z^2 + a1*z + a2`
    pub fn pole_magnitude(&self) -> f64 {
        let disc = self.a1 * self.a1 - 4.0 * self.a2;
        if disc < 0.0 {
            // Complex pair, |p|^2 = a2
            self.a2.sqrt()
        } else {
            let root = disc.sqrt();
            let p1 = (-self.a1 + root) / 2.0;
            let p2 = (-self.a1 - root) / 2.0;
            p1.abs().max(p2.abs())
        }
    }

    pub fn is_stable(&self) -> bool {
        self.pole_magnitude() < 1.0
    }

    /// Gain at DC, `H(z = 1)`
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Delay-line values for steady state under a unit step input
    fn step_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        let z1 = self.b2 - self.a2 * y;
        let z0 = self.b1 - self.a1 * y + z1;
        [z0, z1]
    }

    #[inline]
    fn tick(&self, x: f64, z: &mut [f64; 2]) -> f64 {
        let y = self.b0 * x + z[0];
        z[0] = self.b1 * x - self.a1 * y + z[1];
        z[1] = self.b2 * x - self.a2 * y;
        y
    }
}

/// Initial delay-line contents of every cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "values")]
pub enum InitialState {
    /// All delay lines start at zero
    Zero,
    /// Steady state for a constant input of the given level
    SteadyState(f64),
    /// Explicit `[channel][section] = [z0, z1]` values
    Explicit(Vec<Vec<[f64; 2]>>),
}

impl Default for InitialState {
    fn default() -> Self {
        InitialState::Zero
    }
}

/// Cascade of sections for one channel
#[derive(Debug, Clone)]
struct ChannelCascade {
    sections: Vec<SosSection>,
    state: Vec<[f64; 2]>,
    initial: Vec<[f64; 2]>,
}

impl ChannelCascade {
    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let mut value = *sample as f64;
            for (section, z) in self.sections.iter().zip(self.state.iter_mut()) {
                value = section.tick(value, z);
            }
            *sample = value as f32;
        }
    }

    fn reset(&mut self) {
        self.state.clone_from(&self.initial);
    }
}

/// Per-channel SOS filter bank
#[derive(Debug, Clone)]
pub struct SosFilterBank {
    cascades: Vec<ChannelCascade>,
}

impl SosFilterBank {
    /// Build a bank from one section list per channel
    pub fn new(per_channel: Vec<Vec<SosSection>>, initial: InitialState) -> ExgResult<Self> {
        if per_channel.is_empty() {
            return Err(ExgError::config("filter bank needs at least one channel"));
        }

        for (channel, sections) in per_channel.iter().enumerate() {
            for (index, section) in sections.iter().enumerate() {
                let coefficients = section.to_row();
                if coefficients.iter().any(|c| !c.is_finite()) {
                    return Err(ExgError::config(format!(
                        "channel {} section {} has non-finite coefficients",
                        channel, index
                    )));
                }
                let pole_magnitude = section.pole_magnitude();
                if !(pole_magnitude < 1.0) {
                    return Err(ExgError::UnstableFilter {
                        channel,
                        section: index,
                        pole_magnitude,
                    });
                }
            }
        }

        let mut cascades = Vec::with_capacity(per_channel.len());
        for (channel, sections) in per_channel.into_iter().enumerate() {
            let initial = initial_for(&initial, channel, &sections)?;
            cascades.push(ChannelCascade {
                state: initial.clone(),
                initial,
                sections,
            });
        }

        Ok(SosFilterBank { cascades })
    }

    /// Same cascade on every channel
    pub fn uniform(sections: Vec<SosSection>, channel_count: usize, initial: InitialState) -> ExgResult<Self> {
        Self::new(vec![sections; channel_count], initial)
    }

    /// Bank with no sections; blocks pass through unchanged
    pub fn passthrough(channel_count: usize) -> ExgResult<Self> {
        Self::new(vec![Vec::new(); channel_count], InitialState::Zero)
    }

    pub fn channel_count(&self) -> usize {
        self.cascades.len()
    }

    pub fn section_count(&self, channel: usize) -> usize {
        self.cascades.get(channel).map_or(0, |c| c.sections.len())
    }

    /// Filter every channel of the block in place, carrying state across calls
    pub fn apply(&mut self, mut block: SampleBlock) -> ExgResult<SampleBlock> {
        critical::compute_entered();

        if block.channel_count() != self.cascades.len() {
            return Err(ExgError::config(format!(
                "block has {} channels, filter bank has {}",
                block.channel_count(),
                self.cascades.len()
            )));
        }

        for (cascade, samples) in self.cascades.iter_mut().zip(block.channels_mut()) {
            cascade.process(samples);
        }

        Ok(block)
    }

    /// Restore every delay line to its configured initial state
    pub fn reset(&mut self) {
        for cascade in &mut self.cascades {
            cascade.reset();
        }
    }
}

fn initial_for(initial: &InitialState, channel: usize, sections: &[SosSection]) -> ExgResult<Vec<[f64; 2]>> {
    match initial {
        InitialState::Zero => Ok(vec![[0.0; 2]; sections.len()]),
        InitialState::SteadyState(level) => {
            // Each section sees the DC output of the sections before it
            let mut scale = *level;
            Ok(sections
                .iter()
                .map(|section| {
                    let [z0, z1] = section.step_state();
                    let state = [z0 * scale, z1 * scale];
                    scale *= section.dc_gain();
                    state
                })
                .collect())
        }
        InitialState::Explicit(values) => {
            let channel_values = values.get(channel).ok_or_else(|| {
                ExgError::config(format!("no initial state for channel {}", channel))
            })?;
            if channel_values.len() != sections.len() {
                return Err(ExgError::config(format!(
                    "channel {} has {} initial states for {} sections",
                    channel,
                    channel_values.len(),
                    sections.len()
                )));
            }
            Ok(channel_values.clone())
        }
    }
}
