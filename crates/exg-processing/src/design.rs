//! Filter design: Butterworth and notch filters as second-order sections
//!
//! Butterworth designs use the bilinear transform with frequency pre-warping,
//! `K = tan(pi * fc / fs)`. Each conjugate pole pair becomes one biquad; odd
//! orders add a first-order section.

use crate::sos::SosSection;
use exg_core::{ExgError, ExgResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Highest Butterworth order accepted by the designers
pub const MAX_ORDER: usize = 16;

/// Default notch quality factor
pub const DEFAULT_NOTCH_Q: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

fn check_cutoff(cutoff: f64, fs: f64) -> ExgResult<()> {
    if !(fs > 0.0) {
        return Err(ExgError::config(format!("sampling rate {} must be positive", fs)));
    }
    if !(cutoff > 0.0 && cutoff < fs / 2.0) {
        return Err(ExgError::config(format!(
            "cutoff {} Hz must lie strictly between 0 and Nyquist ({} Hz)",
            cutoff,
            fs / 2.0
        )));
    }
    Ok(())
}

fn check_order(order: usize) -> ExgResult<()> {
    if order == 0 || order > MAX_ORDER {
        return Err(ExgError::config(format!(
            "filter order {} outside 1-{}",
            order, MAX_ORDER
        )));
    }
    Ok(())
}

/// Q factor of the k-th conjugate pole pair of an order-N Butterworth prototype
fn pair_q(k: usize, order: usize) -> f64 {
    1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).sin())
}

fn butterworth(kind: FilterKind, order: usize, cutoff: f64, fs: f64) -> ExgResult<Vec<SosSection>> {
    check_order(order)?;
    check_cutoff(cutoff, fs)?;

    let k = (PI * cutoff / fs).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity((order + 1) / 2);

    for pair in 0..order / 2 {
        let q = pair_q(pair, order);
        let norm = 1.0 / (1.0 + k / q + k2);
        let a1 = 2.0 * (k2 - 1.0) * norm;
        let a2 = (1.0 - k / q + k2) * norm;
        let section = match kind {
            FilterKind::Highpass => SosSection::new(norm, -2.0 * norm, norm, a1, a2),
            _ => {
                let b0 = k2 * norm;
                SosSection::new(b0, 2.0 * b0, b0, a1, a2)
            }
        };
        sections.push(section);
    }

    if order % 2 == 1 {
        let a1 = (k - 1.0) / (k + 1.0);
        let section = match kind {
            FilterKind::Highpass => {
                let b0 = 1.0 / (k + 1.0);
                SosSection::new(b0, -b0, 0.0, a1, 0.0)
            }
            _ => {
                let b0 = k / (k + 1.0);
                SosSection::new(b0, b0, 0.0, a1, 0.0)
            }
        };
        sections.push(section);
    }

    Ok(sections)
}

/// Butterworth low-pass of the given order
pub fn butter_lowpass(order: usize, cutoff: f64, fs: f64) -> ExgResult<Vec<SosSection>> {
    butterworth(FilterKind::Lowpass, order, cutoff, fs)
}

/// Butterworth high-pass of the given order
pub fn butter_highpass(order: usize, cutoff: f64, fs: f64) -> ExgResult<Vec<SosSection>> {
    butterworth(FilterKind::Highpass, order, cutoff, fs)
}

/// Band-pass built as a high-pass at `low` followed by a low-pass at `high`
pub fn butter_bandpass(order: usize, low: f64, high: f64, fs: f64) -> ExgResult<Vec<SosSection>> {
    if !(low < high) {
        return Err(ExgError::config(format!(
            "band-pass low cutoff {} Hz must be below high cutoff {} Hz",
            low, high
        )));
    }
    let mut sections = butter_highpass(order, low, fs)?;
    sections.extend(butter_lowpass(order, high, fs)?);
    Ok(sections)
}

/// Second-order IIR notch at `freq` with quality factor `q`
pub fn notch(freq: f64, q: f64, fs: f64) -> ExgResult<SosSection> {
    check_cutoff(freq, fs)?;
    if !(q > 0.0) {
        return Err(ExgError::config(format!("notch Q {} must be positive", q)));
    }

    let w0 = 2.0 * PI * freq / fs;
    let bandwidth = w0 / q;
    let beta = (bandwidth / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);
    let cos_w0 = w0.cos();

    Ok(SosSection::new(
        gain,
        -2.0 * gain * cos_w0,
        gain,
        -2.0 * gain * cos_w0,
        2.0 * gain - 1.0,
    ))
}

/// Magnitude of the cascade's frequency response at `freq` Hz
pub fn magnitude_response(sections: &[SosSection], freq: f64, fs: f64) -> f64 {
    let z_inv = Complex64::from_polar(1.0, -2.0 * PI * freq / fs);
    let z_inv2 = z_inv * z_inv;

    sections
        .iter()
        .map(|s| {
            let num = s.b0 + z_inv * s.b1 + z_inv2 * s.b2;
            let den = 1.0 + z_inv * s.a1 + z_inv2 * s.a2;
            (num / den).norm()
        })
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sos::{InitialState, SosFilterBank};
    use exg_core::SampleBlock;

    fn db(gain: f64) -> f64 {
        20.0 * gain.log10()
    }

    #[test]
    fn test_butterworth_half_power_at_cutoff() {
        for order in 1..=8 {
            let lp = butter_lowpass(order, 40.0, 1000.0).unwrap();
            let hp = butter_highpass(order, 40.0, 1000.0).unwrap();
            assert_eq!(lp.len(), (order + 1) / 2);
            assert!((db(magnitude_response(&lp, 40.0, 1000.0)) + 3.0103).abs() < 0.01);
            assert!((db(magnitude_response(&hp, 40.0, 1000.0)) + 3.0103).abs() < 0.01);
            assert!((magnitude_response(&lp, 0.0, 1000.0) - 1.0).abs() < 1e-9);
            assert!((magnitude_response(&hp, 499.999, 1000.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_second_order_matches_closed_form() {
        // Classic 2nd order bilinear Butterworth low-pass
        let k = (PI * 100.0 / 1000.0).tan();
        let sqrt2 = std::f64::consts::SQRT_2;
        let denom = k * k + sqrt2 * k + 1.0;

        let sections = butter_lowpass(2, 100.0, 1000.0).unwrap();
        let s = sections[0];
        assert!((s.b0 - k * k / denom).abs() < 1e-12);
        assert!((s.a1 - 2.0 * (k * k - 1.0) / denom).abs() < 1e-12);
        assert!((s.a2 - (k * k - sqrt2 * k + 1.0) / denom).abs() < 1e-12);
    }

    #[test]
    fn test_designs_are_stable_at_extreme_ratios() {
        let sections = butter_highpass(8, 0.1, 4000.0).unwrap();
        assert!(sections.iter().all(SosSection::is_stable));
        assert!(SosFilterBank::uniform(sections, 4, InitialState::Zero).is_ok());
    }

    #[test]
    fn test_invalid_cutoffs_rejected() {
        assert!(butter_lowpass(4, 0.0, 1000.0).is_err());
        assert!(butter_lowpass(4, 500.0, 1000.0).is_err());
        assert!(butter_highpass(0, 10.0, 1000.0).is_err());
        assert!(butter_highpass(MAX_ORDER + 1, 10.0, 1000.0).is_err());
        assert!(butter_bandpass(4, 40.0, 10.0, 1000.0).is_err());
        assert!(notch(50.0, 0.0, 1000.0).is_err());
        assert!(notch(600.0, 30.0, 1000.0).is_err());
    }

    #[test]
    fn test_bandpass_passes_center_rejects_edges() {
        let sections = butter_bandpass(4, 1.0, 40.0, 1000.0).unwrap();
        assert_eq!(sections.len(), 4);
        assert!(magnitude_response(&sections, 10.0, 1000.0) > 0.99);
        assert!(magnitude_response(&sections, 0.05, 1000.0) < 1e-3);
        assert!(magnitude_response(&sections, 300.0, 1000.0) < 1e-3);
    }

    #[test]
    fn test_notch_response() {
        let section = notch(50.0, DEFAULT_NOTCH_Q, 1000.0).unwrap();
        assert!(section.is_stable());
        assert!(magnitude_response(&[section], 50.0, 1000.0) < 1e-9);
        assert!(magnitude_response(&[section], 10.0, 1000.0) > 0.99);
        assert!(magnitude_response(&[section], 100.0, 1000.0) > 0.99);
    }

    #[test]
    fn test_notch_removes_line_noise_in_time_domain() {
        let fs = 1000.0;
        let section = notch(50.0, DEFAULT_NOTCH_Q, fs).unwrap();
        let mut bank = SosFilterBank::uniform(vec![section], 1, InitialState::Zero).unwrap();

        let signal: Vec<f32> = (0..5000)
            .map(|i| (2.0 * PI * 50.0 * i as f64 / fs).sin() as f32 * 100.0)
            .collect();
        let out = bank.apply(SampleBlock::new(signal, 1, 0, 0).unwrap()).unwrap();

        let tail = &out.as_slice()[4000..];
        let peak = tail.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        assert!(peak < 10.0, "residual 50 Hz amplitude {}", peak);
    }

    #[test]
    fn test_highpass_removes_dc_preserves_sine_4khz() {
        // 4 channels at 4000 Hz, 0.5 Hz high-pass as two sections, 60 s of
        // DC offset plus a 10 Hz burst starting at 20 s
        let fs = 4000.0;
        let channels = 4;
        let offset = 100.0;
        let amplitude = 50.0;
        let burst_start = 20.0;

        let sections = butter_highpass(4, 0.5, fs).unwrap();
        assert_eq!(sections.len(), 2);
        let mut bank = SosFilterBank::uniform(sections, channels, InitialState::Zero).unwrap();

        let block_len = 200;
        let total = (60.0 * fs) as usize;
        let tail_start = (50.0 * fs) as usize;
        let mut tail: Vec<Vec<f32>> = vec![Vec::new(); channels];

        for start in (0..total).step_by(block_len) {
            let input: Vec<Vec<f32>> = (0..channels)
                .map(|ch| {
                    (start..start + block_len)
                        .map(|n| {
                            let t = n as f64 / fs;
                            let burst = if t >= burst_start {
                                amplitude * (2.0 * PI * 10.0 * t + ch as f64).sin()
                            } else {
                                0.0
                            };
                            (offset + burst) as f32
                        })
                        .collect()
                })
                .collect();
            let block = SampleBlock::from_channels(&input, 0, 0).unwrap();
            let out = bank.apply(block).unwrap();

            if start >= tail_start {
                for (ch, samples) in out.channels().enumerate() {
                    tail[ch].extend_from_slice(samples);
                }
            }
        }

        for samples in &tail {
            // 10 s is a whole number of 10 Hz periods
            let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / samples.len() as f64;
            let rms = (samples.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>()
                / samples.len() as f64)
                .sqrt();

            assert!(mean.abs() < 0.01 * offset, "DC residual {}", mean);
            let recovered = rms * std::f64::consts::SQRT_2;
            assert!((recovered - amplitude).abs() < 0.02 * amplitude, "amplitude {}", recovered);
        }
    }
}
