//! Amplitude spectrum and EEG band power
//!
//! Runs on the reader side over a snapshot copy. Each channel window is mean
//! removed, Hann windowed and transformed with a real FFT; magnitudes are
//! scaled by `1 / N`. Band power is the mean squared magnitude over the bins
//! with `low <= f < high`.

use exg_core::{critical, ExgError, ExgResult};
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Frequency band `[low, high)` in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub name: &'static str,
    pub low: f64,
    pub high: f64,
}

pub const BANDS: [Band; 5] = [
    Band { name: "delta", low: 0.5, high: 4.0 },
    Band { name: "theta", low: 4.0, high: 8.0 },
    Band { name: "alpha", low: 8.0, high: 13.0 },
    Band { name: "beta", low: 13.0, high: 30.0 },
    Band { name: "gamma", low: 30.0, high: 100.0 },
];

/// One-sided amplitude spectrum of every channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    /// `[channel][bin]`
    pub magnitudes: Vec<Vec<f32>>,
}

impl Spectrum {
    /// Power in each of [`BANDS`] for `channel`
    pub fn band_powers(&self, channel: usize) -> Option<[f64; 5]> {
        let magnitudes = self.magnitudes.get(channel)?;
        let mut powers = [0.0; 5];
        for (power, band) in powers.iter_mut().zip(BANDS.iter()) {
            *power = band_power(magnitudes, &self.frequencies, band.low, band.high);
        }
        Some(powers)
    }

    /// Power in each of [`BANDS`] averaged over all channels
    pub fn mean_band_powers(&self) -> Option<[f64; 5]> {
        let channels = self.magnitudes.len();
        let mut mean = [0.0; 5];
        for channel in 0..channels {
            let powers = self.band_powers(channel)?;
            for (total, power) in mean.iter_mut().zip(powers) {
                *total += power;
            }
        }
        if channels == 0 {
            return None;
        }
        mean.iter_mut().for_each(|p| *p /= channels as f64);
        Some(mean)
    }
}

/// Mean of `|X|^2` over bins with `low <= f < high`; zero when no bin qualifies
pub fn band_power(magnitudes: &[f32], frequencies: &[f64], low: f64, high: f64) -> f64 {
    let (sum, count) = magnitudes
        .iter()
        .zip(frequencies)
        .filter(|(_, &f)| f >= low && f < high)
        .fold((0.0f64, 0usize), |(sum, count), (&m, _)| (sum + (m as f64).powi(2), count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Fixed-length spectrum analyzer with a planned FFT and precomputed window
pub struct SpectrumAnalyzer {
    sampling_rate: f64,
    len: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    frequencies: Vec<f64>,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("sampling_rate", &self.sampling_rate)
            .field("len", &self.len)
            .finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(len: usize, sampling_rate: f64) -> ExgResult<Self> {
        if len < 2 {
            return Err(ExgError::config("spectrum window needs at least 2 samples"));
        }
        if !(sampling_rate > 0.0) {
            return Err(ExgError::config("sampling rate must be positive"));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(len);

        // Symmetric Hann window
        let window = (0..len)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / (len - 1) as f64;
                (0.5 * (1.0 - phase.cos())) as f32
            })
            .collect();

        let frequencies = (0..len / 2 + 1)
            .map(|k| k as f64 * sampling_rate / len as f64)
            .collect();

        Ok(SpectrumAnalyzer { sampling_rate, len, fft, window, frequencies })
    }

    /// Analyzer covering `seconds` of signal
    pub fn for_window(seconds: f64, sampling_rate: f64) -> ExgResult<Self> {
        Self::new((seconds * sampling_rate).round() as usize, sampling_rate)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Amplitude spectrum of the last `len` samples of `samples`
    pub fn magnitudes(&self, samples: &[f32]) -> ExgResult<Vec<f32>> {
        critical::compute_entered();

        if samples.len() < self.len {
            return Err(ExgError::config(format!(
                "spectrum needs {} samples, got {}",
                self.len,
                samples.len()
            )));
        }
        let window = &samples[samples.len() - self.len..];

        let mean = window.iter().map(|&v| v as f64).sum::<f64>() / self.len as f64;
        let mut input: Vec<f32> = window
            .iter()
            .zip(&self.window)
            .map(|(&v, &w)| ((v as f64 - mean) as f32) * w)
            .collect();
        let mut output = self.fft.make_output_vec();

        self.fft
            .process(&mut input, &mut output)
            .map_err(|e| ExgError::config(format!("FFT failed: {}", e)))?;

        let scale = 1.0 / self.len as f32;
        Ok(output.iter().map(|c| c.norm() * scale).collect())
    }

    /// Spectrum of every channel
    pub fn spectrum(&self, channels: &[Vec<f32>]) -> ExgResult<Spectrum> {
        let magnitudes = channels
            .iter()
            .map(|samples| self.magnitudes(samples))
            .collect::<ExgResult<Vec<_>>>()?;

        Ok(Spectrum { frequencies: self.frequencies.clone(), magnitudes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, fs: f64, n: usize, amplitude: f64, offset: f64) -> Vec<f32> {
        (0..n)
            .map(|i| (offset + amplitude * (2.0 * PI * freq * i as f64 / fs).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_peak_at_signal_frequency() {
        let analyzer = SpectrumAnalyzer::new(1000, 250.0).unwrap();
        let magnitudes = analyzer.magnitudes(&sine(10.0, 250.0, 1000, 20.0, 0.0)).unwrap();

        let peak = magnitudes
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });
        assert_eq!(analyzer.frequencies()[peak.0], 10.0);
        // Hann coherent gain 0.5, one-sided amplitude halved
        assert!((peak.1 - 5.0).abs() < 0.1, "peak {}", peak.1);
    }

    #[test]
    fn test_dc_offset_removed() {
        let analyzer = SpectrumAnalyzer::new(512, 250.0).unwrap();
        let magnitudes = analyzer.magnitudes(&vec![300.0; 512]).unwrap();
        assert!(magnitudes.iter().all(|&m| m < 1e-3));
    }

    #[test]
    fn test_band_powers_pick_dominant_band() {
        let fs = 250.0;
        let analyzer = SpectrumAnalyzer::for_window(4.0, fs).unwrap();
        let channels = vec![
            sine(10.0, fs, 1000, 10.0, 50.0),
            sine(20.0, fs, 1000, 10.0, -5.0),
            sine(2.0, fs, 1000, 10.0, 0.0),
        ];
        let spectrum = analyzer.spectrum(&channels).unwrap();

        let argmax = |powers: [f64; 5]| {
            powers
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0
        };
        assert_eq!(BANDS[argmax(spectrum.band_powers(0).unwrap())].name, "alpha");
        assert_eq!(BANDS[argmax(spectrum.band_powers(1).unwrap())].name, "beta");
        assert_eq!(BANDS[argmax(spectrum.band_powers(2).unwrap())].name, "delta");
        assert!(spectrum.band_powers(3).is_none());
    }

    #[test]
    fn test_mean_band_powers_average_channels() {
        let spectrum = Spectrum {
            frequencies: vec![1.0, 5.0, 10.0, 20.0, 50.0],
            magnitudes: vec![vec![1.0, 0.0, 2.0, 0.0, 0.0], vec![3.0, 2.0, 0.0, 1.0, 4.0]],
        };
        assert_eq!(spectrum.mean_band_powers(), Some([5.0, 2.0, 2.0, 0.5, 8.0]));

        let empty = Spectrum { frequencies: vec![1.0], magnitudes: Vec::new() };
        assert_eq!(empty.mean_band_powers(), None);
    }

    #[test]
    fn test_band_edges() {
        let frequencies = [0.0, 4.0, 8.0, 13.0];
        let magnitudes = [1.0, 2.0, 3.0, 4.0];
        // 4 Hz belongs to theta, 8 Hz to alpha
        assert_eq!(band_power(&magnitudes, &frequencies, 4.0, 8.0), 4.0);
        assert_eq!(band_power(&magnitudes, &frequencies, 8.0, 13.0), 9.0);
        assert_eq!(band_power(&magnitudes, &frequencies, 30.0, 100.0), 0.0);
    }

    #[test]
    fn test_short_input_rejected() {
        let analyzer = SpectrumAnalyzer::new(256, 250.0).unwrap();
        assert!(analyzer.magnitudes(&[0.0; 100]).is_err());
        assert!(SpectrumAnalyzer::new(1, 250.0).is_err());
    }
}
