//! Raw frame layout and ADC calibration parameters

use crate::error::{ExgError, ExgResult};
use serde::{Deserialize, Serialize};

/// Maximum channels a single frame may carry
pub const MAX_CHANNELS: usize = 64;

/// Byte order of multi-byte samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Big,
    Little,
}

/// Layout of one sample frame: optional status bytes followed by one
/// sample per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Number of multiplexed channels
    pub channel_count: usize,
    /// Bytes per sample (1 to 4)
    pub bytes_per_sample: usize,
    /// Status bytes preceding the channel samples of every frame
    #[serde(default)]
    pub status_bytes: usize,
    /// Byte order of each sample
    pub endianness: Endianness,
    /// Two's complement samples (sign extended) or unsigned
    pub signed: bool,
}

impl FrameLayout {
    /// Layout with no status bytes, signed big-endian samples
    pub fn new(channel_count: usize, bytes_per_sample: usize) -> ExgResult<Self> {
        let layout = Self {
            channel_count,
            bytes_per_sample,
            status_bytes: 0,
            endianness: Endianness::Big,
            signed: true,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// 24-bit ADS-style layout: 3 status bytes then 3 bytes per channel
    pub fn ads24(channel_count: usize) -> Self {
        Self {
            channel_count,
            bytes_per_sample: 3,
            status_bytes: 3,
            endianness: Endianness::Big,
            signed: true,
        }
    }

    pub fn with_status_bytes(mut self, status_bytes: usize) -> Self {
        self.status_bytes = status_bytes;
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Bytes occupied by one sample frame
    pub fn stride(&self) -> usize {
        self.status_bytes + self.channel_count * self.bytes_per_sample
    }

    /// Significant bits per sample
    pub fn bits(&self) -> u32 {
        (self.bytes_per_sample * 8) as u32
    }

    /// Validate layout parameters
    pub fn validate(&self) -> ExgResult<()> {
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ExgError::config(format!(
                "channel count {} outside 1-{}",
                self.channel_count, MAX_CHANNELS
            )));
        }
        if !(1..=4).contains(&self.bytes_per_sample) {
            return Err(ExgError::config(format!(
                "bytes per sample {} outside 1-4",
                self.bytes_per_sample
            )));
        }
        Ok(())
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::ads24(8)
    }
}

/// Linear ADC-to-physical-unit conversion: `value = raw * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub scale: f32,
    #[serde(default)]
    pub offset: f32,
}

impl Calibration {
    pub fn new(scale: f32, offset: f32) -> Self {
        Self { scale, offset }
    }

    /// Raw counts pass through unchanged
    pub fn identity() -> Self {
        Self::new(1.0, 0.0)
    }

    /// Microvolts per LSB for a bipolar ADC: `v_ref / gain / (2^(bits-1) - 1) * 1e6`
    pub fn from_reference(v_ref: f64, gain: f64, bits: u32) -> ExgResult<Self> {
        if gain <= 0.0 {
            return Err(ExgError::config("amplifier gain must be positive"));
        }
        if v_ref <= 0.0 {
            return Err(ExgError::config("reference voltage must be positive"));
        }
        if !(2..=32).contains(&bits) {
            return Err(ExgError::config(format!("ADC resolution {} bits unsupported", bits)));
        }
        let full_scale = ((1u64 << (bits - 1)) - 1) as f64;
        let lsb_to_uv = v_ref / gain / full_scale * 1e6;
        Ok(Self::new(lsb_to_uv as f32, 0.0))
    }

    #[inline]
    pub fn apply(&self, raw: i64) -> f32 {
        raw as f32 * self.scale + self.offset
    }

    /// Inverse of [`Calibration::apply`], rounded to the nearest count
    #[inline]
    pub fn invert(&self, value: f32) -> i64 {
        (((value - self.offset) as f64) / self.scale as f64).round() as i64
    }
}

impl Default for Calibration {
    fn default() -> Self {
        // 4.5 V reference, gain 24, 24-bit ADC
        Self::new((4.5 / 24.0 / 8_388_607.0 * 1e6) as f32, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ads24_stride() {
        let layout = FrameLayout::ads24(8);
        assert_eq!(layout.stride(), 27);
        assert_eq!(layout.bits(), 24);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_layout_validation() {
        assert!(FrameLayout::new(0, 3).is_err());
        assert!(FrameLayout::new(4, 5).is_err());
        assert!(FrameLayout::new(MAX_CHANNELS + 1, 2).is_err());
        assert_eq!(FrameLayout::new(4, 2).unwrap().stride(), 8);
    }

    #[test]
    fn test_reference_calibration() {
        let cal = Calibration::from_reference(4.5, 24.0, 24).unwrap();
        let expected = 4.5 / 24.0 / 8_388_607.0 * 1e6;
        assert!((cal.scale as f64 - expected).abs() < 1e-6);
        assert_eq!(cal, Calibration::default());
        assert!(Calibration::from_reference(4.5, 0.0, 24).is_err());
    }

    #[test]
    fn test_calibration_inverse() {
        let cal = Calibration::new(0.5, 10.0);
        assert_eq!(cal.apply(4), 12.0);
        assert_eq!(cal.invert(12.0), 4);
    }
}
