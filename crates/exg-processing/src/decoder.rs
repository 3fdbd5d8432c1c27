//! Raw frame decoding: device bytes to calibrated sample blocks
//!
//! A raw frame is a run of fixed-stride sample frames, each holding optional
//! status bytes followed by one sample per channel. Decoding reinterprets the
//! whole buffer as `frames × stride`, reshapes into channel-major order and
//! applies sign extension and calibration. Byte order and signedness are
//! resolved once when the decoder is built, so the per-sample path has no
//! branches.

use exg_core::{critical, Calibration, Endianness, ExgError, ExgResult, FrameLayout, SampleBlock};

type Unpack = fn(&[u8]) -> u32;
type Extend = fn(u32, u32) -> i64;

/// Stateless decoder for one frame layout
#[derive(Debug, Clone)]
pub struct SampleDecoder {
    layout: FrameLayout,
    calibration: Calibration,
    unpack: Unpack,
    extend: Extend,
    shift: u32,
}

impl SampleDecoder {
    pub fn new(layout: FrameLayout, calibration: Calibration) -> ExgResult<Self> {
        layout.validate()?;

        let unpack: Unpack = match (layout.bytes_per_sample, layout.endianness) {
            (1, _) => unpack_u8,
            (2, Endianness::Big) => unpack_be16,
            (2, Endianness::Little) => unpack_le16,
            (3, Endianness::Big) => unpack_be24,
            (3, Endianness::Little) => unpack_le24,
            (4, Endianness::Big) => unpack_be32,
            (4, Endianness::Little) => unpack_le32,
            _ => {
                return Err(ExgError::config(format!(
                    "unsupported sample width {}",
                    layout.bytes_per_sample
                )))
            }
        };
        let extend: Extend = if layout.signed { sign_extend } else { zero_extend };

        Ok(SampleDecoder {
            shift: 64 - layout.bits(),
            layout,
            calibration,
            unpack,
            extend,
        })
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Number of sample frames in a raw frame of `len` bytes, if it is well formed
    pub fn frames_in(&self, len: usize) -> Option<usize> {
        let stride = self.layout.stride();
        (len % stride == 0).then(|| len / stride)
    }

    /// Decode a raw frame into an unstamped block (sequence 0, timestamp 0)
    pub fn decode(&self, raw: &[u8]) -> ExgResult<SampleBlock> {
        critical::compute_entered();

        let stride = self.layout.stride();
        let frames = self.frames_in(raw.len()).ok_or(ExgError::FrameSizeMismatch {
            len: raw.len(),
            stride,
        })?;

        let channels = self.layout.channel_count;
        let width = self.layout.bytes_per_sample;
        let status = self.layout.status_bytes;
        if frames == 0 {
            return SampleBlock::new(Vec::new(), channels, 0, 0);
        }

        let mut data = vec![0.0f32; frames * channels];

        // Each output row is one channel; its column of bytes sits at a fixed offset in every frame
        for (ch, row) in data.chunks_exact_mut(frames).enumerate() {
            let start = status + ch * width;
            for (out, frame) in row.iter_mut().zip(raw.chunks_exact(stride)) {
                let counts = (self.extend)((self.unpack)(&frame[start..start + width]), self.shift);
                *out = self.calibration.apply(counts);
            }
        }

        SampleBlock::new(data, channels, 0, 0)
    }
}

/// Decode a raw frame with an explicit layout and calibration
pub fn decode(raw: &[u8], layout: &FrameLayout, calibration: &Calibration) -> ExgResult<SampleBlock> {
    SampleDecoder::new(layout.clone(), *calibration)?.decode(raw)
}

fn unpack_u8(b: &[u8]) -> u32 {
    b[0] as u32
}

fn unpack_be16(b: &[u8]) -> u32 {
    u16::from_be_bytes([b[0], b[1]]) as u32
}

fn unpack_le16(b: &[u8]) -> u32 {
    u16::from_le_bytes([b[0], b[1]]) as u32
}

fn unpack_be24(b: &[u8]) -> u32 {
    u32::from_be_bytes([0, b[0], b[1], b[2]])
}

fn unpack_le24(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], 0])
}

fn unpack_be32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn unpack_le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// Two's complement: move the sample's top bit to bit 63, then arithmetic shift back
fn sign_extend(raw: u32, shift: u32) -> i64 {
    ((raw as u64) << shift) as i64 >> shift
}

fn zero_extend(raw: u32, _shift: u32) -> i64 {
    raw as i64
}

/// Inverse of [`SampleDecoder`], used by the device simulator and tests
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    layout: FrameLayout,
    calibration: Calibration,
    status_word: [u8; 3],
}

impl FrameEncoder {
    pub fn new(layout: FrameLayout, calibration: Calibration) -> ExgResult<Self> {
        layout.validate()?;
        Ok(FrameEncoder {
            layout,
            calibration,
            // ADS1299 status words start with the 0b1100 sync nibble
            status_word: [0xC0, 0x00, 0x00],
        })
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Encode a channel-major block; values are clamped to the ADC range
    pub fn encode(&self, block: &SampleBlock) -> ExgResult<Vec<u8>> {
        if block.channel_count() != self.layout.channel_count {
            return Err(ExgError::config(format!(
                "block has {} channels, layout expects {}",
                block.channel_count(),
                self.layout.channel_count
            )));
        }

        let frames = block.samples_per_channel();
        let width = self.layout.bytes_per_sample;
        let bits = self.layout.bits();
        let (min, max) = if self.layout.signed {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        };

        let mut out = Vec::with_capacity(frames * self.layout.stride());
        for frame_idx in 0..frames {
            for i in 0..self.layout.status_bytes {
                out.push(self.status_word.get(i).copied().unwrap_or(0));
            }
            for channel in block.channels() {
                let counts = self.calibration.invert(channel[frame_idx]).clamp(min, max);
                let raw = (counts as u64 & ((1u64 << bits) - 1)) as u32;
                let bytes = raw.to_be_bytes();
                let be = &bytes[4 - width..];
                match self.layout.endianness {
                    Endianness::Big => out.extend_from_slice(be),
                    Endianness::Little => out.extend(be.iter().rev()),
                }
            }
        }
        Ok(out)
    }
}
