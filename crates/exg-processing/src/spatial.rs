//! Spatial filtering: a fixed channel-mixing matrix applied per block
//!
//! Artifact cleaning projects the selected channels through a precomputed
//! square matrix (typically unmixing, component rejection and remixing folded
//! into one) and writes the result back into the same rows. Channels outside
//! `channel_indices` pass through. The matrix is estimated offline; only its
//! application runs on the acquisition path.

use exg_core::{critical, ExgError, ExgResult, SampleBlock};
use serde::{Deserialize, Serialize};

/// Spatial filter as it appears in a session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilterConfig {
    /// Channels read and rewritten, in matrix order
    pub channel_indices: Vec<usize>,
    /// Row `i` gives the weights of output channel `channel_indices[i]`
    pub matrix: Vec<Vec<f64>>,
}

impl SpatialFilterConfig {
    pub fn build(&self, channel_count: usize) -> ExgResult<SpatialFilter> {
        SpatialFilter::new(self.matrix.clone(), self.channel_indices.clone(), channel_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilter {
    /// Row-major `k × k`
    matrix: Vec<f64>,
    channel_indices: Vec<usize>,
    channel_count: usize,
}

impl SpatialFilter {
    /// Validate shape and indices against a device with `channel_count` channels
    pub fn new(matrix: Vec<Vec<f64>>, channel_indices: Vec<usize>, channel_count: usize) -> ExgResult<Self> {
        let k = channel_indices.len();
        if k == 0 {
            return Err(ExgError::config("spatial filter selects no channels"));
        }
        if let Some(&index) = channel_indices.iter().find(|&&i| i >= channel_count) {
            return Err(ExgError::config(format!(
                "spatial filter channel {} out of range for {} channels",
                index, channel_count
            )));
        }
        for (position, index) in channel_indices.iter().enumerate() {
            if channel_indices[..position].contains(index) {
                return Err(ExgError::config(format!("spatial filter lists channel {} twice", index)));
            }
        }
        if matrix.len() != k || matrix.iter().any(|row| row.len() != k) {
            let columns = matrix.iter().map(Vec::len).max().unwrap_or(0);
            return Err(ExgError::config(format!(
                "spatial filter matrix is {}x{}, expected {}x{}",
                matrix.len(),
                columns,
                k,
                k
            )));
        }
        if matrix.iter().flatten().any(|w| !w.is_finite()) {
            return Err(ExgError::config("spatial filter weights must be finite"));
        }

        Ok(SpatialFilter {
            matrix: matrix.into_iter().flatten().collect(),
            channel_indices,
            channel_count,
        })
    }

    pub fn channel_indices(&self) -> &[usize] {
        &self.channel_indices
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Mix the selected rows of `block` and write them back in place
    pub fn apply(&self, mut block: SampleBlock) -> ExgResult<SampleBlock> {
        critical::compute_entered();

        if block.channel_count() != self.channel_count {
            return Err(ExgError::config(format!(
                "block has {} channels, spatial filter expects {}",
                block.channel_count(),
                self.channel_count
            )));
        }

        let k = self.channel_indices.len();
        let inputs = self
            .channel_indices
            .iter()
            .map(|&index| block.channel(index).map(<[f32]>::to_vec))
            .collect::<ExgResult<Vec<_>>>()?;

        let mut mixed = vec![0.0f64; block.samples_per_channel()];
        for (row, &index) in self.matrix.chunks_exact(k).zip(&self.channel_indices) {
            mixed.iter_mut().for_each(|v| *v = 0.0);
            for (&weight, input) in row.iter().zip(&inputs) {
                if weight == 0.0 {
                    continue;
                }
                for (acc, &x) in mixed.iter_mut().zip(input) {
                    *acc += weight * x as f64;
                }
            }
            for (out, &value) in block.channel_mut(index)?.iter_mut().zip(&mixed) {
                *out = value as f32;
            }
        }

        Ok(block)
    }
}
