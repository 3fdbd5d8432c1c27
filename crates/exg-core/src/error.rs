//! Error handling for the ExG acquisition pipeline
//!
//! One error type is shared by every crate in the workspace. Per-frame errors
//! (`FrameSizeMismatch`, `TransportTimeout`) are recoverable and are absorbed by
//! the acquisition loop; the rest end a session or refuse to start one.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type ExgResult<T> = Result<T, ExgError>;

/// Error type for all pipeline operations
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ExgError {
    /// Raw frame length is not a multiple of the frame stride
    #[error("Frame size mismatch: {len} bytes is not a multiple of the {stride}-byte frame stride")]
    FrameSizeMismatch {
        /// Length of the rejected frame in bytes
        len: usize,
        /// Expected stride (status bytes + channels * bytes per sample)
        stride: usize,
    },

    /// A second-order section has a pole on or outside the unit circle
    #[error("Unstable filter: channel {channel} section {section} has pole magnitude {pole_magnitude:.6}")]
    UnstableFilter {
        /// Channel whose cascade holds the section
        channel: usize,
        /// Index of the section within the cascade
        section: usize,
        /// Largest pole magnitude of the section
        pole_magnitude: f64,
    },

    /// Transport read did not produce a frame within the timeout
    #[error("Transport read timed out")]
    TransportTimeout,

    /// Transport is gone; the session cannot continue
    #[error("Transport disconnected: {reason}")]
    TransportDisconnected {
        /// Why the transport went away
        reason: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Channel index outside the block
    #[error("Channel {index} out of range for {channel_count} channels")]
    ChannelOutOfRange {
        /// Requested channel
        index: usize,
        /// Channels available
        channel_count: usize,
    },

    /// Requested lifecycle transition is not allowed from the current state
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// Current state name
        from: String,
        /// Requested state name
        to: String,
    },

    /// I/O error outside the transport read path (config files, recordings)
    #[error("I/O error: {reason}")]
    Io {
        /// Underlying error message
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {reason}")]
    Serialization {
        /// Underlying error message
        reason: String,
    },
}

impl ExgError {
    /// Per-frame or per-tick errors that never end a session
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExgError::FrameSizeMismatch { .. } | ExgError::TransportTimeout
        )
    }

    /// Shorthand for configuration errors
    pub fn config(reason: impl Into<String>) -> Self {
        ExgError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ExgError {
    fn from(err: std::io::Error) -> Self {
        ExgError::Io {
            reason: err.to_string(),
        }
    }
}
