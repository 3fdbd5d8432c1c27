//! Acquisition lifecycle status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session status published by the acquisition loop.
///
/// `Idle → Connected → Streaming → Stopped`, with
/// `Streaming → Error → Stopped` on an unrecoverable transport failure.
/// An explicit stop moves any state to `Stopped`; a stopped session may
/// connect again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum AcquisitionStatus {
    Idle,
    Connected,
    Streaming,
    Stopped,
    Error(String),
}

impl AcquisitionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionStatus::Idle => "Idle",
            AcquisitionStatus::Connected => "Connected",
            AcquisitionStatus::Streaming => "Streaming",
            AcquisitionStatus::Stopped => "Stopped",
            AcquisitionStatus::Error(_) => "Error",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, AcquisitionStatus::Streaming)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AcquisitionStatus::Error(_))
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: &AcquisitionStatus) -> bool {
        use AcquisitionStatus::*;
        match (self, next) {
            (_, Stopped) => true,
            (Idle, Connected) | (Stopped, Connected) => true,
            (Connected, Streaming) => true,
            (Streaming, Error(_)) => true,
            (Stopped, Idle) => true,
            _ => false,
        }
    }
}

impl Default for AcquisitionStatus {
    fn default() -> Self {
        AcquisitionStatus::Idle
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStatus::Error(reason) => write!(f, "Error({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}
