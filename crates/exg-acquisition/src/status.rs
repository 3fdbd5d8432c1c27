//! Status publication for the acquisition lifecycle
//!
//! The current status lives in a `watch` channel; every accepted transition
//! is also broadcast as a [`StatusEvent`]. Publishing never waits on
//! subscribers: slow broadcast receivers lag and skip events instead.

use chrono::{DateTime, Utc};
use exg_core::{AcquisitionStatus, ExgError, ExgResult};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

const EVENT_CAPACITY: usize = 64;

/// One accepted status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub from: AcquisitionStatus,
    pub to: AcquisitionStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatusBus {
    current: watch::Sender<AcquisitionStatus>,
    events: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (current, _) = watch::channel(AcquisitionStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        StatusBus { current, events }
    }

    pub fn current(&self) -> AcquisitionStatus {
        self.current.borrow().clone()
    }

    /// Receiver that always holds the latest status
    pub fn watch(&self) -> watch::Receiver<AcquisitionStatus> {
        self.current.subscribe()
    }

    /// Receiver of transition events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Move to `next` if the lifecycle allows it from the current status
    ///
    /// Stopping an already stopped session is accepted and publishes nothing.
    pub fn transition(&self, next: AcquisitionStatus) -> ExgResult<()> {
        let mut previous = None;
        let mut rejected_from = None;

        self.current.send_if_modified(|status| {
            if *status == AcquisitionStatus::Stopped && next == AcquisitionStatus::Stopped {
                return false;
            }
            if status.can_transition_to(&next) {
                previous = Some(std::mem::replace(status, next.clone()));
                true
            } else {
                rejected_from = Some(status.clone());
                false
            }
        });

        if let Some(from) = rejected_from {
            return Err(ExgError::InvalidState {
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        if let Some(from) = previous {
            match &next {
                AcquisitionStatus::Error(reason) => error!(from = %from, reason = %reason, "Acquisition failed"),
                _ => info!(from = %from, to = %next, "Acquisition status changed"),
            }
            // No subscribers is fine
            let _ = self.events.send(StatusEvent { from, to: next, at: Utc::now() });
        }
        Ok(())
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}
