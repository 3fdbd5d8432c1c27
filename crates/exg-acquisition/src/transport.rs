//! Transport handle consumed by the acquisition loop
//!
//! Connection setup belongs to whoever builds the transport; the loop only
//! calls [`Transport::read_frame`] with a bounded timeout.

use crate::stats::LinkCounters;
use exg_core::{ExgError, ExgResult};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Source of raw device frames
pub trait Transport: Send {
    /// Read one raw frame.
    ///
    /// Returns `ExgError::TransportTimeout` when nothing arrived within
    /// `timeout` and `ExgError::TransportDisconnected` when the source is gone.
    fn read_frame(&mut self, timeout: Duration) -> ExgResult<Vec<u8>>;

    /// Short description for logs
    fn describe(&self) -> String;

    /// Link-level counters, for transports that frame packets themselves
    fn link_counters(&self) -> Option<Arc<LinkCounters>> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_frame(&mut self, timeout: Duration) -> ExgResult<Vec<u8>> {
        (**self).read_frame(timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn link_counters(&self) -> Option<Arc<LinkCounters>> {
        (**self).link_counters()
    }
}

/// Item delivered through a [`ChannelTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(Vec<u8>),
    Timeout,
    Disconnect(String),
}

/// In-process transport fed through a channel
///
/// Useful for replaying captured frames and for scripting transport
/// behaviour. Dropping every sender disconnects the transport.
#[derive(Debug)]
pub struct ChannelTransport {
    name: String,
    receiver: mpsc::Receiver<TransportEvent>,
}

impl ChannelTransport {
    pub fn new(name: impl Into<String>) -> (mpsc::Sender<TransportEvent>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, ChannelTransport { name: name.into(), receiver })
    }
}

impl Transport for ChannelTransport {
    fn read_frame(&mut self, timeout: Duration) -> ExgResult<Vec<u8>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(TransportEvent::Frame(bytes)) => Ok(bytes),
            Ok(TransportEvent::Timeout) | Err(mpsc::RecvTimeoutError::Timeout) => Err(ExgError::TransportTimeout),
            Ok(TransportEvent::Disconnect(reason)) => Err(ExgError::TransportDisconnected { reason }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExgError::TransportDisconnected {
                reason: "channel closed".to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("channel:{}", self.name)
    }
}
