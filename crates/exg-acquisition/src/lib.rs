//! EXG-Acquisition: transport to ring buffer
//!
//! Runs the acquisition thread (read → decode → filter → write), publishes
//! its status, and serves snapshots to renderers, recorders and analysis.

pub mod acquisition;
pub mod config;
pub mod framing;
pub mod recorder;
pub mod ring_buffer;
pub mod simulator;
pub mod snapshot;
pub mod stats;
pub mod status;
pub mod transport;

pub use acquisition::{AcquisitionLoop, LoopExit, Session};
pub use config::{
    AcquisitionConfig, BufferConfig, CalibrationConfig, DeviceConfig, DisplayConfig, SessionConfig, SourceConfig,
};
pub use framing::{connect_tcp, crc16, encode_packet, ByteSource, PacketDeframer};
pub use recorder::{Marker, Recorder, Recording};
pub use ring_buffer::{LockStats, ReadSince, RingBuffer, Snapshot};
pub use simulator::{SimulatedDevice, SimulatorConfig};
pub use snapshot::{ChannelWindow, SnapshotReader};
pub use stats::{AcquisitionCounters, AcquisitionStats, LinkCounters};
pub use status::{StatusBus, StatusEvent};
pub use transport::{ChannelTransport, Transport, TransportEvent};
