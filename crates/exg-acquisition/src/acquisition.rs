//! Acquisition loop and session lifecycle
//!
//! A [`Session`] owns the ring buffer, the status bus and the counters. On
//! `start` it hands the transport, decoder, filter bank and optional spatial
//! filter to an [`AcquisitionLoop`] running on a dedicated thread; that thread
//! is the only writer of the ring buffer. Decoder and filter state never leave
//! it. Every `connect` builds a fresh filter bank, so each run starts from the
//! configured initial state.

use crate::config::SessionConfig;
use crate::ring_buffer::{LockStats, RingBuffer};
use crate::snapshot::SnapshotReader;
use crate::stats::{AcquisitionCounters, AcquisitionStats, LinkCounters};
use crate::status::{StatusBus, StatusEvent};
use crate::transport::Transport;
use exg_core::{now_micros, AcquisitionStatus, ExgError, ExgResult};
use exg_processing::{SampleDecoder, SosFilterBank, SpatialFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Minimum spacing of the aggregated dropped-frame warning
const DROP_WARNING_INTERVAL: Duration = Duration::from_secs(1);

const THREAD_NAME: &str = "exg-acquisition";

/// Why an acquisition loop returned
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// Stop was requested
    Stopped,
    /// Session-fatal error, already published as `AcquisitionStatus::Error`
    Failed(String),
}

/// Everything a loop needs besides the shared handles
struct Pipeline {
    transport: Box<dyn Transport>,
    decoder: SampleDecoder,
    filters: SosFilterBank,
    spatial: Option<SpatialFilter>,
}

/// Read → decode → filter → clean → write, until stopped or failed
pub struct AcquisitionLoop {
    session: Uuid,
    pipeline: Pipeline,
    ring: Arc<RingBuffer>,
    status: Arc<StatusBus>,
    counters: Arc<AcquisitionCounters>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
    max_consecutive_mismatches: u32,
    next_sequence: u64,
    consecutive_mismatches: u32,
    dropped_since_warning: u64,
    last_drop_warning: Option<Instant>,
}

impl AcquisitionLoop {
    /// Run on the current thread until a stop request or a fatal error
    pub fn run(mut self) -> LoopExit {
        info!(
            session = %self.session,
            transport = %self.pipeline.transport.describe(),
            "Acquisition loop started"
        );

        let exit = loop {
            if self.stop.load(Ordering::Acquire) {
                break LoopExit::Stopped;
            }
            if let Err(reason) = self.step() {
                break LoopExit::Failed(reason);
            }
        };

        match &exit {
            LoopExit::Stopped => {
                info!(session = %self.session, blocks = self.next_sequence, "Acquisition loop stopped");
            }
            LoopExit::Failed(reason) => {
                error!(session = %self.session, reason = %reason, "Acquisition loop failed");
                // A concurrent stop may already have moved the status on
                let _ = self.status.transition(AcquisitionStatus::Error(reason.clone()));
                let _ = self.status.transition(AcquisitionStatus::Stopped);
            }
        }
        exit
    }

    /// One iteration; `Err` carries the reason the session must end
    fn step(&mut self) -> Result<(), String> {
        let raw = match self.pipeline.transport.read_frame(self.read_timeout) {
            Ok(raw) => raw,
            Err(ExgError::TransportTimeout) => {
                self.counters.timeout();
                trace!(session = %self.session, "Transport read timed out");
                return Ok(());
            }
            Err(e) => return Err(e.to_string()),
        };
        self.counters.frame_received(raw.len());

        let block = match self.pipeline.decoder.decode(&raw) {
            Ok(block) => {
                self.consecutive_mismatches = 0;
                block
            }
            Err(e @ ExgError::FrameSizeMismatch { .. }) => return self.frame_dropped(e),
            Err(e) => return Err(e.to_string()),
        };
        if block.is_empty() {
            return Ok(());
        }

        let block = self
            .pipeline
            .filters
            .apply(block)
            .map_err(|e| e.to_string())?;
        let block = match &self.pipeline.spatial {
            Some(spatial) => spatial.apply(block).map_err(|e| e.to_string())?,
            None => block,
        }
        .stamped(self.next_sequence, now_micros());
        self.next_sequence += 1;

        let samples = block.len();
        self.ring.write(block);
        self.counters.block_written(samples);
        Ok(())
    }

    fn frame_dropped(&mut self, error: ExgError) -> Result<(), String> {
        self.counters.frame_dropped();
        self.consecutive_mismatches += 1;
        self.dropped_since_warning += 1;
        debug!(
            session = %self.session,
            consecutive = self.consecutive_mismatches,
            error = %error,
            "Dropped malformed frame"
        );

        if self.consecutive_mismatches >= self.max_consecutive_mismatches {
            return Err(format!(
                "malformed stream: {} consecutive frames rejected ({})",
                self.consecutive_mismatches, error
            ));
        }

        let due = self
            .last_drop_warning
            .map_or(true, |at| at.elapsed() >= DROP_WARNING_INTERVAL);
        if due {
            warn!(
                session = %self.session,
                dropped = self.dropped_since_warning,
                total = self.counters.frames_dropped(),
                "Dropping malformed frames"
            );
            self.dropped_since_warning = 0;
            self.last_drop_warning = Some(Instant::now());
        }
        Ok(())
    }
}

/// One acquisition session: `Idle → Connected → Streaming → Stopped`
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    ring: Arc<RingBuffer>,
    status: Arc<StatusBus>,
    counters: Arc<AcquisitionCounters>,
    link: Option<Arc<LinkCounters>>,
    pending: Option<Pipeline>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<LoopExit>>,
    last_exit: Option<LoopExit>,
    streamed: bool,
}

impl Session {
    /// Validate `config` and create an idle session
    pub fn new(config: SessionConfig) -> ExgResult<Self> {
        config.validate()?;
        let ring = Arc::new(RingBuffer::new(config.buffer.capacity_blocks)?);
        let id = Uuid::new_v4();
        info!(
            session = %id,
            channels = config.device.channel_count(),
            sampling_rate = config.device.sampling_rate,
            "Session created"
        );

        Ok(Session {
            id,
            config,
            ring,
            status: Arc::new(StatusBus::new()),
            counters: Arc::new(AcquisitionCounters::default()),
            link: None,
            pending: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            last_exit: None,
            streamed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Take an opened transport and prepare the pipeline
    ///
    /// Fails with `UnstableFilter` or `InvalidConfig` when the filter chain or
    /// spatial filter cannot be built; the status is left unchanged in that case.
    pub fn connect(&mut self, transport: Box<dyn Transport>) -> ExgResult<()> {
        self.reap();
        let current = self.status.current();
        if !current.can_transition_to(&AcquisitionStatus::Connected) {
            return Err(ExgError::InvalidState {
                from: current.to_string(),
                to: AcquisitionStatus::Connected.to_string(),
            });
        }

        let device = &self.config.device;
        let decoder = SampleDecoder::new(device.layout.clone(), self.config.calibration()?)?;
        let filters = self.config.filters.build(device.channel_count(), device.sampling_rate)?;
        let spatial = self
            .config
            .spatial_filter
            .as_ref()
            .map(|spatial| spatial.build(device.channel_count()))
            .transpose()?;

        info!(
            session = %self.id,
            transport = %transport.describe(),
            spatial_filter = spatial.is_some(),
            "Transport attached"
        );
        self.link = transport.link_counters();
        self.pending = Some(Pipeline { transport, decoder, filters, spatial });
        self.status.transition(AcquisitionStatus::Connected)
    }

    /// Spawn the acquisition thread
    ///
    /// A session that streamed before starts again from an empty ring buffer
    /// and zeroed counters.
    pub fn start(&mut self) -> ExgResult<()> {
        let current = self.status.current();
        let pipeline = match (&current, self.pending.take()) {
            (AcquisitionStatus::Connected, Some(pipeline)) => pipeline,
            (_, pending) => {
                self.pending = pending;
                return Err(ExgError::InvalidState {
                    from: current.to_string(),
                    to: AcquisitionStatus::Streaming.to_string(),
                });
            }
        };

        if self.streamed {
            self.ring.reset();
            self.counters.reset();
            debug!(session = %self.id, "Ring buffer and counters reset for restart");
        }
        self.stop.store(false, Ordering::Release);
        self.last_exit = None;

        let acquisition = AcquisitionLoop {
            session: self.id,
            pipeline,
            ring: Arc::clone(&self.ring),
            status: Arc::clone(&self.status),
            counters: Arc::clone(&self.counters),
            stop: Arc::clone(&self.stop),
            read_timeout: self.config.acquisition.read_timeout(),
            max_consecutive_mismatches: self.config.acquisition.max_consecutive_mismatches,
            next_sequence: 0,
            consecutive_mismatches: 0,
            dropped_since_warning: 0,
            last_drop_warning: None,
        };

        // Publish Streaming before the loop can publish Error
        self.status.transition(AcquisitionStatus::Streaming)?;
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || acquisition.run());

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.streamed = true;
                Ok(())
            }
            Err(e) => {
                let reason = format!("cannot spawn acquisition thread: {}", e);
                let _ = self.status.transition(AcquisitionStatus::Error(reason.clone()));
                let _ = self.status.transition(AcquisitionStatus::Stopped);
                Err(ExgError::Io { reason })
            }
        }
    }

    /// Request a stop and wait for the loop to finish its current iteration
    ///
    /// Returns within about one read timeout. Stopping a stopped session is
    /// a no-op.
    pub fn stop(&mut self) -> ExgResult<()> {
        self.stop.store(true, Ordering::Release);
        self.reap();
        self.pending = None;
        self.status.transition(AcquisitionStatus::Stopped)
    }

    /// Join the worker thread if there is one
    fn reap(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(exit) => self.last_exit = Some(exit),
                Err(_) => {
                    error!(session = %self.id, "Acquisition thread panicked");
                    let reason = "acquisition thread panicked".to_string();
                    let _ = self.status.transition(AcquisitionStatus::Error(reason.clone()));
                    self.last_exit = Some(LoopExit::Failed(reason));
                }
            }
        }
    }

    /// How the last streaming run ended, once its thread has been joined
    pub fn last_exit(&self) -> Option<&LoopExit> {
        self.last_exit.as_ref()
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.status.current()
    }

    pub fn status_bus(&self) -> &Arc<StatusBus> {
        &self.status
    }

    pub fn watch_status(&self) -> watch::Receiver<AcquisitionStatus> {
        self.status.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    /// Reader for renderer-style consumers
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader::new(Arc::clone(&self.ring))
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.counters.load(self.link.as_deref(), self.ring.overwritten())
    }

    pub fn lock_stats(&self) -> LockStats {
        self.ring.lock_stats()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatorConfig;
    use crate::config::SourceConfig;
    use crate::transport::{ChannelTransport, TransportEvent};
    use exg_core::{critical, FrameLayout, SampleBlock};
    use exg_processing::{FilterConfig, FilterSpec, FrameEncoder, SpatialFilterConfig};
    use std::sync::mpsc;

    const FRAMES: usize = 4;

    fn test_config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.device.layout = FrameLayout::ads24(2);
        config.device.channel_names = vec!["A".into(), "B".into()];
        config.device.calibration.scale = Some(1.0);
        config.device.frames_per_packet = FRAMES;
        config.filters = FilterConfig::default();
        config.buffer.capacity_blocks = 16;
        config.display.snapshot_blocks = 16;
        config.acquisition.read_timeout_ms = 20;
        config.acquisition.max_consecutive_mismatches = 10;
        config
    }

    fn frame(config: &SessionConfig, value: f32) -> TransportEvent {
        channel_frame(config, value, value)
    }

    fn channel_frame(config: &SessionConfig, first: f32, second: f32) -> TransportEvent {
        let encoder = FrameEncoder::new(config.device.layout.clone(), config.calibration().unwrap()).unwrap();
        let block = SampleBlock::from_channels(&[vec![first; FRAMES], vec![second; FRAMES]], 0, 0).unwrap();
        TransportEvent::Frame(encoder.encode(&block).unwrap())
    }

    fn malformed() -> TransportEvent {
        // Stride is 9 bytes
        TransportEvent::Frame(vec![0u8; 10])
    }

    fn streaming(config: SessionConfig) -> (mpsc::Sender<TransportEvent>, Session) {
        let mut session = Session::new(config).unwrap();
        let (sender, transport) = ChannelTransport::new("test");
        session.connect(Box::new(transport)).unwrap();
        session.start().unwrap();
        (sender, session)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    async fn next_event(events: &mut broadcast::Receiver<StatusEvent>) -> StatusEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("status event timed out")
            .expect("status bus closed")
    }

    #[test]
    fn test_blocks_are_decoded_filtered_and_sequenced() {
        let mut config = test_config();
        config.filters = FilterConfig::new(vec![FilterSpec::Sos {
            sections: vec![[0.5, 0.0, 0.0, 1.0, 0.0, 0.0]],
        }]);
        let (sender, mut session) = streaming(config.clone());

        for value in [100.0, 200.0, 300.0] {
            sender.send(frame(&config, value)).unwrap();
        }
        assert!(wait_until(|| session.stats().blocks_written == 3));

        let snapshot = session.ring().snapshot(10);
        let sequences: Vec<u64> = snapshot.blocks.iter().map(|b| b.sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(snapshot.blocks[2].channel(1).unwrap(), &[150.0; FRAMES]);
        assert!(snapshot.blocks[0].timestamp_us() > 0);

        let stats = session.stats();
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.samples_written, 3 * 2 * FRAMES as u64);
        assert_eq!(session.status(), AcquisitionStatus::Streaming);
        session.stop().unwrap();
    }

    #[test]
    fn test_spatial_filter_runs_after_filter_bank() {
        let mut config = test_config();
        config.filters = FilterConfig::new(vec![FilterSpec::Sos {
            sections: vec![[2.0, 0.0, 0.0, 1.0, 0.0, 0.0]],
        }]);
        // Remove the component common to both channels
        config.spatial_filter = Some(SpatialFilterConfig {
            channel_indices: vec![0, 1],
            matrix: vec![vec![0.5, -0.5], vec![-0.5, 0.5]],
        });
        let (sender, mut session) = streaming(config.clone());

        sender.send(channel_frame(&config, 130.0, 70.0)).unwrap();
        assert!(wait_until(|| session.stats().blocks_written == 1));

        let snapshot = session.ring().snapshot(1);
        assert_eq!(snapshot.blocks[0].channel(0).unwrap(), &[60.0; FRAMES]);
        assert_eq!(snapshot.blocks[0].channel(1).unwrap(), &[-60.0; FRAMES]);
        assert_eq!(snapshot.blocks[0].sequence(), 0);
        session.stop().unwrap();
    }

    #[test]
    fn test_spatial_filter_shape_refuses_session() {
        let mut config = test_config();
        config.spatial_filter = Some(SpatialFilterConfig {
            channel_indices: vec![0, 1],
            matrix: vec![vec![1.0]],
        });
        assert!(matches!(Session::new(config), Err(ExgError::InvalidConfig { .. })));
    }

    #[test]
    fn test_malformed_frames_are_dropped_and_counted() {
        let config = test_config();
        let (sender, mut session) = streaming(config.clone());

        sender.send(frame(&config, 1.0)).unwrap();
        for _ in 0..5 {
            sender.send(malformed()).unwrap();
        }
        sender.send(frame(&config, 2.0)).unwrap();
        assert!(wait_until(|| session.stats().blocks_written == 2));
        assert_eq!(session.stats().frames_received, 7);

        let stats = session.stats();
        assert_eq!(stats.frames_dropped, 5);
        assert_eq!(stats.blocks_written, 2);
        assert_eq!(session.ring().total_written(), 2);
        assert_eq!(session.status(), AcquisitionStatus::Streaming);

        let latest = session.ring().snapshot(1);
        assert_eq!(latest.blocks[0].sequence(), 1);
        session.stop().unwrap();
    }

    #[test]
    fn test_good_frame_resets_mismatch_run() {
        let config = test_config();
        let (sender, mut session) = streaming(config.clone());

        for _ in 0..9 {
            sender.send(malformed()).unwrap();
        }
        sender.send(frame(&config, 1.0)).unwrap();
        for _ in 0..9 {
            sender.send(malformed()).unwrap();
        }
        assert!(wait_until(|| session.stats().frames_dropped == 18));
        assert_eq!(session.stats().frames_received, 19);
        assert_eq!(session.status(), AcquisitionStatus::Streaming);
        session.stop().unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_publishes_error_then_stopped() {
        let config = test_config();
        let mut session = Session::new(config.clone()).unwrap();
        let (sender, transport) = ChannelTransport::new("test");
        session.connect(Box::new(transport)).unwrap();

        let mut events = session.subscribe();
        session.start().unwrap();
        sender.send(frame(&config, 42.0)).unwrap();
        sender.send(TransportEvent::Disconnect("cable unplugged".into())).unwrap();

        let started = next_event(&mut events).await;
        assert_eq!(started.to, AcquisitionStatus::Streaming);
        let failed = next_event(&mut events).await;
        assert_eq!(failed.from, AcquisitionStatus::Streaming);
        match failed.to {
            AcquisitionStatus::Error(reason) => assert!(reason.contains("cable unplugged"), "{}", reason),
            other => panic!("expected error, got {}", other),
        }
        let stopped = next_event(&mut events).await;
        assert_eq!(stopped.to, AcquisitionStatus::Stopped);

        // The last valid block survives the failure
        let snapshot = session.reader().snapshot(16);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.blocks[0].channel(0).unwrap(), &[42.0; FRAMES]);

        session.stop().unwrap();
        assert!(matches!(session.last_exit(), Some(LoopExit::Failed(_))));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_stream_ends_session() {
        let config = test_config();
        let (sender, session) = streaming(config);
        let mut watcher = session.watch_status();

        for _ in 0..10 {
            sender.send(malformed()).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), watcher.wait_for(|s| *s == AcquisitionStatus::Stopped))
            .await
            .expect("session did not stop")
            .unwrap();
        assert_eq!(session.stats().frames_dropped, 10);
        assert_eq!(session.ring().total_written(), 0);
    }

    #[test]
    fn test_stop_is_observed_within_read_timeout() {
        let (_sender, mut session) = streaming(test_config());
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        session.stop().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(session.status(), AcquisitionStatus::Stopped);
        assert_eq!(session.last_exit(), Some(&LoopExit::Stopped));
        assert!(session.stats().timeouts > 0);

        // Repeated stop is accepted
        session.stop().unwrap();
    }

    #[test]
    fn test_restart_starts_from_empty_ring() {
        let config = test_config();
        let (sender, mut session) = streaming(config.clone());
        for value in [1.0, 2.0] {
            sender.send(frame(&config, value)).unwrap();
        }
        assert!(wait_until(|| session.stats().blocks_written == 2));
        session.stop().unwrap();
        assert_eq!(session.ring().len(), 2);

        let (sender, transport) = ChannelTransport::new("second");
        session.connect(Box::new(transport)).unwrap();
        session.start().unwrap();
        assert!(session.ring().is_empty());
        assert_eq!(session.stats().blocks_written, 0);
        assert_eq!(session.stats().frames_received, 0);

        sender.send(frame(&config, 3.0)).unwrap();
        assert!(wait_until(|| session.stats().blocks_written == 1));
        assert_eq!(session.ring().snapshot(1).blocks[0].sequence(), 0);
        session.stop().unwrap();
    }

    #[test]
    fn test_restart_begins_with_fresh_filter_state() {
        let mut config = test_config();
        // y[n] = x[n] + 0.5 y[n-1]
        config.filters = FilterConfig::new(vec![FilterSpec::Sos {
            sections: vec![[1.0, 0.0, 0.0, 1.0, -0.5, 0.0]],
        }]);
        let expected: [f32; FRAMES] = [100.0, 150.0, 175.0, 187.5];

        let (sender, mut session) = streaming(config.clone());
        sender.send(frame(&config, 100.0)).unwrap();
        sender.send(frame(&config, 100.0)).unwrap();
        assert!(wait_until(|| session.stats().blocks_written == 2));
        assert_eq!(session.ring().snapshot(2).blocks[0].channel(0).unwrap(), &expected);
        assert_ne!(session.ring().snapshot(1).blocks[0].channel(0).unwrap(), &expected);
        session.stop().unwrap();

        let (sender, transport) = ChannelTransport::new("again");
        session.connect(Box::new(transport)).unwrap();
        session.start().unwrap();
        sender.send(frame(&config, 100.0)).unwrap();
        assert!(wait_until(|| session.stats().blocks_written == 1));
        assert_eq!(session.ring().snapshot(1).blocks[0].channel(0).unwrap(), &expected);
        session.stop().unwrap();
    }

    #[test]
    fn test_lifecycle_is_enforced() {
        let mut session = Session::new(test_config()).unwrap();
        assert!(matches!(session.start(), Err(ExgError::InvalidState { .. })));

        let (_sender, transport) = ChannelTransport::new("first");
        session.connect(Box::new(transport)).unwrap();
        let (_other, transport) = ChannelTransport::new("second");
        assert!(matches!(
            session.connect(Box::new(transport)),
            Err(ExgError::InvalidState { .. })
        ));

        session.start().unwrap();
        assert!(matches!(session.start(), Err(ExgError::InvalidState { .. })));
        session.stop().unwrap();
    }

    #[test]
    fn test_unstable_filter_refuses_session() {
        let mut config = test_config();
        config.filters = FilterConfig::new(vec![FilterSpec::Sos {
            sections: vec![[1.0, 0.0, 0.0, 1.0, -1.0, 0.0]],
        }]);
        assert!(matches!(Session::new(config), Err(ExgError::UnstableFilter { .. })));
    }

    #[test]
    fn test_simulated_device_end_to_end() {
        let mut config = SessionConfig::default();
        config.source = SourceConfig::Simulated(SimulatorConfig {
            seed: Some(11),
            realtime: false,
            ..Default::default()
        });
        let mut session = Session::new(config.clone()).unwrap();
        session.connect(config.open_transport().unwrap()).unwrap();
        session.start().unwrap();

        assert!(wait_until(|| session.stats().blocks_written >= 400));
        let reader = session.reader();
        let window = reader.window(config.display.snapshot_blocks);
        assert_eq!(window.channel_count(), 8);
        assert_eq!(window.samples_per_channel(), config.display.snapshot_blocks * 50);

        session.stop().unwrap();
        let stats = session.stats();
        assert!(stats.blocks_overwritten > 0);
        assert_eq!(stats.frames_dropped, 0);
        assert!(session.lock_stats().acquisitions > 0);
        assert_eq!(critical::violations(), 0);
    }
}
