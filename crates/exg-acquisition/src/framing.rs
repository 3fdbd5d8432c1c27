//! Packet framing over a byte stream
//!
//! Wire format, all integers big-endian:
//!
//! ```text
//! AA BB CC DD | sequence: u32 | payload | crc16: u16
//! ```
//!
//! The payload is `frames_per_packet` sample frames. The CRC is
//! CRC-16/CCITT-FALSE over `sequence ‖ payload`. When the stream falls out of
//! step the deframer searches for the next header; sequence gaps are counted
//! as lost packets.

use crate::stats::LinkCounters;
use crate::transport::Transport;
use exg_core::{ExgError, ExgResult};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const PACKET_HEADER: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

/// Header, sequence number and CRC
pub const PACKET_OVERHEAD: usize = 4 + 4 + 2;

/// Receive buffer cap; exceeding it discards buffered bytes
pub const MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

const RECV_CHUNK_SIZE: usize = 16 * 1024;

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

/// Build one packet around `payload`
pub fn encode_packet(sequence: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(payload.len() + PACKET_OVERHEAD);
    packet.extend_from_slice(&PACKET_HEADER);
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(payload);
    let crc = crc16(&packet[4..]);
    packet.extend_from_slice(&crc.to_be_bytes());
    packet
}

/// Blocking byte stream with per-read timeout
pub trait ByteSource: Send {
    /// Read into `buf`. Never returns `Ok(0)`: end of stream is
    /// `TransportDisconnected`, an idle stream is `TransportTimeout`.
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> ExgResult<usize>;

    fn describe(&self) -> String;
}

impl ByteSource for TcpStream {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> ExgResult<usize> {
        // A zero read timeout means "block forever" to the OS
        let timeout = timeout.max(Duration::from_millis(1));
        self.set_read_timeout(Some(timeout)).map_err(|e| ExgError::TransportDisconnected {
            reason: e.to_string(),
        })?;

        match self.read(buf) {
            Ok(0) => Err(ExgError::TransportDisconnected {
                reason: "connection closed by peer".to_string(),
            }),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                Err(ExgError::TransportTimeout)
            }
            Err(e) => Err(ExgError::TransportDisconnected { reason: e.to_string() }),
        }
    }

    fn describe(&self) -> String {
        match self.peer_addr() {
            Ok(addr) => format!("tcp:{}", addr),
            Err(_) => "tcp:unconnected".to_string(),
        }
    }
}

/// Open a TCP connection to the device
pub fn connect_tcp(address: &str, timeout: Duration) -> ExgResult<TcpStream> {
    let addr = address
        .to_socket_addrs()
        .map_err(|e| ExgError::config(format!("cannot resolve {}: {}", address, e)))?
        .next()
        .ok_or_else(|| ExgError::config(format!("no address for {}", address)))?;

    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| ExgError::TransportDisconnected {
        reason: format!("connect to {} failed: {}", address, e),
    })?;
    stream.set_nodelay(true)?;
    info!(address = %addr, "Connected to device");
    Ok(stream)
}

/// Splits a byte stream into packet payloads
#[derive(Debug)]
pub struct PacketDeframer<S> {
    source: S,
    buffer: Vec<u8>,
    payload_size: usize,
    verify_crc: bool,
    last_sequence: Option<u32>,
    counters: Arc<LinkCounters>,
}

impl<S: ByteSource> PacketDeframer<S> {
    pub fn new(source: S, payload_size: usize, verify_crc: bool) -> ExgResult<Self> {
        if payload_size == 0 {
            return Err(ExgError::config("packet payload size must be positive"));
        }
        if payload_size + PACKET_OVERHEAD > MAX_BUFFER_SIZE / 2 {
            return Err(ExgError::config(format!(
                "packet payload of {} bytes exceeds the receive buffer",
                payload_size
            )));
        }
        Ok(PacketDeframer {
            source,
            buffer: Vec::with_capacity(RECV_CHUNK_SIZE * 4),
            payload_size,
            verify_crc,
            last_sequence: None,
            counters: Arc::new(LinkCounters::default()),
        })
    }

    pub fn packet_size(&self) -> usize {
        self.payload_size + PACKET_OVERHEAD
    }

    /// Access the underlying stream, e.g. to send device commands
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn counters(&self) -> Arc<LinkCounters> {
        Arc::clone(&self.counters)
    }

    /// Pull the next complete packet out of the buffer
    fn next_payload(&mut self) -> Option<Vec<u8>> {
        let packet_size = self.packet_size();

        loop {
            if self.buffer.len() < packet_size {
                return None;
            }

            if self.buffer[..4] != PACKET_HEADER {
                self.resync();
                continue;
            }

            let sequence = u32::from_be_bytes([self.buffer[4], self.buffer[5], self.buffer[6], self.buffer[7]]);
            let payload_end = 8 + self.payload_size;

            if self.verify_crc {
                let expected = u16::from_be_bytes([self.buffer[payload_end], self.buffer[payload_end + 1]]);
                if crc16(&self.buffer[4..payload_end]) != expected {
                    LinkCounters::add(&self.counters.crc_errors, 1);
                    debug!(sequence, "Dropping packet with bad CRC");
                    // Could be a false header; search again from the next byte
                    self.buffer.drain(..1);
                    continue;
                }
            }

            self.track_sequence(sequence);
            let payload = self.buffer[8..payload_end].to_vec();
            self.buffer.drain(..packet_size);

            LinkCounters::add(&self.counters.packets, 1);
            return Some(payload);
        }
    }

    /// Skip to the next header candidate, keeping a possible partial header
    fn resync(&mut self) {
        LinkCounters::add(&self.counters.resyncs, 1);
        match self.buffer[1..].windows(4).position(|w| w == PACKET_HEADER) {
            Some(offset) => {
                self.buffer.drain(..offset + 1);
            }
            None => {
                let keep = self.buffer.len().min(PACKET_HEADER.len() - 1);
                let discard = self.buffer.len() - keep;
                self.buffer.drain(..discard);
            }
        }
    }

    fn track_sequence(&mut self, sequence: u32) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                let wrapped = last > 0xFFFF_FF00 && sequence < 100;
                if !wrapped && sequence > last {
                    let lost = (sequence - expected) as u64;
                    LinkCounters::add(&self.counters.lost_packets, lost);
                    warn!(lost, last, current = sequence, "Packet loss detected");
                } else if !wrapped {
                    debug!(last, current = sequence, "Sequence number went backwards");
                }
            }
        }
        self.last_sequence = Some(sequence);
    }

    /// Read more bytes from the source into the buffer
    fn fill(&mut self, timeout: Duration) -> ExgResult<()> {
        if self.buffer.len() + RECV_CHUNK_SIZE > MAX_BUFFER_SIZE {
            warn!(buffered = self.buffer.len(), "Receive buffer overflow, discarding buffered bytes");
            LinkCounters::add(&self.counters.overflows, 1);
            self.buffer.clear();
        }

        let start = self.buffer.len();
        self.buffer.resize(start + RECV_CHUNK_SIZE, 0);
        let result = self.source.read_bytes(&mut self.buffer[start..], timeout);
        let read = *result.as_ref().unwrap_or(&0);
        self.buffer.truncate(start + read);

        let read = result?;
        LinkCounters::add(&self.counters.bytes, read as u64);
        Ok(())
    }
}

impl PacketDeframer<TcpStream> {
    /// Write a command to the device
    pub fn send_command(&mut self, command: &[u8]) -> ExgResult<()> {
        self.source.write_all(command).map_err(|e| ExgError::TransportDisconnected {
            reason: e.to_string(),
        })
    }
}

impl<S: ByteSource> Transport for PacketDeframer<S> {
    fn read_frame(&mut self, timeout: Duration) -> ExgResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = self.next_payload() {
                return Ok(payload);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ExgError::TransportTimeout);
            }
            self.fill(remaining)?;
        }
    }

    fn describe(&self) -> String {
        self.source.describe()
    }

    fn link_counters(&self) -> Option<Arc<LinkCounters>> {
        Some(self.counters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::TcpListener;
    use std::thread;

    /// Hands out scripted chunks, then times out or disconnects
    struct ScriptedBytes {
        chunks: VecDeque<Vec<u8>>,
        disconnect_when_empty: bool,
    }

    impl ScriptedBytes {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self { chunks: chunks.into(), disconnect_when_empty: false }
        }
    }

    impl ByteSource for ScriptedBytes {
        fn read_bytes(&mut self, buf: &mut [u8], _timeout: Duration) -> ExgResult<usize> {
            match self.chunks.pop_front() {
                Some(mut chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(chunk.split_off(n));
                    }
                    Ok(n)
                }
                None if self.disconnect_when_empty => Err(ExgError::TransportDisconnected {
                    reason: "eof".to_string(),
                }),
                None => Err(ExgError::TransportTimeout),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn payload(fill: u8) -> Vec<u8> {
        vec![fill; 6]
    }

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_packets_split_across_reads() {
        let mut stream = encode_packet(1, &payload(0x11));
        stream.extend(encode_packet(2, &payload(0x22)));
        let chunks = stream.chunks(5).map(<[u8]>::to_vec).collect();

        let mut deframer = PacketDeframer::new(ScriptedBytes::new(chunks), 6, true).unwrap();
        assert_eq!(deframer.read_frame(TIMEOUT).unwrap(), payload(0x11));
        assert_eq!(deframer.read_frame(TIMEOUT).unwrap(), payload(0x22));
        assert_eq!(deframer.read_frame(TIMEOUT), Err(ExgError::TransportTimeout));

        let counters = deframer.counters();
        assert_eq!(counters.packets(), 2);
        assert_eq!(counters.lost_packets(), 0);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut stream = vec![0x00, 0xAA, 0xBB, 0x13, 0x37];
        stream.extend(encode_packet(7, &payload(0x33)));

        let mut deframer = PacketDeframer::new(ScriptedBytes::new(vec![stream]), 6, true).unwrap();
        assert_eq!(deframer.read_frame(TIMEOUT).unwrap(), payload(0x33));
        assert!(deframer.counters().resyncs() >= 1);
    }

    #[test]
    fn test_bad_crc_dropped_and_counted() {
        let mut corrupt = encode_packet(1, &payload(0x44));
        corrupt[9] ^= 0xFF;
        let mut stream = corrupt;
        stream.extend(encode_packet(2, &payload(0x55)));

        let mut deframer = PacketDeframer::new(ScriptedBytes::new(vec![stream]), 6, true).unwrap();
        assert_eq!(deframer.read_frame(TIMEOUT).unwrap(), payload(0x55));
        assert_eq!(deframer.counters().crc_errors(), 1);
    }

    #[test]
    fn test_crc_ignored_when_disabled() {
        let mut packet = encode_packet(1, &payload(0x66));
        let len = packet.len();
        packet[len - 1] ^= 0xFF;

        let mut deframer = PacketDeframer::new(ScriptedBytes::new(vec![packet]), 6, false).unwrap();
        assert_eq!(deframer.read_frame(TIMEOUT).unwrap(), payload(0x66));
    }

    #[test]
    fn test_sequence_gap_counts_lost_packets() {
        let mut stream = Vec::new();
        for seq in [10u32, 11, 15, 16] {
            stream.extend(encode_packet(seq, &payload(seq as u8)));
        }
        let mut deframer = PacketDeframer::new(ScriptedBytes::new(vec![stream]), 6, true).unwrap();
        for _ in 0..4 {
            deframer.read_frame(TIMEOUT).unwrap();
        }
        assert_eq!(deframer.counters().lost_packets(), 3);
    }

    #[test]
    fn test_sequence_wrap_is_not_loss() {
        let mut stream = encode_packet(0xFFFF_FFFF, &payload(1));
        stream.extend(encode_packet(0, &payload(2)));
        stream.extend(encode_packet(5, &payload(3)));

        let mut deframer = PacketDeframer::new(ScriptedBytes::new(vec![stream]), 6, true).unwrap();
        for _ in 0..3 {
            deframer.read_frame(TIMEOUT).unwrap();
        }
        // 0 -> 5 loses 4, the wrap itself loses nothing
        assert_eq!(deframer.counters().lost_packets(), 4);
    }

    #[test]
    fn test_disconnect_propagates() {
        let mut source = ScriptedBytes::new(vec![encode_packet(1, &payload(1))[..7].to_vec()]);
        source.disconnect_when_empty = true;
        let mut deframer = PacketDeframer::new(source, 6, true).unwrap();
        assert!(matches!(
            deframer.read_frame(TIMEOUT),
            Err(ExgError::TransportDisconnected { .. })
        ));
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            for seq in 0..3u32 {
                socket.write_all(&encode_packet(seq, &payload(seq as u8))).unwrap();
            }
            let mut command = [0u8; 2];
            socket.read_exact(&mut command).unwrap();
            command
        });

        let stream = connect_tcp(&address, Duration::from_secs(1)).unwrap();
        let mut deframer = PacketDeframer::new(stream, 6, true).unwrap();
        for seq in 0..3u8 {
            assert_eq!(deframer.read_frame(Duration::from_secs(2)).unwrap(), payload(seq));
        }
        deframer.send_command(&[0x01, 0x02]).unwrap();
        assert_eq!(server.join().unwrap(), [0x01, 0x02]);

        // Server closed the socket
        assert!(matches!(
            deframer.read_frame(Duration::from_secs(2)),
            Err(ExgError::TransportDisconnected { .. })
        ));
        assert!(deframer.describe().starts_with("tcp:"));
    }
}
