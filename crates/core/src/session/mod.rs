//! Recording session: the state one capture owns from start to stop.
//!
//! A session holds exactly two [`ChannelBuffer`]s (incoming and outgoing),
//! the output sinks for its policy, and packet statistics. It is built
//! explicitly and driven through [`RecordingSession::handle_udp_payload`];
//! several sessions can coexist in one process.
//!
//! ## Lifecycle
//!
//! ```text
//! new()                   -> Idle
//! first handle_udp_payload -> Capturing
//! stop() / sink failure   -> Stopped   (tail flushed, sinks closed)
//! ```
//!
//! ## Policies
//!
//! - **Separate**: each direction's PCM goes straight to its own sink.
//! - **Mixed**: after every append, if both buffers hold data, the session
//!   takes `n = min(incoming, outgoing)` available bytes from each, sums
//!   them sample by sample and writes `n` bytes to the single sink. Buffer
//!   growth is bounded by the imbalance between the two arrival rates.
//!   On stop the longer buffer is drained in full against silence.

pub mod buffer;

use crate::capture::Direction;
use crate::error::{CaptureError, Result};
use crate::media::{PAYLOAD_TYPE_PCMU, RtpPacket, mix_pcm16, mulaw};
use crate::sink::AudioSink;
pub use buffer::ChannelBuffer;

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no packet seen yet.
    Idle,
    /// Packets are being recorded.
    Capturing,
    /// Torn down; further packets are rejected.
    Stopped,
}

/// How the two directions are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingPolicy {
    Mixed,
    Separate,
}

/// Output sinks, shaped by policy: one for mixed, one per direction for separate.
pub enum SessionSinks {
    Mixed(Box<dyn AudioSink>),
    Separate {
        incoming: Box<dyn AudioSink>,
        outgoing: Box<dyn AudioSink>,
    },
}

impl SessionSinks {
    pub fn policy(&self) -> RecordingPolicy {
        match self {
            Self::Mixed(_) => RecordingPolicy::Mixed,
            Self::Separate { .. } => RecordingPolicy::Separate,
        }
    }

    fn all_mut(&mut self) -> Vec<&mut Box<dyn AudioSink>> {
        match self {
            Self::Mixed(sink) => vec![sink],
            Self::Separate { incoming, outgoing } => vec![incoming, outgoing],
        }
    }
}

/// Packet and byte counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Payloads handed to the session.
    pub packets_received: u64,
    /// Payloads decoded and appended to a buffer.
    pub packets_recorded: u64,
    /// Dropped: RTP header inconsistent with the buffer.
    pub malformed_packets: u64,
    /// Dropped: payload type other than PCMU.
    pub unsupported_packets: u64,
    /// Decoded PCM bytes per direction.
    pub incoming_bytes: u64,
    pub outgoing_bytes: u64,
    /// PCM bytes written across all sinks.
    pub bytes_written: u64,
}

impl SessionStats {
    /// Decoded PCM bytes appended for `direction`.
    pub fn decoded_bytes(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Incoming => self.incoming_bytes,
            Direction::Outgoing => self.outgoing_bytes,
        }
    }

    /// Malformed plus unsupported packets.
    pub fn dropped_packets(&self) -> u64 {
        self.malformed_packets + self.unsupported_packets
    }
}

pub struct RecordingSession {
    incoming: ChannelBuffer,
    outgoing: ChannelBuffer,
    sinks: SessionSinks,
    state: SessionState,
    stats: SessionStats,
}

impl RecordingSession {
    /// Create an idle session; the policy follows the shape of `sinks`.
    pub fn new(sinks: SessionSinks) -> Self {
        tracing::debug!(policy = ?sinks.policy(), "recording session created");
        Self {
            incoming: ChannelBuffer::new(),
            outgoing: ChannelBuffer::new(),
            sinks,
            state: SessionState::Idle,
            stats: SessionStats::default(),
        }
    }

    pub fn policy(&self) -> RecordingPolicy {
        self.sinks.policy()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Bytes buffered for `direction` and not yet written.
    pub fn available(&self, direction: Direction) -> usize {
        self.buffer(direction).available()
    }

    /// Record one UDP payload captured in `direction`.
    ///
    /// Malformed RTP and non-PCMU payloads are counted and dropped; they
    /// never produce an error. Sink failures stop the session and are
    /// returned as [`CaptureError::SinkWrite`].
    pub fn handle_udp_payload(&mut self, direction: Direction, payload: &[u8]) -> Result<()> {
        match self.state {
            SessionState::Stopped => return Err(CaptureError::SessionStopped),
            SessionState::Idle => self.set_state(SessionState::Capturing),
            SessionState::Capturing => {}
        }
        self.stats.packets_received += 1;

        let pcm = match decode_payload(payload) {
            Ok(pcm) => pcm,
            Err(e) => {
                self.count_drop(direction, &e);
                return Ok(());
            }
        };

        self.stats.packets_recorded += 1;
        let buffer = self.buffer_mut(direction);
        buffer.append(&pcm);
        let total = buffer.total_appended();
        match direction {
            Direction::Incoming => self.stats.incoming_bytes = total,
            Direction::Outgoing => self.stats.outgoing_bytes = total,
        }
        tracing::trace!(%direction, bytes = pcm.len(), "PCM appended");

        let written = match self.policy() {
            RecordingPolicy::Separate => self.flush_direction(direction),
            RecordingPolicy::Mixed => self.drain_mixed().map(|_| ()),
        };
        if let Err(e) = written {
            self.abort(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Flush buffered audio, close every sink and enter `Stopped`.
    ///
    /// Under the mixed policy the longer buffer is drained completely,
    /// mixed against silence once the shorter one runs out. Calling
    /// `stop` on a stopped session returns the final stats again.
    pub fn stop(&mut self) -> Result<SessionStats> {
        if self.state == SessionState::Stopped {
            return Ok(self.stats.clone());
        }

        let flushed = match self.policy() {
            RecordingPolicy::Mixed => self.drain_mixed_tail(),
            RecordingPolicy::Separate => self
                .flush_direction(Direction::Incoming)
                .and_then(|_| self.flush_direction(Direction::Outgoing)),
        };
        let closed = self.close_sinks();
        self.set_state(SessionState::Stopped);
        flushed.and(closed)?;

        tracing::info!(
            received = self.stats.packets_received,
            recorded = self.stats.packets_recorded,
            dropped = self.stats.dropped_packets(),
            bytes_written = self.stats.bytes_written,
            "recording session stopped"
        );
        Ok(self.stats.clone())
    }

    /// One mixed drain step: takes `min(incoming, outgoing)` bytes from
    /// both buffers and writes their mix. Returns the number of bytes
    /// written, zero when either side is empty or the policy is separate.
    ///
    /// [`handle_udp_payload`](Self::handle_udp_payload) runs this after
    /// every append under the mixed policy.
    pub fn drain_mixed(&mut self) -> Result<usize> {
        if self.policy() != RecordingPolicy::Mixed {
            return Ok(0);
        }
        // Snapshot both counts before draining either buffer.
        let n = self.incoming.available().min(self.outgoing.available());
        if n == 0 {
            return Ok(0);
        }
        let incoming = self.incoming.drain(n);
        let outgoing = self.outgoing.drain(n);
        self.write_mixed(&mix_pcm16(&incoming, &outgoing))?;
        Ok(n)
    }

    fn drain_mixed_tail(&mut self) -> Result<()> {
        let n = self.incoming.available().max(self.outgoing.available());
        if n == 0 {
            return Ok(());
        }
        tracing::debug!(
            incoming = self.incoming.available(),
            outgoing = self.outgoing.available(),
            "draining tail"
        );
        let incoming = self.incoming.drain(n);
        let outgoing = self.outgoing.drain(n);
        self.write_mixed(&mix_pcm16(&incoming, &outgoing))
    }

    fn write_mixed(&mut self, pcm: &[u8]) -> Result<()> {
        if let SessionSinks::Mixed(sink) = &mut self.sinks {
            sink.write(pcm)?;
            self.stats.bytes_written += pcm.len() as u64;
        }
        Ok(())
    }

    fn flush_direction(&mut self, direction: Direction) -> Result<()> {
        let pcm = self.buffer_mut(direction).drain_all();
        if pcm.is_empty() {
            return Ok(());
        }
        if let SessionSinks::Separate { incoming, outgoing } = &mut self.sinks {
            let sink = match direction {
                Direction::Incoming => incoming,
                Direction::Outgoing => outgoing,
            };
            sink.write(&pcm)?;
            self.stats.bytes_written += pcm.len() as u64;
        }
        Ok(())
    }

    /// Close every sink, returning the first failure.
    fn close_sinks(&mut self) -> Result<()> {
        let mut first_err = None;
        for sink in self.sinks.all_mut() {
            if let Err(e) = sink.close() {
                tracing::error!(sink = sink.label(), error = %e, "failed to close sink");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Tear down after a sink failure. Close errors are logged only.
    fn abort(&mut self, cause: &CaptureError) {
        tracing::error!(error = %cause, "sink failure, stopping session");
        let _ = self.close_sinks();
        self.set_state(SessionState::Stopped);
    }

    fn count_drop(&mut self, direction: Direction, err: &CaptureError) {
        match err {
            CaptureError::UnsupportedPayloadType(_) => self.stats.unsupported_packets += 1,
            _ => self.stats.malformed_packets += 1,
        }
        let dropped = self.stats.dropped_packets();
        if warn_on_drop(dropped) {
            tracing::warn!(%direction, error = %err, dropped, "packet dropped");
        } else {
            tracing::debug!(%direction, error = %err, dropped, "packet dropped");
        }
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(old_state = ?self.state, new_state = ?state, "state transition");
        self.state = state;
    }

    fn buffer(&self, direction: Direction) -> &ChannelBuffer {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }

    fn buffer_mut(&mut self, direction: Direction) -> &mut ChannelBuffer {
        match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        }
    }
}

/// Dropped packets between two `warn` lines; the rest log at `debug`.
const DROP_WARN_INTERVAL: u64 = 100;

/// The first drop and every [`DROP_WARN_INTERVAL`]th after it.
fn warn_on_drop(dropped: u64) -> bool {
    dropped % DROP_WARN_INTERVAL == 1
}

/// Parse, check the payload type and expand mu-law to PCM.
fn decode_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let packet = RtpPacket::parse(payload)?;
    if packet.payload_type() != PAYLOAD_TYPE_PCMU {
        return Err(CaptureError::UnsupportedPayloadType(packet.payload_type()));
    }
    Ok(mulaw::decode(packet.media_payload()))
}
