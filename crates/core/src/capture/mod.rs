//! Capture-side plumbing between a packet source and a recording session.
//!
//! A capture source (see [`crate::transport`]) runs on its own thread and
//! pushes direction-tagged UDP payloads into a bounded channel. The
//! pipeline side drains that channel one event at a time into a
//! [`RecordingSession`], so the session is never entered concurrently.
//!
//! ```text
//! capture thread(s) --CaptureEvent--> sync_channel --> run_pipeline --> RecordingSession
//! ```
//!
//! The channel is bounded: when the pipeline falls behind, capture threads
//! block on [`CaptureSender::send`] instead of buffering without limit.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};

use crate::error::Result;
use crate::session::{RecordingSession, SessionStats};

/// Default capacity of the capture channel, in events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Which side of the call a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent to the monitored port.
    Incoming,
    /// Sent from the monitored port (any other destination).
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Classify a datagram by its UDP destination port.
pub fn classify(destination_port: u16, monitored_port: u16) -> Direction {
    if destination_port == monitored_port {
        Direction::Incoming
    } else {
        Direction::Outgoing
    }
}

/// Message from a capture source to the pipeline.
#[derive(Debug)]
pub enum CaptureEvent {
    /// One UDP payload (link, IP and UDP headers already stripped).
    Payload { direction: Direction, data: Vec<u8> },
    /// Cooperative stop request.
    Stop,
}

/// Sending half handed to capture sources. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CaptureSender {
    tx: SyncSender<CaptureEvent>,
}

impl CaptureSender {
    /// Queue a payload, blocking while the channel is full.
    ///
    /// Returns `false` once the pipeline has gone away.
    pub fn send(&self, direction: Direction, data: Vec<u8>) -> bool {
        self.tx.send(CaptureEvent::Payload { direction, data }).is_ok()
    }

    /// Ask the pipeline to stop after the events already queued.
    pub fn stop(&self) -> bool {
        self.tx.send(CaptureEvent::Stop).is_ok()
    }
}

/// Create a bounded capture channel.
pub fn channel(capacity: usize) -> (CaptureSender, Receiver<CaptureEvent>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (CaptureSender { tx }, rx)
}

/// Feed events into `session` until a stop event arrives or every sender
/// is dropped, then stop the session.
///
/// Per-packet decode errors are absorbed by the session. A sink failure
/// ends the loop immediately and is returned; the session is already
/// stopped in that case.
pub fn run_pipeline(
    session: &mut RecordingSession,
    events: Receiver<CaptureEvent>,
) -> Result<SessionStats> {
    tracing::debug!(policy = ?session.policy(), "pipeline started");
    for event in events {
        match event {
            CaptureEvent::Payload { direction, data } => {
                session.handle_udp_payload(direction, &data)?;
            }
            CaptureEvent::Stop => {
                tracing::debug!("stop requested");
                break;
            }
        }
    }
    session.stop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::RtpPacket;
    use crate::session::SessionSinks;
    use crate::sink::MemorySink;
    use std::thread;

    fn pcmu(seq: u16, len: usize) -> Vec<u8> {
        RtpPacket::pcmu(seq, seq as u32 * 160, 7, vec![0xFF; len]).serialize()
    }

    #[test]
    fn classify_by_destination_port() {
        assert_eq!(classify(10000, 10000), Direction::Incoming);
        assert_eq!(classify(10002, 10000), Direction::Outgoing);
        assert_eq!(Direction::Incoming.to_string(), "incoming");
    }

    #[test]
    fn pipeline_stops_on_stop_event() {
        let out = MemorySink::new();
        let mut session = RecordingSession::new(SessionSinks::Mixed(Box::new(out.clone())));
        let (tx, rx) = channel(8);

        let producer = thread::spawn(move || {
            assert!(tx.send(Direction::Incoming, pcmu(1, 10)));
            assert!(tx.send(Direction::Outgoing, pcmu(1, 4)));
            assert!(tx.stop());
            // Ignored: pipeline stops at the first Stop.
            tx.send(Direction::Outgoing, pcmu(2, 100));
        });

        let stats = run_pipeline(&mut session, rx).unwrap();
        producer.join().unwrap();

        assert_eq!(stats.packets_received, 2);
        assert_eq!(out.len(), 20);
        assert!(out.is_closed());
    }

    #[test]
    fn pipeline_stops_when_senders_drop() {
        let out = MemorySink::new();
        let mut session = RecordingSession::new(SessionSinks::Mixed(Box::new(out.clone())));
        let (tx, rx) = channel(8);
        tx.send(Direction::Incoming, pcmu(1, 8));
        drop(tx);

        let stats = run_pipeline(&mut session, rx).unwrap();
        assert_eq!(stats.packets_recorded, 1);
        assert_eq!(out.len(), 16);
    }
}
