//! Capture sources that feed the pipeline.
//!
//! The recorder never touches link-layer frames: a source hands over UDP
//! payloads already tagged with a [`Direction`](crate::capture::Direction).
//!
//! - **UDP** ([`udp`]): binds the monitored port and the peer port on a
//!   local interface and classifies each datagram by the port it arrived
//!   on. Suited to mirrored or forwarded traffic and to local testing.
//!
//! Any other source (pcap replay, raw sockets) only needs a
//! [`CaptureSender`](crate::capture::CaptureSender).

pub mod udp;

pub use udp::UdpCapture;
