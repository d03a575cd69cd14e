//! Error types for the capture library.

use std::fmt;

/// Errors that can occur while capturing and recording RTP audio.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Packet**: [`MalformedPacket`](Self::MalformedPacket),
///   [`UnsupportedPayloadType`](Self::UnsupportedPayloadType). Dropped per
///   packet by the session; they never end a recording.
/// - **Construction**: [`InvalidPayloadType`](Self::InvalidPayloadType),
///   [`TooManyContributingSources`](Self::TooManyContributingSources).
/// - **Output**: [`SinkWrite`](Self::SinkWrite). Fatal for the session.
/// - **Lifecycle**: [`SessionStopped`](Self::SessionStopped),
///   [`AlreadyRunning`](Self::AlreadyRunning), [`NotStarted`](Self::NotStarted).
/// - **Setup**: [`Config`](Self::Config), [`Io`](Self::Io).
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The buffer is inconsistent with the sizes its RTP header declares.
    #[error("malformed RTP packet: {kind}")]
    MalformedPacket { kind: MalformedKind },

    /// Payload type other than PCMU (RFC 3551 PT 0).
    #[error("unsupported payload type: {0}")]
    UnsupportedPayloadType(u8),

    /// Payload type outside the 7-bit range 0–127.
    #[error("invalid payload type {0} (must be 0-127)")]
    InvalidPayloadType(u8),

    /// More CSRC entries than the 4-bit CC field can describe.
    #[error("too many contributing sources: {0} (at most 15)")]
    TooManyContributingSources(usize),

    /// Writing to or closing an output sink failed.
    #[error("sink write failure on {sink}: {source}")]
    SinkWrite {
        sink: String,
        #[source]
        source: std::io::Error,
    },

    /// The session already stopped (explicitly or after a sink failure).
    #[error("recording session already stopped")]
    SessionStopped,

    /// [`Recorder::start`](crate::Recorder::start) was called while already running.
    #[error("recorder already running")]
    AlreadyRunning,

    /// [`Recorder::stop`](crate::Recorder::stop) was called before `start`.
    #[error("recorder not started")]
    NotStarted,

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying I/O or socket error outside of sink writes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub(crate) fn malformed(kind: MalformedKind) -> Self {
        Self::MalformedPacket { kind }
    }

    pub(crate) fn sink(sink: &str, source: std::io::Error) -> Self {
        Self::SinkWrite {
            sink: sink.to_string(),
            source,
        }
    }

    /// Whether this error only affects a single packet.
    pub fn is_packet_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedPacket { .. } | Self::UnsupportedPayloadType(_)
        )
    }
}

/// Specific kind of RTP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// Fewer than the 12 bytes of the fixed header.
    TooShort,
    /// The CC field declares more CSRC entries than the buffer holds.
    TruncatedCsrcList,
    /// The X bit is set but the extension header or its data is cut off.
    TruncatedExtension,
    /// The P bit is set but the trailing padding count is zero or too large.
    InvalidPadding,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "shorter than fixed header"),
            Self::TruncatedCsrcList => write!(f, "truncated CSRC list"),
            Self::TruncatedExtension => write!(f, "truncated header extension"),
            Self::InvalidPadding => write!(f, "invalid padding length"),
        }
    }
}

/// Convenience alias for `Result<T, CaptureError>`.
pub type Result<T> = std::result::Result<T, CaptureError>;
