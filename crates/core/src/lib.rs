pub mod capture;
pub mod error;
pub mod media;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod transport;

pub use capture::{CaptureEvent, CaptureSender, Direction};
pub use error::{CaptureError, MalformedKind, Result};
pub use media::{PcmuPacketizer, RtpPacket};
pub use recorder::{OutputConfig, Recorder, RecorderConfig};
pub use session::{RecordingPolicy, RecordingSession, SessionSinks, SessionState, SessionStats};
pub use sink::{AudioSink, MemorySink, WavSink};
