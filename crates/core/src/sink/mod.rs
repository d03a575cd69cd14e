//! Output sinks for decoded PCM.
//!
//! A sink receives 16-bit LE PCM (8 kHz mono) in the order the session
//! produced it and is closed exactly once when the session stops.
//!
//! - [`WavSink`]: WAV file on disk, header finalized on close.
//! - [`MemorySink`]: in-memory buffer with a cloneable handle, for hosts
//!   that post-process audio themselves and for tests.

pub mod wav;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CaptureError, Result};
pub use wav::WavSink;

/// Destination for one recorded stream.
pub trait AudioSink: Send {
    /// Append PCM bytes. Write order must be preserved.
    fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Flush and release the sink. Called once at session stop.
    fn close(&mut self) -> Result<()>;

    /// Label used in logs and [`CaptureError::SinkWrite`].
    fn label(&self) -> &str {
        "sink"
    }
}

#[derive(Debug, Default)]
struct MemoryBuffer {
    data: Vec<u8>,
    writes: usize,
    closed: bool,
}

/// In-memory sink. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryBuffer>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `write` calls received.
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CaptureError::sink(
                "memory",
                std::io::Error::other("write after close"),
            ));
        }
        inner.data.extend_from_slice(pcm);
        inner.writes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }

    fn label(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_shares_buffer() {
        let handle = MemorySink::new();
        let mut sink = handle.clone();
        sink.write(&[1, 2]).unwrap();
        sink.write(&[3, 4]).unwrap();

        assert_eq!(handle.contents(), vec![1, 2, 3, 4]);
        assert_eq!(handle.write_count(), 2);
        assert!(!handle.is_closed());
    }

    #[test]
    fn memory_sink_rejects_write_after_close() {
        let mut sink = MemorySink::new();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(
            sink.write(&[0, 0]),
            Err(CaptureError::SinkWrite { .. })
        ));
    }
}
