use std::collections::VecDeque;

/// Append-only PCM buffer for one call direction.
///
/// Bytes enter at the back when a packet is decoded and leave from the
/// front when the session writes them to a sink.
#[derive(Debug, Default)]
pub struct ChannelBuffer {
    data: VecDeque<u8>,
    total_appended: u64,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue decoded PCM at the back.
    pub fn append(&mut self, pcm: &[u8]) {
        self.data.extend(pcm);
        self.total_appended += pcm.len() as u64;
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove and return up to `n` bytes from the front.
    pub fn drain(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.data.len());
        self.data.drain(..n).collect()
    }

    /// Remove and return everything buffered.
    pub fn drain_all(&mut self) -> Vec<u8> {
        self.data.drain(..).collect()
    }

    /// Bytes appended over the buffer's lifetime.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}
