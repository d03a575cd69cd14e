use super::rtp::RtpPacket;
use super::{PCM_SAMPLE_BYTES, mulaw};

/// 20 ms of audio at 8 kHz, the usual PCMU packet time.
pub const SAMPLES_PER_PACKET: usize = 160;

/// PCMU RTP packetizer.
///
/// Turns 16-bit LE PCM into mu-law RTP packets of [`SAMPLES_PER_PACKET`]
/// samples each. State carried across calls:
///
/// - **Sequence number**: 16-bit, wrapping, incremented per packet.
/// - **Timestamp**: advanced by the sample count of each packet (the
///   PCMU clock equals the sample rate).
/// - **Marker**: set on the first packet of the stream (start of talkspurt,
///   RFC 3551 §4.1).
///
/// A short final chunk is sent as a shorter packet rather than padded.
#[derive(Debug)]
pub struct PcmuPacketizer {
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    started: bool,
}

impl PcmuPacketizer {
    /// Start a stream at sequence 0 and timestamp 0 with the given SSRC.
    pub fn new(ssrc: u32) -> Self {
        tracing::debug!(ssrc = format_args!("{:#010X}", ssrc), "PCMU packetizer created");
        Self {
            ssrc,
            sequence: 0,
            timestamp: 0,
            started: false,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc() -> Self {
        Self::new(rand::random::<u32>())
    }

    /// SSRC stamped on every packet of this stream.
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number the next packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next packet will carry.
    pub fn next_timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Packetize PCM into serialized RTP packets.
    pub fn packetize(&mut self, pcm: &[u8]) -> Vec<Vec<u8>> {
        pcm.chunks(SAMPLES_PER_PACKET * PCM_SAMPLE_BYTES)
            .map(mulaw::encode)
            .filter(|payload| !payload.is_empty())
            .map(|payload| {
                let samples = payload.len() as u32;
                let packet = RtpPacket::pcmu(self.sequence, self.timestamp, self.ssrc, payload)
                    .with_marker(!self.started);
                self.started = true;
                self.sequence = self.sequence.wrapping_add(1);
                self.timestamp = self.timestamp.wrapping_add(samples);
                packet.serialize()
            })
            .collect()
    }
}
