//! RTP codec, G.711 mu-law and PCM helpers.
//!
//! ## Audio format
//!
//! Everything recorded by this crate is PCMU as defined by RFC 3551 §4.5.14:
//!
//! | Side | Encoding | Rate | Channels | Bytes/sample |
//! |------|----------|------|----------|--------------|
//! | wire | mu-law (PT 0) | 8000 Hz | 1 | 1 |
//! | recording | 16-bit signed LE PCM | 8000 Hz | 1 | 2 |
//!
//! Decoding therefore doubles the byte count exactly.

pub mod mulaw;
pub mod pcmu;
pub mod rtp;

pub use pcmu::PcmuPacketizer;
pub use rtp::RtpPacket;

/// Static payload type for PCMU (RFC 3551 table 4).
pub const PAYLOAD_TYPE_PCMU: u8 = 0;
/// RTP clock rate and sample rate for PCMU.
pub const SAMPLE_RATE: u32 = 8000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;
/// Bytes per decoded PCM sample.
pub const PCM_SAMPLE_BYTES: usize = 2;

/// Mix two 16-bit LE PCM streams sample by sample, clipping to `i16`.
///
/// The output is as long as the longer input; the shorter one is treated
/// as silence past its end.
pub fn mix_pcm16(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len()) & !1;
    let mut out = Vec::with_capacity(len);
    for i in (0..len).step_by(PCM_SAMPLE_BYTES) {
        let mixed = sample_at(a, i) as i32 + sample_at(b, i) as i32;
        let clipped = mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        out.extend_from_slice(&clipped.to_le_bytes());
    }
    out
}

fn sample_at(pcm: &[u8], offset: usize) -> i16 {
    match pcm.get(offset..offset + PCM_SAMPLE_BYTES) {
        Some(s) => i16::from_le_bytes([s[0], s[1]]),
        None => 0,
    }
}
