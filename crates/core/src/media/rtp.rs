use std::fmt;

use crate::error::{CaptureError, MalformedKind, Result};

/// Length of the RTP fixed header in bytes.
pub const FIXED_HEADER_LEN: usize = 12;
/// The CC field is 4 bits wide.
pub const MAX_CSRC_COUNT: usize = 15;
/// The PT field is 7 bits wide (RFC 3551 §6).
pub const MAX_PAYLOAD_TYPE: u8 = 127;
/// Protocol version carried by every RFC 3550 packet.
pub const RTP_VERSION: u8 = 2;

const CSRC_LEN: usize = 4;
const EXTENSION_HEADER_LEN: usize = 4;

/// Bit-field helpers for the first two header bytes.
///
/// ```text
///  0 1 2 3 4 5 6 7   0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+ +-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   | |M|     PT      |
/// +-+-+-+-+-+-+-+-+ +-+-+-+-+-+-+-+-+
/// ```
pub mod fields {
    pub const VERSION_SHIFT: u8 = 6;
    pub const VERSION_MASK: u8 = 0b1100_0000;
    pub const PADDING_MASK: u8 = 0b0010_0000;
    pub const EXTENSION_MASK: u8 = 0b0001_0000;
    pub const CSRC_COUNT_MASK: u8 = 0b0000_1111;
    pub const MARKER_MASK: u8 = 0b1000_0000;
    pub const PAYLOAD_TYPE_MASK: u8 = 0b0111_1111;

    pub fn version(first: u8) -> u8 {
        (first & VERSION_MASK) >> VERSION_SHIFT
    }

    pub fn padding(first: u8) -> bool {
        first & PADDING_MASK != 0
    }

    pub fn extension(first: u8) -> bool {
        first & EXTENSION_MASK != 0
    }

    pub fn csrc_count(first: u8) -> usize {
        (first & CSRC_COUNT_MASK) as usize
    }

    pub fn marker(second: u8) -> bool {
        second & MARKER_MASK != 0
    }

    pub fn payload_type(second: u8) -> u8 {
        second & PAYLOAD_TYPE_MASK
    }

    /// Pack `V|P|X|CC`. Out-of-range values are truncated to their field width.
    pub fn pack_first_byte(version: u8, padding: bool, extension: bool, csrc_count: usize) -> u8 {
        ((version << VERSION_SHIFT) & VERSION_MASK)
            | if padding { PADDING_MASK } else { 0 }
            | if extension { EXTENSION_MASK } else { 0 }
            | (csrc_count as u8 & CSRC_COUNT_MASK)
    }

    /// Pack `M|PT`.
    pub fn pack_second_byte(marker: bool, payload_type: u8) -> u8 {
        let marker = if marker { MARKER_MASK } else { 0 };
        marker | (payload_type & PAYLOAD_TYPE_MASK)
    }
}

/// A parsed RTP data packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                    CSRC identifiers (CC x 32)                 |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      defined by profile       |        length (words)         |  if X
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The CC field is never stored: it is always the length of
/// [`contributing_sources`](Self::contributing_sources).
///
/// Header extensions are skipped on parse and their content is not kept.
/// Padding is kept inside [`payload`](Self::payload) so that a parsed
/// packet serializes back to the same bytes; use
/// [`media_payload`](Self::media_payload) for the audio itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    version: u8,
    has_padding: bool,
    has_extension: bool,
    marker: bool,
    payload_type: u8,
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    contributing_sources: Vec<u32>,
    payload: Vec<u8>,
}

impl RtpPacket {
    /// Build a version 2 packet with no CSRCs, padding, extension or marker.
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        check_payload_type(payload_type)?;
        Ok(Self {
            version: RTP_VERSION,
            has_padding: false,
            has_extension: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            contributing_sources: Vec::new(),
            payload: payload.into(),
        })
    }

    /// PCMU packet (PT 0), which needs no payload type check.
    pub fn pcmu(sequence_number: u16, timestamp: u32, ssrc: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            version: RTP_VERSION,
            has_padding: false,
            has_extension: false,
            marker: false,
            payload_type: super::PAYLOAD_TYPE_PCMU,
            sequence_number,
            timestamp,
            ssrc,
            contributing_sources: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Set the M bit (start of talkspurt for audio profiles).
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Set the P bit. The padding bytes must already end the payload, the
    /// last of them holding the padding count.
    ///
    /// Fails with [`MalformedKind::InvalidPadding`] when that count is zero
    /// or longer than the payload, since such a packet would not parse back.
    pub fn with_padding(mut self, has_padding: bool) -> Result<Self> {
        if has_padding && !valid_padding(&self.payload) {
            return Err(CaptureError::malformed(MalformedKind::InvalidPadding));
        }
        self.has_padding = has_padding;
        Ok(self)
    }

    /// Set the X bit. Serialization emits an empty extension block.
    pub fn with_extension(mut self, has_extension: bool) -> Self {
        self.has_extension = has_extension;
        self
    }

    /// Replace the CSRC list. At most [`MAX_CSRC_COUNT`] entries fit in CC.
    pub fn with_contributing_sources(mut self, csrcs: Vec<u32>) -> Result<Self> {
        if csrcs.len() > MAX_CSRC_COUNT {
            return Err(CaptureError::TooManyContributingSources(csrcs.len()));
        }
        self.contributing_sources = csrcs;
        Ok(self)
    }

    /// Change the payload type, rejecting values above 127.
    pub fn set_payload_type(&mut self, payload_type: u8) -> Result<()> {
        check_payload_type(payload_type)?;
        self.payload_type = payload_type;
        Ok(())
    }

    /// Parse a complete RTP packet from a UDP payload.
    ///
    /// Returns [`CaptureError::MalformedPacket`] when the buffer is shorter
    /// than the fixed header, the declared CSRC list, or the declared header
    /// extension, or when the P bit is set with an impossible padding count.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(CaptureError::malformed(MalformedKind::TooShort));
        }

        let first = buf[0];
        let second = buf[1];
        let csrc_count = fields::csrc_count(first);
        let has_padding = fields::padding(first);
        let has_extension = fields::extension(first);

        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut offset = FIXED_HEADER_LEN;
        let csrc_end = offset + csrc_count * CSRC_LEN;
        if buf.len() < csrc_end {
            return Err(CaptureError::malformed(MalformedKind::TruncatedCsrcList));
        }
        let contributing_sources = buf[offset..csrc_end]
            .chunks_exact(CSRC_LEN)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        offset = csrc_end;

        if has_extension {
            if buf.len() < offset + EXTENSION_HEADER_LEN {
                return Err(CaptureError::malformed(MalformedKind::TruncatedExtension));
            }
            let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += EXTENSION_HEADER_LEN + words * 4;
            if buf.len() < offset {
                return Err(CaptureError::malformed(MalformedKind::TruncatedExtension));
            }
        }

        let payload = buf[offset..].to_vec();
        if has_padding && !valid_padding(&payload) {
            return Err(CaptureError::malformed(MalformedKind::InvalidPadding));
        }

        Ok(Self {
            version: fields::version(first),
            has_padding,
            has_extension,
            marker: fields::marker(second),
            payload_type: fields::payload_type(second),
            sequence_number,
            timestamp,
            ssrc,
            contributing_sources,
            payload,
        })
    }

    /// Total wire length: `12 + 4*CC + extension + payload`.
    pub fn serialized_len(&self) -> usize {
        let extension = if self.has_extension {
            EXTENSION_HEADER_LEN
        } else {
            0
        };
        FIXED_HEADER_LEN + self.contributing_sources.len() * CSRC_LEN + extension + self.payload.len()
    }

    /// Serialize to a freshly allocated buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        self.serialize_into(&mut out);
        out
    }

    /// Append the wire form of this packet to `out`.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.serialized_len());
        out.push(fields::pack_first_byte(
            self.version,
            self.has_padding,
            self.has_extension,
            self.contributing_sources.len(),
        ));
        out.push(fields::pack_second_byte(self.marker, self.payload_type));
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for csrc in &self.contributing_sources {
            out.extend_from_slice(&csrc.to_be_bytes());
        }
        if self.has_extension {
            // profile 0, zero-length body
            out.extend_from_slice(&[0, 0, 0, 0]);
        }
        out.extend_from_slice(&self.payload);
    }

    /// The V field, 2 for every packet built here.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// The P bit as parsed.
    pub fn has_padding(&self) -> bool {
        self.has_padding
    }

    /// The X bit. The extension body itself is not retained.
    pub fn has_extension(&self) -> bool {
        self.has_extension
    }

    /// The M bit.
    pub fn marker(&self) -> bool {
        self.marker
    }

    /// The 7-bit PT field.
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Sequence number, wrapping at 16 bits.
    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    /// Media timestamp in clock-rate units.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Synchronization source identifier.
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// CSRC identifiers in wire order.
    pub fn contributing_sources(&self) -> &[u32] {
        &self.contributing_sources
    }

    /// CC as it appears on the wire.
    pub fn csrc_count(&self) -> usize {
        self.contributing_sources.len()
    }

    /// Everything after the header, padding included.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of trailing padding bytes (RFC 3550 §5.1, P bit).
    pub fn padding_len(&self) -> usize {
        if !self.has_padding {
            return 0;
        }
        let count = self.payload.last().copied().unwrap_or(0) as usize;
        count.min(self.payload.len())
    }

    /// Payload with trailing padding removed.
    pub fn media_payload(&self) -> &[u8] {
        &self.payload[..self.payload.len() - self.padding_len()]
    }

    /// Consume the packet, keeping the payload (padding included).
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl fmt::Display for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTP v{} pt={} seq={} ts={} ssrc={:#010X} cc={} marker={} payload={}B",
            self.version,
            self.payload_type,
            self.sequence_number,
            self.timestamp,
            self.ssrc,
            self.contributing_sources.len(),
            self.marker,
            self.payload.len()
        )
    }
}

/// The trailing count byte includes itself, so zero is never valid.
fn valid_padding(payload: &[u8]) -> bool {
    let count = payload.last().copied().unwrap_or(0) as usize;
    count != 0 && count <= payload.len()
}

fn check_payload_type(payload_type: u8) -> Result<()> {
    if payload_type > MAX_PAYLOAD_TYPE {
        return Err(CaptureError::InvalidPayloadType(payload_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: [u8; 13] = [
        0x80, 0x80, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xFF,
    ];

    #[test]
    fn version_field() {
        assert_eq!(fields::version(0x80), 2);
        assert_eq!(fields::version(0xC0), 3);
        assert_eq!(fields::version(0x3F), 0);
    }

    #[test]
    fn padding_and_extension_fields() {
        assert!(fields::padding(0xA0));
        assert!(!fields::padding(0x90));
        assert!(fields::extension(0x90));
        assert!(!fields::extension(0xA0));
    }

    #[test]
    fn csrc_count_field() {
        assert_eq!(fields::csrc_count(0x80), 0);
        assert_eq!(fields::csrc_count(0x82), 2);
        assert_eq!(fields::csrc_count(0xBF), 15);
    }

    #[test]
    fn marker_and_payload_type_fields() {
        assert!(fields::marker(0x80));
        assert_eq!(fields::payload_type(0x80), 0);
        assert!(!fields::marker(0x60));
        assert_eq!(fields::payload_type(0x60), 96);
        assert_eq!(fields::payload_type(0xFF), 127);
    }

    #[test]
    fn pack_first_byte_layout() {
        assert_eq!(fields::pack_first_byte(2, false, false, 0), 0x80);
        assert_eq!(fields::pack_first_byte(2, true, true, 3), 0xB3);
        assert_eq!(fields::pack_first_byte(2, false, false, 15), 0x8F);
    }

    #[test]
    fn pack_second_byte_layout() {
        assert_eq!(fields::pack_second_byte(true, 0), 0x80);
        assert_eq!(fields::pack_second_byte(false, 96), 0x60);
        assert_eq!(fields::pack_second_byte(true, 127), 0xFF);
    }

    #[test]
    fn parse_minimal_header() {
        let p = RtpPacket::parse(&MINIMAL).unwrap();
        assert_eq!(p.version(), 2);
        assert!(p.marker());
        assert!(!p.has_padding());
        assert!(!p.has_extension());
        assert_eq!(p.payload_type(), 0);
        assert_eq!(p.sequence_number(), 1);
        assert_eq!(p.timestamp(), 1);
        assert_eq!(p.ssrc(), 2);
        assert!(p.contributing_sources().is_empty());
        assert_eq!(p.payload(), &[0xFF]);
    }

    #[test]
    fn parse_reads_big_endian_fields() {
        let buf = [
            0x80, 0x00, 0xAB, 0xCD, 0x12, 0x34, 0x56, 0x78, 0xDE, 0xAD, 0xBE, 0xEF,
        ];
        let p = RtpPacket::parse(&buf).unwrap();
        assert_eq!(p.sequence_number(), 0xABCD);
        assert_eq!(p.timestamp(), 0x1234_5678);
        assert_eq!(p.ssrc(), 0xDEAD_BEEF);
        assert!(p.payload().is_empty());
    }

    #[test]
    fn parse_csrc_list_in_order() {
        let mut buf = vec![0x82, 0x00, 0, 7, 0, 0, 0, 9, 0, 0, 0, 1];
        buf.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
        buf.extend_from_slice(&[0x55, 0x66, 0x77, 0x88]);
        buf.extend_from_slice(&[0xAA, 0xBB]);

        let p = RtpPacket::parse(&buf).unwrap();
        assert_eq!(p.contributing_sources(), &[0x1122_3344, 0x5566_7788]);
        assert_eq!(p.payload(), &[0xAA, 0xBB]);
    }

    #[test]
    fn parse_too_short_is_malformed() {
        for len in 0..FIXED_HEADER_LEN {
            let err = RtpPacket::parse(&MINIMAL[..len]).unwrap_err();
            assert!(matches!(
                err,
                CaptureError::MalformedPacket {
                    kind: MalformedKind::TooShort
                }
            ));
        }
    }

    #[test]
    fn parse_truncated_csrc_list() {
        // CC=2 but only one CSRC present
        let mut buf = vec![0x82, 0x00, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        buf.extend_from_slice(&[0, 0, 0, 5]);
        let err = RtpPacket::parse(&buf).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::MalformedPacket {
                kind: MalformedKind::TruncatedCsrcList
            }
        ));
    }

    #[test]
    fn parse_skips_extension() {
        let mut buf = vec![0x90, 0x00, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        // profile 0xBEDE, one word of extension data
        buf.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4]);
        buf.extend_from_slice(&[0x7F, 0x7E]);

        let p = RtpPacket::parse(&buf).unwrap();
        assert!(p.has_extension());
        assert_eq!(p.payload(), &[0x7F, 0x7E]);
    }

    #[test]
    fn parse_truncated_extension() {
        let mut buf = vec![0x90, 0x00, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        buf.extend_from_slice(&[0xBE, 0xDE]);
        assert!(matches!(
            RtpPacket::parse(&buf).unwrap_err(),
            CaptureError::MalformedPacket {
                kind: MalformedKind::TruncatedExtension
            }
        ));

        // declares two words, carries one
        buf.extend_from_slice(&[0x00, 0x02, 1, 2, 3, 4]);
        assert!(matches!(
            RtpPacket::parse(&buf).unwrap_err(),
            CaptureError::MalformedPacket {
                kind: MalformedKind::TruncatedExtension
            }
        ));
    }

    #[test]
    fn padding_bit_is_reported_and_trimmed() {
        let mut buf = vec![0xA0, 0x00, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        buf.extend_from_slice(&[0x10, 0x20, 0x00, 0x00, 0x03]);

        let p = RtpPacket::parse(&buf).unwrap();
        assert!(p.has_padding());
        assert_eq!(p.payload().len(), 5);
        assert_eq!(p.padding_len(), 3);
        assert_eq!(p.media_payload(), &[0x10, 0x20]);
        assert_eq!(p.serialize(), buf);
    }

    #[test]
    fn invalid_padding_count() {
        let mut buf = vec![0xA0, 0x00, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        buf.extend_from_slice(&[0x10, 0x00]);
        assert!(matches!(
            RtpPacket::parse(&buf).unwrap_err(),
            CaptureError::MalformedPacket {
                kind: MalformedKind::InvalidPadding
            }
        ));

        buf.pop();
        buf.push(9);
        assert!(RtpPacket::parse(&buf).is_err());
    }

    #[test]
    fn with_padding_rejects_unparseable_count() {
        for payload in [vec![1, 2, 0], Vec::new(), vec![0xFF, 4]] {
            assert!(matches!(
                RtpPacket::pcmu(1, 2, 3, payload).with_padding(true),
                Err(CaptureError::MalformedPacket {
                    kind: MalformedKind::InvalidPadding
                })
            ));
        }
        // clearing the bit never needs a count
        assert!(RtpPacket::pcmu(1, 2, 3, vec![1, 2, 0]).with_padding(false).is_ok());

        let padded = RtpPacket::pcmu(1, 2, 3, vec![0x7F, 0, 2]).with_padding(true).unwrap();
        let parsed = RtpPacket::parse(&padded.serialize()).unwrap();
        assert_eq!(parsed, padded);
        assert_eq!(parsed.media_payload(), &[0x7F]);
    }

    #[test]
    fn serialize_derives_csrc_count() {
        let p = RtpPacket::new(8, 100, 1600, 0xCAFE_BABE, vec![1, 2, 3])
            .unwrap()
            .with_contributing_sources(vec![7, 8, 9])
            .unwrap();
        let buf = p.serialize();
        assert_eq!(fields::csrc_count(buf[0]), 3);
        assert_eq!(buf.len(), 12 + 3 * 4 + 3);
        assert_eq!(buf.len(), p.serialized_len());
        assert_eq!(&buf[12..16], &[0, 0, 0, 7]);
    }

    #[test]
    fn round_trip_various_packets() {
        let packets = [
            RtpPacket::pcmu(0, 0, 1, Vec::new()),
            RtpPacket::pcmu(u16::MAX, u32::MAX, u32::MAX, vec![0xFF; 160]).with_marker(true),
            RtpPacket::new(127, 42, 8000, 0x0102_0304, vec![9; 20])
                .unwrap()
                .with_contributing_sources((0..15).collect())
                .unwrap(),
        ];
        for p in packets {
            assert_eq!(RtpPacket::parse(&p.serialize()).unwrap(), p);
        }
    }

    #[test]
    fn extension_round_trip_keeps_flag() {
        let p = RtpPacket::pcmu(5, 6, 7, vec![1, 2]).with_extension(true);
        let buf = p.serialize();
        assert_eq!(buf.len(), 12 + 4 + 2);
        assert_eq!(RtpPacket::parse(&buf).unwrap(), p);
    }

    #[test]
    fn payload_type_bound() {
        assert!(RtpPacket::new(127, 0, 0, 0, Vec::new()).is_ok());
        assert!(matches!(
            RtpPacket::new(128, 0, 0, 0, Vec::new()),
            Err(CaptureError::InvalidPayloadType(128))
        ));

        let mut p = RtpPacket::pcmu(0, 0, 0, Vec::new());
        assert!(p.set_payload_type(200).is_err());
        assert_eq!(p.payload_type(), 0);
        p.set_payload_type(96).unwrap();
        assert_eq!(p.payload_type(), 96);
    }

    #[test]
    fn too_many_csrcs_rejected() {
        let err = RtpPacket::pcmu(0, 0, 0, Vec::new())
            .with_contributing_sources(vec![0; 16])
            .unwrap_err();
        assert!(matches!(err, CaptureError::TooManyContributingSources(16)));
    }

    #[test]
    fn display_summary() {
        let p = RtpPacket::parse(&MINIMAL).unwrap();
        let s = p.to_string();
        assert!(s.contains("seq=1"));
        assert!(s.contains("ssrc=0x00000002"));
    }
}
