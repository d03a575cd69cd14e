//! ITU-T G.711 mu-law companding.
//!
//! Each 8-bit code holds a sign bit, a 3-bit segment (exponent) and a
//! 4-bit step (mantissa), stored inverted on the wire. Linear samples are
//! biased by 0x84 before the segment search so that every segment starts
//! on a power of two.

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Expand one mu-law code to a 16-bit linear sample.
pub fn decode_sample(code: u8) -> i16 {
    let code = !code;
    let exponent = (code >> 4) & 0x07;
    let mantissa = (code & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if code & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Compress one 16-bit linear sample to a mu-law code.
pub fn encode_sample(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Decode a mu-law payload into 16-bit little-endian PCM.
///
/// The output is always exactly twice as long as the input.
pub fn decode(payload: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(payload.len() * 2);
    for &code in payload {
        pcm.extend_from_slice(&decode_sample(code).to_le_bytes());
    }
    pcm
}

/// Encode 16-bit little-endian PCM into mu-law. A trailing odd byte is ignored.
pub fn encode(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(2)
        .map(|s| encode_sample(i16::from_le_bytes([s[0], s[1]])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_codes() {
        assert_eq!(encode_sample(0), 0xFF);
        assert_eq!(decode_sample(0xFF), 0);
        assert_eq!(decode_sample(0x7F), 0);
    }

    #[test]
    fn extremes() {
        assert_eq!(decode_sample(0x80), 32124);
        assert_eq!(decode_sample(0x00), -32124);
        assert_eq!(encode_sample(i16::MAX), 0x80);
        assert_eq!(encode_sample(i16::MIN), 0x00);
    }

    #[test]
    fn decode_is_total_and_symmetric() {
        for code in 0..=0x7Fu8 {
            assert_eq!(decode_sample(code), -decode_sample(code | 0x80));
        }
    }

    #[test]
    fn quantization_error_is_bounded() {
        for sample in i16::MIN..=i16::MAX {
            let clamped = (sample as i32).clamp(-CLIP, CLIP);
            let restored = decode_sample(encode_sample(sample)) as i32;
            assert!(
                (restored - clamped).abs() <= 512,
                "sample {sample} restored as {restored}"
            );
            assert!((restored - sample as i32).abs() <= 1024);
        }
    }

    #[test]
    fn decoded_values_are_fixed_points() {
        for code in 0..=u8::MAX {
            let linear = decode_sample(code);
            assert_eq!(decode_sample(encode_sample(linear)), linear);
        }
    }

    #[test]
    fn buffer_decode_doubles_length() {
        let pcm = decode(&[0xFF, 0x80, 0x00]);
        assert_eq!(pcm.len(), 6);
        assert_eq!(&pcm[0..2], &[0, 0]);
        assert_eq!(i16::from_le_bytes([pcm[2], pcm[3]]), 32124);
        assert_eq!(i16::from_le_bytes([pcm[4], pcm[5]]), -32124);
    }

    #[test]
    fn buffer_encode_halves_length() {
        let pcm = decode(&[0x12, 0x9A, 0xFF, 0x40]);
        assert_eq!(encode(&pcm), vec![0x12, 0x9A, 0xFF, 0x40]);

        let mut odd = pcm.clone();
        odd.push(0x55);
        assert_eq!(encode(&odd).len(), 4);
    }
}
