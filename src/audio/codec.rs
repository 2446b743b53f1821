//! Conversions between PCM sample buffers and the base64 transport encoding.
//!
//! All functions are pure. Integer PCM is 16-bit signed little-endian, floats
//! are normalized to [-1.0, 1.0).

use crate::defaults::PCM_SCALE;
use crate::error::{LiveError, Result};
use base64::{Engine as _, engine::general_purpose};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Encode raw bytes as standard padded base64.
pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64 back into bytes.
///
/// # Errors
/// Returns `LiveError::Decode` if the input is not valid base64.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(general_purpose::STANDARD.decode(text)?)
}

/// Scale 16-bit PCM samples to floats by dividing by 32768.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / PCM_SCALE).collect()
}

/// Scale floats to 16-bit PCM by multiplying by 32768.
///
/// Values are truncated toward zero and clamped to the i16 range, so inputs
/// outside [-1.0, 1.0] saturate instead of wrapping. NaN becomes 0.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| float_sample_to_pcm(s)).collect()
}

fn float_sample_to_pcm(sample: f32) -> i16 {
    // `as` saturates at the i16 bounds and maps NaN to 0
    (sample * PCM_SCALE) as i16
}

/// Serialize PCM samples as little-endian bytes.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian bytes into PCM samples.
///
/// # Errors
/// Returns `LiveError::Decode` if the byte count is odd.
pub fn bytes_to_pcm(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(LiveError::Decode {
            message: format!("PCM payload has odd length {}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Float samples → 16-bit PCM → bytes → base64, as sent for a capture frame.
pub fn encode_pcm_frame(samples: &[f32]) -> String {
    encode(&pcm_to_bytes(&float_to_pcm(samples)))
}

/// base64 → bytes → 16-bit PCM → floats, as needed for a response chunk.
///
/// # Errors
/// Returns `LiveError::Decode` for invalid base64 or an odd byte count.
pub fn decode_pcm_payload(payload: &str) -> Result<Vec<f32>> {
    let bytes = decode(payload)?;
    Ok(pcm_to_float(&bytes_to_pcm(&bytes)?))
}

/// Read a binary resource fully into memory and return its base64 encoding.
///
/// # Errors
/// Returns `LiveError::Io` if the reader fails.
pub fn blob_to_base64<R: Read>(mut reader: R) -> Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(encode(&buf))
}

/// [`blob_to_base64`] for a file on disk.
pub fn file_to_base64(path: &Path) -> Result<String> {
    blob_to_base64(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    const STEP: f32 = 1.0 / 32768.0;

    #[test]
    fn test_encode_decode_roundtrip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_encode_decode_roundtrip_odd_lengths() {
        for len in 0..7 {
            let bytes = vec![0xA5u8; len];
            assert_eq!(decode(&encode(&bytes)).unwrap(), bytes, "len {}", len);
        }
    }

    #[test]
    fn test_encode_is_deterministic_and_padded() {
        assert_eq!(encode(b"hi"), "aGk=");
        assert_eq!(encode(b"hi"), encode(b"hi"));
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        let result = decode("@@not-base64@@");
        assert!(matches!(result, Err(LiveError::Decode { .. })));
    }

    #[test]
    fn test_pcm_to_float_scales_by_32768() {
        let floats = pcm_to_float(&[0, 16384, -16384, i16::MIN, i16::MAX]);
        assert_eq!(floats[0], 0.0);
        assert_eq!(floats[1], 0.5);
        assert_eq!(floats[2], -0.5);
        assert_eq!(floats[3], -1.0);
        assert!(floats[4] < 1.0);
    }

    #[test]
    fn test_float_to_pcm_clamps_out_of_range() {
        let pcm = float_to_pcm(&[1.0, 1.5, -1.0, -2.0, 100.0]);
        assert_eq!(pcm, vec![i16::MAX, i16::MAX, i16::MIN, i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_float_to_pcm_nan_is_silence() {
        assert_eq!(float_to_pcm(&[f32::NAN]), vec![0]);
    }

    #[test]
    fn test_float_to_pcm_truncates_toward_zero() {
        assert_eq!(float_to_pcm(&[0.5 * STEP, -0.5 * STEP]), vec![0, 0]);
        assert_eq!(float_to_pcm(&[1.9 * STEP]), vec![1]);
    }

    #[test]
    fn test_pcm_roundtrip_within_one_quantization_step() {
        let mut f = -1.0f32;
        while f < 1.0 {
            let back = pcm_to_float(&float_to_pcm(&[f]))[0];
            assert!(
                (back - f).abs() <= STEP,
                "{} came back as {} (error {})",
                f,
                back,
                (back - f).abs()
            );
            f += 0.000_731;
        }
    }

    #[test]
    fn test_bytes_are_little_endian() {
        assert_eq!(pcm_to_bytes(&[0x0102, -1]), vec![0x02, 0x01, 0xFF, 0xFF]);
        assert_eq!(bytes_to_pcm(&[0x02, 0x01, 0xFF, 0xFF]).unwrap(), vec![0x0102, -1]);
    }

    #[test]
    fn test_bytes_to_pcm_rejects_odd_length() {
        let result = bytes_to_pcm(&[1, 2, 3]);
        assert!(matches!(result, Err(LiveError::Decode { .. })));
    }

    #[test]
    fn test_silent_capture_frame_roundtrip() {
        let frame = vec![0.0f32; 4096];
        let encoded = encode_pcm_frame(&frame);
        assert!(!encoded.is_empty());

        let bytes = decode(&encoded).unwrap();
        assert_eq!(bytes.len(), 8192);
        let pcm = bytes_to_pcm(&bytes).unwrap();
        assert_eq!(pcm, vec![0i16; 4096]);
        assert_eq!(encode(&bytes), encoded);
    }

    #[test]
    fn test_decode_pcm_payload() {
        let payload = encode(&pcm_to_bytes(&[16384, -16384]));
        assert_eq!(decode_pcm_payload(&payload).unwrap(), vec![0.5, -0.5]);
    }

    #[test]
    fn test_decode_pcm_payload_odd_bytes_fails() {
        let payload = encode(&[1, 2, 3]);
        assert!(decode_pcm_payload(&payload).is_err());
    }

    #[test]
    fn test_blob_to_base64_reads_everything() {
        let data = vec![7u8; 10_000];
        let encoded = blob_to_base64(io::Cursor::new(data.clone())).unwrap();
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_blob_to_base64_surfaces_io_error() {
        let result = blob_to_base64(FailingReader);
        assert!(matches!(result, Err(LiveError::Io(_))));
    }

    #[test]
    fn test_file_to_base64() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"levi").unwrap();
        assert_eq!(file_to_base64(file.path()).unwrap(), "bGV2aQ==");
    }

    #[test]
    fn test_file_to_base64_missing_file() {
        let result = file_to_base64(Path::new("/tmp/levi_missing_blob_12345.bin"));
        assert!(matches!(result, Err(LiveError::Io(_))));
    }
}
