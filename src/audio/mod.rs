//! Audio payload helpers.
//!
//! Captured speech leaves the crate as base64 PCM16 mono; inbound reply
//! audio arrives base64-encoded as either a complete WAV file or bare
//! PCM16, and bare PCM is wrapped in a WAV container before it is handed
//! to the presenter.

use crate::{AvatalkError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Cursor;

/// Convert float samples in [-1.0, 1.0] to little-endian PCM16 bytes.
/// Out-of-range samples are clamped.
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 0x8000 as f32) as i16
        } else {
            (clamped * 0x7fff as f32) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Encode captured samples as the base64 PCM16 payload of a
/// `user:audio_chunk` frame.
pub fn encode_capture_chunk(samples: &[f32]) -> String {
    BASE64.encode(samples_to_pcm16(samples))
}

/// Decode a base64 audio payload from an `avatar:speak` frame.
pub fn decode_audio_payload(payload: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(payload)
        .map_err(|e| AvatalkError::PlaybackError(format!("invalid base64 audio: {}", e)))
}

/// Whether the bytes already carry a RIFF/WAVE container.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Wrap bare PCM16 mono bytes in a WAV container at the given sample
/// rate. Bytes that already look like a WAV file pass through unchanged.
pub fn ensure_wav(bytes: Vec<u8>, sample_rate: u32) -> Result<Vec<u8>> {
    if is_wav(&bytes) {
        return Ok(bytes);
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AvatalkError::PlaybackError(format!("wav header: {}", e)))?;
        for chunk in bytes.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| AvatalkError::PlaybackError(format!("wav sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AvatalkError::PlaybackError(format!("wav finalize: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_conversion_clamps_and_scales() {
        let bytes = samples_to_pcm16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![0, 0x7fff, -0x8000, 0x7fff, -0x8000]);
    }

    #[test]
    fn capture_chunk_round_trips_through_base64() {
        let encoded = encode_capture_chunk(&[0.5, -0.5]);
        let decoded = decode_audio_payload(&encoded).unwrap();
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode_audio_payload("not base64!!!").is_err());
    }

    #[test]
    fn bare_pcm_gets_a_wav_header() {
        let pcm = samples_to_pcm16(&[0.1, 0.2, 0.3]);
        let wav = ensure_wav(pcm.clone(), 16000).unwrap();
        assert!(is_wav(&wav));

        let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(reader.len(), 3);
    }

    #[test]
    fn existing_wav_passes_through() {
        let wav = ensure_wav(samples_to_pcm16(&[0.1; 8]), 22050).unwrap();
        let again = ensure_wav(wav.clone(), 44100).unwrap();
        assert_eq!(wav, again);
    }
}
