// src/wav.rs

use crate::buffer::AudioBuffer;
use crate::error::{Result, StudioError};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Quantize one float sample to 16-bit PCM.
///
/// Clamps to [-1, 1] first, then scales by 32767 for positive values and
/// 32768 for negative ones. The asymmetric scale is a compatibility
/// requirement: downstream players expect this exact byte pattern, so it is
/// preserved rather than "fixed".
#[inline]
pub fn quantize_i16(sample: f32) -> i16 {
    let s = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
    if s < 0.0 { (s * 32768.0) as i16 } else { (s * 32767.0) as i16 }
}

/// Serialize a planar float buffer to canonical uncompressed PCM WAV bytes:
/// RIFF/WAVE container, 16-byte `fmt ` chunk (format tag 1, 16 bits per
/// sample, block-align = channels * 2), `data` chunk of interleaved signed
/// little-endian samples. Total length is always `44 + frames * channels * 2`.
pub fn encode(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let channels = buffer.channel_count();
    if channels == 0 || channels > u16::MAX as usize {
        return Err(StudioError::EncodeFailure(format!("bad channel count {channels}")));
    }
    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.len() * channels * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| StudioError::EncodeFailure(e.to_string()))?;
        for frame in 0..buffer.len() {
            for ch in 0..channels {
                writer
                    .write_sample(quantize_i16(buffer.channels[ch][frame]))
                    .map_err(|e| StudioError::EncodeFailure(e.to_string()))?;
            }
        }
        writer.finalize().map_err(|e| StudioError::EncodeFailure(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}
