// src/waveform.rs

use crate::buffer::AudioBuffer;

/// Min/max amplitude pairs for drawing a static waveform of a finished take,
/// one pair per display column. Uses the first channel. Returns an empty vec
/// for an empty buffer (decode failures never reach this far: the buffer is
/// simply absent and the caller skips waveform rendering).
pub fn peaks(buffer: &AudioBuffer, columns: usize) -> Vec<(f32, f32)> {
    let Some(data) = buffer.channels.first() else {
        return Vec::new();
    };
    if data.is_empty() || columns == 0 {
        return Vec::new();
    }
    let step = data.len().div_ceil(columns);
    let mut out = Vec::with_capacity(columns);
    for col in 0..columns {
        let start = col * step;
        if start >= data.len() {
            out.push((0.0, 0.0));
            continue;
        }
        let end = (start + step).min(data.len());
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &s in &data[start..end] {
            if s < min {
                min = s;
            }
            if s > max {
                max = s;
            }
        }
        out.push((min, max));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_pair_per_column() {
        let mut buf = AudioBuffer::new(1, 1000, 44_100);
        buf.channels[0][10] = 0.8;
        buf.channels[0][990] = -0.6;
        let bins = peaks(&buf, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].1, 0.8);
        assert_eq!(bins[9].0, -0.6);
    }

    #[test]
    fn empty_input_yields_no_columns() {
        let buf = AudioBuffer::new(1, 0, 44_100);
        assert!(peaks(&buf, 100).is_empty());
    }
}
