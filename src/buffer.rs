// src/buffer.rs

/// Planar (per-channel) float PCM buffer, the unit of exchange between the
/// decoder, the effects chain, the mixdown renderer and the WAV encoder.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count.max(1)],
            sample_rate,
        }
    }

    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self { channels, sample_rate }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Sample at (frame, channel), upmixing mono by duplication and folding
    /// missing channels onto the last one.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let ch = channel.min(self.channels.len() - 1);
        self.channels[ch].get(frame).copied().unwrap_or(0.0)
    }

    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.len();
        let chs = self.channel_count();
        let mut out = Vec::with_capacity(frames * chs);
        for i in 0..frames {
            for ch in 0..chs {
                out.push(self.channels[ch][i]);
            }
        }
        out
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_round_trip() {
        let data = [0.1, -0.2, 0.3, -0.4, 0.5, -0.6];
        let buf = AudioBuffer::from_interleaved(&data, 2, 44_100);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.interleaved(), data);
    }

    #[test]
    fn mono_upmix_on_read() {
        let buf = AudioBuffer::from_interleaved(&[0.5, 0.7], 1, 48_000);
        assert_eq!(buf.sample(1, 0), 0.7);
        assert_eq!(buf.sample(1, 1), 0.7);
    }

    #[test]
    fn peak_and_duration() {
        let mut buf = AudioBuffer::new(2, 44_100, 44_100);
        buf.channels[1][10] = -0.9;
        assert!((buf.peak() - 0.9).abs() < 1e-6);
        assert!((buf.duration_secs() - 1.0).abs() < 1e-9);
    }
}
