// src/engine/playback.rs

use crate::buffer::AudioBuffer;
use crate::effects::EffectsChain;
use crate::looper::{self, LoopPolicy};
use crate::mix::MixSettings;

/// Beat playback state. The loop boundary is re-evaluated on every frame so
/// a bar-count or tempo change applies to the pass currently playing, not
/// the next one.
pub struct BeatVoice {
    buffer: AudioBuffer,
    position: usize,
    gain: f32,
    bpm: u32,
    policy: LoopPolicy,
    looping: bool,
}

impl BeatVoice {
    /// `buffer` must already be at the engine sample rate.
    pub fn new(buffer: AudioBuffer, gain: f32, bpm: u32, policy: LoopPolicy, looping: bool) -> Self {
        Self { buffer, position: 0, gain, bpm, policy, looping }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn set_loop(&mut self, policy: LoopPolicy, looping: bool) {
        self.policy = policy;
        self.looping = looping;
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = bpm;
    }

    pub fn position_secs(&self) -> f64 {
        self.position as f64 / self.buffer.sample_rate.max(1) as f64
    }

    /// Next stereo frame scaled by the voice gain, or `None` when playback
    /// has run off the end without looping.
    #[inline]
    pub fn next_frame(&mut self) -> Option<[f32; 2]> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.looping
            && looper::should_wrap(self.policy, self.bpm, self.position_secs())
        {
            self.position = 0;
        }
        if self.position >= self.buffer.len() {
            if self.looping {
                self.position = 0;
            } else {
                return None;
            }
        }
        let l = self.buffer.sample(self.position, 0) * self.gain;
        let r = self.buffer.sample(self.position, 1) * self.gain;
        self.position += 1;
        Some([l, r])
    }
}

/// A finished take played back through the live effects chain so the user
/// auditions exactly what a mixdown would sound like.
pub struct PreviewVoice {
    buffer: AudioBuffer,
    position: usize,
    chain: EffectsChain,
    gain: f32,
    scratch: Vec<f32>,
}

impl PreviewVoice {
    /// `buffer` must already be at the engine sample rate.
    pub fn new(buffer: AudioBuffer, settings: MixSettings, gain: f32) -> Self {
        let sample_rate = buffer.sample_rate;
        Self {
            buffer,
            position: 0,
            chain: EffectsChain::new(sample_rate, 2, settings),
            gain,
            scratch: Vec::new(),
        }
    }

    pub fn set_settings(&mut self, settings: MixSettings) {
        self.chain.set_settings(settings);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Mix the next chunk of the processed take into `out` (stereo
    /// interleaved). Returns `false` once the source is exhausted.
    pub fn render_into(&mut self, out: &mut [f32]) -> bool {
        if self.position >= self.buffer.len() {
            return false;
        }
        let frames = out.len() / 2;
        self.scratch.clear();
        for i in 0..frames {
            let frame = self.position + i;
            if frame < self.buffer.len() {
                self.scratch.push(self.buffer.sample(frame, 0));
                self.scratch.push(self.buffer.sample(frame, 1));
            } else {
                self.scratch.push(0.0);
                self.scratch.push(0.0);
            }
        }
        self.chain.process_block(&mut self.scratch);
        for (slot, &s) in out.iter_mut().zip(&self.scratch) {
            *slot += s * self.gain;
        }
        self.position += frames;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(frames: usize, rate: u32) -> AudioBuffer {
        let mut buf = AudioBuffer::new(1, frames, rate);
        for (i, s) in buf.channels[0].iter_mut().enumerate() {
            *s = (i + 1) as f32 / frames as f32;
        }
        buf
    }

    #[test]
    fn four_bar_loop_wraps_mid_track() {
        // 10 s of audio at 1 kHz, 120 BPM, 4 bars = 8 s loop.
        let buf = ramp_buffer(10_000, 1000);
        let mut voice = BeatVoice::new(buf, 1.0, 120, LoopPolicy::Bars(4), true);
        for _ in 0..8001 {
            voice.next_frame().unwrap();
        }
        assert!(voice.position_secs() < 0.002, "wrapped at the bar boundary");
    }

    #[test]
    fn loop_boundary_moves_with_a_live_bpm_change() {
        let buf = ramp_buffer(10_000, 1000);
        let mut voice = BeatVoice::new(buf, 1.0, 120, LoopPolicy::Bars(4), true);
        for _ in 0..4000 {
            voice.next_frame().unwrap();
        }
        // Doubling the tempo halves the loop; 4 s is now past the boundary.
        voice.set_bpm(240);
        voice.next_frame().unwrap();
        assert!(voice.position_secs() < 0.002);
    }

    #[test]
    fn non_looping_voice_ends_at_the_natural_end() {
        let buf = ramp_buffer(100, 1000);
        let mut voice = BeatVoice::new(buf, 0.5, 120, LoopPolicy::FullTrack, false);
        for _ in 0..100 {
            assert!(voice.next_frame().is_some());
        }
        assert!(voice.next_frame().is_none());
    }

    #[test]
    fn full_track_loop_restarts_at_the_end() {
        let buf = ramp_buffer(100, 1000);
        let mut voice = BeatVoice::new(buf, 1.0, 120, LoopPolicy::FullTrack, true);
        for _ in 0..100 {
            voice.next_frame().unwrap();
        }
        let frame = voice.next_frame().unwrap();
        assert!((frame[0] - 0.01).abs() < 1e-6, "restarted from the top");
    }

    #[test]
    fn preview_mixes_into_the_output_and_finishes() {
        let buf = ramp_buffer(1000, 8000);
        let mut voice = PreviewVoice::new(buf, MixSettings::default(), 1.0);
        let mut out = vec![0.0f32; 1200 * 2];
        assert!(voice.render_into(&mut out));
        assert!(out.iter().any(|&s| s != 0.0));
        let mut out2 = vec![0.0f32; 64];
        assert!(!voice.render_into(&mut out2));
    }
}
