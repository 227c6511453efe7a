// src/engine/clicks.rs

use std::f32::consts::TAU;

/// Metronome click duration.
pub const CLICK_SECS: f32 = 0.05;
/// Exponential envelope target at the end of the click.
pub const CLICK_FLOOR: f32 = 0.001;

/// One scheduled metronome click: a short sine burst with an exponential
/// decay envelope, pinned to an absolute engine clock position.
#[derive(Debug, Clone, Copy)]
pub struct Click {
    pub start_frame: u64,
    pub freq_hz: f32,
    pub gain: f32,
}

impl Click {
    /// Sample value at the given engine clock frame, or `None` once the
    /// click has fully decayed (the caller drops it then). Frames before
    /// the start render as silence so early scheduling is harmless.
    #[inline]
    pub fn sample_at(&self, frame: u64, sample_rate: u32) -> Option<f32> {
        if frame < self.start_frame {
            return Some(0.0);
        }
        let t = (frame - self.start_frame) as f32 / sample_rate as f32;
        if t >= CLICK_SECS {
            return None;
        }
        if self.gain <= 0.0 {
            return Some(0.0);
        }
        let envelope = self.gain * (CLICK_FLOOR / self.gain).powf(t / CLICK_SECS);
        Some((TAU * self.freq_hz * t).sin() * envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_decays_and_expires() {
        let click = Click { start_frame: 100, freq_hz: 1000.0, gain: 0.5 };
        let rate = 44_100u32;

        assert_eq!(click.sample_at(0, rate), Some(0.0));

        // Peak amplitude over the first and last quarters of the click.
        let dur = (CLICK_SECS * rate as f32) as u64;
        let peak = |from: u64, to: u64| {
            (from..to)
                .filter_map(|f| click.sample_at(100 + f, rate))
                .fold(0.0f32, |m, s| m.max(s.abs()))
        };
        let head = peak(0, dur / 4);
        let tail = peak(3 * dur / 4, dur);
        assert!(head > 0.3, "head {head}");
        assert!(tail < head * 0.1, "tail {tail} vs head {head}");

        assert_eq!(click.sample_at(100 + dur + 1, rate), None);
    }

    #[test]
    fn zero_gain_click_is_silent_but_still_expires() {
        let click = Click { start_frame: 0, freq_hz: 800.0, gain: 0.0 };
        assert_eq!(click.sample_at(10, 44_100), Some(0.0));
        assert_eq!(click.sample_at(44_100, 44_100), None);
    }
}
