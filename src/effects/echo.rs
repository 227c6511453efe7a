// src/effects/echo.rs

/// Feedback delay line: `out(t) = in(t - D) + feedback * out(t - D)`.
/// A single tap with its own output fed back, so each repeat is the
/// previous repeat scaled by the feedback amount.
pub struct EchoLine {
    ring: Vec<f32>,
    write_pos: usize,
    feedback: f32,
}

pub const DEFAULT_DELAY_SECS: f32 = 0.3;
pub const DEFAULT_FEEDBACK: f32 = 0.3;

impl EchoLine {
    pub fn new(sample_rate: u32, delay_secs: f32, feedback: f32) -> Self {
        let len = ((delay_secs * sample_rate as f32) as usize).max(1);
        Self { ring: vec![0.0; len], write_pos: 0, feedback }
    }

    /// Process one sample. The delay line stores its own input (dry plus
    /// recirculated tap), so the tap at time t is `in(t-D) + fb * out(t-D)`.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        let delayed = self.ring[self.write_pos];
        self.ring[self.write_pos] = input + self.feedback * delayed;
        self.write_pos = (self.write_pos + 1) % self.ring.len();
        delayed
    }

    pub fn delay_samples(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_repeat_lands_one_delay_later() {
        let mut echo = EchoLine::new(1000, 0.1, 0.5);
        let d = echo.delay_samples();
        assert_eq!(d, 100);
        let mut out = Vec::new();
        for i in 0..350 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            out.push(echo.tick(input));
        }
        assert_eq!(out[0], 0.0);
        assert!((out[d] - 1.0).abs() < 1e-6);
        assert!((out[2 * d] - 0.5).abs() < 1e-6);
        assert!((out[3 * d] - 0.25).abs() < 1e-6);
    }
}
