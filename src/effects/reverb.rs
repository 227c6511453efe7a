// src/effects/reverb.rs

use crate::buffer::AudioBuffer;
use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

pub const IR_DURATION_SECS: f32 = 2.0;
pub const IR_DECAY: f32 = 2.0;

/// Synthesize a stereo room impulse response: uniform noise shaped by a
/// polynomial decay envelope `(1 - i/len)^decay`. Channels get independent
/// noise so the tail decorrelates left from right.
pub fn impulse_response(sample_rate: u32, duration_secs: f32, decay: f32) -> AudioBuffer {
    let len = ((sample_rate as f32 * duration_secs) as usize).max(1);
    let mut rng = rand::rng();
    let mut buffer = AudioBuffer::new(2, len, sample_rate);
    for channel in &mut buffer.channels {
        for (i, sample) in channel.iter_mut().enumerate() {
            let envelope = (1.0 - i as f32 / len as f32).powf(decay);
            *sample = rng.random_range(-1.0f32..=1.0) * envelope;
        }
    }
    buffer
}

/// Uniformly partitioned FFT convolver for one channel.
///
/// The impulse response is split into `block_size` partitions held as
/// spectra; input spectra go into a frequency-domain delay line and the
/// output of each block is the overlap-added sum of partition products.
/// Feeding input in multiples of `block_size` yields output sample-aligned
/// with the input (no added latency); otherwise output lags until a full
/// block has accumulated.
pub struct Convolver {
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    partitions: Vec<Vec<Complex<f32>>>,
    fdl: VecDeque<Vec<Complex<f32>>>,
    input_fifo: Vec<f32>,
    overlap: Vec<f32>,
    output_fifo: VecDeque<f32>,
}

impl Convolver {
    pub fn new(impulse: &[f32], block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        let fft_size = block_size * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        let impulse = if impulse.is_empty() { &[0.0][..] } else { impulse };
        let mut partitions = Vec::with_capacity(impulse.len().div_ceil(block_size));
        for chunk in impulse.chunks(block_size) {
            let mut spectrum = vec![Complex::new(0.0f32, 0.0); fft_size];
            for (i, &s) in chunk.iter().enumerate() {
                spectrum[i].re = s;
            }
            fft.process(&mut spectrum);
            partitions.push(spectrum);
        }
        let fdl = (0..partitions.len())
            .map(|_| vec![Complex::new(0.0f32, 0.0); fft_size])
            .collect();

        Self {
            block_size,
            fft,
            ifft,
            partitions,
            fdl,
            input_fifo: Vec::with_capacity(block_size),
            overlap: vec![0.0; block_size],
            output_fifo: VecDeque::new(),
        }
    }

    /// Push `input` through the convolver and fill `output` with the same
    /// number of wet samples. Samples not yet computable (partial trailing
    /// block) come out as zeros now and surface on the next call.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        self.input_fifo.extend_from_slice(input);
        while self.input_fifo.len() >= self.block_size {
            let block: Vec<f32> = self.input_fifo.drain(..self.block_size).collect();
            self.process_block(&block);
        }
        for slot in output.iter_mut() {
            *slot = self.output_fifo.pop_front().unwrap_or(0.0);
        }
    }

    fn process_block(&mut self, block: &[f32]) {
        let fft_size = self.block_size * 2;

        let mut spectrum = vec![Complex::new(0.0f32, 0.0); fft_size];
        for (i, &s) in block.iter().enumerate() {
            spectrum[i].re = s;
        }
        self.fft.process(&mut spectrum);
        self.fdl.pop_back();
        self.fdl.push_front(spectrum);

        // Multiply-accumulate every partition against the matching input
        // spectrum, then one inverse transform for the whole sum.
        let mut acc = vec![Complex::new(0.0f32, 0.0); fft_size];
        for (input_spec, partition) in self.fdl.iter().zip(&self.partitions) {
            for ((a, &x), &h) in acc.iter_mut().zip(input_spec).zip(partition) {
                *a += x * h;
            }
        }
        self.ifft.process(&mut acc);

        let norm = 1.0 / fft_size as f32;
        for i in 0..self.block_size {
            self.output_fifo.push_back(acc[i].re * norm + self.overlap[i]);
            self.overlap[i] = acc[self.block_size + i].re * norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windowed_rms(samples: &[f32], windows: usize) -> Vec<f32> {
        let step = samples.len() / windows;
        (0..windows)
            .map(|w| {
                let chunk = &samples[w * step..(w + 1) * step];
                (chunk.iter().map(|s| s * s).sum::<f32>() / step as f32).sqrt()
            })
            .collect()
    }

    #[test]
    fn impulse_response_shape() {
        let ir = impulse_response(8000, 2.0, 2.0);
        assert_eq!(ir.channel_count(), 2);
        assert_eq!(ir.len(), 16_000);
        assert!(ir.peak() <= 1.0);
        // Left and right tails must not be the same noise.
        assert_ne!(ir.channels[0], ir.channels[1]);
    }

    #[test]
    fn impulse_response_energy_decays() {
        let ir = impulse_response(8000, 2.0, 2.0);
        let rms = windowed_rms(&ir.channels[0], 8);
        for pair in rms.windows(2) {
            assert!(pair[1] < pair[0], "tail energy must fall: {rms:?}");
        }
        assert!(rms[7] < rms[0] * 0.1);
    }

    #[test]
    fn convolving_an_impulse_reproduces_the_kernel() {
        // Kernel longer than one partition to exercise the delay line.
        let kernel = [0.5f32, -0.25, 0.0, 0.125, 0.0, 0.0625, 0.0, 0.0, 0.03125, 0.0];
        let mut conv = Convolver::new(&kernel, 4);
        let mut input = vec![0.0f32; 16];
        input[0] = 1.0;
        let mut output = vec![0.0f32; 16];
        conv.process(&input, &mut output);
        for (i, &k) in kernel.iter().enumerate() {
            assert!((output[i] - k).abs() < 1e-5, "tap {i}: {} vs {k}", output[i]);
        }
        for &extra in &output[kernel.len()..] {
            assert!(extra.abs() < 1e-5);
        }
    }

    #[test]
    fn block_multiple_input_has_no_latency() {
        let kernel = [1.0f32];
        let mut conv = Convolver::new(&kernel, 8);
        let input: Vec<f32> = (0..32).map(|i| (i as f32 * 0.7).sin()).collect();
        let mut output = vec![0.0f32; 32];
        conv.process(&input, &mut output);
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn partial_blocks_flush_on_the_next_call() {
        let mut conv = Convolver::new(&[1.0f32], 8);
        let mut first = vec![0.0f32; 5];
        conv.process(&[1.0, 2.0, 3.0, 4.0, 5.0], &mut first);
        assert!(first.iter().all(|&s| s == 0.0));
        let mut second = vec![0.0f32; 11];
        conv.process(&[6.0, 7.0, 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], &mut second);
        assert!((second[0] - 1.0).abs() < 1e-5);
        assert!((second[7] - 8.0).abs() < 1e-5);
    }
}
