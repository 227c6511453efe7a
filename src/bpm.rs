// src/bpm.rs

use crate::buffer::AudioBuffer;
use std::collections::HashMap;
use std::path::Path;

/// Coarse peak-interval tempo estimator. This is deliberately not a spectral
/// beat tracker: it looks for loud transients (kicks) and takes the most
/// common spacing between them. Callers must treat 0 as "unknown, ask the
/// user" and must not retry automatically.
#[derive(Debug, Clone)]
pub struct BpmDetector {
    /// Absolute amplitude a sample must exceed to count as a peak.
    pub threshold: f32,
    /// Minimum spacing between accepted peaks, seconds. 0.3 s caps the
    /// search at 200 BPM.
    pub min_gap_secs: f32,
}

impl Default for BpmDetector {
    fn default() -> Self {
        Self { threshold: 0.8, min_gap_secs: 0.3 }
    }
}

/// Inter-peak intervals are grouped by rounding to the nearest multiple of
/// this many samples before voting.
const INTERVAL_BUCKET: f64 = 1000.0;

impl BpmDetector {
    /// Estimate tempo from a mono sample slice (callers pass the first
    /// channel of a decoded buffer). Returns 0 when inconclusive, otherwise
    /// an integer folded into 70..=180.
    pub fn detect(&self, samples: &[f32], sample_rate: u32) -> u32 {
        if samples.is_empty() || sample_rate == 0 {
            return 0;
        }
        let min_distance = (self.min_gap_secs * sample_rate as f32) as usize;

        let mut peaks: Vec<usize> = Vec::new();
        let mut last_peak = 0usize;
        for (i, &s) in samples.iter().enumerate() {
            if s.abs() > self.threshold && (peaks.is_empty() || i - last_peak > min_distance) {
                peaks.push(i);
                last_peak = i;
            }
        }
        if peaks.len() < 2 {
            return 0;
        }

        // Vote on bucketed inter-peak intervals.
        let mut counts: HashMap<u64, u32> = HashMap::new();
        for pair in peaks.windows(2) {
            let interval = (pair[1] - pair[0]) as f64;
            let key = ((interval / INTERVAL_BUCKET).round() * INTERVAL_BUCKET) as u64;
            *counts.entry(key).or_insert(0) += 1;
        }
        let mut best_interval = 0u64;
        let mut max_count = 0u32;
        for (&interval, &count) in &counts {
            if count > max_count || (count == max_count && interval < best_interval) {
                max_count = count;
                best_interval = interval;
            }
        }
        if best_interval == 0 {
            return 0;
        }

        let bpm = 60.0 / (best_interval as f64 / sample_rate as f64);
        let mut folded = bpm.round();
        while folded < 70.0 {
            folded *= 2.0;
        }
        while folded > 180.0 {
            folded /= 2.0;
        }
        folded.round() as u32
    }

    /// Convenience for decoded buffers: analyzes the first channel.
    pub fn detect_buffer(&self, buffer: &AudioBuffer) -> u32 {
        match buffer.channels.first() {
            Some(ch) => self.detect(ch, buffer.sample_rate),
            None => 0,
        }
    }
}

/// Decode a file and estimate its tempo. Decode or detection failure is
/// non-fatal: the tempo stays unknown (0) and a warning is logged.
pub fn analyze_bpm_for_file(path: &Path) -> u32 {
    match crate::decoder::decode_file(path) {
        Ok(buffer) => BpmDetector::default().detect_buffer(&buffer),
        Err(e) => {
            log::warn!("BPM detection skipped for {}: {e}", path.display());
            0
        }
    }
}
