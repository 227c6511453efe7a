// src/recorder/mod.rs

pub mod input;

use crate::beat::Beat;
use crate::buffer::AudioBuffer;
use crate::engine::AudioEngine;
use crate::error::{Result, StudioError};
use crate::recorder::input::AudioInput;
use crate::wav;
use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const RING_CAPACITY: usize = 192_000;

/// Instantaneous input meter reading, refreshed as the collector drains the
/// capture ring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputLevel {
    pub peak: f32,
    pub rms: f32,
}

fn chunk_level(samples: &[f32]) -> InputLevel {
    if samples.is_empty() {
        return InputLevel::default();
    }
    let mut peak = 0.0f32;
    let mut sum_sq = 0.0f32;
    for &s in samples {
        peak = peak.max(s.abs());
        sum_sq += s * s;
    }
    InputLevel { peak, rms: (sum_sq / samples.len() as f32).sqrt() }
}

/// A finished capture: the canonical WAV bytes plus the decoded float form
/// kept alongside so playback, waveform drawing and mixdown never re-decode.
#[derive(Debug, Clone)]
pub struct RecordingTake {
    pub wav: Vec<u8>,
    pub buffer: AudioBuffer,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_secs: f64,
}

impl RecordingTake {
    /// Build a take from raw interleaved capture samples. This is the only
    /// way takes come into existence, which also makes takes constructible
    /// in tests without touching capture hardware.
    pub fn from_samples(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        let channels = channels.max(1);
        let buffer = AudioBuffer::from_interleaved(interleaved, channels, sample_rate);
        let wav = wav::encode(&buffer)?;
        let duration_secs = buffer.duration_secs();
        Ok(Self { wav, buffer, sample_rate, channels, duration_secs })
    }

    /// Reconstruct a take from persisted WAV bytes, e.g. when reopening a
    /// saved recording for preview or re-mixing.
    pub fn from_wav_bytes(wav: Vec<u8>) -> Result<Self> {
        let buffer = crate::decoder::decode_bytes(wav.clone(), Some("wav"))?;
        let sample_rate = buffer.sample_rate;
        let channels = buffer.channel_count();
        let duration_secs = buffer.duration_secs();
        Ok(Self { wav, buffer, sample_rate, channels, duration_secs })
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Saved-recording metadata. The WAV payload is carried in memory but never
/// serialized with the metadata; persistence of the blob is the caller's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub name: String,
    pub beat_id: Option<String>,
    pub beat_title: Option<String>,
    /// Unix seconds.
    pub created_at: u64,
    pub duration_secs: f64,
    #[serde(skip)]
    pub wav: Vec<u8>,
}

impl Recording {
    pub fn from_take(take: &RecordingTake, beat: Option<&Beat>, name: String) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id: format!("rec-{}", Uuid::new_v4()),
            name,
            beat_id: beat.map(|b| b.id.clone()),
            beat_title: beat.map(|b| b.title.clone()),
            created_at,
            duration_secs: take.duration_secs,
            wav: take.wav.clone(),
        }
    }
}

/// An in-progress capture. Holds the input stream, a collector thread that
/// drains the ring buffer, and the engine's capture slot. One session at a
/// time; a second [`RecordingSession::start`] fails with
/// [`StudioError::CaptureInProgress`].
pub struct RecordingSession {
    engine: Arc<AudioEngine>,
    input: Option<AudioInput>,
    collector: Option<JoinHandle<Vec<f32>>>,
    stop_flag: Arc<AtomicBool>,
    gain_bits: Arc<AtomicU32>,
    samples_seen: Arc<AtomicU64>,
    level_peak_bits: Arc<AtomicU32>,
    level_rms_bits: Arc<AtomicU32>,
    sample_rate: u32,
    channels: usize,
    stopped: bool,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl RecordingSession {
    pub fn start(
        engine: Arc<AudioEngine>,
        device_id: Option<&str>,
        input_gain: f32,
    ) -> Result<Self> {
        engine.begin_capture()?;

        let gain_bits = Arc::new(AtomicU32::new(input_gain.clamp(0.0, 2.0).to_bits()));
        let ring = HeapRb::<f32>::new(RING_CAPACITY);
        let (producer, mut consumer) = ring.split();

        let input = match AudioInput::new(device_id, gain_bits.clone(), producer) {
            Ok(input) => input,
            Err(e) => {
                engine.end_capture();
                return Err(StudioError::PermissionDenied(format!("{e:#}")));
            }
        };
        let sample_rate = input.sample_rate;
        let channels = input.channels;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let samples_seen = Arc::new(AtomicU64::new(0));
        let level_peak_bits = Arc::new(AtomicU32::new(0.0f32.to_bits()));
        let level_rms_bits = Arc::new(AtomicU32::new(0.0f32.to_bits()));
        let stop_cb = stop_flag.clone();
        let seen_cb = samples_seen.clone();
        let peak_cb = level_peak_bits.clone();
        let rms_cb = level_rms_bits.clone();
        let collector = thread::Builder::new()
            .name("capture-collector".into())
            .spawn(move || {
                let mut samples: Vec<f32> = Vec::with_capacity(RING_CAPACITY);
                let mut chunk = [0.0f32; 4096];
                loop {
                    let n = consumer.pop_slice(&mut chunk);
                    if n > 0 {
                        samples.extend_from_slice(&chunk[..n]);
                        seen_cb.fetch_add(n as u64, Ordering::Relaxed);
                        let level = chunk_level(&chunk[..n]);
                        peak_cb.store(level.peak.to_bits(), Ordering::Relaxed);
                        rms_cb.store(level.rms.to_bits(), Ordering::Relaxed);
                    } else if stop_cb.load(Ordering::Relaxed) {
                        // Stream is gone and the ring is drained.
                        break;
                    } else {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                samples
            })
            .map_err(|e| StudioError::RenderFailure(format!("collector thread: {e}")))?;

        log::info!("recording started at {sample_rate} Hz / {channels} ch");
        Ok(Self {
            engine,
            input: Some(input),
            collector: Some(collector),
            stop_flag,
            gain_bits,
            samples_seen,
            level_peak_bits,
            level_rms_bits,
            sample_rate,
            channels,
            stopped: false,
        })
    }

    /// Latest input meter reading (the mic graph's analysis tap).
    pub fn input_level(&self) -> InputLevel {
        InputLevel {
            peak: f32::from_bits(self.level_peak_bits.load(Ordering::Relaxed)),
            rms: f32::from_bits(self.level_rms_bits.load(Ordering::Relaxed)),
        }
    }

    /// Adjust the capture gain while recording; applies from the next
    /// callback onward.
    pub fn set_input_gain(&self, gain: f32) {
        self.gain_bits
            .store(gain.clamp(0.0, 2.0).to_bits(), Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        let samples = self.samples_seen.load(Ordering::Relaxed) as f64;
        let frames = samples / self.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }

    /// Stop capturing and collect the take. Idempotent: a second call
    /// returns `Ok(None)`.
    pub fn stop(&mut self) -> Result<Option<RecordingTake>> {
        if self.stopped {
            return Ok(None);
        }
        self.stopped = true;

        // Dropping the stream stops the callbacks, then the collector drains
        // whatever is left in the ring.
        drop(self.input.take());
        self.stop_flag.store(true, Ordering::Relaxed);
        let samples = match self.collector.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => Vec::new(),
        };
        self.engine.end_capture();

        let take = RecordingTake::from_samples(&samples, self.channels, self.sample_rate)?;
        log::info!("recording stopped: {:.2} s captured", take.duration_secs);
        Ok(Some(take))
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_from_samples_carries_wav_and_duration() {
        let interleaved: Vec<f32> = (0..8000).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
        let take = RecordingTake::from_samples(&interleaved, 2, 8000).unwrap();
        assert_eq!(take.channels, 2);
        assert_eq!(take.buffer.len(), 4000);
        assert!((take.duration_secs - 0.5).abs() < 1e-9);
        assert_eq!(&take.wav[0..4], b"RIFF");
        assert_eq!(take.wav.len(), 44 + 8000 * 2);
    }

    #[test]
    fn take_round_trips_through_its_wav_bytes() {
        let interleaved: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.01).sin() * 0.6).collect();
        let take = RecordingTake::from_samples(&interleaved, 1, 16_000).unwrap();
        let reloaded = RecordingTake::from_wav_bytes(take.wav.clone()).unwrap();
        assert_eq!(reloaded.sample_rate, 16_000);
        assert_eq!(reloaded.channels, 1);
        assert_eq!(reloaded.buffer.len(), take.buffer.len());
    }

    #[test]
    fn level_tap_reports_peak_and_rms() {
        let level = chunk_level(&[0.0, 0.5, -1.0, 0.5]);
        assert_eq!(level.peak, 1.0);
        assert!((level.rms - (1.5f32 / 4.0).sqrt()).abs() < 1e-6);
        assert_eq!(chunk_level(&[]), InputLevel::default());
    }

    #[test]
    fn empty_capture_still_produces_a_take() {
        let take = RecordingTake::from_samples(&[], 1, 44_100).unwrap();
        assert!(take.is_empty());
        assert_eq!(take.duration_secs, 0.0);
    }

    #[test]
    fn recording_metadata_keeps_the_wav_out_of_json() {
        let take = RecordingTake::from_samples(&[0.1, 0.2, 0.3], 1, 44_100).unwrap();
        let rec = Recording::from_take(&take, None, "Take 1".into());
        assert!(rec.id.starts_with("rec-"));
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"name\":\"Take 1\""));
        assert!(json.contains("createdAt"));
        assert!(!json.contains("wav"));
    }

    #[test]
    fn session_lifecycle_releases_the_capture_slot() {
        let _slot = crate::engine::CAPTURE_TEST_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let engine = crate::engine::acquire();

        // Whatever the hardware situation, the capture slot must be free
        // again after the session ends or fails to start.
        match RecordingSession::start(engine.clone(), None, 1.0) {
            Ok(mut session) => {
                assert!(engine.capture_active());
                session.set_input_gain(1.5);
                let take = session.stop().unwrap().unwrap();
                assert!(take.duration_secs >= 0.0);
                assert!(session.stop().unwrap().is_none());
            }
            Err(e) => {
                assert!(matches!(e, StudioError::PermissionDenied(_)), "{e}");
            }
        }
        assert!(!engine.capture_active());

        // A device that does not exist is reported as a capture failure and
        // the slot comes back.
        let err = RecordingSession::start(engine.clone(), Some("no-such-device-xyz"), 1.0)
            .unwrap_err();
        assert!(matches!(err, StudioError::PermissionDenied(_)), "{err}");
        assert!(!engine.capture_active());
    }
}
