// src/engine/mod.rs

pub mod clicks;
pub mod playback;

use crate::buffer::AudioBuffer;
use crate::error::{Result, StudioError};
use crate::looper::LoopPolicy;
use crate::mix::MixSettings;
use clicks::Click;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use playback::{BeatVoice, PreviewVoice};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Rate assumed when no output device exists and the engine runs on its
/// wall-clock fallback.
const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// State shared between the control API and the render thread. Everything
/// the callback reads per frame is atomic; voices and the click queue sit
/// behind mutexes the callback only try-locks.
struct EngineShared {
    clock_samples: AtomicU64,
    master_volume: AtomicU32, // f32 bits
    capture_active: AtomicBool,
    shutdown: AtomicBool,
    clicks: Mutex<Vec<Click>>,
    beat: Mutex<Option<BeatVoice>>,
    preview: Mutex<Option<PreviewVoice>>,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            clock_samples: AtomicU64::new(0),
            master_volume: AtomicU32::new(1.0f32.to_bits()),
            capture_active: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            clicks: Mutex::new(Vec::new()),
            beat: Mutex::new(None),
            preview: Mutex::new(None),
        }
    }
}

/// The output side of the studio: one process-wide instance owning the
/// playback stream, a monotonic sample clock, the metronome click queue and
/// the beat/preview voices. Created lazily on first [`acquire`]; when the
/// host has no output device the engine degrades to a silent wall-clock
/// driven clock so scheduling and capture still work.
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    sample_rate: u32,
    worker: Mutex<Option<JoinHandle<()>>>,
}

static INSTANCE: Mutex<Option<Arc<AudioEngine>>> = Mutex::new(None);

/// Serializes tests that contend for the process-wide capture slot.
#[cfg(test)]
pub(crate) static CAPTURE_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Get the process-wide engine, starting it on first use.
pub fn acquire() -> Arc<AudioEngine> {
    let mut slot = INSTANCE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(engine) = slot.as_ref() {
        return engine.clone();
    }
    let engine = Arc::new(AudioEngine::start());
    *slot = Some(engine.clone());
    engine
}

/// Tear down the process-wide engine. The next [`acquire`] starts fresh.
pub fn shutdown() {
    let taken = INSTANCE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    if let Some(engine) = taken {
        engine.stop();
    }
}

impl AudioEngine {
    fn start() -> Self {
        let shared = Arc::new(EngineShared::new());
        let (ready_tx, ready_rx) = mpsc::channel::<u32>();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("studio-output".into())
            .spawn(move || run_output(worker_shared, ready_tx))
            .ok();
        let sample_rate = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or(FALLBACK_SAMPLE_RATE);
        log::info!("audio engine running at {sample_rate} Hz");
        Self {
            shared,
            sample_rate,
            worker: Mutex::new(worker),
        }
    }

    fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames rendered since the engine started.
    pub fn clock_samples(&self) -> u64 {
        self.shared.clock_samples.load(Ordering::Relaxed)
    }

    pub fn clock_secs(&self) -> f64 {
        self.clock_samples() as f64 / self.sample_rate as f64
    }

    pub fn set_master_volume(&self, volume: f32) {
        let v = volume.clamp(0.0, 1.5);
        self.shared.master_volume.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.shared.master_volume.load(Ordering::Relaxed))
    }

    // --- metronome clicks ---

    /// Queue a click at an absolute clock time. Used by the metronome
    /// scheduler; a click scheduled slightly in the past starts mid-decay
    /// instead of being dropped.
    pub fn schedule_click(&self, start_secs: f64, freq_hz: f32, gain: f32) {
        let start_frame = (start_secs * self.sample_rate as f64) as u64;
        let mut clicks = self.shared.clicks.lock().unwrap_or_else(|e| e.into_inner());
        clicks.push(Click { start_frame, freq_hz, gain });
    }

    pub fn clear_clicks(&self) {
        self.shared
            .clicks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn pending_clicks(&self) -> usize {
        self.shared
            .clicks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    // --- beat playback ---

    /// Replace the beat voice. `buffer` must already be at the engine rate.
    pub fn play_beat(
        &self,
        buffer: AudioBuffer,
        gain: f32,
        bpm: u32,
        policy: LoopPolicy,
        looping: bool,
    ) {
        let voice = BeatVoice::new(buffer, gain, bpm, policy, looping);
        *self.shared.beat.lock().unwrap_or_else(|e| e.into_inner()) = Some(voice);
    }

    pub fn stop_beat(&self) {
        *self.shared.beat.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn beat_playing(&self) -> bool {
        self.shared
            .beat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Apply to the active beat voice, if any. Volume, tempo and loop
    /// changes land here.
    pub fn update_beat<F: FnOnce(&mut BeatVoice)>(&self, f: F) {
        if let Some(voice) = self
            .shared
            .beat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            f(voice);
        }
    }

    // --- take preview ---

    pub fn preview_take(&self, buffer: AudioBuffer, settings: MixSettings, gain: f32) {
        let voice = PreviewVoice::new(buffer, settings, gain);
        *self.shared.preview.lock().unwrap_or_else(|e| e.into_inner()) = Some(voice);
    }

    pub fn stop_preview(&self) {
        *self.shared.preview.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn update_preview<F: FnOnce(&mut PreviewVoice)>(&self, f: F) {
        if let Some(voice) = self
            .shared
            .preview
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            f(voice);
        }
    }

    // --- capture exclusivity ---

    /// Claim the single capture slot. A second concurrent recording attempt
    /// fails instead of silently stealing the device.
    pub fn begin_capture(&self) -> Result<()> {
        if self
            .shared
            .capture_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StudioError::CaptureInProgress);
        }
        Ok(())
    }

    pub fn end_capture(&self) {
        self.shared.capture_active.store(false, Ordering::Release);
    }

    pub fn capture_active(&self) -> bool {
        self.shared.capture_active.load(Ordering::Acquire)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// --- render thread ---

fn run_output(shared: Arc<EngineShared>, ready: mpsc::Sender<u32>) {
    match build_output_stream(&shared) {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(sample_rate);
            while !shared.shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(25));
            }
            drop(stream);
        }
        Err(e) => {
            log::warn!("no audio output available, running headless: {e:#}");
            let _ = ready.send(FALLBACK_SAMPLE_RATE);
            run_headless_clock(&shared);
        }
    }
}

fn build_output_stream(shared: &Arc<EngineShared>) -> anyhow::Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device available"))?;
    let supported = device.default_output_config()?;
    let config: cpal::StreamConfig = supported.config();
    let device_channels = (config.channels as usize).max(1);
    let sample_rate = config.sample_rate.0;
    log::info!("output device: {} channels at {} Hz", device_channels, sample_rate);

    let shared_cb = shared.clone();
    let mut scratch: Vec<f32> = Vec::with_capacity(1024);
    let err_fn = |err| log::error!("output stream error: {err}");

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / device_channels;
            if scratch.len() != frames * 2 {
                scratch.resize(frames * 2, 0.0);
            }
            render_frames(&shared_cb, &mut scratch, sample_rate);

            // Map the stereo scratch onto however many channels the device
            // actually has; extra channels stay silent.
            let mut scratch_idx = 0;
            for frame in data.chunks_mut(device_channels) {
                frame[0] = scratch[scratch_idx];
                if frame.len() >= 2 {
                    frame[1] = scratch[scratch_idx + 1];
                }
                for sample in frame.iter_mut().skip(2) {
                    *sample = 0.0;
                }
                scratch_idx += 2;
            }
        },
        err_fn,
        None,
    )?;
    stream.play()?;
    Ok((stream, sample_rate))
}

/// Fill a stereo interleaved buffer from the click queue and the active
/// voices, advancing the sample clock.
fn render_frames(shared: &EngineShared, out: &mut [f32], sample_rate: u32) {
    out.fill(0.0);
    let frames = out.len() / 2;
    if frames == 0 {
        return;
    }
    let start = shared.clock_samples.load(Ordering::Relaxed);
    let master = f32::from_bits(shared.master_volume.load(Ordering::Relaxed));

    // Clicks. try_lock so a control-thread push never stalls the callback.
    if let Ok(mut clicks) = shared.clicks.try_lock() {
        if !clicks.is_empty() {
            for i in 0..frames {
                let frame_clock = start + i as u64;
                let mut sum = 0.0f32;
                clicks.retain(|c| match c.sample_at(frame_clock, sample_rate) {
                    Some(s) => {
                        sum += s;
                        true
                    }
                    None => false,
                });
                out[i * 2] += sum;
                out[i * 2 + 1] += sum;
            }
        }
    }

    // Beat voice.
    if let Ok(mut beat) = shared.beat.try_lock() {
        let mut done = false;
        if let Some(voice) = beat.as_mut() {
            for i in 0..frames {
                match voice.next_frame() {
                    Some([l, r]) => {
                        out[i * 2] += l;
                        out[i * 2 + 1] += r;
                    }
                    None => {
                        done = true;
                        break;
                    }
                }
            }
        }
        if done {
            *beat = None;
        }
    }

    // Take preview.
    if let Ok(mut preview) = shared.preview.try_lock() {
        let mut done = false;
        if let Some(voice) = preview.as_mut() {
            done = !voice.render_into(out);
        }
        if done {
            *preview = None;
        }
    }

    for s in out.iter_mut() {
        *s *= master;
    }
    shared.clock_samples.fetch_add(frames as u64, Ordering::Relaxed);
}

/// Keeps the sample clock moving from wall time when there is no device to
/// pull frames. Voices are not consumed in this mode; scheduling, capture
/// and position reporting keep working.
fn run_headless_clock(shared: &EngineShared) {
    let started = Instant::now();
    while !shared.shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
        let target = (started.elapsed().as_secs_f64() * FALLBACK_SAMPLE_RATE as f64) as u64;
        let current = shared.clock_samples.load(Ordering::Relaxed);
        if target > current {
            shared
                .clock_samples
                .fetch_add(target - current, Ordering::Relaxed);
        }
        // Expire clicks the silent path will never play.
        if let Ok(mut clicks) = shared.clicks.try_lock() {
            clicks.retain(|c| c.sample_at(target, FALLBACK_SAMPLE_RATE).is_some());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_mixes_clicks_and_advances_the_clock() {
        let shared = EngineShared::new();
        shared.clicks.lock().unwrap().push(Click {
            start_frame: 0,
            freq_hz: 1000.0,
            gain: 0.5,
        });
        let mut out = vec![0.0f32; 256 * 2];
        render_frames(&shared, &mut out, 44_100);
        assert!(out.iter().any(|&s| s != 0.0));
        assert_eq!(shared.clock_samples.load(Ordering::Relaxed), 256);
        // Left and right carry the same click.
        assert_eq!(out[10], out[11]);
    }

    #[test]
    fn expired_clicks_are_dropped_from_the_queue() {
        let shared = EngineShared::new();
        shared.clicks.lock().unwrap().push(Click {
            start_frame: 0,
            freq_hz: 800.0,
            gain: 0.4,
        });
        // A 50 ms click at 44.1 kHz is 2205 frames; render past it.
        let mut out = vec![0.0f32; 4096 * 2];
        render_frames(&shared, &mut out, 44_100);
        assert!(shared.clicks.lock().unwrap().is_empty());
    }

    #[test]
    fn master_volume_scales_the_mix() {
        let shared = EngineShared::new();
        shared.master_volume.store(0.0f32.to_bits(), Ordering::Relaxed);
        shared.clicks.lock().unwrap().push(Click {
            start_frame: 0,
            freq_hz: 1000.0,
            gain: 0.5,
        });
        let mut out = vec![0.0f32; 128 * 2];
        render_frames(&shared, &mut out, 44_100);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn finished_beat_voice_is_cleared() {
        let shared = EngineShared::new();
        let buf = AudioBuffer::new(1, 64, 44_100);
        *shared.beat.lock().unwrap() =
            Some(BeatVoice::new(buf, 1.0, 120, LoopPolicy::FullTrack, false));
        let mut out = vec![0.0f32; 128 * 2];
        render_frames(&shared, &mut out, 44_100);
        assert!(shared.beat.lock().unwrap().is_none());
    }

    #[test]
    fn singleton_lifecycle_and_capture_exclusivity() {
        let _slot = CAPTURE_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let engine = acquire();
        let again = acquire();
        assert!(Arc::ptr_eq(&engine, &again));
        assert!(engine.sample_rate() > 0);

        engine.begin_capture().unwrap();
        assert!(matches!(
            engine.begin_capture(),
            Err(StudioError::CaptureInProgress)
        ));
        engine.end_capture();
        engine.begin_capture().unwrap();
        engine.end_capture();

        // The clock moves even without hardware.
        let before = engine.clock_samples();
        thread::sleep(Duration::from_millis(80));
        assert!(engine.clock_samples() > before);

        drop(engine);
        drop(again);
        shutdown();
    }
}
