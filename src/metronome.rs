// src/metronome.rs

use crate::engine::AudioEngine;
use crate::looper::DEFAULT_BPM;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Scheduler wake-up period.
const TICK_INTERVAL: Duration = Duration::from_millis(25);
/// How far ahead of the engine clock clicks are committed. Short enough
/// that tempo changes take effect almost immediately, long enough that a
/// late wake-up never leaves a gap.
const LOOKAHEAD_SECS: f64 = 0.1;
/// Downbeat (every fourth count) and regular click pitches.
const ACCENT_HZ: f32 = 1000.0;
const TICK_HZ: f32 = 800.0;
const COUNTS_PER_ACCENT: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlannedClick {
    at_secs: f64,
    freq_hz: f32,
}

/// Commit every click that falls inside the look-ahead window. Returns the
/// updated beat cursor. Pure so the scheduling math is testable without a
/// running engine.
fn plan_window(
    now_secs: f64,
    mut next_click_secs: f64,
    mut count: u64,
    bpm: u32,
    out: &mut Vec<PlannedClick>,
) -> (f64, u64) {
    let bpm = if bpm == 0 { DEFAULT_BPM } else { bpm };
    let beat_secs = 60.0 / bpm as f64;
    while next_click_secs < now_secs + LOOKAHEAD_SECS {
        let freq_hz = if count % COUNTS_PER_ACCENT == 0 { ACCENT_HZ } else { TICK_HZ };
        out.push(PlannedClick { at_secs: next_click_secs, freq_hz });
        next_click_secs += beat_secs;
        count += 1;
    }
    (next_click_secs, count)
}

struct MetronomeState {
    running: AtomicBool,
    bpm: AtomicU32,
    volume: AtomicU32, // f32 bits
}

/// Look-ahead click scheduler driven by the engine sample clock. A worker
/// thread wakes every 25 ms and commits clicks up to 100 ms out; tempo and
/// volume changes are picked up on the next wake-up without restarting.
pub struct Metronome {
    engine: Arc<AudioEngine>,
    state: Arc<MetronomeState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Metronome {
    pub fn new(engine: Arc<AudioEngine>, bpm: u32, volume: f32) -> Self {
        Self {
            engine,
            state: Arc::new(MetronomeState {
                running: AtomicBool::new(false),
                bpm: AtomicU32::new(bpm),
                volume: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn set_bpm(&self, bpm: u32) {
        self.state.bpm.store(bpm, Ordering::Relaxed);
    }

    pub fn set_volume(&self, volume: f32) {
        self.state
            .volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Relaxed)
    }

    /// Turn the metronome on or off. Idempotent: asking for the state it is
    /// already in does nothing, so UI toggles can call this freely.
    pub fn set_should_run(&self, should_run: bool) {
        if should_run == self.is_running() {
            return;
        }
        if should_run {
            self.start_worker();
        } else {
            self.stop_worker();
        }
    }

    fn start_worker(&self) {
        // A previous worker that was asked to stop but not yet joined gets
        // collected here before the replacement starts.
        self.stop_worker();
        self.state.running.store(true, Ordering::Relaxed);

        let engine = self.engine.clone();
        let state = self.state.clone();
        let handle = thread::Builder::new()
            .name("metronome".into())
            .spawn(move || {
                let mut next_click_secs = engine.clock_secs();
                let mut count = 0u64;
                let mut planned = Vec::new();
                while state.running.load(Ordering::Relaxed) {
                    let bpm = state.bpm.load(Ordering::Relaxed);
                    let volume = f32::from_bits(state.volume.load(Ordering::Relaxed));
                    planned.clear();
                    (next_click_secs, count) =
                        plan_window(engine.clock_secs(), next_click_secs, count, bpm, &mut planned);
                    for click in &planned {
                        engine.schedule_click(click.at_secs, click.freq_hz, volume);
                    }
                    thread::sleep(TICK_INTERVAL);
                }
            })
            .ok();
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = handle;
    }

    fn stop_worker(&self) {
        self.state.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
