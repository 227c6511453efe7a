// src/lib.rs

pub mod beat;
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod effects;
pub mod engine;
pub mod error;
pub mod looper;
pub mod metronome;
pub mod mix;
pub mod mixdown;
pub mod recorder;
pub mod wav;
pub mod waveform;

pub mod bpm;
pub use bpm::{BpmDetector, analyze_bpm_for_file};

pub use beat::Beat;
pub use buffer::AudioBuffer;
pub use config::StudioConfig;
pub use effects::EffectsChain;
pub use engine::AudioEngine;
pub use error::{Result, StudioError};
pub use looper::LoopPolicy;
pub use metronome::Metronome;
pub use mix::{MixSettings, MixerPreset, PresetStore};
pub use mixdown::MixdownRenderer;
pub use recorder::{InputLevel, Recording, RecordingSession, RecordingTake};
