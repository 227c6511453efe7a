// src/config.rs

use crate::looper::LoopPolicy;
use crate::mix::MixSettings;
use serde::{Deserialize, Serialize};

/// The configuration surface the engine recognizes. Values outside their
/// declared ranges are pulled back in by [`StudioConfig::clamped`]; where the
/// config is stored lives outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    /// Capture hardware selector; `None` picks the platform default input.
    pub device_id: Option<String>,
    /// Pre-effects linear gain applied to the microphone signal, 0..2.
    pub input_gain: f32,
    /// Global output scalar, 0..1.5.
    pub master_volume: f32,
    /// Beat playback level, 0..1.2.
    pub beat_volume: f32,
    /// Vocal (recorded take) level, 0..1.5.
    pub vocal_volume: f32,
    /// Metronome click level, 0..1 (multiplied by the master volume).
    pub metronome_volume: f32,
    pub mix_settings: MixSettings,
    pub loop_policy: LoopPolicy,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            input_gain: 1.0,
            master_volume: 1.0,
            beat_volume: 0.8,
            vocal_volume: 1.0,
            metronome_volume: 0.5,
            mix_settings: MixSettings::default(),
            loop_policy: LoopPolicy::FullTrack,
        }
    }
}

impl StudioConfig {
    pub fn clamped(mut self) -> Self {
        self.input_gain = self.input_gain.clamp(0.0, 2.0);
        self.master_volume = self.master_volume.clamp(0.0, 1.5);
        self.beat_volume = self.beat_volume.clamp(0.0, 1.2);
        self.vocal_volume = self.vocal_volume.clamp(0.0, 1.5);
        self.metronome_volume = self.metronome_volume.clamp(0.0, 1.0);
        self.mix_settings = self.mix_settings.clamped();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_option_names() {
        let json = r#"{
            "deviceId": "usb-mic-7",
            "inputGain": 1.4,
            "masterVolume": 1.0,
            "beatVolume": 0.9,
            "vocalVolume": 1.2,
            "metronomeVolume": 0.3,
            "mixSettings": { "bass": 2.0, "treble": 1.0, "reverb": 0.2, "echo": 0.1, "denoise": 0.5 },
            "loopPolicy": 8
        }"#;
        let cfg: StudioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.device_id.as_deref(), Some("usb-mic-7"));
        assert_eq!(cfg.loop_policy, LoopPolicy::Bars(8));
        assert_eq!(cfg.mix_settings.denoise, 0.5);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = StudioConfig {
            input_gain: 5.0,
            master_volume: -1.0,
            beat_volume: 2.0,
            metronome_volume: 3.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(cfg.input_gain, 2.0);
        assert_eq!(cfg.master_volume, 0.0);
        assert_eq!(cfg.beat_volume, 1.2);
        assert_eq!(cfg.metronome_volume, 1.0);
    }
}
