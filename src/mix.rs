// src/mix.rs

use serde::{Deserialize, Serialize};

/// The five mixer knobs. A value object: always fully defined, copied (never
/// shared) when stored into a preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixSettings {
    /// Low-shelf gain at 200 Hz, dB.
    pub bass: f32,
    /// High-shelf gain at 2000 Hz, dB.
    pub treble: f32,
    /// Reverb send mix, 0..0.8.
    pub reverb: f32,
    /// Echo send mix, 0..0.8.
    pub echo: f32,
    /// Low-cut intensity, 0..1, mapped to a highpass cutoff of 0..500 Hz.
    pub denoise: f32,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self { bass: 0.0, treble: 0.0, reverb: 0.0, echo: 0.0, denoise: 0.0 }
    }
}

impl MixSettings {
    /// Clamp every knob into its declared range.
    pub fn clamped(self) -> Self {
        Self {
            bass: self.bass.clamp(-10.0, 10.0),
            treble: self.treble.clamp(-10.0, 10.0),
            reverb: self.reverb.clamp(0.0, 0.8),
            echo: self.echo.clamp(0.0, 0.8),
            denoise: self.denoise.clamp(0.0, 1.0),
        }
    }

    /// Highpass cutoff the denoise knob maps to.
    pub fn denoise_cutoff_hz(&self) -> f32 {
        self.denoise * 500.0
    }
}

/// A named snapshot of the mixer knobs. Built-in presets are constants; they
/// are never persisted and cannot be deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerPreset {
    pub id: String,
    pub name: String,
    pub settings: MixSettings,
    #[serde(rename = "isDefault", default)]
    pub is_default: bool,
}

/// The factory presets shipped with the studio.
pub fn default_presets() -> Vec<MixerPreset> {
    let preset = |id: &str, name: &str, bass, treble, reverb, echo, denoise| MixerPreset {
        id: id.to_string(),
        name: name.to_string(),
        settings: MixSettings { bass, treble, reverb, echo, denoise },
        is_default: true,
    };
    vec![
        preset("def_clean", "Clean Rap", 0.0, 2.0, 0.1, 0.0, 0.5),
        preset("def_trap", "Trap Echo", 2.0, 4.0, 0.2, 0.3, 0.2),
        preset("def_radio", "Radio Hit", 1.0, 5.0, 0.15, 0.05, 0.8),
        preset("def_dark", "Deep/Dark", 5.0, -2.0, 0.4, 0.1, 0.1),
    ]
}

/// Ordered preset list. Persistence itself is external; this type only
/// produces and consumes the exchange form, which contains user presets only.
pub struct PresetStore {
    presets: Vec<MixerPreset>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self { presets: default_presets() }
    }

    /// Rebuild the list from a persisted payload: factory presets first, then
    /// whatever user presets the payload carries. Stale copies of built-ins
    /// in the payload are dropped so they never go stale or duplicate.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let stored: Vec<MixerPreset> = serde_json::from_str(json)?;
        let mut presets = default_presets();
        presets.extend(stored.into_iter().filter(|p| !p.is_default));
        Ok(Self { presets })
    }

    /// Exchange form handed to the persistence layer: user presets only.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let user: Vec<&MixerPreset> = self.presets.iter().filter(|p| !p.is_default).collect();
        serde_json::to_string(&user)
    }

    pub fn presets(&self) -> &[MixerPreset] {
        &self.presets
    }

    /// Snapshot the given settings under a new user preset; returns its id.
    pub fn save(&mut self, name: &str, settings: MixSettings) -> String {
        let id = format!("custom-{}", uuid::Uuid::new_v4());
        self.presets.push(MixerPreset {
            id: id.clone(),
            name: name.trim().to_string(),
            settings,
            is_default: false,
        });
        id
    }

    /// Delete a user preset. Built-ins are refused.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.presets.len();
        self.presets.retain(|p| p.is_default || p.id != id);
        self.presets.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&MixerPreset> {
        self.presets.iter().find(|p| p.id == id)
    }
}

impl Default for PresetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_respects_knob_ranges() {
        let s = MixSettings { bass: 40.0, treble: -40.0, reverb: 2.0, echo: -1.0, denoise: 7.0 }
            .clamped();
        assert_eq!(s.bass, 10.0);
        assert_eq!(s.treble, -10.0);
        assert_eq!(s.reverb, 0.8);
        assert_eq!(s.echo, 0.0);
        assert_eq!(s.denoise, 1.0);
    }

    #[test]
    fn preset_round_trip_keeps_user_presets_only() {
        let mut store = PresetStore::new();
        let custom = MixSettings { bass: 3.0, treble: -1.5, reverb: 0.25, echo: 0.1, denoise: 0.6 };
        let id = store.save("My Booth", custom);

        let json = store.to_json().unwrap();
        // Built-ins never reach the persisted form.
        assert!(!json.contains("def_clean"));

        let reloaded = PresetStore::from_json(&json).unwrap();
        assert_eq!(reloaded.presets().len(), default_presets().len() + 1);
        let got = reloaded.get(&id).unwrap();
        assert_eq!(got.name, "My Booth");
        assert_eq!(got.settings, custom);
    }

    #[test]
    fn stale_builtins_in_storage_are_discarded() {
        // A payload that (incorrectly) contains a built-in must not duplicate it.
        let mut tampered = default_presets();
        tampered[0].settings.bass = 9.0;
        let json = serde_json::to_string(&tampered).unwrap();
        let store = PresetStore::from_json(&json).unwrap();
        assert_eq!(store.presets().len(), default_presets().len());
        assert_eq!(store.get("def_clean").unwrap().settings.bass, 0.0);
    }

    #[test]
    fn builtins_cannot_be_deleted() {
        let mut store = PresetStore::new();
        assert!(!store.delete("def_trap"));
        assert!(store.get("def_trap").is_some());
    }
}
