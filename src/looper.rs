// src/looper.rs

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Tempo assumed when a beat carries no usable tempo (0 = unknown).
pub const DEFAULT_BPM: u32 = 120;

const BEATS_PER_BAR: f64 = 4.0;

/// Loop region selection: either the beat's full natural length, or a fixed
/// number of bars (4, 8 or 16) derived from the beat's tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    FullTrack,
    Bars(u32),
}

impl LoopPolicy {
    /// Validated bar-count constructor; only 4, 8 and 16 are recognized.
    pub fn bars(count: u32) -> Option<Self> {
        matches!(count, 4 | 8 | 16).then_some(Self::Bars(count))
    }

    /// Loop length in seconds for a bar-count policy, assuming 4 beats per
    /// bar. `None` for full-track. Tempo 0 falls back to [`DEFAULT_BPM`].
    pub fn loop_duration_secs(&self, bpm: u32) -> Option<f64> {
        match self {
            Self::FullTrack => None,
            Self::Bars(bars) => {
                let bpm = if bpm == 0 { DEFAULT_BPM } else { bpm };
                Some(60.0 / bpm as f64 * BEATS_PER_BAR * *bars as f64)
            }
        }
    }
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self::FullTrack
    }
}

/// Per-frame loop seam check used by the live playback path. Returns true
/// when the position must be forced back to 0. Polling per rendered frame is
/// deliberate; the small seam click it allows is accepted behavior.
pub fn should_wrap(policy: LoopPolicy, bpm: u32, position_secs: f64) -> bool {
    match policy.loop_duration_secs(bpm) {
        Some(duration) => position_secs >= duration,
        None => false,
    }
}

/// Loop end for the offline render, where looping is declarative rather than
/// polled: a bar-count policy loops at its computed duration (clamped to the
/// source length), full-track loops over the natural length. `None` when
/// looping is off.
pub fn offline_loop_end_secs(
    policy: LoopPolicy,
    bpm: u32,
    looping: bool,
    natural_len_secs: f64,
) -> Option<f64> {
    if !looping {
        return None;
    }
    match policy.loop_duration_secs(bpm) {
        Some(duration) => Some(duration.min(natural_len_secs)),
        None => Some(natural_len_secs),
    }
}

// Exchange form: "full" | 4 | 8 | 16.

impl Serialize for LoopPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::FullTrack => serializer.serialize_str("full"),
            Self::Bars(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for LoopPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PolicyVisitor;

        impl<'de> Visitor<'de> for PolicyVisitor {
            type Value = LoopPolicy;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"full\" or a bar count of 4, 8 or 16")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LoopPolicy, E> {
                if v == "full" {
                    Ok(LoopPolicy::FullTrack)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LoopPolicy, E> {
                u32::try_from(v)
                    .ok()
                    .and_then(LoopPolicy::bars)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LoopPolicy, E> {
                if v >= 0 {
                    self.visit_u64(v as u64)
                } else {
                    Err(E::invalid_value(de::Unexpected::Signed(v), &self))
                }
            }
        }

        deserializer.deserialize_any(PolicyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_track_never_wraps() {
        for pos in [0.0, 10.0, 3600.0] {
            assert!(!should_wrap(LoopPolicy::FullTrack, 120, pos));
        }
    }

    #[test]
    fn four_bars_at_120_bpm_is_eight_seconds() {
        let policy = LoopPolicy::bars(4).unwrap();
        assert_eq!(policy.loop_duration_secs(120), Some(8.0));
        assert!(!should_wrap(policy, 120, 7.999));
        assert!(should_wrap(policy, 120, 8.0));
        assert!(should_wrap(policy, 120, 8.001));
    }

    #[test]
    fn unknown_tempo_falls_back_to_default() {
        let policy = LoopPolicy::bars(8).unwrap();
        assert_eq!(policy.loop_duration_secs(0), policy.loop_duration_secs(DEFAULT_BPM));
    }

    #[test]
    fn offline_loop_end() {
        let bars = LoopPolicy::bars(4).unwrap();
        // Bar policy: computed duration, clamped to the source length.
        assert_eq!(offline_loop_end_secs(bars, 120, true, 30.0), Some(8.0));
        assert_eq!(offline_loop_end_secs(bars, 120, true, 5.0), Some(5.0));
        // Full track loops over its natural length; no looping, no loop end.
        assert_eq!(offline_loop_end_secs(LoopPolicy::FullTrack, 120, true, 30.0), Some(30.0));
        assert_eq!(offline_loop_end_secs(bars, 120, false, 30.0), None);
    }

    #[test]
    fn exchange_form() {
        assert_eq!(serde_json::to_string(&LoopPolicy::FullTrack).unwrap(), "\"full\"");
        assert_eq!(serde_json::to_string(&LoopPolicy::Bars(8)).unwrap(), "8");
        assert_eq!(serde_json::from_str::<LoopPolicy>("\"full\"").unwrap(), LoopPolicy::FullTrack);
        assert_eq!(serde_json::from_str::<LoopPolicy>("16").unwrap(), LoopPolicy::Bars(16));
        assert!(serde_json::from_str::<LoopPolicy>("5").is_err());
        assert!(serde_json::from_str::<LoopPolicy>("\"half\"").is_err());
    }
}
