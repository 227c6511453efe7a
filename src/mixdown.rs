// src/mixdown.rs

use crate::beat::Beat;
use crate::buffer::AudioBuffer;
use crate::decoder;
use crate::effects::{EffectsChain, RENDER_BLOCK_FRAMES};
use crate::error::{Result, StudioError};
use crate::looper::{self, LoopPolicy};
use crate::mix::MixSettings;

/// Offline renderer: runs the vocal through the same effects graph the live
/// preview uses and lays the beat underneath it. The result always matches
/// the vocal's length, channel count and sample rate; the beat is trimmed or
/// looped to fit.
#[derive(Debug, Clone)]
pub struct MixdownRenderer {
    pub settings: MixSettings,
    pub loop_policy: LoopPolicy,
    pub looping: bool,
    pub beat_volume: f32,
    pub vocal_volume: f32,
}

impl Default for MixdownRenderer {
    fn default() -> Self {
        Self {
            settings: MixSettings::default(),
            loop_policy: LoopPolicy::FullTrack,
            looping: true,
            beat_volume: 0.8,
            vocal_volume: 1.0,
        }
    }
}

impl MixdownRenderer {
    /// Render the master. The vocal level is applied as the dry-branch
    /// gain inside the chain so the reverb and echo sends see the unscaled
    /// signal, exactly like the monitoring path. A beat that fails to decode
    /// degrades to a vocal-only render with a warning rather than failing
    /// the whole mixdown.
    pub fn render(&self, vocal: &AudioBuffer, beat: Option<&Beat>) -> Result<AudioBuffer> {
        if vocal.sample_rate == 0 {
            return Err(StudioError::RenderFailure("vocal has no sample rate".into()));
        }
        let rate = vocal.sample_rate;
        let frames = vocal.len();
        let channels = vocal.channel_count();

        let mut chain = EffectsChain::new(rate, channels, self.settings);
        chain.set_dry_gain(self.vocal_volume);

        // Pad to a whole number of convolver partitions so the wet branches
        // stay sample-aligned, then truncate back.
        let padded = frames.div_ceil(RENDER_BLOCK_FRAMES).max(1) * RENDER_BLOCK_FRAMES;
        let mut out = AudioBuffer::new(channels, padded, rate);
        let mut block = vec![0.0f32; RENDER_BLOCK_FRAMES * channels];
        for block_idx in 0..padded / RENDER_BLOCK_FRAMES {
            let base = block_idx * RENDER_BLOCK_FRAMES;
            for i in 0..RENDER_BLOCK_FRAMES {
                let frame = base + i;
                for ch in 0..channels {
                    block[i * channels + ch] =
                        if frame < frames { vocal.sample(frame, ch) } else { 0.0 };
                }
            }
            chain.process_block(&mut block);
            for i in 0..RENDER_BLOCK_FRAMES {
                for ch in 0..channels {
                    out.channels[ch][base + i] = block[i * channels + ch];
                }
            }
        }
        for ch in out.channels.iter_mut() {
            ch.truncate(frames);
        }

        if let Some(beat) = beat {
            match self.load_beat(beat, rate) {
                Ok(beat_audio) => self.mix_beat(&mut out, &beat_audio, beat.bpm),
                Err(e) => {
                    log::warn!("mixdown continues without beat {}: {e}", beat.source.display());
                }
            }
        }

        Ok(out)
    }

    /// Render and serialize in one step.
    pub fn render_wav(&self, vocal: &AudioBuffer, beat: Option<&Beat>) -> Result<Vec<u8>> {
        let master = self.render(vocal, beat)?;
        crate::wav::encode(&master)
    }

    /// Run the render on the blocking pool so an async caller stays
    /// responsive during long exports.
    pub async fn render_async(
        self,
        vocal: AudioBuffer,
        beat: Option<Beat>,
    ) -> Result<AudioBuffer> {
        tokio::task::spawn_blocking(move || self.render(&vocal, beat.as_ref()))
            .await
            .map_err(|e| StudioError::RenderFailure(format!("render task failed: {e}")))?
    }

    fn load_beat(&self, beat: &Beat, rate: u32) -> Result<AudioBuffer> {
        let decoded = decoder::decode_file(&beat.source)?;
        decoder::resample(&decoded, rate)
    }

    /// Add the beat under the rendered vocal. With looping on, the read
    /// position wraps at the loop end; with looping off the beat plays once.
    fn mix_beat(&self, out: &mut AudioBuffer, beat_audio: &AudioBuffer, bpm: u32) {
        if beat_audio.is_empty() {
            return;
        }
        let rate = out.sample_rate as f64;
        let loop_end_frames = looper::offline_loop_end_secs(
            self.loop_policy,
            bpm,
            self.looping,
            beat_audio.duration_secs(),
        )
        .map(|secs| ((secs * rate) as usize).clamp(1, beat_audio.len()));

        let frames = out.len();
        for frame in 0..frames {
            let beat_pos = match loop_end_frames {
                Some(end) => frame % end,
                None => frame,
            };
            if beat_pos >= beat_audio.len() {
                continue;
            }
            for (ch, data) in out.channels.iter_mut().enumerate() {
                data[frame] += beat_audio.sample(beat_pos, ch) * self.beat_volume;
            }
        }
    }
}
