// src/effects/mod.rs

pub mod echo;
pub mod reverb;

use crate::mix::MixSettings;
use biquad::*;
use echo::EchoLine;
use reverb::Convolver;

/// Convolver partition size. Offline rendering feeds the chain in multiples
/// of this so the wet path stays sample-aligned with the dry path.
pub const RENDER_BLOCK_FRAMES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
enum BandKind {
    HighPass,
    LowShelf,
    HighShelf,
}

/// One biquad section replicated per channel. Gain is in dB for the shelf
/// kinds and ignored for the high-pass.
struct FilterBand {
    kind: BandKind,
    freq: f32,
    gain_db: f32,
    active: bool,
    sample_rate: u32,
    filters: Vec<DirectForm2Transposed<f32>>,
}

impl FilterBand {
    fn new(sample_rate: u32, channels: usize, kind: BandKind, freq: f32, gain_db: f32) -> Self {
        let mut band = Self {
            kind,
            freq,
            gain_db,
            active: true,
            sample_rate,
            filters: Vec::new(),
        };
        let coeffs = band.coefficients();
        band.filters = (0..channels.max(1))
            .map(|_| DirectForm2Transposed::<f32>::new(coeffs))
            .collect();
        band
    }

    fn coefficients(&self) -> Coefficients<f32> {
        let safe_freq = self.freq.clamp(20.0, self.sample_rate as f32 / 2.0 - 1.0);
        let biquad_type = match self.kind {
            BandKind::HighPass => Type::HighPass,
            BandKind::LowShelf => Type::LowShelf(self.gain_db.into()),
            BandKind::HighShelf => Type::HighShelf(self.gain_db.into()),
        };
        match Coefficients::<f32>::from_params(
            biquad_type,
            self.sample_rate.hz(),
            safe_freq.hz(),
            Q_BUTTERWORTH_F32.into(),
        ) {
            Ok(c) => c,
            Err(e) => {
                // Clamped inputs make this unreachable in practice; fall back
                // to a transparent section rather than poisoning the chain.
                log::warn!("filter coefficients failed at {safe_freq} Hz: {e:?}");
                Coefficients {
                    a1: 0.0,
                    a2: 0.0,
                    b0: 1.0,
                    b1: 0.0,
                    b2: 0.0,
                }
            }
        }
    }

    fn retune(&mut self, freq: f32, gain_db: f32, active: bool) {
        self.freq = freq;
        self.gain_db = gain_db;
        self.active = active;
        let coeffs = self.coefficients();
        for filter in &mut self.filters {
            filter.update_coefficients(coeffs);
        }
    }

    #[inline]
    fn process(&mut self, sample: f32, channel: usize) -> f32 {
        if !self.active {
            return sample;
        }
        match self.filters.get_mut(channel) {
            Some(filter) => {
                let out = filter.run(sample);
                // Denormal protection
                if out.abs() < 1e-20 { 0.0 } else { out }
            }
            None => sample,
        }
    }
}

/// The vocal processing graph. Input runs through the cleanup filters, then
/// fans out into a dry branch, a convolution reverb branch and a feedback
/// echo branch, summed at the output:
///
/// ```text
/// in -> highpass -> lowshelf(200) -> highshelf(2000) -+-> *dry_gain ------+
///                                                     +-> reverb *r*1.5 --+-> out
///                                                     +-> echo *e --------+
/// ```
///
/// The high-pass cutoff is `denoise * 500` Hz and the section is bypassed
/// below 20 Hz so a zero denoise setting is bit-transparent.
pub struct EffectsChain {
    channels: usize,
    settings: MixSettings,
    dry_gain: f32,
    denoise_band: FilterBand,
    bass_band: FilterBand,
    treble_band: FilterBand,
    convolvers: Vec<Convolver>,
    echoes: Vec<EchoLine>,
    // per-channel scratch, reused across blocks
    filtered: Vec<Vec<f32>>,
    reverb_wet: Vec<Vec<f32>>,
}

pub const BASS_SHELF_HZ: f32 = 200.0;
pub const TREBLE_SHELF_HZ: f32 = 2000.0;
pub const REVERB_SEND_SCALE: f32 = 1.5;
const DENOISE_BYPASS_BELOW_HZ: f32 = 20.0;

impl EffectsChain {
    pub fn new(sample_rate: u32, channels: usize, settings: MixSettings) -> Self {
        let channels = channels.max(1);
        let settings = settings.clamped();

        let ir = reverb::impulse_response(sample_rate, reverb::IR_DURATION_SECS, reverb::IR_DECAY);
        let convolvers = (0..channels)
            .map(|ch| {
                let ir_channel = &ir.channels[ch.min(ir.channel_count() - 1)];
                Convolver::new(ir_channel, RENDER_BLOCK_FRAMES)
            })
            .collect();
        let echoes = (0..channels)
            .map(|_| EchoLine::new(sample_rate, echo::DEFAULT_DELAY_SECS, echo::DEFAULT_FEEDBACK))
            .collect();

        let cutoff = settings.denoise_cutoff_hz();
        let mut chain = Self {
            channels,
            settings,
            dry_gain: 1.0,
            denoise_band: FilterBand::new(sample_rate, channels, BandKind::HighPass, cutoff, 0.0),
            bass_band: FilterBand::new(
                sample_rate,
                channels,
                BandKind::LowShelf,
                BASS_SHELF_HZ,
                settings.bass,
            ),
            treble_band: FilterBand::new(
                sample_rate,
                channels,
                BandKind::HighShelf,
                TREBLE_SHELF_HZ,
                settings.treble,
            ),
            convolvers,
            echoes,
            filtered: vec![Vec::new(); channels],
            reverb_wet: vec![Vec::new(); channels],
        };
        chain.denoise_band.active = cutoff >= DENOISE_BYPASS_BELOW_HZ;
        chain
    }

    /// Retune the filters in place. Filter state is kept so live tweaks do
    /// not click; the reverb and echo structures never change shape.
    pub fn set_settings(&mut self, settings: MixSettings) {
        let settings = settings.clamped();
        let cutoff = settings.denoise_cutoff_hz();
        self.denoise_band
            .retune(cutoff, 0.0, cutoff >= DENOISE_BYPASS_BELOW_HZ);
        self.bass_band.retune(BASS_SHELF_HZ, settings.bass, true);
        self.treble_band.retune(TREBLE_SHELF_HZ, settings.treble, true);
        self.settings = settings;
    }

    pub fn settings(&self) -> MixSettings {
        self.settings
    }

    /// Gain on the dry branch. Live monitoring keeps this at 1.0; the
    /// offline renderer sets it to the vocal level so the wet sends are
    /// derived from the unscaled filtered signal, matching the monitor mix.
    pub fn set_dry_gain(&mut self, gain: f32) {
        self.dry_gain = gain.max(0.0);
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Process an interleaved block in place. `block.len()` must be a
    /// multiple of the channel count.
    pub fn process_block(&mut self, block: &mut [f32]) {
        let channels = self.channels;
        debug_assert_eq!(block.len() % channels, 0);
        let frames = block.len() / channels;
        if frames == 0 {
            return;
        }

        for ch in 0..channels {
            self.filtered[ch].clear();
            self.filtered[ch].reserve(frames);
            self.reverb_wet[ch].resize(frames, 0.0);
        }

        // Cleanup filters, deinterleaved into scratch.
        for frame in block.chunks(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                let mut s = self.denoise_band.process(sample, ch);
                s = self.bass_band.process(s, ch);
                s = self.treble_band.process(s, ch);
                self.filtered[ch].push(s);
            }
        }

        // Wet branches run on the filtered signal.
        for ch in 0..channels {
            self.convolvers[ch].process(&self.filtered[ch], &mut self.reverb_wet[ch]);
        }

        let reverb_gain = self.settings.reverb * REVERB_SEND_SCALE;
        let echo_gain = self.settings.echo;
        for frame_idx in 0..frames {
            for ch in 0..channels {
                let dry = self.filtered[ch][frame_idx];
                let echo_wet = self.echoes[ch].tick(dry);
                block[frame_idx * channels + ch] = dry * self.dry_gain
                    + self.reverb_wet[ch][frame_idx] * reverb_gain
                    + echo_wet * echo_gain;
            }
        }
    }
}
