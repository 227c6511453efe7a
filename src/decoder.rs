// src/decoder.rs

use crate::buffer::AudioBuffer;
use crate::error::{Result, StudioError};
use anyhow::{Context, anyhow};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Extensions the import gate accepts; matches the codec set the crate is
/// built with.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["wav", "mp3", "flac", "ogg", "oga", "aac", "m4a", "mp4"];

pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Decode a whole audio file into a planar buffer.
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    let run = || -> anyhow::Result<AudioBuffer> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        decode_source(Box::new(file), hint)
    };
    run().map_err(|e| StudioError::DecodeFailure(format!("{e:#}")))
}

/// Decode an in-memory payload (e.g. a finished capture blob).
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    decode_source(Box::new(Cursor::new(bytes)), hint)
        .map_err(|e| StudioError::DecodeFailure(format!("{e:#}")))
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> anyhow::Result<AudioBuffer> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;
    let track = format.default_track().ok_or_else(|| anyhow!("no default audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    let mut sample_rate = 0u32;
    let mut channels = 0usize;
    let mut interleaved = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // end of stream
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue, // skip corrupt packets
        };
        let spec = *decoded.spec();

        // Lock the output format on the first non-empty packet.
        if channels == 0 {
            if decoded.frames() == 0 {
                continue;
            }
            sample_rate = spec.rate;
            channels = spec.channels.count();
        }

        if sample_buf.as_ref().is_none_or(|b| b.capacity() < decoded.capacity()) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let buf = sample_buf.as_mut().expect("sample buffer prepared above");
        buf.copy_interleaved_ref(decoded);
        let samples = buf.samples();

        let packet_channels = spec.channels.count();
        if packet_channels == channels {
            interleaved.extend_from_slice(samples);
        } else if packet_channels == 1 {
            // Mono packet in a multichannel stream: duplicate.
            for &s in samples {
                for _ in 0..channels {
                    interleaved.push(s);
                }
            }
        } else if channels == 1 {
            // Multichannel packet in a mono stream: downmix.
            for frame in samples.chunks(packet_channels) {
                interleaved.push(frame.iter().sum::<f32>() / packet_channels as f32);
            }
        }
        // Other mismatches are dropped rather than guessed at.
    }

    if channels == 0 || interleaved.is_empty() {
        return Err(anyhow!("no decodable audio frames"));
    }
    log::debug!("decoded {} frames at {} Hz / {} ch", interleaved.len() / channels, sample_rate, channels);
    Ok(AudioBuffer::from_interleaved(&interleaved, channels, sample_rate))
}

/// Resample a whole buffer to a new rate with a windowed-sinc resampler.
/// Returns a clone when the rates already match.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate == target_rate || buffer.is_empty() {
        let mut out = buffer.clone();
        out.sample_rate = target_rate;
        return Ok(out);
    }
    resample_inner(buffer, target_rate)
        .map_err(|e| StudioError::DecodeFailure(format!("resample: {e:#}")))
}

fn resample_inner(buffer: &AudioBuffer, target_rate: u32) -> anyhow::Result<AudioBuffer> {
    let channels = buffer.channel_count();
    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    let chunk_size = 1024usize;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)?;

    let mut out: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let frames = buffer.len();
    let mut pos = 0usize;
    while pos < frames {
        let need = resampler.input_frames_next();
        if frames - pos < need {
            break;
        }
        let block: Vec<Vec<f32>> = buffer
            .channels
            .iter()
            .map(|c| c[pos..pos + need].to_vec())
            .collect();
        let processed = resampler.process(&block, None)?;
        for (ch, data) in processed.into_iter().enumerate() {
            out[ch].extend(data);
        }
        pos += need;
    }
    // Flush the tail through a partial process call.
    if pos < frames {
        let block: Vec<Vec<f32>> =
            buffer.channels.iter().map(|c| c[pos..].to_vec()).collect();
        let processed = resampler.process_partial(Some(&block), None)?;
        for (ch, data) in processed.into_iter().enumerate() {
            out[ch].extend(data);
        }
    }

    Ok(AudioBuffer { channels: out, sample_rate: target_rate })
}
