// src/recorder/input.rs

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Owns the CPAL input stream. The producer is moved into the input
/// callback; samples are converted to f32 and scaled by the live input gain
/// before they enter the ring buffer, so the recorded take already carries
/// the gain the user monitored with.
pub struct AudioInput {
    pub stream: Stream,
    pub channels: usize,
    pub sample_rate: u32,
}

impl AudioInput {
    pub fn new<P>(device_id: Option<&str>, gain_bits: Arc<AtomicU32>, producer: P) -> Result<Self>
    where
        P: Producer<Item = f32> + Send + 'static,
    {
        let host = cpal::default_host();
        let device = match device_id {
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| anyhow::anyhow!("input device '{wanted}' not found"))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow::anyhow!("no input device available"))?,
        };

        let supported_config = device.default_input_config()?;
        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;
        log::info!(
            "capture device '{}': {} channels at {} Hz",
            device.name().unwrap_or_else(|_| "?".into()),
            channels,
            sample_rate
        );

        let stream = match sample_format {
            SampleFormat::F32 => build_stream_f32(&device, &config, gain_bits, producer)?,
            SampleFormat::I16 => build_stream_i16(&device, &config, gain_bits, producer)?,
            SampleFormat::U16 => build_stream_u16(&device, &config, gain_bits, producer)?,
            other => anyhow::bail!("unsupported input sample format: {other:?}"),
        };

        Ok(Self { stream, channels, sample_rate })
    }
}

fn push_scaled<P>(producer: &mut P, samples: &[f32], gain: f32)
where
    P: Producer<Item = f32>,
{
    for &s in samples {
        // Ring buffer full means the collector stalled; drop rather than block.
        if producer.try_push(s * gain).is_err() {
            break;
        }
    }
}

/// f32 devices need no conversion, only the gain.
fn build_stream_f32<P>(
    device: &cpal::Device,
    config: &StreamConfig,
    gain_bits: Arc<AtomicU32>,
    mut producer: P,
) -> Result<Stream>
where
    P: Producer<Item = f32> + Send + 'static,
{
    let err_fn = |err| log::error!("input stream error: {err}");
    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _| {
            let gain = f32::from_bits(gain_bits.load(Ordering::Relaxed));
            push_scaled(&mut producer, data, gain);
        },
        err_fn,
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

fn build_stream_i16<P>(
    device: &cpal::Device,
    config: &StreamConfig,
    gain_bits: Arc<AtomicU32>,
    mut producer: P,
) -> Result<Stream>
where
    P: Producer<Item = f32> + Send + 'static,
{
    let err_fn = |err| log::error!("input stream error: {err}");
    let stream = device.build_input_stream(
        config,
        move |data: &[i16], _| {
            let gain = f32::from_bits(gain_bits.load(Ordering::Relaxed));
            let conv: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
            push_scaled(&mut producer, &conv, gain);
        },
        err_fn,
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

fn build_stream_u16<P>(
    device: &cpal::Device,
    config: &StreamConfig,
    gain_bits: Arc<AtomicU32>,
    mut producer: P,
) -> Result<Stream>
where
    P: Producer<Item = f32> + Send + 'static,
{
    let err_fn = |err| log::error!("input stream error: {err}");
    let stream = device.build_input_stream(
        config,
        move |data: &[u16], _| {
            let gain = f32::from_bits(gain_bits.load(Ordering::Relaxed));
            let conv: Vec<f32> = data
                .iter()
                .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                .collect();
            push_scaled(&mut producer, &conv, gain);
        },
        err_fn,
        None,
    )?;
    stream.play()?;
    Ok(stream)
}
