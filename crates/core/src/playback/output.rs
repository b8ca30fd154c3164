use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{BitwaveError, Result};

use super::Renderer;

/// Stream parameters derived from the loaded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Owned handle to a running output stream. Dropping it tears the stream down.
pub trait StreamHandle {}

/// Audio backend the engine streams through.
pub trait OutputDevice {
    /// Opens a stream that pulls every block from `renderer`.
    ///
    /// Must fail with [`BitwaveError::ChannelMismatch`] when the device cannot
    /// be opened with `spec.channels`.
    fn open_stream(&mut self, spec: StreamSpec, renderer: Renderer)
        -> Result<Box<dyn StreamHandle>>;
}

/// Output device backed by `cpal`.
pub struct CpalOutput {
    device: cpal::Device,
}

impl CpalOutput {
    /// Uses the default output device of the default host.
    pub fn default_device() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BitwaveError::Device("no audio output device found".into()))?;
        if let Ok(name) = device.name() {
            tracing::info!(device = %name, "using output device");
        }
        Ok(Self::new(device))
    }

    pub fn new(device: cpal::Device) -> Self {
        Self { device }
    }

    fn select_config(&self, spec: StreamSpec) -> Result<cpal::StreamConfig> {
        let ranges: Vec<_> = self
            .device
            .supported_output_configs()
            .map_err(BitwaveError::device)?
            .filter(|range| range.channels() == spec.channels)
            .collect();

        if ranges.is_empty() {
            let device = self
                .device
                .default_output_config()
                .map(|config| config.channels())
                .unwrap_or(0);
            return Err(BitwaveError::ChannelMismatch {
                device,
                buffer: spec.channels,
            });
        }

        let rate = cpal::SampleRate(spec.sample_rate);
        let range = ranges
            .into_iter()
            .find(|range| {
                range.sample_format() == cpal::SampleFormat::F32
                    && range.min_sample_rate() <= rate
                    && rate <= range.max_sample_rate()
            })
            .ok_or_else(|| {
                BitwaveError::Device(format!(
                    "no f32 output at {} Hz with {} channels",
                    spec.sample_rate, spec.channels
                ))
            })?;

        Ok(range.with_sample_rate(rate).config())
    }
}

impl OutputDevice for CpalOutput {
    fn open_stream(
        &mut self,
        spec: StreamSpec,
        renderer: Renderer,
    ) -> Result<Box<dyn StreamHandle>> {
        let config = self.select_config(spec)?;
        tracing::debug!(?config, "opening output stream");

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(BitwaveError::device)?;
        stream.play().map_err(BitwaveError::device)?;

        Ok(Box::new(CpalStream { _stream: stream }))
    }
}

impl std::fmt::Debug for CpalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalOutput").finish()
    }
}

struct CpalStream {
    _stream: cpal::Stream,
}

impl StreamHandle for CpalStream {}
