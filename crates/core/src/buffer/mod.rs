use crate::{BitwaveError, Result};

/// Channel-interleaved sample store produced by the container codec.
///
/// The buffer is immutable once constructed. The playback engine and the
/// waveform summarizer share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u8,
}

impl AudioBuffer {
    /// Wraps interleaved samples. The sample count must be a whole number of
    /// frames.
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channels: u8) -> Result<Self> {
        if sample_rate == 0 {
            return Err(BitwaveError::InvalidBuffer(
                "sample rate must be non-zero".into(),
            ));
        }
        if channels == 0 {
            return Err(BitwaveError::InvalidBuffer(
                "at least one channel is required".into(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(BitwaveError::InvalidBuffer(format!(
                "{} samples do not form whole {channels}-channel frames",
                samples.len()
            )));
        }

        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Builds a buffer from one slice per frame, rejecting ragged input.
    pub fn from_frames<F: AsRef<[f32]>>(frames: &[F], sample_rate: u32) -> Result<Self> {
        let channels = frames
            .first()
            .map(|frame| frame.as_ref().len())
            .ok_or_else(|| BitwaveError::InvalidBuffer("buffer has no frames".into()))?;
        let channels = u8::try_from(channels).map_err(|_| {
            BitwaveError::InvalidBuffer(format!("{channels} channels exceed the format limit"))
        })?;

        let mut samples = Vec::with_capacity(frames.len() * channels as usize);
        for (index, frame) in frames.iter().enumerate() {
            let frame = frame.as_ref();
            if frame.len() != channels as usize {
                return Err(BitwaveError::InvalidBuffer(format!(
                    "frame {index} has {} channels, expected {channels}",
                    frame.len()
                )));
            }
            samples.extend_from_slice(frame);
        }

        Self::from_interleaved(samples, sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Total number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the samples of a single frame, if it exists.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let ch = self.channels as usize;
        self.samples.get(index * ch..(index + 1) * ch)
    }

    /// Iterates over one channel's samples in frame order.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels as usize)
            .copied()
    }

    /// Length in seconds derived from the frame count.
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}
