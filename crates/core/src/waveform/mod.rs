use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, BitwaveError, Result};

/// Min and max sample values for a range of frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

impl Peak {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

/// Reduces one channel to exactly `target_width` min/max pairs.
///
/// The channel is split into `target_width` segments of
/// `frame_count / target_width` frames, the last one absorbing the remainder.
/// Segments without frames, which occur when the buffer is shorter than the
/// width, report `(0, 0)`.
pub fn summarize(
    buffer: &AudioBuffer,
    channel_index: usize,
    target_width: usize,
) -> Result<Vec<Peak>> {
    if target_width == 0 {
        return Err(BitwaveError::InvalidArgument(
            "waveform width must be at least one".into(),
        ));
    }
    let channels = buffer.channels() as usize;
    if channel_index >= channels {
        return Err(BitwaveError::InvalidArgument(format!(
            "channel {channel_index} requested from a {channels}-channel buffer"
        )));
    }

    let frame_count = buffer.frame_count();
    let segment_size = frame_count / target_width;
    let samples = buffer.samples();

    let peaks = (0..target_width)
        .map(|segment| {
            let start = segment * segment_size;
            let end = if segment + 1 == target_width {
                frame_count
            } else {
                start + segment_size
            };
            let frames = &samples[start * channels..end * channels];
            segment_peak(frames.iter().skip(channel_index).step_by(channels).copied())
        })
        .collect();

    Ok(peaks)
}

fn segment_peak(samples: impl Iterator<Item = f32>) -> Peak {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    let mut seen = false;
    for s in samples {
        seen = true;
        if s < min {
            min = s;
        }
        if s > max {
            max = s;
        }
    }

    if seen {
        Peak { min, max }
    } else {
        Peak::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: Vec<f32>, channels: u8) -> AudioBuffer {
        AudioBuffer::from_interleaved(samples, 44_100, channels).unwrap()
    }

    #[test]
    fn constant_buffer_has_flat_envelope() {
        let buffer = buffer(vec![0.25; 1000], 1);
        let peaks = summarize(&buffer, 0, 10).unwrap();

        assert_eq!(peaks.len(), 10);
        assert!(peaks.iter().all(|peak| *peak == Peak::new(0.25, 0.25)));
    }

    #[test]
    fn is_deterministic() {
        let samples = (0..997).map(|i| ((i * 31) % 17) as f32 / 17.0 - 0.5).collect();
        let buffer = buffer(samples, 1);

        let first = summarize(&buffer, 0, 10).unwrap();
        for _ in 0..5 {
            assert_eq!(summarize(&buffer, 0, 10).unwrap(), first);
        }
    }

    #[test]
    fn last_segment_absorbs_remainder() {
        let samples = (0..11).map(|i| i as f32).collect();
        let peaks = summarize(&buffer(samples, 1), 0, 3).unwrap();

        assert_eq!(
            peaks,
            vec![Peak::new(0.0, 2.0), Peak::new(3.0, 5.0), Peak::new(6.0, 10.0)]
        );
    }

    #[test]
    fn reads_only_the_requested_channel() {
        let samples = vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0];
        let buffer = buffer(samples, 2);

        assert_eq!(
            summarize(&buffer, 0, 2).unwrap(),
            vec![Peak::new(1.0, 2.0), Peak::new(3.0, 4.0)]
        );
        assert_eq!(
            summarize(&buffer, 1, 2).unwrap(),
            vec![Peak::new(-2.0, -1.0), Peak::new(-4.0, -3.0)]
        );
    }

    #[test]
    fn short_buffers_fill_with_zero_pairs() {
        let peaks = summarize(&buffer(vec![0.5, -0.5], 1), 0, 4).unwrap();
        assert_eq!(
            peaks,
            vec![
                Peak::default(),
                Peak::default(),
                Peak::default(),
                Peak::new(-0.5, 0.5)
            ]
        );

        let empty = summarize(&buffer(Vec::new(), 2), 1, 3).unwrap();
        assert_eq!(empty, vec![Peak::default(); 3]);
    }

    #[test]
    fn rejects_bad_arguments() {
        let buffer = buffer(vec![0.0; 8], 2);
        assert!(matches!(
            summarize(&buffer, 0, 0),
            Err(BitwaveError::InvalidArgument(_))
        ));
        assert!(matches!(
            summarize(&buffer, 2, 4),
            Err(BitwaveError::InvalidArgument(_))
        ));
    }
}
