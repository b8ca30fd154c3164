//! Core library for Bitwave audio files.
//!
//! Each module owns one piece of the pipeline: the container codec turns
//! bytes into an [`AudioBuffer`] plus [`Metadata`], the playback engine
//! streams a loaded buffer to an output device, and the waveform module
//! reduces a buffer to a min/max envelope for display.

pub mod buffer;
pub mod config;
pub mod container;
pub mod error;
pub mod playback;
pub mod waveform;

pub use buffer::AudioBuffer;
pub use config::{AppConfig, PlaybackConfig, WaveformConfig};
pub use container::{decode, encode, Decoded, Flags, Header, Metadata, SpatialPosition};
pub use error::{BitwaveError, Result};
pub use playback::{
    CpalOutput, OutputDevice, PlaybackEngine, PlaybackEvent, PlaybackEvents, PlaybackState,
    Renderer, StreamHandle, StreamSpec,
};
pub use waveform::{summarize, Peak};
