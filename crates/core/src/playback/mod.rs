//! Playback engine: control-side state machine plus the real-time renderer it
//! hands to an [`OutputDevice`].

mod events;
mod output;
mod renderer;

use std::sync::Arc;

use crate::{AudioBuffer, BitwaveError, Metadata, PlaybackConfig, Result};

use events::EventSender;
pub use events::PlaybackEvents;
pub use output::{CpalOutput, OutputDevice, StreamHandle, StreamSpec};
pub use renderer::Renderer;
use renderer::Transport;

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Notifications published by the engine. Positions are frame indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    PositionChanged(u64),
    PlaybackFinished,
}

/// Owns the playback cursor, volume and play/pause/stop state for one
/// loaded buffer.
///
/// Listeners subscribe through [`PlaybackEngine::events`]; the engine holds
/// no reference to any consumer.
pub struct PlaybackEngine<D: OutputDevice> {
    device: D,
    transport: Arc<Transport>,
    buffer: Option<Arc<AudioBuffer>>,
    metadata: Option<Metadata>,
    stream: Option<Box<dyn StreamHandle>>,
    events_tx: EventSender,
    events: PlaybackEvents,
}

impl<D: OutputDevice> PlaybackEngine<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, &PlaybackConfig::default())
    }

    pub fn with_config(device: D, config: &PlaybackConfig) -> Self {
        let (events_tx, events) = events::channel(config.event_capacity);
        Self {
            device,
            transport: Arc::new(Transport::new(clamp_volume(config.initial_volume))),
            buffer: None,
            metadata: None,
            stream: None,
            events_tx,
            events,
        }
    }

    /// Replaces the loaded buffer and rewinds to frame 0.
    ///
    /// Refused while streaming; call [`pause`](Self::pause) or
    /// [`stop`](Self::stop) first. A failed load leaves the engine untouched.
    pub fn load(&mut self, buffer: Arc<AudioBuffer>, metadata: Metadata) -> Result<()> {
        if self.state() == PlaybackState::Playing {
            return Err(BitwaveError::InvalidState(
                "pause or stop playback before loading",
            ));
        }
        if let Some(spatial) = &metadata.spatial {
            if spatial.len() != buffer.channels() as usize {
                return Err(BitwaveError::InvalidArgument(format!(
                    "spatial chunk has {} positions for {} channels",
                    spatial.len(),
                    buffer.channels()
                )));
            }
        }

        // A stream left behind by a finished playback still holds the old
        // buffer; release it before swapping.
        self.stream = None;
        self.transport.set_state(PlaybackState::Stopped);
        self.transport.set_position(0);

        tracing::info!(
            frames = buffer.frame_count(),
            channels = buffer.channels(),
            sample_rate = buffer.sample_rate(),
            bpm = ?metadata.bpm,
            "loaded buffer"
        );
        self.buffer = Some(buffer);
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Starts or resumes streaming from the current position.
    pub fn play(&mut self) -> Result<()> {
        let buffer = self
            .buffer
            .clone()
            .ok_or(BitwaveError::InvalidState("no buffer loaded"))?;

        if self.state() == PlaybackState::Playing && self.stream.is_some() {
            return Ok(());
        }

        self.stream = None;
        if self.events.reserve_finish_slot() {
            tracing::warn!("finish notifications unread, dropped the oldest");
        }
        let spec = StreamSpec {
            channels: u16::from(buffer.channels()),
            sample_rate: buffer.sample_rate(),
        };
        let renderer = Renderer::new(buffer, self.transport.clone(), self.events_tx.clone());
        let stream = self.device.open_stream(spec, renderer)?;

        self.transport.set_state(PlaybackState::Playing);
        self.stream = Some(stream);
        tracing::info!(position = self.position(), "playback started");
        Ok(())
    }

    /// Tears down the stream and keeps the position.
    pub fn pause(&mut self) {
        self.stream = None;
        if self
            .transport
            .transition(PlaybackState::Playing, PlaybackState::Paused)
        {
            tracing::info!(position = self.position(), "playback paused");
        }
    }

    /// Tears down the stream and rewinds to frame 0.
    pub fn stop(&mut self) {
        self.stream = None;
        self.transport.set_state(PlaybackState::Stopped);
        self.transport.set_position(0);
        tracing::info!("playback stopped");
        self.notify_position(0);
    }

    /// Moves the cursor to `target` clamped into `[0, frame_count]` and
    /// returns the applied frame. Allowed in every state.
    pub fn seek(&mut self, target: i64) -> usize {
        let frame_count = self.frame_count();
        let frame = target.clamp(0, i64::try_from(frame_count).unwrap_or(i64::MAX)) as usize;
        self.transport.set_position(frame);
        tracing::debug!(target, frame, "seek");
        self.notify_position(frame);
        frame
    }

    /// Sets the gain applied by the next rendered block, clamped into `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = clamp_volume(volume);
        self.transport.set_volume(volume);
        tracing::debug!(volume, "volume changed");
    }

    pub fn state(&self) -> PlaybackState {
        self.transport.state()
    }

    pub fn position(&self) -> usize {
        self.transport.position()
    }

    pub fn position_seconds(&self) -> f64 {
        self.buffer
            .as_ref()
            .map(|buffer| self.position() as f64 / buffer.sample_rate() as f64)
            .unwrap_or(0.0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer
            .as_ref()
            .map(|buffer| buffer.duration_seconds())
            .unwrap_or(0.0)
    }

    pub fn volume(&self) -> f32 {
        self.transport.volume()
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Receiver for position and end-of-stream notifications.
    pub fn events(&self) -> PlaybackEvents {
        self.events.clone()
    }

    fn frame_count(&self) -> usize {
        self.buffer.as_ref().map_or(0, |buffer| buffer.frame_count())
    }

    fn notify_position(&self, frame: usize) {
        if !self.events_tx.position(frame as u64) {
            tracing::warn!(frame, "position queue full, dropping update");
        }
    }
}

impl<D: OutputDevice> std::fmt::Debug for PlaybackEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state())
            .field("position", &self.position())
            .field("volume", &self.volume())
            .field("frames", &self.frame_count())
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
