use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::AudioBuffer;

use super::events::EventSender;
use super::PlaybackState;

/// Playback values shared between the control thread and the audio callback.
///
/// Every field is a plain atomic so the callback never waits on the control
/// thread.
#[derive(Debug)]
pub(crate) struct Transport {
    position: AtomicUsize,
    /// `f32` bit pattern.
    volume: AtomicU32,
    state: AtomicU8,
}

impl Transport {
    pub(crate) fn new(volume: f32) -> Self {
        Self {
            position: AtomicUsize::new(0),
            volume: AtomicU32::new(volume.to_bits()),
            state: AtomicU8::new(PlaybackState::Stopped as u8),
        }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_position(&self, frame: usize) {
        self.position.store(frame, Ordering::Release);
    }

    /// Moves the cursor from `from` to `to` unless a seek landed in between.
    #[inline]
    pub(crate) fn advance(&self, from: usize, to: usize) -> bool {
        self.position
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn state(&self) -> PlaybackState {
        PlaybackState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Atomically swaps `from` for `to`; false if the state had moved on.
    #[inline]
    pub(crate) fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Rewinds a cursor parked at `end` and stops playback.
    ///
    /// False when a seek moved the cursor first, or a control call already
    /// left the playing state.
    #[inline]
    pub(crate) fn finish(&self, end: usize) -> bool {
        self.advance(end, 0) && self.transition(PlaybackState::Playing, PlaybackState::Stopped)
    }
}

/// Real-time half of the playback engine, handed to the output device.
///
/// [`Renderer::render`] only reads the shared buffer, does bounded copies and
/// sends on a pre-allocated bounded channel. It never allocates, locks or
/// blocks.
pub struct Renderer {
    buffer: Arc<AudioBuffer>,
    transport: Arc<Transport>,
    events: EventSender,
}

impl Renderer {
    pub(crate) fn new(
        buffer: Arc<AudioBuffer>,
        transport: Arc<Transport>,
        events: EventSender,
    ) -> Self {
        Self {
            buffer,
            transport,
            events,
        }
    }

    /// Fills an interleaved output block and advances the playback cursor.
    pub fn render(&self, output: &mut [f32]) {
        if self.transport.state() != PlaybackState::Playing {
            output.fill(0.0);
            return;
        }

        let channels = self.buffer.channels() as usize;
        let frame_count = self.buffer.frame_count();
        let position = self.transport.position().min(frame_count);
        let requested = output.len() / channels;
        let available = requested.min(frame_count - position);
        let volume = self.transport.volume();

        let start = position * channels;
        let source = &self.buffer.samples()[start..start + available * channels];
        let (head, tail) = output.split_at_mut(available * channels);
        for (out, sample) in head.iter_mut().zip(source) {
            *out = sample * volume;
        }
        tail.fill(0.0);

        let next = position + available;
        if !self.transport.advance(position, next) {
            // A seek won the race; the next block starts from it.
            return;
        }
        // Position updates are lossy while the queue is full; the finish lane
        // is separate.
        self.events.position(next as u64);

        if next == frame_count && self.transport.finish(frame_count) {
            self.events.position(0);
            self.events.finished();
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("channels", &self.buffer.channels())
            .field("frames", &self.buffer.frame_count())
            .finish()
    }
}
