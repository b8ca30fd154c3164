use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::PlaybackEvent;

/// Slots in the end-of-stream lane. A stream finishes at most once and
/// `play()` frees a slot before opening one, so the latest finish always fits.
pub(crate) const FINISH_CAPACITY: usize = 4;

/// Creates the two notification lanes.
///
/// Position updates share a lossy queue of `position_capacity` slots. End of
/// stream has its own lane so position traffic can never crowd it out.
pub(crate) fn channel(position_capacity: usize) -> (EventSender, PlaybackEvents) {
    let (positions_tx, positions_rx) = crossbeam_channel::bounded(position_capacity.max(1));
    let (finished_tx, finished_rx) = crossbeam_channel::bounded(FINISH_CAPACITY);
    (
        EventSender {
            positions: positions_tx,
            finished: finished_tx,
        },
        PlaybackEvents {
            positions: positions_rx,
            finished: finished_rx,
        },
    )
}

/// Producer half. `try_send` only, so it is safe to call from the audio
/// callback.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    positions: Sender<u64>,
    finished: Sender<()>,
}

impl EventSender {
    /// False when the queue was full and the update was dropped.
    #[inline]
    pub(crate) fn position(&self, frame: u64) -> bool {
        self.positions.try_send(frame).is_ok()
    }

    #[inline]
    pub(crate) fn finished(&self) -> bool {
        self.finished.try_send(()).is_ok()
    }
}

/// Receiving side of the engine's notifications.
///
/// Queued position updates are handed out before a pending finish, which
/// keeps the order the callback produced them in.
#[derive(Debug, Clone)]
pub struct PlaybackEvents {
    positions: Receiver<u64>,
    finished: Receiver<()>,
}

impl PlaybackEvents {
    pub fn try_recv(&self) -> Option<PlaybackEvent> {
        if let Ok(frame) = self.positions.try_recv() {
            return Some(PlaybackEvent::PositionChanged(frame));
        }
        self.finished
            .try_recv()
            .ok()
            .map(|()| PlaybackEvent::PlaybackFinished)
    }

    /// Drains everything currently queued.
    pub fn try_iter(&self) -> impl Iterator<Item = PlaybackEvent> + '_ {
        std::iter::from_fn(move || self.try_recv())
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<PlaybackEvent, RecvTimeoutError> {
        if let Some(event) = self.try_recv() {
            return Ok(event);
        }
        crossbeam_channel::select! {
            recv(self.positions) -> frame => frame
                .map(PlaybackEvent::PositionChanged)
                .map_err(|_| RecvTimeoutError::Disconnected),
            recv(self.finished) -> done => done
                .map(|()| PlaybackEvent::PlaybackFinished)
                .map_err(|_| RecvTimeoutError::Disconnected),
            default(timeout) => Err(RecvTimeoutError::Timeout),
        }
    }

    /// Discards the oldest unread finish if the lane is full. Control thread
    /// only.
    pub(crate) fn reserve_finish_slot(&self) -> bool {
        self.finished.is_full() && self.finished.try_recv().is_ok()
    }
}
