use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam::channel::{self, Receiver, Sender};
use multio_frame::Frame;

/// The handoff queue was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("handoff queue closed")]
pub struct HandoffClosed;

/// Zero-capacity rendezvous point for frames.
///
/// `send` returns only once a receiver has taken the frame. Closing is
/// explicit and independent of how many handles exist: after [`close`],
/// blocked and future senders fail and receivers see end of stream.
///
/// [`close`]: Handoff::close
pub struct Handoff {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    // Dropping the only sender disconnects `closed_rx`, which wakes every
    // select parked on it.
    close_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
    closed: AtomicBool,
}

impl Handoff {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        let (close_tx, closed_rx) = channel::bounded(0);
        Self {
            tx,
            rx,
            close_tx: Mutex::new(Some(close_tx)),
            closed_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// A queue that is already closed.
    pub fn closed() -> Self {
        let handoff = Self::new();
        handoff.close();
        handoff
    }

    /// Hand `frame` to a receiver (blocking).
    pub fn send(&self, frame: Frame) -> Result<(), HandoffClosed> {
        if self.is_closed() {
            return Err(HandoffClosed);
        }
        channel::select_biased! {
            recv(self.closed_rx) -> _ => Err(HandoffClosed),
            send(self.tx, frame) -> sent => sent.map_err(|_| HandoffClosed),
        }
    }

    /// Take the next frame (blocking). `None` once the queue is closed.
    pub fn recv(&self) -> Option<Frame> {
        if self.is_closed() {
            return None;
        }
        channel::select_biased! {
            recv(self.closed_rx) -> _ => None,
            recv(self.rx) -> frame => frame.ok(),
        }
    }

    /// Close the queue, waking every blocked sender and receiver. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff")
            .field("closed", &self.is_closed())
            .finish()
    }
}
