//! Ordered, non-blocking Data delivery.
//!
//! The read loop must never wait for a consumer, yet frames for one stream
//! have to reach its reader in wire order. Each active stream id gets a
//! worker thread fed by an unbounded channel; the worker performs the
//! blocking rendezvous into the stream's data lane one frame at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use multio_frame::Frame;
use tracing::{debug, error, trace};

use crate::handoff::Handoff;
use crate::registry::Registry;

/// Delivery workers for one engine, keyed by stream id.
///
/// Lane removal for an id and worker creation for the same id are serialized
/// on the worker map, so a retired worker never feeds a fresh lane.
#[derive(Default)]
pub struct Delivery {
    workers: Mutex<HashMap<u32, Sender<Frame>>>,
}

impl Delivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a Data frame for its stream's reader without blocking.
    pub fn deliver(&self, lanes: &Registry, frame: Frame) {
        let id = frame.stream_id;
        let mut workers = self.lock();

        let frame = match workers.get(&id) {
            Some(feed) => match feed.send(frame) {
                Ok(()) => return,
                Err(channel::SendError(frame)) => {
                    debug!(stream_id = id, "delivery worker gone; restarting");
                    workers.remove(&id);
                    frame
                }
            },
            None => frame,
        };

        let lane = lanes.get_or_create(id);
        if lane.is_closed() {
            debug!(stream_id = id, len = frame.len(), "delivery closed; dropping data frame");
            return;
        }
        let (feed, queue) = channel::unbounded();
        if let Err(err) = spawn_worker(id, lane, queue) {
            error!(stream_id = id, error = %err, "failed to start delivery worker; dropping frame");
            return;
        }
        // The worker holds `queue` until `feed` is dropped, so this cannot fail.
        let _ = feed.send(frame);
        workers.insert(id, feed);
    }

    /// Retire `id`'s worker and close its data lane.
    ///
    /// Frames still queued for the worker are dropped. Returns `true` if a
    /// lane was open for `id`.
    pub fn close_lane(&self, lanes: &Registry, id: u32) -> bool {
        let mut workers = self.lock();
        workers.remove(&id);
        match lanes.remove(id) {
            Some(lane) => {
                lane.close();
                true
            }
            None => false,
        }
    }

    /// Retire every worker, close every data lane and seal `lanes`, so
    /// later frames are dropped instead of starting new workers.
    pub fn close_all(&self, lanes: &Registry) -> usize {
        let mut workers = self.lock();
        workers.clear();
        let drained = lanes.seal();
        for (_, lane) in &drained {
            lane.close();
        }
        drained.len()
    }

    /// Number of running workers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Sender<Frame>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_worker(id: u32, lane: Arc<Handoff>, queue: Receiver<Frame>) -> std::io::Result<()> {
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());
    let span = tracing::debug_span!("delivery", stream_id = id);

    thread::Builder::new()
        .name(format!("multio-deliver-{id}"))
        .spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                span.in_scope(|| run_worker(id, &lane, &queue));
            });
        })?;
    Ok(())
}

fn run_worker(id: u32, lane: &Handoff, queue: &Receiver<Frame>) {
    trace!("delivery worker started");
    for frame in queue.iter() {
        let len = frame.len();
        if lane.send(frame).is_err() {
            debug!(stream_id = id, len, "stream closed; dropping data frame");
        }
    }
    trace!("delivery worker finished");
}
