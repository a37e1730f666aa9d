use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use multio_frame::{Frame, FrameConfig, FrameError, FrameKind, FrameReader, FrameWriter};
use multio_transport::{Closer, Duplex, SplitStream};
use tracing::{debug, error, trace, Dispatch, Span};

use crate::config::MuxConfig;
use crate::delivery::Delivery;
use crate::error::{MuxError, Result};
use crate::handoff::Handoff;
use crate::registry::Registry;
use crate::stream::{Stream, StreamReader, StreamWriter};

/// Builder for [`Multiplexer`].
///
/// The first reader and the first writer supplied are used; later ones are
/// ignored. Every closer is kept and closed on teardown.
#[derive(Default)]
pub struct MultiplexerBuilder {
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    closers: Vec<Box<dyn Closer>>,
    config: MuxConfig,
    dispatch: Option<Dispatch>,
}

impl MultiplexerBuilder {
    /// Physical byte source.
    pub fn reader<R: Read + Send + 'static>(mut self, reader: R) -> Self {
        if self.reader.is_none() {
            self.reader = Some(Box::new(reader));
        } else {
            debug!("reader already set; ignoring");
        }
        self
    }

    /// Physical byte sink.
    pub fn writer<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        if self.writer.is_none() {
            self.writer = Some(Box::new(writer));
        } else {
            debug!("writer already set; ignoring");
        }
        self
    }

    /// A resource to close on teardown.
    pub fn closer<C: Closer + 'static>(mut self, closer: C) -> Self {
        self.closers.push(Box::new(closer));
        self
    }

    /// Source, sink and closer of one bidirectional stream.
    pub fn stream<D: Duplex>(self, stream: D) -> Result<Self> {
        Ok(self.split(stream.split()?))
    }

    /// Pre-split stream handles.
    pub fn split(self, parts: SplitStream) -> Self {
        let SplitStream {
            reader,
            writer,
            closer,
        } = parts;
        self.reader(reader).writer(writer).closer(closer)
    }

    pub fn config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    /// Tracing dispatcher for the engine's threads. Defaults to the one active
    /// where [`build`](Self::build) is called.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Start the read and write loops.
    pub fn build(self) -> Result<Multiplexer> {
        let (Some(reader), Some(writer)) = (self.reader, self.writer) else {
            return Err(MuxError::WrongType);
        };
        self.config.validate()?;

        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));
        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug_span!("multio", name = %self.config.name)
        });

        let shared = Arc::new(Shared {
            config: self.config,
            dispatch,
            span,
            outbound: Arc::new(Handoff::new()),
            data: Registry::new("data"),
            acks: Registry::new("ack"),
            delivery: Delivery::new(),
            closed: AtomicBool::new(false),
            closers: Mutex::new(self.closers),
        });

        let read = spawn_loop(&shared, "read", move |shared| read_loop(&shared, reader))?;
        let write = match spawn_loop(&shared, "write", move |shared| write_loop(&shared, writer)) {
            Ok(handle) => handle,
            Err(err) => {
                shared.teardown();
                return Err(err.into());
            }
        };

        shared.in_context(|| debug!("multiplexer started"));

        Ok(Multiplexer {
            shared,
            loops: Mutex::new(Loops {
                read: Some(read),
                write: Some(write),
                write_result: None,
            }),
        })
    }
}

/// Many logical byte streams over one physical transport.
///
/// Two threads run for the lifetime of the engine: the read loop, sole reader
/// of the transport, and the write loop, sole writer. Both stop on
/// [`close`](Self::close), on end of input, or on a fatal transport or
/// protocol error. Dropping the handle does not stop them.
///
/// Acks are handed to the waiting writer from the read loop itself. If a
/// peer acknowledges a frame no local writer is waiting on, the read loop
/// blocks and every stream on the engine stalls until that stream closes.
pub struct Multiplexer {
    shared: Arc<Shared>,
    loops: Mutex<Loops>,
}

struct Loops {
    read: Option<JoinHandle<Result<()>>>,
    write: Option<JoinHandle<Result<()>>>,
    write_result: Option<Result<()>>,
}

impl Multiplexer {
    pub fn builder() -> MultiplexerBuilder {
        MultiplexerBuilder::default()
    }

    /// Engine over a separate source and sink, with default configuration.
    pub fn new<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::builder().reader(reader).writer(writer).build()
    }

    /// Engine over one bidirectional stream, e.g. a connected socket.
    pub fn from_stream<D: Duplex>(stream: D) -> Result<Self> {
        Self::builder().stream(stream)?.build()
    }

    /// Write-end for stream `id`.
    pub fn writer(&self, id: u32) -> StreamWriter {
        let acks = self.shared.open_lane(&self.shared.acks, id);
        StreamWriter::new(
            id,
            Arc::clone(&self.shared.outbound),
            acks,
            self.shared.config.max_payload,
        )
    }

    /// Read-end for stream `id`.
    pub fn reader(&self, id: u32) -> StreamReader {
        let data = self.shared.open_lane(&self.shared.data, id);
        StreamReader::new(id, Arc::clone(&self.shared.outbound), data)
    }

    /// Combined read-write end for stream `id`.
    pub fn stream(&self, id: u32) -> Stream {
        Stream::new(self.reader(id), self.writer(id))
    }

    /// Tear the engine down.
    ///
    /// Ends every stream, lets the write loop finish the frame it is writing,
    /// then closes every collected closer and returns the first close error.
    /// A second call does nothing.
    pub fn close(&self) -> Result<()> {
        self.shared.in_context(|| {
            if self.shared.shutdown() {
                debug!("closing multiplexer");
            }
        });
        self.finish_write_loop();
        self.shared.close_resources().map_err(MuxError::Io)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stream ids with an open data or ack lane.
    pub fn stream_count(&self) -> usize {
        let mut ids: HashSet<u32> = self.shared.data.ids().into_iter().collect();
        ids.extend(self.shared.acks.ids());
        ids.len()
    }

    /// Wait for both loops to stop.
    ///
    /// Returns the read loop's error if it stopped on a protocol violation or
    /// a transport failure, otherwise the write loop's. Later calls return
    /// `Ok(())`.
    pub fn join(&self) -> Result<()> {
        let read = self.loops().read.take();
        let read_result = read.map_or(Ok(()), |handle| join_loop(handle, "read"));

        self.finish_write_loop();
        let write_result = self.loops().write_result.take().unwrap_or(Ok(()));

        read_result.and(write_result)
    }

    fn finish_write_loop(&self) {
        let write = self.loops().write.take();
        if let Some(handle) = write {
            let result = join_loop(handle, "write");
            self.loops().write_result = Some(result);
        }
    }

    fn loops(&self) -> MutexGuard<'_, Loops> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("name", &self.shared.config.name)
            .field("closed", &self.is_closed())
            .field("streams", &self.stream_count())
            .finish()
    }
}

/// State shared by the handle, both loops and the delivery workers.
struct Shared {
    config: MuxConfig,
    dispatch: Dispatch,
    span: Span,
    outbound: Arc<Handoff>,
    data: Registry,
    acks: Registry,
    delivery: Delivery,
    closed: AtomicBool,
    closers: Mutex<Vec<Box<dyn Closer>>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn in_context<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    /// Lane for a new endpoint; already closed if the engine is.
    fn open_lane(&self, registry: &Registry, id: u32) -> Arc<Handoff> {
        if self.is_closed() {
            return Arc::new(Handoff::closed());
        }
        if registry.create_if_absent(id) {
            self.in_context(|| debug!(stream_id = id, lane = ?registry, "stream lane opened"));
        }
        // Closed if teardown sealed the registry since the check above.
        registry.get_or_create(id)
    }

    fn dispatch_frame(&self, frame: Frame) -> Result<()> {
        let id = frame.stream_id;
        trace!(stream_id = id, kind = ?frame.kind, len = frame.len(), "frame received");

        match frame.kind {
            FrameKind::Data => self.delivery.deliver(&self.data, frame),
            FrameKind::Ack => {
                // Blocks the read loop until the writer on `id` takes it. An ack
                // nobody waits for stalls every stream on this engine. After
                // teardown the sealed registry yields a closed lane.
                if self.acks.get_or_create(id).send(frame).is_err() {
                    debug!(stream_id = id, "stream closed; dropping ack");
                }
            }
            FrameKind::Close => self.close_stream(id),
            FrameKind::Unknown(kind) => {
                return Err(MuxError::UnknownKind {
                    kind,
                    stream_id: id,
                })
            }
        }
        Ok(())
    }

    /// End stream `id` locally: blocked readers see end of stream, blocked
    /// writers see [`MuxError::StreamClosed`].
    fn close_stream(&self, id: u32) {
        let data = self.delivery.close_lane(&self.data, id);
        let ack = match self.acks.remove(id) {
            Some(lane) => {
                lane.close();
                true
            }
            None => false,
        };
        debug!(stream_id = id, data, ack, "stream closed");
    }

    fn close_lanes(&self) -> usize {
        let mut closed = self.delivery.close_all(&self.data);
        for (_, lane) in self.acks.seal() {
            lane.close();
            closed += 1;
        }
        closed
    }

    /// Set the closed flag and end every stream and the outbound queue.
    /// Returns `true` for the call that set the flag.
    fn shutdown(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        let lanes = self.close_lanes();
        self.outbound.close();
        if first {
            debug!(lanes, "multiplexer shut down");
        }
        first
    }

    /// Close every collected closer once, reporting the first error.
    fn close_resources(&self) -> std::io::Result<()> {
        let closers = std::mem::take(
            &mut *self
                .closers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut first_err = None;
        for mut closer in closers {
            if let Err(err) = closer.close() {
                debug!(error = %err, "closer failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Shutdown initiated by one of the loops.
    fn teardown(&self) {
        self.shutdown();
        if let Err(err) = self.close_resources() {
            debug!(error = %err, "closing transport failed");
        }
    }
}

fn spawn_loop<F>(
    shared: &Arc<Shared>,
    role: &'static str,
    body: F,
) -> std::io::Result<JoinHandle<Result<()>>>
where
    F: FnOnce(Arc<Shared>) -> Result<()> + Send + 'static,
{
    let name = format!("{}-{role}", shared.config.name);
    let shared = Arc::clone(shared);
    thread::Builder::new().name(name).spawn(move || {
        let dispatch = shared.dispatch.clone();
        let span = shared.span.clone();
        tracing::dispatcher::with_default(&dispatch, || span.in_scope(|| body(shared)))
    })
}

fn join_loop(handle: JoinHandle<Result<()>>, role: &'static str) -> Result<()> {
    handle.join().unwrap_or(Err(MuxError::LoopPanicked(role)))
}

fn read_loop(shared: &Shared, reader: Box<dyn Read + Send>) -> Result<()> {
    let config = FrameConfig {
        max_payload_size: shared.config.max_payload,
    };
    let mut frames = FrameReader::with_config(reader, config);
    debug!("read loop started");

    let result = loop {
        let frame = match frames.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                debug!("end of input");
                break Ok(());
            }
            Err(err) if shared.is_closed() => {
                debug!(error = %err, "read interrupted by close");
                break Ok(());
            }
            Err(err) if err.is_frame_local() => {
                error!(error = %err, "dropping invalid frame");
                continue;
            }
            Err(err) => {
                error!(error = %err, "transport read failed; closing multiplexer");
                break Err(MuxError::Frame(err));
            }
        };

        if shared.is_closed() {
            break Ok(());
        }

        if let Err(err) = shared.dispatch_frame(frame) {
            error!(error = %err, "protocol violation; closing multiplexer");
            break Err(err);
        }
    };

    shared.teardown();
    debug!("read loop finished");
    result
}

fn write_loop(shared: &Shared, writer: Box<dyn Write + Send>) -> Result<()> {
    let mut frames = FrameWriter::new(writer);
    debug!("write loop started");

    while let Some(frame) = shared.outbound.recv() {
        if let Err(err) = frames.write_frame(&frame) {
            if shared.is_closed() {
                debug!(error = %err, "write interrupted by close");
                return Ok(());
            }
            error!(
                stream_id = frame.stream_id,
                error = %err,
                "transport write failed; closing multiplexer"
            );
            shared.teardown();
            return Err(MuxError::Frame(err));
        }
        trace!(stream_id = frame.stream_id, kind = ?frame.kind, len = frame.len(), "frame written");

        if frame.kind == FrameKind::Close {
            shared.close_stream(frame.stream_id);
        }
    }

    debug!("write loop finished");
    Ok(())
}
