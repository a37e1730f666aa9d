use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use multio_frame::Frame;
use tracing::{debug, trace};

use crate::error::{MuxError, Result};
use crate::handoff::Handoff;

/// Write-end of one logical stream.
///
/// Every write is one Data frame followed by a wait for the peer's Ack, so at
/// most one frame per stream is in flight.
pub struct StreamWriter {
    id: u32,
    outbound: Arc<Handoff>,
    acks: Arc<Handoff>,
    max_payload: usize,
    closed: AtomicBool,
}

impl StreamWriter {
    pub(crate) fn new(
        id: u32,
        outbound: Arc<Handoff>,
        acks: Arc<Handoff>,
        max_payload: usize,
    ) -> Self {
        Self {
            id,
            outbound,
            acks,
            max_payload,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Send up to `max_payload` bytes of `buf` as one frame and wait for the
    /// peer to acknowledge it. Returns the number of bytes sent.
    ///
    /// An empty `buf` sends nothing and returns `Ok(0)`.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        if self.acks.is_closed() {
            return Err(self.stream_closed());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let n = buf.len().min(self.max_payload);
        self.outbound
            .send(Frame::data(self.id, Bytes::copy_from_slice(&buf[..n])))
            .map_err(|_| MuxError::Closed)?;

        match self.acks.recv() {
            Some(_ack) => {
                trace!(stream_id = self.id, len = n, "write acknowledged");
                Ok(n)
            }
            None => Err(self.stream_closed()),
        }
    }

    /// Tell the peer this side is finished. Does not wait for the peer.
    ///
    /// Only the first call sends a Close frame. Closing a stream on an engine
    /// that already shut down succeeds without sending anything.
    pub fn close(&self) -> Result<()> {
        send_close(self.id, &self.outbound, &self.closed)
    }

    fn stream_closed(&self) -> MuxError {
        MuxError::StreamClosed { stream_id: self.id }
    }
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("id", &self.id)
            .field("closed", &self.acks.is_closed())
            .finish()
    }
}

/// Read-end of one logical stream.
///
/// Each frame taken from the engine is acknowledged at once, releasing the
/// peer's writer. Bytes that do not fit the caller's buffer are kept for the
/// next read.
pub struct StreamReader {
    id: u32,
    outbound: Arc<Handoff>,
    data: Arc<Handoff>,
    pending: Bytes,
    closed: AtomicBool,
}

impl StreamReader {
    pub(crate) fn new(id: u32, outbound: Arc<Handoff>, data: Arc<Handoff>) -> Self {
        Self {
            id,
            outbound,
            data,
            pending: Bytes::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Copy the next bytes of the stream into `buf` (blocking).
    ///
    /// `Ok(0)` means end of stream, unless `buf` is empty.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            let Some(frame) = self.data.recv() else {
                return Ok(0);
            };
            if self.outbound.send(Frame::ack(self.id)).is_err() {
                debug!(stream_id = self.id, "engine closed; ack not sent");
            }
            self.pending = frame.payload;
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    /// Bytes received from the peer but not yet read.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Tell the peer this side is finished. Does not wait for the peer.
    pub fn close(&self) -> Result<()> {
        send_close(self.id, &self.outbound, &self.closed)
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf).map_err(Into::into)
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("id", &self.id)
            .field("buffered", &self.pending.len())
            .field("closed", &self.data.is_closed())
            .finish()
    }
}

fn send_close(id: u32, outbound: &Handoff, closed: &AtomicBool) -> Result<()> {
    if closed.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    if outbound.send(Frame::close(id)).is_err() {
        debug!(stream_id = id, "engine closed; close frame not sent");
    }
    Ok(())
}

/// Read-end and write-end of the same stream.
#[derive(Debug)]
pub struct Stream {
    reader: StreamReader,
    writer: StreamWriter,
}

impl Stream {
    pub(crate) fn new(reader: StreamReader, writer: StreamWriter) -> Self {
        Self { reader, writer }
    }

    pub fn id(&self) -> u32 {
        self.writer.id()
    }

    /// Close both halves. A read-end error is reported before a write-end one.
    pub fn close(&self) -> Result<()> {
        let read = self.reader.close();
        let write = self.writer.close();
        read.and(write)
    }

    /// Separate the halves, e.g. to read and write from different threads.
    pub fn into_split(self) -> (StreamReader, StreamWriter) {
        (self.reader, self.writer)
    }

    pub fn reader(&mut self) -> &mut StreamReader {
        &mut self.reader
    }

    pub fn writer(&self) -> &StreamWriter {
        &self.writer
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
