use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{declared_len, decode, Frame, FrameConfig, HEADER_LEN, PAGE_SIZE};
use crate::error::{FrameError, Result};

/// Size of one physical read: a full page plus its header.
const READ_CHUNK_SIZE: usize = PAGE_SIZE + HEADER_LEN;

/// Reads complete frames from any `Read` byte source.
///
/// A byte stream has no message boundaries: one `read` may return half a
/// frame or several frames at once. The reader accumulates bytes and uses the
/// header's length field to cut out exactly one frame before decoding it.
///
/// A frame that fails to decode is consumed and its error returned; the next
/// call carries on with the bytes after it. A header announcing more than the
/// configured maximum payload cannot be skipped reliably, so everything
/// buffered is discarded and reading resumes with fresh input.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    chunk: Box<[u8]>,
    config: FrameConfig,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of input. Errors for
    /// which [`FrameError::is_frame_local`] holds leave the reader usable.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(result) = self.take_buffered() {
                return result;
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    debug!(
                        discarded = self.buf.len(),
                        "end of input inside a frame"
                    );
                    self.buf.clear();
                }
                return Err(FrameError::ConnectionClosed);
            }

            trace!(bytes = read, "physical read");
            self.buf.extend_from_slice(&self.chunk[..read]);
        }
    }

    /// Cut one frame out of the buffer, if a complete one is there.
    fn take_buffered(&mut self) -> Option<Result<Frame>> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let declared = declared_len(&self.buf[..HEADER_LEN]);
        if declared > self.config.max_payload_size {
            let discarded = self.buf.len();
            self.buf.clear();
            debug!(discarded, "dropping buffered bytes after oversized header");
            return Some(Err(FrameError::PayloadTooLarge {
                size: declared,
                max: self.config.max_payload_size,
            }));
        }

        let total = HEADER_LEN + declared;
        if self.buf.len() < total {
            return None;
        }

        let raw = self.buf.split_to(total);
        Some(decode(&raw))
    }

    /// Bytes received but not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
