use std::io::{self, Write};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::closer::Closer;
use crate::error::{Result, TransportError};

/// An output that can be written to and closed.
pub trait WriteCloser: Write + Closer {}

impl<T: Write + Closer> WriteCloser for T {}

/// A writer that duplicates every write to all registered outputs.
///
/// Outputs are added with [`MultiWriter::add`] and receive every write made
/// after they were added. A failing output does not stop delivery to the
/// others; the write reports the last failure once every output was tried.
#[derive(Default)]
pub struct MultiWriter {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    outputs: Vec<Box<dyn WriteCloser + Sync>>,
    closed: bool,
}

impl MultiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new output.
    pub fn add(&self, output: Box<dyn WriteCloser + Sync>) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(TransportError::Closed);
        }
        inner.outputs.push(output);
        Ok(())
    }

    /// Write `buf` to every output.
    pub fn write_all_outputs(&self, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(TransportError::Closed);
        }

        let mut failure = None;
        for output in inner.outputs.iter_mut() {
            // TODO: evict outputs that keep failing instead of retrying them on every write.
            if let Err(err) = output.write_all(buf) {
                debug!(error = %err, "fan-out output write failed");
                failure = Some(err);
            }
        }

        match failure {
            Some(err) => Err(TransportError::Io(err)),
            None => Ok(buf.len()),
        }
    }

    /// Number of registered outputs.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .outputs
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every output and refuse further use.
    ///
    /// Returns the last close error, if any. All outputs are dropped either way.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut failure = None;
        for mut output in inner.outputs.drain(..) {
            if let Err(err) = output.close() {
                failure = Some(err);
            }
        }
        inner.closed = true;
        match failure {
            Some(err) => Err(TransportError::Io(err)),
            None => Ok(()),
        }
    }
}

impl Write for &MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all_outputs(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for output in inner.outputs.iter_mut() {
            output.flush()?;
        }
        Ok(())
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut &*self)
    }
}

impl std::fmt::Debug for MultiWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MultiWriter")
            .field("outputs", &inner.outputs.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
