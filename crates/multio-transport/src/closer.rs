use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

/// A resource that can be closed explicitly.
///
/// The multiplexer collects every closer it is given at construction and
/// closes them all on teardown. Closing must unblock any thread currently
/// blocked reading from or writing to the resource where the platform allows.
pub trait Closer: Send {
    /// Close the resource.
    fn close(&mut self) -> io::Result<()>;
}

impl<C: Closer + ?Sized> Closer for Box<C> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

#[cfg(unix)]
impl Closer for std::os::unix::net::UnixStream {
    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }
}

impl Closer for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }
}

// A peer that already hung up leaves nothing to shut down.
fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// Adapter turning a closure into a [`Closer`]. See [`close_fn`].
pub struct CloseFn<F>(F);

/// Wrap a closure as a [`Closer`].
///
/// Useful for resources with no close operation of their own, e.g. dropping a
/// child's stdin handle held in a shared slot.
pub fn close_fn<F>(f: F) -> CloseFn<F>
where
    F: FnMut() -> io::Result<()> + Send,
{
    CloseFn(f)
}

impl<F> Closer for CloseFn<F>
where
    F: FnMut() -> io::Result<()> + Send,
{
    fn close(&mut self) -> io::Result<()> {
        (self.0)()
    }
}

impl<F> std::fmt::Debug for CloseFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseFn").finish_non_exhaustive()
    }
}

/// The three capabilities of a bidirectional stream, as independent handles.
pub struct SplitStream {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub closer: Box<dyn Closer>,
}

impl std::fmt::Debug for SplitStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitStream").finish_non_exhaustive()
    }
}

/// A bidirectional stream that can be split into reader, writer and closer.
///
/// Sockets are the usual case: each handle is a clone of the same descriptor,
/// so closing the closer unblocks a reader parked in `read`.
pub trait Duplex {
    fn split(self) -> io::Result<SplitStream>;
}

#[cfg(unix)]
impl Duplex for std::os::unix::net::UnixStream {
    fn split(self) -> io::Result<SplitStream> {
        let reader = self.try_clone()?;
        let closer = self.try_clone()?;
        Ok(SplitStream {
            reader: Box::new(reader),
            writer: Box::new(self),
            closer: Box::new(closer),
        })
    }
}

impl Duplex for TcpStream {
    fn split(self) -> io::Result<SplitStream> {
        let reader = self.try_clone()?;
        let closer = self.try_clone()?;
        Ok(SplitStream {
            reader: Box::new(reader),
            writer: Box::new(self),
            closer: Box::new(closer),
        })
    }
}
