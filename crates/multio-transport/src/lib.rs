//! Physical transport plumbing for multio.
//!
//! The multiplexer only needs a byte source, a byte sink and a way to close
//! whatever owns them. This crate provides:
//! - [`Closer`], the close capability handed to the multiplexer at construction
//! - [`Duplex`], splitting a bidirectional stream into reader, writer and closer
//! - [`UnixDomainSocket`] bind/accept/connect helpers (Unix only)
//! - [`MultiWriter`], a fan-out writer that duplicates writes to many outputs

pub mod closer;
pub mod error;
pub mod fanout;

#[cfg(unix)]
pub mod uds;

pub use closer::{close_fn, CloseFn, Closer, Duplex, SplitStream};
pub use error::{Result, TransportError};
pub use fanout::{MultiWriter, WriteCloser};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
