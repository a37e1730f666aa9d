//! Multiplex independent byte streams over one duplex transport.
//!
//! A [`Multiplexer`] owns a physical byte source and sink and runs exactly
//! one thread reading from the source and one thread writing to the sink.
//! Callers open logical streams by identifier and get ordinary blocking
//! [`std::io::Read`] / [`std::io::Write`] handles back:
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use std::os::unix::net::UnixStream;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = UnixStream::pair()?;
//! let a = multio_mux::Multiplexer::from_stream(left)?;
//! let b = multio_mux::Multiplexer::from_stream(right)?;
//!
//! let mut reader = b.reader(0);
//! std::thread::spawn(move || {
//!     let mut writer = a.writer(0);
//!     writer.write_all(b"Hello World!!!\n").unwrap();
//!     writer.close().unwrap();
//! });
//!
//! let mut text = String::new();
//! reader.read_to_string(&mut text)?;
//! assert_eq!(text, "Hello World!!!\n");
//! # Ok(())
//! # }
//! ```
//!
//! Flow control is one frame in flight per stream: a write returns only after
//! the peer's reader took the frame and acknowledged it.

pub mod config;
pub mod delivery;
pub mod error;
pub mod handoff;
pub mod mux;
pub mod registry;
pub mod stream;

pub use config::MuxConfig;
pub use error::{MuxError, Result};
pub use handoff::{Handoff, HandoffClosed};
pub use mux::{Multiplexer, MultiplexerBuilder};
pub use registry::Registry;
pub use stream::{Stream, StreamReader, StreamWriter};

pub use multio_frame::{Frame, FrameKind, HEADER_LEN, PAGE_SIZE, PROTOCOL_VERSION};
