//! Multiplex independent byte streams over a single pipe or socket.
//!
//! multio carries any number of logical, blocking byte streams over one
//! physical duplex transport. Each stream is addressed by a `u32` identifier
//! and behaves like an ordinary `Read` / `Write` handle.
//!
//! # Crate Structure
//!
//! - [`transport`]: closable resources, stream splitting, Unix domain sockets
//! - [`frame`]: the 16-byte header wire format and frame reader / writer
//! - [`mux`]: the multiplexer engine and stream endpoints (behind `mux` feature)

/// Re-export transport types.
pub mod transport {
    pub use multio_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use multio_frame::*;
}

/// Re-export multiplexer types (requires `mux` feature).
#[cfg(feature = "mux")]
pub mod mux {
    pub use multio_mux::*;
}

#[cfg(feature = "mux")]
pub use multio_mux::{Multiplexer, MuxConfig, MuxError, Stream, StreamReader, StreamWriter};
