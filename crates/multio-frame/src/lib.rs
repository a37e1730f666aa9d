//! Fixed-header frame codec for multio stream multiplexing.
//!
//! Every frame on the wire is a 16-byte header of four big-endian `u32`
//! fields followed by the payload:
//! - protocol version (always [`PROTOCOL_VERSION`])
//! - stream identifier
//! - payload length
//! - frame kind (Data, Ack, Close)
//!
//! [`FrameReader`] recovers frame boundaries from a byte stream and
//! [`FrameWriter`] writes whole frames, so the multiplexer's I/O loops only
//! ever see complete frames.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode, encode, encode_into, Frame, FrameConfig, FrameKind, HEADER_LEN, PAGE_SIZE,
    PROTOCOL_VERSION,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
