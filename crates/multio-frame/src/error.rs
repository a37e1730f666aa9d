/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a frame header.
    #[error("the message is invalid and can't be decoded ({len} bytes, header is 16)")]
    InvalidMessage { len: usize },

    /// The header carries a protocol version other than ours.
    #[error("message version {found} does not match multiplexer version {expected}")]
    InvalidVersion { found: u32, expected: u32 },

    /// The header length field disagrees with the bytes that follow it.
    #[error("message length {declared} does not match payload length {actual}")]
    InvalidLength { declared: usize, actual: usize },

    /// The header announces a payload larger than the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed (end of input).
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors confined to a single frame; the stream itself is still usable.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMessage { .. }
                | FrameError::InvalidVersion { .. }
                | FrameError::InvalidLength { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
