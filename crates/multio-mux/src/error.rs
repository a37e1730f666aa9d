/// Errors that can occur in multiplexer operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The builder was not given both a byte source and a byte sink.
    #[error("multiplexer needs a reader and a writer")]
    WrongType,

    /// Rejected configuration value.
    #[error("invalid multiplexer configuration: {0}")]
    InvalidConfig(String),

    /// The peer sent a frame kind this protocol does not define.
    #[error("unknown frame kind {kind} on stream {stream_id}")]
    UnknownKind { kind: u32, stream_id: u32 },

    /// The logical stream was closed (locally, by the peer, or by teardown).
    #[error("stream {stream_id} closed")]
    StreamClosed { stream_id: u32 },

    /// The multiplexer has been torn down.
    #[error("multiplexer closed")]
    Closed,

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] multio_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] multio_transport::TransportError),

    /// An I/O error outside of framing, e.g. spawning a loop thread.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One of the I/O loop threads panicked.
    #[error("{0} loop panicked")]
    LoopPanicked(&'static str),
}

impl From<MuxError> for std::io::Error {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Io(io) => io,
            MuxError::StreamClosed { .. } | MuxError::Closed => {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, err)
            }
            other => std::io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
