use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: version (4) + stream id (4) + length (4) + kind (4) = 16 bytes.
pub const HEADER_LEN: usize = 16;

/// Protocol version carried by every frame.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload carried by a single frame (the `io::copy` buffer size).
pub const PAGE_SIZE: usize = 32 * 1024;

const VERSION_OFFSET: usize = 0;
const STREAM_ID_OFFSET: usize = 4;
const LENGTH_OFFSET: usize = 8;
const KIND_OFFSET: usize = 12;

/// What a frame asks the receiving multiplexer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Stream payload.
    Data,
    /// Receipt of one Data frame; releases the peer's pending write.
    Ack,
    /// One side of the stream is finished.
    Close,
    /// Any other wire value. Decoding keeps it; dispatch rejects it.
    Unknown(u32),
}

impl FrameKind {
    pub fn to_wire(self) -> u32 {
        match self {
            FrameKind::Data => 0,
            FrameKind::Ack => 1,
            FrameKind::Close => 2,
            FrameKind::Unknown(raw) => raw,
        }
    }

    pub fn from_wire(raw: u32) -> Self {
        match raw {
            0 => FrameKind::Data,
            1 => FrameKind::Ack,
            2 => FrameKind::Close,
            other => FrameKind::Unknown(other),
        }
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version, [`PROTOCOL_VERSION`] for frames built locally.
    pub version: u32,
    pub kind: FrameKind,
    /// Logical stream this frame belongs to.
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, stream_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            stream_id,
            payload: payload.into(),
        }
    }

    /// A Data frame carrying `payload` on `stream_id`.
    pub fn data(stream_id: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Data, stream_id, payload)
    }

    /// A zero-length Ack frame.
    pub fn ack(stream_id: u32) -> Self {
        Self::new(FrameKind::Ack, stream_id, Bytes::new())
    }

    /// A zero-length Close frame.
    pub fn close(stream_id: u32) -> Self {
        Self::new(FrameKind::Close, stream_id, Bytes::new())
    }

    /// Payload length as carried in the header.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Encode a frame into a fresh buffer. See [`encode_into`].
pub fn encode(frame: &Frame) -> Bytes {
    let mut dst = BytesMut::with_capacity(frame.wire_size());
    encode_into(frame, &mut dst);
    dst.freeze()
}

/// Append the wire form of `frame` to `dst`.
///
/// Wire format (all fields big-endian `u32`):
/// ```text
/// ┌───────────┬───────────┬───────────┬───────────┬──────────────────┐
/// │ Version   │ Stream ID │ Length    │ Kind      │ Payload          │
/// │ (4B BE)   │ (4B BE)   │ (4B BE)   │ (4B BE)   │ (Length bytes)   │
/// └───────────┴───────────┴───────────┴───────────┴──────────────────┘
/// ```
///
/// Ack and Close frames are a bare header. Payloads are bounded by the
/// multiplexer's maximum payload, far below `u32::MAX`.
pub fn encode_into(frame: &Frame, dst: &mut BytesMut) {
    debug_assert!(frame.payload.len() <= u32::MAX as usize);
    dst.reserve(frame.wire_size());
    dst.put_u32(frame.version);
    dst.put_u32(frame.stream_id);
    dst.put_u32(frame.payload.len() as u32);
    dst.put_u32(frame.kind.to_wire());
    dst.put_slice(&frame.payload);
}

/// Decode exactly one frame from `src`.
///
/// `src` must hold one whole frame and nothing else. The payload is copied,
/// so the caller may reuse `src` immediately. The kind is not validated.
pub fn decode(src: &[u8]) -> Result<Frame> {
    if src.len() < HEADER_LEN {
        return Err(FrameError::InvalidMessage { len: src.len() });
    }

    let version = read_u32(src, VERSION_OFFSET);
    if version != PROTOCOL_VERSION {
        return Err(FrameError::InvalidVersion {
            found: version,
            expected: PROTOCOL_VERSION,
        });
    }

    let stream_id = read_u32(src, STREAM_ID_OFFSET);
    let declared = read_u32(src, LENGTH_OFFSET) as usize;
    let actual = src.len() - HEADER_LEN;
    if declared != actual {
        return Err(FrameError::InvalidLength { declared, actual });
    }

    let kind = FrameKind::from_wire(read_u32(src, KIND_OFFSET));
    Ok(Frame {
        version,
        kind,
        stream_id,
        payload: Bytes::copy_from_slice(&src[HEADER_LEN..]),
    })
}

/// Payload length announced by a header, without validating anything else.
pub(crate) fn declared_len(header: &[u8]) -> usize {
    read_u32(header, LENGTH_OFFSET) as usize
}

fn read_u32(src: &[u8], offset: usize) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&src[offset..offset + 4]);
    u32::from_be_bytes(field)
}

/// Configuration for frame reading.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: [`PAGE_SIZE`].
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = Frame::data(7, Bytes::from_static(b"Hello World!!!\n"));
        let wire = encode(&frame);

        assert_eq!(wire.len(), HEADER_LEN + 15);

        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.kind, FrameKind::Data);
        assert_eq!(decoded.stream_id, 7);
        assert_eq!(decoded.payload.as_ref(), b"Hello World!!!\n");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let wire = encode(&Frame::new(FrameKind::Close, 0x0102_0304, Bytes::new()));
        assert_eq!(
            wire.as_ref(),
            &[0, 0, 0, 1, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_ack_and_close_are_bare_headers() {
        assert_eq!(encode(&Frame::ack(3)).len(), HEADER_LEN);
        assert_eq!(encode(&Frame::close(3)).len(), HEADER_LEN);

        let decoded = decode(&encode(&Frame::ack(3))).unwrap();
        assert_eq!(decoded.kind, FrameKind::Ack);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_short_input() {
        for len in 0..HEADER_LEN {
            let buf = vec![0u8; len];
            assert!(matches!(
                decode(&buf),
                Err(FrameError::InvalidMessage { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn test_decode_version_mismatch() {
        let mut wire = encode(&Frame::data(1, Bytes::from_static(b"abc"))).to_vec();
        wire[3] = 9;

        assert!(matches!(
            decode(&wire),
            Err(FrameError::InvalidVersion {
                found: 9,
                expected: PROTOCOL_VERSION
            })
        ));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut wire = encode(&Frame::data(1, Bytes::from_static(b"abc"))).to_vec();
        wire[11] = 4;

        assert!(matches!(
            decode(&wire),
            Err(FrameError::InvalidLength {
                declared: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_decode_trailing_bytes_rejected() {
        let mut wire = encode(&Frame::data(1, Bytes::from_static(b"abc"))).to_vec();
        wire.push(0);
        assert!(matches!(decode(&wire), Err(FrameError::InvalidLength { .. })));
    }

    #[test]
    fn test_decode_keeps_unknown_kind() {
        let wire = encode(&Frame::new(FrameKind::Unknown(42), 5, Bytes::new()));
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.kind, FrameKind::Unknown(42));
    }

    #[test]
    fn test_decode_copies_payload() {
        let mut wire = encode(&Frame::data(2, Bytes::from_static(b"keep"))).to_vec();
        let decoded = decode(&wire).unwrap();
        wire[HEADER_LEN] = b'X';
        assert_eq!(decoded.payload.as_ref(), b"keep");
    }

    #[test]
    fn test_kind_wire_values() {
        assert_eq!(FrameKind::Data.to_wire(), 0);
        assert_eq!(FrameKind::Ack.to_wire(), 1);
        assert_eq!(FrameKind::Close.to_wire(), 2);
        assert_eq!(FrameKind::from_wire(3), FrameKind::Unknown(3));
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::new();
        encode_into(&Frame::data(1, Bytes::from_static(b"one")), &mut buf);
        encode_into(&Frame::close(1), &mut buf);
        assert_eq!(buf.len(), HEADER_LEN + 3 + HEADER_LEN);
        assert_eq!(declared_len(&buf[..HEADER_LEN]), 3);
    }
}
