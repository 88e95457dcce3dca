//! Frame codec for the courier transport
//!
//! Wire format per frame: `[4-byte BE length][1-byte type][payload]`,
//! where the length covers the payload only. Type 0 is a UTF-8 command
//! envelope, type 1 an opaque binary blob, type 2 a file chunk whose
//! payload starts with an 8-byte transfer id and 8-byte offset.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use courier_utils::CourierError;

/// Maximum frame payload size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const TYPE_TEXT: u8 = 0;
const TYPE_BINARY: u8 = 1;
const TYPE_FILE_CHUNK: u8 = 2;

/// Bytes of transfer-id + offset preceding chunk data
const CHUNK_HEADER: usize = 16;

/// Frame codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("Truncated file-chunk frame ({0} bytes)")]
    TruncatedChunk(usize),
}

impl From<CodecError> for CourierError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => CourierError::Io(e),
            CodecError::FrameTooLarge { size, max } => CourierError::FrameTooLarge { size, max },
            other => CourierError::Protocol(other.to_string()),
        }
    }
}

/// One transport unit on the frame channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 command envelope (JSON)
    Text(Vec<u8>),
    /// Opaque binary blob
    Binary(Vec<u8>),
    /// One chunk of a multi-chunk file transfer
    FileChunk {
        transfer_id: u64,
        offset: u64,
        data: Vec<u8>,
    },
}

impl Frame {
    /// Payload length on the wire (chunk header included for file chunks).
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Text(data) | Frame::Binary(data) => data.len(),
            Frame::FileChunk { data, .. } => CHUNK_HEADER + data.len(),
        }
    }
}

/// Symmetric codec used by both the client and server roles.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        // Need the length prefix and the type byte
        if src.len() < 5 {
            return Ok(None);
        }

        // Peek at length without consuming
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        // Check if we have the full frame
        if src.len() < 4 + 1 + len {
            src.reserve(4 + 1 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let frame_type = src.get_u8();
        let mut payload = src.split_to(len);

        let frame = match frame_type {
            TYPE_TEXT => Frame::Text(payload.to_vec()),
            TYPE_BINARY => Frame::Binary(payload.to_vec()),
            TYPE_FILE_CHUNK => {
                if payload.len() < CHUNK_HEADER {
                    return Err(CodecError::TruncatedChunk(payload.len()));
                }
                let transfer_id = payload.get_u64();
                let offset = payload.get_u64();
                Frame::FileChunk {
                    transfer_id,
                    offset,
                    data: payload.to_vec(),
                }
            }
            other => return Err(CodecError::UnknownFrameType(other)),
        };

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let len = item.payload_len();
        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(4 + 1 + len);
        dst.put_u32(len as u32);
        match item {
            Frame::Text(data) => {
                dst.put_u8(TYPE_TEXT);
                dst.put_slice(&data);
            }
            Frame::Binary(data) => {
                dst.put_u8(TYPE_BINARY);
                dst.put_slice(&data);
            }
            Frame::FileChunk {
                transfer_id,
                offset,
                data,
            } => {
                dst.put_u8(TYPE_FILE_CHUNK);
                dst.put_u64(transfer_id);
                dst.put_u64(offset);
                dst.put_slice(&data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) -> Frame {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn test_text_roundtrip() {
        let frame = Frame::Text(b"{\"ident\":\"ping\"}".to_vec());
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_binary_roundtrip() {
        let frame = Frame::Binary(vec![0, 1, 2, 255]);
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_file_chunk_roundtrip() {
        let frame = Frame::FileChunk {
            transfer_id: 7,
            offset: 65536,
            data: vec![9; 128],
        };
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_empty_text_frame() {
        let frame = Frame::Text(Vec::new());
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_wire_layout() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::Text(b"hi".to_vec()), &mut buf).unwrap();
        // [len=2 BE][type=0][payload]
        assert_eq!(&buf[..], &[0, 0, 0, 2, 0, b'h', b'i']);
    }

    #[test]
    fn test_chunk_wire_layout_includes_header() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::FileChunk {
                    transfer_id: 1,
                    offset: 2,
                    data: vec![0xab],
                },
                &mut buf,
            )
            .unwrap();
        // Declared length covers transfer-id + offset + data
        assert_eq!(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), 17);
        assert_eq!(buf[4], TYPE_FILE_CHUNK);
    }

    #[test]
    fn test_partial_input_returns_none() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::Text(b"hello".to_vec()), &mut buf)
            .unwrap();

        let mut partial = BytesMut::from(&buf[..4]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&buf[..buf.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::Text(b"one".to_vec()), &mut buf).unwrap();
        codec
            .encode(Frame::Binary(b"two".to_vec()), &mut buf)
            .unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Frame::Text(b"one".to_vec())
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Frame::Binary(b"two".to_vec())
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversize_length_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        buf.put_u8(TYPE_TEXT);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u8(9);
        buf.put_u8(0);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::UnknownFrameType(9))
        ));
    }

    #[test]
    fn test_truncated_chunk_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(8);
        buf.put_u8(TYPE_FILE_CHUNK);
        buf.put_u64(1); // only 8 of the 16 header bytes
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::TruncatedChunk(8))
        ));
    }
}
