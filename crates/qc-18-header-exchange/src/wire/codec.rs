//! # Wire Codec
//!
//! Length-prefixed framing over any async byte stream:
//!
//! ```text
//! +----------------+---------------------------+
//! | length (4, LE) | bincode payload (length)  |
//! +----------------+---------------------------+
//! ```
//!
//! One request frame followed by zero or more response frames share a
//! stream; the prefix is the only delimiter.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Framing errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Stream ended cleanly on a frame boundary.
    #[error("Stream closed")]
    Closed,

    /// Stream ended inside a frame.
    #[error("Truncated frame: expected {expected} bytes, stream ended")]
    Truncated {
        /// Bytes still expected
        expected: usize,
    },

    /// Frame length exceeds the configured limit.
    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge {
        /// Announced or encoded size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Message could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Payload is not a valid message.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reads and writes self-delimited messages.
#[derive(Clone, Copy, Debug)]
pub struct MessageCodec {
    max_message_size: usize,
}

impl MessageCodec {
    /// Codec rejecting frames larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Largest payload accepted.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Write one framed message and flush. Returns bytes written.
    pub async fn write<W, M>(&self, writer: &mut W, msg: &M) -> Result<usize, CodecError>
    where
        W: AsyncWrite + Unpin + ?Sized,
        M: Serialize,
    {
        let payload = bincode::serialize(msg).map_err(|e| CodecError::Encode(e.to_string()))?;
        if payload.len() > self.max_message_size {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        // max_message_size is a usize, the prefix is a u32
        let len = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;

        writer.write_all(&len.to_le_bytes()).await?;
        writer.write_all(&payload).await?;
        writer.flush().await?;
        Ok(LENGTH_PREFIX_SIZE + payload.len())
    }

    /// Read one framed message. Returns the message and bytes read.
    pub async fn read<R, M>(&self, reader: &mut R) -> Result<(M, usize), CodecError>
    where
        R: AsyncRead + Unpin + ?Sized,
        M: DeserializeOwned,
    {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let first = reader.read(&mut prefix).await?;
        if first == 0 {
            return Err(CodecError::Closed);
        }
        read_exact_or_truncated(reader, &mut prefix[first..]).await?;

        let len = u32::from_le_bytes(prefix) as usize;
        if len > self.max_message_size {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }

        let mut payload = vec![0u8; len];
        read_exact_or_truncated(reader, &mut payload).await?;

        let msg = bincode::deserialize(&payload).map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok((msg, LENGTH_PREFIX_SIZE + len))
    }
}

async fn read_exact_or_truncated<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CodecError::Truncated {
            expected: buf.len(),
        }),
        Err(e) => Err(CodecError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ExtendedHeaderRequest;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_interleaved_frames_on_one_stream() {
        let codec = MessageCodec::new(1024);
        let (mut a, mut b) = tokio::io::duplex(64);

        let written = codec
            .write(&mut a, &ExtendedHeaderRequest::by_height(3, 2))
            .await
            .unwrap();
        codec.write(&mut a, &ExtendedHeaderRequest::head()).await.unwrap();
        drop(a);

        let (first, read): (ExtendedHeaderRequest, _) = codec.read(&mut b).await.unwrap();
        assert_eq!(first, ExtendedHeaderRequest::by_height(3, 2));
        assert_eq!(read, written);
        let (second, _): (ExtendedHeaderRequest, _) = codec.read(&mut b).await.unwrap();
        assert_eq!(second, ExtendedHeaderRequest::head());

        let end = codec.read::<_, ExtendedHeaderRequest>(&mut b).await;
        assert!(matches!(end, Err(CodecError::Closed)));
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let codec = MessageCodec::new(1024);
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = bytes.as_slice();

        let res = codec.read::<_, ExtendedHeaderRequest>(&mut reader).await;
        assert!(matches!(res, Err(CodecError::Truncated { expected: 10 })));
    }

    #[tokio::test]
    async fn test_truncated_prefix() {
        let codec = MessageCodec::new(1024);
        let mut reader: &[u8] = &[5, 0];
        let res = codec.read::<_, ExtendedHeaderRequest>(&mut reader).await;
        assert!(matches!(res, Err(CodecError::Truncated { .. })));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_allocation() {
        let codec = MessageCodec::new(16);
        let bytes = u32::MAX.to_le_bytes();
        let mut reader = &bytes[..];
        let res = codec.read::<_, ExtendedHeaderRequest>(&mut reader).await;
        assert!(matches!(res, Err(CodecError::FrameTooLarge { max: 16, .. })));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let codec = MessageCodec::new(8);
        let mut sink = Vec::new();
        let req = ExtendedHeaderRequest::by_hash(&[1u8; 32]);
        let res = codec.write(&mut sink, &req).await;
        assert!(matches!(res, Err(CodecError::FrameTooLarge { .. })));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_payload_is_decode_error() {
        let codec = MessageCodec::new(1024);
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xff]);
        let mut reader = bytes.as_slice();
        let res = codec.read::<_, ExtendedHeaderRequest>(&mut reader).await;
        assert!(matches!(res, Err(CodecError::Decode(_))));
    }

    proptest! {
        #[test]
        fn prop_request_frame_round_trip(
            height in any::<u64>(),
            amount in any::<u64>(),
            hash in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let req = ExtendedHeaderRequest { hash, height, amount };
            let codec = MessageCodec::new(1024);
            let (decoded, n) = rt.block_on(async {
                let mut buf = Vec::new();
                let written = codec.write(&mut buf, &req).await.unwrap();
                prop_assert_eq!(written, buf.len());
                let mut reader = buf.as_slice();
                Ok(codec.read::<_, ExtendedHeaderRequest>(&mut reader).await.unwrap())
            })?;
            prop_assert_eq!(decoded, req);
            prop_assert!(n > LENGTH_PREFIX_SIZE);
        }
    }
}
