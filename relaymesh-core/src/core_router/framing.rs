//! Incremental JSON framing
//!
//! Frames are JSON objects written back to back with no length prefix.
//! [`JsonFrameCodec`] plugs that format into `tokio_util::codec`: the decoder
//! parses one value at a time off the front of the read buffer.
//!
//! - an incomplete trailing value stays buffered until more bytes arrive
//! - a syntax error clears the whole buffer, since the stream position can
//!   no longer be trusted
//! - a well-formed value that does not fit the expected frame type is
//!   dropped on its own
//! - a buffer that grows beyond `max_frame_size` is cleared
//!
//! None of these end the stream. They are yielded as `Err` items so the
//! connection keeps going; only I/O failures surface as stream errors.

use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead};
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame does not match the expected schema: {0}")]
    Schema(String),

    #[error("Frame exceeds {limit} bytes")]
    Overflow { limit: usize },

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl FrameError {
    /// Only transport failures end a connection; decode failures drop a frame
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Io(_))
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            FrameError::Io(_) => "io",
            FrameError::Malformed(_) => "malformed",
            FrameError::Schema(_) => "schema",
            FrameError::Overflow { .. } => "overflow",
            FrameError::Encode(_) => "encode",
        }
    }
}

/// Codec for back-to-back JSON frames decoding into `T`
///
/// Encoding accepts any `Serialize` value.
#[derive(Debug)]
pub struct JsonFrameCodec<T> {
    max_frame_size: usize,
    _frame: PhantomData<fn() -> T>,
}

impl<T> JsonFrameCodec<T> {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _frame: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonFrameCodec<T> {
    type Item = Result<T, FrameError>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => src.advance(start),
            None => {
                src.clear();
                return Ok(None);
            }
        }

        let (next, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&src[..]).into_iter::<Value>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            None => Ok(None),
            Some(Ok(value)) => {
                src.advance(consumed);
                if consumed > self.max_frame_size {
                    return Ok(Some(Err(FrameError::Overflow {
                        limit: self.max_frame_size,
                    })));
                }
                trace!(consumed, remaining = src.len(), "Decoded frame");
                Ok(Some(
                    serde_json::from_value(value).map_err(|e| FrameError::Schema(e.to_string())),
                ))
            }
            Some(Err(e)) if e.is_eof() => {
                if src.len() > self.max_frame_size {
                    warn!(buffered = src.len(), limit = self.max_frame_size, "Discarding oversized frame");
                    src.clear();
                    return Ok(Some(Err(FrameError::Overflow {
                        limit: self.max_frame_size,
                    })));
                }
                Ok(None)
            }
            Some(Err(e)) => {
                src.clear();
                Ok(Some(Err(FrameError::Malformed(e.to_string()))))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => {
                if !src.is_empty() {
                    trace!(bytes = src.len(), "Stream closed with a partial frame buffered");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl<T, I: Serialize> Encoder<I> for JsonFrameCodec<T> {
    type Error = FrameError;

    fn encode(&mut self, item: I, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec(&item).map_err(|e| FrameError::Encode(e.to_string()))?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

/// Typed frame stream over a byte reader
pub type FrameStream<R, T> = FramedRead<R, JsonFrameCodec<T>>;

pub fn frame_stream<R: AsyncRead, T: DeserializeOwned>(
    reader: R,
    max_frame_size: usize,
) -> FrameStream<R, T> {
    FramedRead::new(reader, JsonFrameCodec::new(max_frame_size))
}

/// Next frame, or `Ok(None)` once the peer closed the stream
///
/// Non-fatal errors (see [`FrameError::is_fatal`]) leave the stream usable;
/// callers log them and keep reading.
pub async fn next_frame<R, T>(stream: &mut FrameStream<R, T>) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match stream.next().await {
        None => Ok(None),
        Some(Ok(item)) => item.map(Some),
        Some(Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        name: String,
    }

    fn codec(max: usize) -> JsonFrameCodec<Ping> {
        JsonFrameCodec::new(max)
    }

    fn ping(result: Option<Result<Ping, FrameError>>) -> Ping {
        result.expect("complete frame").expect("valid frame")
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = codec(1024);
        let mut buf = BytesMut::from(&br#"{"name":"A"}{"name":"B"} {"name":"C"}"#[..]);

        for expected in ["A", "B", "C"] {
            assert_eq!(ping(codec.decode(&mut buf).unwrap()).name, expected);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut codec = codec(1024);
        let mut buf = BytesMut::from(&br#"{"name":"W"#[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(!buf.is_empty());

        buf.extend_from_slice(br#"A"}"#);
        assert_eq!(ping(codec.decode(&mut buf).unwrap()).name, "WA");
    }

    #[test]
    fn test_syntax_error_clears_buffer() {
        let mut codec = codec(1024);
        let mut buf = BytesMut::from(&br#"{"name" 12}{"name":"B"}"#[..]);

        let result = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(result, Err(FrameError::Malformed(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_schema_mismatch_drops_single_frame() {
        let mut codec = codec(1024);
        let mut buf = BytesMut::from(&br#"{"other":1}{"name":"B"}"#[..]);

        let result = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(result, Err(FrameError::Schema(_))));
        assert_eq!(ping(codec.decode(&mut buf).unwrap()).name, "B");
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut codec = codec(8);
        let mut buf = BytesMut::from(&b"{\"name\":\"lo"[..]);

        let result = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(result, Err(FrameError::Overflow { limit: 8 })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_whitespace_only_buffer() {
        let mut codec = codec(64);
        let mut buf = BytesMut::from(&b"  \n "[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_at_eof_is_discarded() {
        let mut codec = codec(64);
        let mut buf = BytesMut::from(&br#"{"name":"#[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_writes_plain_json() {
        let mut codec = codec(64);
        let mut buf = BytesMut::new();
        codec
            .encode(Ping { name: "NE".to_string() }, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], br#"{"name":"NE"}"#);
    }

    #[test]
    fn test_error_classification() {
        let io = FrameError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(io.is_fatal());
        assert!(!FrameError::Schema("x".into()).is_fatal());
        assert_eq!(FrameError::Overflow { limit: 1 }.reason(), "overflow");
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_writes() {
        let (mut tx, rx) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(br#"{"name":"CA1"}{"na"#).await.unwrap();
            tx.write_all(br#"me":"CA2"}"#).await.unwrap();
        });

        let mut stream = frame_stream::<_, Ping>(rx, 1024);
        let first = next_frame(&mut stream).await.unwrap().unwrap();
        let second = next_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(first.name, "CA1");
        assert_eq!(second.name, "CA2");

        writer.await.unwrap();
        assert!(next_frame(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_survives_bad_frames() {
        let (mut tx, rx) = tokio::io::duplex(256);
        use tokio::io::AsyncWriteExt;
        tx.write_all(br#"{"unexpected":true}{"name":"TX"}"#)
            .await
            .unwrap();
        tx.write_all(br#"}}{"name":"GA"}"#).await.unwrap();
        drop(tx);

        let mut stream = frame_stream::<_, Ping>(rx, 1024);
        let err = next_frame(&mut stream).await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(next_frame(&mut stream).await.unwrap().unwrap().name, "TX");
        // Stray braces clear the buffer, taking the frame behind them too.
        let err = next_frame(&mut stream).await.unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
        assert!(next_frame(&mut stream).await.unwrap().is_none());
    }
}
