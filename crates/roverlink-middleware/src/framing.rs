//! Message framing for the mission TCP link.
//!
//! The ground station sends exactly one JSON payload per connection. Where
//! that payload ends is decided by a [`Framing`] strategy:
//!
//! | Strategy | Payload ends at |
//! |---|---|
//! | [`Framing::EndOfStream`] | the peer half-closing its write side (production) |
//! | [`Framing::Newline`] | the first `\n`, or end of stream if none arrives (diagnostic) |
//!
//! [`read_frame`] accumulates the payload in [`READ_CHUNK_BYTES`] reads. A
//! read error part way through is not fatal: the bytes gathered so far are
//! returned and the frame is marked [`FrameEnd::ReadError`].

use std::fmt;
use std::str::FromStr;

use roverlink_types::BridgeError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Size of a single socket read.
pub const READ_CHUNK_BYTES: usize = 4096;

/// Default upper bound on one mission payload.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024; // 1 MiB

/// Rule deciding where a mission payload ends in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Read until the peer closes its write side.
    #[default]
    EndOfStream,
    /// Stop at the first newline; surrounding whitespace is trimmed.
    Newline,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::EndOfStream => write!(f, "end_of_stream"),
            Framing::Newline => write!(f, "newline"),
        }
    }
}

impl FromStr for Framing {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "end_of_stream" | "eof" => Ok(Framing::EndOfStream),
            "newline" | "line" => Ok(Framing::Newline),
            other => Err(BridgeError::Config(format!("unknown framing '{other}'"))),
        }
    }
}

/// How the read of a frame terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEnd {
    /// The peer closed its write side.
    EndOfStream,
    /// A newline terminator was seen.
    Terminator,
    /// The socket failed; the frame holds whatever arrived before.
    ReadError(String),
}

/// One accumulated mission payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub end: FrameEnd,
}

/// Read one payload from `reader` according to `framing`.
///
/// # Errors
///
/// Returns [`BridgeError::Framing`] if the payload grows beyond `max_bytes`
/// before it ends.
pub async fn read_frame<R>(
    reader: &mut R,
    framing: Framing,
    max_bytes: usize,
) -> Result<Frame, BridgeError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                return Ok(Frame {
                    bytes: finish(data, framing),
                    end: FrameEnd::EndOfStream,
                });
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, received = data.len(), "read failed mid-payload");
                return Ok(Frame {
                    bytes: finish(data, framing),
                    end: FrameEnd::ReadError(e.to_string()),
                });
            }
        };

        let (take, terminated) = match framing {
            Framing::Newline => match chunk[..n].iter().position(|b| *b == b'\n') {
                Some(pos) => (pos, true),
                None => (n, false),
            },
            Framing::EndOfStream => (n, false),
        };

        if data.len() + take > max_bytes {
            return Err(BridgeError::Framing(format!(
                "payload exceeds the limit of {max_bytes} bytes"
            )));
        }
        data.extend_from_slice(&chunk[..take]);

        if terminated {
            return Ok(Frame {
                bytes: finish(data, framing),
                end: FrameEnd::Terminator,
            });
        }
    }
}

fn finish(data: Vec<u8>, framing: Framing) -> Vec<u8> {
    match framing {
        Framing::Newline => data.trim_ascii().to_vec(),
        Framing::EndOfStream => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Yields `data` once, then fails every subsequent read.
    struct FailingReader {
        data: Option<Vec<u8>>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            }
        }
    }

    #[tokio::test]
    async fn end_of_stream_keeps_newlines() {
        let mut input: &[u8] = b"{\"nav_waypoints\":\n[]}\n";
        let frame = read_frame(&mut input, Framing::EndOfStream, 1024).await.unwrap();
        assert_eq!(frame.bytes, b"{\"nav_waypoints\":\n[]}\n".to_vec());
        assert_eq!(frame.end, FrameEnd::EndOfStream);
    }

    #[tokio::test]
    async fn newline_stops_at_first_terminator() {
        let mut input: &[u8] = b"  {\"a\":1}\r\n{\"b\":2}\n";
        let frame = read_frame(&mut input, Framing::Newline, 1024).await.unwrap();
        assert_eq!(frame.bytes, b"{\"a\":1}".to_vec());
        assert_eq!(frame.end, FrameEnd::Terminator);
    }

    #[tokio::test]
    async fn newline_without_terminator_falls_back_to_end_of_stream() {
        let mut input: &[u8] = b"{\"a\":1}";
        let frame = read_frame(&mut input, Framing::Newline, 1024).await.unwrap();
        assert_eq!(frame.bytes, b"{\"a\":1}".to_vec());
        assert_eq!(frame.end, FrameEnd::EndOfStream);
    }

    #[tokio::test]
    async fn newline_found_after_first_chunk() {
        let mut payload = vec![b'x'; READ_CHUNK_BYTES + 100];
        payload.push(b'\n');
        payload.extend_from_slice(b"ignored");
        let mut input: &[u8] = &payload;
        let frame = read_frame(&mut input, Framing::Newline, 16 * 1024).await.unwrap();
        assert_eq!(frame.bytes.len(), READ_CHUNK_BYTES + 100);
        assert_eq!(frame.end, FrameEnd::Terminator);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let payload = vec![b'x'; 64];
        let mut input: &[u8] = &payload;
        let result = read_frame(&mut input, Framing::EndOfStream, 32).await;
        assert!(
            matches!(result, Err(BridgeError::Framing(_))),
            "expected Framing error, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn read_error_returns_partial_bytes() {
        let mut reader = FailingReader {
            data: Some(b"{\"nav_way".to_vec()),
        };
        let frame = read_frame(&mut reader, Framing::EndOfStream, 1024).await.unwrap();
        assert_eq!(frame.bytes, b"{\"nav_way".to_vec());
        assert!(matches!(frame.end, FrameEnd::ReadError(_)));
    }

    #[test]
    fn framing_parses_from_config_strings() {
        assert_eq!("end_of_stream".parse::<Framing>().unwrap(), Framing::EndOfStream);
        assert_eq!("Newline".parse::<Framing>().unwrap(), Framing::Newline);
        assert!("tlv".parse::<Framing>().is_err());
        assert_eq!(Framing::Newline.to_string(), "newline");
    }
}
