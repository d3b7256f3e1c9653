//! NETCONF message framing (RFC 6242).
//!
//! Sessions start with end-of-message framing (`]]>]]>`) and switch to
//! chunked framing once both peers have advertised base:1.1.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const EOM: &[u8] = b"]]>]]>";
const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },
    #[error("Invalid chunk header: {0}")]
    InvalidChunkHeader(String),
    #[error("Connection closed mid-message")]
    Truncated,
}

pub type FramingResult<T> = Result<T, FramingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    EndOfMessage,
    Chunked,
}

impl Framing {
    pub fn encode(self, msg: &[u8], out: &mut BytesMut) {
        match self {
            Framing::EndOfMessage => {
                out.extend_from_slice(msg);
                out.extend_from_slice(EOM);
            }
            Framing::Chunked => {
                if !msg.is_empty() {
                    out.extend_from_slice(format!("\n#{}\n", msg.len()).as_bytes());
                    out.extend_from_slice(msg);
                }
                out.extend_from_slice(b"\n##\n");
            }
        }
    }
}

/// Incremental message decoder.
///
/// Keeps its place between calls: end-of-message framing resumes the
/// delimiter search where the last call stopped, chunked framing moves each
/// completed chunk out of the input once. Input is examined in linear time
/// no matter how small the reads are.
#[derive(Debug)]
pub struct Decoder {
    framing: Framing,
    max: usize,
    /// Bytes at the front of the input already searched for `]]>]]>`.
    scanned: usize,
    /// Completed chunks of the message being assembled.
    partial: BytesMut,
}

impl Decoder {
    pub fn new(framing: Framing, max: usize) -> Self {
        Self {
            framing,
            max,
            scanned: 0,
            partial: BytesMut::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switch framing between messages.
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
        self.scanned = 0;
        self.partial.clear();
    }

    /// Extract one complete message from the front of `buf`, if present.
    pub fn decode(&mut self, buf: &mut BytesMut) -> FramingResult<Option<Bytes>> {
        match self.framing {
            Framing::EndOfMessage => self.decode_eom(buf),
            Framing::Chunked => self.decode_chunked(buf),
        }
    }

    fn decode_eom(&mut self, buf: &mut BytesMut) -> FramingResult<Option<Bytes>> {
        // The delimiter may straddle the previous read boundary.
        let from = self.scanned.min(buf.len()).saturating_sub(EOM.len() - 1);
        match buf[from..].windows(EOM.len()).position(|w| w == EOM) {
            Some(offset) => {
                let end = from + offset;
                self.scanned = 0;
                if end > self.max {
                    return Err(FramingError::MessageTooLarge { size: end, max: self.max });
                }
                let msg = buf.split_to(end).freeze();
                let _ = buf.split_to(EOM.len());
                Ok(Some(msg))
            }
            None if buf.len() > self.max + EOM.len() => Err(FramingError::MessageTooLarge {
                size: buf.len(),
                max: self.max,
            }),
            None => {
                self.scanned = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_chunked(&mut self, buf: &mut BytesMut) -> FramingResult<Option<Bytes>> {
        loop {
            if buf.len() < 4 {
                return Ok(None);
            }
            if &buf[..2] != b"\n#" {
                return Err(FramingError::InvalidChunkHeader("expected LF #".into()));
            }
            if buf[2] == b'#' {
                if buf[3] != b'\n' {
                    return Err(FramingError::InvalidChunkHeader("bad end-of-chunks marker".into()));
                }
                if self.partial.is_empty() {
                    return Err(FramingError::InvalidChunkHeader("message without chunks".into()));
                }
                let _ = buf.split_to(4);
                return Ok(Some(self.partial.split().freeze()));
            }

            let Some(nl) = buf[2..].iter().position(|&b| b == b'\n') else {
                if buf.len() - 2 > 10 {
                    return Err(FramingError::InvalidChunkHeader("chunk size too long".into()));
                }
                return Ok(None);
            };
            let digits = &buf[2..2 + nl];
            let valid =
                !digits.is_empty() && digits.len() <= 10 && digits[0] != b'0' && digits.iter().all(u8::is_ascii_digit);
            let size = std::str::from_utf8(digits)
                .ok()
                .filter(|_| valid)
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&n| n <= MAX_CHUNK_SIZE)
                .ok_or_else(|| FramingError::InvalidChunkHeader(String::from_utf8_lossy(digits).into_owned()))?
                as usize;

            let total = self.partial.len() + size;
            if total > self.max {
                return Err(FramingError::MessageTooLarge { size: total, max: self.max });
            }
            let data_start = 2 + nl + 1;
            if buf.len() < data_start + size {
                return Ok(None);
            }
            let _ = buf.split_to(data_start);
            self.partial.extend_from_slice(&buf.split_to(size));
        }
    }
}

/// A framed NETCONF byte stream.
pub struct NetconfTransport<S> {
    stream: S,
    read_buf: BytesMut,
    decoder: Decoder,
}

impl<S: AsyncRead + AsyncWrite + Unpin> NetconfTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8192),
            decoder: Decoder::new(Framing::EndOfMessage, MAX_MESSAGE_SIZE),
        }
    }

    pub fn set_framing(&mut self, framing: Framing) {
        self.decoder.set_framing(framing);
    }

    pub fn framing(&self) -> Framing {
        self.decoder.framing()
    }

    /// Next complete message, or `None` when the peer closed cleanly between
    /// messages.
    ///
    /// Cancel safe: partial input stays buffered.
    pub async fn recv(&mut self) -> FramingResult<Option<Bytes>> {
        loop {
            if let Some(msg) = self.decoder.decode(&mut self.read_buf)? {
                return Ok(Some(msg));
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(FramingError::Truncated);
            }
        }
    }

    pub async fn send(&mut self, msg: &str) -> FramingResult<()> {
        let mut out = BytesMut::with_capacity(msg.len() + 16);
        self.decoder.framing().encode(msg.as_bytes(), &mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> FramingResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
