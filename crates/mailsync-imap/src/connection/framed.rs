//! CRLF line framing with inline literals.

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

const READ_CHUNK: usize = 8 * 1024;

/// Longest accepted line, excluding literals.
pub const MAX_LINE: usize = 1024 * 1024;

/// Largest accepted literal.
pub const MAX_LITERAL: usize = 64 * 1024 * 1024;

/// Buffered reader/writer that yields whole responses.
pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Reads one response: a line plus every literal it announces and
    /// the line continuations that follow each literal.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = self.read_line().await?;
        while let Some(len) = parse_literal_length(&response) {
            if len > MAX_LITERAL {
                return Err(Error::Protocol(format!(
                    "literal of {len} bytes exceeds limit of {MAX_LITERAL}"
                )));
            }
            self.fill_to(len).await?;
            response.extend_from_slice(&self.buffer[..len]);
            self.buffer.advance(len);
            let rest = self.read_line().await?;
            response.extend_from_slice(&rest);
        }
        Ok(response)
    }

    /// Reads one CRLF-terminated line, terminator included.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos + 1;
                return Ok(self.buffer.split_to(end).to_vec());
            }
            scanned = self.buffer.len();
            if scanned > MAX_LINE {
                return Err(Error::Protocol("response line too long".to_string()));
            }
            self.fill().await?;
        }
    }

    /// Writes and flushes a serialized command.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_raw(data).await
    }

    /// Writes and flushes raw bytes, e.g. literal payloads.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shuts down the write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    async fn fill(&mut self) -> Result<()> {
        self.buffer.reserve(READ_CHUNK);
        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        Ok(())
    }

    async fn fill_to(&mut self, len: usize) -> Result<()> {
        while self.buffer.len() < len {
            self.fill().await?;
        }
        Ok(())
    }
}

/// Length announced by a trailing `{n}` or `{n+}` on a line.
#[must_use]
pub fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_literal_length() {
        assert_eq!(parse_literal_length(b"* 1 FETCH (RFC822 {42}\r\n"), Some(42));
        assert_eq!(parse_literal_length(b"A1 APPEND x {7+}\r\n"), Some(7));
        assert_eq!(parse_literal_length(b"* OK done\r\n"), None);
        assert_eq!(parse_literal_length(b"* OK {}\r\n"), None);
        assert_eq!(parse_literal_length(b"* OK {12}"), None);
    }

    #[tokio::test]
    async fn test_split_reads() {
        let mock = Builder::new().read(b"* 3 EX").read(b"ISTS\r\nA1 OK\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* 3 EXISTS\r\n");
        assert_eq!(framed.read_response().await.unwrap(), b"A1 OK\r\n");
    }

    #[tokio::test]
    async fn test_response_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (RFC822 {5}\r\nHel")
            .read(b"lo)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (RFC822 {5}\r\nHello)\r\n"
        );
    }

    #[tokio::test]
    async fn test_literal_containing_braces() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (RFC822 {6}\r\n{2}\r\nX)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (RFC822 {6}\r\n{2}\r\nX)\r\n"
        );
    }

    #[tokio::test]
    async fn test_eof() {
        let mock = Builder::new().read(b"* OK").build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_write() {
        let mock = Builder::new().write(b"A00001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"A00001 NOOP\r\n").await.unwrap();
    }
}
