//! Line-oriented transport with an idle deadline
//!
//! Every read and every write is bounded by the same idle duration. A peer
//! that stalls mid-line is treated exactly like one that sends nothing.

use crate::error::{Result, SmtpdError};
use crate::smtp::response::Reply;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Maximum command line length, terminator included (RFC 5321 4.5.3.1.4)
pub const MAX_LINE_LENGTH: usize = 1000;

/// Outcome of a single [`SmtpConnection::read_line`]
#[derive(Debug, PartialEq, Eq)]
pub enum ReadLine {
    /// A complete line with its CRLF or bare LF removed
    Line(Vec<u8>),
    /// The line exceeded the limit and was discarded through its terminator
    TooLong,
    /// EOF, possibly in the middle of a line
    Closed,
    /// No complete line arrived within the idle deadline
    TimedOut,
}

pub struct SmtpConnection<S> {
    stream: BufReader<S>,
    idle: Duration,
}

impl<S> SmtpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, idle: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            idle,
        }
    }

    /// Read one line of at most `limit` bytes including its terminator.
    pub async fn read_line(&mut self, limit: usize) -> Result<ReadLine> {
        let mut line = Vec::new();

        let n = match self.read_chunk(&mut line, limit).await? {
            Some(n) => n,
            None => return Ok(ReadLine::TimedOut),
        };

        if n == 0 {
            return Ok(ReadLine::Closed);
        }

        if line.last() == Some(&b'\n') {
            strip_terminator(&mut line);
            trace!("Read {} byte line", line.len());
            return Ok(ReadLine::Line(line));
        }

        if line.len() < limit {
            debug!("Connection closed mid-line");
            return Ok(ReadLine::Closed);
        }

        self.discard_line(limit).await
    }

    /// Write a reply and flush it.
    pub async fn send(&mut self, reply: &Reply) -> Result<()> {
        let wire = reply.to_wire();
        let stream = &mut self.stream;

        timeout(self.idle, async move {
            stream.write_all(wire.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| SmtpdError::Timeout)??;

        debug!("Sent: {}", reply);
        Ok(())
    }

    // Consume the rest of an overlong line without buffering it.
    async fn discard_line(&mut self, limit: usize) -> Result<ReadLine> {
        let mut scratch = Vec::with_capacity(limit.min(8192));

        loop {
            scratch.clear();

            match self.read_chunk(&mut scratch, limit).await? {
                None => return Ok(ReadLine::TimedOut),
                Some(0) => return Ok(ReadLine::Closed),
                Some(_) if scratch.last() == Some(&b'\n') => return Ok(ReadLine::TooLong),
                Some(_) => continue,
            }
        }
    }

    async fn read_chunk(&mut self, buf: &mut Vec<u8>, limit: usize) -> Result<Option<usize>> {
        let mut reader = (&mut self.stream).take(limit as u64);

        match timeout(self.idle, reader.read_until(b'\n', buf)).await {
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }
}

fn strip_terminator(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const IDLE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_crlf_and_bare_lf() {
        let (client, server) = duplex(1024);
        let mut conn = SmtpConnection::new(server, IDLE);
        let mut client = client;

        client.write_all(b"HELO a\r\nNOOP\n").await.unwrap();

        assert_eq!(
            conn.read_line(MAX_LINE_LENGTH).await.unwrap(),
            ReadLine::Line(b"HELO a".to_vec())
        );
        assert_eq!(
            conn.read_line(MAX_LINE_LENGTH).await.unwrap(),
            ReadLine::Line(b"NOOP".to_vec())
        );
    }

    #[tokio::test]
    async fn test_overlong_line_is_drained() {
        let (mut client, server) = duplex(8192);
        let mut conn = SmtpConnection::new(server, IDLE);

        let mut long = vec![b'x'; 2500];
        long.extend_from_slice(b"\r\nQUIT\r\n");
        client.write_all(&long).await.unwrap();

        assert_eq!(conn.read_line(MAX_LINE_LENGTH).await.unwrap(), ReadLine::TooLong);
        assert_eq!(
            conn.read_line(MAX_LINE_LENGTH).await.unwrap(),
            ReadLine::Line(b"QUIT".to_vec())
        );
    }

    #[tokio::test]
    async fn test_eof_mid_line() {
        let (mut client, server) = duplex(1024);
        let mut conn = SmtpConnection::new(server, IDLE);

        client.write_all(b"MAIL FROM:").await.unwrap();
        drop(client);

        assert_eq!(conn.read_line(MAX_LINE_LENGTH).await.unwrap(), ReadLine::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_deadline() {
        let (_client, server) = duplex(1024);
        let mut conn = SmtpConnection::new(server, IDLE);

        assert_eq!(conn.read_line(MAX_LINE_LENGTH).await.unwrap(), ReadLine::TimedOut);
    }

    #[tokio::test]
    async fn test_send_appends_crlf() {
        let (mut client, server) = duplex(1024);
        let mut conn = SmtpConnection::new(server, IDLE);

        conn.send(&Reply::ok()).await.unwrap();

        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"250 OK\r\n");
    }
}
