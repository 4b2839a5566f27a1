//! IDLE (RFC 2177).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use super::framed::FramedStream;
use crate::parser::{FetchItem, Response, UntaggedResponse, parse_response};
use crate::types::{MailboxCounters, Status};
use crate::{Error, Result};

/// What ended one [`IdleHandle::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// Unsolicited `* n FETCH (FLAGS ...)`.
    Flags {
        /// Sequence number.
        seq: u32,
        /// New flag set.
        flags: Vec<String>,
    },
    /// Nothing arrived in time.
    Timeout,
}

/// An IDLE in progress. Borrowing the stream keeps other commands out
/// until [`done`](Self::done).
pub struct IdleHandle<'a, S> {
    stream: &'a mut FramedStream<S>,
    counters: Arc<MailboxCounters>,
    tag: String,
    io_timeout: Duration,
}

impl<'a, S> IdleHandle<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) const fn new(
        stream: &'a mut FramedStream<S>,
        counters: Arc<MailboxCounters>,
        tag: String,
        io_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            counters,
            tag,
            io_timeout,
        }
    }

    /// Waits up to `timeout` for the next mailbox event.
    ///
    /// Untagged data with no event meaning (`* OK still here`) is
    /// absorbed and waiting continues within the same deadline.
    pub async fn wait(&mut self, timeout: Duration) -> Result<IdleEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let line = match tokio::time::timeout_at(deadline, self.stream.read_response()).await {
                Ok(line) => line?,
                Err(_) => return Ok(IdleEvent::Timeout),
            };
            if let Some(event) = self.event(&line)? {
                return Ok(event);
            }
        }
    }

    fn event(&self, line: &[u8]) -> Result<Option<IdleEvent>> {
        let response = match parse_response(line) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "skipping unparsable response during IDLE");
                return Ok(None);
            }
        };

        match response {
            Response::Untagged(UntaggedResponse::Exists(n)) => {
                trace!(exists = n, "mailbox size");
                self.counters.set_exists(n);
                Ok(Some(IdleEvent::Exists(n)))
            }
            Response::Untagged(UntaggedResponse::Recent(n)) => {
                trace!(recent = n, "recent count");
                self.counters.set_recent(n);
                Ok(Some(IdleEvent::Recent(n)))
            }
            Response::Untagged(UntaggedResponse::Expunge(seq)) => {
                let exists = self.counters.exists();
                self.counters.set_exists(exists.saturating_sub(1));
                Ok(Some(IdleEvent::Expunge(seq)))
            }
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                let flags = items
                    .into_iter()
                    .find_map(|item| match item {
                        FetchItem::Flags(flags) => Some(flags),
                        _ => None,
                    })
                    .unwrap_or_default();
                Ok(Some(IdleEvent::Flags { seq, flags }))
            }
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Bye,
                text,
                ..
            }) => Err(Error::Bye(text)),
            Response::Untagged(_) => Ok(None),
            Response::Tagged { tag, status, text, .. } if tag == self.tag => match status {
                Status::Ok => Err(Error::Protocol(format!("server ended IDLE: {text}"))),
                Status::No => Err(Error::No(text)),
                Status::Bad => Err(Error::Bad(text)),
                Status::Bye | Status::PreAuth => Err(Error::Bye(text)),
            },
            Response::Tagged { tag, .. } => Err(Error::Protocol(format!(
                "completion for {tag} during IDLE {}",
                self.tag
            ))),
            Response::Continuation { .. } => Ok(None),
        }
    }

    /// Sends `DONE` and waits for the IDLE completion.
    pub async fn done(self) -> Result<()> {
        debug!(tag = %self.tag, "ending IDLE");
        self.stream.write_raw(b"DONE\r\n").await?;
        loop {
            let line = tokio::time::timeout(self.io_timeout, self.stream.read_response())
                .await
                .map_err(|_| Error::Timeout(self.io_timeout))??;
            match parse_response(&line) {
                Ok(Response::Tagged { tag, status, text, .. }) if tag == self.tag => {
                    return match status {
                        Status::Ok => Ok(()),
                        Status::No => Err(Error::No(text)),
                        Status::Bad => Err(Error::Bad(text)),
                        Status::Bye | Status::PreAuth => Err(Error::Bye(text)),
                    };
                }
                Ok(Response::Untagged(UntaggedResponse::Exists(n))) => self.counters.set_exists(n),
                Ok(Response::Untagged(UntaggedResponse::Recent(n))) => self.counters.set_recent(n),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unparsable response after DONE"),
            }
        }
    }
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
    use crate::connection::{Client, Credentials};
    use tokio_test::io::{Builder, Mock};

    async fn selected(mock: Mock) -> Client<Mock> {
        let mut client = Client::from_stream(mock).await.unwrap();
        client
            .login(Some(&Credentials::new("u", "p")))
            .await
            .unwrap();
        client.select("INBOX").await.unwrap();
        client
    }

    fn prelude() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"* OK ready\r\n")
            .write(b"A00001 LOGIN u p\r\n")
            .read(b"A00001 OK\r\n")
            .write(b"A00002 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA00002 OK\r\n")
            .write(b"A00003 IDLE\r\n")
            .read(b"+ idling\r\n");
        builder
    }

    #[tokio::test]
    async fn test_idle_exists_then_done() {
        let mock = prelude()
            .read(b"* OK still here\r\n")
            .read(b"* 4 EXISTS\r\n")
            .write(b"DONE\r\n")
            .read(b"A00003 OK IDLE terminated\r\n")
            .build();
        let mut client = selected(mock).await;
        let counters = client.counters();

        let mut idle = client.idle().await.unwrap();
        let event = idle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(event, IdleEvent::Exists(4));
        idle.done().await.unwrap();

        assert_eq!(counters.exists(), 4);
    }

    #[tokio::test]
    async fn test_idle_flag_update() {
        let mock = prelude()
            .read(b"* 2 FETCH (FLAGS (\\Seen \\Deleted))\r\n")
            .write(b"DONE\r\n")
            .read(b"A00003 OK\r\n")
            .build();
        let mut client = selected(mock).await;
        let mut idle = client.idle().await.unwrap();
        assert_eq!(
            idle.wait(Duration::from_secs(5)).await.unwrap(),
            IdleEvent::Flags {
                seq: 2,
                flags: vec!["\\Seen".to_string(), "\\Deleted".to_string()],
            }
        );
        idle.done().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let mut server = FramedStream::new(server_io);
            server.write_raw(b"* OK ready\r\n").await.unwrap();
            assert_eq!(server.read_line().await.unwrap(), b"A00001 LOGIN u p\r\n");
            server.write_raw(b"A00001 OK\r\n").await.unwrap();
            assert_eq!(server.read_line().await.unwrap(), b"A00002 SELECT INBOX\r\n");
            server.write_raw(b"A00002 OK\r\n").await.unwrap();
            assert_eq!(server.read_line().await.unwrap(), b"A00003 IDLE\r\n");
            server.write_raw(b"+ idling\r\n").await.unwrap();
            assert_eq!(server.read_line().await.unwrap(), b"DONE\r\n");
            server.write_raw(b"A00003 OK\r\n").await.unwrap();
        });

        let mut client = Client::from_stream(client_io).await.unwrap();
        client
            .login(Some(&Credentials::new("u", "p")))
            .await
            .unwrap();
        client.select("INBOX").await.unwrap();

        let mut idle = client.idle().await.unwrap();
        assert_eq!(
            idle.wait(Duration::from_millis(50)).await.unwrap(),
            IdleEvent::Timeout
        );
        idle.done().await.unwrap();
        server.await.unwrap();
    }
}
