//! Client sessions against a scripted server.
//!
//! The mock replays a canned server transcript and records everything the
//! client writes, so each test checks both the resulting state and the exact
//! bytes on the wire.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailsync_imap::{Client, Credentials, Error, FetchMode, SequenceSet, SessionState, StoreOp};
use mailsync_mime::MessageFlags;

struct MockStream {
    script: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(script: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            script: Cursor::new(script.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = usize::try_from(self.script.position()).unwrap();
        let data = self.script.get_ref();
        let remaining = &data[pos.min(data.len())..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.script.set_position((pos + n) as u64);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

#[tokio::test]
async fn test_login_then_next_tag() {
    let (stream, sent) = MockStream::new(b"* OK ready\r\nA00001 OK done\r\nA00002 OK\r\n");
    let mut client = Client::from_stream(stream).await.unwrap();
    assert_eq!(client.state(), SessionState::NonAuthenticated);

    client
        .login(Some(&Credentials::new("u", "p")))
        .await
        .unwrap();
    assert_eq!(client.state(), SessionState::Authenticated);

    client.noop().await.unwrap();
    assert_eq!(sent_text(&sent), "A00001 LOGIN u p\r\nA00002 NOOP\r\n");
}

#[tokio::test]
async fn test_mailbox_session() {
    let script = concat!(
        "* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n",
        "A00001 OK LOGIN completed\r\n",
        "* 5 EXISTS\r\n",
        "* 0 RECENT\r\n",
        "* OK [UNSEEN 4] first unseen\r\n",
        "A00002 OK [READ-WRITE] SELECT completed\r\n",
        "* 1 FETCH (FLAGS (\\Seen) RFC822.SIZE 300 RFC822.HEADER {14}\r\n",
        "Subject: one\r\n",
        ")\r\n",
        "* 2 FETCH (FLAGS () RFC822.SIZE 400 RFC822.HEADER {14}\r\n",
        "Subject: two\r\n",
        ")\r\n",
        "A00003 OK FETCH completed\r\n",
        "A00004 OK STORE completed\r\n",
        "A00005 OK STORE completed\r\n",
        "A00006 OK COPY completed\r\n",
        "* 3 EXPUNGE\r\n",
        "* 1 EXPUNGE\r\n",
        "A00007 OK EXPUNGE completed\r\n",
        "A00008 OK CLOSE completed\r\n",
        "* BYE see you\r\n",
        "A00009 OK LOGOUT completed\r\n",
    );
    let (stream, sent) = MockStream::new(script.as_bytes());

    let mut client = Client::from_stream(stream)
        .await
        .unwrap()
        .with_credentials(Credentials::new("me", "secret pass"));
    assert!(client.supports_idle());
    client.login(None).await.unwrap();

    let status = client.select("INBOX").await.unwrap();
    assert_eq!((status.exists, status.recent, status.unseen), (5, 0, 4));

    let emails = client
        .fetch(&SequenceSet::from_indices([0, 1]), FetchMode::Headers)
        .await
        .unwrap();
    assert_eq!(emails.len(), 2);
    assert_eq!(emails[0].subject(), Some("one"));
    assert!(emails[0].flags.contains(MessageFlags::SEEN));
    assert_eq!(emails[1].index, 1);
    assert_eq!(emails[1].size(), 400);

    let targets = SequenceSet::from_indices([0, 2, 3]);
    client
        .store(&targets, StoreOp::Add, MessageFlags::DELETED)
        .await
        .unwrap();
    client
        .copy(&SequenceSet::from_indices([3, 4]), "Archive")
        .await
        .unwrap();
    assert_eq!(client.expunge().await.unwrap(), vec![3, 1]);
    client.close().await.unwrap();
    assert_eq!(client.state(), SessionState::Authenticated);
    client.logout().await.unwrap();
    assert_eq!(client.state(), SessionState::UnConnected);

    assert_eq!(
        sent_text(&sent),
        concat!(
            "A00001 LOGIN me \"secret pass\"\r\n",
            "A00002 SELECT INBOX\r\n",
            "A00003 FETCH 1:2 (FLAGS RFC822.SIZE RFC822.HEADER)\r\n",
            "A00004 STORE 1 +FLAGS.SILENT (\\Deleted)\r\n",
            "A00005 STORE 3:4 +FLAGS.SILENT (\\Deleted)\r\n",
            "A00006 COPY 4:5 Archive\r\n",
            "A00007 EXPUNGE\r\n",
            "A00008 CLOSE\r\n",
            "A00009 LOGOUT\r\n",
        )
    );
}

#[tokio::test]
async fn test_no_and_bad_are_typed() {
    let script = concat!(
        "* OK ready\r\n",
        "A00001 OK\r\n",
        "A00002 NO [TRYCREATE] Mailbox doesn't exist\r\n",
        "A00003 BAD Command unknown\r\n",
    );
    let (stream, _) = MockStream::new(script.as_bytes());
    let mut client = Client::from_stream(stream).await.unwrap();
    client
        .login(Some(&Credentials::new("u", "p")))
        .await
        .unwrap();

    let err = client.select("Missing").await.unwrap_err();
    assert!(matches!(err, Error::No(ref text) if text == "Mailbox doesn't exist"));
    assert_eq!(client.state(), SessionState::Authenticated);

    let err = client.create("x").await.unwrap_err();
    assert!(matches!(err, Error::Bad(_)));
}

#[tokio::test]
async fn test_server_closes_mid_command() {
    let (stream, _) = MockStream::new(b"* OK ready\r\n* 1 EXISTS\r\n");
    let mut client = Client::from_stream(stream).await.unwrap();
    let err = client
        .login(Some(&Credentials::new("u", "p")))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
