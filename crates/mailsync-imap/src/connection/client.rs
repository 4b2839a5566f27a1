//! Session state machine.
//!
//! ```text
//! UnConnected --connect--> NonAuthenticated --login--> Authenticated
//!     ^                                          |  ^
//!     |                               select/examine  close
//!     |                                          v  |
//!     +------------- logout/disconnect ------- Selected
//! ```
//!
//! The state is tracked at runtime so a client can be torn down and reused
//! from any point; calling a command in the wrong state returns
//! [`Error::InvalidState`].

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use mailsync_mime::{Email, MessageFlags};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use super::config::{Config, Credentials};
use super::framed::FramedStream;
use super::idle::IdleHandle;
use super::stream::{self, ImapStream};
use crate::command::{Command, FetchMode, StoreOp, TagGenerator};
use crate::parser::{FetchItem, Response, ResponseCode, UntaggedResponse, parse_response};
use crate::types::{ListResponse, MailboxCounters, MailboxStatus, SequenceSet, Status};
use crate::{Error, Result};

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the session is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport.
    UnConnected,
    /// Greeted, not logged in.
    NonAuthenticated,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected,
}

/// IMAP client over any async byte stream.
pub struct Client<S> {
    stream: Option<FramedStream<S>>,
    state: SessionState,
    tags: TagGenerator,
    capabilities: Vec<String>,
    counters: Arc<MailboxCounters>,
    selected: Option<String>,
    credentials: Option<Credentials>,
    io_timeout: Duration,
}

impl Client<ImapStream> {
    /// Connects and reads the greeting, retrying transient failures.
    ///
    /// Attempt `n` is preceded by a sleep of `n - 1` times
    /// `config.retry_delay`. Non-transient errors (TLS, bad greeting)
    /// fail immediately.
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut attempt = 1;
        loop {
            match Self::open(config).await {
                Ok(client) => return Ok(client),
                Err(e) if e.is_transient() && attempt < config.connect_attempts => {
                    warn!(
                        host = %config.host,
                        attempt,
                        max = config.connect_attempts,
                        error = %e,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open(config: &Config) -> Result<Self> {
        let stream = stream::connect(config).await?;
        let mut client = Self::greet(stream, config.io_timeout).await?;
        client.credentials.clone_from(&config.credentials);
        Ok(client)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and consumes the server greeting.
    ///
    /// `* OK` leaves the session NonAuthenticated, `* PREAUTH` goes straight
    /// to Authenticated. Anything else is rejected.
    pub async fn from_stream(stream: S) -> Result<Self> {
        Self::greet(stream, DEFAULT_IO_TIMEOUT).await
    }

    async fn greet(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut client = Self {
            stream: Some(FramedStream::new(stream)),
            state: SessionState::UnConnected,
            tags: TagGenerator::new(),
            capabilities: Vec::new(),
            counters: Arc::new(MailboxCounters::default()),
            selected: None,
            credentials: None,
            io_timeout,
        };

        let line = client.read().await?;
        let greeting = parse_response(&line).map_err(|e| {
            Error::Protocol(format!("invalid greeting ({e}): {}", String::from_utf8_lossy(&line).trim_end()))
        })?;

        match greeting {
            Response::Untagged(UntaggedResponse::Condition { status, code, text }) => {
                if let Some(code) = &code {
                    client.track_code(code);
                }
                client.state = match status {
                    Status::Ok => SessionState::NonAuthenticated,
                    Status::PreAuth => SessionState::Authenticated,
                    Status::Bye => return Err(Error::Bye(text)),
                    Status::No | Status::Bad => {
                        return Err(Error::Protocol(format!("server refused connection: {text}")));
                    }
                };
                debug!(state = ?client.state, "greeting received");
                Ok(client)
            }
            other => Err(Error::Protocol(format!("expected greeting, got {other:?}"))),
        }
    }

    /// Sets the credentials [`login`](Self::login) falls back to.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the limit on waiting for each server response.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Capabilities from the greeting or the last CAPABILITY data.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Case-insensitive capability check.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// True if the server advertised IDLE.
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.has_capability("IDLE")
    }

    /// Shared counters for the selected mailbox.
    #[must_use]
    pub fn counters(&self) -> Arc<MailboxCounters> {
        Arc::clone(&self.counters)
    }

    /// Snapshot of the selected mailbox counters.
    #[must_use]
    pub fn status(&self) -> MailboxStatus {
        self.counters.snapshot()
    }

    /// Name of the selected mailbox.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Issues `command` and waits for its tagged completion.
    ///
    /// Returns the untagged data received in between. Counter updates are
    /// applied as they arrive.
    pub async fn execute(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        command.check()?;
        let tag = self.tags.next();
        debug!(tag = %tag, command = %command, "sending command");
        self.framed()?.write_command(&command.serialize(&tag)).await?;
        self.collect(&tag).await
    }

    /// LOGIN with `credentials`, or the session default when `None`.
    pub async fn login(&mut self, credentials: Option<&Credentials>) -> Result<()> {
        self.require(&[SessionState::NonAuthenticated], "LOGIN")?;
        let credentials = credentials
            .or(self.credentials.as_ref())
            .cloned()
            .ok_or_else(|| Error::InvalidState("LOGIN without credentials".to_string()))?;

        debug!(username = "<redacted>", "logging in");
        self.execute(&Command::Login {
            username: credentials.username,
            password: credentials.password,
        })
        .await?;
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// SELECT a mailbox read-write.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open_mailbox(Command::Select {
            mailbox: mailbox.to_string(),
        })
        .await
    }

    /// EXAMINE a mailbox read-only.
    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open_mailbox(Command::Examine {
            mailbox: mailbox.to_string(),
        })
        .await
    }

    async fn open_mailbox(&mut self, command: Command) -> Result<MailboxStatus> {
        self.require(
            &[SessionState::Authenticated, SessionState::Selected],
            "SELECT",
        )?;
        let mailbox = match &command {
            Command::Select { mailbox } | Command::Examine { mailbox } => mailbox.clone(),
            _ => return Err(Error::InvalidState("not a mailbox command".to_string())),
        };
        command.check()?;

        self.counters.reset();
        self.selected = None;
        if self.state == SessionState::Selected {
            self.state = SessionState::Authenticated;
        }

        self.execute(&command).await?;
        self.state = SessionState::Selected;
        self.selected = Some(mailbox);
        Ok(self.counters.snapshot())
    }

    /// CLOSE the selected mailbox, expunging deleted messages.
    pub async fn close(&mut self) -> Result<()> {
        self.require(&[SessionState::Selected], "CLOSE")?;
        self.execute(&Command::Close).await?;
        self.state = SessionState::Authenticated;
        self.selected = None;
        Ok(())
    }

    /// EXPUNGE; returns the expunged sequence numbers in server order.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        self.require(&[SessionState::Selected], "EXPUNGE")?;
        let untagged = self.execute(&Command::Expunge).await?;
        Ok(untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Expunge(seq) => Some(seq),
                _ => None,
            })
            .collect())
    }

    /// LIST mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        self.require_authenticated("LIST")?;
        let untagged = self
            .execute(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::List(list) => Some(list),
                _ => None,
            })
            .collect())
    }

    /// LSUB subscribed mailboxes matching `pattern`.
    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        self.require_authenticated("LSUB")?;
        let untagged = self
            .execute(&Command::Lsub {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Lsub(list) => Some(list),
                _ => None,
            })
            .collect())
    }

    /// CREATE a mailbox.
    pub async fn create(&mut self, mailbox: &str) -> Result<()> {
        self.require_authenticated("CREATE")?;
        self.execute(&Command::Create {
            mailbox: mailbox.to_string(),
        })
        .await
        .map(drop)
    }

    /// DELETE a mailbox.
    pub async fn delete(&mut self, mailbox: &str) -> Result<()> {
        self.require_authenticated("DELETE")?;
        self.execute(&Command::Delete {
            mailbox: mailbox.to_string(),
        })
        .await
        .map(drop)
    }

    /// RENAME a mailbox.
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.require_authenticated("RENAME")?;
        self.execute(&Command::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
        .await
        .map(drop)
    }

    /// SUBSCRIBE to a mailbox.
    pub async fn subscribe(&mut self, mailbox: &str) -> Result<()> {
        self.require_authenticated("SUBSCRIBE")?;
        self.execute(&Command::Subscribe {
            mailbox: mailbox.to_string(),
        })
        .await
        .map(drop)
    }

    /// UNSUBSCRIBE from a mailbox.
    pub async fn unsubscribe(&mut self, mailbox: &str) -> Result<()> {
        self.require_authenticated("UNSUBSCRIBE")?;
        self.execute(&Command::Unsubscribe {
            mailbox: mailbox.to_string(),
        })
        .await
        .map(drop)
    }

    /// NOOP; returns whatever untagged data the server flushed.
    pub async fn noop(&mut self) -> Result<Vec<UntaggedResponse>> {
        self.require_connected("NOOP")?;
        self.execute(&Command::Noop).await
    }

    /// CAPABILITY; refreshes [`capabilities`](Self::capabilities).
    pub async fn capability(&mut self) -> Result<&[String]> {
        self.require_connected("CAPABILITY")?;
        self.execute(&Command::Capability).await?;
        Ok(&self.capabilities)
    }

    /// FETCH messages and build an [`Email`] for each.
    ///
    /// `Email::index` is the sequence number minus one. A full fetch marks
    /// the message seen locally, mirroring the server's implicit `\Seen`.
    pub async fn fetch(&mut self, sequence: &SequenceSet, mode: FetchMode) -> Result<Vec<Email>> {
        self.require(&[SessionState::Selected], "FETCH")?;
        if sequence.is_empty() {
            return Ok(Vec::new());
        }

        let untagged = self
            .execute(&Command::Fetch {
                sequence: sequence.clone(),
                mode,
            })
            .await?;

        let mut emails = Vec::with_capacity(sequence.len());
        for response in untagged {
            let UntaggedResponse::Fetch { seq, items } = response else {
                continue;
            };
            if let Some(email) = build_email(seq, items, mode)? {
                emails.push(email);
            }
        }
        Ok(emails)
    }

    /// STORE flag changes, one command per contiguous range.
    pub async fn store(
        &mut self,
        sequence: &SequenceSet,
        op: StoreOp,
        flags: MessageFlags,
    ) -> Result<()> {
        self.require(&[SessionState::Selected], "STORE")?;
        let names: Vec<String> = flags.imap_names().into_iter().map(str::to_string).collect();
        if names.is_empty() {
            return Ok(());
        }
        for range in sequence.ranges() {
            self.execute(&Command::Store {
                sequence: SequenceSet::from(*range),
                op,
                flags: names.clone(),
            })
            .await?;
        }
        Ok(())
    }

    /// COPY messages, one command per contiguous range.
    pub async fn copy(&mut self, sequence: &SequenceSet, mailbox: &str) -> Result<()> {
        self.require(&[SessionState::Selected], "COPY")?;
        for range in sequence.ranges() {
            self.execute(&Command::Copy {
                sequence: SequenceSet::from(*range),
                mailbox: mailbox.to_string(),
            })
            .await?;
        }
        Ok(())
    }

    /// APPEND a message as a synchronizing literal.
    ///
    /// Bare LF line endings are sent as CRLF; the literal size counts the
    /// bytes actually sent.
    pub async fn append(
        &mut self,
        mailbox: &str,
        flags: MessageFlags,
        message: &[u8],
    ) -> Result<()> {
        self.require_authenticated("APPEND")?;
        let message = to_crlf(message);
        let message = message.as_ref();
        let command = Command::Append {
            mailbox: mailbox.to_string(),
            flags: flags.imap_names().into_iter().map(str::to_string).collect(),
            size: message.len(),
        };
        command.check()?;
        let tag = self.tags.next();
        debug!(tag = %tag, command = %command, "sending command");
        self.framed()?.write_command(&command.serialize(&tag)).await?;
        self.await_continuation(&tag).await?;

        let framed = self.framed()?;
        framed.write_raw(message).await?;
        framed.write_raw(b"\r\n").await?;
        self.collect(&tag).await.map(drop)
    }

    /// Enters IDLE. The returned handle must be finished with
    /// [`IdleHandle::done`] before the client is used again.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        self.require(&[SessionState::Selected], "IDLE")?;
        let tag = self.tags.next();
        debug!(tag = %tag, "sending command IDLE");
        self.framed()?.write_command(&Command::Idle.serialize(&tag)).await?;
        self.await_continuation(&tag).await?;

        let counters = Arc::clone(&self.counters);
        let io_timeout = self.io_timeout;
        let framed = self.framed()?;
        Ok(IdleHandle::new(framed, counters, tag, io_timeout))
    }

    /// LOGOUT and drop the transport.
    ///
    /// A connection closed right after BYE is not an error.
    pub async fn logout(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        let result = match self.execute(&Command::Logout).await {
            Ok(_) | Err(Error::Io(_) | Error::Bye(_)) => Ok(()),
            Err(e) => Err(e),
        };
        self.disconnect().await;
        result
    }

    /// Drops the transport without LOGOUT.
    pub async fn disconnect(&mut self) {
        if let Some(mut framed) = self.stream.take() {
            if let Err(e) = framed.shutdown().await {
                trace!(error = %e, "shutdown after disconnect");
            }
        }
        self.state = SessionState::UnConnected;
        self.selected = None;
        self.counters.reset();
    }

    fn framed(&mut self) -> Result<&mut FramedStream<S>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("not connected".to_string()))
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let timeout = self.io_timeout;
        let framed = self.framed()?;
        tokio::time::timeout(timeout, framed.read_response())
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Reads until the completion for `tag`.
    async fn collect(&mut self, tag: &str) -> Result<Vec<UntaggedResponse>> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read().await?;
            let response = match parse_response(&line) {
                Ok(response) => response,
                Err(e) if line.starts_with(tag.as_bytes()) => return Err(e),
                Err(e) => {
                    warn!(error = %e, line = %String::from_utf8_lossy(&line).trim_end(), "skipping unparsable response");
                    continue;
                }
            };

            match response {
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } if got == tag => {
                    if let Some(code) = &code {
                        self.track_code(code);
                    }
                    trace!(tag = %tag, ?status, "command completed");
                    return match status {
                        Status::Ok => Ok(untagged),
                        Status::No => Err(Error::No(text)),
                        Status::Bad => Err(Error::Bad(text)),
                        Status::Bye => Err(Error::Bye(text)),
                        Status::PreAuth => Err(Error::Protocol(format!("tagged PREAUTH: {text}"))),
                    };
                }
                Response::Tagged { tag: got, .. } => {
                    warn!(expected = %tag, got = %got, "ignoring completion for unknown tag");
                }
                Response::Untagged(response) => {
                    self.track(&response);
                    untagged.push(response);
                }
                Response::Continuation { text } => {
                    return Err(Error::Protocol(format!("unexpected continuation: {text}")));
                }
            }
        }
    }

    /// Reads until `+`, failing if `tag` completes first.
    async fn await_continuation(&mut self, tag: &str) -> Result<()> {
        loop {
            let line = self.read().await?;
            match parse_response(&line)? {
                Response::Continuation { .. } => return Ok(()),
                Response::Untagged(response) => self.track(&response),
                Response::Tagged {
                    tag: got,
                    status,
                    text,
                    ..
                } if got == tag => {
                    return Err(match status {
                        Status::No => Error::No(text),
                        Status::Bad => Error::Bad(text),
                        Status::Bye => Error::Bye(text),
                        Status::Ok | Status::PreAuth => {
                            Error::Protocol(format!("completed without continuation: {text}"))
                        }
                    });
                }
                Response::Tagged { tag: got, .. } => {
                    warn!(expected = %tag, got = %got, "ignoring completion for unknown tag");
                }
            }
        }
    }

    fn track(&mut self, response: &UntaggedResponse) {
        match response {
            UntaggedResponse::Exists(n) => {
                trace!(exists = n, "mailbox size");
                self.counters.set_exists(*n);
            }
            UntaggedResponse::Recent(n) => {
                trace!(recent = n, "recent count");
                self.counters.set_recent(*n);
            }
            UntaggedResponse::Capability(caps) => self.capabilities.clone_from(caps),
            UntaggedResponse::Condition {
                code: Some(code), ..
            } => self.track_code(code),
            _ => {}
        }
    }

    fn track_code(&mut self, code: &ResponseCode) {
        match code {
            ResponseCode::Unseen(n) => {
                trace!(unseen = n, "first unseen");
                self.counters.set_unseen(*n);
            }
            ResponseCode::Capability(caps) => self.capabilities.clone_from(caps),
            _ => {}
        }
    }

    fn require(&self, allowed: &[SessionState], command: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{command} not allowed in state {:?}",
                self.state
            )))
        }
    }

    fn require_authenticated(&self, command: &str) -> Result<()> {
        self.require(
            &[SessionState::Authenticated, SessionState::Selected],
            command,
        )
    }

    fn require_connected(&self, command: &str) -> Result<()> {
        self.require(
            &[
                SessionState::NonAuthenticated,
                SessionState::Authenticated,
                SessionState::Selected,
            ],
            command,
        )
    }
}

/// Turns one FETCH response into an [`Email`]; `None` when it carries no
/// message data (e.g. an unsolicited flag update).
fn build_email(seq: u32, items: Vec<FetchItem>, mode: FetchMode) -> Result<Option<Email>> {
    let mut flags = MessageFlags::empty();
    let mut size = None;
    let mut data = None;

    for item in items {
        match item {
            FetchItem::Flags(names) => {
                flags = names
                    .iter()
                    .filter_map(|n| MessageFlags::from_imap(n))
                    .collect();
            }
            FetchItem::Rfc822Size(n) => size = Some(n as usize),
            FetchItem::Rfc822(bytes) | FetchItem::Rfc822Header(bytes) => data = Some(bytes),
            _ => {}
        }
    }

    let Some(data) = data else {
        return Ok(None);
    };

    let mut email = match mode {
        FetchMode::Full => {
            flags |= MessageFlags::SEEN;
            Email::parse(data)?
        }
        FetchMode::Headers => {
            let size = size.unwrap_or(data.len());
            Email::parse_headers(data, size)
        }
    };
    email.flags = flags;
    email.index = (seq as usize).saturating_sub(1);
    Ok(Some(email))
}

/// Rewrites bare LF line endings as CRLF.
fn to_crlf(message: &[u8]) -> Cow<'_, [u8]> {
    let bare = message
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'\n' && (i == 0 || message[i - 1] != b'\r'))
        .count();
    if bare == 0 {
        return Cow::Borrowed(message);
    }
    let mut out = Vec::with_capacity(message.len() + bare);
    for (i, &b) in message.iter().enumerate() {
        if b == b'\n' && (i == 0 || message[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(b);
    }
    Cow::Owned(out)
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
    use tokio_test::io::{Builder, Mock};

    async fn logged_in(mock: Mock) -> Client<Mock> {
        let mut client = Client::from_stream(mock).await.unwrap();
        client
            .login(Some(&Credentials::new("u", "p")))
            .await
            .unwrap();
        client
    }

    fn session() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"* OK ready\r\n")
            .write(b"A00001 LOGIN u p\r\n")
            .read(b"A00001 OK done\r\n");
        builder
    }

    #[tokio::test]
    async fn test_login_transitions_and_next_tag() {
        let mock = session()
            .write(b"A00002 NOOP\r\n")
            .read(b"A00002 OK\r\n")
            .build();
        let mut client = logged_in(mock).await;
        assert_eq!(client.state(), SessionState::Authenticated);
        client.noop().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_uses_session_credentials() {
        let mock = session().build();
        let mut client = Client::from_stream(mock)
            .await
            .unwrap()
            .with_credentials(Credentials::new("u", "p"));
        client.login(None).await.unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A00001 LOGIN u bad\r\n")
            .read(b"A00001 NO [AUTHENTICATIONFAILED] invalid\r\n")
            .build();
        let mut client = Client::from_stream(mock).await.unwrap();
        let err = client
            .login(Some(&Credentials::new("u", "bad")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::No(ref text) if text == "invalid"));
        assert_eq!(client.state(), SessionState::NonAuthenticated);
    }

    #[tokio::test]
    async fn test_preauth_greeting() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 IDLE] welcome back\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
        assert!(client.supports_idle());
    }

    #[tokio::test]
    async fn test_bad_greeting() {
        let mock = Builder::new().read(b"HTTP/1.1 400 Bad Request\r\n").build();
        let err = Client::from_stream(mock).await.err().unwrap();
        assert!(matches!(err, Error::Protocol(_)));

        let mock = Builder::new().read(b"* BYE busy\r\n").build();
        let err = Client::from_stream(mock).await.err().unwrap();
        assert!(matches!(err, Error::Bye(_)));
    }

    #[tokio::test]
    async fn test_wrong_state() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut client = Client::from_stream(mock).await.unwrap();
        let err = client.select("INBOX").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let err = client.login(None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_select_updates_counters() {
        let mock = session()
            .write(b"A00002 SELECT INBOX\r\n")
            .read(b"* 172 EXISTS\r\n")
            .read(b"* 1 RECENT\r\n")
            .read(b"* OK [UNSEEN 12] Message 12 is first unseen\r\n")
            .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
            .read(b"A00002 OK [READ-WRITE] SELECT completed\r\n")
            .build();
        let mut client = logged_in(mock).await;
        let status = client.select("INBOX").await.unwrap();
        assert_eq!(
            status,
            MailboxStatus {
                exists: 172,
                recent: 1,
                unseen: 12
            }
        );
        assert_eq!(client.state(), SessionState::Selected);
        assert_eq!(client.selected(), Some("INBOX"));
    }

    #[tokio::test]
    async fn test_list_and_unparsable_line() {
        let mock = session()
            .write(b"A00002 LIST \"\" \"*\"\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
            .read(b"* LIST ( garbage\r\n")
            .read(b"* LIST (\\Noselect \\HasChildren) \"/\" Work\r\n")
            .read(b"A00002 OK LIST completed\r\n")
            .build();
        let mut client = logged_in(mock).await;
        let folders = client.list("", "*").await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "INBOX");
        assert!(!folders[1].is_selectable());
    }

    #[tokio::test]
    async fn test_fetch_headers_and_full() {
        let header = b"Subject: Hi\r\nFrom: a@b.c\r\n\r\n";
        let full = b"Subject: Hi\r\n\r\nbody";
        let mut header_line = format!(
            "* 1 FETCH (FLAGS (\\Answered) RFC822.SIZE 100 RFC822.HEADER {{{}}}\r\n",
            header.len()
        )
        .into_bytes();
        header_line.extend_from_slice(header);
        header_line.extend_from_slice(b")\r\n");
        let mut full_line =
            format!("* 2 FETCH (FLAGS () RFC822.SIZE {} RFC822 {{{}}}\r\n", full.len(), full.len())
                .into_bytes();
        full_line.extend_from_slice(full);
        full_line.extend_from_slice(b")\r\n");

        let mock = session()
            .write(b"A00002 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\nA00002 OK\r\n")
            .write(b"A00003 FETCH 1 (FLAGS RFC822.SIZE RFC822.HEADER)\r\n")
            .read(&header_line)
            .read(b"A00003 OK\r\n")
            .write(b"A00004 FETCH 2 (FLAGS RFC822.SIZE RFC822)\r\n")
            .read(&full_line)
            .read(b"A00004 OK\r\n")
            .build();
        let mut client = logged_in(mock).await;
        client.select("INBOX").await.unwrap();

        let heads = client
            .fetch(&SequenceSet::from_indices([0]), FetchMode::Headers)
            .await
            .unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].index, 0);
        assert_eq!(heads[0].subject(), Some("Hi"));
        assert_eq!(heads[0].size(), 100);
        assert!(!heads[0].is_complete());
        assert_eq!(heads[0].flags, MessageFlags::ANSWERED);

        let bodies = client
            .fetch(&SequenceSet::from_indices([1]), FetchMode::Full)
            .await
            .unwrap();
        assert_eq!(bodies[0].index, 1);
        assert_eq!(bodies[0].text(), "body");
        assert_eq!(bodies[0].flags, MessageFlags::SEEN);
    }

    #[tokio::test]
    async fn test_store_one_command_per_range() {
        let mock = session()
            .write(b"A00002 SELECT INBOX\r\n")
            .read(b"A00002 OK\r\n")
            .write(b"A00003 STORE 1:3 +FLAGS.SILENT (\\Deleted)\r\n")
            .read(b"A00003 OK\r\n")
            .write(b"A00004 STORE 6 +FLAGS.SILENT (\\Deleted)\r\n")
            .read(b"A00004 OK\r\n")
            .build();
        let mut client = logged_in(mock).await;
        client.select("INBOX").await.unwrap();
        client
            .store(
                &SequenceSet::from_indices([0, 1, 2, 5]),
                StoreOp::Add,
                MessageFlags::DELETED,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_append_literal() {
        let mock = session()
            .write(b"A00002 APPEND Drafts (\\Seen) {5}\r\n")
            .read(b"+ Ready for literal data\r\n")
            .write(b"hello")
            .write(b"\r\n")
            .read(b"A00002 OK APPEND completed\r\n")
            .build();
        let mut client = logged_in(mock).await;
        client
            .append("Drafts", MessageFlags::SEEN, b"hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_append_sends_crlf() {
        let mock = session()
            .write(b"A00002 APPEND INBOX {17}\r\n")
            .read(b"+ go ahead\r\n")
            .write(b"Subject: s\r\n\r\nb\r\n")
            .write(b"\r\n")
            .read(b"A00002 OK APPEND completed\r\n")
            .build();
        let mut client = logged_in(mock).await;
        client
            .append("INBOX", MessageFlags::empty(), b"Subject: s\n\r\nb\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_line_break_in_name_is_never_sent() {
        let mock = session()
            .write(b"A00002 NOOP\r\n")
            .read(b"A00002 OK\r\n")
            .build();
        let mut client = logged_in(mock).await;

        let err = client.create("x\r\nA9 DELETE INBOX").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        let err = client
            .append("Caf\u{e9}", MessageFlags::empty(), b"b\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(client.state(), SessionState::Authenticated);

        // Rejected commands do not consume a tag.
        client.noop().await.unwrap();
    }

    #[test]
    fn test_to_crlf() {
        assert!(matches!(to_crlf(b"a\r\nb\r\n"), Cow::Borrowed(_)));
        assert_eq!(to_crlf(b"\na\nb\r\n").as_ref(), b"\r\na\r\nb\r\n");
        assert_eq!(to_crlf(b"").as_ref(), b"");
    }

    #[tokio::test]
    async fn test_append_refused() {
        let mock = session()
            .write(b"A00002 APPEND Nope {5}\r\n")
            .read(b"A00002 NO [TRYCREATE] no such mailbox\r\n")
            .build();
        let mut client = logged_in(mock).await;
        let err = client
            .append("Nope", MessageFlags::empty(), b"hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::No(_)));
    }

    #[tokio::test]
    async fn test_logout_tolerates_close() {
        let mock = session()
            .write(b"A00002 LOGOUT\r\n")
            .read(b"* BYE logging out\r\n")
            .build();
        let mut client = logged_in(mock).await;
        client.logout().await.unwrap();
        assert_eq!(client.state(), SessionState::UnConnected);
        assert!(matches!(
            client.noop().await.unwrap_err(),
            Error::InvalidState(_)
        ));
    }
}
