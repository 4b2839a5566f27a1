//! # mailsync-imap
//!
//! IMAP4rev1 client used by the mailsync IMAP backend.
//!
//! ## Features
//!
//! - **Runtime session state**: `UnConnected` → `NonAuthenticated` →
//!   `Authenticated` → `Selected`, checked on every command
//! - **Tag correlation**: `A00001`, `A00002`, ... matched against tagged
//!   completions; NO/BAD/BYE become typed errors
//! - **Mailbox counters**: EXISTS/RECENT/UNSEEN tracked as untagged data
//!   arrives, readable from other threads
//! - **Literals**: FETCH bodies read by exact byte count, APPEND streamed
//!   after the `+` continuation
//! - **IDLE** with an explicit timeout per wait
//! - **TLS via rustls**, connection retry on transient failures
//! - **Sans-I/O parser** separate from the network layer
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use mailsync_imap::{Client, Config, FetchMode, IdleEvent, SequenceSet};
//!
//! # async fn run() -> mailsync_imap::Result<()> {
//! let config = Config::builder("imap.example.com")
//!     .credentials("me@example.com", "secret")
//!     .build();
//! let mut client = Client::connect(&config).await?;
//! client.login(None).await?;
//!
//! for folder in client.list("", "*").await? {
//!     println!("{}", folder.name);
//! }
//!
//! let status = client.select("INBOX").await?;
//! if let Some(all) = SequenceSet::range(1, status.exists) {
//!     for email in client.fetch(&all, FetchMode::Headers).await? {
//!         println!("{}: {:?}", email.index, email.subject());
//!     }
//! }
//!
//! if client.supports_idle() {
//!     let mut idle = client.idle().await?;
//!     if let IdleEvent::Exists(n) = idle.wait(Duration::from_secs(30)).await? {
//!         println!("now {n} messages");
//!     }
//!     idle.done().await?;
//! }
//!
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command model and serialization
//! - [`connection`]: transport, framing, client and IDLE
//! - [`parser`]: response parser
//! - [`types`]: mailbox and sequence types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchMode, StoreOp, TagGenerator};
pub use connection::{
    Client, Config, ConfigBuilder, Credentials, FramedStream, IdleEvent, IdleHandle, ImapStream,
    Security, SessionState,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseCode, UntaggedResponse, parse_response};
pub use types::{
    ListResponse, MailboxAttribute, MailboxCounters, MailboxStatus, SeqRange, SequenceSet, Status,
};
