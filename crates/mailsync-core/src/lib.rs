//! # mailsync-core
//!
//! Mailbox synchronization engine for mailsync.
//!
//! This crate provides:
//! - **Request engine** - [`AsyncServent`] runs a backend on a worker
//!   thread, serving requests by priority and queueing responses for the
//!   caller
//! - **Backends** - [`ImapBackend`] (one session per request) and
//!   [`MboxBackend`] (a directory of mbox files)
//! - **mbox index** - [`MboxIndex`] byte-offset table with scan, fill,
//!   remove and append
//! - **Account configuration** - JSON account files
//! - Domain models: [`FolderPath`], [`Request`], [`Response`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod config;
mod error;
pub mod folder;
pub mod mbox;
pub mod request;
pub mod response;
pub mod servent;

pub use backend::{BATCH, Backend, FolderCache, ImapBackend, MboxBackend};
pub use config::{AccountConfig, BackendConfig, ImapAccount, MboxAccount, Security};
pub use error::{Error, ErrorKind, Result};
pub use folder::{FolderAttributes, FolderPath};
pub use mbox::MboxIndex;
pub use request::{Indices, Request, RequestKind};
pub use response::Response;
pub use servent::{AsyncServent, RequestHandler, Responder, ResponseHandler};

pub use mailsync_mime::{Email, Headers, MessageFlags};
