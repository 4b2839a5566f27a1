//! # mailsync-mime
//!
//! The email model shared by every mailsync backend.
//!
//! ## Features
//!
//! - **Headers**: ordered, case-insensitive, with folding and RFC 2047
//!   encoded-word decoding into UTF-8
//! - **Email**: recursive `multipart/*` and `message/rfc822` parsing into a
//!   tree of parts with decoded leaf bodies
//! - **Flags**: seen/answered/deleted state as a bitflag set
//! - **Ordering**: compare messages by date, size or any header
//!
//! ## Quick Start
//!
//! ```
//! use mailsync_mime::Email;
//!
//! let raw = "From: sender@example.com\r\n\
//!            Subject: =?UTF-8?B?SGVsbG8=?=\r\n\
//!            \r\n\
//!            Hello, World!";
//!
//! let email = Email::parse(raw)?;
//! assert_eq!(email.subject(), Some("Hello"));
//! assert_eq!(email.headers.charset("Subject"), Some("UTF-8"));
//! assert_eq!(email.text(), "Hello, World!");
//! # Ok::<(), mailsync_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod email;
mod error;
mod flags;
mod header;

pub mod encoding;

pub use content_type::ContentType;
pub use email::{Email, SortKey, TransferEncoding, Walk};
pub use error::{Error, Result};
pub use flags::MessageFlags;
pub use header::Headers;
