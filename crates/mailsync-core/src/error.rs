//! Error types for the core library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailsync_imap::Error),

    /// Message could not be parsed or built.
    #[error("Message error: {0}")]
    Mime(#[from] mailsync_mime::Error),

    /// I/O error not tied to a single file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a mailbox or configuration file.
    #[error("{}: {source}", path.display())]
    File {
        /// File the operation was working on.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Folder does not exist in the backend.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Operation not possible in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect, read or write failure.
    Transport,
    /// Server refused a command or sent something unexpected.
    Protocol,
    /// Malformed message, header or configuration data.
    Parse,
    /// Local file failure.
    File,
    /// Operation attempted in the wrong state.
    State,
}

impl Error {
    /// Wraps an I/O error with the file it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Imap(e) => match e {
                mailsync_imap::Error::Io(_)
                | mailsync_imap::Error::Tls(_)
                | mailsync_imap::Error::InvalidDnsName(_)
                | mailsync_imap::Error::Timeout(_) => ErrorKind::Transport,
                mailsync_imap::Error::InvalidState(_) => ErrorKind::State,
                mailsync_imap::Error::Mime(_) => ErrorKind::Parse,
                _ => ErrorKind::Protocol,
            },
            Self::Mime(_) | Self::Serde(_) | Self::Config(_) => ErrorKind::Parse,
            Self::Io(_) | Self::File { .. } => ErrorKind::File,
            Self::FolderNotFound(_) | Self::InvalidState(_) => ErrorKind::State,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    use std::io;
    use std::time::Duration;

    #[test]
    fn test_kind() {
        let transport = Error::from(mailsync_imap::Error::Timeout(Duration::from_secs(1)));
        assert_eq!(transport.kind(), ErrorKind::Transport);

        let refused = Error::from(mailsync_imap::Error::No("nope".to_string()));
        assert_eq!(refused.kind(), ErrorKind::Protocol);

        let malformed = Error::from(mailsync_imap::Error::Parse {
            position: 3,
            message: "bad".to_string(),
        });
        assert_eq!(malformed.kind(), ErrorKind::Protocol);

        let state = Error::from(mailsync_imap::Error::InvalidState("x".to_string()));
        assert_eq!(state.kind(), ErrorKind::State);

        let file = Error::file("/tmp/inbox", io::Error::other("disk"));
        assert_eq!(file.kind(), ErrorKind::File);
        assert_eq!(Error::Config("x".to_string()).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_file_display() {
        let err = Error::file("/mail/inbox", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.to_string(), "/mail/inbox: gone");
    }
}
