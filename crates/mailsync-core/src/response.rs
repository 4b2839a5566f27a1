//! Results reported by an engine.

use mailsync_mime::{Email, MessageFlags};

use crate::folder::FolderPath;
use crate::request::Indices;

/// One notification from the worker.
///
/// A request may produce several responses, e.g. one per listed message
/// followed by a [`Status`](Self::Status).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Session established or mailbox root available.
    Initialized,
    /// `Initialize` failed.
    LoginError {
        /// Failure text.
        message: String,
    },
    /// A request failed.
    Error {
        /// Failure text.
        message: String,
    },
    /// Informational text, usually the last response of a request.
    Status {
        /// Text to show.
        message: String,
    },
    /// Batch progress of a listing or load.
    Progress {
        /// Messages handled so far.
        done: usize,
        /// Messages in the request.
        total: usize,
    },
    /// New password stored.
    PasswordSet,
    /// One folder, with its attributes.
    FolderListed {
        /// The folder.
        path: FolderPath,
    },
    /// Folder created.
    FolderCreated {
        /// The folder.
        path: FolderPath,
    },
    /// Folder deleted.
    FolderDeleted {
        /// The folder.
        path: FolderPath,
    },
    /// Folder renamed.
    FolderRenamed {
        /// Old location.
        from: FolderPath,
        /// New location.
        to: FolderPath,
    },
    /// Deleted messages removed.
    FolderExpunged {
        /// The folder.
        path: FolderPath,
    },
    /// Current counts for a folder.
    RecentChecked {
        /// The folder.
        path: FolderPath,
        /// Messages in the folder.
        exists: u32,
        /// Messages new since the last check.
        recent: u32,
        /// Messages without the seen flag.
        unseen: u32,
    },
    /// Headers of one message.
    MessageListed {
        /// Folder holding the message.
        path: FolderPath,
        /// Headers-only message; `email.index` is its position.
        email: Box<Email>,
    },
    /// One complete message.
    MessageLoaded {
        /// Folder holding the message.
        path: FolderPath,
        /// Parsed message; `email.index` is its position.
        email: Box<Email>,
    },
    /// Messages copied.
    MessagesCopied {
        /// Source folder.
        from: FolderPath,
        /// Target folder.
        to: FolderPath,
        /// Source positions.
        indices: Indices,
    },
    /// Message appended.
    MessageAppended {
        /// Target folder.
        path: FolderPath,
    },
    /// Flags added.
    FlagsSet {
        /// Folder holding the messages.
        path: FolderPath,
        /// Changed messages.
        indices: Indices,
        /// Added flags.
        flags: MessageFlags,
    },
    /// Flags removed.
    FlagsUnset {
        /// Folder holding the messages.
        path: FolderPath,
        /// Changed messages.
        indices: Indices,
        /// Removed flags.
        flags: MessageFlags,
    },
}

impl Response {
    /// Shorthand for [`Response::Status`].
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Shorthand for [`Response::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// True for [`Error`](Self::Error) and [`LoginError`](Self::LoginError).
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::LoginError { .. })
    }
}
