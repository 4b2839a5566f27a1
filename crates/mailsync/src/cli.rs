//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mailsync_core::{FolderPath, Indices, MessageFlags, RequestKind, Response};

#[derive(Debug, Parser)]
#[command(name = "mailsync", version, about = "Browse and tidy IMAP and mbox mailboxes")]
pub struct Cli {
    /// Account file (defaults to the user config directory).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Read the IMAP password from this environment variable.
    #[arg(long, global = true, default_value = "MAILSYNC_PASSWORD")]
    pub password_env: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List folders.
    Folders,
    /// List message headers in a folder.
    List { folder: String },
    /// Print a message.
    Show { folder: String, index: usize },
    /// Wait briefly for new mail and print folder counts.
    Check { folder: String },
    /// Set a flag on a message.
    Flag {
        folder: String,
        index: usize,
        flag: Flag,
    },
    /// Clear a flag on a message.
    Unflag {
        folder: String,
        index: usize,
        flag: Flag,
    },
    /// Copy messages to another folder.
    Copy {
        from: String,
        to: String,
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Append a message file to a folder.
    Append { folder: String, file: PathBuf },
    /// Permanently remove messages flagged deleted.
    Expunge { folder: String },
    /// Create a folder.
    Mkdir { folder: String },
    /// Delete a folder.
    Rmdir { folder: String },
    /// Rename a folder.
    Rename { from: String, to: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Flag {
    Seen,
    Answered,
    Deleted,
}

impl From<Flag> for MessageFlags {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::Seen => Self::SEEN,
            Flag::Answered => Self::ANSWERED,
            Flag::Deleted => Self::DELETED,
        }
    }
}

impl Command {
    /// The engine request for this command. `Append` needs the parsed
    /// message and is built by the caller.
    pub fn request(&self) -> Option<RequestKind> {
        Some(match self {
            Self::Folders => RequestKind::ListFolders,
            Self::List { folder } => RequestKind::ListMessages {
                path: FolderPath::parse(folder),
                indices: Indices::new(),
            },
            Self::Show { folder, index } => RequestKind::LoadMessages {
                path: FolderPath::parse(folder),
                indices: Indices::from([*index]),
            },
            Self::Check { folder } => RequestKind::CheckRecent {
                path: FolderPath::parse(folder),
            },
            Self::Flag {
                folder,
                index,
                flag,
            } => RequestKind::SetFlags {
                path: FolderPath::parse(folder),
                indices: Indices::from([*index]),
                flags: (*flag).into(),
            },
            Self::Unflag {
                folder,
                index,
                flag,
            } => RequestKind::UnsetFlags {
                path: FolderPath::parse(folder),
                indices: Indices::from([*index]),
                flags: (*flag).into(),
            },
            Self::Copy {
                from,
                to,
                indices: list,
            } => RequestKind::CopyMessages {
                from: FolderPath::parse(from),
                to: FolderPath::parse(to),
                indices: list.iter().copied().collect(),
            },
            Self::Append { .. } => return None,
            Self::Expunge { folder } => RequestKind::ExpungeFolder {
                path: FolderPath::parse(folder),
            },
            Self::Mkdir { folder } => RequestKind::CreateFolder {
                path: FolderPath::parse(folder),
            },
            Self::Rmdir { folder } => RequestKind::DeleteFolder {
                path: FolderPath::parse(folder),
            },
            Self::Rename { from, to } => RequestKind::RenameFolder {
                from: FolderPath::parse(from),
                to: FolderPath::parse(to),
            },
        })
    }
}

/// True once `response` completes the request `kind`.
///
/// Listings end with a summary status; everything else ends with its
/// own confirmation.
pub const fn is_final(kind: &RequestKind, response: &Response) -> bool {
    match (kind, response) {
        (_, Response::Error { .. } | Response::LoginError { .. })
        | (RequestKind::Initialize, Response::Initialized)
        | (RequestKind::SetPassword { .. }, Response::PasswordSet)
        | (
            RequestKind::ListFolders
            | RequestKind::ListMessages { .. }
            | RequestKind::LoadMessages { .. },
            Response::Status { .. },
        )
        | (RequestKind::CreateFolder { .. }, Response::FolderCreated { .. })
        | (RequestKind::DeleteFolder { .. }, Response::FolderDeleted { .. })
        | (RequestKind::RenameFolder { .. }, Response::FolderRenamed { .. })
        | (RequestKind::ExpungeFolder { .. }, Response::FolderExpunged { .. })
        | (RequestKind::CheckRecent { .. }, Response::RecentChecked { .. })
        | (RequestKind::CopyMessages { .. }, Response::MessagesCopied { .. })
        | (RequestKind::AppendMessage { .. }, Response::MessageAppended { .. })
        | (RequestKind::SetFlags { .. }, Response::FlagsSet { .. })
        | (RequestKind::UnsetFlags { .. }, Response::FlagsUnset { .. }) => true,
        _ => false,
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

    #[test]
    fn test_parse_flag_command() {
        let cli = Cli::try_parse_from(["mailsync", "flag", "Work/2024", "3", "deleted"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(
            cli.command.request(),
            Some(RequestKind::SetFlags {
                path: FolderPath::parse("Work/2024"),
                indices: Indices::from([3]),
                flags: MessageFlags::DELETED,
            })
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert!(Cli::try_parse_from(["mailsync", "flag", "INBOX", "seen"]).is_err());
        assert!(Cli::try_parse_from(["mailsync", "flag", "INBOX", "1", "starred"]).is_err());
        assert!(Cli::try_parse_from(["mailsync", "copy", "INBOX", "Archive"]).is_err());
    }

    #[test]
    fn test_copy_indices() {
        let cli = Cli::try_parse_from(["mailsync", "copy", "INBOX", "Archive", "4", "2", "4"]).unwrap();
        assert_eq!(
            cli.command.request(),
            Some(RequestKind::CopyMessages {
                from: FolderPath::parse("INBOX"),
                to: FolderPath::parse("Archive"),
                indices: Indices::from([2, 4]),
            })
        );
    }

    #[test]
    fn test_global_config() {
        let cli = Cli::try_parse_from(["mailsync", "folders", "--config", "/tmp/a.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.json")));
        assert_eq!(cli.password_env, "MAILSYNC_PASSWORD");
        assert_eq!(cli.command.request(), Some(RequestKind::ListFolders));
    }

    #[test]
    fn test_append_is_built_by_caller() {
        let cli = Cli::try_parse_from(["mailsync", "append", "INBOX", "msg.eml"]).unwrap();
        assert!(cli.command.request().is_none());
    }

    #[test]
    fn test_is_final() {
        let list = RequestKind::ListFolders;
        assert!(!is_final(&list, &Response::Progress { done: 1, total: 2 }));
        assert!(is_final(&list, &Response::status("2 folders")));
        assert!(is_final(&list, &Response::error("gone")));

        let expunge = RequestKind::ExpungeFolder {
            path: FolderPath::parse("INBOX"),
        };
        assert!(!is_final(&expunge, &Response::status("Removed 1 messages from INBOX")));
        assert!(is_final(
            &expunge,
            &Response::FolderExpunged {
                path: FolderPath::parse("INBOX"),
            }
        ));
    }
}
