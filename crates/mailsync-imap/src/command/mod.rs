//! IMAP commands and their wire form.

mod serialize;
mod tag_generator;

use std::fmt;

pub use tag_generator::TagGenerator;

use crate::error::Result;
use crate::types::SequenceSet;
use serialize::{check_astring, write_astring, write_flag_list};

/// How much of each message FETCH retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// `FLAGS RFC822.SIZE RFC822.HEADER`
    Headers,
    /// `FLAGS RFC822.SIZE RFC822`
    Full,
}

impl FetchMode {
    const fn items(self) -> &'static str {
        match self {
            Self::Headers => "(FLAGS RFC822.SIZE RFC822.HEADER)",
            Self::Full => "(FLAGS RFC822.SIZE RFC822)",
        }
    }
}

/// Direction of a STORE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// `+FLAGS.SILENT`
    Add,
    /// `-FLAGS.SILENT`
    Remove,
}

/// A command the client can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY
    Capability,
    /// NOOP
    Noop,
    /// LOGOUT
    Logout,
    /// LOGIN
    Login {
        /// User name.
        username: String,
        /// Password. Never shown by `Display`.
        password: String,
    },
    /// SELECT
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// EXAMINE
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// CREATE
    Create {
        /// Mailbox name.
        mailbox: String,
    },
    /// DELETE
    Delete {
        /// Mailbox name.
        mailbox: String,
    },
    /// RENAME
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// SUBSCRIBE
    Subscribe {
        /// Mailbox name.
        mailbox: String,
    },
    /// UNSUBSCRIBE
    Unsubscribe {
        /// Mailbox name.
        mailbox: String,
    },
    /// LIST
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// LSUB
    Lsub {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// APPEND header line; the literal follows after continuation.
    Append {
        /// Target mailbox.
        mailbox: String,
        /// Initial flags.
        flags: Vec<String>,
        /// Literal length in bytes.
        size: usize,
    },
    /// CLOSE
    Close,
    /// EXPUNGE
    Expunge,
    /// FETCH
    Fetch {
        /// Messages to fetch.
        sequence: SequenceSet,
        /// Items to fetch.
        mode: FetchMode,
    },
    /// STORE, always silent.
    Store {
        /// Messages to change.
        sequence: SequenceSet,
        /// Add or remove.
        op: StoreOp,
        /// Flags to change.
        flags: Vec<String>,
    },
    /// COPY
    Copy {
        /// Messages to copy.
        sequence: SequenceSet,
        /// Destination mailbox.
        mailbox: String,
    },
    /// IDLE
    Idle,
}

impl Command {
    /// Checks that every string argument fits in a quoted string.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`](crate::Error::Protocol) when an argument holds
    /// CR, LF, NUL or 8-bit bytes.
    pub fn check(&self) -> Result<()> {
        match self {
            Self::Login { username, password } => {
                check_astring("user name", username)?;
                check_astring("password", password)
            }
            Self::Select { mailbox }
            | Self::Examine { mailbox }
            | Self::Create { mailbox }
            | Self::Delete { mailbox }
            | Self::Subscribe { mailbox }
            | Self::Unsubscribe { mailbox }
            | Self::Append { mailbox, .. }
            | Self::Copy { mailbox, .. } => check_astring("mailbox name", mailbox),
            Self::Rename { from, to } => {
                check_astring("mailbox name", from)?;
                check_astring("mailbox name", to)
            }
            Self::List { reference, pattern } | Self::Lsub { reference, pattern } => {
                check_astring("list reference", reference)?;
                check_astring("list pattern", pattern)
            }
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::Close
            | Self::Expunge
            | Self::Idle
            | Self::Fetch { .. }
            | Self::Store { .. } => Ok(()),
        }
    }

    /// Serializes the command with its tag and trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Select { mailbox } => mailbox_command(&mut buf, "SELECT", mailbox),
            Self::Examine { mailbox } => mailbox_command(&mut buf, "EXAMINE", mailbox),
            Self::Create { mailbox } => mailbox_command(&mut buf, "CREATE", mailbox),
            Self::Delete { mailbox } => mailbox_command(&mut buf, "DELETE", mailbox),
            Self::Subscribe { mailbox } => mailbox_command(&mut buf, "SUBSCRIBE", mailbox),
            Self::Unsubscribe { mailbox } => mailbox_command(&mut buf, "UNSUBSCRIBE", mailbox),

            Self::Rename { from, to } => {
                buf.extend_from_slice(b"RENAME ");
                write_astring(&mut buf, from);
                buf.push(b' ');
                write_astring(&mut buf, to);
            }

            Self::List { reference, pattern } | Self::Lsub { reference, pattern } => {
                let verb: &[u8] = if matches!(self, Self::List { .. }) {
                    b"LIST "
                } else {
                    b"LSUB "
                };
                buf.extend_from_slice(verb);
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::Append {
                mailbox,
                flags,
                size,
            } => {
                buf.extend_from_slice(b"APPEND ");
                write_astring(&mut buf, mailbox);
                if !flags.is_empty() {
                    buf.push(b' ');
                    write_flag_list(&mut buf, flags);
                }
                buf.extend_from_slice(format!(" {{{size}}}").as_bytes());
            }

            Self::Fetch { sequence, mode } => {
                buf.extend_from_slice(format!("FETCH {sequence} {}", mode.items()).as_bytes());
            }

            Self::Store {
                sequence,
                op,
                flags,
            } => {
                let sign = match op {
                    StoreOp::Add => '+',
                    StoreOp::Remove => '-',
                };
                buf.extend_from_slice(format!("STORE {sequence} {sign}FLAGS.SILENT ").as_bytes());
                write_flag_list(&mut buf, flags);
            }

            Self::Copy { sequence, mailbox } => {
                buf.extend_from_slice(format!("COPY {sequence} ").as_bytes());
                write_astring(&mut buf, mailbox);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

fn mailbox_command(buf: &mut Vec<u8>, verb: &str, mailbox: &str) {
    buf.extend_from_slice(verb.as_bytes());
    buf.push(b' ');
    write_astring(buf, mailbox);
}

/// Log form of the command, with credentials replaced.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Self::Login { .. } = self {
            return f.write_str("LOGIN <redacted> <redacted>");
        }
        let bytes = self.serialize("");
        let text = String::from_utf8_lossy(&bytes);
        f.write_str(text.trim())
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

    fn wire(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize("A00001")).unwrap()
    }

    #[test]
    fn test_login() {
        let cmd = Command::Login {
            username: "u".into(),
            password: "p".into(),
        };
        assert_eq!(wire(&cmd), "A00001 LOGIN u p\r\n");
        assert_eq!(cmd.to_string(), "LOGIN <redacted> <redacted>");
    }

    #[test]
    fn test_select_quotes_spaces() {
        let cmd = Command::Select {
            mailbox: "Sent Items".into(),
        };
        assert_eq!(wire(&cmd), "A00001 SELECT \"Sent Items\"\r\n");
        assert_eq!(cmd.to_string(), "SELECT \"Sent Items\"");
    }

    #[test]
    fn test_check_rejects_line_breaks() {
        let cmd = Command::Rename {
            from: "Old".into(),
            to: "New\r\nA2 DELETE INBOX".into(),
        };
        assert!(matches!(cmd.check(), Err(crate::Error::Protocol(_))));

        let login = Command::Login {
            username: "u".into(),
            password: "p\nq".into(),
        };
        let err = login.check().unwrap_err().to_string();
        assert!(err.contains("password"));
        assert!(!err.contains("p\nq"));

        let copy = Command::Copy {
            sequence: SequenceSet::range(1, 1).unwrap(),
            mailbox: "Archive".into(),
        };
        assert!(copy.check().is_ok());
        assert!(Command::Noop.check().is_ok());
    }

    #[test]
    fn test_fetch_modes() {
        let sequence = SequenceSet::range(1, 50).unwrap();
        let cmd = Command::Fetch {
            sequence: sequence.clone(),
            mode: FetchMode::Headers,
        };
        assert_eq!(
            wire(&cmd),
            "A00001 FETCH 1:50 (FLAGS RFC822.SIZE RFC822.HEADER)\r\n"
        );
        let cmd = Command::Fetch {
            sequence,
            mode: FetchMode::Full,
        };
        assert_eq!(wire(&cmd), "A00001 FETCH 1:50 (FLAGS RFC822.SIZE RFC822)\r\n");
    }

    #[test]
    fn test_store_and_copy() {
        let sequence = SequenceSet::from_indices([0, 1, 2]);
        let cmd = Command::Store {
            sequence: sequence.clone(),
            op: StoreOp::Remove,
            flags: vec!["\\Seen".into()],
        };
        assert_eq!(wire(&cmd), "A00001 STORE 1:3 -FLAGS.SILENT (\\Seen)\r\n");

        let cmd = Command::Copy {
            sequence,
            mailbox: "Archive".into(),
        };
        assert_eq!(wire(&cmd), "A00001 COPY 1:3 Archive\r\n");
    }

    #[test]
    fn test_append_header() {
        let cmd = Command::Append {
            mailbox: "INBOX".into(),
            flags: vec!["\\Seen".into()],
            size: 42,
        };
        assert_eq!(wire(&cmd), "A00001 APPEND INBOX (\\Seen) {42}\r\n");
    }

    #[test]
    fn test_list_and_lsub() {
        let cmd = Command::List {
            reference: String::new(),
            pattern: "*".into(),
        };
        assert_eq!(wire(&cmd), "A00001 LIST \"\" \"*\"\r\n");
        let cmd = Command::Lsub {
            reference: String::new(),
            pattern: "*".into(),
        };
        assert_eq!(wire(&cmd), "A00001 LSUB \"\" \"*\"\r\n");
    }
}
