//! Mailbox listing and status types.

use std::sync::atomic::{AtomicU32, Ordering};

/// Mailbox attribute from a LIST/LSUB response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxAttribute {
    /// Cannot have child mailboxes.
    NoInferiors,
    /// Cannot be selected.
    NoSelect,
    /// Marked as interesting by the server.
    Marked,
    /// Not marked.
    Unmarked,
    /// Has child mailboxes.
    HasChildren,
    /// Has no child mailboxes.
    HasNoChildren,
    /// Any other attribute, verbatim.
    Other(String),
}

impl MailboxAttribute {
    /// Parses an attribute such as `\Noselect`, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "\\noinferiors" => Self::NoInferiors,
            "\\noselect" | "\\nonexistent" => Self::NoSelect,
            "\\marked" => Self::Marked,
            "\\unmarked" => Self::Unmarked,
            "\\haschildren" => Self::HasChildren,
            "\\hasnochildren" => Self::HasNoChildren,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// One LIST or LSUB reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Attributes of the mailbox.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, if the server uses one.
    pub delimiter: Option<char>,
    /// Full mailbox name.
    pub name: String,
}

impl ListResponse {
    /// False when the server flags the mailbox `\Noselect`.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.contains(&MailboxAttribute::NoSelect)
    }

    /// False when the server flags `\Noinferiors`. `\HasNoChildren` only
    /// describes the current state and leaves room for new subfolders.
    #[must_use]
    pub fn may_have_children(&self) -> bool {
        !self.attributes.contains(&MailboxAttribute::NoInferiors)
    }

    /// Splits the name on the hierarchy delimiter.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        match self.delimiter {
            Some(delimiter) => self
                .name
                .split(delimiter)
                .map(str::to_string)
                .collect(),
            None => vec![self.name.clone()],
        }
    }
}

/// Last-known counts for the selected mailbox.
///
/// Each counter is updated independently as untagged responses arrive and
/// may be read from any thread.
#[derive(Debug, Default)]
pub struct MailboxCounters {
    exists: AtomicU32,
    recent: AtomicU32,
    unseen: AtomicU32,
}

/// Point-in-time copy of [`MailboxCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxStatus {
    /// Messages in the mailbox.
    pub exists: u32,
    /// Messages with the `\Recent` flag.
    pub recent: u32,
    /// Sequence number of the first unseen message, or 0.
    pub unseen: u32,
}

impl MailboxCounters {
    /// Messages in the mailbox.
    pub fn exists(&self) -> u32 {
        self.exists.load(Ordering::Acquire)
    }

    /// Recent messages.
    pub fn recent(&self) -> u32 {
        self.recent.load(Ordering::Acquire)
    }

    /// First unseen sequence number, or 0.
    pub fn unseen(&self) -> u32 {
        self.unseen.load(Ordering::Acquire)
    }

    pub(crate) fn set_exists(&self, n: u32) {
        self.exists.store(n, Ordering::Release);
    }

    pub(crate) fn set_recent(&self, n: u32) {
        self.recent.store(n, Ordering::Release);
    }

    pub(crate) fn set_unseen(&self, n: u32) {
        self.unseen.store(n, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.set_exists(0);
        self.set_recent(0);
        self.set_unseen(0);
    }

    /// Copies the current values.
    pub fn snapshot(&self) -> MailboxStatus {
        MailboxStatus {
            exists: self.exists(),
            recent: self.recent(),
            unseen: self.unseen(),
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

    #[test]
    fn test_attribute_parse() {
        assert_eq!(MailboxAttribute::parse("\\NoSelect"), MailboxAttribute::NoSelect);
        assert_eq!(MailboxAttribute::parse("\\HasChildren"), MailboxAttribute::HasChildren);
        assert_eq!(
            MailboxAttribute::parse("\\Junk"),
            MailboxAttribute::Other("\\Junk".to_string())
        );
    }

    #[test]
    fn test_list_response_flags() {
        let list = ListResponse {
            attributes: vec![MailboxAttribute::NoSelect, MailboxAttribute::HasChildren],
            delimiter: Some('/'),
            name: "Work/2024".to_string(),
        };
        assert!(!list.is_selectable());
        assert!(list.may_have_children());
        assert_eq!(list.segments(), vec!["Work", "2024"]);

        let leaf = ListResponse {
            attributes: vec![MailboxAttribute::NoInferiors],
            delimiter: None,
            name: "INBOX".to_string(),
        };
        assert!(leaf.is_selectable());
        assert!(!leaf.may_have_children());
        assert_eq!(leaf.segments(), vec!["INBOX"]);
    }

    #[test]
    fn test_has_no_children_can_still_gain_some() {
        let empty = ListResponse {
            attributes: vec![MailboxAttribute::HasNoChildren],
            delimiter: Some('.'),
            name: "Archive".to_string(),
        };
        assert!(empty.may_have_children());
    }

    #[test]
    fn test_counters_independent() {
        let counters = MailboxCounters::default();
        counters.set_exists(12);
        counters.set_unseen(3);
        assert_eq!(
            counters.snapshot(),
            MailboxStatus {
                exists: 12,
                recent: 0,
                unseen: 3
            }
        );
        counters.reset();
        assert_eq!(counters.snapshot(), MailboxStatus::default());
    }
}
