//! Message state flags.

use bitflags::bitflags;

bitflags! {
    /// Per-message state shared by every backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u8 {
        /// Message has been read.
        const SEEN = 1 << 0;
        /// Message has been replied to.
        const ANSWERED = 1 << 1;
        /// Message is marked for removal on the next expunge.
        const DELETED = 1 << 2;
    }
}

impl MessageFlags {
    /// Maps an IMAP system flag (`\Seen`, `\Answered`, `\Deleted`).
    ///
    /// Other flags are not tracked and map to `None`.
    #[must_use]
    pub fn from_imap(flag: &str) -> Option<Self> {
        let name = flag.strip_prefix('\\')?;
        if name.eq_ignore_ascii_case("seen") {
            Some(Self::SEEN)
        } else if name.eq_ignore_ascii_case("answered") {
            Some(Self::ANSWERED)
        } else if name.eq_ignore_ascii_case("deleted") {
            Some(Self::DELETED)
        } else {
            None
        }
    }

    /// IMAP names of the set flags, in a fixed order.
    #[must_use]
    pub fn imap_names(self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.contains(Self::SEEN) {
            names.push("\\Seen");
        }
        if self.contains(Self::ANSWERED) {
            names.push("\\Answered");
        }
        if self.contains(Self::DELETED) {
            names.push("\\Deleted");
        }
        names
    }

    /// Reads an mbox `Status` / `X-Status` header value (`RO`, `A`, `D`).
    #[must_use]
    pub fn from_mbox_status(value: &str) -> Self {
        let mut flags = Self::empty();
        for c in value.chars() {
            match c {
                'R' => flags |= Self::SEEN,
                'A' => flags |= Self::ANSWERED,
                'D' => flags |= Self::DELETED,
                _ => {}
            }
        }
        flags
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
    fn test_from_imap() {
        assert_eq!(MessageFlags::from_imap("\\SEEN"), Some(MessageFlags::SEEN));
        assert_eq!(MessageFlags::from_imap("\\Flagged"), None);
        assert_eq!(MessageFlags::from_imap("Seen"), None);
    }

    #[test]
    fn test_imap_names_order() {
        let flags = MessageFlags::DELETED | MessageFlags::SEEN;
        assert_eq!(flags.imap_names(), vec!["\\Seen", "\\Deleted"]);
        assert!(MessageFlags::empty().imap_names().is_empty());
    }

    #[test]
    fn test_from_mbox_status() {
        assert_eq!(MessageFlags::from_mbox_status("RO"), MessageFlags::SEEN);
        assert_eq!(
            MessageFlags::from_mbox_status("AD"),
            MessageFlags::ANSWERED | MessageFlags::DELETED
        );
    }
}
