//! Work submitted to an engine.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use mailsync_mime::{Email, MessageFlags};

use crate::folder::FolderPath;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Message positions within a folder, 0-based.
pub type Indices = BTreeSet<usize>;

/// What a request asks the backend to do.
///
/// Variant order is priority order: earlier variants are served first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Connect and authenticate, or check the mailbox root.
    Initialize,
    /// Replace the password used for later sessions.
    SetPassword {
        /// New password.
        password: String,
    },
    /// Report every folder.
    ListFolders,
    /// Create a folder.
    CreateFolder {
        /// Folder to create.
        path: FolderPath,
    },
    /// Delete a folder.
    DeleteFolder {
        /// Folder to delete.
        path: FolderPath,
    },
    /// Rename a folder.
    RenameFolder {
        /// Current location.
        from: FolderPath,
        /// New location.
        to: FolderPath,
    },
    /// Remove messages flagged as deleted.
    ExpungeFolder {
        /// Folder to expunge.
        path: FolderPath,
    },
    /// Report the folder's message counts, waiting briefly for changes.
    CheckRecent {
        /// Folder to check.
        path: FolderPath,
    },
    /// Report message headers. Empty indices means every message.
    ListMessages {
        /// Folder to list.
        path: FolderPath,
        /// Messages to list.
        indices: Indices,
    },
    /// Report full messages.
    LoadMessages {
        /// Folder holding the messages.
        path: FolderPath,
        /// Messages to load.
        indices: Indices,
    },
    /// Copy messages to another folder.
    CopyMessages {
        /// Source folder.
        from: FolderPath,
        /// Target folder.
        to: FolderPath,
        /// Messages to copy.
        indices: Indices,
    },
    /// Add a message to a folder.
    AppendMessage {
        /// Target folder.
        path: FolderPath,
        /// Complete message.
        email: Box<Email>,
    },
    /// Add flags to messages.
    SetFlags {
        /// Folder holding the messages.
        path: FolderPath,
        /// Messages to change.
        indices: Indices,
        /// Flags to add.
        flags: MessageFlags,
    },
    /// Remove flags from messages.
    UnsetFlags {
        /// Folder holding the messages.
        path: FolderPath,
        /// Messages to change.
        indices: Indices,
        /// Flags to remove.
        flags: MessageFlags,
    },
}

impl RequestKind {
    /// Position in the priority order, 0 being served first.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Initialize => 0,
            Self::SetPassword { .. } => 1,
            Self::ListFolders => 2,
            Self::CreateFolder { .. } => 3,
            Self::DeleteFolder { .. } => 4,
            Self::RenameFolder { .. } => 5,
            Self::ExpungeFolder { .. } => 6,
            Self::CheckRecent { .. } => 7,
            Self::ListMessages { .. } => 8,
            Self::LoadMessages { .. } => 9,
            Self::CopyMessages { .. } => 10,
            Self::AppendMessage { .. } => 11,
            Self::SetFlags { .. } => 12,
            Self::UnsetFlags { .. } => 13,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::SetPassword { .. } => "set-password",
            Self::ListFolders => "list-folders",
            Self::CreateFolder { .. } => "create-folder",
            Self::DeleteFolder { .. } => "delete-folder",
            Self::RenameFolder { .. } => "rename-folder",
            Self::ExpungeFolder { .. } => "expunge-folder",
            Self::CheckRecent { .. } => "check-recent",
            Self::ListMessages { .. } => "list-messages",
            Self::LoadMessages { .. } => "load-messages",
            Self::CopyMessages { .. } => "copy-messages",
            Self::AppendMessage { .. } => "append-message",
            Self::SetFlags { .. } => "set-flags",
            Self::UnsetFlags { .. } => "unset-flags",
        }
    }
}

/// A request with its process-wide id.
///
/// Ordering is queue priority: a lower kind rank is greater, and within
/// one kind the newer (higher) id is greater.
#[derive(Debug, Clone)]
pub struct Request {
    id: u64,
    kind: RequestKind,
}

impl Request {
    /// Assigns the next id.
    #[must_use]
    pub fn new(kind: RequestKind) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
        }
    }

    /// Process-wide id, strictly increasing.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The work requested.
    #[must_use]
    pub const fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Takes the work out of the request.
    #[must_use]
    pub fn into_kind(self) -> RequestKind {
        self.kind
    }
}

impl From<RequestKind> for Request {
    fn from(kind: RequestKind) -> Self {
        Self::new(kind)
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Request {}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Request {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .kind
            .rank()
            .cmp(&self.kind.rank())
            .then_with(|| self.id.cmp(&other.id))
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
    use proptest::prelude::*;
    use std::collections::BinaryHeap;

    fn list(path: &str) -> RequestKind {
        RequestKind::ListMessages {
            path: FolderPath::parse(path),
            indices: Indices::new(),
        }
    }

    #[test]
    fn test_ids_increase() {
        let a = Request::new(RequestKind::ListFolders);
        let b = Request::new(RequestKind::ListFolders);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_newer_same_kind_first() {
        let older = Request::new(list("INBOX"));
        let newer = Request::new(list("INBOX"));
        let (older_id, newer_id) = (older.id(), newer.id());

        let mut heap = BinaryHeap::new();
        heap.push(older);
        heap.push(newer);
        assert_eq!(heap.pop().unwrap().id(), newer_id);
        assert_eq!(heap.pop().unwrap().id(), older_id);
    }

    #[test]
    fn test_kind_rank_beats_recency() {
        let folders = Request::new(RequestKind::ListFolders);
        let messages = Request::new(list("INBOX"));
        let init = Request::new(RequestKind::Initialize);

        let mut heap: BinaryHeap<_> = [messages, folders, init].into_iter().collect();
        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|r| r.kind().name())
            .collect();
        assert_eq!(order, ["initialize", "list-folders", "list-messages"]);
    }

    fn any_kind() -> impl Strategy<Value = RequestKind> {
        prop_oneof![
            Just(RequestKind::Initialize),
            Just(RequestKind::ListFolders),
            Just(list("INBOX")),
            Just(RequestKind::ExpungeFolder {
                path: FolderPath::parse("INBOX"),
            }),
            Just(RequestKind::SetFlags {
                path: FolderPath::parse("INBOX"),
                indices: Indices::from([1]),
                flags: MessageFlags::SEEN,
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_heap_order(kinds in prop::collection::vec(any_kind(), 1..40)) {
            let mut heap: BinaryHeap<_> = kinds.into_iter().map(Request::new).collect();
            let mut previous: Option<Request> = None;
            while let Some(request) = heap.pop() {
                if let Some(prev) = &previous {
                    let rank = (prev.kind().rank(), request.kind().rank());
                    prop_assert!(rank.0 <= rank.1);
                    if rank.0 == rank.1 {
                        prop_assert!(prev.id() > request.id());
                    }
                }
                previous = Some(request);
            }
        }
    }
}
