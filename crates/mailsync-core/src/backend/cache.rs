//! Folder cache shared between the worker and the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mailsync_mime::{Email, MessageFlags};

use crate::folder::FolderPath;

#[derive(Debug, Clone, Default)]
struct CachedFolder {
    info: FolderPath,
    messages: BTreeMap<usize, Email>,
}

type Folders = HashMap<Vec<String>, CachedFolder>;

/// Folders and messages seen by a local backend, keyed by path segments.
///
/// Clones share the same map. One lock guards the whole map and is held
/// only while copying in or out.
#[derive(Debug, Clone, Default)]
pub struct FolderCache {
    folders: Arc<Mutex<Folders>>,
}

impl FolderCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Folders> {
        self.folders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every known folder, sorted by path.
    #[must_use]
    pub fn folders(&self) -> Vec<FolderPath> {
        let mut folders: Vec<FolderPath> = self.lock().values().map(|f| f.info.clone()).collect();
        folders.sort_by(|a, b| a.segments().cmp(b.segments()));
        folders
    }

    /// Folder info with attributes, if listed.
    #[must_use]
    pub fn info(&self, path: &FolderPath) -> Option<FolderPath> {
        self.lock().get(path.segments()).map(|f| f.info.clone())
    }

    /// Copy of a cached message.
    #[must_use]
    pub fn message(&self, path: &FolderPath, index: usize) -> Option<Email> {
        self.lock()
            .get(path.segments())
            .and_then(|f| f.messages.get(&index).cloned())
    }

    /// Number of cached messages in a folder.
    #[must_use]
    pub fn len(&self, path: &FolderPath) -> Option<usize> {
        self.lock().get(path.segments()).map(|f| f.messages.len())
    }

    pub(crate) fn put_folder(&self, info: FolderPath) {
        let mut folders = self.lock();
        let folder = folders.entry(info.segments().to_vec()).or_default();
        folder.info = info;
    }

    pub(crate) fn put_message(&self, path: &FolderPath, email: Email) {
        let mut folders = self.lock();
        let folder = folders
            .entry(path.segments().to_vec())
            .or_insert_with(|| CachedFolder {
                info: path.clone(),
                messages: BTreeMap::new(),
            });
        folder.messages.insert(email.index, email);
    }

    pub(crate) fn set_flags(&self, path: &FolderPath, index: usize, flags: MessageFlags) {
        if let Some(email) = self
            .lock()
            .get_mut(path.segments())
            .and_then(|f| f.messages.get_mut(&index))
        {
            email.flags = flags;
        }
    }

    pub(crate) fn clear_messages(&self, path: &FolderPath) {
        if let Some(folder) = self.lock().get_mut(path.segments()) {
            folder.messages.clear();
        }
    }

    /// Drops a folder and everything below it.
    pub(crate) fn remove(&self, path: &FolderPath) {
        self.lock()
            .retain(|segments, _| !segments.starts_with(path.segments()));
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

    fn email(index: usize, subject: &str) -> Email {
        let mut email = Email::parse(format!("Subject: {subject}\n\nbody\n")).unwrap();
        email.index = index;
        email
    }

    #[test]
    fn test_shared_between_clones() {
        let cache = FolderCache::new();
        let reader = cache.clone();
        let inbox = FolderPath::parse("INBOX");

        cache.put_message(&inbox, email(3, "hello"));
        assert_eq!(reader.len(&inbox), Some(1));
        assert_eq!(reader.message(&inbox, 3).unwrap().subject(), Some("hello"));
        assert!(reader.message(&inbox, 0).is_none());

        cache.set_flags(&inbox, 3, MessageFlags::DELETED);
        assert_eq!(reader.message(&inbox, 3).unwrap().flags, MessageFlags::DELETED);

        cache.clear_messages(&inbox);
        assert_eq!(reader.len(&inbox), Some(0));
    }

    #[test]
    fn test_remove_subtree() {
        let cache = FolderCache::new();
        cache.put_folder(FolderPath::parse("Work"));
        cache.put_folder(FolderPath::parse("Work/2024"));
        cache.put_folder(FolderPath::parse("Personal"));

        cache.remove(&FolderPath::parse("Work"));
        let left: Vec<String> = cache.folders().iter().map(ToString::to_string).collect();
        assert_eq!(left, ["Personal"]);
        assert!(cache.info(&FolderPath::parse("Work/2024")).is_none());
    }
}
