//! Local mbox backend.
//!
//! The root directory is the folder tree: subdirectories are parent
//! folders and regular files are mbox folders. Flag changes live in
//! memory until the folder is expunged.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mailsync_mime::{Email, MessageFlags};
use tracing::{debug, info};

use super::cache::FolderCache;
use super::{BATCH, targets};
use crate::folder::{FolderAttributes, FolderPath};
use crate::mbox::MboxIndex;
use crate::request::{Indices, Request, RequestKind};
use crate::response::Response;
use crate::servent::{RequestHandler, Responder};
use crate::{Error, Result};

/// Serves requests from a directory of mbox files.
#[derive(Debug)]
pub struct MboxBackend {
    root: PathBuf,
    indexes: HashMap<Vec<String>, MboxIndex>,
    cache: FolderCache,
}

impl MboxBackend {
    /// Creates a backend over `root`. Nothing is read until a request.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: HashMap::new(),
            cache: FolderCache::new(),
        }
    }

    /// The folder tree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A handle to the folder cache, readable while the worker runs.
    #[must_use]
    pub fn cache(&self) -> FolderCache {
        self.cache.clone()
    }

    fn file_path(&self, path: &FolderPath) -> Result<PathBuf> {
        if path.is_root() {
            return Err(Error::InvalidState("the root is not a folder".to_string()));
        }
        let mut file = self.root.clone();
        for segment in path.segments() {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['/', '\\'])
            {
                return Err(Error::InvalidState(format!(
                    "invalid folder name {segment:?}"
                )));
            }
            file.push(segment);
        }
        Ok(file)
    }

    /// Index for a folder, rescanned if the file changed. Also returns
    /// whether a scan happened.
    ///
    /// A rescan drops the folder's cached messages, since the old indices
    /// may now point at different messages or none.
    fn open_index(&mut self, path: &FolderPath) -> Result<(&mut MboxIndex, bool)> {
        let file = self.file_path(path)?;
        if !file.is_file() {
            return Err(Error::FolderNotFound(path.to_string()));
        }
        let index = self
            .indexes
            .entry(path.segments().to_vec())
            .or_insert_with(|| MboxIndex::new(file));
        let rescanned = index.is_modified();
        if rescanned {
            index.scan()?;
            self.cache.clear_messages(path);
        }
        Ok((index, rescanned))
    }

    fn initialize(&self, responses: &Responder) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::Config(format!(
                "mailbox root {} is not a directory",
                self.root.display()
            )));
        }
        info!(root = %self.root.display(), "mbox backend ready");
        responses.send(Response::Initialized);
        Ok(())
    }

    fn list_folders(&self, responses: &Responder) -> Result<()> {
        let mut folders = Vec::new();
        walk(&self.root, &FolderPath::default(), &mut folders)?;
        let count = folders.len();
        for path in folders {
            self.cache.put_folder(path.clone());
            responses.send(Response::FolderListed { path });
        }
        responses.send(Response::status(format!("{count} folders")));
        Ok(())
    }

    fn create_folder(&self, path: FolderPath, responses: &Responder) -> Result<()> {
        let file = self.file_path(&path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file(parent, e))?;
        }
        File::create_new(&file).map_err(|e| Error::file(&file, e))?;
        debug!(folder = %path, "created folder");
        responses.send(Response::FolderCreated { path });
        Ok(())
    }

    fn delete_folder(&mut self, path: FolderPath, responses: &Responder) -> Result<()> {
        let file = self.file_path(&path)?;
        let meta = fs::symlink_metadata(&file).map_err(|_| Error::FolderNotFound(path.to_string()))?;
        if meta.is_dir() {
            fs::remove_dir(&file).map_err(|e| Error::file(&file, e))?;
        } else {
            fs::remove_file(&file).map_err(|e| Error::file(&file, e))?;
        }
        self.forget(&path);
        debug!(folder = %path, "deleted folder");
        responses.send(Response::FolderDeleted { path });
        Ok(())
    }

    fn rename_folder(&mut self, from: FolderPath, to: FolderPath, responses: &Responder) -> Result<()> {
        let source = self.file_path(&from)?;
        let target = self.file_path(&to)?;
        if !source.exists() {
            return Err(Error::FolderNotFound(from.to_string()));
        }
        if target.exists() {
            return Err(Error::InvalidState(format!("folder {to} already exists")));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file(parent, e))?;
        }
        fs::rename(&source, &target).map_err(|e| Error::file(&source, e))?;
        self.forget(&from);
        debug!(from = %from, to = %to, "renamed folder");
        responses.send(Response::FolderRenamed { from, to });
        Ok(())
    }

    fn forget(&mut self, path: &FolderPath) {
        self.indexes
            .retain(|segments, _| !segments.starts_with(path.segments()));
        self.cache.remove(path);
    }

    fn expunge_folder(&mut self, path: FolderPath, responses: &Responder) -> Result<()> {
        let (index, _) = self.open_index(&path)?;
        let deleted: Vec<usize> = index
            .emails()
            .filter(|e| e.flags.contains(MessageFlags::DELETED))
            .map(|e| e.index)
            .collect();
        let removed = index.remove(deleted)?;
        index.scan()?;

        self.cache.clear_messages(&path);
        info!(folder = %path, removed, "expunged folder");
        responses.send(Response::status(format!("Removed {removed} messages from {path}")));
        responses.send(Response::FolderExpunged { path });
        Ok(())
    }

    fn check_recent(&mut self, path: FolderPath, responses: &Responder) -> Result<()> {
        let before = self.indexes.get(path.segments()).map(MboxIndex::len);
        let (index, rescanned) = self.open_index(&path)?;
        let exists = index.len();
        let recent = match before {
            Some(before) if rescanned => exists.saturating_sub(before),
            _ => 0,
        };
        let unseen = index
            .emails()
            .filter(|e| !e.flags.contains(MessageFlags::SEEN))
            .count();

        responses.send(Response::RecentChecked {
            path,
            exists: saturate(exists),
            recent: saturate(recent),
            unseen: saturate(unseen),
        });
        Ok(())
    }

    fn list_messages(&mut self, path: FolderPath, indices: &Indices, responses: &Responder) -> Result<()> {
        let (index, _) = self.open_index(&path)?;
        let emails: Vec<Email> = targets(indices, index.len())
            .into_iter()
            .filter_map(|i| index.get(i).cloned())
            .collect();
        self.report(&path, emails, responses, |path, email| Response::MessageListed {
            path,
            email,
        });
        Ok(())
    }

    fn load_messages(&mut self, path: FolderPath, indices: &Indices, responses: &Responder) -> Result<()> {
        let (index, _) = self.open_index(&path)?;
        let wanted = targets(indices, index.len());
        index.fill(wanted.iter().copied())?;
        let emails: Vec<Email> = wanted
            .into_iter()
            .filter_map(|i| index.get(i).cloned())
            .collect();
        self.report(&path, emails, responses, |path, email| Response::MessageLoaded {
            path,
            email,
        });
        Ok(())
    }

    fn report(
        &self,
        path: &FolderPath,
        emails: Vec<Email>,
        responses: &Responder,
        build: impl Fn(FolderPath, Box<Email>) -> Response,
    ) {
        let total = emails.len();
        for (n, email) in emails.into_iter().enumerate() {
            self.cache.put_message(path, email.clone());
            responses.send(build(path.clone(), Box::new(email)));
            let done = n + 1;
            if done % BATCH == 0 || done == total {
                responses.send(Response::Progress { done, total });
            }
        }
        responses.send(Response::status(format!("{total} messages in {path}")));
    }

    fn copy_messages(
        &mut self,
        from: FolderPath,
        to: FolderPath,
        indices: Indices,
        responses: &Responder,
    ) -> Result<()> {
        let (source, _) = self.open_index(&from)?;
        let wanted = targets(&indices, source.len());
        source.fill(wanted.iter().copied())?;
        let emails: Vec<Email> = wanted
            .into_iter()
            .filter_map(|i| source.get(i).cloned())
            .collect();

        let (target, _) = self.open_index(&to)?;
        target.append(&emails)?;
        debug!(from = %from, to = %to, count = emails.len(), "copied messages");
        responses.send(Response::MessagesCopied { from, to, indices });
        Ok(())
    }

    fn append_message(&mut self, path: FolderPath, email: &Email, responses: &Responder) -> Result<()> {
        let (index, _) = self.open_index(&path)?;
        index.append(std::slice::from_ref(email))?;
        responses.send(Response::MessageAppended { path });
        Ok(())
    }

    fn change_flags(
        &mut self,
        path: &FolderPath,
        indices: &Indices,
        flags: MessageFlags,
        add: bool,
    ) -> Result<()> {
        let (index, _) = self.open_index(path)?;
        let mut changed = Vec::new();
        for &i in indices {
            if let Some(email) = index.get_mut(i) {
                email.flags.set(flags, add);
                changed.push((i, email.flags));
            }
        }
        for (i, flags) in changed {
            self.cache.set_flags(path, i, flags);
        }
        Ok(())
    }
}

impl RequestHandler for MboxBackend {
    async fn handle(&mut self, request: Request, responses: &Responder) -> Result<()> {
        match request.into_kind() {
            RequestKind::Initialize => self.initialize(responses),
            RequestKind::SetPassword { .. } => {
                responses.send(Response::PasswordSet);
                Ok(())
            }
            RequestKind::ListFolders => self.list_folders(responses),
            RequestKind::CreateFolder { path } => self.create_folder(path, responses),
            RequestKind::DeleteFolder { path } => self.delete_folder(path, responses),
            RequestKind::RenameFolder { from, to } => self.rename_folder(from, to, responses),
            RequestKind::ExpungeFolder { path } => self.expunge_folder(path, responses),
            RequestKind::CheckRecent { path } => self.check_recent(path, responses),
            RequestKind::ListMessages { path, indices } => {
                self.list_messages(path, &indices, responses)
            }
            RequestKind::LoadMessages { path, indices } => {
                self.load_messages(path, &indices, responses)
            }
            RequestKind::CopyMessages { from, to, indices } => {
                self.copy_messages(from, to, indices, responses)
            }
            RequestKind::AppendMessage { path, email } => {
                self.append_message(path, &email, responses)
            }
            RequestKind::SetFlags {
                path,
                indices,
                flags,
            } => {
                self.change_flags(&path, &indices, flags, true)?;
                responses.send(Response::FlagsSet {
                    path,
                    indices,
                    flags,
                });
                Ok(())
            }
            RequestKind::UnsetFlags {
                path,
                indices,
                flags,
            } => {
                self.change_flags(&path, &indices, flags, false)?;
                responses.send(Response::FlagsUnset {
                    path,
                    indices,
                    flags,
                });
                Ok(())
            }
        }
    }
}

fn walk(dir: &Path, parent: &FolderPath, out: &mut Vec<FolderPath>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| Error::file(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::file(dir, e))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().map_err(|e| Error::file(entry.path(), e))?;
        let mtime = meta.modified().ok().map(DateTime::<Utc>::from);
        let path = parent.child(name);
        if meta.is_dir() {
            out.push(path.clone().with_attributes(FolderAttributes {
                is_parent: true,
                is_select: false,
                mtime,
            }));
            walk(&entry.path(), &path, out)?;
        } else if meta.is_file() {
            out.push(path.with_attributes(FolderAttributes {
                is_parent: false,
                is_select: true,
                mtime,
            }));
        }
    }
    Ok(())
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
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
    use crate::servent::AsyncServent;
    use tempfile::TempDir;

    const INBOX: &str = "From a@example.com Mon Jan  1 10:00:00 2024\n\
                         Subject: one\n\
                         \n\
                         First.\n\
                         From b@example.com Mon Jan  1 11:00:00 2024\n\
                         Subject: two\n\
                         Status: RO\n\
                         \n\
                         Second.\n";

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("INBOX"), INBOX).unwrap();
        fs::create_dir(dir.path().join("Work")).unwrap();
        fs::write(dir.path().join("Work").join("2024"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        dir
    }

    /// Runs one request synchronously and returns its responses.
    fn run(backend: &mut MboxBackend, kind: RequestKind) -> Vec<Response> {
        let engine = AsyncServent::new(MboxBackend::new("/unused"));
        let responder = engine.responder();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let result = rt.block_on(backend.handle(Request::new(kind), &responder));
        if let Err(e) = result {
            responder.send(Response::error(e.to_string()));
        }
        let mut out = Vec::new();
        engine.drain_responses(&mut |r: Response| out.push(r));
        out
    }

    #[test]
    fn test_list_folders() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let responses = run(&mut backend, RequestKind::ListFolders);

        let listed: Vec<(String, bool, bool)> = responses
            .iter()
            .filter_map(|r| match r {
                Response::FolderListed { path } => Some((
                    path.to_string(),
                    path.attributes.is_parent,
                    path.attributes.is_select,
                )),
                _ => None,
            })
            .collect();
        assert_eq!(
            listed,
            [
                ("INBOX".to_string(), false, true),
                ("Work".to_string(), true, false),
                ("Work/2024".to_string(), false, true),
            ]
        );
        assert_eq!(responses.last(), Some(&Response::status("3 folders")));
        assert_eq!(backend.cache().folders().len(), 3);
    }

    #[test]
    fn test_list_and_load() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let inbox = FolderPath::parse("INBOX");

        let responses = run(
            &mut backend,
            RequestKind::ListMessages {
                path: inbox.clone(),
                indices: Indices::new(),
            },
        );
        let subjects: Vec<_> = responses
            .iter()
            .filter_map(|r| match r {
                Response::MessageListed { email, .. } => email.subject().map(str::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(subjects, ["one", "two"]);
        assert!(responses.contains(&Response::Progress { done: 2, total: 2 }));
        assert_eq!(backend.cache().len(&inbox), Some(2));

        let responses = run(
            &mut backend,
            RequestKind::LoadMessages {
                path: inbox.clone(),
                indices: Indices::from([0]),
            },
        );
        let Response::MessageLoaded { email, .. } = &responses[0] else {
            panic!("expected a loaded message, got {responses:?}");
        };
        assert_eq!(email.text(), "First.\n");
        assert!(email.flags.contains(MessageFlags::SEEN));
        assert!(backend.cache().message(&inbox, 0).unwrap().is_complete());
    }

    #[test]
    fn test_rewritten_file_drops_cached_messages() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let inbox = FolderPath::parse("INBOX");
        let list = || RequestKind::ListMessages {
            path: FolderPath::parse("INBOX"),
            indices: Indices::new(),
        };

        run(&mut backend, list());
        assert_eq!(backend.cache().len(&inbox), Some(2));

        let first = INBOX.find("From b@").unwrap();
        fs::write(dir.path().join("INBOX"), &INBOX[..first]).unwrap();
        let responses = run(&mut backend, list());

        let listed = responses
            .iter()
            .filter(|r| matches!(r, Response::MessageListed { .. }))
            .count();
        assert_eq!(listed, 1);
        assert_eq!(backend.cache().len(&inbox), Some(1));
        assert!(backend.cache().message(&inbox, 1).is_none());
        assert_eq!(
            backend.cache().message(&inbox, 0).unwrap().subject(),
            Some("one")
        );
    }

    #[test]
    fn test_flag_and_expunge() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let inbox = FolderPath::parse("INBOX");

        let responses = run(
            &mut backend,
            RequestKind::SetFlags {
                path: inbox.clone(),
                indices: Indices::from([0, 9]),
                flags: MessageFlags::DELETED,
            },
        );
        assert!(matches!(responses[0], Response::FlagsSet { .. }));

        let responses = run(&mut backend, RequestKind::ExpungeFolder { path: inbox.clone() });
        assert_eq!(
            responses.last(),
            Some(&Response::FolderExpunged { path: inbox.clone() })
        );
        let text = fs::read_to_string(dir.path().join("INBOX")).unwrap();
        assert!(text.starts_with("From b@example.com"));
        assert!(!text.contains("Subject: one"));
    }

    #[test]
    fn test_unset_flags() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let inbox = FolderPath::parse("INBOX");
        run(
            &mut backend,
            RequestKind::UnsetFlags {
                path: inbox.clone(),
                indices: Indices::from([1]),
                flags: MessageFlags::SEEN,
            },
        );
        let responses = run(&mut backend, RequestKind::CheckRecent { path: inbox });
        assert!(matches!(
            responses[0],
            Response::RecentChecked {
                exists: 2,
                recent: 0,
                unseen: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_check_recent_counts_new_mail() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let inbox = FolderPath::parse("INBOX");
        run(&mut backend, RequestKind::CheckRecent { path: inbox.clone() });

        let email = Email::parse("Subject: three\n\nThird.\n").unwrap();
        run(
            &mut backend,
            RequestKind::AppendMessage {
                path: inbox.clone(),
                email: Box::new(email),
            },
        );
        let responses = run(&mut backend, RequestKind::CheckRecent { path: inbox.clone() });
        assert_eq!(
            responses,
            [Response::RecentChecked {
                path: inbox,
                exists: 3,
                recent: 1,
                unseen: 2,
            }]
        );
    }

    #[test]
    fn test_folder_lifecycle() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());
        let archive = FolderPath::parse("Archive/Old");
        let renamed = FolderPath::parse("Attic");

        let responses = run(&mut backend, RequestKind::CreateFolder { path: archive.clone() });
        assert_eq!(responses, [Response::FolderCreated { path: archive.clone() }]);
        assert!(dir.path().join("Archive").join("Old").is_file());

        let responses = run(&mut backend, RequestKind::CreateFolder { path: archive.clone() });
        assert!(responses[0].is_error());

        let responses = run(
            &mut backend,
            RequestKind::CopyMessages {
                from: FolderPath::parse("INBOX"),
                to: archive.clone(),
                indices: Indices::from([1]),
            },
        );
        assert!(matches!(responses[0], Response::MessagesCopied { .. }));
        assert!(
            fs::read_to_string(dir.path().join("Archive").join("Old"))
                .unwrap()
                .contains("Subject: two")
        );

        let responses = run(
            &mut backend,
            RequestKind::RenameFolder {
                from: archive.clone(),
                to: renamed.clone(),
            },
        );
        assert!(matches!(responses[0], Response::FolderRenamed { .. }));

        let responses = run(&mut backend, RequestKind::DeleteFolder { path: renamed.clone() });
        assert_eq!(responses, [Response::FolderDeleted { path: renamed }]);
        assert!(!dir.path().join("Attic").exists());
    }

    #[test]
    fn test_errors() {
        let dir = tree();
        let mut backend = MboxBackend::new(dir.path());

        let responses = run(
            &mut backend,
            RequestKind::ListMessages {
                path: FolderPath::parse("Missing"),
                indices: Indices::new(),
            },
        );
        assert_eq!(responses, [Response::error("Folder not found: Missing")]);

        let responses = run(
            &mut backend,
            RequestKind::CreateFolder {
                path: FolderPath::new(["..", "escape"]),
            },
        );
        assert!(responses[0].is_error());

        let mut missing_root = MboxBackend::new(dir.path().join("nope"));
        assert!(run(&mut missing_root, RequestKind::Initialize)[0].is_error());
        assert_eq!(run(&mut backend, RequestKind::Initialize), [Response::Initialized]);
    }
}
