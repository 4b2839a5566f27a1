//! Offset index over an mbox file.
//!
//! Messages are located by scanning for `From ` at the start of a line.
//! A scan reads only each message's header block; bodies are read by
//! exact byte range on [`MboxIndex::fill`].

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use mailsync_mime::{Email, MessageFlags};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::{Error, Result};

const ENVELOPE: &[u8] = b"From ";

/// Divide table and message cache for one mbox file.
#[derive(Debug, Clone)]
pub struct MboxIndex {
    path: PathBuf,
    divide: Vec<u64>,
    data: BTreeMap<usize, Email>,
    filled: Vec<bool>,
    len: u64,
    mtime: Option<SystemTime>,
}

impl MboxIndex {
    /// Creates an empty index. Nothing is read until [`scan`](Self::scan).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            divide: Vec::new(),
            data: BTreeMap::new(),
            filled: Vec::new(),
            len: 0,
            mtime: None,
        }
    }

    /// The mbox file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages found by the last scan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.divide.len()
    }

    /// True if the last scan found no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.divide.is_empty()
    }

    /// Start offset of every message.
    #[must_use]
    pub fn divide(&self) -> &[u64] {
        &self.divide
    }

    /// Cached message at `index`, headers-only unless filled.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Email> {
        self.data.get(&index)
    }

    /// Mutable cached message, e.g. to change flags.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Email> {
        self.data.get_mut(&index)
    }

    /// Every cached message in folder order.
    pub fn emails(&self) -> impl Iterator<Item = &Email> {
        self.data.values()
    }

    /// True if message `index` has been read in full.
    #[must_use]
    pub fn is_filled(&self, index: usize) -> bool {
        self.filled.get(index).copied().unwrap_or(false)
    }

    /// True if the index is stale: never scanned, or the file changed
    /// since the last scan.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        let Some(mtime) = self.mtime else {
            return true;
        };
        fs::metadata(&self.path).map_or(true, |meta| {
            meta.len() != self.len || meta.modified().ok() != Some(mtime)
        })
    }

    /// Rebuilds the divide table and reads every header block.
    ///
    /// Flags set in memory are kept when the file has only grown since
    /// the previous scan. `Status`/`X-Status` headers seed the flags of
    /// the others.
    pub fn scan(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| Error::file(&self.path, e))?;
        let meta = file.metadata().map_err(|e| Error::file(&self.path, e))?;
        let mut reader = BufReader::new(file);

        let mut divide = Vec::new();
        let mut heads: Vec<Vec<u8>> = Vec::new();
        let mut in_head = false;
        let mut offset = 0u64;
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| Error::file(&self.path, e))?;
            if n == 0 {
                break;
            }
            if line.starts_with(ENVELOPE) {
                divide.push(offset);
                heads.push(line.clone());
                in_head = true;
            } else if in_head {
                if let Some(head) = heads.last_mut() {
                    head.extend_from_slice(&line);
                }
                in_head = line != b"\n" && line != b"\r\n";
            }
            offset += n as u64;
        }

        let kept: BTreeMap<usize, MessageFlags> = if divide.starts_with(&self.divide) {
            self.data.iter().map(|(&i, e)| (i, e.flags)).collect()
        } else {
            BTreeMap::new()
        };

        let mut data = BTreeMap::new();
        for (i, (&start, head)) in divide.iter().zip(heads).enumerate() {
            let end = divide.get(i + 1).copied().unwrap_or(offset);
            let mut email = Email::parse_headers(head, to_usize(end - start)?);
            email.index = i;
            email.flags = match kept.get(&i) {
                Some(&flags) => flags,
                None => status_flags(&email),
            };
            data.insert(i, email);
        }

        debug!(path = %self.path.display(), messages = divide.len(), "scanned mailbox");
        self.filled = vec![false; divide.len()];
        self.divide = divide;
        self.data = data;
        self.len = offset;
        self.mtime = Some(meta.modified().map_err(|e| Error::file(&self.path, e))?);
        Ok(())
    }

    /// Reads and parses the given messages in full, marking them seen.
    ///
    /// Indices already filled or past the end are skipped.
    pub fn fill(&mut self, indices: impl IntoIterator<Item = usize>) -> Result<()> {
        let todo: Vec<usize> = indices
            .into_iter()
            .filter(|&i| self.filled.get(i) == Some(&false))
            .collect();
        if todo.is_empty() {
            return Ok(());
        }

        let mut file = File::open(&self.path).map_err(|e| Error::file(&self.path, e))?;
        for i in todo {
            let Some((start, end)) = self.range(i) else {
                continue;
            };
            let raw = read_range(&mut file, start, end).map_err(|e| Error::file(&self.path, e))?;
            let mut email = Email::parse(raw)?;
            let previous = self.data.get(&i).map(|e| e.flags).unwrap_or_default();
            email.index = i;
            email.flags = previous | MessageFlags::SEEN;
            self.data.insert(i, email);
            if let Some(filled) = self.filled.get_mut(i) {
                *filled = true;
            }
            trace!(index = i, start, end, "filled message");
        }
        Ok(())
    }

    /// Exact bytes of message `index`, envelope line included.
    pub fn read_raw(&self, index: usize) -> Result<Vec<u8>> {
        let (start, end) = self
            .range(index)
            .ok_or_else(|| Error::InvalidState(format!("no message {index} in mailbox")))?;
        let mut file = File::open(&self.path).map_err(|e| Error::file(&self.path, e))?;
        read_range(&mut file, start, end).map_err(|e| Error::file(&self.path, e))
    }

    /// Removes messages by rewriting the file without them.
    ///
    /// Byte ranges come from the current divide table, so all removals in
    /// one call refer to positions before the call. The new file replaces
    /// the old one atomically. The index is cleared afterwards and must be
    /// rebuilt with [`scan`](Self::scan). Returns the number removed.
    pub fn remove(&mut self, indices: impl IntoIterator<Item = usize>) -> Result<usize> {
        let mut targets: Vec<usize> = indices
            .into_iter()
            .filter(|&i| i < self.divide.len())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        if targets.is_empty() {
            return Ok(0);
        }

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut source = File::open(&self.path).map_err(|e| Error::file(&self.path, e))?;
        let total = source
            .metadata()
            .map_err(|e| Error::file(&self.path, e))?
            .len();
        let mut target = NamedTempFile::new_in(dir).map_err(|e| Error::file(dir, e))?;

        let mut pos = 0;
        for &i in &targets {
            if let Some((start, end)) = self.range(i) {
                copy_range(&mut source, target.as_file_mut(), pos, start)
                    .map_err(|e| Error::file(target.path(), e))?;
                pos = end;
            }
        }
        copy_range(&mut source, target.as_file_mut(), pos, total)
            .map_err(|e| Error::file(target.path(), e))?;
        target
            .as_file()
            .sync_all()
            .map_err(|e| Error::file(target.path(), e))?;
        target
            .persist(&self.path)
            .map_err(|e| Error::file(&self.path, e.error))?;

        debug!(path = %self.path.display(), removed = targets.len(), "rewrote mailbox");
        self.clear();
        Ok(targets.len())
    }

    /// Appends complete messages, creating the file if needed.
    ///
    /// A message without an envelope line gets `From MAILER-DAEMON <date>`.
    /// Body lines starting with `From ` are quoted with `>`.
    pub fn append(&mut self, emails: &[Email]) -> Result<()> {
        if let Some(partial) = emails.iter().find(|e| !e.is_complete()) {
            return Err(Error::InvalidState(format!(
                "message {} has no body loaded",
                partial.index
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::file(&self.path, e))?;
        append_to(&mut file, emails).map_err(|e| Error::file(&self.path, e))?;

        // Offsets stay valid; the next scan picks up the new messages.
        self.mtime = None;
        debug!(path = %self.path.display(), count = emails.len(), "appended messages");
        Ok(())
    }

    /// Forgets everything read from the file.
    pub fn clear(&mut self) {
        self.divide.clear();
        self.data.clear();
        self.filled.clear();
        self.len = 0;
        self.mtime = None;
    }

    fn range(&self, index: usize) -> Option<(u64, u64)> {
        let start = *self.divide.get(index)?;
        let end = self.divide.get(index + 1).copied().unwrap_or(self.len);
        Some((start, end))
    }
}

fn status_flags(email: &Email) -> MessageFlags {
    ["Status", "X-Status"]
        .iter()
        .filter_map(|name| email.headers.get(name))
        .fold(MessageFlags::empty(), |flags, value| {
            flags | MessageFlags::from_mbox_status(value)
        })
}

fn to_usize(n: u64) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::InvalidState(format!("message of {n} bytes too large")))
}

fn read_range(file: &mut File, start: u64, end: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(start))?;
    let mut raw = Vec::new();
    file.take(end.saturating_sub(start)).read_to_end(&mut raw)?;
    if (raw.len() as u64) < end - start {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "mailbox shorter than its index",
        ));
    }
    Ok(raw)
}

fn copy_range(source: &mut File, target: &mut File, start: u64, end: u64) -> io::Result<()> {
    if end <= start {
        return Ok(());
    }
    source.seek(SeekFrom::Start(start))?;
    io::copy(&mut source.take(end - start), target)?;
    Ok(())
}

fn append_to(file: &mut File, emails: &[Email]) -> io::Result<()> {
    if file.metadata()?.len() > 0 {
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.write_all(b"\n")?;
        }
    }

    let mut out = io::BufWriter::new(file);
    for email in emails {
        let raw = email.raw();
        let body = if raw.starts_with(ENVELOPE) {
            let first = raw.iter().position(|&b| b == b'\n').map_or(raw.len(), |n| n + 1);
            out.write_all(&raw[..first])?;
            &raw[first..]
        } else {
            writeln!(
                out,
                "From MAILER-DAEMON {}",
                Local::now().format("%a %b %e %H:%M:%S %Y")
            )?;
            raw
        };

        for line in body.split_inclusive(|&b| b == b'\n') {
            if line.starts_with(ENVELOPE) {
                out.write_all(b">")?;
            }
            out.write_all(line)?;
        }
        if !body.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
    }
    out.flush()
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
    use tempfile::TempDir;

    const FIRST: &str = "From alice@example.com Mon Jan  1 10:00:00 2024\n\
                         From: alice@example.com\n\
                         Subject: first\n\
                         Status: RO\n\
                         \n\
                         Hello.\n\
                         \n";
    const SECOND: &str = "From bob@example.com Tue Jan  2 10:00:00 2024\n\
                          From: bob@example.com\n\
                          Subject: second\n\
                          X-Status: A\n\
                          \n\
                          A line mentioning From in the middle.\n\
                          \n";
    const THIRD: &str = "From carol@example.com Wed Jan  3 10:00:00 2024\n\
                         Subject: third\n\
                         \n\
                         Bye.\n";

    fn mailbox(contents: &str) -> (TempDir, MboxIndex) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inbox");
        fs::write(&path, contents).unwrap();
        (dir, MboxIndex::new(path))
    }

    #[test]
    fn test_scan() {
        let (_dir, mut index) = mailbox(&format!("{FIRST}{SECOND}{THIRD}"));
        assert!(index.is_modified());
        index.scan().unwrap();
        assert!(!index.is_modified());

        assert_eq!(index.len(), 3);
        assert_eq!(
            index.divide(),
            [0, FIRST.len() as u64, (FIRST.len() + SECOND.len()) as u64]
        );
        let first = index.get(0).unwrap();
        assert_eq!(first.subject(), Some("first"));
        assert_eq!(first.size(), FIRST.len());
        assert!(!first.is_complete());
        assert_eq!(first.flags, MessageFlags::SEEN);
        assert_eq!(index.get(1).unwrap().flags, MessageFlags::ANSWERED);
        assert_eq!(index.get(2).unwrap().flags, MessageFlags::empty());
    }

    #[test]
    fn test_scan_ignores_preamble() {
        let (_dir, mut index) = mailbox(&format!("garbage line\n{THIRD}"));
        index.scan().unwrap();
        assert_eq!(index.divide(), [13]);
    }

    #[test]
    fn test_fill_marks_seen() {
        let (_dir, mut index) = mailbox(&format!("{FIRST}{SECOND}{THIRD}"));
        index.scan().unwrap();
        index.fill([1, 7]).unwrap();

        let second = index.get(1).unwrap();
        assert!(index.is_filled(1));
        assert!(!index.is_filled(0));
        assert!(second.is_complete());
        assert_eq!(second.raw(), SECOND.as_bytes());
        assert_eq!(second.flags, MessageFlags::ANSWERED | MessageFlags::SEEN);
        assert!(second.text().contains("mentioning From"));
    }

    #[test]
    fn test_remove_uses_original_offsets() {
        let (_dir, mut index) = mailbox(&format!("{FIRST}{SECOND}{THIRD}"));
        index.scan().unwrap();
        assert_eq!(index.remove([2, 0, 0]).unwrap(), 2);
        assert!(index.is_empty());

        assert_eq!(fs::read_to_string(index.path()).unwrap(), SECOND);
        index.scan().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().subject(), Some("second"));
    }

    #[test]
    fn test_append_adds_envelope_and_newline() {
        let (_dir, mut index) = mailbox(THIRD.trim_end());
        let email = Email::parse(&b"Subject: new\n\nFrom here on.\nok"[..]).unwrap();
        index.append(&[email]).unwrap();

        let text = fs::read_to_string(index.path()).unwrap();
        assert!(text.starts_with(THIRD));
        let appended = &text[THIRD.len()..];
        assert!(appended.starts_with("From MAILER-DAEMON "));
        assert!(appended.ends_with("Subject: new\n\n>From here on.\nok\n"));

        index.scan().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1).unwrap().subject(), Some("new"));
    }

    #[test]
    fn test_append_keeps_envelope_and_flags() {
        let (_dir, mut index) = mailbox(FIRST);
        index.scan().unwrap();
        index.get_mut(0).unwrap().flags |= MessageFlags::DELETED;

        let email = Email::parse(SECOND).unwrap();
        index.append(&[email]).unwrap();
        assert!(index.is_modified());
        index.scan().unwrap();

        assert_eq!(
            fs::read_to_string(index.path()).unwrap(),
            format!("{FIRST}{SECOND}")
        );
        assert!(index.get(0).unwrap().flags.contains(MessageFlags::DELETED));
    }

    #[test]
    fn test_append_rejects_headers_only() {
        let (_dir, mut index) = mailbox(FIRST);
        index.scan().unwrap();
        let partial = index.get(0).unwrap().clone();
        assert!(matches!(
            index.append(&[partial]),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let mut index = MboxIndex::new("/nonexistent/mailsync/inbox");
        assert!(matches!(index.scan(), Err(Error::File { .. })));
    }

    fn message() -> impl Strategy<Value = String> {
        (
            "[a-z]{1,8}",
            prop::collection::vec("[a-z0-9 .,]{0,30}", 0..5),
        )
            .prop_map(|(subject, lines)| {
                let mut text = format!(
                    "From sender@example.com Mon Jan  1 00:00:00 2024\nSubject: {subject}\n\n"
                );
                for line in lines {
                    text.push_str(&line);
                    text.push('\n');
                }
                text
            })
    }

    proptest! {
        #[test]
        fn prop_scan_and_fill_are_exact(messages in prop::collection::vec(message(), 1..8)) {
            let (_dir, mut index) = mailbox(&messages.concat());
            index.scan().unwrap();
            prop_assert_eq!(index.len(), messages.len());
            index.fill(0..messages.len()).unwrap();
            for (i, original) in messages.iter().enumerate() {
                prop_assert_eq!(index.get(i).unwrap().raw(), original.as_bytes());
            }
        }

        #[test]
        fn prop_remove_keeps_survivors(
            messages in prop::collection::vec(message(), 1..8),
            victim in any::<prop::sample::Index>(),
        ) {
            let k = victim.index(messages.len());
            let (_dir, mut index) = mailbox(&messages.concat());
            index.scan().unwrap();
            index.remove([k]).unwrap();
            index.scan().unwrap();

            let survivors: Vec<&String> = messages
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != k)
                .map(|(_, m)| m)
                .collect();
            prop_assert_eq!(index.len(), survivors.len());
            for (i, original) in survivors.iter().enumerate() {
                prop_assert_eq!(index.read_raw(i).unwrap(), original.as_bytes());
            }
        }
    }
}
