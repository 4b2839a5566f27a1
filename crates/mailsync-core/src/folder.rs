//! Folder paths shared by both backends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator used when a path is written as a single string.
pub const SEPARATOR: char = '/';

/// What a folder can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FolderAttributes {
    /// May contain child folders.
    pub is_parent: bool,
    /// Can be opened to list messages.
    pub is_select: bool,
    /// Last modification, local folders only.
    pub mtime: Option<DateTime<Utc>>,
}

/// A folder identified by its path segments, e.g. `["Work", "2024"]`.
///
/// Equality includes the attributes. Use [`segments`](Self::segments)
/// to compare locations only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FolderPath {
    segments: Vec<String>,
    /// Attributes reported by the backend.
    pub attributes: FolderAttributes,
}

impl FolderPath {
    /// Creates a path from its segments with default attributes.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            attributes: FolderAttributes::default(),
        }
    }

    /// Parses `Work/2024`. Empty segments are dropped.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self::new(path.split(SEPARATOR).filter(|s| !s.is_empty()))
    }

    /// Replaces the attributes.
    #[must_use]
    pub const fn with_attributes(mut self, attributes: FolderAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Path segments from the root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, or `""` for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// True for the empty path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parent location, without attributes.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self::new(parent.iter().cloned()))
    }

    /// Child location, without attributes.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self::new(segments)
    }

    /// Joins the segments with a backend delimiter.
    #[must_use]
    pub fn join(&self, delimiter: char) -> String {
        let mut joined = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                joined.push(delimiter);
            }
            joined.push_str(segment);
        }
        joined
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(SEPARATOR))
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
    fn test_parse_and_join() {
        let path = FolderPath::parse("/Work//2024/");
        assert_eq!(path.segments(), ["Work", "2024"]);
        assert_eq!(path.name(), "2024");
        assert_eq!(path.join('.'), "Work.2024");
        assert_eq!(path.to_string(), "Work/2024");
    }

    #[test]
    fn test_parent_child() {
        let path = FolderPath::parse("Work/2024");
        let parent = path.parent().unwrap();
        assert_eq!(parent.segments(), ["Work"]);
        assert_eq!(parent.child("2024").segments(), path.segments());
        assert!(FolderPath::parse("").is_root());
        assert!(FolderPath::default().parent().is_none());
    }

    #[test]
    fn test_equality_includes_attributes() {
        let plain = FolderPath::parse("INBOX");
        let selectable = plain.clone().with_attributes(FolderAttributes {
            is_select: true,
            ..FolderAttributes::default()
        });
        assert_ne!(plain, selectable);
        assert_eq!(plain.segments(), selectable.segments());
    }
}
