//! MIME header handling.
//!
//! Keys are stored upper-cased and rendered in studly case
//! (`CONTENT-TYPE` becomes `Content-Type`). Every value remembers the
//! charset of the RFC 2047 word it was decoded from so it can be
//! re-encoded the same way.

use crate::encoding::{decode_rfc2047, encode_rfc2047};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    values: Vec<String>,
    charsets: Vec<Option<String>>,
}

/// Ordered, case-insensitive collection of email headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Entry>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(name))
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.key.eq_ignore_ascii_case(name))
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add_with_charset(name, value, None);
    }

    /// Adds a header value that was decoded from `charset`.
    pub fn add_with_charset(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        charset: Option<String>,
    ) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entry_mut(&name) {
            entry.values.push(value);
            entry.charsets.push(charset);
        } else {
            self.entries.push(Entry {
                key: name.to_ascii_uppercase(),
                values: vec![value],
                charsets: vec![charset],
            });
        }
    }

    /// Sets a header value, replacing any existing values in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entry_mut(&name) {
            entry.values = vec![value];
            entry.charsets = vec![None];
        } else {
            self.add(name, value);
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.values.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entry(name)
            .map(|e| e.values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the charset recorded for the first value of a header.
    #[must_use]
    pub fn charset(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.charsets.first())
            .and_then(Option::as_deref)
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|e| !e.key.eq_ignore_ascii_case(name));
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header names in first-seen order, studly-cased.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|e| studly(&e.key))
    }

    /// Returns an iterator over all `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        self.entries.iter().flat_map(|e| {
            let name = studly(&e.key);
            e.values.iter().map(move |v| (name.clone(), v.as_str()))
        })
    }

    /// Parses a raw header block.
    ///
    /// Parsing stops at the first empty line. Continuation lines are
    /// joined to the previous value with a single space, and RFC 2047
    /// encoded words are decoded to UTF-8. Lines that are neither a
    /// header nor a continuation are skipped.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in raw.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                break;
            }

            let line = String::from_utf8_lossy(line);
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.push_decoded(name, &value);
            }

            match line.split_once(':') {
                Some((name, value)) if Self::is_field_name(name.trim_end()) => {
                    current = Some((name.trim_end().to_string(), value.trim().to_string()));
                }
                _ => tracing::trace!(line = %line, "skipping malformed header line"),
            }
        }

        if let Some((name, value)) = current {
            headers.push_decoded(name, &value);
        }

        headers
    }

    /// Encodes a header value as an RFC 2047 word if it is not plain ASCII.
    #[must_use]
    pub fn encode_value(value: &str, charset: Option<&str>) -> String {
        encode_rfc2047(value, charset)
    }

    /// True if `name` is a valid header field name (printable ASCII, no colon).
    #[must_use]
    pub fn is_field_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_graphic() && b != b':')
    }

    fn push_decoded(&mut self, name: String, raw_value: &str) {
        let (value, charset) = decode_rfc2047(raw_value);
        self.add_with_charset(name, value, charset);
    }
}

/// `CONTENT-TYPE` -> `Content-Type`.
fn studly(key: &str) -> String {
    key.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let name = studly(&entry.key);
            for (value, charset) in entry.values.iter().zip(&entry.charsets) {
                write!(f, "{name}: {}\r\n", Self::encode_value(value, charset.as_deref()))?;
            }
        }
        Ok(())
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

    #[test]
    fn test_headers_add_get_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.keys().collect::<Vec<_>>(), vec!["Content-Type"]);
    }

    #[test]
    fn test_headers_set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("Subject", "hi");
        headers.add("to", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);
        assert_eq!(headers.len(), 2);

        headers.set("TO", "charlie@example.com");
        assert_eq!(headers.get_all("To"), vec!["charlie@example.com"]);
        assert_eq!(headers.keys().next().as_deref(), Some("To"));
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        assert!(headers.contains("subject"));
        headers.remove("SUBJECT");
        assert!(!headers.contains("Subject"));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_parse_folding() {
        let raw = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test\r\n",
            "\tMessage\r\n",
            "Content-Type: text/plain;\r\n",
            "    charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(raw.as_bytes());
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
        assert!(!headers.contains("Body"));
    }

    #[test]
    fn test_headers_parse_encoded_word() {
        let headers = Headers::parse(b"Subject: =?UTF-8?B?SGVsbG8=?=\n");
        assert_eq!(headers.get("Subject"), Some("Hello"));
        assert_eq!(headers.charset("Subject"), Some("UTF-8"));
    }

    #[test]
    fn test_headers_parse_skips_garbage() {
        let headers = Headers::parse(b"no colon here\nX-Ok: yes\n: empty name\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-ok"), Some("yes"));
    }

    #[test]
    fn test_headers_display_studly_crlf() {
        let mut headers = Headers::new();
        headers.add("message-id", "<1@x>");
        headers.add("X-MAILER", "test");
        assert_eq!(headers.to_string(), "Message-Id: <1@x>\r\nX-Mailer: test\r\n");
    }

    #[test]
    fn test_headers_display_reencodes_with_charset() {
        let headers = Headers::parse(b"Subject: =?ISO-8859-1?Q?Gr=FC=DFe?=\r\n");
        assert_eq!(headers.get("Subject"), Some("Grüße"));

        let rendered = headers.to_string();
        assert!(rendered.starts_with("Subject: =?ISO-8859-1?B?"));
        assert_eq!(Headers::parse(rendered.as_bytes()), headers);
    }

    fn header_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9]{0,8}(-[A-Za-z0-9]{1,8})?"
    }

    fn header_value() -> impl Strategy<Value = String> {
        "[A-Za-z0-9<@>]([A-Za-z0-9<@>., ]{0,30}[A-Za-z0-9<@>.])?"
    }

    proptest! {
        #[test]
        fn prop_display_then_parse_is_identity(
            pairs in proptest::collection::vec((header_name(), header_value()), 0..12)
        ) {
            let mut headers = Headers::new();
            for (name, value) in &pairs {
                headers.add(name.clone(), value.clone());
            }
            let reparsed = Headers::parse(headers.to_string().as_bytes());
            prop_assert_eq!(reparsed, headers);
        }
    }
}
