//! The email model: one node of a MIME part tree.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_quoted_printable, decode_text};
use crate::error::{Error, Result};
use crate::flags::MessageFlags;
use crate::header::Headers;
use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;
use std::fmt;

/// Deepest part nesting accepted before parsing gives up.
const MAX_DEPTH: usize = 32;

/// Content transfer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Decodes a body according to this encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if a base64 body is malformed.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => Ok(decode_quoted_printable(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// What [`Email::compare`] orders by.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Parsed `Date` header.
    #[default]
    Date,
    /// Raw byte size.
    Size,
    /// Raw string value of the named header.
    Header(String),
}

impl SortKey {
    /// `DATE` and `SIZE` select the built-in keys, anything else names a header.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("date") {
            Self::Date
        } else if s.eq_ignore_ascii_case("size") {
            Self::Size
        } else {
            Self::Header(s.to_string())
        }
    }
}

/// A parsed message or message part.
///
/// A multipart node has children in `attachments` and no `data`; a leaf
/// has decoded `data` and no children. `message/rfc822` parts hold the
/// encapsulated message as their single child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    /// Parsed headers.
    pub headers: Headers,
    /// Seen/answered/deleted state.
    pub flags: MessageFlags,
    /// Position within its folder, or within the parent for child parts.
    pub index: usize,
    /// Key used by [`Email::compare`].
    pub sort_key: SortKey,
    raw: Vec<u8>,
    data: Vec<u8>,
    attachments: Vec<Self>,
    size: usize,
    complete: bool,
}

impl Email {
    /// Parses a complete message.
    ///
    /// A leading mbox `From ` envelope line is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a part body cannot be decoded or the part tree
    /// nests too deeply.
    pub fn parse(raw: impl Into<Vec<u8>>) -> Result<Self> {
        let raw = raw.into();
        let mut email = Self::parse_part(&raw, 0)?;
        email.raw = raw;
        Ok(email)
    }

    /// Builds a headers-only email from a header block.
    ///
    /// `size` is the size of the full message, which the caller knows
    /// from the mailbox even though the body was not read.
    #[must_use]
    pub fn parse_headers(raw: impl Into<Vec<u8>>, size: usize) -> Self {
        let raw = raw.into();
        let (head, _) = split_head_body(skip_envelope(&raw));
        Self {
            headers: Headers::parse(head),
            raw,
            size,
            ..Self::default()
        }
    }

    /// Builds a new message from headers and a body, ready to append.
    ///
    /// # Errors
    ///
    /// Returns an error if a header name is not a valid field name or the
    /// resulting message cannot be parsed.
    pub fn compose(headers: &Headers, body: &[u8]) -> Result<Self> {
        if let Some(name) = headers.keys().find(|k| !Headers::is_field_name(k)) {
            return Err(Error::InvalidHeader(name));
        }
        let mut raw = headers.to_string().into_bytes();
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(body);
        Self::parse(raw)
    }

    fn parse_part(bytes: &[u8], depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::Parse(format!(
                "MIME parts nested deeper than {MAX_DEPTH}"
            )));
        }

        let (head, body) = split_head_body(skip_envelope(bytes));
        let mut email = Self {
            headers: Headers::parse(head),
            size: bytes.len(),
            complete: true,
            ..Self::default()
        };

        let content_type = email.content_type();
        if content_type.is_multipart() {
            if let Some(boundary) = content_type.boundary() {
                for (index, part) in split_multipart(body, boundary).into_iter().enumerate() {
                    let mut child = Self::parse_part(part, depth + 1)?;
                    child.raw = part.to_vec();
                    child.index = index;
                    email.attachments.push(child);
                }
            } else {
                tracing::warn!(
                    content_type = %content_type,
                    "multipart without boundary, keeping body as a single part"
                );
                email.data = body.to_vec();
            }
        } else if content_type.is_message() {
            let mut child = Self::parse_part(body, depth + 1)?;
            child.raw = body.to_vec();
            email.attachments.push(child);
        } else {
            email.data = email.transfer_encoding().decode(body)?;
        }

        Ok(email)
    }

    /// Raw source bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Raw source without a leading mbox `From ` envelope line.
    #[must_use]
    pub fn message(&self) -> &[u8] {
        skip_envelope(&self.raw)
    }

    /// Decoded body bytes of a leaf part.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Child parts.
    #[must_use]
    pub fn attachments(&self) -> &[Self] {
        &self.attachments
    }

    /// Message size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// True when the body was parsed, false for headers-only listings.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Sanitized content type, defaulting to text/plain.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        ContentType::sanitized(self.headers.get("Content-Type"))
    }

    /// Declared transfer encoding, defaulting to 7bit.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("Content-Transfer-Encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// True for multipart containers.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type().is_multipart()
    }

    /// Leaf data converted to UTF-8 using the part's charset parameter.
    #[must_use]
    pub fn text(&self) -> String {
        decode_text(&self.data, self.content_type().charset())
    }

    /// Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("Subject")
    }

    /// From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers.get("From")
    }

    /// To header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.headers.get("To")
    }

    /// Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("Message-ID")
    }

    /// Parsed Date header.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        let value = self.headers.get("Date")?.trim();
        // Trailing comments like "(UTC)" are common and not RFC 2822.
        let value = value
            .find(" (")
            .map_or(value, |pos| value[..pos].trim_end());
        DateTime::parse_from_rfc2822(value).ok()
    }

    /// Depth-first iterator over this part and all descendants.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Returns the first part whose decoded data contains `needle`.
    ///
    /// Only this part is searched unless `recursive` is set, in which case
    /// descendants are searched depth-first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no part matches.
    pub fn grep(&self, needle: &[u8], recursive: bool) -> Result<&Self> {
        let found = if recursive {
            self.walk().find(|part| contains(&part.data, needle))
        } else {
            Some(self).filter(|part| contains(&part.data, needle))
        };
        found.ok_or_else(|| {
            Error::NotFound(format!("{:?}", String::from_utf8_lossy(needle)))
        })
    }

    /// Orders two emails by this email's sort key.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match &self.sort_key {
            SortKey::Date => self.date().cmp(&other.date()),
            SortKey::Size => self.size.cmp(&other.size),
            SortKey::Header(name) => self
                .headers
                .get(name)
                .unwrap_or_default()
                .cmp(other.headers.get(name).unwrap_or_default()),
        }
    }
}

/// Iterator returned by [`Email::walk`].
pub struct Walk<'a> {
    stack: Vec<&'a Email>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Email;

    fn next(&mut self) -> Option<Self::Item> {
        let part = self.stack.pop()?;
        self.stack.extend(part.attachments.iter().rev());
        Some(part)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn skip_envelope(raw: &[u8]) -> &[u8] {
    if !raw.starts_with(b"From ") {
        return raw;
    }
    raw.iter()
        .position(|&b| b == b'\n')
        .map_or(&[][..], |nl| &raw[nl + 1..])
}

/// Splits a part into its header block and body at the first blank line.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = blank_line_prefix(raw) {
        return (&[], body);
    }

    let mut pos = 0;
    while let Some(nl) = raw[pos..].iter().position(|&b| b == b'\n') {
        let next = pos + nl + 1;
        if let Some(body) = blank_line_prefix(&raw[next..]) {
            return (&raw[..next], body);
        }
        pos = next;
    }

    (raw, &[])
}

fn blank_line_prefix(raw: &[u8]) -> Option<&[u8]> {
    raw.strip_prefix(b"\r\n")
        .or_else(|| raw.strip_prefix(b"\n"))
}

fn trim_line_break(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Splits a multipart body on `--boundary` lines.
///
/// The preamble before the first delimiter is dropped. A delimiter
/// followed by `-` ends the scan; an unterminated last part is kept.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let next = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |nl| pos + nl + 1);
        let line = trim_line_break(&body[pos..next]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let is_final = rest.starts_with(b"-");
            if is_final || rest.iter().all(u8::is_ascii_whitespace) {
                if let Some(s) = start.take() {
                    parts.push(trim_line_break(&body[s..pos]));
                }
                if is_final {
                    return parts;
                }
                start = Some(next);
            }
        }

        pos = next;
    }

    if let Some(s) = start {
        parts.push(&body[s..]);
    }
    parts
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

    const MULTIPART: &str = concat!(
        "From: alice@example.com\r\n",
        "Subject: parts\r\n",
        "Content-Type: multipart/mixed; boundary=X\r\n",
        "\r\n",
        "preamble\r\n",
        "--X\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "first part\r\n",
        "--X\r\n",
        "Content-Type: application/octet-stream\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "c2Vjb25k\r\n",
        "--X--\r\n",
        "epilogue\r\n",
    );

    #[test]
    fn test_parse_simple() {
        let email = Email::parse("Subject: hi\r\n\r\nbody\r\n").unwrap();
        assert_eq!(email.subject(), Some("hi"));
        assert_eq!(email.data(), b"body\r\n");
        assert!(email.attachments().is_empty());
        assert!(email.is_complete());
        assert_eq!(email.content_type().mime_type(), "text/plain");
    }

    #[test]
    fn test_parse_multipart_two_parts() {
        let email = Email::parse(MULTIPART).unwrap();
        assert!(email.is_multipart());
        assert!(email.data().is_empty());
        assert_eq!(email.attachments().len(), 2);

        let first = &email.attachments()[0];
        assert_eq!(first.text(), "first part");
        assert_eq!(first.index, 0);
        let reparsed = Email::parse(first.raw().to_vec()).unwrap();
        assert_eq!(reparsed.data(), first.data());

        let second = &email.attachments()[1];
        assert_eq!(second.data(), b"second");
        assert_eq!(second.index, 1);
    }

    #[test]
    fn test_parse_multipart_unterminated() {
        let raw = "Content-Type: multipart/mixed; boundary=\"b\"\n\n--b\n\none\n--b\n\ntwo\n";
        let email = Email::parse(raw).unwrap();
        assert_eq!(email.attachments().len(), 2);
        assert_eq!(email.attachments()[1].data(), b"two\n");
    }

    #[test]
    fn test_boundary_prefix_is_not_delimiter() {
        let raw = "Content-Type: multipart/mixed; boundary=b\n\n--b\n\n--bx is text\n--b--\n";
        let email = Email::parse(raw).unwrap();
        assert_eq!(email.attachments().len(), 1);
        assert_eq!(email.attachments()[0].data(), b"--bx is text");
    }

    #[test]
    fn test_parse_multipart_without_boundary() {
        let email = Email::parse("Content-Type: multipart/mixed\r\n\r\nraw body").unwrap();
        assert!(email.attachments().is_empty());
        assert_eq!(email.data(), b"raw body");
    }

    #[test]
    fn test_parse_message_rfc822() {
        let raw = "Content-Type: message/rfc822\r\n\r\nSubject: inner\r\n\r\ninner body";
        let email = Email::parse(raw).unwrap();
        assert!(email.data().is_empty());
        assert_eq!(email.attachments().len(), 1);
        assert_eq!(email.attachments()[0].subject(), Some("inner"));
        assert_eq!(email.attachments()[0].data(), b"inner body");
    }

    #[test]
    fn test_parse_quoted_printable() {
        let raw = "Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\nGr=C3=BC=C3=9Fe";
        assert_eq!(Email::parse(raw).unwrap().text(), "Grüße");
    }

    #[test]
    fn test_parse_skips_envelope_line() {
        let email = Email::parse("From someone@example.com Mon Jan  1 00:00:00 2024\nSubject: s\n\nb").unwrap();
        assert_eq!(email.subject(), Some("s"));
        assert_eq!(email.headers.len(), 1);
        assert_eq!(email.data(), b"b");
    }

    #[test]
    fn test_message_drops_envelope() {
        let email = Email::parse("From a@b Mon Jan  1 00:00:00 2024\nSubject: s\n\nb\n").unwrap();
        assert!(email.raw().starts_with(b"From a@b"));
        assert_eq!(email.message(), b"Subject: s\n\nb\n");

        let plain = Email::parse("Subject: s\r\n\r\nb\r\n").unwrap();
        assert_eq!(plain.message(), plain.raw());
    }

    #[test]
    fn test_parse_headers_only() {
        let email = Email::parse_headers("Subject: s\r\nFrom: a@b\r\n\r\n", 1234);
        assert!(!email.is_complete());
        assert_eq!(email.size(), 1234);
        assert_eq!(email.from(), Some("a@b"));
        assert!(email.data().is_empty());
    }

    #[test]
    fn test_no_blank_line_is_all_headers() {
        let email = Email::parse("Subject: only headers").unwrap();
        assert_eq!(email.subject(), Some("only headers"));
        assert!(email.data().is_empty());
    }

    #[test]
    fn test_grep() {
        let email = Email::parse(MULTIPART).unwrap();
        assert!(matches!(email.grep(b"second", false), Err(Error::NotFound(_))));
        let found = email.grep(b"second", true).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(email.grep(b"part", true).unwrap().index, 0);
        assert!(email.grep(b"absent", true).is_err());
    }

    #[test]
    fn test_walk_depth_first() {
        let email = Email::parse(MULTIPART).unwrap();
        let parts: Vec<_> = email.walk().collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].is_multipart());
        assert_eq!(parts[2].data(), b"second");
    }

    #[test]
    fn test_compare_by_date() {
        let older = Email::parse("Date: Mon, 1 Jan 2024 10:00:00 +0000 (UTC)\r\n\r\n").unwrap();
        let newer = Email::parse("Date: Tue, 2 Jan 2024 09:00:00 +0100\r\n\r\n").unwrap();
        assert!(older.date().is_some());
        assert_eq!(older.compare(&newer), Ordering::Less);
        assert_eq!(newer.compare(&older), Ordering::Greater);
    }

    #[test]
    fn test_compare_by_size_and_header() {
        let mut small = Email::parse("Subject: b\r\n\r\nx").unwrap();
        let big = Email::parse("Subject: a\r\n\r\nxxxxxxxx").unwrap();
        small.sort_key = SortKey::parse("SIZE");
        assert_eq!(small.compare(&big), Ordering::Less);
        small.sort_key = SortKey::parse("subject");
        assert_eq!(small.compare(&big), Ordering::Greater);
    }

    #[test]
    fn test_compose() {
        let mut headers = Headers::new();
        headers.add("Subject", "Grüße");
        headers.add("To", "bob@example.com");
        let email = Email::compose(&headers, b"hello").unwrap();
        assert!(email.raw().is_ascii());
        assert_eq!(email.subject(), Some("Grüße"));
        assert_eq!(email.data(), b"hello");
    }

    #[test]
    fn test_compose_rejects_bad_header_name() {
        let mut headers = Headers::new();
        headers.add("Bad Name", "x");
        assert!(matches!(Email::compose(&headers, b""), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_nesting_limit() {
        let raw = "Content-Type: message/rfc822\r\n\r\n".repeat(MAX_DEPTH + 2);
        assert!(matches!(Email::parse(raw), Err(Error::Parse(_))));
    }
}
