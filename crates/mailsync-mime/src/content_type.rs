//! MIME content type handling.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters keyed by lower-cased name (e.g., charset, boundary).
    pub parameters: BTreeMap<String, String>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::text_plain()
    }
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Creates a bare text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns `type/subtype`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present and non-empty.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters
            .get("boundary")
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Checks if this is an encapsulated `message/rfc822`.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.main_type == "message" && self.sub_type == "rfc822"
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`. Type,
    /// subtype and parameter names are lower-cased. Semicolons inside
    /// quoted values do not split parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing or not a token.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = split_parameters(s).into_iter();

        let type_str = parts.next().unwrap_or_default();
        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("missing subtype in {s:?}")))?;
        let main_type = main_type.trim().to_ascii_lowercase();
        let sub_type = sub_type.trim().to_ascii_lowercase();
        if !is_token(&main_type) || !is_token(&sub_type) {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        let mut content_type = Self::new(main_type, sub_type);
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                if key.is_empty() {
                    continue;
                }
                content_type
                    .parameters
                    .insert(key, unquote(value.trim()));
            }
        }

        Ok(content_type)
    }

    /// Parses an optional header value, falling back to text/plain.
    #[must_use]
    pub fn sanitized(value: Option<&str>) -> Self {
        match value.map(Self::parse) {
            Some(Ok(content_type)) => content_type,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "unusable content type, assuming text/plain");
                Self::text_plain()
            }
            None => Self::text_plain(),
        }
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

/// Splits on `;` outside double quotes.
fn split_parameters(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            if is_token(value) {
                write!(f, "; {key}={value}")?;
            } else {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
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

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/PLAIN; Charset=utf-8").unwrap();
        assert_eq!(ct.mime_type(), "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_quoted_boundary() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part;123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part;123"));
    }

    #[test]
    fn test_content_type_parse_rejects_garbage() {
        assert!(ContentType::parse("textplain").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn test_sanitized_defaults() {
        assert_eq!(ContentType::sanitized(None), ContentType::text_plain());
        assert_eq!(ContentType::sanitized(Some("garbage")), ContentType::text_plain());
        assert!(ContentType::sanitized(Some("message/rfc822")).is_message());
    }

    #[test]
    fn test_empty_boundary_is_none() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"\"").unwrap();
        assert_eq!(ct.boundary(), None);
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("multipart", "mixed")
            .with_parameter("boundary", "a b")
            .with_parameter("Charset", "utf-8");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"a b\"; charset=utf-8");
        assert_eq!(ContentType::parse(&ct.to_string()).unwrap(), ct);
    }
}
