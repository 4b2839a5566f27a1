//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, charset conversion and RFC 2047
//! encoded words in header values.

use crate::error::Result;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use encoding_rs::{Encoding, UTF_8};

/// Base64 engine that accepts missing padding and stray trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT.decode(compact).map_err(Into::into)
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Soft line breaks are removed. Malformed escapes are kept verbatim,
/// which matches what mail readers do with broken encoders.
#[must_use]
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        match (input.get(i + 1).copied(), input.get(i + 2).copied()) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(hi), Some(lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                out.push((hex_value(hi) << 4) | hex_value(lo));
                i += 3;
            }
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    out
}

const fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Converts bytes in the named charset to a UTF-8 string.
///
/// Unknown or missing charsets fall back to lossy UTF-8.
#[must_use]
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Converts text to the named charset.
///
/// Returns `None` if the charset is unknown or cannot represent the text.
#[must_use]
pub fn encode_text(text: &str, charset: &str) -> Option<Vec<u8>> {
    let encoding = Encoding::for_label(charset.trim().as_bytes())?;
    let (bytes, used, had_errors) = encoding.encode(text);
    if had_errors || used != encoding {
        return None;
    }
    Some(bytes.into_owned())
}

/// Encodes a header value as a single RFC 2047 `B` word if it needs it.
///
/// Plain ASCII values are returned unchanged. The value is converted to
/// `charset` when given and representable, otherwise UTF-8 is used.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: Option<&str>) -> String {
    if text.is_ascii() && !text.contains("=?") {
        return text.to_string();
    }

    let (label, bytes) = charset
        .and_then(|cs| encode_text(text, cs).map(|bytes| (cs, bytes)))
        .unwrap_or_else(|| ("UTF-8", text.as_bytes().to_vec()));

    format!("=?{label}?B?{}?=", encode_base64(&bytes))
}

/// A decoded `=?charset?encoding?payload?=` word.
struct EncodedWord {
    charset: String,
    text: String,
    consumed: usize,
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Returns the UTF-8 text and the charset of the last decoded word.
/// Whitespace separating two adjacent encoded words is dropped.
#[must_use]
pub fn decode_rfc2047(value: &str) -> (String, Option<String>) {
    let mut out = String::with_capacity(value.len());
    let mut charset = None;
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some(word) = parse_encoded_word(candidate) {
            if !(after_word && before.chars().all(char::is_whitespace)) {
                out.push_str(before);
            }
            out.push_str(&word.text);
            charset = Some(word.charset);
            rest = &candidate[word.consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    out.push_str(rest);
    (out, charset)
}

fn parse_encoded_word(input: &str) -> Option<EncodedWord> {
    let inner = input.strip_prefix("=?")?;
    let (charset, after) = inner.split_once('?')?;
    if charset.is_empty() || charset.contains(|c: char| c.is_whitespace() || c == '=') {
        return None;
    }

    let bytes = after.as_bytes();
    let encoding = *bytes.first()?;
    if bytes.get(1) != Some(&b'?') {
        return None;
    }

    let payload_area = &after[2..];
    let end = payload_area.find("?=")?;
    let payload = &payload_area[..end];
    if payload.contains(char::is_whitespace) {
        return None;
    }

    let decoded = match encoding.to_ascii_uppercase() {
        b'B' => decode_base64(payload.as_bytes()).ok()?,
        b'Q' => {
            let spaced: Vec<u8> = payload
                .bytes()
                .map(|b| if b == b'_' { b' ' } else { b })
                .collect();
            decode_quoted_printable(&spaced)
        }
        _ => return None,
    };

    // RFC 2231 allows a language suffix: `UTF-8*en`.
    let label = charset.split('*').next().unwrap_or(charset);

    Some(EncodedWord {
        charset: label.to_string(),
        text: decode_text(&decoded, Some(label)),
        consumed: 2 + charset.len() + 1 + 2 + end + 2,
    })
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
    fn test_base64_ignores_line_breaks() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_missing_padding() {
        assert_eq!(decode_base64(b"SGVsbG8").unwrap(), b"Hello");
    }

    #[test]
    fn test_base64_invalid() {
        assert!(decode_base64(b"!!!!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"H=C3=A9llo=\r\n, W=C3=B8rld!");
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo, Wørld!");
    }

    #[test]
    fn test_quoted_printable_keeps_broken_escape() {
        assert_eq!(decode_quoted_printable(b"100=% sure="), b"100=% sure=");
    }

    #[test]
    fn test_decode_text_latin1() {
        assert_eq!(decode_text(&[0x47, 0x72, 0xFC, 0xDF, 0x65], Some("ISO-8859-1")), "Grüße");
    }

    #[test]
    fn test_decode_text_unknown_charset_falls_back() {
        assert_eq!(decode_text(b"plain", Some("x-no-such-charset")), "plain");
    }

    #[test]
    fn test_rfc2047_b_word() {
        let (text, charset) = decode_rfc2047("=?UTF-8?B?SGVsbG8=?=");
        assert_eq!(text, "Hello");
        assert_eq!(charset.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn test_rfc2047_q_word_with_surroundings() {
        let (text, charset) = decode_rfc2047("Re: =?iso-8859-1?q?Gr=FC=DFe_aus?= Berlin");
        assert_eq!(text, "Re: Grüße aus Berlin");
        assert_eq!(charset.as_deref(), Some("iso-8859-1"));
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        let (text, _) = decode_rfc2047("=?UTF-8?Q?Hello?= =?UTF-8?Q?_World?=");
        assert_eq!(text, "Hello World");
    }

    #[test]
    fn test_rfc2047_last_charset_wins() {
        let (_, charset) = decode_rfc2047("=?UTF-8?Q?a?= and =?KOI8-R?B?8g==?=");
        assert_eq!(charset.as_deref(), Some("KOI8-R"));
    }

    #[test]
    fn test_rfc2047_malformed_left_alone() {
        let (text, charset) = decode_rfc2047("=?broken word?= =?UTF-8?X?abc?=");
        assert_eq!(text, "=?broken word?= =?UTF-8?X?abc?=");
        assert!(charset.is_none());
    }

    #[test]
    fn test_rfc2047_encode_ascii_untouched() {
        assert_eq!(encode_rfc2047("Hello", Some("UTF-8")), "Hello");
    }

    #[test]
    fn test_rfc2047_encode_uses_charset() {
        let encoded = encode_rfc2047("Grüße", Some("ISO-8859-1"));
        assert_eq!(
            encoded,
            format!("=?ISO-8859-1?B?{}?=", encode_base64(&[0x47, 0x72, 0xFC, 0xDF, 0x65]))
        );
        let (text, charset) = decode_rfc2047(&encoded);
        assert_eq!(text, "Grüße");
        assert_eq!(charset.as_deref(), Some("ISO-8859-1"));
    }

    #[test]
    fn test_rfc2047_encode_unrepresentable_falls_back_to_utf8() {
        let encoded = encode_rfc2047("日本", Some("ISO-8859-1"));
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert_eq!(decode_rfc2047(&encoded).0, "日本");
    }
}
