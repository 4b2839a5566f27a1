//! Argument encoding.

use crate::error::{Error, Result};

/// Fails when `s` holds bytes a quoted string cannot carry: NUL, CR, LF or
/// anything outside 7-bit ASCII. `what` names the argument in the error and
/// the value itself is never echoed.
pub fn check_astring(what: &str, s: &str) -> Result<()> {
    match s.bytes().find(|&b| matches!(b, b'\0' | b'\r' | b'\n') || b >= 0x80) {
        Some(b) => Err(Error::Protocol(format!(
            "{what} contains byte 0x{b:02X}, which cannot be sent in a quoted string"
        ))),
        None => Ok(()),
    }
}

/// Writes an astring: bare atom when possible, otherwise a quoted string.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Writes `(flag flag ...)`.
pub fn write_flag_list<S: AsRef<str>>(buf: &mut Vec<u8>, flags: &[S]) {
    buf.push(b'(');
    for (i, flag) in flags.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        buf.extend_from_slice(flag.as_ref().as_bytes());
    }
    buf.push(b')');
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
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

    fn astring(s: &str) -> String {
        let mut buf = Vec::new();
        write_astring(&mut buf, s);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_atom_stays_bare() {
        assert_eq!(astring("INBOX"), "INBOX");
        assert_eq!(astring("Work/2024"), "Work/2024");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(astring(""), "\"\"");
        assert_eq!(astring("Sent Items"), "\"Sent Items\"");
        assert_eq!(astring("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(astring("x]"), "\"x]\"");
    }

    #[test]
    fn test_check_astring() {
        assert!(check_astring("mailbox", "Sent Items").is_ok());
        assert!(check_astring("mailbox", "").is_ok());
        assert!(check_astring("mailbox", "tab\there").is_ok());

        let err = check_astring("mailbox", "a\r\nA2 DELETE INBOX").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("0x0D"));
        assert!(!err.to_string().contains("DELETE"));

        assert!(check_astring("mailbox", "x\ny").is_err());
        assert!(check_astring("mailbox", "nul\0").is_err());
        assert!(check_astring("mailbox", "Entw\u{fc}rfe").is_err());
    }

    #[test]
    fn test_flag_list() {
        let mut buf = Vec::new();
        write_flag_list(&mut buf, &["\\Seen", "\\Deleted"]);
        assert_eq!(buf, b"(\\Seen \\Deleted)");
    }
}
