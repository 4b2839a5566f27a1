//! FETCH response items.

use super::lexer::{Lexer, Token};
use crate::Result;

/// One data item of a `* n FETCH (...)` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `FLAGS (...)`
    Flags(Vec<String>),
    /// `RFC822.SIZE n`
    Rfc822Size(u32),
    /// `UID n`
    Uid(u32),
    /// `INTERNALDATE "..."`
    InternalDate(String),
    /// `RFC822 {n}` full message.
    Rfc822(Vec<u8>),
    /// `RFC822.HEADER {n}`
    Rfc822Header(Vec<u8>),
    /// `RFC822.TEXT {n}`
    Rfc822Text(Vec<u8>),
    /// `BODY[section]<origin> {n}`
    Body {
        /// Section text between the brackets.
        section: String,
        /// Payload; `None` for NIL.
        data: Option<Vec<u8>>,
    },
}

/// Parses the parenthesized item list following `FETCH `.
///
/// Items the client does not use (ENVELOPE, BODYSTRUCTURE, MODSEQ, ...)
/// are skipped.
pub fn parse_fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(&Token::LParen)?;
    let mut items = Vec::new();

    loop {
        match lexer.peek()? {
            Token::RParen => {
                lexer.next_token()?;
                return Ok(items);
            }
            Token::Space => {
                lexer.next_token()?;
                continue;
            }
            _ => {}
        }

        let name = lexer.atom()?.to_ascii_uppercase();
        match name.as_str() {
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(lexer.atom_list()?));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Size(lexer.number()?));
            }
            "UID" => {
                lexer.expect_space()?;
                items.push(FetchItem::Uid(lexer.number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                items.push(FetchItem::InternalDate(lexer.astring()?));
            }
            "RFC822" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822(lexer.nstring()?.unwrap_or_default()));
            }
            "RFC822.HEADER" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Header(
                    lexer.nstring()?.unwrap_or_default(),
                ));
            }
            "RFC822.TEXT" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Text(lexer.nstring()?.unwrap_or_default()));
            }
            "BODY" | "BINARY" if lexer.peek_byte() == Some(b'[') => {
                lexer.expect(&Token::LBracket)?;
                let section = lexer.take_until(b']')?.to_string();
                lexer.expect(&Token::RBracket)?;
                if lexer.peek_byte() == Some(b'<') {
                    lexer.take_until(b' ')?;
                }
                lexer.expect_space()?;
                let data = lexer.nstring()?;
                items.push(FetchItem::Body { section, data });
            }
            _ => {
                tracing::trace!(item = %name, "skipping fetch item");
                lexer.expect_space()?;
                lexer.skip_value()?;
            }
        }
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

    fn parse(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_items(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn test_header_fetch() {
        let items = parse(b"(FLAGS (\\Seen) RFC822.SIZE 120 RFC822.HEADER {9}\r\nSubj: x\r\n)");
        assert_eq!(
            items,
            vec![
                FetchItem::Flags(vec!["\\Seen".to_string()]),
                FetchItem::Rfc822Size(120),
                FetchItem::Rfc822Header(b"Subj: x\r\n".to_vec()),
            ]
        );
    }

    #[test]
    fn test_body_section_with_origin() {
        let items = parse(b"(UID 7 BODY[HEADER.FIELDS (SUBJECT)]<0> \"abc\")");
        assert_eq!(
            items,
            vec![
                FetchItem::Uid(7),
                FetchItem::Body {
                    section: "HEADER.FIELDS (SUBJECT)".to_string(),
                    data: Some(b"abc".to_vec()),
                },
            ]
        );
    }

    #[test]
    fn test_unknown_items_skipped() {
        let items = parse(b"(MODSEQ (12345) ENVELOPE (NIL \"s\" NIL) FLAGS ())");
        assert_eq!(items, vec![FetchItem::Flags(vec![])]);
    }

    #[test]
    fn test_nil_body() {
        let items = parse(b"(RFC822 NIL)");
        assert_eq!(items, vec![FetchItem::Rfc822(vec![])]);
    }
}
