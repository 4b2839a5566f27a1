//! Sans-I/O response parser.
//!
//! [`parse_response`] turns one framed server response into a
//! [`Response`]. Untagged kinds the client has no use for are returned as
//! [`UntaggedResponse::Other`] instead of failing.

mod fetch;
mod lexer;

pub use fetch::FetchItem;
pub use lexer::{Lexer, Token};

use crate::types::{ListResponse, MailboxAttribute, Status};
use crate::Result;

/// Optional bracketed code at the start of response text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `[ALERT]`
    Alert,
    /// `[CAPABILITY ...]`
    Capability(Vec<String>),
    /// `[UNSEEN n]`
    Unseen(u32),
    /// `[UIDVALIDITY n]`
    UidValidity(u32),
    /// `[UIDNEXT n]`
    UidNext(u32),
    /// `[READ-ONLY]`
    ReadOnly,
    /// `[READ-WRITE]`
    ReadWrite,
    /// `[TRYCREATE]`
    TryCreate,
    /// `[PERMANENTFLAGS (...)]`
    PermanentFlags(Vec<String>),
    /// Anything else, verbatim.
    Other(String),
}

/// Untagged (`* ...`) server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK`, `* NO`, `* BAD`, `* PREAUTH` or `* BYE`.
    Condition {
        /// Which condition.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<String>),
    /// `* FLAGS (...)`
    Flags(Vec<String>),
    /// `* LIST ...`
    List(ListResponse),
    /// `* LSUB ...`
    Lsub(ListResponse),
    /// `* SEARCH ...`
    Search(Vec<u32>),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* n FETCH (...)`
    Fetch {
        /// Sequence number.
        seq: u32,
        /// Data items.
        items: Vec<FetchItem>,
    },
    /// Unrecognized response line.
    Other(String),
}

/// One complete server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Completion of a tagged command.
    Tagged {
        /// Echoed tag.
        tag: String,
        /// OK, NO or BAD (BYE is tolerated).
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Trailing text.
        text: String,
    },
    /// Server data.
    Untagged(UntaggedResponse),
    /// `+ ...` continuation request.
    Continuation {
        /// Text after the `+`.
        text: String,
    },
}

/// Parses one response as delivered by the framing layer.
pub fn parse_response(input: &[u8]) -> Result<Response> {
    let mut lexer = Lexer::new(input);
    match lexer.next_token()? {
        Token::Asterisk => {
            lexer.expect_space()?;
            parse_untagged(&mut lexer).map(Response::Untagged)
        }
        Token::Plus => {
            lexer.skip_space();
            Ok(Response::Continuation { text: lexer.text() })
        }
        Token::Atom(tag) => {
            lexer.expect_space()?;
            let status = parse_status(&lexer.atom()?)
                .ok_or_else(|| lexer.error("expected OK, NO, BAD or BYE"))?;
            let (code, text) = parse_resp_text(&mut lexer)?;
            Ok(Response::Tagged {
                tag: tag.to_string(),
                status,
                code,
                text,
            })
        }
        other => Err(lexer.error(format!("unexpected start of response: {other:?}"))),
    }
}

fn parse_status(word: &str) -> Option<Status> {
    match word.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}

fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    if let Token::Number(n) = lexer.peek()? {
        lexer.next_token()?;
        lexer.expect_space()?;
        let kind = lexer.atom()?.to_ascii_uppercase();
        return Ok(match kind.as_str() {
            "EXISTS" => UntaggedResponse::Exists(n),
            "RECENT" => UntaggedResponse::Recent(n),
            "EXPUNGE" => UntaggedResponse::Expunge(n),
            "FETCH" => {
                lexer.expect_space()?;
                UntaggedResponse::Fetch {
                    seq: n,
                    items: fetch::parse_fetch_items(lexer)?,
                }
            }
            _ => UntaggedResponse::Other(format!("{n} {kind}{}", lexer.text())),
        });
    }

    let keyword = lexer.atom()?;
    let upper = keyword.to_ascii_uppercase();

    if let Some(status) = parse_status(&upper) {
        let (code, text) = parse_resp_text(lexer)?;
        return Ok(UntaggedResponse::Condition { status, code, text });
    }

    Ok(match upper.as_str() {
        "CAPABILITY" => UntaggedResponse::Capability(word_list(lexer)?),
        "FLAGS" => {
            lexer.expect_space()?;
            UntaggedResponse::Flags(lexer.atom_list()?)
        }
        "LIST" => UntaggedResponse::List(parse_list(lexer)?),
        "LSUB" => UntaggedResponse::Lsub(parse_list(lexer)?),
        "SEARCH" => {
            let mut hits = Vec::new();
            while lexer.skip_space() {
                hits.push(lexer.number()?);
            }
            UntaggedResponse::Search(hits)
        }
        _ => UntaggedResponse::Other(format!("{keyword}{}", lexer.text())),
    })
}

/// Space-separated atoms until the end of line or a `]`.
fn word_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    let mut words = Vec::new();
    while lexer.skip_space() {
        if matches!(lexer.peek_byte(), None | Some(b'\r' | b'\n' | b']')) {
            break;
        }
        words.push(lexer.atom()?);
    }
    Ok(words)
}

fn parse_list(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    lexer.expect_space()?;
    let attributes = lexer
        .atom_list()?
        .iter()
        .map(|a| MailboxAttribute::parse(a))
        .collect();
    lexer.expect_space()?;
    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::Quoted(s) => s.chars().next(),
        other => return Err(lexer.error(format!("expected delimiter, found {other:?}"))),
    };
    lexer.expect_space()?;
    let name = lexer.astring()?;
    Ok(ListResponse {
        attributes,
        delimiter,
        name,
    })
}

/// Parses `[code] text` after a status word.
fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    if !lexer.skip_space() {
        return Ok((None, String::new()));
    }

    let code = if lexer.peek_byte() == Some(b'[') {
        lexer.expect(&Token::LBracket)?;
        let code = parse_code(lexer)?;
        lexer.expect(&Token::RBracket)?;
        lexer.skip_space();
        Some(code)
    } else {
        None
    };

    Ok((code, lexer.text()))
}

fn parse_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    let name = lexer.atom()?;
    let code = match name.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "CAPABILITY" => ResponseCode::Capability(word_list(lexer)?),
        "UNSEEN" => {
            lexer.expect_space()?;
            ResponseCode::Unseen(lexer.number()?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            ResponseCode::UidValidity(lexer.number()?)
        }
        "UIDNEXT" => {
            lexer.expect_space()?;
            ResponseCode::UidNext(lexer.number()?)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(lexer.atom_list()?)
        }
        _ => {
            let rest = lexer.take_until(b']')?;
            ResponseCode::Other(format!("{name}{rest}"))
        }
    };
    Ok(code)
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
    fn test_tagged_ok() {
        let response = parse_response(b"A00001 OK done\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: "A00001".to_string(),
                status: Status::Ok,
                code: None,
                text: "done".to_string(),
            }
        );
    }

    #[test]
    fn test_tagged_no_with_code() {
        let response = parse_response(b"A00004 NO [TRYCREATE] No such mailbox\r\n").unwrap();
        let Response::Tagged {
            status, code, text, ..
        } = response
        else {
            panic!("expected tagged response");
        };
        assert_eq!(status, Status::No);
        assert_eq!(code, Some(ResponseCode::TryCreate));
        assert_eq!(text, "No such mailbox");
    }

    #[test]
    fn test_tagged_without_text() {
        let response = parse_response(b"A00002 OK\r\n").unwrap();
        assert!(matches!(response, Response::Tagged { ref text, .. } if text.is_empty()));
    }

    #[test]
    fn test_greeting_with_capability() {
        let response = parse_response(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Ok,
                code: Some(ResponseCode::Capability(vec![
                    "IMAP4rev1".to_string(),
                    "IDLE".to_string()
                ])),
                text: "ready".to_string(),
            })
        );
    }

    #[test]
    fn test_counts() {
        assert_eq!(
            parse_response(b"* 18 EXISTS\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Exists(18))
        );
        assert_eq!(
            parse_response(b"* 2 RECENT\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Recent(2))
        );
        let unseen = parse_response(b"* OK [UNSEEN 17] Message 17 is first unseen\r\n").unwrap();
        assert!(matches!(
            unseen,
            Response::Untagged(UntaggedResponse::Condition {
                code: Some(ResponseCode::Unseen(17)),
                ..
            })
        ));
    }

    #[test]
    fn test_list() {
        let response = parse_response(b"* LIST (\\HasNoChildren) \"/\" \"Sent Items\"\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::List(list)) = response else {
            panic!("expected list");
        };
        assert_eq!(list.delimiter, Some('/'));
        assert_eq!(list.name, "Sent Items");
        assert!(list.may_have_children());
        assert!(list.is_selectable());
    }

    #[test]
    fn test_list_nil_delimiter_and_noselect() {
        let response = parse_response(b"* LSUB (\\Noselect) NIL Archive\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Lsub(list)) = response else {
            panic!("expected lsub");
        };
        assert_eq!(list.delimiter, None);
        assert!(!list.is_selectable());
    }

    #[test]
    fn test_permanent_flags() {
        let response =
            parse_response(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Condition {
                code: Some(ResponseCode::PermanentFlags(ref flags)),
                ..
            }) if flags.len() == 3
        ));
    }

    #[test]
    fn test_fetch() {
        let response =
            parse_response(b"* 1 FETCH (FLAGS (\\Seen) RFC822.SIZE 4 RFC822 {4}\r\nab\r\n)\r\n")
                .unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Fetch {
                seq: 1,
                items: vec![
                    FetchItem::Flags(vec!["\\Seen".to_string()]),
                    FetchItem::Rfc822Size(4),
                    FetchItem::Rfc822(b"ab\r\n".to_vec()),
                ],
            })
        );
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            parse_response(b"+ idling\r\n").unwrap(),
            Response::Continuation {
                text: "idling".to_string()
            }
        );
        assert_eq!(
            parse_response(b"+\r\n").unwrap(),
            Response::Continuation {
                text: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_untagged() {
        assert_eq!(
            parse_response(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other(
                "NAMESPACE ((\"\" \"/\")) NIL NIL".to_string()
            ))
        );
    }

    #[test]
    fn test_search() {
        assert_eq!(
            parse_response(b"* SEARCH 2 3 6\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![2, 3, 6]))
        );
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_response(b")oops\r\n").is_err());
    }
}
