//! Tokenizer over one complete server response.
//!
//! The input is a full response as returned by the framing layer: literal
//! bytes appear inline right after their `{n}\r\n` announcement.

use crate::{Error, Result};

/// A lexical token. Borrowed variants point into the response buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom, including flag names such as `\Seen` and `\*`.
    Atom(&'a str),
    /// Non-negative number.
    Number(u32),
    /// Quoted string with escapes resolved.
    Quoted(String),
    /// Literal payload.
    Literal(&'a [u8]),
    /// `NIL`
    Nil,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// ` `
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `\r\n`
    Crlf,
    /// End of input.
    Eof,
}

/// Cursor over response bytes.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Starts at the beginning of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Next byte without consuming it.
    #[must_use]
    pub fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Next token without consuming it.
    pub fn peek(&mut self) -> Result<Token<'a>> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek_byte() else {
            return Ok(Token::Eof);
        };

        let single = match byte {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b' ' => Some(Token::Space),
            b'*' => Some(Token::Asterisk),
            b'+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }

        match byte {
            b'\r' if self.input.get(self.pos + 1) == Some(&b'\n') => {
                self.pos += 2;
                Ok(Token::Crlf)
            }
            b'\n' => {
                self.pos += 1;
                Ok(Token::Crlf)
            }
            b'"' => self.quoted(),
            b'{' => self.literal(),
            b'\\' if self.input.get(self.pos + 1) == Some(&b'*') => {
                let start = self.pos;
                self.pos += 2;
                Ok(Token::Atom(self.slice_str(start)?))
            }
            _ if is_atom_char(byte) => self.atom_or_number(),
            _ => Err(self.error(format!("unexpected byte {byte:#04x}"))),
        }
    }

    /// Consumes a single space.
    pub fn expect_space(&mut self) -> Result<()> {
        match self.next_token()? {
            Token::Space => Ok(()),
            other => Err(self.error(format!("expected space, found {other:?}"))),
        }
    }

    /// Consumes `token`, which must compare equal.
    pub fn expect(&mut self, token: &Token<'_>) -> Result<()> {
        let found = self.next_token()?;
        if &found == token {
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {found:?}")))
        }
    }

    /// Consumes a space if one is next.
    pub fn skip_space(&mut self) -> bool {
        if self.peek_byte() == Some(b' ') {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Reads a number.
    pub fn number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            other => Err(self.error(format!("expected number, found {other:?}"))),
        }
    }

    /// Reads an atom (numbers are accepted as their digits).
    pub fn atom(&mut self) -> Result<String> {
        let start = self.pos;
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(_) => Ok(self.slice_str(start)?.to_string()),
            Token::Nil => Ok("NIL".to_string()),
            other => Err(self.error(format!("expected atom, found {other:?}"))),
        }
    }

    /// Reads an astring: atom, quoted string or literal.
    pub fn astring(&mut self) -> Result<String> {
        let start = self.pos;
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(_) | Token::Nil => Ok(self.slice_str(start)?.to_string()),
            Token::Quoted(s) => Ok(s),
            Token::Literal(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            other => Err(self.error(format!("expected string, found {other:?}"))),
        }
    }

    /// Reads an nstring: `NIL`, quoted string or literal.
    pub fn nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::Quoted(s) => Ok(Some(s.into_bytes())),
            Token::Literal(bytes) => Ok(Some(bytes.to_vec())),
            other => Err(self.error(format!("expected nstring, found {other:?}"))),
        }
    }

    /// Reads a parenthesized list of atoms, e.g. a flag list.
    pub fn atom_list(&mut self) -> Result<Vec<String>> {
        self.expect(&Token::LParen)?;
        let mut items = Vec::new();
        loop {
            match self.peek()? {
                Token::RParen => {
                    self.pos += 1;
                    return Ok(items);
                }
                Token::Space => {
                    self.pos += 1;
                }
                _ => items.push(self.atom()?),
            }
        }
    }

    /// Consumes bytes up to (not including) `stop` or the end of line.
    pub fn take_until(&mut self, stop: u8) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == stop || b == b'\r' || b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        self.slice_str(start)
    }

    /// Consumes free text up to the line terminator.
    pub fn text(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b'\r' || b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    /// Skips one value of any shape, including nested lists.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_token()? {
                Token::LParen | Token::LBracket => depth += 1,
                Token::RParen | Token::RBracket => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| self.error("unbalanced parenthesis"))?;
                }
                Token::Crlf | Token::Eof => {
                    return Err(self.error("unexpected end of response"));
                }
                _ => {}
            }
            if depth == 0 && !matches!(self.peek_byte(), Some(b'[' | b'(')) {
                return Ok(());
            }
        }
    }

    /// Builds a parse error at the current position.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn slice_str(&self, start: usize) -> Result<&'a str> {
        std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("invalid UTF-8 in atom"))
    }

    fn atom_or_number(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while self.peek_byte().is_some_and(is_atom_char) {
            self.pos += 1;
        }
        let text = self.slice_str(start)?;

        if text.bytes().all(|b| b.is_ascii_digit())
            && let Ok(n) = text.parse::<u32>()
        {
            return Ok(Token::Number(n));
        }
        if text.eq_ignore_ascii_case("NIL") {
            return Ok(Token::Nil);
        }
        Ok(Token::Atom(text))
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek_byte() {
                None | Some(b'\r' | b'\n') => return Err(self.error("unterminated quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek_byte()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        Ok(Token::Quoted(String::from_utf8_lossy(&out).into_owned()))
    }

    fn literal(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let start = self.pos;
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let len: usize = self
            .slice_str(start)?
            .parse()
            .map_err(|_| self.error("invalid literal length"))?;
        if self.peek_byte() == Some(b'+') {
            self.pos += 1;
        }
        if self.peek_byte() != Some(b'}') {
            return Err(self.error("expected '}' after literal length"));
        }
        self.pos += 1;
        match self.next_token()? {
            Token::Crlf => {}
            _ => return Err(self.error("expected CRLF after literal length")),
        }

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("literal exceeds response"))?;
        let data = &self.input[self.pos..end];
        self.pos = end;
        Ok(Token::Literal(data))
    }
}

/// Bytes allowed inside an atom. `\` is included so flags lex as atoms.
const fn is_atom_char(b: u8) -> bool {
    !matches!(
        b,
        b'(' | b')' | b'{' | b' ' | b'%' | b'*' | b'"' | b']' | b'['
    ) && b > 0x1F
        && b != 0x7F
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

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    #[test]
    fn test_untagged_exists() {
        assert_eq!(
            tokens(b"* 3 EXISTS\r\n"),
            vec![
                Token::Asterisk,
                Token::Space,
                Token::Number(3),
                Token::Space,
                Token::Atom("EXISTS"),
                Token::Crlf,
            ]
        );
    }

    #[test]
    fn test_flags_and_wildcard() {
        assert_eq!(
            tokens(b"(\\Seen \\*)"),
            vec![
                Token::LParen,
                Token::Atom("\\Seen"),
                Token::Space,
                Token::Atom("\\*"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(
            tokens(b"\"a\\\"b\""),
            vec![Token::Quoted("a\"b".to_string())]
        );
    }

    #[test]
    fn test_literal_inline() {
        let input = b"{5}\r\nhello)";
        assert_eq!(
            tokens(input),
            vec![Token::Literal(b"hello"), Token::RParen]
        );
    }

    #[test]
    fn test_literal_too_long() {
        let mut lexer = Lexer::new(b"{10}\r\nabc");
        assert!(matches!(lexer.next_token(), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_nil_and_atoms() {
        assert_eq!(
            tokens(b"NIL RFC822.SIZE 12abc"),
            vec![
                Token::Nil,
                Token::Space,
                Token::Atom("RFC822.SIZE"),
                Token::Space,
                Token::Atom("12abc"),
            ]
        );
    }

    #[test]
    fn test_atom_list() {
        let mut lexer = Lexer::new(b"(\\Answered \\Seen $Junk)");
        assert_eq!(
            lexer.atom_list().unwrap(),
            vec!["\\Answered", "\\Seen", "$Junk"]
        );
    }

    #[test]
    fn test_skip_value_nested() {
        let mut lexer = Lexer::new(b"(\"a\" (1 2) NIL) UID 4");
        lexer.skip_value().unwrap();
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("UID"));
    }
}
