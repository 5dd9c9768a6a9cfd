//! Forward-only JSON token cursor
//!
//! Pull parser over a [`ByteFeed`]: the caller asks for one token at a
//! time and the cursor lexes it out of whatever chunks the feed delivers,
//! tracking the absolute byte offset for error reports. Structural commas
//! and colons are consumed rather than emitted, with commas checked
//! against the positions the grammar allows a separator; a string directly
//! followed by a colon comes out as [`Token::Field`], which is what lets
//! the document walker reason in member names instead of punctuation.

use bytes::Bytes;

use crate::decode::feed::ByteFeed;
use crate::error::{DecodeError, Error, Result};

/// One lexed token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `{`
    ObjectStart,
    /// `}`
    ObjectEnd,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// Object member name (string followed by `:`)
    Field(String),
    /// String value
    Str(String),
    /// Number value
    Num(f64),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
}

impl Token {
    /// Short description for malformed-input errors
    pub fn describe(&self) -> String {
        match self {
            Token::ObjectStart => "'{'".to_string(),
            Token::ObjectEnd => "'}'".to_string(),
            Token::ArrayStart => "'['".to_string(),
            Token::ArrayEnd => "']'".to_string(),
            Token::Field(name) => format!("member {:?}", truncated(name)),
            Token::Str(s) => format!("string {:?}", truncated(s)),
            Token::Num(n) => format!("number {}", n),
            Token::Bool(b) => format!("literal {}", b),
            Token::Null => "literal null".to_string(),
        }
    }
}

fn truncated(s: &str) -> String {
    if s.len() <= 24 {
        s.to_string()
    } else {
        let cut = (0..=24).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
        format!("{}…", &s[..cut])
    }
}

/// Token cursor over a chunked byte source
pub struct TokenCursor<F> {
    feed: F,
    buf: Bytes,
    pos: usize,
    base: u64,
    token_offset: u64,
    // Separator bookkeeping: a `,` is legal only directly after a value,
    // and must be followed by one.
    after_value: bool,
    pending_comma: bool,
}

impl<F: ByteFeed> TokenCursor<F> {
    /// Start lexing at the beginning of the feed
    pub fn new(feed: F) -> Self {
        TokenCursor {
            feed,
            buf: Bytes::new(),
            pos: 0,
            base: 0,
            token_offset: 0,
            after_value: false,
            pending_comma: false,
        }
    }

    /// Absolute byte offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Absolute byte offset at which the most recent token started
    pub fn token_offset(&self) -> u64 {
        self.token_offset
    }

    async fn refill(&mut self) -> Result<bool> {
        while self.pos >= self.buf.len() {
            self.base += self.buf.len() as u64;
            self.pos = 0;
            match self.feed.next_chunk().await? {
                Some(chunk) => self.buf = chunk,
                None => {
                    self.buf = Bytes::new();
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn peek_byte(&mut self) -> Result<Option<u8>> {
        if !self.refill().await? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.pos]))
    }

    async fn next_byte(&mut self) -> Result<Option<u8>> {
        if !self.refill().await? {
            return Ok(None);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Skip insignificant whitespace
    async fn skip_ws(&mut self) -> Result<()> {
        while let Some(b) = self.peek_byte().await? {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                _ => break,
            }
        }
        Ok(())
    }

    /// Consume at most one element separator, which is legal only directly
    /// after a completed value
    async fn skip_separator(&mut self) -> Result<()> {
        self.skip_ws().await?;
        while let Some(b',') = self.peek_byte().await? {
            self.token_offset = self.offset();
            if !self.after_value {
                return Err(DecodeError::Unexpected {
                    expected: "a value".to_string(),
                    found: "','".to_string(),
                    offset: self.token_offset,
                }
                .into());
            }
            self.pos += 1;
            self.after_value = false;
            self.pending_comma = true;
            self.skip_ws().await?;
        }
        Ok(())
    }

    /// Next token, or `None` at clean end of stream
    pub async fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_separator().await?;
        self.token_offset = self.offset();
        let b = match self.next_byte().await? {
            Some(b) => b,
            None => {
                if self.pending_comma {
                    return Err(self.eof("a value after ','"));
                }
                return Ok(None);
            }
        };
        let token = match b {
            b'{' => {
                self.check_value_position()?;
                Token::ObjectStart
            }
            b'}' => {
                self.check_closer_position("'}'")?;
                Token::ObjectEnd
            }
            b'[' => {
                self.check_value_position()?;
                Token::ArrayStart
            }
            b']' => {
                self.check_closer_position("']'")?;
                Token::ArrayEnd
            }
            b'"' => {
                self.check_value_position()?;
                let s = self.read_string().await?;
                if self.colon_follows().await? {
                    Token::Field(s)
                } else {
                    Token::Str(s)
                }
            }
            b't' => {
                self.check_value_position()?;
                self.expect_literal(b"rue").await?;
                Token::Bool(true)
            }
            b'f' => {
                self.check_value_position()?;
                self.expect_literal(b"alse").await?;
                Token::Bool(false)
            }
            b'n' => {
                self.check_value_position()?;
                self.expect_literal(b"ull").await?;
                Token::Null
            }
            b'-' | b'0'..=b'9' => {
                self.check_value_position()?;
                self.read_number(b).await?
            }
            other => {
                return Err(self.unexpected_byte(other));
            }
        };
        self.pending_comma = false;
        self.after_value = matches!(
            token,
            Token::Str(_)
                | Token::Num(_)
                | Token::Bool(_)
                | Token::Null
                | Token::ObjectEnd
                | Token::ArrayEnd
        );
        Ok(Some(token))
    }

    /// Two values in sequence need a separator between them
    fn check_value_position(&self) -> Result<()> {
        if self.after_value {
            return Err(DecodeError::Unexpected {
                expected: "',' or a closing bracket".to_string(),
                found: "start of a value".to_string(),
                offset: self.token_offset,
            }
            .into());
        }
        Ok(())
    }

    /// A separator directly before a closing bracket dangles
    fn check_closer_position(&self, closer: &str) -> Result<()> {
        if self.pending_comma {
            return Err(DecodeError::Unexpected {
                expected: "a value after ','".to_string(),
                found: closer.to_string(),
                offset: self.token_offset,
            }
            .into());
        }
        Ok(())
    }

    /// Peek past whitespace for a colon; consume it when found
    async fn colon_follows(&mut self) -> Result<bool> {
        loop {
            match self.peek_byte().await? {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => self.pos += 1,
                Some(b':') => {
                    self.pos += 1;
                    return Ok(true);
                }
                _ => return Ok(false),
            }
        }
    }

    async fn expect_literal(&mut self, rest: &[u8]) -> Result<()> {
        for &expected in rest {
            match self.next_byte().await? {
                Some(b) if b == expected => {}
                Some(b) => return Err(self.unexpected_byte(b)),
                None => {
                    return Err(DecodeError::UnexpectedEnd {
                        expected: "a JSON literal".to_string(),
                        offset: self.offset(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    async fn read_number(&mut self, first: u8) -> Result<Token> {
        let mut text = String::new();
        text.push(first as char);
        while let Some(b) = self.peek_byte().await? {
            match b {
                b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E' => {
                    text.push(b as char);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let value: f64 = text.parse().map_err(|_| DecodeError::Number {
            text: text.clone(),
            offset: self.token_offset,
        })?;
        Ok(Token::Num(value))
    }

    /// Read the remainder of a string whose opening quote is consumed
    async fn read_string(&mut self) -> Result<String> {
        let mut out: Vec<u8> = Vec::new();
        loop {
            let b = match self.next_byte().await? {
                Some(b) => b,
                None => {
                    return Err(DecodeError::UnexpectedEnd {
                        expected: "closing '\"'".to_string(),
                        offset: self.offset(),
                    }
                    .into())
                }
            };
            match b {
                b'"' => break,
                b'\\' => {
                    let esc =
                        self.next_byte()
                            .await?
                            .ok_or_else(|| DecodeError::UnexpectedEnd {
                                expected: "escape sequence".to_string(),
                                offset: self.offset(),
                            })?;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let c = self.read_unicode_escape().await?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        }
                        _ => {
                            return Err(DecodeError::Encoding {
                                offset: self.offset(),
                            }
                            .into())
                        }
                    }
                }
                other => out.push(other),
            }
        }
        String::from_utf8(out).map_err(|_| {
            DecodeError::Encoding {
                offset: self.token_offset,
            }
            .into()
        })
    }

    /// `\uXXXX`, including surrogate pairs
    async fn read_unicode_escape(&mut self) -> Result<char> {
        let hi = self.read_hex4().await?;
        let code = if (0xD800..=0xDBFF).contains(&hi) {
            // High surrogate: a `\uXXXX` low surrogate must follow.
            for expected in [b'\\', b'u'] {
                match self.next_byte().await? {
                    Some(b) if b == expected => {}
                    _ => {
                        return Err(DecodeError::Encoding {
                            offset: self.offset(),
                        }
                        .into())
                    }
                }
            }
            let lo = self.read_hex4().await?;
            if !(0xDC00..=0xDFFF).contains(&lo) {
                return Err(DecodeError::Encoding {
                    offset: self.offset(),
                }
                .into());
            }
            0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
        } else {
            hi
        };
        char::from_u32(code).ok_or_else(|| {
            DecodeError::Encoding {
                offset: self.offset(),
            }
            .into()
        })
    }

    async fn read_hex4(&mut self) -> Result<u32> {
        let mut code = 0u32;
        for _ in 0..4 {
            let b = self
                .next_byte()
                .await?
                .ok_or_else(|| DecodeError::UnexpectedEnd {
                    expected: "4 hex digits".to_string(),
                    offset: self.offset(),
                })?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| DecodeError::Encoding {
                    offset: self.offset(),
                })?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    // ========================================================================
    // Structural expectations used by the document walker
    // ========================================================================

    /// Error for a token that contradicts the format
    pub fn unexpected(&self, expected: &str, found: &Token) -> Error {
        DecodeError::Unexpected {
            expected: expected.to_string(),
            found: found.describe(),
            offset: self.token_offset,
        }
        .into()
    }

    /// Error for a stream that ended where a token was required
    pub fn eof(&self, expected: &str) -> Error {
        DecodeError::UnexpectedEnd {
            expected: expected.to_string(),
            offset: self.offset(),
        }
        .into()
    }

    fn unexpected_byte(&self, byte: u8) -> Error {
        DecodeError::Unexpected {
            expected: "a JSON token".to_string(),
            found: format!("byte {:?}", byte as char),
            offset: self.token_offset,
        }
        .into()
    }

    /// Next token, treating end of stream as malformed
    pub async fn require_token(&mut self, expected: &str) -> Result<Token> {
        match self.next_token().await? {
            Some(token) => Ok(token),
            None => Err(self.eof(expected)),
        }
    }

    /// Consume `{`
    pub async fn expect_object_start(&mut self) -> Result<()> {
        match self.require_token("'{'").await? {
            Token::ObjectStart => Ok(()),
            other => Err(self.unexpected("'{'", &other)),
        }
    }

    /// Consume `[`
    pub async fn expect_array_start(&mut self) -> Result<()> {
        match self.require_token("'['").await? {
            Token::ArrayStart => Ok(()),
            other => Err(self.unexpected("'['", &other)),
        }
    }

    /// Consume a string value
    pub async fn expect_string(&mut self) -> Result<String> {
        match self.require_token("a string").await? {
            Token::Str(s) => Ok(s),
            other => Err(self.unexpected("a string", &other)),
        }
    }

    /// Next member name inside an object, or `None` at the closing `}`
    pub async fn next_member(&mut self) -> Result<Option<String>> {
        match self.require_token("member name or '}'").await? {
            Token::Field(name) => Ok(Some(name)),
            Token::ObjectEnd => Ok(None),
            other => Err(self.unexpected("member name or '}'", &other)),
        }
    }

    /// Consume `[ number, … ]` into a vector
    pub async fn read_number_array(&mut self) -> Result<Vec<f64>> {
        self.expect_array_start().await?;
        let mut values = Vec::new();
        loop {
            match self.require_token("number or ']'").await? {
                Token::Num(n) => values.push(n),
                Token::ArrayEnd => return Ok(values),
                other => return Err(self.unexpected("number or ']'", &other)),
            }
        }
    }

    /// Consume one complete value of any shape, keeping the cursor
    /// synchronized past members the schema does not ask for
    pub async fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.require_token("a value").await? {
                Token::ObjectStart | Token::ArrayStart => depth += 1,
                Token::ObjectEnd | Token::ArrayEnd => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        DecodeError::Unexpected {
                            expected: "a value".to_string(),
                            found: "closing bracket".to_string(),
                            offset: self.token_offset,
                        }
                    })?;
                }
                Token::Field(_) if depth > 0 => {}
                Token::Field(name) => {
                    let found = Token::Field(name).describe();
                    return Err(DecodeError::Unexpected {
                        expected: "a value".to_string(),
                        found,
                        offset: self.token_offset,
                    }
                    .into());
                }
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }
}
