use crate::query::ParseError;

///
/// TokenKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TokenKind {
    Eof,
    Ident,
    Str,
    Number,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Like,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
    Regex,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

///
/// Token
///
/// One lexed token. `text` holds the lexeme for `Ident`/`Number` and the
/// unescaped content for `Str`; `pos` is the starting byte offset.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) text: String,
    pub(crate) pos: usize,
}

impl Token {
    fn symbol(kind: TokenKind, pos: usize) -> Self {
        Self {
            kind,
            text: String::new(),
            pos,
        }
    }
}

/// Lex the full input up front. The parser needs two-token lookahead for
/// embedded-option recognition, so a materialized stream is the simplest
/// shape.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();

        let start = self.pos;
        let Some(byte) = self.peek() else {
            return Ok(Token::symbol(TokenKind::Eof, start));
        };

        match byte {
            b'(' => Ok(self.take_symbol(TokenKind::LParen)),
            b')' => Ok(self.take_symbol(TokenKind::RParen)),
            b'[' => Ok(self.take_symbol(TokenKind::LBracket)),
            b']' => Ok(self.take_symbol(TokenKind::RBracket)),
            b',' => Ok(self.take_symbol(TokenKind::Comma)),
            b'=' => Ok(self.take_symbol(TokenKind::Eq)),
            b'>' => Ok(self.take_comparison(TokenKind::Gt, TokenKind::Gte)),
            b'<' => Ok(self.take_comparison(TokenKind::Lt, TokenKind::Lte)),
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Ok(Token::symbol(TokenKind::Ne, start))
                } else {
                    Err(ParseError::UnexpectedChar {
                        ch: '!',
                        position: start,
                    })
                }
            }
            b'"' | b'\'' => self.read_string(byte),
            b'-' => {
                // A leading '-' is only meaningful as a numeric sign.
                if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
                    self.read_number()
                } else {
                    Err(ParseError::UnexpectedChar {
                        ch: '-',
                        position: start,
                    })
                }
            }
            b if b.is_ascii_digit() => self.read_number(),
            b if b.is_ascii_alphabetic() || b == b'_' => Ok(self.read_identifier(start)),
            other => Err(ParseError::UnexpectedChar {
                ch: char::from(other),
                position: start,
            }),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn take_symbol(&mut self, kind: TokenKind) -> Token {
        let token = Token::symbol(kind, self.pos);
        self.pos += 1;
        token
    }

    // Greedy two-char match: '>=' / '<=' win over '>' / '<'.
    fn take_comparison(&mut self, single: TokenKind, with_eq: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 1;
        if self.peek() == Some(b'=') {
            self.pos += 1;
            Token::symbol(with_eq, start)
        } else {
            Token::symbol(single, start)
        }
    }

    fn read_string(&mut self, quote: u8) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;

        let mut raw = Vec::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnterminatedString { position: start }),
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(Token {
                        kind: TokenKind::Str,
                        text: String::from_utf8_lossy(&raw).into_owned(),
                        pos: start,
                    });
                }
                Some(b'\\') => {
                    // Escape: the next byte is taken literally.
                    match self.peek_at(1) {
                        None => return Err(ParseError::UnterminatedString { position: start }),
                        Some(escaped) => {
                            raw.push(escaped);
                            self.pos += 2;
                        }
                    }
                }
                Some(b) => {
                    raw.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        // '-digit' directly after the digits means this is a date-like
        // lexeme (2020-01-03), not arithmetic: switch to identifier mode.
        if self.peek() == Some(b'-') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            return Ok(self.read_identifier(start));
        }

        Ok(Token {
            kind: TokenKind::Number,
            text: self.lexeme(start),
            pos: start,
        })
    }

    // Identifiers continue with letters, digits, '_', ':' and '-', which is
    // what lets tags (account:123) and dates (2020-01-03-0415) stay single
    // tokens. Keywords are carved out afterwards, case-insensitively.
    fn read_identifier(&mut self, start: usize) -> Token {
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'-'))
        {
            self.pos += 1;
        }

        let text = self.lexeme(start);
        let kind = keyword_kind(&text).unwrap_or(TokenKind::Ident);
        Token {
            kind,
            text,
            pos: start,
        }
    }

    fn lexeme(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }
}

fn keyword_kind(text: &str) -> Option<TokenKind> {
    let kind = match text.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "like" => TokenKind::Like,
        "contains" => TokenKind::Contains,
        "icontains" => TokenKind::IContains,
        "starts_with" => TokenKind::StartsWith,
        "ends_with" => TokenKind::EndsWith,
        "regex" => TokenKind::Regex,
        "in" => TokenKind::In,
        _ => return None,
    };
    Some(kind)
}

///
/// TESTS
///
