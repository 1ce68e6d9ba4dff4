use crate::query::lexer::{Token, TokenKind, tokenize};
use crate::query::{
    CompareOp, DEFAULT_SEARCH_SENTINEL, FilterNode, ParseError, Query, SortOrder,
};
use crate::value::{Value, parse_datetime};

/// Parse a query string into a [`Query`].
///
/// The filter expression, bare search terms, and embedded options
/// (`page_size`, `limit`, `sort_by`, `sort_order`) share one token stream;
/// options are extracted wherever they appear outside parentheses, last
/// occurrence winning. The first error aborts the parse.
pub fn parse(input: &str) -> Result<Query, ParseError> {
    let tokens = tokenize(input)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        query: Query::default(),
    }
    .run()
}

///
/// OptionKey
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum OptionKey {
    PageSize,
    Limit,
    SortBy,
    SortOrder,
}

impl OptionKey {
    fn from_name(name: &str) -> Option<Self> {
        let key = match name {
            "page_size" => Self::PageSize,
            "limit" => Self::Limit,
            "sort_by" => Self::SortBy,
            "sort_order" => Self::SortOrder,
            _ => return None,
        };
        Some(key)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::PageSize => "page_size",
            Self::Limit => "limit",
            Self::SortBy => "sort_by",
            Self::SortOrder => "sort_order",
        }
    }
}

///
/// Parser
///
/// Recursive descent over the materialized token stream. `depth` tracks
/// parenthesis nesting; option assignments are only recognized at depth 0 so
/// grouped expressions stay pure filters.
///

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
    query: Query,
}

impl Parser {
    fn run(mut self) -> Result<Query, ParseError> {
        let mut filter: Option<FilterNode> = None;

        loop {
            self.consume_options()?;
            if self.peek_kind() == TokenKind::Eof {
                break;
            }
            let expr = self.parse_or()?;
            filter = Some(match filter {
                None => expr,
                Some(prev) => FilterNode::and(prev, expr),
            });
        }

        self.query.filter = filter;
        Ok(self.query)
    }

    // ------------------------------------------------------------------
    // Token stream
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        // The stream always terminates with Eof, so the last token is a
        // safe fallback.
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) {
        if self.peek_kind() != TokenKind::Eof {
            self.pos += 1;
        }
    }

    fn take(&mut self) -> Token {
        let token = self.peek().clone();
        self.advance();
        token
    }

    // ------------------------------------------------------------------
    // Embedded options
    // ------------------------------------------------------------------

    fn consume_options(&mut self) -> Result<(), ParseError> {
        while self.depth == 0 {
            if self.peek_kind() != TokenKind::Ident || self.peek_kind_at(1) != TokenKind::Eq {
                break;
            }
            let Some(option) = OptionKey::from_name(&self.peek().text) else {
                break;
            };

            self.advance(); // option name
            let eq_pos = self.peek().pos;
            self.advance(); // '='
            self.apply_option(option, eq_pos)?;
        }
        Ok(())
    }

    fn apply_option(&mut self, option: OptionKey, eq_pos: usize) -> Result<(), ParseError> {
        let token = match self.peek_kind() {
            TokenKind::Str | TokenKind::Number | TokenKind::Ident => self.take(),
            TokenKind::Eof => return Err(ParseError::MissingOperand { position: eq_pos }),
            _ => return Err(self.unexpected()),
        };
        let invalid = ParseError::InvalidOptionValue {
            option: option.label(),
            position: token.pos,
        };

        match option {
            OptionKey::PageSize => {
                self.query.page_size = token.text.parse::<u32>().map_err(|_| invalid)?;
            }
            OptionKey::Limit => {
                self.query.limit = token.text.parse::<u64>().map_err(|_| invalid)?;
            }
            OptionKey::SortBy => {
                if token.kind == TokenKind::Number {
                    return Err(invalid);
                }
                self.query.sort_by = token.text;
            }
            OptionKey::SortOrder => {
                self.query.sort_order = token.text.parse::<SortOrder>().map_err(|()| invalid)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_or(&mut self) -> Result<FilterNode, ParseError> {
        let mut left = self.parse_and()?;

        while self.peek_kind() == TokenKind::Or {
            let or_pos = self.peek().pos;
            self.advance();
            self.consume_options()?;
            if !self.starts_comparison() {
                return Err(ParseError::MissingOperand { position: or_pos });
            }
            let right = self.parse_and()?;
            left = FilterNode::or(left, right);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterNode, ParseError> {
        self.consume_options()?;
        let mut left = self.parse_comparison()?;

        loop {
            self.consume_options()?;
            match self.peek_kind() {
                TokenKind::And => {
                    let and_pos = self.peek().pos;
                    self.advance();
                    self.consume_options()?;
                    if !self.starts_comparison() {
                        return Err(ParseError::MissingOperand { position: and_pos });
                    }
                    let right = self.parse_comparison()?;
                    left = FilterNode::and(left, right);
                }
                // Adjacent comparisons with no connective: implicit and.
                TokenKind::Ident | TokenKind::Str | TokenKind::LParen => {
                    let right = self.parse_comparison()?;
                    left = FilterNode::and(left, right);
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn starts_comparison(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Ident | TokenKind::Str | TokenKind::LParen | TokenKind::Not
        )
    }

    fn parse_comparison(&mut self) -> Result<FilterNode, ParseError> {
        match self.peek_kind() {
            TokenKind::LParen => self.parse_group(),
            TokenKind::Str => {
                let token = self.take();
                Ok(bare_term(token.text))
            }
            TokenKind::Ident => self.parse_field_or_term(),
            TokenKind::Not => Err(ParseError::BareNot {
                position: self.peek().pos,
            }),
            TokenKind::Eof => Err(ParseError::UnexpectedEof {
                position: self.peek().pos,
            }),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_group(&mut self) -> Result<FilterNode, ParseError> {
        let open_pos = self.peek().pos;
        self.advance();
        self.depth += 1;

        if self.peek_kind() == TokenKind::RParen {
            return Err(ParseError::EmptyGroup { position: open_pos });
        }

        let expr = self.parse_or()?;

        if self.peek_kind() != TokenKind::RParen {
            return Err(ParseError::UnmatchedParen { position: open_pos });
        }
        self.advance();
        self.depth -= 1;

        Ok(expr)
    }

    fn parse_field_or_term(&mut self) -> Result<FilterNode, ParseError> {
        let field_token = self.take();
        let field = field_token.text;

        let op = match self.peek_kind() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::Like => CompareOp::Like,
            TokenKind::Contains => CompareOp::Contains,
            TokenKind::IContains => CompareOp::IContains,
            TokenKind::StartsWith => CompareOp::StartsWith,
            TokenKind::EndsWith => CompareOp::EndsWith,
            TokenKind::Regex => CompareOp::Regex,
            TokenKind::In => {
                let in_pos = self.peek().pos;
                self.advance();
                return self.parse_membership(field, CompareOp::In, in_pos);
            }
            TokenKind::Not => {
                let not_pos = self.peek().pos;
                self.advance();
                return match self.peek_kind() {
                    TokenKind::Like => {
                        let like_pos = self.peek().pos;
                        self.advance();
                        let value = self.parse_value(like_pos)?;
                        Ok(FilterNode::compare(field, CompareOp::NotLike, value))
                    }
                    TokenKind::In => {
                        let in_pos = self.peek().pos;
                        self.advance();
                        self.parse_membership(field, CompareOp::NotIn, in_pos)
                    }
                    _ => Err(ParseError::BareNot { position: not_pos }),
                };
            }
            // No operator follows: this identifier is a bare search term.
            _ => return Ok(bare_term(field)),
        };

        let op_pos = self.peek().pos;
        self.advance();
        let value = self.parse_value(op_pos)?;
        Ok(FilterNode::compare(field, op, value))
    }

    fn parse_membership(
        &mut self,
        field: String,
        op: CompareOp,
        in_pos: usize,
    ) -> Result<FilterNode, ParseError> {
        if self.peek_kind() != TokenKind::LBracket {
            return Err(ParseError::ExpectedBracketList { position: in_pos });
        }
        let bracket_pos = self.peek().pos;
        self.advance();

        let mut items = Vec::new();
        if self.peek_kind() == TokenKind::RBracket {
            self.advance();
            return Ok(FilterNode::compare(field, op, Value::List(items)));
        }

        loop {
            items.push(self.parse_value(bracket_pos)?);
            match self.peek_kind() {
                TokenKind::Comma => self.advance(),
                TokenKind::RBracket => {
                    self.advance();
                    return Ok(FilterNode::compare(field, op, Value::List(items)));
                }
                TokenKind::Eof => {
                    return Err(ParseError::UnclosedBracket {
                        position: bracket_pos,
                    });
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_value(&mut self, anchor_pos: usize) -> Result<Value, ParseError> {
        match self.peek_kind() {
            TokenKind::Str => {
                let token = self.take();
                Ok(Value::Text(token.text))
            }
            TokenKind::Number => {
                let token = self.take();
                Ok(number_value(&token.text))
            }
            TokenKind::Ident => {
                let token = self.take();
                Ok(ident_value(token.text))
            }
            TokenKind::Eof => Err(ParseError::MissingOperand {
                position: anchor_pos,
            }),
            _ => Err(self.unexpected()),
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        let found = if token.text.is_empty() {
            symbol_label(token.kind).to_owned()
        } else {
            token.text.clone()
        };
        ParseError::UnexpectedToken {
            found,
            position: token.pos,
        }
    }
}

fn bare_term(term: String) -> FilterNode {
    FilterNode::compare(DEFAULT_SEARCH_SENTINEL, CompareOp::Contains, Value::Text(term))
}

// A '.' makes the number a float; otherwise the narrowest integer fit wins,
// falling back to float for out-of-range digits.
fn number_value(text: &str) -> Value {
    if text.contains('.') {
        text.parse::<f64>()
            .map_or_else(|_| Value::Text(text.to_owned()), Value::Float)
    } else {
        match text.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => text
                .parse::<f64>()
                .map_or_else(|_| Value::Text(text.to_owned()), Value::Float),
        }
    }
}

// Unquoted identifiers type as date/time, then boolean, then plain text.
fn ident_value(text: String) -> Value {
    if let Some(dt) = parse_datetime(&text) {
        return Value::DateTime(dt);
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::Text(text)
}

const fn symbol_label(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Eof => "<eof>",
        TokenKind::Eq => "=",
        TokenKind::Ne => "!=",
        TokenKind::Gt => ">",
        TokenKind::Gte => ">=",
        TokenKind::Lt => "<",
        TokenKind::Lte => "<=",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Comma => ",",
        _ => "<token>",
    }
}

///
/// TESTS
///
