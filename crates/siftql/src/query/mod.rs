mod ast;
mod builder;
mod cache;
mod lexer;
mod parser;


pub use ast::{CompareNode, CompareOp, DEFAULT_SEARCH_SENTINEL, FilterNode, LogicalOp};
pub use builder::{FieldExpr, QueryBuilder, field};
pub use cache::{CacheStats, ParserCache};
pub use parser::parse;

use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

///
/// SortOrder
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
    Random,
}

impl SortOrder {
    /// Flip ascending and descending; random is its own reverse.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
            Self::Random => Self::Random,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
            Self::Random => "random",
        };
        write!(f, "{label}")
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else if s.eq_ignore_ascii_case("random") {
            Ok(Self::Random)
        } else {
            Err(())
        }
    }
}

///
/// Query
///
/// The parsed request. Immutable after parse; executors never mutate it.
/// `sort_by` empty means the executor default; `limit` zero means no cap on
/// the total rows a pagination session may return.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub filter: Option<FilterNode>,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub page_size: u32,
    pub limit: u64,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            filter: None,
            sort_by: String::new(),
            sort_order: SortOrder::Asc,
            page_size: 10,
            limit: 0,
        }
    }
}

///
/// ParseError
///
/// First-error-wins parser failure. Every variant carries the byte position
/// of the offending input. `Clone + PartialEq` so cached parse failures are
/// returned verbatim.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ParseError {
    #[error("unexpected character {ch:?} at byte {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string starting at byte {position}")]
    UnterminatedString { position: usize },

    #[error("unexpected token {found:?} at byte {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of input at byte {position}")]
    UnexpectedEof { position: usize },

    #[error("unmatched '(' at byte {position}")]
    UnmatchedParen { position: usize },

    #[error("empty parentheses at byte {position}")]
    EmptyGroup { position: usize },

    #[error("missing operand at byte {position}")]
    MissingOperand { position: usize },

    #[error("'in' at byte {position} requires a bracketed list")]
    ExpectedBracketList { position: usize },

    #[error("unclosed '[' at byte {position}")]
    UnclosedBracket { position: usize },

    #[error("'not' at byte {position} must be followed by 'like' or 'in'")]
    BareNot { position: usize },

    #[error("invalid value for {option} at byte {position}")]
    InvalidOptionValue {
        option: &'static str,
        position: usize,
    },

    /// List/scalar operand mismatch on a comparison. The grammar cannot
    /// produce this shape; it is raised when policy validation meets a
    /// programmatically constructed AST.
    #[error("operator {operator} requires {expected} operand")]
    InvalidOperand {
        operator: CompareOp,
        expected: &'static str,
    },
}
