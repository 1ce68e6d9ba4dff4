use crate::cursor::CursorError;
use crate::query::ParseError;
use thiserror::Error as ThisError;

///
/// Error
///
/// Consumer-visible error taxonomy shared by every executor. Kinds are
/// matchable by variant; backend causes stay reachable through `source()`.
///

#[derive(Debug, ThisError)]
pub enum Error {
    /// Total count and returned page are both zero.
    #[error("no records found")]
    NoRecordsFound,

    /// A field name failed the `[A-Za-z_][A-Za-z0-9_]*` syntax check.
    #[error("invalid field name: {field:?}")]
    InvalidFieldName { field: String },

    /// A field is absent from a non-empty allow-list.
    #[error("field not allowed: {field:?}")]
    FieldNotAllowed { field: String },

    /// The parser rejected the input, or an executor met a malformed AST.
    /// The typed cause stays matchable, byte position included.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] ParseError),

    /// The supplied cursor string cannot be decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    /// Advisory: executors clamp oversized page sizes silently and never
    /// raise this themselves.
    #[error("page size {requested} exceeds maximum {max}")]
    PageSizeExceeded { requested: u32, max: u32 },

    /// `REGEX` used while the executor has regex disabled.
    #[error("regex operator is disabled for this executor")]
    RegexNotSupported,

    /// `random` sort order used while the executor disallows it.
    #[error("random sort order is not allowed for this executor")]
    RandomOrderNotAllowed,

    /// A backend call failed; the operation label says which one.
    #[error("{operation} failed: {source}")]
    Execution {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The destination cannot receive this page.
    #[error("invalid destination: {message}")]
    InvalidDestination { message: String },
}

impl Error {
    /// Wrap a backend cause with the operation that failed.
    pub fn execution(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            operation,
            source: Box::new(source),
        }
    }

    pub fn invalid_field(field: impl Into<String>) -> Self {
        Self::InvalidFieldName {
            field: field.into(),
        }
    }

    pub fn field_not_allowed(field: impl Into<String>) -> Self {
        Self::FieldNotAllowed {
            field: field.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NoRecordsFound)
    }
}

///
/// TESTS
///
