mod document;
mod memory;
mod pattern;
mod policy;
mod restricted;
mod sql;

pub use document::{DocumentDriver, DocumentExecutor, DocumentFind, DocumentOrder};
pub use memory::{FieldAccessor, MemoryExecutor, RecordSource};
pub use restricted::RestrictedExecutor;
pub use sql::{SqlDriver, SqlExecutor, SqlFragment, SqlSelect};

use crate::error::Error;
use crate::query::{Query, SortOrder};
use crate::value::Value;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// Executor
///
/// Uniform execution contract every backend implements. `execute` writes up
/// to one page of records into `dest` and never leaves a partial page behind
/// on error; `count` applies only the filter, ignoring pagination, limit,
/// and cursor. Dropping the returned future cancels at the next backend
/// await point.
///

#[async_trait]
pub trait Executor<T: Send>: Send + Sync {
    /// Stable backend name for diagnostics.
    fn name(&self) -> &str;

    /// Run the query, append one page to `dest`, and report pagination
    /// state. `cursor` is a token from a previous call's [`Page`].
    async fn execute(
        &self,
        query: &Query,
        cursor: Option<&str>,
        dest: &mut Vec<T>,
    ) -> Result<Page, Error>;

    /// Total records matching the filter.
    async fn count(&self, query: &Query) -> Result<i64, Error>;

    /// Release executor-owned resources. Externally owned backend handles
    /// are left open; wrappers close recursively.
    async fn close(&self) -> Result<(), Error>;
}

///
/// Page
///
/// Pagination metadata returned alongside the destination. Cursors are
/// `None` when the respective page does not exist; `showing_from`/`to` are
/// 1-based positions within the overall result, zero on an empty page.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Page {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub total_items: i64,
    pub showing_from: u64,
    pub showing_to: u64,
    pub items_returned: u64,
}

/// Domain-level value rewrite hook, applied to every comparison leaf (and
/// each array element) after parsing but before predicate construction.
/// Errors propagate to the caller unchanged; use [`Error::execution`] to
/// attach an operation label.
pub type ValueConverter = Arc<dyn Fn(&str, Value) -> Result<Value, Error> + Send + Sync>;

///
/// ExecutorOptions
///
/// Per-executor policy, constructed before the executor and read-only
/// afterwards. An empty `allowed_fields` list means unrestricted;
/// `max_page_size` zero means uncapped.
///

#[derive(Clone)]
pub struct ExecutorOptions {
    pub max_page_size: u32,
    pub default_page_size: u32,
    pub default_sort_field: String,
    pub default_sort_order: SortOrder,
    pub allow_random_order: bool,
    /// Literal SQL expression used for `ORDER BY` under random order.
    pub random_function_name: String,
    /// SQL spelling of the regex operator (`REGEXP`, or `~` on Postgres).
    pub regex_operator: String,
    /// Keyset tiebreaker and cursor key; schemas name this differently.
    pub id_field_name: String,
    /// Substituted for bare search terms; empty disables bare search.
    pub default_search_field: String,
    pub allowed_fields: Vec<String>,
    pub disable_regex: bool,
    pub value_converter: Option<ValueConverter>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_page_size: 0,
            default_page_size: 10,
            default_sort_field: String::new(),
            default_sort_order: SortOrder::Asc,
            allow_random_order: false,
            random_function_name: "RANDOM()".to_owned(),
            regex_operator: "REGEXP".to_owned(),
            id_field_name: "id".to_owned(),
            default_search_field: String::new(),
            allowed_fields: Vec::new(),
            disable_regex: false,
            value_converter: None,
        }
    }
}

impl fmt::Debug for ExecutorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("max_page_size", &self.max_page_size)
            .field("default_page_size", &self.default_page_size)
            .field("default_sort_field", &self.default_sort_field)
            .field("default_sort_order", &self.default_sort_order)
            .field("allow_random_order", &self.allow_random_order)
            .field("random_function_name", &self.random_function_name)
            .field("regex_operator", &self.regex_operator)
            .field("id_field_name", &self.id_field_name)
            .field("default_search_field", &self.default_search_field)
            .field("allowed_fields", &self.allowed_fields)
            .field("disable_regex", &self.disable_regex)
            .field("value_converter", &self.value_converter.is_some())
            .finish()
    }
}

///
/// DriverError
///
/// Error surface of the backend driver traits. Executors wrap these into
/// [`Error::Execution`] with the operation that failed.
///

#[derive(Debug, ThisError)]
pub enum DriverError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("row decode error: {0}")]
    Decode(String),
}
