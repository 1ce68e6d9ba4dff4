//! Core runtime for siftql: the filter/pagination query language, the parser
//! cache, the opaque cursor codec, and the backend executors.
//!
//! A query string such as `status = active and age >= 18 sort_by = id` is
//! parsed into a [`query::Query`], validated against per-executor policy, and
//! mapped onto one of three backends: a parameterized SQL builder, a
//! document-store filter tree, or an in-process collection scan. Every
//! executor returns a page of records plus opaque cursors for forward and
//! backward navigation.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod cursor;
pub mod error;
pub mod executor;
pub mod query;
pub mod value;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No drivers, wire types, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        error::Error,
        executor::{Executor, ExecutorOptions, Page},
        query::{CompareOp, FilterNode, LogicalOp, Query, QueryBuilder, SortOrder, field, parse},
        value::Value,
    };
}
