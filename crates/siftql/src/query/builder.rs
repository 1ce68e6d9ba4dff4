//! Fluent construction of queries and filters without going through the
//! text parser. Useful for embedding, and for tests that need an AST the
//! grammar cannot produce.

use crate::query::{CompareOp, FilterNode, Query, SortOrder};
use crate::value::Value;
use std::ops::{BitAnd, BitOr};

///
/// QueryBuilder
///
/// Pure intent builder; `build` hands back the same immutable [`Query`] the
/// parser would produce. Repeated `filter` calls and-combine.
///

#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, node: FilterNode) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            None => node,
            Some(prev) => FilterNode::and(prev, node),
        });
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.query.sort_by = field.into();
        self
    }

    #[must_use]
    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.query.sort_order = order;
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.query.page_size = page_size;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = limit;
        self
    }

    #[must_use]
    pub fn build(self) -> Query {
        self.query
    }
}

/// Start a comparison against a named field: `field("price").lt(100)`.
#[must_use]
pub fn field(name: impl Into<String>) -> FieldExpr {
    FieldExpr(name.into())
}

///
/// FieldExpr
///

#[derive(Clone, Debug)]
pub struct FieldExpr(String);

impl FieldExpr {
    fn cmp(self, op: CompareOp, value: impl Into<Value>) -> FilterNode {
        FilterNode::compare(self.0, op, value.into())
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> FilterNode {
        self.cmp(CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> FilterNode {
        self.cmp(CompareOp::Ne, value)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> FilterNode {
        self.cmp(CompareOp::Gt, value)
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> FilterNode {
        self.cmp(CompareOp::Gte, value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> FilterNode {
        self.cmp(CompareOp::Lt, value)
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> FilterNode {
        self.cmp(CompareOp::Lte, value)
    }

    #[must_use]
    pub fn like(self, pattern: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::Like, pattern.into())
    }

    #[must_use]
    pub fn not_like(self, pattern: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::NotLike, pattern.into())
    }

    #[must_use]
    pub fn contains(self, term: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::Contains, term.into())
    }

    #[must_use]
    pub fn icontains(self, term: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::IContains, term.into())
    }

    #[must_use]
    pub fn starts_with(self, prefix: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::StartsWith, prefix.into())
    }

    #[must_use]
    pub fn ends_with(self, suffix: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::EndsWith, suffix.into())
    }

    #[must_use]
    pub fn regex(self, pattern: impl Into<String>) -> FilterNode {
        self.cmp(CompareOp::Regex, pattern.into())
    }

    #[must_use]
    pub fn in_list(self, values: impl IntoIterator<Item = Value>) -> FilterNode {
        self.cmp(CompareOp::In, Value::List(values.into_iter().collect()))
    }

    #[must_use]
    pub fn not_in_list(self, values: impl IntoIterator<Item = Value>) -> FilterNode {
        self.cmp(CompareOp::NotIn, Value::List(values.into_iter().collect()))
    }
}

impl BitAnd for FilterNode {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::and(self, rhs)
    }
}

impl BitOr for FilterNode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::or(self, rhs)
    }
}

///
/// TESTS
///
