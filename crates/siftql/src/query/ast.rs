use crate::value::Value;
use std::fmt;

/// Field-name sentinel the parser writes for bare search terms.
///
/// Executors substitute their configured default search field; the sentinel
/// keeps the parser backend-independent.
pub const DEFAULT_SEARCH_SENTINEL: &str = "__DEFAULT_SEARCH__";

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
    Regex,
    In,
    NotIn,
}

impl CompareOp {
    /// `In`/`NotIn` require a `Value::List` operand; everything else a scalar.
    #[must_use]
    pub const fn is_list_op(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Mirror an ordering operator for reversed-direction traversal.
    /// Non-ordering operators are unchanged.
    #[must_use]
    pub const fn mirrored(self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
            other => other,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::In => "in",
            Self::NotIn => "not in",
        };
        write!(f, "{label}")
    }
}

///
/// LogicalOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

///
/// CompareNode
///

#[derive(Clone, Debug, PartialEq)]
pub struct CompareNode {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

///
/// FilterNode
///
/// Pure representation of a parsed filter. `And`/`Or` are strictly binary;
/// negation exists only as `NotLike`/`NotIn`/`Ne`. Interpretation happens in
/// the executor policy and backend mapping passes.
///

#[derive(Clone, Debug, PartialEq)]
pub enum FilterNode {
    Compare(CompareNode),
    Binary {
        op: LogicalOp,
        left: Box<FilterNode>,
        right: Box<FilterNode>,
    },
}

impl FilterNode {
    #[must_use]
    pub fn compare(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self::Compare(CompareNode {
            field: field.into(),
            op,
            value,
        })
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::Binary {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Binary {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Visit every field name referenced by this filter, in-order.
    pub fn for_each_field(&self, visit: &mut impl FnMut(&str)) {
        match self {
            Self::Compare(cmp) => visit(&cmp.field),
            Self::Binary { left, right, .. } => {
                left.for_each_field(visit);
                right.for_each_field(visit);
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{CompareOp, FilterNode};
    use crate::value::Value;

    #[test]
    fn for_each_field_walks_in_order() {
        let filter = FilterNode::or(
            FilterNode::and(
                FilterNode::compare("status", CompareOp::Eq, Value::from("active")),
                FilterNode::compare("age", CompareOp::Gte, Value::Int(18)),
            ),
            FilterNode::compare("featured", CompareOp::Eq, Value::Bool(true)),
        );

        let mut seen = Vec::new();
        filter.for_each_field(&mut |field| seen.push(field.to_owned()));
        assert_eq!(seen, ["status", "age", "featured"]);
    }

    #[test]
    fn mirrored_flips_only_ordering_operators() {
        assert_eq!(CompareOp::Gt.mirrored(), CompareOp::Lt);
        assert_eq!(CompareOp::Lte.mirrored(), CompareOp::Gte);
        assert_eq!(CompareOp::Eq.mirrored(), CompareOp::Eq);
        assert_eq!(CompareOp::Like.mirrored(), CompareOp::Like);
    }
}
