//! Shared executor policy: page-size clamping, default-search rewriting,
//! allow-list and field-syntax validation, operator policy, the value
//! converter hook, and the pagination window/cursor arithmetic. Backends
//! differ only in how the resolved filter is materialized.

use crate::cursor::{Cursor, Direction};
use crate::error::Error;
use crate::executor::{ExecutorOptions, Page, ValueConverter};
use crate::query::{
    CompareNode, DEFAULT_SEARCH_SENTINEL, CompareOp, FilterNode, ParseError, Query, SortOrder,
};
use crate::value::Value;

/// Identifier syntax accepted in backend queries. The sole line of defence
/// against identifier injection for backends that splice field names into
/// query text.
pub(crate) fn is_valid_field_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let Some(&first) = bytes.first() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return false;
    }
    bytes[1..]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Step 1: non-positive page sizes take the default; a configured maximum
/// clamps silently.
pub(crate) fn effective_page_size(query: &Query, options: &ExecutorOptions) -> u32 {
    let mut page_size = if query.page_size == 0 {
        options.default_page_size
    } else {
        query.page_size
    };
    if options.max_page_size > 0 && page_size > options.max_page_size {
        page_size = options.max_page_size;
    }
    page_size
}

/// Step 3: every user-mentioned field (filter fields plus an explicit sort
/// field) must appear in a non-empty allow-list. The bare-search sentinel is
/// executor configuration, not user input, and is exempt.
pub(crate) fn check_allow_list(
    filter: Option<&FilterNode>,
    sort_by: &str,
    allowed: &[String],
) -> Result<(), Error> {
    if allowed.is_empty() {
        return Ok(());
    }

    let mut rejected: Option<String> = None;
    if let Some(filter) = filter {
        filter.for_each_field(&mut |field| {
            if rejected.is_none()
                && field != DEFAULT_SEARCH_SENTINEL
                && !allowed.iter().any(|a| a == field)
            {
                rejected = Some(field.to_owned());
            }
        });
    }
    if let Some(field) = rejected {
        return Err(Error::field_not_allowed(field));
    }

    if !sort_by.is_empty() && !allowed.iter().any(|a| a == sort_by) {
        return Err(Error::field_not_allowed(sort_by));
    }
    Ok(())
}

/// Steps 2-6 for the filter tree: sentinel rewrite, allow-list, field
/// syntax, operator policy, then the value converter hook.
pub(crate) fn resolve_filter(
    query: &Query,
    options: &ExecutorOptions,
) -> Result<Option<FilterNode>, Error> {
    let Some(filter) = query.filter.as_ref() else {
        check_allow_list(None, &query.sort_by, &options.allowed_fields)?;
        return Ok(None);
    };

    let rewritten = rewrite_search(filter, options)?;
    check_allow_list(Some(filter), &query.sort_by, &options.allowed_fields)?;
    validate_field_syntax(&rewritten)?;
    check_operator_policy(&rewritten, options)?;
    let converted = convert_values(rewritten, options)?;
    Ok(Some(converted))
}

/// Resolve the sort field and order: explicit sort wins, then the
/// executor's default sort field, then the ID field. Random order must be
/// explicitly allowed.
pub(crate) fn resolve_sort(
    query: &Query,
    options: &ExecutorOptions,
) -> Result<(String, SortOrder), Error> {
    // The parser default (ascending, no field) yields to the executor's
    // configured default order; any explicit choice is preserved.
    let order = if query.sort_by.is_empty() && query.sort_order == SortOrder::Asc {
        options.default_sort_order
    } else {
        query.sort_order
    };

    if order == SortOrder::Random && !options.allow_random_order {
        return Err(Error::RandomOrderNotAllowed);
    }

    let field = if query.sort_by.is_empty() {
        if options.default_sort_field.is_empty() {
            options.id_field_name.clone()
        } else {
            options.default_sort_field.clone()
        }
    } else {
        query.sort_by.clone()
    };

    if !is_valid_field_name(&field) {
        return Err(Error::invalid_field(field));
    }
    if !is_valid_field_name(&options.id_field_name) {
        return Err(Error::invalid_field(options.id_field_name.clone()));
    }

    Ok((field, order))
}

/// Step 7: decode the incoming cursor token, if any.
pub(crate) fn decode_cursor(cursor: Option<&str>) -> Result<Option<Cursor>, Error> {
    match cursor {
        None => Ok(None),
        Some(token) => Ok(Cursor::decode(token)?),
    }
}

// ----------------------------------------------------------------------
// Filter passes
// ----------------------------------------------------------------------

fn rewrite_search(node: &FilterNode, options: &ExecutorOptions) -> Result<FilterNode, Error> {
    match node {
        FilterNode::Binary { op, left, right } => Ok(FilterNode::Binary {
            op: *op,
            left: Box::new(rewrite_search(left, options)?),
            right: Box::new(rewrite_search(right, options)?),
        }),
        FilterNode::Compare(cmp) => {
            if cmp.field != DEFAULT_SEARCH_SENTINEL {
                return Ok(node.clone());
            }
            let field = options.default_search_field.clone();
            if !is_valid_field_name(&field) {
                return Err(Error::invalid_field(field));
            }
            Ok(FilterNode::Compare(CompareNode {
                field,
                op: cmp.op,
                value: cmp.value.clone(),
            }))
        }
    }
}

fn validate_field_syntax(node: &FilterNode) -> Result<(), Error> {
    let mut invalid: Option<String> = None;
    node.for_each_field(&mut |field| {
        if invalid.is_none() && !is_valid_field_name(field) {
            invalid = Some(field.to_owned());
        }
    });
    invalid.map_or(Ok(()), |field| Err(Error::invalid_field(field)))
}

fn check_operator_policy(node: &FilterNode, options: &ExecutorOptions) -> Result<(), Error> {
    walk_compares(node, &mut |cmp| {
        if cmp.op == CompareOp::Regex && options.disable_regex {
            return Err(Error::RegexNotSupported);
        }
        if cmp.op.is_list_op() != cmp.value.is_list() {
            return Err(Error::InvalidQuery(ParseError::InvalidOperand {
                operator: cmp.op,
                expected: if cmp.op.is_list_op() {
                    "an array"
                } else {
                    "a scalar"
                },
            }));
        }
        Ok(())
    })
}

fn convert_values(node: FilterNode, options: &ExecutorOptions) -> Result<FilterNode, Error> {
    let Some(converter) = options.value_converter.as_ref() else {
        return Ok(node);
    };

    fn map_node(node: FilterNode, converter: &ValueConverter) -> Result<FilterNode, Error> {
        match node {
            FilterNode::Binary { op, left, right } => Ok(FilterNode::Binary {
                op,
                left: Box::new(map_node(*left, converter)?),
                right: Box::new(map_node(*right, converter)?),
            }),
            FilterNode::Compare(mut cmp) => {
                cmp.value = match cmp.value {
                    Value::List(items) => Value::List(
                        items
                            .into_iter()
                            .map(|item| converter(&cmp.field, item))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    scalar => converter(&cmp.field, scalar)?,
                };
                Ok(FilterNode::Compare(cmp))
            }
        }
    }

    map_node(node, converter)
}

fn walk_compares(
    node: &FilterNode,
    visit: &mut impl FnMut(&CompareNode) -> Result<(), Error>,
) -> Result<(), Error> {
    match node {
        FilterNode::Compare(cmp) => visit(cmp),
        FilterNode::Binary { left, right, .. } => {
            walk_compares(left, visit)?;
            walk_compares(right, visit)
        }
    }
}

// ----------------------------------------------------------------------
// Pagination window and cursor arithmetic
// ----------------------------------------------------------------------

///
/// FetchWindow
///
/// Canonical window sizing. `take` is the most rows this call may return
/// (`page_size` capped by the limit remainder); `fetch` adds the one-row
/// overflow probe when a further page is still possible.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FetchWindow {
    pub(crate) take: u64,
    pub(crate) fetch: u64,
    pub(crate) limit_hit: bool,
}

pub(crate) fn fetch_window(page_size: u32, limit: u64, offset: u64) -> FetchWindow {
    let page = u64::from(page_size);
    if limit == 0 {
        return FetchWindow {
            take: page,
            fetch: page.saturating_add(1),
            limit_hit: false,
        };
    }

    let remaining = limit.saturating_sub(offset);
    let take = page.min(remaining);
    let limit_hit = take == remaining;
    FetchWindow {
        take,
        fetch: if limit_hit { take } else { take.saturating_add(1) },
        limit_hit,
    }
}

///
/// PaginationMode
///
/// How a backend seeks to the page window: keyset boundaries or plain
/// offsets. Random order and the in-memory executor are offset-mode.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PaginationMode {
    Keyset,
    Offset,
}

///
/// PageContext
///
/// Per-call pagination state derived from the clamped page size, the
/// session limit, and the decoded cursor. `page_start` is the running
/// offset of the first row of this page.
///

#[derive(Clone, Debug)]
pub(crate) struct PageContext {
    pub(crate) page_size: u32,
    pub(crate) page_start: u64,
    pub(crate) direction: Direction,
    pub(crate) seed: i64,
    pub(crate) random: bool,
    pub(crate) window: FetchWindow,
    pub(crate) cursor: Option<Cursor>,
}

impl PageContext {
    pub(crate) fn new(
        page_size: u32,
        limit: u64,
        cursor: Option<Cursor>,
        order: SortOrder,
    ) -> Self {
        let page_start = cursor.as_ref().map_or(0, |c| c.offset);
        let direction = cursor.as_ref().map_or(Direction::Next, |c| c.direction);
        let seed = cursor.as_ref().map_or(0, |c| c.random_seed);
        Self {
            page_size,
            page_start,
            direction,
            seed,
            random: order == SortOrder::Random,
            window: fetch_window(page_size, limit, page_start),
            cursor,
        }
    }
}

/// Effective random seed for driver-backed executors: the cursor's pinned
/// seed when present, otherwise time-derived (never zero, which means
/// "unset" on the wire). Non-random queries carry no seed.
pub(crate) fn session_seed(ctx: &PageContext) -> i64 {
    if !ctx.random {
        return 0;
    }
    if ctx.seed != 0 {
        return ctx.seed;
    }
    match chrono::Utc::now().timestamp_nanos_opt() {
        Some(0) | None => 1,
        Some(nanos) => nanos,
    }
}

/// Scalar reading of a JSON field value, for boundary extraction and
/// derived record access. JSON null reads as "missing".
pub(crate) fn json_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        serde_json::Value::String(s) => Some(Value::Text(s.clone())),
        serde_json::Value::Array(items) => Some(Value::List(
            items.iter().filter_map(json_to_value).collect(),
        )),
        serde_json::Value::Object(_) => None,
    }
}

///
/// Boundary
///
/// Keyset boundary values of a page edge row, used to mint cursors.
/// Offset-mode pages carry no boundaries.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct Boundary {
    pub(crate) id: Option<Value>,
    pub(crate) sort_value: Option<Value>,
}

/// Steps 8-9 epilogue: empty-result detection and cursor minting.
///
/// `overflow` reports whether the backend saw more rows past the fetch
/// window in the direction it read. A next cursor is suppressed once the
/// limit remainder is consumed; a previous cursor exists whenever the page
/// starts past row zero.
#[allow(clippy::too_many_arguments)]
pub(crate) fn assemble_page(
    ctx: &PageContext,
    mode: PaginationMode,
    seed: i64,
    total: i64,
    returned: u64,
    overflow: bool,
    first: Boundary,
    last: Boundary,
) -> Result<Page, Error> {
    if total == 0 && returned == 0 {
        return Err(Error::NoRecordsFound);
    }

    let mint_next = if ctx.window.limit_hit {
        false
    } else if mode == PaginationMode::Keyset && ctx.direction == Direction::Prev {
        // Backward traversal: the page we came from is always ahead.
        true
    } else {
        overflow
    };

    let next_cursor = if mint_next {
        let cursor = Cursor {
            last_id: last.id,
            last_sort_value: last.sort_value,
            offset: ctx.page_start.saturating_add(returned),
            direction: Direction::Next,
            random_seed: seed,
        };
        Some(
            cursor
                .encode()
                .map_err(|err| Error::execution("encode next cursor", err))?,
        )
    } else {
        None
    };

    let prev_cursor = if ctx.page_start > 0 {
        let cursor = Cursor {
            last_id: first.id,
            last_sort_value: first.sort_value,
            offset: ctx.page_start.saturating_sub(u64::from(ctx.page_size)),
            direction: Direction::Prev,
            random_seed: seed,
        };
        Some(
            cursor
                .encode()
                .map_err(|err| Error::execution("encode previous cursor", err))?,
        )
    } else {
        None
    };

    let (showing_from, showing_to) = if returned == 0 {
        (0, 0)
    } else {
        (
            ctx.page_start.saturating_add(1),
            ctx.page_start.saturating_add(returned),
        )
    };

    Ok(Page {
        next_cursor,
        prev_cursor,
        total_items: total,
        showing_from,
        showing_to,
        items_returned: returned,
    })
}

///
/// TESTS
///
