use crate::cursor::{Cursor, Direction};
use crate::error::Error;
use crate::executor::pattern::escape_like;
use crate::executor::policy::{
    self, Boundary, PageContext, PaginationMode, json_to_value, session_seed,
};
use crate::executor::{DriverError, Executor, ExecutorOptions, Page};
use crate::query::{CompareNode, CompareOp, FilterNode, LogicalOp, Query, SortOrder};
use crate::value::Value;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use tracing::{debug, trace};

///
/// SqlFragment
///
/// A piece of WHERE text with its bind parameters. Field names are already
/// validated; values only ever travel as parameters.
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

///
/// SqlSelect
///
/// The statement handed to the driver. The driver owns table and
/// projection; this carries only the query-language parts.
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqlSelect {
    pub filter: Option<SqlFragment>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

///
/// SqlDriver
///
/// The ORM-like handle the SQL executor runs against. Rows come back as
/// JSON objects keyed by column name; concrete drivers live outside this
/// crate.
///

#[async_trait]
pub trait SqlDriver: Send + Sync {
    async fn select(&self, stmt: &SqlSelect) -> Result<Vec<JsonValue>, DriverError>;
    async fn count(&self, filter: Option<&SqlFragment>) -> Result<i64, DriverError>;
}

///
/// SqlExecutor
///
/// Maps the filter AST onto parameterized WHERE/ORDER BY/LIMIT text with
/// keyset pagination, over a [`SqlDriver`].
///

pub struct SqlExecutor<D, T> {
    driver: D,
    options: ExecutorOptions,
    _records: PhantomData<fn() -> T>,
}

impl<D, T> SqlExecutor<D, T> {
    pub const fn new(driver: D, options: ExecutorOptions) -> Self {
        Self {
            driver,
            options,
            _records: PhantomData,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }
}

#[async_trait]
impl<D, T> Executor<T> for SqlExecutor<D, T>
where
    D: SqlDriver,
    T: DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str {
        "sql"
    }

    async fn execute(
        &self,
        query: &Query,
        cursor: Option<&str>,
        dest: &mut Vec<T>,
    ) -> Result<Page, Error> {
        let page_size = policy::effective_page_size(query, &self.options);
        let filter = policy::resolve_filter(query, &self.options)?;
        let (sort_field, order) = policy::resolve_sort(query, &self.options)?;
        let decoded = policy::decode_cursor(cursor)?;
        let ctx = PageContext::new(page_size, query.limit, decoded, order);

        let filter_fragment = filter.as_ref().map(|f| node_sql(f, &self.options));

        let total = self
            .driver
            .count(filter_fragment.as_ref())
            .await
            .map_err(|err| Error::execution("count rows", err))?;

        let seed = session_seed(&ctx);
        let mut rows: Vec<JsonValue> = if ctx.window.fetch == 0 {
            Vec::new()
        } else {
            let mut where_fragment = filter_fragment;
            if !ctx.random
                && let Some(cur) = ctx.cursor.as_ref()
                && let Some(keyset) = keyset_sql(
                    cur,
                    &sort_field,
                    &self.options.id_field_name,
                    order,
                    ctx.direction,
                )
            {
                where_fragment = Some(match where_fragment {
                    None => keyset,
                    Some(user) => and_fragments(user, keyset),
                });
            }

            let stmt = SqlSelect {
                filter: where_fragment,
                order_by: Some(order_by_sql(
                    &sort_field,
                    &self.options.id_field_name,
                    order,
                    ctx.direction,
                    &self.options,
                )),
                limit: Some(ctx.window.fetch),
                offset: ctx.random.then_some(ctx.page_start),
            };
            trace!(filter = ?stmt.filter.as_ref().map(|f| &f.sql), "built sql select");

            self.driver
                .select(&stmt)
                .await
                .map_err(|err| Error::execution("execute query", err))?
        };

        let overflow = rows.len() as u64 > ctx.window.take;
        rows.truncate(ctx.window.take as usize);
        if !ctx.random && ctx.direction == Direction::Prev {
            // Backward reads arrive reversed; restore forward sort order.
            rows.reverse();
        }

        let (first, last) = if ctx.random {
            (Boundary::default(), Boundary::default())
        } else {
            (
                row_boundary(rows.first(), &sort_field, &self.options.id_field_name),
                row_boundary(rows.last(), &sort_field, &self.options.id_field_name),
            )
        };

        let returned = rows.len() as u64;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(
                serde_json::from_value::<T>(row)
                    .map_err(|err| Error::execution("decode row", err))?,
            );
        }

        let mode = if ctx.random {
            PaginationMode::Offset
        } else {
            PaginationMode::Keyset
        };
        let page = policy::assemble_page(&ctx, mode, seed, total, returned, overflow, first, last)?;
        debug!(total, returned, "sql query executed");

        dest.append(&mut records);
        Ok(page)
    }

    async fn count(&self, query: &Query) -> Result<i64, Error> {
        let filter = policy::resolve_filter(query, &self.options)?;
        let fragment = filter.as_ref().map(|f| node_sql(f, &self.options));
        self.driver
            .count(fragment.as_ref())
            .await
            .map_err(|err| Error::execution("count rows", err))
    }

    async fn close(&self) -> Result<(), Error> {
        // The connection handle is owned by the caller.
        Ok(())
    }
}

// ----------------------------------------------------------------------
// SQL building
// ----------------------------------------------------------------------

fn node_sql(node: &FilterNode, options: &ExecutorOptions) -> SqlFragment {
    match node {
        FilterNode::Binary { op, left, right } => {
            let left = node_sql(left, options);
            let right = node_sql(right, options);
            let joiner = match op {
                LogicalOp::And => "AND",
                LogicalOp::Or => "OR",
            };
            let mut params = left.params;
            params.extend(right.params);
            SqlFragment::new(format!("({}) {joiner} ({})", left.sql, right.sql), params)
        }
        FilterNode::Compare(cmp) => compare_sql(cmp, options),
    }
}

fn compare_sql(cmp: &CompareNode, options: &ExecutorOptions) -> SqlFragment {
    let field = cmp.field.as_str();
    match cmp.op {
        CompareOp::Eq => SqlFragment::new(format!("{field} = ?"), vec![cmp.value.clone()]),
        CompareOp::Ne => SqlFragment::new(format!("{field} != ?"), vec![cmp.value.clone()]),
        CompareOp::Gt => SqlFragment::new(format!("{field} > ?"), vec![cmp.value.clone()]),
        CompareOp::Gte => SqlFragment::new(format!("{field} >= ?"), vec![cmp.value.clone()]),
        CompareOp::Lt => SqlFragment::new(format!("{field} < ?"), vec![cmp.value.clone()]),
        CompareOp::Lte => SqlFragment::new(format!("{field} <= ?"), vec![cmp.value.clone()]),
        CompareOp::Like => SqlFragment::new(
            format!("{field} LIKE ?"),
            vec![Value::Text(cmp.value.render_text())],
        ),
        CompareOp::NotLike => SqlFragment::new(
            format!("{field} NOT LIKE ?"),
            vec![Value::Text(cmp.value.render_text())],
        ),
        CompareOp::Contains => SqlFragment::new(
            format!("{field} LIKE ?"),
            vec![Value::Text(format!(
                "%{}%",
                escape_like(&cmp.value.render_text())
            ))],
        ),
        CompareOp::IContains => SqlFragment::new(
            format!("LOWER({field}) LIKE LOWER(?)"),
            vec![Value::Text(format!(
                "%{}%",
                escape_like(&cmp.value.render_text())
            ))],
        ),
        CompareOp::StartsWith => SqlFragment::new(
            format!("{field} LIKE ?"),
            vec![Value::Text(format!(
                "{}%",
                escape_like(&cmp.value.render_text())
            ))],
        ),
        CompareOp::EndsWith => SqlFragment::new(
            format!("{field} LIKE ?"),
            vec![Value::Text(format!(
                "%{}",
                escape_like(&cmp.value.render_text())
            ))],
        ),
        CompareOp::Regex => SqlFragment::new(
            format!("{field} {} ?", options.regex_operator),
            vec![Value::Text(cmp.value.render_text())],
        ),
        CompareOp::In | CompareOp::NotIn => membership_sql(cmp, field),
    }
}

fn membership_sql(cmp: &CompareNode, field: &str) -> SqlFragment {
    let Value::List(items) = &cmp.value else {
        // Shape is enforced upstream; an empty match is the safe rendering.
        return SqlFragment::new("1 = 0", Vec::new());
    };

    if items.is_empty() {
        // Empty IN matches nothing; empty NOT IN matches everything.
        return match cmp.op {
            CompareOp::NotIn => SqlFragment::new("1 = 1", Vec::new()),
            _ => SqlFragment::new("1 = 0", Vec::new()),
        };
    }

    let placeholders = vec!["?"; items.len()].join(", ");
    let keyword = if cmp.op == CompareOp::NotIn {
        "NOT IN"
    } else {
        "IN"
    };
    SqlFragment::new(
        format!("{field} {keyword} ({placeholders})"),
        items.clone(),
    )
}

fn order_by_sql(
    sort_field: &str,
    id_field: &str,
    order: SortOrder,
    direction: Direction,
    options: &ExecutorOptions,
) -> String {
    if order == SortOrder::Random {
        return options.random_function_name.clone();
    }

    let effective = if direction == Direction::Prev {
        order.reversed()
    } else {
        order
    };
    let keyword = match effective {
        SortOrder::Desc => "DESC",
        _ => "ASC",
    };

    if sort_field == id_field {
        format!("{sort_field} {keyword}")
    } else {
        format!("{sort_field} {keyword}, {id_field} {keyword}")
    }
}

fn keyset_sql(
    cursor: &Cursor,
    sort_field: &str,
    id_field: &str,
    order: SortOrder,
    direction: Direction,
) -> Option<SqlFragment> {
    let last_id = cursor.last_id.clone()?;
    let forward = match (order, direction) {
        (SortOrder::Desc, Direction::Next) | (SortOrder::Asc, Direction::Prev) => "<",
        _ => ">",
    };

    match cursor.last_sort_value.clone() {
        Some(sort_value) if sort_field != id_field => Some(SqlFragment::new(
            format!(
                "({sort_field} {forward} ? OR ({sort_field} = ? AND {id_field} {forward} ?))"
            ),
            vec![sort_value.clone(), sort_value, last_id],
        )),
        // Sorting by the ID field itself: the tiebreaker branch is elided.
        _ => Some(SqlFragment::new(
            format!("{id_field} {forward} ?"),
            vec![last_id],
        )),
    }
}

fn and_fragments(user: SqlFragment, keyset: SqlFragment) -> SqlFragment {
    let mut params = user.params;
    params.extend(keyset.params);
    SqlFragment::new(format!("({}) AND ({})", user.sql, keyset.sql), params)
}

fn row_boundary(row: Option<&JsonValue>, sort_field: &str, id_field: &str) -> Boundary {
    let Some(JsonValue::Object(map)) = row else {
        return Boundary::default();
    };
    Boundary {
        id: map.get(id_field).and_then(json_to_value),
        sort_value: if sort_field == id_field {
            None
        } else {
            map.get(sort_field).and_then(json_to_value)
        },
    }
}

///
/// TESTS
///
