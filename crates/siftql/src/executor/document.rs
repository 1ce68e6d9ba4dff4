use crate::cursor::{Cursor, Direction};
use crate::error::Error;
use crate::executor::pattern::like_to_regex;
use crate::executor::policy::{self, Boundary, PageContext, PaginationMode, session_seed};
use crate::executor::{DriverError, Executor, ExecutorOptions, Page};
use crate::query::{CompareNode, CompareOp, FilterNode, LogicalOp, Query, SortOrder};
use crate::value::Value;
use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::{debug, trace};

// Modulus for the deterministic random-order sort expression.
const RANDOM_ORDER_PRIME: i64 = 1_000_000_007;

///
/// DocumentOrder
///
/// Sort specification handed to the driver: plain field ordering, or a
/// computed expression the driver evaluates per document (random order).
///

#[derive(Clone, Debug, PartialEq)]
pub enum DocumentOrder {
    Fields(Document),
    RandomExpr(Document),
}

///
/// DocumentFind
///

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentFind {
    pub filter: Document,
    pub order: DocumentOrder,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

///
/// DocumentDriver
///
/// The collection handle the document executor runs against. Concrete
/// drivers (cluster, transport, sessions) live outside this crate.
///

#[async_trait]
pub trait DocumentDriver: Send + Sync {
    async fn find(&self, find: DocumentFind) -> Result<Vec<Document>, DriverError>;
    async fn count(&self, filter: Document) -> Result<i64, DriverError>;
}

///
/// DocumentExecutor
///
/// Maps the filter AST onto a document-store filter tree with typed sort
/// and keyset or skip pagination, over a [`DocumentDriver`].
///

pub struct DocumentExecutor<D, T> {
    driver: D,
    options: ExecutorOptions,
    _records: PhantomData<fn() -> T>,
}

impl<D, T> DocumentExecutor<D, T> {
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
impl<D, T> Executor<T> for DocumentExecutor<D, T>
where
    D: DocumentDriver,
    T: DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str {
        "document"
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

        let filter_doc = filter
            .as_ref()
            .map_or_else(Document::new, |f| node_doc(f, &self.options));

        let total = self
            .driver
            .count(filter_doc.clone())
            .await
            .map_err(|err| Error::execution("count documents", err))?;

        let seed = session_seed(&ctx);
        let mut rows: Vec<Document> = if ctx.window.fetch == 0 {
            Vec::new()
        } else {
            let keyset = if ctx.random {
                None
            } else {
                ctx.cursor.as_ref().and_then(|cur| {
                    keyset_doc(
                        cur,
                        &sort_field,
                        &self.options.id_field_name,
                        order,
                        ctx.direction,
                    )
                })
            };

            // Merged as an explicit $and so complex user filters stay intact.
            let merged = match keyset {
                None => filter_doc,
                Some(keyset) if filter_doc.is_empty() => keyset,
                Some(keyset) => doc! { "$and": [filter_doc, keyset] },
            };

            let find = DocumentFind {
                filter: merged,
                order: if ctx.random {
                    DocumentOrder::RandomExpr(random_order_expr(
                        seed,
                        &self.options.id_field_name,
                    ))
                } else {
                    DocumentOrder::Fields(sort_doc(
                        &sort_field,
                        &self.options.id_field_name,
                        order,
                        ctx.direction,
                    ))
                },
                skip: ctx.random.then_some(ctx.page_start),
                limit: Some(ctx.window.fetch),
            };
            trace!(filter = ?find.filter, "built document find");

            self.driver
                .find(find)
                .await
                .map_err(|err| Error::execution("execute query", err))?
        };

        let overflow = rows.len() as u64 > ctx.window.take;
        rows.truncate(ctx.window.take as usize);
        if !ctx.random && ctx.direction == Direction::Prev {
            rows.reverse();
        }

        let (first, last) = if ctx.random {
            (Boundary::default(), Boundary::default())
        } else {
            (
                doc_boundary(rows.first(), &sort_field, &self.options.id_field_name),
                doc_boundary(rows.last(), &sort_field, &self.options.id_field_name),
            )
        };

        let returned = rows.len() as u64;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(
                bson::from_document::<T>(row)
                    .map_err(|err| Error::execution("decode document", err))?,
            );
        }

        let mode = if ctx.random {
            PaginationMode::Offset
        } else {
            PaginationMode::Keyset
        };
        let page = policy::assemble_page(&ctx, mode, seed, total, returned, overflow, first, last)?;
        debug!(total, returned, "document query executed");

        dest.append(&mut records);
        Ok(page)
    }

    async fn count(&self, query: &Query) -> Result<i64, Error> {
        let filter = policy::resolve_filter(query, &self.options)?;
        let filter_doc = filter
            .as_ref()
            .map_or_else(Document::new, |f| node_doc(f, &self.options));
        self.driver
            .count(filter_doc)
            .await
            .map_err(|err| Error::execution("count documents", err))
    }

    async fn close(&self) -> Result<(), Error> {
        // The collection handle is owned by the caller.
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Filter tree building
// ----------------------------------------------------------------------

fn node_doc(node: &FilterNode, options: &ExecutorOptions) -> Document {
    match node {
        FilterNode::Binary { op, left, right } => {
            let key = match op {
                LogicalOp::And => "$and",
                LogicalOp::Or => "$or",
            };
            let mut outer = Document::new();
            outer.insert(
                key,
                vec![
                    Bson::Document(node_doc(left, options)),
                    Bson::Document(node_doc(right, options)),
                ],
            );
            outer
        }
        FilterNode::Compare(cmp) => compare_doc(cmp, options),
    }
}

fn compare_doc(cmp: &CompareNode, options: &ExecutorOptions) -> Document {
    let field = cmp.field.as_str();
    let is_id = field == options.id_field_name;
    let text = || cmp.value.render_text();

    match cmp.op {
        CompareOp::Eq => field_op(field, "$eq", bson_value(&cmp.value, is_id)),
        CompareOp::Ne => field_op(field, "$ne", bson_value(&cmp.value, is_id)),
        CompareOp::Gt => field_op(field, "$gt", bson_value(&cmp.value, is_id)),
        CompareOp::Gte => field_op(field, "$gte", bson_value(&cmp.value, is_id)),
        CompareOp::Lt => field_op(field, "$lt", bson_value(&cmp.value, is_id)),
        CompareOp::Lte => field_op(field, "$lte", bson_value(&cmp.value, is_id)),
        CompareOp::Like => regex_filter(field, like_to_regex(&text()), false),
        CompareOp::NotLike => {
            let regex = bson::Regex {
                pattern: like_to_regex(&text()),
                options: String::new(),
            };
            field_op(field, "$not", Bson::RegularExpression(regex))
        }
        CompareOp::Contains => regex_filter(field, regex::escape(&text()), false),
        CompareOp::IContains => regex_filter(field, regex::escape(&text()), true),
        CompareOp::StartsWith => {
            regex_filter(field, format!("^{}", regex::escape(&text())), false)
        }
        CompareOp::EndsWith => regex_filter(field, format!("{}$", regex::escape(&text())), false),
        CompareOp::Regex => regex_filter(field, text(), false),
        // Document-store semantics already match the empty-list contract:
        // $in [] matches nothing, $nin [] matches everything.
        CompareOp::In => field_op(field, "$in", bson_value(&cmp.value, is_id)),
        CompareOp::NotIn => field_op(field, "$nin", bson_value(&cmp.value, is_id)),
    }
}

fn field_op(field: &str, op: &str, value: Bson) -> Document {
    let mut inner = Document::new();
    inner.insert(op, value);
    let mut outer = Document::new();
    outer.insert(field, inner);
    outer
}

fn regex_filter(field: &str, pattern: String, case_insensitive: bool) -> Document {
    let mut inner = Document::new();
    inner.insert("$regex", pattern);
    if case_insensitive {
        inner.insert("$options", "i");
    }
    let mut outer = Document::new();
    outer.insert(field, inner);
    outer
}

// ID-field strings are tentatively parsed as document object ids; failure
// keeps the raw string so non-ObjectId key schemes still work.
fn bson_value(value: &Value, is_id_field: bool) -> Bson {
    match value {
        Value::Text(s) if is_id_field => {
            ObjectId::parse_str(s).map_or_else(|_| Bson::String(s.clone()), Bson::ObjectId)
        }
        Value::Text(s) => Bson::String(s.clone()),
        Value::Int(n) => Bson::Int64(*n),
        Value::Float(f) => Bson::Double(*f),
        Value::Bool(b) => Bson::Boolean(*b),
        Value::DateTime(dt) => Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())),
        Value::List(items) => {
            Bson::Array(items.iter().map(|v| bson_value(v, is_id_field)).collect())
        }
    }
}

fn sort_doc(sort_field: &str, id_field: &str, order: SortOrder, direction: Direction) -> Document {
    let effective = if direction == Direction::Prev {
        order.reversed()
    } else {
        order
    };
    let key = if effective == SortOrder::Desc { -1 } else { 1 };

    let mut sort = Document::new();
    sort.insert(sort_field, key);
    if sort_field != id_field {
        sort.insert(id_field, key);
    }
    sort
}

// Deterministic per-document sort key for random order: the id's timestamp
// reading, offset by the session seed, modulo a large prime.
fn random_order_expr(seed: i64, id_field: &str) -> Document {
    doc! {
        "$mod": [
            { "$add": [ { "$abs": { "$toLong": { "$toDate": format!("${id_field}") } } }, seed ] },
            RANDOM_ORDER_PRIME,
        ]
    }
}

fn keyset_doc(
    cursor: &Cursor,
    sort_field: &str,
    id_field: &str,
    order: SortOrder,
    direction: Direction,
) -> Option<Document> {
    let last_id = cursor.last_id.as_ref()?;
    let op = match (order, direction) {
        (SortOrder::Desc, Direction::Next) | (SortOrder::Asc, Direction::Prev) => "$lt",
        _ => "$gt",
    };
    let id_bson = bson_value(last_id, true);

    match cursor.last_sort_value.as_ref() {
        Some(sort_value) if sort_field != id_field => {
            let sort_bson = bson_value(sort_value, false);
            Some(doc! {
                "$or": [
                    field_op(sort_field, op, sort_bson.clone()),
                    { "$and": [
                        field_op(sort_field, "$eq", sort_bson),
                        field_op(id_field, op, id_bson),
                    ] },
                ]
            })
        }
        _ => Some(field_op(id_field, op, id_bson)),
    }
}

fn doc_boundary(row: Option<&Document>, sort_field: &str, id_field: &str) -> Boundary {
    let Some(row) = row else {
        return Boundary::default();
    };
    Boundary {
        id: row.get(id_field).and_then(bson_to_value),
        sort_value: if sort_field == id_field {
            None
        } else {
            row.get(sort_field).and_then(bson_to_value)
        },
    }
}

fn bson_to_value(bson: &Bson) -> Option<Value> {
    match bson {
        Bson::ObjectId(oid) => Some(Value::Text(oid.to_hex())),
        Bson::String(s) => Some(Value::Text(s.clone())),
        Bson::Int32(n) => Some(Value::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Value::Int(*n)),
        Bson::Double(f) => Some(Value::Float(*f)),
        Bson::Boolean(b) => Some(Value::Bool(*b)),
        Bson::DateTime(dt) => {
            chrono::DateTime::from_timestamp_millis(dt.timestamp_millis()).map(Value::DateTime)
        }
        _ => None,
    }
}

///
/// TESTS
///
