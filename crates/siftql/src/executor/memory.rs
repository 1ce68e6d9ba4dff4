use crate::error::Error;
use crate::executor::pattern::like_to_regex;
use crate::executor::policy::{self, Boundary, PageContext, PaginationMode, json_to_value};
use crate::executor::{Executor, ExecutorOptions, Page};
use crate::query::{CompareNode, CompareOp, FilterNode, LogicalOp, Query, SortOrder};
use crate::value::{Value, coerced_cmp};
use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

// Fixed fallback seed keeps unseeded random order deterministic.
const DEFAULT_SHUFFLE_SEED: i64 = 42;

/// Zero-argument record supplier, re-invoked on every call so callers can
/// serve live-changing data.
pub type RecordSource<T> = Arc<dyn Fn() -> Vec<T> + Send + Sync>;

/// Custom field accessor. When configured, its errors propagate; without
/// one, a missing field makes the comparison false instead.
pub type FieldAccessor<T> = Arc<dyn Fn(&T, &str) -> Result<Value, Error> + Send + Sync>;

///
/// MemoryExecutor
///
/// In-process filter/sort/shuffle/page over a dynamic data source. Field
/// access uses the custom accessor when present, else a serde-derived view
/// of the record (which also covers rename attributes), matched exactly and
/// then case-insensitively.
///

pub struct MemoryExecutor<T> {
    source: RecordSource<T>,
    accessor: Option<FieldAccessor<T>>,
    options: ExecutorOptions,
}

impl<T> MemoryExecutor<T> {
    pub fn new(
        source: impl Fn() -> Vec<T> + Send + Sync + 'static,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            source: Arc::new(source),
            accessor: None,
            options,
        }
    }

    #[must_use]
    pub fn with_accessor(
        mut self,
        accessor: impl Fn(&T, &str) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.accessor = Some(Arc::new(accessor));
        self
    }

    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }
}

// A record plus its derived field view (absent when a custom accessor is
// configured).
struct Row<T> {
    record: T,
    derived: Option<serde_json::Value>,
}

#[async_trait]
impl<T> Executor<T> for MemoryExecutor<T>
where
    T: Serialize + Send,
{
    fn name(&self) -> &str {
        "memory"
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

        let mut matched = self.collect_matching(filter.as_ref())?;
        let total = matched.len() as i64;

        let seed = if ctx.random {
            if ctx.seed == 0 { DEFAULT_SHUFFLE_SEED } else { ctx.seed }
        } else {
            0
        };

        if ctx.random {
            shuffle(&mut matched, seed);
        } else {
            matched = self.sort_rows(matched, &sort_field, order)?;
        }

        let start = usize::try_from(ctx.page_start).unwrap_or(usize::MAX);
        let take = usize::try_from(ctx.window.take).unwrap_or(usize::MAX);
        let matched_len = matched.len();
        let page_rows: Vec<Row<T>> = matched.into_iter().skip(start).take(take).collect();
        let returned = page_rows.len() as u64;
        let overflow = matched_len as u64 > ctx.page_start.saturating_add(returned);

        let page = policy::assemble_page(
            &ctx,
            PaginationMode::Offset,
            seed,
            total,
            returned,
            overflow,
            Boundary::default(),
            Boundary::default(),
        )?;
        debug!(total, returned, "in-memory query executed");

        dest.extend(page_rows.into_iter().map(|row| row.record));
        Ok(page)
    }

    async fn count(&self, query: &Query) -> Result<i64, Error> {
        let filter = policy::resolve_filter(query, &self.options)?;
        Ok(self.collect_matching(filter.as_ref())?.len() as i64)
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: Serialize> MemoryExecutor<T> {
    fn collect_matching(&self, filter: Option<&FilterNode>) -> Result<Vec<Row<T>>, Error> {
        let records = (self.source)();
        let mut matched = Vec::with_capacity(records.len());

        for record in records {
            let derived = if self.accessor.is_none() {
                Some(
                    serde_json::to_value(&record)
                        .map_err(|err| Error::execution("encode record", err))?,
                )
            } else {
                None
            };
            let row = Row { record, derived };

            let keep = match filter {
                None => true,
                Some(filter) => self.eval_filter(filter, &row)?,
            };
            if keep {
                matched.push(row);
            }
        }
        Ok(matched)
    }

    fn eval_filter(&self, node: &FilterNode, row: &Row<T>) -> Result<bool, Error> {
        match node {
            FilterNode::Binary { op, left, right } => match op {
                LogicalOp::And => Ok(self.eval_filter(left, row)? && self.eval_filter(right, row)?),
                LogicalOp::Or => Ok(self.eval_filter(left, row)? || self.eval_filter(right, row)?),
            },
            FilterNode::Compare(cmp) => self.eval_compare(cmp, row),
        }
    }

    fn eval_compare(&self, cmp: &CompareNode, row: &Row<T>) -> Result<bool, Error> {
        let Some(actual) = self.field_value(row, &cmp.field)? else {
            // Absent field: the comparison is false, not an error.
            return Ok(false);
        };

        let result = match cmp.op {
            CompareOp::Eq => coerced_cmp(&actual, &cmp.value) == Ordering::Equal,
            CompareOp::Ne => coerced_cmp(&actual, &cmp.value) != Ordering::Equal,
            CompareOp::Gt => coerced_cmp(&actual, &cmp.value) == Ordering::Greater,
            CompareOp::Gte => coerced_cmp(&actual, &cmp.value) != Ordering::Less,
            CompareOp::Lt => coerced_cmp(&actual, &cmp.value) == Ordering::Less,
            CompareOp::Lte => coerced_cmp(&actual, &cmp.value) != Ordering::Greater,
            CompareOp::Like => like_match(&actual, &cmp.value)?,
            CompareOp::NotLike => !like_match(&actual, &cmp.value)?,
            CompareOp::Contains => actual.render_text().contains(&cmp.value.render_text()),
            CompareOp::IContains => actual
                .render_text()
                .to_lowercase()
                .contains(&cmp.value.render_text().to_lowercase()),
            CompareOp::StartsWith => actual.render_text().starts_with(&cmp.value.render_text()),
            CompareOp::EndsWith => actual.render_text().ends_with(&cmp.value.render_text()),
            CompareOp::Regex => {
                let pattern = regex::Regex::new(&cmp.value.render_text())
                    .map_err(|err| Error::execution("compile regex", err))?;
                pattern.is_match(&actual.render_text())
            }
            CompareOp::In | CompareOp::NotIn => {
                let member = match &cmp.value {
                    Value::List(items) => items
                        .iter()
                        .any(|item| coerced_cmp(&actual, item) == Ordering::Equal),
                    _ => false,
                };
                if cmp.op == CompareOp::In { member } else { !member }
            }
        };
        Ok(result)
    }

    fn field_value(&self, row: &Row<T>, field: &str) -> Result<Option<Value>, Error> {
        if let Some(accessor) = self.accessor.as_ref() {
            return accessor(&row.record, field).map(Some);
        }

        let Some(serde_json::Value::Object(map)) = row.derived.as_ref() else {
            return Ok(None);
        };
        if let Some(json) = map.get(field) {
            return Ok(json_to_value(json));
        }
        for (key, json) in map {
            if key.eq_ignore_ascii_case(field) {
                return Ok(json_to_value(json));
            }
        }
        Ok(None)
    }

    fn sort_rows(
        &self,
        rows: Vec<Row<T>>,
        sort_field: &str,
        order: SortOrder,
    ) -> Result<Vec<Row<T>>, Error> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = self.field_value(&row, sort_field)?;
            keyed.push((key, row));
        }

        // Stable sort; rows without the sort field group first. The flipped
        // comparator (not a reverse) keeps ties in source order.
        keyed.sort_by(|a, b| {
            let ordering = compare_sort_keys(a.0.as_ref(), b.0.as_ref());
            if order == SortOrder::Desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn compare_sort_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => coerced_cmp(a, b),
    }
}

fn like_match(actual: &Value, pattern: &Value) -> Result<bool, Error> {
    let regex = regex::Regex::new(&like_to_regex(&pattern.render_text()))
        .map_err(|err| Error::execution("compile like pattern", err))?;
    Ok(regex.is_match(&actual.render_text()))
}

// Seeded linear-congruential Fisher-Yates; the LCG constants are part of
// the cursor contract, so pages replay for a pinned seed.
fn shuffle<T>(rows: &mut [T], seed: i64) {
    let mut state = seed & 0x7fff_ffff;
    for i in (1..rows.len()).rev() {
        state = (state.wrapping_mul(1_103_515_245).wrapping_add(12_345)) & 0x7fff_ffff;
        let j = (state as usize) % (i + 1);
        rows.swap(i, j);
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::MemoryExecutor;
    use crate::error::Error;
    use crate::executor::{Executor, ExecutorOptions};
    use crate::query::{CompareOp, FilterNode, Query, parse};
    use crate::value::Value;
    use serde::Serialize;
    use std::collections::HashSet;

    #[derive(Clone, Debug, PartialEq, Serialize)]
    struct Product {
        id: i64,
        category: String,
        price: f64,
        name: String,
        featured: bool,
        #[serde(rename = "createdAt")]
        created_at: String,
    }

    fn products() -> Vec<Product> {
        (1..=10)
            .map(|i| Product {
                id: i,
                category: if i <= 5 { "electronics" } else { "accessories" }.to_owned(),
                price: (i as f64).mul_add(10.0, -0.01),
                name: format!("Widget {i}"),
                featured: i % 2 == 0,
                created_at: format!("2020-01-{:02}", i),
            })
            .collect()
    }

    fn options() -> ExecutorOptions {
        ExecutorOptions {
            default_search_field: "name".to_owned(),
            ..ExecutorOptions::default()
        }
    }

    fn executor() -> MemoryExecutor<Product> {
        MemoryExecutor::new(products, options())
    }

    async fn run(
        exec: &MemoryExecutor<Product>,
        input: &str,
        cursor: Option<&str>,
    ) -> (Vec<Product>, crate::executor::Page) {
        let query = parse(input).expect("should parse");
        let mut dest = Vec::new();
        let page = exec
            .execute(&query, cursor, &mut dest)
            .await
            .expect("should execute");
        (dest, page)
    }

    #[tokio::test]
    async fn filters_with_and_semantics() {
        #[derive(Clone, Serialize)]
        struct Person {
            name: String,
            status: String,
            age: i64,
        }
        let people = || {
            vec![
                Person {
                    name: "a".into(),
                    status: "active".into(),
                    age: 20,
                },
                Person {
                    name: "b".into(),
                    status: "active".into(),
                    age: 15,
                },
                Person {
                    name: "c".into(),
                    status: "inactive".into(),
                    age: 30,
                },
            ]
        };
        let exec = MemoryExecutor::new(people, options());

        let query = parse("status = active and age >= 18").expect("should parse");
        let mut dest = Vec::new();
        let page = exec
            .execute(&query, None, &mut dest)
            .await
            .expect("should execute");

        assert_eq!(dest.len(), 1);
        assert_eq!(dest[0].name, "a");
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items_returned, 1);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn unmatched_search_is_no_records_found() {
        let exec = executor();
        let query = parse("\"NonExistent\"").expect("should parse");
        let mut dest = Vec::new();
        let err = exec
            .execute(&query, None, &mut dest)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::NoRecordsFound));
        assert!(dest.is_empty());
    }

    #[tokio::test]
    async fn pagination_is_exhaustive_without_duplicates() {
        let exec = executor();
        let mut cursor: Option<String> = None;
        let mut sizes = Vec::new();
        let mut seen = Vec::new();

        loop {
            let (records, page) = run(&exec, "sort_by = id page_size = 3", cursor.as_deref()).await;
            sizes.push(records.len());
            seen.extend(records.iter().map(|p| p.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(sizes, [3, 3, 3, 1]);
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test]
    async fn limit_caps_the_session_across_pages() {
        let exec = executor();

        let (first, page) = run(&exec, "limit = 7 page_size = 5 sort_by = id", None).await;
        assert_eq!(first.iter().map(|p| p.id).collect::<Vec<_>>(), [1, 2, 3, 4, 5]);
        let next = page.next_cursor.expect("a second page remains");

        let (second, page) = run(&exec, "limit = 7 page_size = 5 sort_by = id", Some(&next)).await;
        assert_eq!(second.iter().map(|p| p.id).collect::<Vec<_>>(), [6, 7]);
        assert_eq!(page.items_returned, 2);
        assert!(page.next_cursor.is_none(), "limit exhausted");
    }

    #[tokio::test]
    async fn hostile_field_in_a_constructed_ast_is_rejected() {
        let exec = executor();
        let query = Query {
            filter: Some(FilterNode::compare(
                "name; DROP TABLE",
                CompareOp::Eq,
                Value::from("test"),
            )),
            ..Query::default()
        };
        let mut dest = Vec::new();
        let err = exec
            .execute(&query, None, &mut dest)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::InvalidFieldName { field } if field == "name; DROP TABLE"));
        assert!(dest.is_empty());

        // The store is unharmed: a follow-up query still sees every record.
        let (all, page) = run(&exec, "page_size = 20", None).await;
        assert_eq!(all.len(), 10);
        assert_eq!(page.total_items, 10);
    }

    #[tokio::test]
    async fn oversized_page_request_is_clamped() {
        let many: Vec<Product> = (1..=250)
            .map(|i| Product {
                id: i,
                category: "c".into(),
                price: 1.0,
                name: format!("n{i}"),
                featured: false,
                created_at: "2020-01-01".into(),
            })
            .collect();
        let opts = ExecutorOptions {
            max_page_size: 100,
            ..options()
        };
        let exec = MemoryExecutor::new(move || many.clone(), opts);

        let query = parse("page_size = 1000").expect("should parse");
        let mut dest = Vec::new();
        let page = exec
            .execute(&query, None, &mut dest)
            .await
            .expect("should execute");
        assert_eq!(dest.len(), 100);
        assert_eq!(page.items_returned, 100);
    }

    #[tokio::test]
    async fn count_matches_total_and_ignores_pagination() {
        let exec = executor();
        let input = "category = electronics page_size = 2 limit = 3";

        let query = parse(input).expect("should parse");
        let count = exec.count(&query).await.expect("should count");
        let (_, page) = run(&exec, input, None).await;

        assert_eq!(count, 5);
        assert_eq!(page.total_items, 5);
    }

    #[tokio::test]
    async fn bare_search_hits_the_default_search_field() {
        let exec = executor();
        let (records, page) = run(&exec, "\"Widget 1\"", None).await;
        // Substring match: "Widget 1" and "Widget 10".
        assert_eq!(page.total_items, 2);
        assert!(records.iter().all(|p| p.name.contains("Widget 1")));
    }

    #[tokio::test]
    async fn string_operators_match_in_process() {
        let exec = executor();

        let (records, _) = run(&exec, "name like \"Widget 1_\"", None).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 10);

        let (records, _) = run(&exec, "name icontains widget page_size = 20", None).await;
        assert_eq!(records.len(), 10);

        let (records, _) = run(&exec, "name starts_with Widget page_size = 20", None).await;
        assert_eq!(records.len(), 10);

        let (records, _) = run(&exec, "name ends_with 3", None).await;
        assert_eq!(records.len(), 1);

        let (records, _) = run(&exec, "name regex \"Widget [0-9]$\" page_size = 20", None).await;
        assert_eq!(records.len(), 9);
    }

    #[tokio::test]
    async fn membership_and_its_negation_iterate() {
        let exec = executor();

        let (records, _) = run(&exec, "id in [1, 3, 5]", None).await;
        assert_eq!(records.iter().map(|p| p.id).collect::<Vec<_>>(), [1, 3, 5]);

        let (records, _) = run(&exec, "id not in [1, 3, 5] page_size = 20", None).await;
        assert_eq!(records.len(), 7);

        // Empty NOT IN matches everything; empty IN matches nothing.
        let (records, _) = run(&exec, "id not in [] page_size = 20", None).await;
        assert_eq!(records.len(), 10);

        let query = parse("id in []").expect("should parse");
        let mut dest = Vec::new();
        let err = exec
            .execute(&query, None, &mut dest)
            .await
            .expect_err("empty IN matches nothing");
        assert!(matches!(err, Error::NoRecordsFound));
    }

    #[tokio::test]
    async fn numeric_comparison_promotes_numeric_text() {
        #[derive(Clone, Serialize)]
        struct Listing {
            id: i64,
            price: String,
        }
        let listings = || {
            vec![
                Listing { id: 1, price: "9.50".into() },
                Listing { id: 2, price: "100".into() },
                Listing { id: 3, price: "20".into() },
            ]
        };
        let exec = MemoryExecutor::new(listings, options());

        let query = parse("price < 50").expect("should parse");
        let mut dest = Vec::new();
        let page = exec
            .execute(&query, None, &mut dest)
            .await
            .expect("should execute");
        assert_eq!(page.total_items, 2, "9.50 and 20 compare numerically");
    }

    #[tokio::test]
    async fn date_comparison_parses_record_text() {
        let exec = executor();
        let (records, _) = run(&exec, "createdAt >= 2020-01-08 page_size = 20", None).await;
        assert_eq!(records.iter().map(|p| p.id).collect::<Vec<_>>(), [8, 9, 10]);
    }

    #[tokio::test]
    async fn field_lookup_is_case_insensitive_over_serde_names() {
        let exec = executor();
        // "CreatedAt" matches the serde-renamed "createdAt" key.
        let (records, _) = run(&exec, "CreatedAt = 2020-01-03", None).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 3);
    }

    #[tokio::test]
    async fn missing_field_without_accessor_is_false() {
        let exec = executor();
        let query = parse("nonexistent = 1").expect("should parse");
        let mut dest = Vec::new();
        let err = exec
            .execute(&query, None, &mut dest)
            .await
            .expect_err("nothing matches");
        assert!(matches!(err, Error::NoRecordsFound));
    }

    #[tokio::test]
    async fn custom_accessor_overrides_field_access_and_propagates_errors() {
        let exec = MemoryExecutor::new(products, options()).with_accessor(|record, field| {
            match field {
                "id" => Ok(Value::Int(record.id)),
                "shelf" => Ok(Value::Text(format!("shelf-{}", record.id % 3))),
                other => Err(Error::execution(
                    "access field",
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no field {other}"),
                    ),
                )),
            }
        });

        let query = parse("shelf = shelf-1").expect("should parse");
        let mut dest = Vec::new();
        let page = exec
            .execute(&query, None, &mut dest)
            .await
            .expect("should execute");
        assert_eq!(page.total_items, 4, "ids 1, 4, 7, 10");

        let query = parse("unknown = 1").expect("should parse");
        let mut dest = Vec::new();
        let err = exec
            .execute(&query, None, &mut dest)
            .await
            .expect_err("accessor errors propagate");
        assert!(matches!(err, Error::Execution { .. }));
    }

    #[tokio::test]
    async fn sort_descending_and_by_float_field() {
        let exec = executor();
        let (records, _) = run(&exec, "sort_by = price sort_order = desc page_size = 3", None).await;
        assert_eq!(records.iter().map(|p| p.id).collect::<Vec<_>>(), [10, 9, 8]);
    }

    #[tokio::test]
    async fn previous_cursor_walks_back_a_page() {
        let exec = executor();

        let (_, page1) = run(&exec, "sort_by = id page_size = 4", None).await;
        let next = page1.next_cursor.expect("second page");

        let (second, page2) = run(&exec, "sort_by = id page_size = 4", Some(&next)).await;
        assert_eq!(second.iter().map(|p| p.id).collect::<Vec<_>>(), [5, 6, 7, 8]);
        assert_eq!(page2.showing_from, 5);
        assert_eq!(page2.showing_to, 8);
        let prev = page2.prev_cursor.expect("previous page");

        let (again, page) = run(&exec, "sort_by = id page_size = 4", Some(&prev)).await;
        assert_eq!(again.iter().map(|p| p.id).collect::<Vec<_>>(), [1, 2, 3, 4]);
        assert!(page.prev_cursor.is_none(), "back at the first page");
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn random_order_is_deterministic_for_a_pinned_seed() {
        let opts = ExecutorOptions {
            allow_random_order: true,
            ..options()
        };
        let exec = MemoryExecutor::new(products, opts);

        let (first_run, page) = run(&exec, "sort_order = random page_size = 4", None).await;
        let (second_run, _) = run(&exec, "sort_order = random page_size = 4", None).await;
        let first_ids: Vec<_> = first_run.iter().map(|p| p.id).collect();
        assert_eq!(
            first_ids,
            second_run.iter().map(|p| p.id).collect::<Vec<_>>(),
            "default seed is fixed"
        );

        // Walking the cursor chain yields every record exactly once.
        let mut seen: Vec<i64> = first_ids.clone();
        let mut cursor = page.next_cursor;
        while let Some(token) = cursor {
            let (records, page) =
                run(&exec, "sort_order = random page_size = 4", Some(&token)).await;
            seen.extend(records.iter().map(|p| p.id));
            cursor = page.next_cursor;
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=10).collect::<Vec<_>>());
        assert_eq!(seen.len(), 10, "no duplicates across the chain");
        assert_ne!(seen, (1..=10).collect::<Vec<_>>(), "order is shuffled");
    }

    #[tokio::test]
    async fn random_order_requires_the_option() {
        let exec = executor();
        let query = parse("sort_order = random").expect("should parse");
        let mut dest = Vec::new();
        let err = exec
            .execute(&query, None, &mut dest)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::RandomOrderNotAllowed));
    }

    #[tokio::test]
    async fn close_is_a_no_op() {
        let exec = executor();
        exec.close().await.expect("close should succeed");
    }
}
