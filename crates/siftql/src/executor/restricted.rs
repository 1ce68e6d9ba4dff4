use crate::error::Error;
use crate::executor::policy::check_allow_list;
use crate::executor::{Executor, Page};
use crate::query::Query;
use async_trait::async_trait;

///
/// RestrictedExecutor
///
/// Wraps an inner executor with an independent allow-list, so coarse
/// policies (a tenant role, say) can layer over per-executor ones. A query
/// passes only if every user-referenced field satisfies both layers; an
/// empty list is unrestricted at this layer. Everything else delegates,
/// and `close` closes recursively.
///

pub struct RestrictedExecutor<E> {
    inner: E,
    allowed_fields: Vec<String>,
}

impl<E> RestrictedExecutor<E> {
    pub fn new(inner: E, allowed_fields: Vec<String>) -> Self {
        Self {
            inner,
            allowed_fields,
        }
    }

    #[must_use]
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    fn check(&self, query: &Query) -> Result<(), Error> {
        check_allow_list(query.filter.as_ref(), &query.sort_by, &self.allowed_fields)
    }
}

#[async_trait]
impl<T, E> Executor<T> for RestrictedExecutor<E>
where
    T: Send,
    E: Executor<T>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(
        &self,
        query: &Query,
        cursor: Option<&str>,
        dest: &mut Vec<T>,
    ) -> Result<Page, Error> {
        self.check(query)?;
        self.inner.execute(query, cursor, dest).await
    }

    async fn count(&self, query: &Query) -> Result<i64, Error> {
        self.check(query)?;
        self.inner.count(query).await
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.close().await
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::RestrictedExecutor;
    use crate::error::Error;
    use crate::executor::{Executor, ExecutorOptions, MemoryExecutor};
    use crate::query::parse;
    use serde::Serialize;

    #[derive(Clone, Debug, Serialize)]
    struct Record {
        id: i64,
        status: String,
        salary: i64,
    }

    fn records() -> Vec<Record> {
        (1..=4)
            .map(|i| Record {
                id: i,
                status: if i % 2 == 0 { "active" } else { "inactive" }.to_owned(),
                salary: i * 1000,
            })
            .collect()
    }

    fn inner(allowed: &[&str]) -> MemoryExecutor<Record> {
        let options = ExecutorOptions {
            allowed_fields: allowed.iter().map(|s| (*s).to_owned()).collect(),
            ..ExecutorOptions::default()
        };
        MemoryExecutor::new(records, options)
    }

    #[tokio::test]
    async fn both_layers_must_accept_every_field() {
        // Inner allows status+id+salary; the wrapper narrows to status+id.
        let wrapped = RestrictedExecutor::new(
            inner(&["status", "id", "salary"]),
            vec!["status".to_owned(), "id".to_owned()],
        );

        let query = parse("status = active").expect("should parse");
        let mut dest = Vec::new();
        let page = wrapped
            .execute(&query, None, &mut dest)
            .await
            .expect("should execute");
        assert_eq!(page.total_items, 2);

        let query = parse("salary > 1500").expect("should parse");
        let mut dest = Vec::new();
        let err = wrapped
            .execute(&query, None, &mut dest)
            .await
            .expect_err("wrapper layer rejects salary");
        assert!(matches!(err, Error::FieldNotAllowed { field } if field == "salary"));
        assert!(dest.is_empty());
    }

    #[tokio::test]
    async fn inner_layer_still_applies_under_an_open_wrapper() {
        let wrapped = RestrictedExecutor::new(inner(&["status", "id"]), Vec::new());

        let query = parse("salary > 1500").expect("should parse");
        let err = wrapped
            .count(&query)
            .await
            .expect_err("inner layer rejects salary");
        assert!(matches!(err, Error::FieldNotAllowed { field } if field == "salary"));
    }

    #[tokio::test]
    async fn sort_field_is_validated_at_the_wrapper_layer() {
        let wrapped = RestrictedExecutor::new(
            inner(&[]),
            vec!["status".to_owned(), "id".to_owned()],
        );

        let query = parse("sort_by = salary").expect("should parse");
        let mut dest: Vec<Record> = Vec::new();
        let err = wrapped
            .execute(&query, None, &mut dest)
            .await
            .expect_err("explicit sort outside the wrapper list");
        assert!(matches!(err, Error::FieldNotAllowed { field } if field == "salary"));
    }

    #[tokio::test]
    async fn branches_of_nested_expressions_are_checked_recursively() {
        let wrapped = RestrictedExecutor::new(
            inner(&[]),
            vec!["status".to_owned(), "id".to_owned()],
        );

        let query = parse("(status = active or salary > 0) and id > 0").expect("should parse");
        let err = wrapped
            .count(&query)
            .await
            .expect_err("salary hides inside a group");
        assert!(matches!(err, Error::FieldNotAllowed { field } if field == "salary"));
    }

    #[tokio::test]
    async fn wrappers_compose_and_delegate_name_and_close() {
        let stacked = RestrictedExecutor::new(
            RestrictedExecutor::new(inner(&[]), vec!["status".to_owned(), "id".to_owned()]),
            vec!["id".to_owned()],
        );

        assert_eq!(
            <_ as Executor<Record>>::name(&stacked),
            "memory",
            "name delegates to the innermost executor"
        );

        let query = parse("status = active").expect("should parse");
        let err = <_ as Executor<Record>>::count(&stacked, &query)
            .await
            .expect_err("outermost layer only allows id");
        assert!(matches!(err, Error::FieldNotAllowed { field } if field == "status"));

        <_ as Executor<Record>>::close(&stacked)
            .await
            .expect("recursive close succeeds");
    }
}
