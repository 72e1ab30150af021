//! Generic per-collection repository.
//!
//! A [`Repository`] maps one collection name to one storage delegate. Every
//! call compiles its request fresh through [`super::compiler`] and resolves
//! the delegate by name at call time, so a missing delegate surfaces as a
//! [`SchemaError`](super::SchemaError) on first use.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::compiler::{build_order_by, build_pagination, build_projection, build_target_where, build_where};
use super::error::{DbError, DbResult};
use super::filter::FilterCondition;
use super::query::{
    CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, FindFirstArgs, FindManyArgs, UpdateArgs,
};
use super::store::{DelegateSource, StoreDelegate};
use super::types::{
    BatchCount, CreateOptions, DestroyOptions, FindOneOptions, FindOptions, PaginatedResult,
    TargetKey, UpdateOptions, into_record,
};

/// Page size used by `find_and_count` when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// CRUD gateway for one collection.
#[derive(Clone)]
pub struct Repository {
    collection: String,
    delegates: Arc<dyn DelegateSource>,
    default_page_size: u64,
}

impl Repository {
    pub(crate) fn new(
        collection: impl Into<String>,
        delegates: Arc<dyn DelegateSource>,
        default_page_size: u64,
    ) -> Self {
        Self {
            collection: collection.into(),
            delegates,
            default_page_size: default_page_size.max(1),
        }
    }

    /// Name of the collection this repository serves.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn delegate(&self) -> DbResult<Arc<dyn StoreDelegate>> {
        Ok(self.delegates.resolve(&self.collection)?)
    }

    fn store_error(&self, operation: &'static str) -> impl FnOnce(anyhow::Error) -> DbError + '_ {
        move |source| DbError::store(&self.collection, operation, source)
    }

    pub async fn find(&self, options: FindOptions) -> DbResult<Vec<Value>> {
        let projection = build_projection(&options.fields, &options.appends);
        let pagination = build_pagination(
            options.page,
            options.page_size,
            options.offset,
            options.limit,
        );
        let args = FindManyArgs {
            where_clause: build_where(options.filter.as_ref()),
            order_by: build_order_by(&options.sort),
            select: projection.select,
            include: projection.include,
            skip: pagination.skip,
            take: pagination.take,
        };

        self.delegate()?
            .find_many(args)
            .await
            .map_err(self.store_error("find_many"))
    }

    /// One page of rows plus the total number of matching rows.
    ///
    /// Defaults to page 1 and the configured page size. A caller that passes
    /// only `offset`/`limit` gets that window back, and the reported page is
    /// the one the offset falls in. The count query runs concurrently with
    /// the data query.
    pub async fn find_and_count(&self, options: FindOptions) -> DbResult<PaginatedResult<Value>> {
        let windowed = options.page.is_none()
            && options.page_size.is_none()
            && (options.offset.is_some() || options.limit.is_some());

        let (page, page_size, options) = if windowed {
            let page_size = options
                .limit
                .filter(|l| *l > 0)
                .unwrap_or(self.default_page_size);
            let page = options.offset.unwrap_or(0) / page_size + 1;
            (page, page_size, options)
        } else {
            let page = options.page.filter(|p| *p > 0).unwrap_or(1);
            let page_size = options
                .page_size
                .filter(|s| *s > 0)
                .unwrap_or(self.default_page_size);
            let options = FindOptions {
                page: Some(page),
                page_size: Some(page_size),
                ..options
            };
            (page, page_size, options)
        };
        let filter = options.filter.clone();

        let (data, total) = tokio::try_join!(self.find(options), self.count(filter.as_ref()))?;

        Ok(PaginatedResult {
            data,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    pub async fn find_one(&self, options: FindOneOptions) -> DbResult<Option<Value>> {
        let projection = build_projection(&options.fields, &options.appends);
        let args = FindFirstArgs {
            where_clause: build_target_where(
                options.filter_by_tk.as_ref(),
                options.filter.as_ref(),
            ),
            select: projection.select,
            include: projection.include,
        };

        self.delegate()?
            .find_first(args)
            .await
            .map_err(self.store_error("find_first"))
    }

    /// Primary key lookup.
    pub async fn find_by_tk(
        &self,
        key: impl Into<TargetKey> + Send,
        options: FindOneOptions,
    ) -> DbResult<Option<Value>> {
        self.find_one(options.by_tk(key)).await
    }

    pub async fn create(&self, options: CreateOptions) -> DbResult<Value> {
        self.delegate()?
            .create(CreateArgs {
                data: options.values,
            })
            .await
            .map_err(self.store_error("create"))
    }

    /// Insert many records; non-object values are stored as empty records.
    pub async fn create_many(&self, records: Vec<Value>) -> DbResult<BatchCount> {
        let data = records.into_iter().map(into_record).collect();
        self.delegate()?
            .create_many(CreateManyArgs { data })
            .await
            .map_err(self.store_error("create_many"))
    }

    pub async fn update(&self, options: UpdateOptions) -> DbResult<Value> {
        self.delegate()?
            .update(update_args(options))
            .await
            .map_err(self.store_error("update"))
    }

    pub async fn update_many(&self, options: UpdateOptions) -> DbResult<BatchCount> {
        self.delegate()?
            .update_many(update_args(options))
            .await
            .map_err(self.store_error("update_many"))
    }

    pub async fn destroy(&self, options: DestroyOptions) -> DbResult<Value> {
        self.delegate()?
            .delete(delete_args(&options))
            .await
            .map_err(self.store_error("delete"))
    }

    pub async fn destroy_many(&self, options: DestroyOptions) -> DbResult<BatchCount> {
        self.delegate()?
            .delete_many(delete_args(&options))
            .await
            .map_err(self.store_error("delete_many"))
    }

    pub async fn count(&self, filter: Option<&FilterCondition>) -> DbResult<u64> {
        self.delegate()?
            .count(CountArgs {
                where_clause: build_where(filter),
            })
            .await
            .map_err(self.store_error("count"))
    }

    pub async fn exists(&self, filter: Option<&FilterCondition>) -> DbResult<bool> {
        Ok(self.count(filter).await? > 0)
    }
}

fn update_args(options: UpdateOptions) -> UpdateArgs {
    UpdateArgs {
        where_clause: build_target_where(options.filter_by_tk.as_ref(), options.filter.as_ref()),
        data: options.values,
    }
}

fn delete_args(options: &DestroyOptions) -> DeleteArgs {
    DeleteArgs {
        where_clause: build_target_where(options.filter_by_tk.as_ref(), options.filter.as_ref()),
    }
}

/// A repository specialised for one collection.
///
/// Implementors supply [`base`](Self::base) and override only the
/// operations they change; everything else forwards to the generic
/// repository. Register one with
/// [`Database::register_repository`](super::Database::register_repository).
#[async_trait]
pub trait CollectionRepository: Send + Sync + 'static {
    /// The generic repository this one is built on.
    fn base(&self) -> &Repository;

    /// Concrete type access for downcasting.
    fn as_any(&self) -> &dyn Any;

    async fn find(&self, options: FindOptions) -> DbResult<Vec<Value>> {
        self.base().find(options).await
    }

    async fn find_and_count(&self, options: FindOptions) -> DbResult<PaginatedResult<Value>> {
        self.base().find_and_count(options).await
    }

    async fn find_one(&self, options: FindOneOptions) -> DbResult<Option<Value>> {
        self.base().find_one(options).await
    }

    /// Primary key lookup through this repository's `find_one`.
    async fn find_by_tk(&self, key: TargetKey, options: FindOneOptions) -> DbResult<Option<Value>> {
        self.find_one(options.by_tk(key)).await
    }

    async fn create(&self, options: CreateOptions) -> DbResult<Value> {
        self.base().create(options).await
    }

    async fn create_many(&self, records: Vec<Value>) -> DbResult<BatchCount> {
        self.base().create_many(records).await
    }

    async fn update(&self, options: UpdateOptions) -> DbResult<Value> {
        self.base().update(options).await
    }

    async fn update_many(&self, options: UpdateOptions) -> DbResult<BatchCount> {
        self.base().update_many(options).await
    }

    async fn destroy(&self, options: DestroyOptions) -> DbResult<Value> {
        self.base().destroy(options).await
    }

    async fn destroy_many(&self, options: DestroyOptions) -> DbResult<BatchCount> {
        self.base().destroy_many(options).await
    }

    async fn count(&self, filter: Option<&FilterCondition>) -> DbResult<u64> {
        self.base().count(filter).await
    }

    async fn exists(&self, filter: Option<&FilterCondition>) -> DbResult<bool> {
        Ok(self.count(filter).await? > 0)
    }
}

impl CollectionRepository for Repository {
    fn base(&self) -> &Repository {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds a specialised repository around the generic one.
pub type RepositoryFactory =
    Arc<dyn Fn(Repository) -> Arc<dyn CollectionRepository> + Send + Sync>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::SchemaError;
    use crate::db::memory::MemoryStore;
    use crate::db::store::StoreHandle;
    use serde_json::json;

    struct StoreSource(MemoryStore);

    impl DelegateSource for StoreSource {
        fn resolve(&self, collection: &str) -> Result<Arc<dyn StoreDelegate>, SchemaError> {
            self.0
                .delegate(collection)
                .ok_or_else(|| SchemaError::MissingDelegate(collection.to_string()))
        }
    }

    fn repository(store: &MemoryStore, collection: &str) -> Repository {
        Repository::new(collection, Arc::new(StoreSource(store.clone())), 2)
    }

    async fn seeded() -> (MemoryStore, Repository) {
        let store = MemoryStore::new().with_table("posts");
        let repo = repository(&store, "posts");
        repo.create_many(
            (1..=5)
                .map(|i| json!({ "id": i, "title": format!("post {i}"), "views": i * 10 }))
                .collect(),
        )
        .await
        .unwrap();
        (store, repo)
    }

    #[tokio::test]
    async fn missing_delegate_is_a_schema_error() {
        let store = MemoryStore::new();
        let repo = repository(&store, "ghosts");

        let err = repo.find(FindOptions::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Schema(SchemaError::MissingDelegate(ref name)) if name == "ghosts"
        ));
    }

    #[tokio::test]
    async fn find_and_count_uses_default_page_size() {
        let (_store, repo) = seeded().await;

        let page = repo
            .find_and_count(FindOptions::new().sort(["-views"]))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0]["views"], json!(50));
    }

    #[tokio::test]
    async fn find_and_count_counts_with_the_filter() {
        let (_store, repo) = seeded().await;
        let filter = FilterCondition::from_json(&json!({ "views": { "$gt": 20 } })).unwrap();

        let page = repo
            .find_and_count(FindOptions::new().filter(filter).page(2, 2))
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.data.len(), 1);
    }

    #[tokio::test]
    async fn find_and_count_keeps_offset_window() {
        let (_store, repo) = seeded().await;

        let page = repo
            .find_and_count(FindOptions::new().sort(["views"]).offset(2).limit(2))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data[0]["views"], json!(30));
        assert_eq!(page.data[1]["views"], json!(40));
    }

    #[tokio::test]
    async fn key_lookup_wins_over_filter() {
        let (_store, repo) = seeded().await;
        let filter = FilterCondition::new().equals("title", "post 1");

        let found = repo
            .find_by_tk(3, FindOneOptions::new().filter(filter).fields(["title"]))
            .await
            .unwrap();

        assert_eq!(found, Some(json!({ "title": "post 3" })));
    }

    #[tokio::test]
    async fn mutations_and_counts() {
        let (_store, repo) = seeded().await;

        let updated = repo
            .update(UpdateOptions::new(json!({ "title": "renamed" })).by_tk(2))
            .await
            .unwrap();
        assert_eq!(updated["title"], json!("renamed"));

        let bumped = repo
            .update_many(
                UpdateOptions::new(json!({ "views": 0 }))
                    .filter(FilterCondition::from_json(&json!({ "views": { "$gte": 40 } })).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(bumped.count, 2);

        let zero = FilterCondition::new().equals("views", 0);
        assert_eq!(repo.count(Some(&zero)).await.unwrap(), 2);
        assert!(repo.exists(Some(&zero)).await.unwrap());

        repo.destroy(DestroyOptions::new().by_tk(1)).await.unwrap();
        let removed = repo
            .destroy_many(DestroyOptions::new().filter(zero.clone()))
            .await
            .unwrap();
        assert_eq!(removed.count, 2);
        assert_eq!(repo.count(None).await.unwrap(), 2);
        assert!(!repo.exists(Some(&zero)).await.unwrap());
    }

    #[tokio::test]
    async fn store_failures_name_the_operation() {
        let (_store, repo) = seeded().await;

        let err = repo
            .destroy(DestroyOptions::new().by_tk(404))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Store { operation: "delete", .. }));
    }
}
