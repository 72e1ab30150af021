//! Typed repository access.
//!
//! A [`Model`] binds a row type to its collection name, so
//! `db.repository::<Mindmap>()` checks the pairing at the call site instead
//! of passing loose JSON around.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{DbError, DbResult};
use super::evented::EventedRepository;
use super::filter::FilterCondition;
use super::types::{
    BatchCount, CreateOptions, DestroyOptions, FindOneOptions, FindOptions, PaginatedResult,
    TargetKey, UpdateOptions,
};

/// A row type stored in one named collection.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registered collection name.
    const COLLECTION: &'static str;
}

/// Event-emitting repository that (de)serialises rows as `M`.
pub struct TypedRepository<M: Model> {
    inner: Arc<EventedRepository>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for TypedRepository<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _model: PhantomData,
        }
    }
}

impl<M: Model> TypedRepository<M> {
    pub(crate) fn new(inner: Arc<EventedRepository>) -> Self {
        Self {
            inner,
            _model: PhantomData,
        }
    }

    /// The untyped repository underneath.
    pub fn untyped(&self) -> &Arc<EventedRepository> {
        &self.inner
    }

    fn decode(&self, row: Value) -> DbResult<M> {
        serde_json::from_value(row).map_err(|source| DbError::Decode {
            collection: M::COLLECTION.to_string(),
            source,
        })
    }

    fn encode(&self, model: &M) -> DbResult<Value> {
        serde_json::to_value(model).map_err(|source| DbError::Decode {
            collection: M::COLLECTION.to_string(),
            source,
        })
    }

    pub async fn find(&self, options: FindOptions) -> DbResult<Vec<M>> {
        let rows = self.inner.find(options).await?;
        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    pub async fn find_and_count(&self, options: FindOptions) -> DbResult<PaginatedResult<M>> {
        self.inner
            .find_and_count(options)
            .await?
            .map(|row| self.decode(row))
    }

    pub async fn find_one(&self, options: FindOneOptions) -> DbResult<Option<M>> {
        self.inner
            .find_one(options)
            .await?
            .map(|row| self.decode(row))
            .transpose()
    }

    pub async fn find_by_tk(&self, key: impl Into<TargetKey> + Send) -> DbResult<Option<M>> {
        self.find_one(FindOneOptions::new().by_tk(key)).await
    }

    /// Insert a model; the stored row (with any store-assigned fields) is
    /// returned.
    pub async fn create(&self, model: &M) -> DbResult<M> {
        let values = self.encode(model)?;
        let created = self.inner.create(CreateOptions::new(values)).await?;
        self.decode(created)
    }

    pub async fn create_many(&self, models: &[M]) -> DbResult<BatchCount> {
        let rows = models
            .iter()
            .map(|model| self.encode(model))
            .collect::<DbResult<Vec<_>>>()?;
        self.inner.create_many(rows).await
    }

    pub async fn update(&self, options: UpdateOptions) -> DbResult<M> {
        let updated = self.inner.update(options).await?;
        self.decode(updated)
    }

    pub async fn update_many(&self, options: UpdateOptions) -> DbResult<BatchCount> {
        self.inner.update_many(options).await
    }

    pub async fn destroy(&self, options: DestroyOptions) -> DbResult<M> {
        let destroyed = self.inner.destroy(options).await?;
        self.decode(destroyed)
    }

    pub async fn destroy_many(&self, options: DestroyOptions) -> DbResult<BatchCount> {
        self.inner.destroy_many(options).await
    }

    pub async fn count(&self, filter: Option<&FilterCondition>) -> DbResult<u64> {
        self.inner.count(filter).await
    }

    pub async fn exists(&self, filter: Option<&FilterCondition>) -> DbResult<bool> {
        self.inner.exists(filter).await
    }
}
