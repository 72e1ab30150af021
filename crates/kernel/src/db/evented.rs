//! Event-emitting repository wrapper.
//!
//! [`EventedRepository`] is what [`Database::get_repository`] hands out. Its
//! `create`, `update` and `destroy` emit `before*` and `after*` events around
//! the wrapped call; every other operation forwards unchanged.
//!
//! A failing `before*` handler aborts the call before the mutation runs. A
//! failing `after*` handler surfaces to the caller after the mutation has
//! already been applied; nothing is undone.
//!
//! [`Database::get_repository`]: super::Database::get_repository

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::error::{DbError, DbResult};
use super::events::{DatabaseEvent, EventBus};
use super::filter::FilterCondition;
use super::repository::CollectionRepository;
use super::types::{
    BatchCount, CreateOptions, DestroyOptions, FindOneOptions, FindOptions, PaginatedResult,
    TargetKey, UpdateOptions,
};

/// Repository wrapper that emits mutation events.
pub struct EventedRepository {
    collection: String,
    inner: Arc<dyn CollectionRepository>,
    events: Arc<EventBus>,
}

impl EventedRepository {
    pub(crate) fn new(inner: Arc<dyn CollectionRepository>, events: Arc<EventBus>) -> Self {
        Self {
            collection: inner.base().collection().to_string(),
            inner,
            events,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The wrapped repository, bypassing event emission.
    pub fn inner(&self) -> &Arc<dyn CollectionRepository> {
        &self.inner
    }

    /// The wrapped repository as its concrete type, if it is one.
    pub fn downcast_ref<T: CollectionRepository>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    async fn emit(&self, event: DatabaseEvent, payload: Value) -> DbResult<()> {
        let topic = event.topic(&self.collection);
        self.events.emit(&topic, payload).await?;
        Ok(())
    }

    fn payload(&self, options: &impl Serialize) -> DbResult<Value> {
        serde_json::to_value(options).map_err(|source| DbError::Decode {
            collection: self.collection.clone(),
            source,
        })
    }

    /// Emits `beforeCreate` with the input values and `afterCreate` with the
    /// created record.
    pub async fn create(&self, options: CreateOptions) -> DbResult<Value> {
        self.emit(
            DatabaseEvent::BeforeCreate,
            Value::Object(options.values.clone()),
        )
        .await?;
        let created = self.inner.create(options).await?;
        self.emit(DatabaseEvent::AfterCreate, created.clone()).await?;
        Ok(created)
    }

    /// Emits `beforeUpdate` with the options and `afterUpdate` with the
    /// updated record.
    pub async fn update(&self, options: UpdateOptions) -> DbResult<Value> {
        self.emit(DatabaseEvent::BeforeUpdate, self.payload(&options)?)
            .await?;
        let updated = self.inner.update(options).await?;
        self.emit(DatabaseEvent::AfterUpdate, updated.clone()).await?;
        Ok(updated)
    }

    /// Emits `beforeDestroy` with the options and `afterDestroy` with the
    /// removed record.
    pub async fn destroy(&self, options: DestroyOptions) -> DbResult<Value> {
        self.emit(DatabaseEvent::BeforeDestroy, self.payload(&options)?)
            .await?;
        let destroyed = self.inner.destroy(options).await?;
        self.emit(DatabaseEvent::AfterDestroy, destroyed.clone())
            .await?;
        Ok(destroyed)
    }

    pub async fn find(&self, options: FindOptions) -> DbResult<Vec<Value>> {
        self.inner.find(options).await
    }

    pub async fn find_and_count(&self, options: FindOptions) -> DbResult<PaginatedResult<Value>> {
        self.inner.find_and_count(options).await
    }

    pub async fn find_one(&self, options: FindOneOptions) -> DbResult<Option<Value>> {
        self.inner.find_one(options).await
    }

    pub async fn find_by_tk(
        &self,
        key: impl Into<TargetKey> + Send,
        options: FindOneOptions,
    ) -> DbResult<Option<Value>> {
        self.inner.find_by_tk(key.into(), options).await
    }

    pub async fn create_many(&self, records: Vec<Value>) -> DbResult<BatchCount> {
        self.inner.create_many(records).await
    }

    pub async fn update_many(&self, options: UpdateOptions) -> DbResult<BatchCount> {
        self.inner.update_many(options).await
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
