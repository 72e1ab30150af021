//! Storage contract.
//!
//! The concrete storage engine is an external collaborator. It exposes one
//! [`StoreDelegate`] per collection plus batch, raw-query, connection and
//! transaction primitives. Repositories never talk to the engine directly;
//! they resolve delegates by collection name through a [`DelegateSource`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::error::SchemaError;
use super::query::{
    CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, FindFirstArgs, FindManyArgs, UpdateArgs,
};
use super::types::BatchCount;

/// Per-collection CRUD primitives implemented by the storage engine.
#[async_trait]
pub trait StoreDelegate: Send + Sync {
    async fn find_many(&self, args: FindManyArgs) -> Result<Vec<Value>>;

    async fn find_first(&self, args: FindFirstArgs) -> Result<Option<Value>>;

    async fn create(&self, args: CreateArgs) -> Result<Value>;

    async fn create_many(&self, args: CreateManyArgs) -> Result<BatchCount>;

    /// Update exactly one record; errors when nothing matches.
    async fn update(&self, args: UpdateArgs) -> Result<Value>;

    async fn update_many(&self, args: UpdateArgs) -> Result<BatchCount>;

    /// Delete exactly one record; errors when nothing matches.
    async fn delete(&self, args: DeleteArgs) -> Result<Value>;

    async fn delete_many(&self, args: DeleteArgs) -> Result<BatchCount>;

    async fn count(&self, args: CountArgs) -> Result<u64>;
}

/// A mutation queued for atomic batch execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PendingOperation {
    Create { collection: String, args: CreateArgs },
    CreateMany { collection: String, args: CreateManyArgs },
    Update { collection: String, args: UpdateArgs },
    UpdateMany { collection: String, args: UpdateArgs },
    Delete { collection: String, args: DeleteArgs },
    DeleteMany { collection: String, args: DeleteArgs },
}

impl PendingOperation {
    /// The collection this operation targets.
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. }
            | Self::CreateMany { collection, .. }
            | Self::Update { collection, .. }
            | Self::UpdateMany { collection, .. }
            | Self::Delete { collection, .. }
            | Self::DeleteMany { collection, .. } => collection,
        }
    }
}

/// The query surface shared by the top-level store and transactions.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Delegate for a collection, if the engine knows it.
    fn delegate(&self, collection: &str) -> Option<Arc<dyn StoreDelegate>>;

    /// Execute the operations in order, atomically. Returns one result per
    /// operation.
    async fn batch(&self, operations: Vec<PendingOperation>) -> Result<Vec<Value>>;

    /// Engine-specific raw query.
    async fn raw_query(&self, query: &str, params: Vec<Value>) -> Result<Vec<Value>>;
}

/// A scoped transaction. Writes become visible to the store on `commit`;
/// dropping it without committing discards them.
#[async_trait]
pub trait StoreTransaction: StoreHandle {
    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}

/// The top-level storage engine.
#[async_trait]
pub trait Store: StoreHandle {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Resolves a collection name to its delegate.
pub trait DelegateSource: Send + Sync {
    fn resolve(&self, collection: &str) -> Result<Arc<dyn StoreDelegate>, SchemaError>;
}

/// Delegates of a transaction, resolved on demand.
pub(crate) struct TransactionDelegates(pub(crate) Arc<dyn StoreTransaction>);

impl DelegateSource for TransactionDelegates {
    fn resolve(&self, collection: &str) -> Result<Arc<dyn StoreDelegate>, SchemaError> {
        self.0
            .delegate(collection)
            .ok_or_else(|| SchemaError::MissingDelegate(collection.to_string()))
    }
}
