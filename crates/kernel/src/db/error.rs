//! Database error types.

use thiserror::Error;

/// Schema registry and delegate resolution errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The definition itself is malformed.
    #[error("collection '{collection}': {reason}")]
    InvalidCollection { collection: String, reason: String },

    /// Two fields in one definition share a name.
    #[error("collection '{collection}': duplicate field '{field}'")]
    DuplicateField { collection: String, field: String },

    /// A typed lookup named a collection that was never registered.
    #[error("collection '{0}' is not registered")]
    UnknownCollection(String),

    /// The store has no delegate for this collection.
    #[error("no storage delegate for collection '{0}'")]
    MissingDelegate(String),
}

/// An event handler failed while an event was being emitted.
///
/// Remaining handlers for that emission were not run.
#[derive(Debug, Error)]
#[error("handler for '{event}' failed: {source}")]
pub struct EventHandlerError {
    pub event: String,
    #[source]
    pub source: anyhow::Error,
}

/// Errors surfaced by the database and its repositories.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Event(#[from] EventHandlerError),

    /// The storage delegate rejected an operation.
    #[error("{operation} on '{collection}' failed: {source}")]
    Store {
        collection: String,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A row could not be converted to or from its typed model.
    #[error("collection '{collection}': row conversion failed: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },

    /// Opening or releasing the store connection failed.
    #[error("connection failed: {0}")]
    Connection(#[source] anyhow::Error),

    /// Beginning, committing or rolling back a transaction failed.
    #[error("transaction failed: {0}")]
    Transaction(#[source] anyhow::Error),

    /// A batch or raw query was rejected by the store.
    #[error("{operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl DbError {
    pub(crate) fn store(
        collection: impl Into<String>,
        operation: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::Store {
            collection: collection.into(),
            operation,
            source,
        }
    }

    /// True when a `before*` or `after*` handler caused this error.
    pub fn is_event_error(&self) -> bool {
        matches!(self, Self::Event(_))
    }
}

/// Result type alias using DbError.
pub type DbResult<T> = Result<T, DbError>;
