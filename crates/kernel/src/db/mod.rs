//! Collection-oriented data access.
//!
//! Plugins declare collections on the [`Database`], obtain repositories over
//! them and subscribe to mutation events. Requests are expressed with
//! [`FilterCondition`] and the option types in [`types`], compiled by
//! [`compiler`] into the native query a [`StoreDelegate`] executes.

pub mod compiler;
mod database;
mod error;
mod evented;
mod events;
pub mod filter;
pub mod memory;
pub mod query;
mod repository;
pub mod store;
mod typed;
pub mod types;

pub use database::{Database, DatabaseStatus, Transaction};
pub use error::{DbError, DbResult, EventHandlerError, SchemaError};
pub use evented::EventedRepository;
pub use events::{DatabaseEvent, EventBus, EventHandler, handler_fn};
pub use filter::{FieldOperators, FilterCondition, FilterError};
pub use memory::MemoryStore;
pub use repository::{CollectionRepository, DEFAULT_PAGE_SIZE, Repository, RepositoryFactory};
pub use store::{PendingOperation, Store, StoreDelegate, StoreHandle, StoreTransaction};
pub use typed::{Model, TypedRepository};
pub use types::{
    BatchCount, CollectionDefinition, CreateOptions, DestroyOptions, FieldDefinition, FieldType,
    FindOneOptions, FindOptions, IndexDefinition, PaginatedResult, Record, TargetKey,
    UpdateOptions,
};
