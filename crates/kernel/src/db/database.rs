//! Database: schema registry, repository cache and event bus.
//!
//! Collections are registered during plugin bootstrap. Repositories are
//! built lazily on first `get_repository` and cached per collection name
//! until `register_repository` replaces the factory for that name.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{DbError, DbResult, EventHandlerError, SchemaError};
use super::evented::EventedRepository;
use super::events::{EventBus, EventHandler};
use super::repository::{
    CollectionRepository, DEFAULT_PAGE_SIZE, Repository, RepositoryFactory,
};
use super::store::{
    DelegateSource, PendingOperation, Store, StoreDelegate, StoreTransaction,
    TransactionDelegates,
};
use super::typed::{Model, TypedRepository};
use super::types::CollectionDefinition;

/// Delegates resolved from the top-level store.
///
/// Filled when a collection is registered; a name the store did not know at
/// registration time is looked up again on first use.
struct StoreDelegates {
    store: Arc<dyn Store>,
    delegates: DashMap<String, Arc<dyn StoreDelegate>>,
}

impl StoreDelegates {
    fn refresh(&self, collection: &str) {
        match self.store.delegate(collection) {
            Some(delegate) => {
                self.delegates.insert(collection.to_string(), delegate);
            }
            None => {
                self.delegates.remove(collection);
            }
        }
    }
}

impl DelegateSource for StoreDelegates {
    fn resolve(&self, collection: &str) -> Result<Arc<dyn StoreDelegate>, SchemaError> {
        if let Some(delegate) = self.delegates.get(collection) {
            return Ok(Arc::clone(delegate.value()));
        }

        let delegate = self
            .store
            .delegate(collection)
            .ok_or_else(|| SchemaError::MissingDelegate(collection.to_string()))?;
        self.delegates
            .insert(collection.to_string(), Arc::clone(&delegate));
        Ok(delegate)
    }
}

/// Registered collections in registration order.
#[derive(Default)]
struct CollectionRegistry {
    by_name: HashMap<String, CollectionDefinition>,
    order: Vec<String>,
}

/// Diagnostic snapshot of the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    /// Registered collection names, in registration order.
    pub collections: Vec<String>,
    /// Collection names with a cached repository, sorted.
    pub repositories: Vec<String>,
    /// Handler count per event topic.
    pub event_handlers: BTreeMap<String, usize>,
}

/// The data-access runtime shared by all plugins.
pub struct Database {
    store: Arc<dyn Store>,
    delegates: Arc<StoreDelegates>,
    collections: RwLock<CollectionRegistry>,
    factories: DashMap<String, RepositoryFactory>,
    repositories: DashMap<String, Arc<EventedRepository>>,
    events: Arc<EventBus>,
    default_page_size: u64,
}

impl Database {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            delegates: Arc::new(StoreDelegates {
                store: Arc::clone(&store),
                delegates: DashMap::new(),
            }),
            store,
            collections: RwLock::new(CollectionRegistry::default()),
            factories: DashMap::new(),
            repositories: DashMap::new(),
            events: Arc::new(EventBus::new()),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size `find_and_count` falls back to.
    pub fn with_default_page_size(mut self, page_size: u64) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    /// Register or overwrite a collection definition.
    pub fn collection(&self, definition: CollectionDefinition) -> Result<(), SchemaError> {
        validate_collection(&definition)?;

        let name = definition.name.clone();
        let field_count = definition.fields.len();
        let replaced = {
            let mut registry = self.collections.write();
            let replaced = registry
                .by_name
                .insert(name.clone(), definition)
                .is_some();
            if !replaced {
                registry.order.push(name.clone());
            }
            replaced
        };
        self.delegates.refresh(&name);

        if replaced {
            debug!(collection = %name, fields = field_count, "collection definition replaced");
        } else {
            info!(collection = %name, fields = field_count, "collection registered");
        }
        Ok(())
    }

    pub fn get_collection(&self, name: &str) -> Option<CollectionDefinition> {
        self.collections.read().by_name.get(name).cloned()
    }

    /// All collections in registration order.
    pub fn get_collections(&self) -> Vec<CollectionDefinition> {
        let registry = self.collections.read();
        registry
            .order
            .iter()
            .filter_map(|name| registry.by_name.get(name).cloned())
            .collect()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().by_name.contains_key(name)
    }

    /// Use a specialised repository for `name` and drop any cached instance.
    pub fn register_repository<R, F>(&self, name: impl Into<String>, factory: F)
    where
        R: CollectionRepository,
        F: Fn(Repository) -> R + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: RepositoryFactory =
            Arc::new(move |base| Arc::new(factory(base)) as Arc<dyn CollectionRepository>);
        self.factories.insert(name.clone(), factory);
        self.repositories.remove(&name);
        debug!(collection = %name, "custom repository registered");
    }

    /// Cached event-emitting repository for a collection.
    ///
    /// The same `Arc` is returned until `register_repository` is called for
    /// the name. An unknown collection is not an error here; the first query
    /// fails with [`SchemaError::MissingDelegate`] if the store has no
    /// delegate for it.
    pub fn get_repository(&self, name: &str) -> Arc<EventedRepository> {
        if let Some(cached) = self.repositories.get(name) {
            return Arc::clone(cached.value());
        }

        let base = Repository::new(
            name,
            Arc::clone(&self.delegates) as Arc<dyn DelegateSource>,
            self.default_page_size,
        );
        let factory = self.factories.get(name).map(|f| Arc::clone(f.value()));
        let inner = match factory {
            Some(factory) => factory(base),
            None => Arc::new(base) as Arc<dyn CollectionRepository>,
        };
        let built = Arc::new(EventedRepository::new(inner, Arc::clone(&self.events)));

        // Another caller may have cached one meanwhile; keep theirs.
        Arc::clone(
            self.repositories
                .entry(name.to_string())
                .or_insert(built)
                .value(),
        )
    }

    /// Typed repository for a registered collection.
    pub fn repository<M: Model>(&self) -> DbResult<TypedRepository<M>> {
        if !self.has_collection(M::COLLECTION) {
            return Err(SchemaError::UnknownCollection(M::COLLECTION.to_string()).into());
        }
        Ok(TypedRepository::new(self.get_repository(M::COLLECTION)))
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn on(&self, event: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.events.on(event, handler);
    }

    pub fn off(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        self.events.off(event, handler)
    }

    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), EventHandlerError> {
        self.events.emit(event, payload).await
    }

    /// Run `f` inside a store transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    /// Repositories obtained from the [`Transaction`] do not emit events.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let tx: Arc<dyn StoreTransaction> =
            Arc::from(self.store.begin().await.map_err(DbError::Transaction)?);
        let handle = Transaction {
            tx: Arc::clone(&tx),
            default_page_size: self.default_page_size,
        };

        match f(handle).await {
            Ok(value) => {
                tx.commit().await.map_err(DbError::Transaction)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Execute operations atomically, in order.
    pub async fn batch(&self, operations: Vec<PendingOperation>) -> DbResult<Vec<Value>> {
        self.store
            .batch(operations)
            .await
            .map_err(|source| DbError::Query {
                operation: "batch",
                source,
            })
    }

    pub async fn raw_query(&self, query: &str, params: Vec<Value>) -> DbResult<Vec<Value>> {
        self.store
            .raw_query(query, params)
            .await
            .map_err(|source| DbError::Query {
                operation: "raw query",
                source,
            })
    }

    pub async fn connect(&self) -> DbResult<()> {
        self.store.connect().await.map_err(DbError::Connection)?;
        info!("database connected");
        Ok(())
    }

    pub async fn disconnect(&self) -> DbResult<()> {
        self.store.disconnect().await.map_err(DbError::Connection)?;
        info!("database disconnected");
        Ok(())
    }

    pub fn get_status(&self) -> DatabaseStatus {
        let collections = self.collections.read().order.clone();
        let mut repositories: Vec<String> =
            self.repositories.iter().map(|e| e.key().clone()).collect();
        repositories.sort();

        DatabaseStatus {
            collections,
            repositories,
            event_handlers: self.events.handler_counts(),
        }
    }
}

/// Handle passed to [`Database::transaction`] closures.
#[derive(Clone)]
pub struct Transaction {
    tx: Arc<dyn StoreTransaction>,
    default_page_size: u64,
}

impl Transaction {
    /// Generic repository bound to this transaction.
    pub fn repository(&self, name: &str) -> Repository {
        Repository::new(
            name,
            Arc::new(TransactionDelegates(Arc::clone(&self.tx))),
            self.default_page_size,
        )
    }

    pub async fn batch(&self, operations: Vec<PendingOperation>) -> DbResult<Vec<Value>> {
        self.tx
            .batch(operations)
            .await
            .map_err(|source| DbError::Query {
                operation: "batch",
                source,
            })
    }

    pub async fn raw_query(&self, query: &str, params: Vec<Value>) -> DbResult<Vec<Value>> {
        self.tx
            .raw_query(query, params)
            .await
            .map_err(|source| DbError::Query {
                operation: "raw query",
                source,
            })
    }
}

fn validate_collection(definition: &CollectionDefinition) -> Result<(), SchemaError> {
    let name = definition.name.trim();
    if name.is_empty() {
        return Err(SchemaError::InvalidCollection {
            collection: definition.name.clone(),
            reason: "name must not be empty".to_string(),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for field in &definition.fields {
        if field.name.trim().is_empty() {
            return Err(SchemaError::InvalidCollection {
                collection: definition.name.clone(),
                reason: "field name must not be empty".to_string(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                collection: definition.name.clone(),
                field: field.name.clone(),
            });
        }
        if field.field_type.is_relation() && field.target.is_none() {
            return Err(SchemaError::InvalidCollection {
                collection: definition.name.clone(),
                reason: format!("relation field '{}' has no target", field.name),
            });
        }
    }
    Ok(())
}
