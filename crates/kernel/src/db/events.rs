//! Event bus.
//!
//! Named-topic publish/subscribe registry. Topics are exact strings such as
//! `widgets.beforeCreate`; handlers for one topic run strictly in
//! subscription order, one at a time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::error::EventHandlerError;

/// A subscriber to one or more topics.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> anyhow::Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: Value) -> anyhow::Result<()> {
        (self.0)(payload).await
    }
}

/// Wrap an async closure as a handler.
///
/// Keep the returned `Arc` to unsubscribe it later with [`EventBus::off`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Mutation events emitted around repository writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseEvent {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDestroy,
    AfterDestroy,
}

impl DatabaseEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeCreate => "beforeCreate",
            Self::AfterCreate => "afterCreate",
            Self::BeforeUpdate => "beforeUpdate",
            Self::AfterUpdate => "afterUpdate",
            Self::BeforeDestroy => "beforeDestroy",
            Self::AfterDestroy => "afterDestroy",
        }
    }

    /// Full topic name for a collection, e.g. `widgets.afterUpdate`.
    pub fn topic(self, collection: &str) -> String {
        format!("{collection}.{}", self.as_str())
    }
}

impl fmt::Display for DatabaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic to ordered handler list.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to an exact topic.
    pub fn on(&self, event: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .entry(event.into())
            .or_default()
            .push(handler);
    }

    /// Unsubscribe a handler by identity. Returns whether it was found.
    pub fn off(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Run every handler for `event` in order.
    ///
    /// The first failing handler aborts the emission; later handlers do not
    /// run. Handlers subscribed while an emission is in flight are not
    /// called by that emission.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), EventHandlerError> {
        let handlers = self.handlers.read().get(event).cloned().unwrap_or_default();
        if handlers.is_empty() {
            return Ok(());
        }

        debug!(event, handlers = handlers.len(), "emitting event");

        for handler in handlers {
            handler
                .handle(payload.clone())
                .await
                .map_err(|source| EventHandlerError {
                    event: event.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map(|v| v.len()).unwrap_or(0)
    }

    /// Handler count per topic, sorted by topic.
    pub fn handler_counts(&self) -> BTreeMap<String, usize> {
        self.handlers
            .read()
            .iter()
            .map(|(event, list)| (event.clone(), list.len()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> Arc<dyn EventHandler> {
        let log = Arc::clone(log);
        let label = label.to_string();
        handler_fn(move |payload| {
            let log = Arc::clone(&log);
            let label = label.clone();
            async move {
                log.lock().push(format!("{label}:{payload}"));
                anyhow::Ok(())
            }
        })
    }

    #[test]
    fn topic_names() {
        assert_eq!(DatabaseEvent::BeforeCreate.topic("widgets"), "widgets.beforeCreate");
        assert_eq!(DatabaseEvent::AfterDestroy.to_string(), "afterDestroy");
    }

    #[tokio::test]
    async fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on("widgets.afterCreate", recorder(&log, "first"));
        bus.on("widgets.afterCreate", recorder(&log, "second"));
        bus.on("widgets.afterUpdate", recorder(&log, "other"));

        bus.emit("widgets.afterCreate", json!(1)).await.unwrap();

        assert_eq!(*log.lock(), vec!["first:1", "second:1"]);
    }

    #[tokio::test]
    async fn failing_handler_stops_the_emission() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(
            "widgets.beforeCreate",
            handler_fn(|_| async { Err::<(), _>(anyhow::anyhow!("nope")) }),
        );
        bus.on("widgets.beforeCreate", recorder(&log, "late"));

        let err = bus.emit("widgets.beforeCreate", json!({})).await.unwrap_err();

        assert_eq!(err.event, "widgets.beforeCreate");
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn off_removes_by_identity() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let keep = recorder(&log, "keep");
        let drop = recorder(&log, "drop");
        bus.on("t", Arc::clone(&keep));
        bus.on("t", Arc::clone(&drop));

        assert!(bus.off("t", &drop));
        assert!(!bus.off("t", &drop));
        assert_eq!(bus.handler_count("t"), 1);

        bus.emit("t", json!("x")).await.unwrap();
        assert_eq!(*log.lock(), vec!["keep:\"x\""]);

        assert!(bus.off("t", &keep));
        assert!(bus.handler_counts().is_empty());
    }
}
