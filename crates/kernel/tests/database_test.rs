#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Database integration tests.
//!
//! Exercise the public data-access surface end to end over the in-memory
//! store: repositories, event interception, transactions and custom
//! repositories.

mod common;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use tessera_kernel::db::{
    CollectionRepository, CreateOptions, Database, DbError, DbResult, DestroyOptions,
    FieldOperators, FilterCondition, FindOneOptions, FindOptions, MemoryStore, Model, Repository,
    SchemaError, UpdateOptions, handler_fn,
};
use tessera_test_utils::{assert, collections, memory_database};

#[tokio::test]
async fn find_applies_filter_sort_and_pagination() {
    let (db, _store) = common::seeded_database().await;
    let posts = db.get_repository("posts");

    let published = posts
        .find(
            FindOptions::new()
                .filter(FilterCondition::new().equals("status", "published"))
                .sort(["-views"]),
        )
        .await
        .unwrap();
    assert_eq!(
        assert::field_values(&published, "title"),
        vec![json!("hello again"), json!("Hello World")]
    );

    let page = posts
        .find_and_count(FindOptions::new().sort(["views"]).page(2, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.page, 2);
    assert_eq!(page.page_size, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(assert::field_values(&page.data, "views"), vec![json!(42)]);
}

#[tokio::test]
async fn find_and_count_defaults_to_first_page() {
    let (db, _store) = common::seeded_database().await;

    let page = db
        .get_repository("posts")
        .find_and_count(FindOptions::new())
        .await
        .unwrap();

    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 20);
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.data.len(), 3);
}

#[tokio::test]
async fn find_and_count_honours_offset_and_limit() {
    let (db, _store) = common::seeded_database().await;
    let posts = db.get_repository("posts");

    let window = posts
        .find_and_count(FindOptions::new().sort(["views"]).offset(1).limit(2))
        .await
        .unwrap();
    assert_eq!(
        assert::field_values(&window.data, "views"),
        vec![json!(10), json!(42)]
    );
    assert_eq!(window.total, 3);
    assert_eq!(window.page, 1);
    assert_eq!(window.page_size, 2);
    assert_eq!(window.total_pages, 2);

    let tail = posts
        .find_and_count(FindOptions::new().sort(["views"]).offset(2))
        .await
        .unwrap();
    assert_eq!(assert::field_values(&tail.data, "views"), vec![json!(42)]);
    assert_eq!(tail.page_size, 20);
}

#[tokio::test]
async fn like_operators_match_substrings() {
    let (db, _store) = common::seeded_database().await;
    let posts = db.get_repository("posts");

    let sensitive = FilterCondition::new().field("title", FieldOperators::new().like("%hello%"));
    assert_eq!(posts.count(Some(&sensitive)).await.unwrap(), 1);

    let insensitive =
        FilterCondition::new().field("title", FieldOperators::new().i_like("%hello%"));
    assert_eq!(posts.count(Some(&insensitive)).await.unwrap(), 2);

    let either = FilterCondition::new().or(vec![
        FilterCondition::new().field("views", FieldOperators::new().gte(40)),
        FilterCondition::new().equals("status", "draft"),
    ]);
    assert_eq!(posts.count(Some(&either)).await.unwrap(), 2);
}

#[tokio::test]
async fn operator_json_filters_compile() {
    let (db, _store) = common::seeded_database().await;

    let filter = FilterCondition::from_json(&json!({
        "$and": [
            { "views": { "$gt": 0, "$lt": 20 } },
            { "status": { "$in": ["published", "archived"] } }
        ]
    }))
    .unwrap();
    let found = db
        .get_repository("posts")
        .find(FindOptions::new().filter(filter))
        .await
        .unwrap();

    assert_eq!(assert::field_values(&found, "title"), vec![json!("Hello World")]);
}

#[tokio::test]
async fn projection_limits_returned_fields() {
    let (db, _store) = common::seeded_database().await;

    let found = db
        .get_repository("posts")
        .find_one(
            FindOneOptions::new()
                .filter(FilterCondition::new().equals("status", "draft"))
                .fields(["title"]),
        )
        .await
        .unwrap()
        .unwrap();

    assert::has_key(&found, "title");
    assert::lacks_key(&found, "views");
}

#[tokio::test]
async fn crud_round_trip_by_key() {
    let db = memory_database();
    db.collection(collections::users()).unwrap();
    let users = db.get_repository("users");

    let created = users
        .create(CreateOptions::new(json!({ "name": "Ada", "email": "ada@example.com" })))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let updated = users
        .update(UpdateOptions::new(json!({ "name": "Ada L." })).by_tk(id.as_str()))
        .await
        .unwrap();
    assert_eq!(updated["name"], json!("Ada L."));

    let found = users
        .find_by_tk(id.as_str(), FindOneOptions::new())
        .await
        .unwrap();
    assert_eq!(found.unwrap()["email"], json!("ada@example.com"));

    users
        .destroy(DestroyOptions::new().by_tk(id.as_str()))
        .await
        .unwrap();
    assert!(!users.exists(None).await.unwrap());
}

#[tokio::test]
async fn bulk_operations_report_counts() {
    let (db, store) = common::seeded_database().await;
    let posts = db.get_repository("posts");

    let drafts = FilterCondition::new().equals("status", "draft");
    let updated = posts
        .update_many(UpdateOptions::new(json!({ "status": "archived" })).filter(drafts))
        .await
        .unwrap();
    assert_eq!(updated.count, 1);

    let created = posts
        .create_many(vec![json!({ "title": "a" }), json!({ "title": "b" })])
        .await
        .unwrap();
    assert_eq!(created.count, 2);
    assert_eq!(store.row_count("posts"), 5);

    let removed = posts
        .destroy_many(DestroyOptions::new().filter(
            FilterCondition::new().field("views", FieldOperators::new().is_null(true)),
        ))
        .await
        .unwrap();
    assert_eq!(removed.count, 2);
    assert_eq!(posts.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn missing_delegate_is_schema_error() {
    let db = Database::new(Arc::new(MemoryStore::new()));

    let err = db
        .get_repository("ghosts")
        .find(FindOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DbError::Schema(SchemaError::MissingDelegate(ref name)) if name == "ghosts"
    ));
}

#[tokio::test]
async fn mutations_emit_before_and_after_events() {
    let db = memory_database();
    db.collection(collections::posts()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));

    for event in ["beforeCreate", "afterCreate", "beforeUpdate", "afterUpdate"] {
        let seen = Arc::clone(&seen);
        let label = event.to_string();
        db.on(
            format!("posts.{event}"),
            handler_fn(move |payload: Value| {
                let seen = Arc::clone(&seen);
                let label = label.clone();
                async move {
                    seen.lock().push(format!("{label}:{}", payload["title"]));
                    anyhow::Ok(())
                }
            }),
        );
    }

    let posts = db.get_repository("posts");
    let created = posts
        .create(CreateOptions::new(json!({ "title": "first" })))
        .await
        .unwrap();
    posts
        .update(
            UpdateOptions::new(json!({ "title": "second" }))
                .by_tk(created["id"].as_str().unwrap()),
        )
        .await
        .unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen[0], "beforeCreate:\"first\"");
    assert_eq!(seen[1], "afterCreate:\"first\"");
    assert!(seen[2].starts_with("beforeUpdate:"));
    assert_eq!(seen[3], "afterUpdate:\"second\"");
}

#[tokio::test]
async fn before_handler_failure_prevents_mutation() {
    let (db, store) = common::seeded_database().await;
    db.on(
        "posts.beforeCreate",
        handler_fn(|_| async { Err::<(), _>(anyhow::anyhow!("rejected")) }),
    );

    let err = db
        .get_repository("posts")
        .create(CreateOptions::new(json!({ "title": "blocked" })))
        .await
        .unwrap_err();

    assert!(err.is_event_error());
    assert_eq!(store.row_count("posts"), 3);
}

#[tokio::test]
async fn after_handler_failure_keeps_mutation() {
    let (db, store) = common::seeded_database().await;
    db.on(
        "posts.afterDestroy",
        handler_fn(|_| async { Err::<(), _>(anyhow::anyhow!("audit offline")) }),
    );

    let err = db
        .get_repository("posts")
        .destroy(DestroyOptions::new().filter(FilterCondition::new().equals("status", "draft")))
        .await
        .unwrap_err();

    assert!(err.is_event_error());
    assert_eq!(store.row_count("posts"), 2);
}

#[tokio::test]
async fn handler_errors_abort_later_handlers() {
    let db = memory_database();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&calls);
    db.on(
        "custom.ping",
        handler_fn(move |_| {
            let first = Arc::clone(&first);
            async move {
                first.lock().push(1);
                Err::<(), _>(anyhow::anyhow!("stop"))
            }
        }),
    );
    let second = Arc::clone(&calls);
    db.on(
        "custom.ping",
        handler_fn(move |_| {
            let second = Arc::clone(&second);
            async move {
                second.lock().push(2);
                anyhow::Ok(())
            }
        }),
    );

    let err = db.emit("custom.ping", json!({})).await.unwrap_err();
    assert_eq!(err.event, "custom.ping");
    assert_eq!(*calls.lock(), vec![1]);
}

#[tokio::test]
async fn off_removes_only_that_handler() {
    let db = memory_database();
    let handler = handler_fn(|_| async { anyhow::Ok(()) });
    let other = handler_fn(|_| async { anyhow::Ok(()) });
    db.on("posts.afterCreate", Arc::clone(&handler));
    db.on("posts.afterCreate", Arc::clone(&other));

    assert!(db.off("posts.afterCreate", &handler));
    assert!(!db.off("posts.afterCreate", &handler));
    assert_eq!(db.get_status().event_handlers["posts.afterCreate"], 1);
}

#[tokio::test]
async fn transaction_commits_on_success() {
    let (db, store) = common::seeded_database().await;

    let created = db
        .transaction(|tx| async move {
            let posts = tx.repository("posts");
            posts
                .create(CreateOptions::new(json!({ "title": "in tx" })))
                .await?;
            posts.count(None).await
        })
        .await
        .unwrap();

    assert_eq!(created, 4);
    assert_eq!(store.row_count("posts"), 4);
}

#[tokio::test]
async fn transaction_rolls_back_on_error() {
    let (db, store) = common::seeded_database().await;

    let result: DbResult<()> = db
        .transaction(|tx| async move {
            tx.repository("posts")
                .create(CreateOptions::new(json!({ "title": "doomed" })))
                .await?;
            Err(DbError::from(SchemaError::UnknownCollection(
                "abort".into(),
            )))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(store.row_count("posts"), 3);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    email: Option<String>,
}

impl Model for User {
    const COLLECTION: &'static str = "users";
}

#[tokio::test]
async fn typed_repository_decodes_rows() {
    let db = memory_database();
    db.collection(collections::users()).unwrap();
    let users = db.repository::<User>().unwrap();

    let created = users
        .create(&User {
            id: None,
            name: "Grace".into(),
            email: None,
        })
        .await
        .unwrap();
    assert!(created.id.is_some());

    let found = users
        .find_by_tk(created.id.clone().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, created);

    #[derive(Serialize, Deserialize)]
    struct Orphan {}
    impl Model for Orphan {
        const COLLECTION: &'static str = "orphans";
    }
    assert!(matches!(
        db.repository::<Orphan>(),
        Err(DbError::Schema(SchemaError::UnknownCollection(_)))
    ));
}

struct PublishedPosts {
    base: Repository,
}

#[async_trait]
impl CollectionRepository for PublishedPosts {
    fn base(&self) -> &Repository {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn find(&self, options: FindOptions) -> DbResult<Vec<Value>> {
        let published = FilterCondition::new().equals("status", "published");
        let filter = match options.filter.clone() {
            Some(filter) => FilterCondition::new().and(vec![filter, published]),
            None => published,
        };
        self.base.find(options.filter(filter)).await
    }

    async fn find_one(&self, options: FindOneOptions) -> DbResult<Option<Value>> {
        let found = self.base.find_one(options).await?;
        Ok(found.filter(|post| post["status"] == json!("published")))
    }
}

#[tokio::test]
async fn custom_repository_replaces_cached_instance() {
    let (db, _store) = common::seeded_database().await;

    let generic = db.get_repository("posts");
    assert!(Arc::ptr_eq(&generic, &db.get_repository("posts")));
    assert_eq!(generic.find(FindOptions::new()).await.unwrap().len(), 3);

    db.register_repository("posts", |base| PublishedPosts { base });

    let custom = db.get_repository("posts");
    assert!(!Arc::ptr_eq(&generic, &custom));
    assert!(Arc::ptr_eq(&custom, &db.get_repository("posts")));
    assert!(custom.downcast_ref::<PublishedPosts>().is_some());
    assert_eq!(custom.find(FindOptions::new()).await.unwrap().len(), 2);
    assert_eq!(custom.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn key_lookup_goes_through_custom_repository() {
    let (db, _store) = common::seeded_database().await;
    let draft = db
        .get_repository("posts")
        .find_one(FindOneOptions::new().filter(FilterCondition::new().equals("status", "draft")))
        .await
        .unwrap()
        .unwrap();
    let draft_id = draft["id"].as_str().unwrap().to_string();

    db.register_repository("posts", |base| PublishedPosts { base });
    let custom = db.get_repository("posts");

    let hidden = custom
        .find_by_tk(draft_id.as_str(), FindOneOptions::new())
        .await
        .unwrap();
    assert!(hidden.is_none());
    assert!(custom.exists(None).await.unwrap());
}

#[tokio::test]
async fn status_reports_registry_contents() {
    let (db, _store) = common::seeded_database().await;
    db.on("posts.afterCreate", handler_fn(|_| async { anyhow::Ok(()) }));

    let status = db.get_status();
    assert_eq!(status.collections, vec!["users", "posts"]);
    assert_eq!(status.repositories, vec!["posts"]);
    assert_eq!(status.event_handlers["posts.afterCreate"], 1);
}

#[tokio::test]
async fn create_emits_one_event_per_phase() {
    let db = memory_database();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for event in ["widgets.beforeCreate", "widgets.afterCreate"] {
        let seen = Arc::clone(&seen);
        db.on(
            event,
            handler_fn(move |payload: Value| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push((event, payload));
                    anyhow::Ok(())
                }
            }),
        );
    }

    let created = db
        .get_repository("widgets")
        .create(CreateOptions::new(json!({ "size": 3 })))
        .await
        .unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("widgets.beforeCreate", json!({ "size": 3 })));
    assert_eq!(seen[1], ("widgets.afterCreate", created));
}
