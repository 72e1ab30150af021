#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Shared fixtures for kernel integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use tessera_kernel::db::{CreateOptions, Database, MemoryStore};
use tessera_test_utils::{collections, memory_database_with_store};

/// Database with `users` and `posts` registered and three posts seeded.
pub async fn seeded_database() -> (Arc<Database>, MemoryStore) {
    let (db, store) = memory_database_with_store();
    db.collection(collections::users()).unwrap();
    db.collection(collections::posts()).unwrap();

    let posts = db.get_repository("posts");
    for post in sample_posts() {
        posts.create(CreateOptions::new(post)).await.unwrap();
    }
    (db, store)
}

pub fn sample_posts() -> Vec<Value> {
    vec![
        json!({ "title": "Hello World", "status": "published", "views": 10 }),
        json!({ "title": "Draft notes", "status": "draft", "views": 0 }),
        json!({ "title": "hello again", "status": "published", "views": 42 }),
    ]
}
