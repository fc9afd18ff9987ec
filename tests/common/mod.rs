#![allow(dead_code)]

use bitebattle_core::{Notifications, Services, Store};
use uuid::Uuid;

pub async fn setup() -> (Store, Services) {
    let store = Store::in_memory().await.expect("in-memory store");
    let services = Services::new(store.clone(), Notifications::disabled());
    (store, services)
}

pub fn user() -> Uuid {
    Uuid::new_v4()
}

pub async fn count(store: &Store, sql: &str, id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .bind(id)
        .fetch_one(store.pool())
        .await
        .expect("count query")
}
