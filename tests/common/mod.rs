//! Shared fixtures for database-backed tests
//!
//! Tests connect to `TEST_DATABASE_URL`, migrate, and work inside one
//! transaction that is dropped without commit. When the variable is unset the
//! tests return early.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use eav_registry::auth::{Actor, AllowAll, Role};
use eav_registry::config::ChangeConfig;
use eav_registry::context::{FixedClock, RequestContext};
use eav_registry::db;
use eav_registry::models::{AttrDefInput, EntityData, SchemaCreate};
use eav_registry::registry::AttrKind;
use serde_json::Value as Json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};

/// Connected and migrated client, or `None` when no test database is set
pub async fn client() -> Option<Client> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let (mut client, connection) = tokio_postgres::connect(&url, NoTls)
        .await
        .expect("connect to TEST_DATABASE_URL");
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("test connection error: {}", e);
        }
    });
    db::migrate(&mut client).await.expect("migrate");
    Some(client)
}

pub fn context() -> RequestContext {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    RequestContext::new(
        Actor::new("tester", Role::Admin),
        ChangeConfig::default(),
        Arc::new(AllowAll),
    )
    .with_clock(Arc::new(FixedClock(at)))
}

/// Admin context of another user, for reviewing requests `context()` staged
pub fn reviewer() -> RequestContext {
    let mut ctx = context();
    ctx.actor = Actor::new("reviewer", Role::Admin);
    ctx
}

pub fn strict_context() -> RequestContext {
    let mut ctx = context();
    ctx.config.strict_apply = true;
    ctx
}

/// Slug not used by any earlier run
pub fn unique(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-{}-{}", prefix, nanos, n)
}

pub fn attr(name: &str, kind: AttrKind) -> AttrDefInput {
    AttrDefInput {
        id: None,
        name: name.to_string(),
        kind,
        required: false,
        unique: false,
        list: false,
        key: false,
        description: None,
        bound_schema_id: None,
    }
}

pub fn schema_input(slug: &str, reviewable: bool, attributes: Vec<AttrDefInput>) -> SchemaCreate {
    SchemaCreate {
        name: slug.to_string(),
        slug: slug.to_string(),
        reviewable,
        attributes,
    }
}

/// `{"name": slug, "slug": slug, ...fields}`
pub fn entity(slug: &str, fields: Json) -> EntityData {
    let mut data = EntityData::new();
    data.insert("name".into(), Json::from(slug));
    data.insert("slug".into(), Json::from(slug));
    if let Json::Object(fields) = fields {
        data.extend(fields);
    }
    data
}

pub fn fields(value: Json) -> EntityData {
    match value {
        Json::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}
