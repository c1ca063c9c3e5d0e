mod common;

use common::{attr, client, entity, schema_input, unique};
use eav_registry::config::QueryConfig;
use eav_registry::db;
use eav_registry::error::AppError;
use eav_registry::models::IdOrSlug;
use eav_registry::query::{list_entities, EntityQuery};
use eav_registry::registry::AttrKind;
use eav_registry::store;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_postgres::Transaction;

fn query(pairs: &[(&str, &str)]) -> EntityQuery {
    let params = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EntityQuery::from_params(params, &QueryConfig::default()).unwrap()
}

/// Schema with entities `ten` (age 10) and `twelve` (age 12)
async fn ages(tx: &Transaction<'_>) -> IdOrSlug {
    let slug = unique("ages");
    let mut age = attr("age", AttrKind::Int);
    age.key = true;
    let schema = store::create_schema(
        tx,
        &schema_input(&slug, false, vec![age, attr("note", AttrKind::Str)]),
    )
    .await
    .unwrap();
    let id = schema.schema.id;
    store::create_entity(tx, id, &entity("ten", json!({"age": 10, "note": "x"})))
        .await
        .unwrap();
    store::create_entity(tx, id, &entity("twelve", json!({"age": 12, "note": "y"})))
        .await
        .unwrap();
    IdOrSlug::from(slug.as_str())
}

fn slugs(page: &eav_registry::models::EntityPage) -> Vec<&str> {
    page.entities.iter().map(|e| e.slug.as_str()).collect()
}

#[tokio::test]
async fn greater_than_filter() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();
    let schema = ages(&tx).await;

    let page = list_entities(&tx, &schema, &query(&[("age.gt", "10")]))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(slugs(&page), vec!["twelve"]);
}

#[tokio::test]
async fn filter_terms_intersect() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();
    let schema = ages(&tx).await;

    let page = list_entities(&tx, &schema, &query(&[("age.gt", "9"), ("age.ne", "10")]))
        .await
        .unwrap();
    assert_eq!(slugs(&page), vec!["twelve"]);

    let page = list_entities(&tx, &schema, &query(&[("age", "10"), ("note", "y")]))
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn name_filter_and_ordering() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();
    let schema = ages(&tx).await;

    let page = list_entities(&tx, &schema, &query(&[("name.starts", "tw")]))
        .await
        .unwrap();
    assert_eq!(slugs(&page), vec!["twelve"]);

    let page = list_entities(
        &tx,
        &schema,
        &query(&[("order_by", "age"), ("ascending", "false")]),
    )
    .await
    .unwrap();
    assert_eq!(slugs(&page), vec!["twelve", "ten"]);
}

#[tokio::test]
async fn only_key_fields_by_default() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();
    let schema = ages(&tx).await;

    let page = list_entities(&tx, &schema, &query(&[])).await.unwrap();
    assert_eq!(page.total, 2);
    assert!(page.entities.iter().all(|e| !e.fields.contains_key("note")));
    assert!(page.entities.iter().all(|e| e.fields.contains_key("age")));

    let page = list_entities(&tx, &schema, &query(&[("all_fields", "true")]))
        .await
        .unwrap();
    assert!(page.entities.iter().all(|e| e.fields.contains_key("note")));
}

#[tokio::test]
async fn paging_keeps_total() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();
    let schema = ages(&tx).await;

    let page = list_entities(
        &tx,
        &schema,
        &query(&[("limit", "1"), ("offset", "1"), ("order_by", "name")]),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(slugs(&page), vec!["twelve"]);
}

#[tokio::test]
async fn rejects_bad_operator_and_attribute() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();
    let schema = ages(&tx).await;

    let err = list_entities(&tx, &schema, &query(&[("age.contains", "1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFilterOperator { .. }));

    let err = list_entities(&tx, &schema, &query(&[("height.gt", "1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFilterAttribute { .. }));
}
