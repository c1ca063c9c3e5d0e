mod common;

use common::{attr, client, entity, fields, schema_input, unique};
use eav_registry::db;
use eav_registry::error::{AppError, ErrorKind};
use eav_registry::models::{IdOrSlug, SchemaUpdate, SELF_BINDING};
use eav_registry::registry::AttrKind;
use eav_registry::store;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn schema_round_trips_definitions() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let slug = unique("people");
    let mut age = attr("age", AttrKind::Int);
    age.required = true;
    let mut tags = attr("tags", AttrKind::Str);
    tags.list = true;
    let input = schema_input(&slug, false, vec![age, tags, attr("born", AttrKind::Date)]);

    let created = store::create_schema(&tx, &input).await.unwrap();
    let fetched = store::get_schema(&tx, &IdOrSlug::from(slug.as_str()))
        .await
        .unwrap();

    assert_eq!(fetched.schema.name, slug);
    assert_eq!(fetched.schema.slug, slug);
    let mut got: Vec<_> = fetched
        .attributes
        .iter()
        .map(|d| (d.name.clone(), d.kind, d.required, d.list))
        .collect();
    got.sort();
    let mut want: Vec<_> = input
        .attributes
        .iter()
        .map(|d| (d.name.clone(), d.kind, d.required, d.list))
        .collect();
    want.sort();
    assert_eq!(got, want);
    assert_eq!(created.attributes.len(), fetched.attributes.len());
}

#[tokio::test]
async fn duplicate_schema_slug_conflicts() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let slug = unique("dupe");
    store::create_schema(&tx, &schema_input(&slug, false, vec![]))
        .await
        .unwrap();
    let err = store::create_schema(&tx, &schema_input(&slug, false, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SchemaExists { .. }));
}

#[tokio::test]
async fn entity_round_trip_and_required_fields() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let slug = unique("pets");
    let mut age = attr("age", AttrKind::Int);
    age.required = true;
    let schema = store::create_schema(
        &tx,
        &schema_input(&slug, false, vec![age, attr("nickname", AttrKind::Str)]),
    )
    .await
    .unwrap();
    let schema_id = schema.schema.id;

    let created = store::create_entity(
        &tx,
        schema_id,
        &entity("rex", json!({"age": 4, "nickname": "rexy"})),
    )
    .await
    .unwrap();
    let fetched = store::get_entity(&tx, &IdOrSlug::Id(schema_id), &IdOrSlug::from("rex"))
        .await
        .unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.field("age"), json!(4));
    assert_eq!(fetched.field("nickname"), json!("rexy"));

    let err = store::create_entity(&tx, schema_id, &entity("fido", json!({"nickname": "f"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RequiredField(ref f) if f == "age"));

    let err = store::update_entity(&tx, schema_id, created.id, &fields(json!({"age": null})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RequiredField(_)));
}

#[tokio::test]
async fn reserved_names_are_rejected() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let err = store::create_schema(
        &tx,
        &schema_input(&unique("bad"), false, vec![attr("slug", AttrKind::Str)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ReservedName { .. }));

    let err = store::create_schema(
        &tx,
        &schema_input(&unique("bad"), false, vec![attr("limit", AttrKind::Int)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ReservedName { ref name, .. } if name == "limit"));
}

#[tokio::test]
async fn scalar_attribute_rejects_list() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let schema = store::create_schema(
        &tx,
        &schema_input(&unique("scalars"), false, vec![attr("age", AttrKind::Int)]),
    )
    .await
    .unwrap();
    let err = store::create_entity(&tx, schema.schema.id, &entity("a", json!({"age": [1, 2]})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotListed { .. }));
}

#[tokio::test]
async fn unique_check_skips_deleted_entities() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let mut email = attr("email", AttrKind::Str);
    email.unique = true;
    let schema = store::create_schema(&tx, &schema_input(&unique("users"), false, vec![email]))
        .await
        .unwrap();
    let schema_id = schema.schema.id;

    let first = store::create_entity(&tx, schema_id, &entity("first", json!({"email": "a@x"})))
        .await
        .unwrap();
    store::delete_entity(&tx, schema_id, first.id).await.unwrap();

    store::create_entity(&tx, schema_id, &entity("second", json!({"email": "a@x"})))
        .await
        .unwrap();

    store::restore_entity(&tx, schema_id, first.id).await.unwrap();
    let err = store::create_entity(&tx, schema_id, &entity("third", json!({"email": "a@x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UniqueValue { .. }));
}

#[tokio::test]
async fn foreign_keys_must_match_bound_schema() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let other = store::create_schema(&tx, &schema_input(&unique("other"), false, vec![]))
        .await
        .unwrap();
    let stranger = store::create_entity(&tx, other.schema.id, &entity("stranger", json!({})))
        .await
        .unwrap();

    let mut friend = attr("friend", AttrKind::Fk);
    friend.bound_schema_id = Some(SELF_BINDING);
    let schema = store::create_schema(&tx, &schema_input(&unique("mates"), false, vec![friend]))
        .await
        .unwrap();
    let schema_id = schema.schema.id;
    let pal = store::create_entity(&tx, schema_id, &entity("pal", json!({})))
        .await
        .unwrap();

    store::create_entity(&tx, schema_id, &entity("bob", json!({"friend": pal.id})))
        .await
        .unwrap();
    let err = store::create_entity(&tx, schema_id, &entity("eve", json!({"friend": stranger.id})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WrongSchemaBinding { .. }));
}

#[tokio::test]
async fn listed_definition_cannot_become_unlisted() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let mut tags = attr("tags", AttrKind::Str);
    tags.list = true;
    let schema = store::create_schema(&tx, &schema_input(&unique("tagged"), false, vec![tags]))
        .await
        .unwrap();

    let mut attributes: Vec<_> = schema.attributes.iter().map(|d| d.to_input()).collect();
    attributes[0].list = false;
    let err = store::update_schema(
        &tx,
        schema.schema.id,
        &SchemaUpdate {
            attributes,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ListedToUnlisted(_)));
}

#[tokio::test]
async fn deleting_schema_hides_its_entities() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let slug = unique("gone");
    let schema = store::create_schema(&tx, &schema_input(&slug, false, vec![]))
        .await
        .unwrap();
    let thing = store::create_entity(&tx, schema.schema.id, &entity("thing", json!({})))
        .await
        .unwrap();

    store::delete_schema(&tx, schema.schema.id).await.unwrap();
    let err = store::live_schema(&tx, &IdOrSlug::from(slug.as_str()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingSchema(_)));
    assert!(store::get_schema(&tx, &IdOrSlug::from(slug.as_str()))
        .await
        .unwrap()
        .schema
        .deleted);
    assert!(store::entity_by_id(&tx, thing.id).await.unwrap().deleted);
}

#[tokio::test]
async fn overlong_names_are_validation_errors() {
    let Some(mut client) = client().await else { return };
    let tx = db::begin(&mut client).await.unwrap();

    let schema = store::create_schema(&tx, &schema_input(&unique("wordy"), false, vec![]))
        .await
        .unwrap();
    let mut data = entity("wordy", json!({}));
    data.insert("name".into(), json!("n".repeat(200)));
    let err = store::create_entity(&tx, schema.schema.id, &data)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // truncation reported by Postgres itself maps the same way
    tx.execute("CREATE TEMP TABLE short_text (v VARCHAR(3))", &[])
        .await
        .unwrap();
    let err: AppError = tx
        .execute("INSERT INTO short_text VALUES ('abcd')", &[])
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn racing_unique_writes_conflict() {
    let Some(mut setup) = client().await else { return };
    let Some(mut first) = client().await else { return };
    let Some(second) = client().await else { return };

    let mut email = attr("email", AttrKind::Str);
    email.unique = true;
    let tx = db::begin(&mut setup).await.unwrap();
    let schema = store::create_schema(&tx, &schema_input(&unique("racers"), false, vec![email]))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    let schema_id = schema.schema.id;
    let value = unique("mail");

    let tx1 = db::begin(&mut first).await.unwrap();
    store::create_entity(&tx1, schema_id, &entity("first", json!({"email": value.as_str()})))
        .await
        .unwrap();

    let racer = tokio::spawn({
        let value = value.clone();
        async move {
            let mut second = second;
            let tx2 = db::begin(&mut second).await?;
            let created =
                store::create_entity(&tx2, schema_id, &entity("second", json!({"email": value})))
                    .await?;
            tx2.commit().await?;
            Ok::<_, AppError>(created)
        }
    });

    // the second writer waits on the first transaction's value lock
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!racer.is_finished());
    tx1.commit().await.unwrap();

    let err = racer.await.unwrap().unwrap_err();
    assert!(matches!(err, AppError::UniqueValue { .. }));

    let tx = db::begin(&mut setup).await.unwrap();
    let live: i64 = tx
        .query_one(
            "SELECT count(*) FROM entities WHERE schema_id = $1 AND NOT deleted",
            &[&schema_id],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(live, 1);
    store::delete_schema(&tx, schema_id).await.unwrap();
    tx.commit().await.unwrap();
}
