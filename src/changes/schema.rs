//! Schema change requests
//!
//! Schema-level fields are stored as SCHEMA rows; every field of a touched
//! attribute definition is stored as an ATTRIBUTE_DEFINITION row carrying the
//! attribute id and, once it exists, the definition id.

use super::models::{
    Change, ChangeRequest, ChangeStatus, ChangeType, ContentType, NewChange, ObjectType, Submitted,
};
use super::{scalar_flag, scalar_id, scalar_text, store as requests};
use crate::auth::{PermissionKind, Target};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::models::{AttrDef, AttrDefInput, IdOrSlug, Schema, SchemaCreate, SchemaDetail, SchemaUpdate};
use crate::registry::{AttrKind, Scalar};
use crate::store;
use crate::store::validation::classify_attributes;
use serde_json::Value as Json;
use tokio_postgres::Transaction;
use tracing::{info, warn};

/// Tracked fields of a definition with their stored kind and value
pub(crate) fn def_values(input: &AttrDefInput) -> [(&'static str, AttrKind, Option<Scalar>); 8] {
    [
        ("name", AttrKind::Str, Some(Scalar::Str(input.name.clone()))),
        (
            "kind",
            AttrKind::Str,
            Some(Scalar::Str(input.kind.as_str().to_string())),
        ),
        ("required", AttrKind::Bool, Some(Scalar::Bool(input.required))),
        ("unique", AttrKind::Bool, Some(Scalar::Bool(input.unique))),
        ("list", AttrKind::Bool, Some(Scalar::Bool(input.list))),
        ("key", AttrKind::Bool, Some(Scalar::Bool(input.key))),
        (
            "description",
            AttrKind::Str,
            input.description.clone().map(Scalar::Str),
        ),
        (
            "bound_schema_id",
            AttrKind::Int,
            input.bound_schema_id.map(|id| Scalar::Int(id.into())),
        ),
    ]
}

/// Current value of one tracked definition field
pub(crate) fn def_field(def: &AttrDef, field: &str) -> Json {
    def_values(&def.to_input())
        .into_iter()
        .find(|(name, _, _)| *name == field)
        .and_then(|(_, _, value)| value)
        .map_or(Json::Null, |v| v.to_json())
}

fn set_def_value(
    input: &mut AttrDefInput,
    field: &str,
    value: Option<&Scalar>,
) -> Result<(), AppError> {
    let bad = || AppError::Internal(format!("unexpected value for definition field `{}`", field));
    match field {
        "name" => input.name = scalar_text(value).ok_or_else(bad)?,
        "kind" => {
            input.kind = scalar_text(value)
                .ok_or_else(bad)?
                .parse()
                .map_err(AppError::Internal)?
        }
        "required" => input.required = scalar_flag(value).ok_or_else(bad)?,
        "unique" => input.unique = scalar_flag(value).ok_or_else(bad)?,
        "list" => input.list = scalar_flag(value).ok_or_else(bad)?,
        "key" => input.key = scalar_flag(value).ok_or_else(bad)?,
        "description" => input.description = scalar_text(value),
        "bound_schema_id" => input.bound_schema_id = scalar_id(value),
        _ => return Err(bad()),
    }
    Ok(())
}

fn blank_definition() -> AttrDefInput {
    AttrDefInput {
        id: None,
        name: String::new(),
        kind: AttrKind::Str,
        required: false,
        unique: false,
        list: false,
        key: false,
        description: None,
        bound_schema_id: None,
    }
}

/// Rows for one definition; with `before`, only the fields that differ
fn def_rows(
    before: Option<&AttrDefInput>,
    after: &AttrDefInput,
    change_type: ChangeType,
    object_id: Option<i32>,
    attribute_id: i32,
) -> Vec<NewChange> {
    let old = before.map(def_values);
    def_values(after)
        .into_iter()
        .enumerate()
        .filter_map(|(i, (field, kind, new))| {
            let previous = old.as_ref().and_then(|o| o[i].2.clone());
            if old.is_some() && previous == new {
                return None;
            }
            Some(NewChange {
                object_id,
                attribute_id: Some(attribute_id),
                field_name: Some(field),
                content_type: ContentType::AttributeDefinition,
                change_type,
                kind,
                old: previous,
                new,
            })
        })
        .collect()
}

fn schema_field(
    change_type: ChangeType,
    field: &'static str,
    old: Option<Scalar>,
    new: Scalar,
) -> NewChange {
    let kind = new.kind();
    NewChange::field(ContentType::Schema, change_type, field, kind, old, Some(new))
}

/// Changed schema-level fields of an update
fn field_rows(schema: &Schema, data: &SchemaUpdate) -> Vec<NewChange> {
    let mut rows = Vec::new();
    if let Some(name) = data.name.as_ref().filter(|n| **n != schema.name) {
        rows.push(schema_field(
            ChangeType::Update,
            "name",
            Some(Scalar::Str(schema.name.clone())),
            Scalar::Str(name.clone()),
        ));
    }
    if let Some(slug) = data.slug.as_ref().filter(|s| **s != schema.slug) {
        rows.push(schema_field(
            ChangeType::Update,
            "slug",
            Some(Scalar::Str(schema.slug.clone())),
            Scalar::Str(slug.clone()),
        ));
    }
    if let Some(reviewable) = data.reviewable.filter(|r| *r != schema.reviewable) {
        rows.push(schema_field(
            ChangeType::Update,
            "reviewable",
            Some(Scalar::Bool(schema.reviewable)),
            Scalar::Bool(reviewable),
        ));
    }
    rows
}

/// Rebuild a schema creation from its rows, definitions in staging order
fn rebuild_create(changes: &[Change]) -> Result<SchemaCreate, AppError> {
    let missing = |field: &str| AppError::Internal(format!("create request lacks `{}`", field));
    let field = |name: &str| changes.iter().find(|c| c.is_field(name) && c.content_type == ContentType::Schema);

    let name = field("name").and_then(|c| scalar_text(c.new.as_ref())).ok_or_else(|| missing("name"))?;
    let slug = field("slug").and_then(|c| scalar_text(c.new.as_ref())).ok_or_else(|| missing("slug"))?;
    let reviewable = field("reviewable")
        .and_then(|c| scalar_flag(c.new.as_ref()))
        .unwrap_or(false);

    let mut attributes: Vec<(i32, AttrDefInput)> = Vec::new();
    for change in changes
        .iter()
        .filter(|c| c.content_type == ContentType::AttributeDefinition)
    {
        let (Some(attribute_id), Some(field)) = (change.attribute_id, change.field_name.as_deref())
        else {
            continue;
        };
        let slot = match attributes.iter().position(|(id, _)| *id == attribute_id) {
            Some(i) => i,
            None => {
                attributes.push((attribute_id, blank_definition()));
                attributes.len() - 1
            }
        };
        set_def_value(&mut attributes[slot].1, field, change.new.as_ref())?;
    }

    Ok(SchemaCreate {
        name,
        slug,
        reviewable,
        attributes: attributes.into_iter().map(|(_, input)| input).collect(),
    })
}

/// Rebuild a complete schema update by replaying the rows over the live definitions
fn rebuild_update(changes: &[Change], live: &[AttrDef]) -> Result<SchemaUpdate, AppError> {
    let mut update = SchemaUpdate {
        attributes: live.iter().map(AttrDef::to_input).collect(),
        ..SchemaUpdate::default()
    };
    let mut created: Vec<(i32, AttrDefInput)> = Vec::new();

    for change in changes {
        let Some(field) = change.field_name.as_deref() else {
            continue;
        };
        match (change.content_type, change.change_type) {
            (ContentType::Schema, _) => match field {
                "name" => update.name = scalar_text(change.new.as_ref()),
                "slug" => update.slug = scalar_text(change.new.as_ref()),
                "reviewable" => update.reviewable = scalar_flag(change.new.as_ref()),
                _ => {}
            },
            (ContentType::AttributeDefinition, ChangeType::Delete) => {
                update.attributes.retain(|a| a.id != change.object_id);
            }
            (ContentType::AttributeDefinition, ChangeType::Update) => {
                let target = update
                    .attributes
                    .iter_mut()
                    .find(|a| a.id == change.object_id)
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "definition {:?} is no longer defined",
                            change.object_id
                        ))
                    })?;
                set_def_value(target, field, change.new.as_ref())?;
            }
            (ContentType::AttributeDefinition, _) => {
                let Some(attribute_id) = change.attribute_id else {
                    continue;
                };
                let slot = match created.iter().position(|(id, _)| *id == attribute_id) {
                    Some(i) => i,
                    None => {
                        created.push((attribute_id, blank_definition()));
                        created.len() - 1
                    }
                };
                set_def_value(&mut created[slot].1, field, change.new.as_ref())?;
            }
            (ContentType::Entity, _) => {}
        }
    }

    update
        .attributes
        .extend(created.into_iter().map(|(_, input)| input));
    Ok(update)
}

/// First field whose staged old value no longer matches the live schema
fn stale_field(changes: &[Change], schema: &Schema, live: &[AttrDef]) -> Option<String> {
    for change in changes.iter().filter(|c| c.change_type == ChangeType::Update) {
        let Some(field) = change.field_name.as_deref() else {
            continue;
        };
        let old = change.old.as_ref().map_or(Json::Null, Scalar::to_json);
        let current = match change.content_type {
            ContentType::Schema => match field {
                "name" => Json::from(schema.name.clone()),
                "slug" => Json::from(schema.slug.clone()),
                "reviewable" => Json::from(schema.reviewable),
                _ => continue,
            },
            ContentType::AttributeDefinition => {
                match live.iter().find(|d| Some(d.id) == change.object_id) {
                    Some(def) => def_field(def, field),
                    None => return Some(field.to_string()),
                }
            }
            ContentType::Entity => continue,
        };
        if old != current {
            return Some(field.to_string());
        }
    }
    None
}

/// Fail with `AttributeNotDefined` when a row targets a definition that is gone
async fn check_targets(
    tx: &Transaction<'_>,
    schema_id: i32,
    changes: &[Change],
    live: &[AttrDef],
) -> Result<(), AppError> {
    for change in changes.iter().filter(|c| {
        c.content_type == ContentType::AttributeDefinition && c.change_type == ChangeType::Update
    }) {
        if live.iter().any(|d| Some(d.id) == change.object_id) {
            continue;
        }
        let attr = match change.attribute_id {
            Some(id) => store::get_attribute(tx, id).await?.name,
            None => format!("{:?}", change.object_id),
        };
        return Err(AppError::AttributeNotDefined { attr, schema_id });
    }
    Ok(())
}

// ---- staging ----

pub async fn stage_create(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    data: &SchemaCreate,
) -> Result<ChangeRequest, AppError> {
    ctx.authorize(PermissionKind::CreateSchema, None)?;
    dry_run!(tx, |sp| store::create_schema(&sp, data))?;

    let mut rows = vec![
        schema_field(ChangeType::Create, "name", None, Scalar::Str(data.name.clone())),
        schema_field(ChangeType::Create, "slug", None, Scalar::Str(data.slug.clone())),
        schema_field(ChangeType::Create, "reviewable", None, Scalar::Bool(data.reviewable)),
    ];
    for input in &data.attributes {
        let attribute = store::get_or_create_attribute(tx, &input.name, input.kind).await?;
        rows.extend(def_rows(None, input, ChangeType::Create, None, attribute.id));
    }

    let request =
        requests::insert_request(tx, ctx, ObjectType::Schema, ChangeType::Create, None).await?;
    requests::insert_changes(tx, request.id, &rows).await?;
    info!(request_id = request.id, slug = %data.slug, "schema create staged");
    Ok(request)
}

pub async fn stage_update(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &Schema,
    data: &SchemaUpdate,
) -> Result<ChangeRequest, AppError> {
    ctx.authorize(PermissionKind::UpdateSchema, Some(Target::Schema(schema.id)))?;
    dry_run!(tx, |sp| store::update_schema(&sp, schema.id, data))?;

    let existing = store::definitions(tx, schema.id).await?;
    let diff = classify_attributes(schema.id, &existing, &data.attributes)?;

    let mut rows = field_rows(schema, data);
    for def in &diff.deleted {
        rows.push(NewChange {
            object_id: Some(def.id),
            attribute_id: Some(def.attribute_id),
            field_name: Some("deleted"),
            content_type: ContentType::AttributeDefinition,
            change_type: ChangeType::Delete,
            kind: AttrKind::Bool,
            old: Some(Scalar::Bool(false)),
            new: Some(Scalar::Bool(true)),
        });
    }
    for (current, wanted) in &diff.updated {
        rows.extend(def_rows(
            Some(&current.to_input()),
            wanted,
            ChangeType::Update,
            Some(current.id),
            current.attribute_id,
        ));
    }
    for input in &diff.added {
        let input = input.normalized(schema.id);
        let attribute = store::get_or_create_attribute(tx, &input.name, input.kind).await?;
        rows.extend(def_rows(None, &input, ChangeType::Create, None, attribute.id));
    }

    let rows: Vec<NewChange> = rows
        .into_iter()
        .map(|r| match r.content_type {
            ContentType::Schema => r.on(Some(schema.id)),
            _ => r,
        })
        .collect();
    if rows.is_empty() {
        return Err(AppError::NoOpChange(format!(
            "schema ({}) already matches the submitted definition",
            schema.id
        )));
    }

    let request = requests::insert_request(
        tx,
        ctx,
        ObjectType::Schema,
        ChangeType::Update,
        Some(schema.id),
    )
    .await?;
    requests::insert_changes(tx, request.id, &rows).await?;
    info!(request_id = request.id, schema_id = schema.id, changes = rows.len(), "schema update staged");
    Ok(request)
}

/// Stage a DELETE or RESTORE of `schema`
pub async fn stage_flag(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &Schema,
    change_type: ChangeType,
) -> Result<ChangeRequest, AppError> {
    ctx.authorize(PermissionKind::DeleteSchema, Some(Target::Schema(schema.id)))?;
    match change_type {
        ChangeType::Delete if schema.deleted => {
            return Err(AppError::NoOpChange(format!(
                "schema ({}) is already deleted",
                schema.id
            )))
        }
        ChangeType::Restore if !schema.deleted => {
            return Err(AppError::NoOpChange(format!(
                "schema ({}) is not deleted",
                schema.id
            )))
        }
        ChangeType::Delete => {
            dry_run!(tx, |sp| store::delete_schema(&sp, schema.id))?;
        }
        ChangeType::Restore => {
            dry_run!(tx, |sp| store::restore_schema(&sp, schema.id))?;
        }
        other => {
            return Err(AppError::Internal(format!(
                "{} is not a deleted-flag change",
                other
            )))
        }
    }

    let deleted = change_type == ChangeType::Delete;
    let row = schema_field(change_type, "deleted", Some(Scalar::Bool(!deleted)), Scalar::Bool(deleted))
        .on(Some(schema.id));
    let request =
        requests::insert_request(tx, ctx, ObjectType::Schema, change_type, Some(schema.id)).await?;
    requests::insert_changes(tx, request.id, &[row]).await?;
    info!(request_id = request.id, schema_id = schema.id, change = %change_type, "schema change staged");
    Ok(request)
}

// ---- applying ----

async fn apply_changes(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    request: &ChangeRequest,
    changes: &[Change],
) -> Result<SchemaDetail, AppError> {
    if request.change_type == ChangeType::Create {
        let data = rebuild_create(changes)?;
        let detail = store::create_schema(tx, &data).await?;
        requests::set_object_id(tx, request.id, ContentType::Schema, detail.schema.id).await?;
        requests::set_definition_ids(tx, request.id, detail.schema.id).await?;
        return Ok(detail);
    }

    let schema_id = request.object_id.ok_or_else(|| {
        AppError::Internal(format!("request {} has no target schema", request.id))
    })?;
    let key = IdOrSlug::Id(schema_id);
    match request.change_type {
        ChangeType::Delete => {
            store::delete_schema(tx, schema_id).await?;
        }
        ChangeType::Restore => {
            store::restore_schema(tx, schema_id).await?;
        }
        _ => {
            let schema = store::live_schema(tx, &key).await?;
            let live = store::definitions(tx, schema_id).await?;
            check_targets(tx, schema_id, changes, &live).await?;
            if ctx.config.strict_apply {
                if let Some(field) = stale_field(changes, &schema, &live) {
                    return Err(AppError::StaleChange { field });
                }
            }
            let data = rebuild_update(changes, &live)?;
            store::update_schema(tx, schema_id, &data).await?;
        }
    }
    store::get_schema(tx, &key).await
}

/// Apply a pending schema request and mark it approved
pub async fn apply(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    id: i32,
    change_type: ChangeType,
    comment: Option<&str>,
) -> Result<SchemaDetail, AppError> {
    let request = requests::load_pending(tx, id, ObjectType::Schema, change_type).await?;
    ctx.authorize(PermissionKind::UpdateSchema, request.object_id.map(Target::Schema))?;
    let changes = requests::load_changes(tx, id).await?;

    let detail = match apply_changes(tx, ctx, &request, &changes).await {
        Ok(detail) => detail,
        Err(e) => {
            warn!(request_id = id, change = %change_type, error = %e, "schema request failed to apply");
            return Err(e);
        }
    };
    requests::mark_reviewed(tx, ctx, id, ChangeStatus::Approved, comment).await?;
    info!(request_id = id, schema_id = detail.schema.id, change = %change_type, "schema request applied");
    Ok(detail)
}

// ---- submitting ----

async fn settle(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    reviewable: bool,
    request: ChangeRequest,
) -> Result<Submitted<SchemaDetail>, AppError> {
    if reviewable {
        return Ok(Submitted::Pending(request));
    }
    let comment = Some(ctx.config.autosubmit_comment.as_str());
    let detail = apply(tx, ctx, request.id, request.change_type, comment).await?;
    Ok(Submitted::Applied(detail))
}

/// New schemas have nobody to review them, so creation is always applied
pub async fn create(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    data: &SchemaCreate,
) -> Result<SchemaDetail, AppError> {
    let request = stage_create(tx, ctx, data).await?;
    let comment = Some(ctx.config.autosubmit_comment.as_str());
    apply(tx, ctx, request.id, ChangeType::Create, comment).await
}

pub async fn update(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    key: &IdOrSlug,
    data: &SchemaUpdate,
) -> Result<Submitted<SchemaDetail>, AppError> {
    let schema = store::live_schema(tx, key).await?;
    let request = stage_update(tx, ctx, &schema, data).await?;
    settle(tx, ctx, schema.reviewable, request).await
}

pub async fn delete(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    key: &IdOrSlug,
) -> Result<Submitted<SchemaDetail>, AppError> {
    let schema = store::find_schema(tx, key).await?;
    let request = stage_flag(tx, ctx, &schema, ChangeType::Delete).await?;
    settle(tx, ctx, schema.reviewable, request).await
}

pub async fn restore(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    key: &IdOrSlug,
) -> Result<Submitted<SchemaDetail>, AppError> {
    let schema = store::find_schema(tx, key).await?;
    let request = stage_flag(tx, ctx, &schema, ChangeType::Restore).await?;
    settle(tx, ctx, schema.reviewable, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input(name: &str, kind: AttrKind) -> AttrDefInput {
        AttrDefInput {
            name: name.into(),
            kind,
            ..blank_definition()
        }
    }

    fn live(id: i32, name: &str, kind: AttrKind) -> AttrDef {
        AttrDef {
            id,
            schema_id: 1,
            attribute_id: id * 10,
            name: name.into(),
            kind,
            required: false,
            unique: false,
            list: false,
            key: false,
            description: None,
            bound_schema_id: None,
        }
    }

    fn stored(rows: &[NewChange]) -> Vec<Change> {
        rows.iter()
            .zip(1..)
            .map(|(row, id)| Change {
                id,
                change_request_id: 1,
                object_id: row.object_id,
                attribute_id: row.attribute_id,
                field_name: row.field_name.map(str::to_string),
                content_type: row.content_type,
                change_type: row.change_type,
                data_kind: row.kind,
                old: row.old.clone(),
                new: row.new.clone(),
            })
            .collect()
    }

    #[test]
    fn test_def_rows_only_record_changed_fields() {
        let before = input("age", AttrKind::Int);
        let mut after = before.clone();
        after.required = true;
        after.description = Some("years".into());

        let rows = def_rows(Some(&before), &after, ChangeType::Update, Some(3), 30);
        let fields: Vec<_> = rows.iter().filter_map(|r| r.field_name).collect();
        assert_eq!(fields, vec!["required", "description"]);
        assert!(rows.iter().all(|r| r.object_id == Some(3) && r.attribute_id == Some(30)));

        let created = def_rows(None, &after, ChangeType::Create, None, 30);
        assert_eq!(created.len(), 8);
        assert!(created.iter().all(|r| r.old.is_none()));
    }

    #[test]
    fn test_rebuild_create_groups_definitions() {
        let mut friends = input("friends", AttrKind::Fk);
        friends.list = true;
        friends.bound_schema_id = Some(-1);
        let mut rows = vec![
            schema_field(ChangeType::Create, "name", None, Scalar::Str("Person".into())),
            schema_field(ChangeType::Create, "slug", None, Scalar::Str("person".into())),
            schema_field(ChangeType::Create, "reviewable", None, Scalar::Bool(true)),
        ];
        rows.extend(def_rows(None, &input("age", AttrKind::Int), ChangeType::Create, None, 10));
        rows.extend(def_rows(None, &friends, ChangeType::Create, None, 20));

        let data = rebuild_create(&stored(&rows)).unwrap();
        assert_eq!(data.name, "Person");
        assert!(data.reviewable);
        assert_eq!(data.attributes, vec![input("age", AttrKind::Int), friends]);
    }

    #[test]
    fn test_rebuild_update_replays_rows_over_live_definitions() {
        let defs = vec![live(1, "age", AttrKind::Int), live(2, "nickname", AttrKind::Str)];
        let mut renamed = defs[0].to_input();
        renamed.name = "years".into();
        let schema = Schema {
            id: 1,
            name: "Person".into(),
            slug: "person".into(),
            deleted: false,
            reviewable: false,
        };

        let mut rows = field_rows(
            &schema,
            &SchemaUpdate {
                slug: Some("people".into()),
                ..SchemaUpdate::default()
            },
        );
        rows.extend(def_rows(Some(&defs[0].to_input()), &renamed, ChangeType::Update, Some(1), 10));
        rows.push(NewChange {
            object_id: Some(2),
            attribute_id: Some(20),
            field_name: Some("deleted"),
            content_type: ContentType::AttributeDefinition,
            change_type: ChangeType::Delete,
            kind: AttrKind::Bool,
            old: Some(Scalar::Bool(false)),
            new: Some(Scalar::Bool(true)),
        });
        rows.extend(def_rows(None, &input("height", AttrKind::Float), ChangeType::Create, None, 40));

        let update = rebuild_update(&stored(&rows), &defs).unwrap();
        assert_eq!(update.slug.as_deref(), Some("people"));
        assert_eq!(update.name, None);
        assert_eq!(update.attributes, vec![renamed, input("height", AttrKind::Float)]);
    }

    #[test]
    fn test_stale_field() {
        let defs = vec![live(1, "age", AttrKind::Int)];
        let schema = Schema {
            id: 1,
            name: "Person".into(),
            slug: "person".into(),
            deleted: false,
            reviewable: false,
        };
        let mut wanted = defs[0].to_input();
        wanted.key = true;
        let rows = def_rows(Some(&defs[0].to_input()), &wanted, ChangeType::Update, Some(1), 10);
        let changes = stored(&rows);
        assert_eq!(stale_field(&changes, &schema, &defs), None);

        let mut moved = defs.clone();
        moved[0].key = true;
        assert_eq!(stale_field(&changes, &schema, &moved), Some("key".into()));
    }

    #[test]
    fn test_def_field() {
        let mut def = live(1, "age", AttrKind::Int);
        def.bound_schema_id = None;
        assert_eq!(def_field(&def, "kind"), Json::from("INT"));
        assert_eq!(def_field(&def, "bound_schema_id"), Json::Null);
        assert_eq!(def_field(&def, "unknown"), Json::Null);
    }
}
