//! Entity change requests

use super::models::{
    Change, ChangeRequest, ChangeStatus, ChangeType, ContentType, NewChange, ObjectType, Submitted,
};
use super::{scalar_id, store as requests};
use crate::auth::{PermissionKind, Target};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::models::{AttrDef, Entity, EntityData, IdOrSlug, Schema};
use crate::registry::{AttrKind, Scalar};
use crate::store::validation::{shape_values, sort_values};
use crate::store::{self, values};
use serde_json::Value as Json;
use std::collections::HashMap;
use tokio_postgres::Transaction;
use tracing::{info, warn};

/// Stored values of one entity keyed by attribute id
type Current = HashMap<i32, Vec<Scalar>>;

/// Attribute id to (name, listed) for everything a request touches
type AttrIndex = HashMap<i32, (String, bool)>;

fn text(data: &EntityData, field: &str) -> Option<String> {
    data.get(field).and_then(Json::as_str).map(str::to_string)
}

/// Typed values of every submitted attribute; null becomes no values
fn submitted_values<'a>(
    data: &EntityData,
    defs: &'a [AttrDef],
    schema_id: i32,
) -> Result<Vec<(&'a AttrDef, Vec<Scalar>)>, AppError> {
    let mut out = Vec::new();
    for (key, raw) in data {
        if key == "name" || key == "slug" {
            continue;
        }
        let def = defs
            .iter()
            .find(|d| &d.name == key)
            .ok_or_else(|| AppError::AttributeNotDefined {
                attr: key.clone(),
                schema_id,
            })?;
        let values = if raw.is_null() {
            Vec::new()
        } else {
            shape_values(def, raw)?
        };
        out.push((def, values));
    }
    Ok(out)
}

/// (old, new) pairs recorded for one attribute; empty when nothing changes.
/// Lists are compared sorted and paired element by element.
fn diff_values(
    list: bool,
    mut old: Vec<Scalar>,
    mut new: Vec<Scalar>,
) -> Vec<(Option<Scalar>, Option<Scalar>)> {
    if list {
        sort_values(&mut old);
        sort_values(&mut new);
    }
    if old == new {
        return Vec::new();
    }
    if !list {
        return vec![(old.into_iter().next(), new.into_iter().next())];
    }
    let len = old.len().max(new.len());
    let mut old = old.into_iter();
    let mut new = new.into_iter();
    (0..len).map(|_| (old.next(), new.next())).collect()
}

fn create_rows(
    schema_id: i32,
    name: Option<String>,
    slug: Option<String>,
    fields: Vec<(&AttrDef, Vec<Scalar>)>,
) -> Vec<NewChange> {
    let field = |name: &'static str, kind: AttrKind, value: Option<Scalar>| {
        NewChange::field(ContentType::Entity, ChangeType::Create, name, kind, None, value)
    };
    let mut rows = vec![
        field("name", AttrKind::Str, name.map(Scalar::Str)),
        field("slug", AttrKind::Str, slug.map(Scalar::Str)),
        field("schema_id", AttrKind::Int, Some(Scalar::Int(schema_id.into()))),
    ];

    for (def, mut values) in fields {
        if values.is_empty() {
            // keeps an explicitly empty list in the request
            if def.list {
                rows.push(NewChange::attribute(
                    ChangeType::Create,
                    def.attribute_id,
                    def.kind,
                    None,
                    None,
                ));
            }
            continue;
        }
        if def.list {
            sort_values(&mut values);
        }
        rows.extend(values.into_iter().map(|v| {
            NewChange::attribute(ChangeType::Create, def.attribute_id, def.kind, None, Some(v))
        }));
    }
    rows
}

fn update_rows(
    entity: &Entity,
    current: &Current,
    name: Option<String>,
    slug: Option<String>,
    fields: Vec<(&AttrDef, Vec<Scalar>)>,
) -> Vec<NewChange> {
    let mut rows = Vec::new();
    for (field, wanted, stored) in [("name", name, &entity.name), ("slug", slug, &entity.slug)] {
        if let Some(wanted) = wanted.filter(|w| w != stored) {
            rows.push(NewChange::field(
                ContentType::Entity,
                ChangeType::Update,
                field,
                AttrKind::Str,
                Some(Scalar::Str(stored.clone())),
                Some(Scalar::Str(wanted)),
            ));
        }
    }

    for (def, values) in fields {
        let old = current.get(&def.attribute_id).cloned().unwrap_or_default();
        rows.extend(
            diff_values(def.list, old, values)
                .into_iter()
                .map(|(old, new)| {
                    NewChange::attribute(ChangeType::Update, def.attribute_id, def.kind, old, new)
                }),
        );
    }
    rows.into_iter().map(|r| r.on(Some(entity.id))).collect()
}

fn flag_row(entity: &Entity, change_type: ChangeType) -> NewChange {
    let deleted = change_type == ChangeType::Delete;
    NewChange::field(
        ContentType::Entity,
        change_type,
        "deleted",
        AttrKind::Bool,
        Some(Scalar::Bool(!deleted)),
        Some(Scalar::Bool(deleted)),
    )
    .on(Some(entity.id))
}

/// Rebuild the payload a request was staged with. List attributes are
/// regrouped and their null placeholders dropped.
fn rebuild(changes: &[Change], attrs: &AttrIndex) -> Result<EntityData, AppError> {
    let mut data = EntityData::new();
    for change in changes {
        if let Some(field) = change.field_name.as_deref() {
            if field == "name" || field == "slug" {
                let value = change.new.as_ref().map_or(Json::Null, Scalar::to_json);
                data.insert(field.to_string(), value);
            }
            continue;
        }
        let Some(attribute_id) = change.attribute_id else {
            continue;
        };
        let (name, list) = attrs
            .get(&attribute_id)
            .ok_or(AppError::MissingAttribute(attribute_id))?;
        if *list {
            let entry = data
                .entry(name.clone())
                .or_insert_with(|| Json::Array(Vec::new()));
            if let (Json::Array(items), Some(value)) = (entry, &change.new) {
                items.push(value.to_json());
            }
        } else {
            let value = change.new.as_ref().map_or(Json::Null, Scalar::to_json);
            data.insert(name.clone(), value);
        }
    }
    Ok(data)
}

/// First field whose staged old value no longer matches the stored one
fn stale_field(
    changes: &[Change],
    entity: &Entity,
    current: &Current,
    attrs: &AttrIndex,
) -> Option<String> {
    let mut staged: HashMap<i32, Vec<Scalar>> = HashMap::new();
    for change in changes {
        match (&change.field_name, change.attribute_id) {
            (Some(field), _) => {
                let old = change.old.as_ref().map_or(Json::Null, Scalar::to_json);
                if old != entity.field(field) {
                    return Some(field.clone());
                }
            }
            (None, Some(attribute_id)) => {
                let olds = staged.entry(attribute_id).or_default();
                olds.extend(change.old.clone());
            }
            (None, None) => {}
        }
    }

    for (attribute_id, mut olds) in staged {
        let mut stored = current.get(&attribute_id).cloned().unwrap_or_default();
        sort_values(&mut olds);
        sort_values(&mut stored);
        if olds != stored {
            let name = attrs
                .get(&attribute_id)
                .map_or_else(|| attribute_id.to_string(), |(n, _)| n.clone());
            return Some(name);
        }
    }
    None
}

async fn current_values(
    tx: &Transaction<'_>,
    entity_id: i32,
    defs: &[AttrDef],
) -> Result<Current, AppError> {
    let refs: Vec<&AttrDef> = defs.iter().collect();
    let loaded = values::load(tx, &[entity_id], &refs).await?;
    Ok(loaded
        .into_iter()
        .map(|((_, attribute_id), vs)| (attribute_id, vs))
        .collect())
}

/// Names of the live definitions. A request that touches an attribute the
/// schema no longer defines fails with `AttributeNotDefined`.
async fn attr_index(
    tx: &Transaction<'_>,
    schema_id: i32,
    defs: &[AttrDef],
    changes: &[Change],
) -> Result<AttrIndex, AppError> {
    let index: AttrIndex = defs
        .iter()
        .map(|d| (d.attribute_id, (d.name.clone(), d.list)))
        .collect();
    for attribute_id in changes.iter().filter_map(|c| c.attribute_id) {
        if !index.contains_key(&attribute_id) {
            let attr = store::get_attribute(tx, attribute_id).await?.name;
            return Err(AppError::AttributeNotDefined { attr, schema_id });
        }
    }
    Ok(index)
}

// ---- staging ----

pub async fn stage_create(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &Schema,
    data: &EntityData,
) -> Result<ChangeRequest, AppError> {
    ctx.authorize(PermissionKind::CreateEntity, Some(Target::Schema(schema.id)))?;
    dry_run!(tx, |sp| store::create_entity(&sp, schema.id, data))?;

    let defs = store::definitions(tx, schema.id).await?;
    let fields = submitted_values(data, &defs, schema.id)?;
    let rows = create_rows(schema.id, text(data, "name"), text(data, "slug"), fields);

    let request =
        requests::insert_request(tx, ctx, ObjectType::Entity, ChangeType::Create, None).await?;
    requests::insert_changes(tx, request.id, &rows).await?;
    info!(request_id = request.id, schema_id = schema.id, "entity create staged");
    Ok(request)
}

pub async fn stage_update(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &Schema,
    entity: &Entity,
    data: &EntityData,
) -> Result<ChangeRequest, AppError> {
    ctx.authorize(PermissionKind::UpdateEntity, Some(Target::Entity(entity.id)))?;
    dry_run!(tx, |sp| store::update_entity(&sp, schema.id, entity.id, data))?;

    let defs = store::definitions(tx, schema.id).await?;
    let current = current_values(tx, entity.id, &defs).await?;
    let fields = submitted_values(data, &defs, schema.id)?;
    let rows = update_rows(entity, &current, text(data, "name"), text(data, "slug"), fields);
    if rows.is_empty() {
        return Err(AppError::NoOpChange(format!(
            "entity ({}) already has the submitted values",
            entity.id
        )));
    }

    let request = requests::insert_request(
        tx,
        ctx,
        ObjectType::Entity,
        ChangeType::Update,
        Some(entity.id),
    )
    .await?;
    requests::insert_changes(tx, request.id, &rows).await?;
    info!(request_id = request.id, entity_id = entity.id, changes = rows.len(), "entity update staged");
    Ok(request)
}

/// Stage a DELETE or RESTORE of `entity`
pub async fn stage_flag(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &Schema,
    entity: &Entity,
    change_type: ChangeType,
) -> Result<ChangeRequest, AppError> {
    ctx.authorize(PermissionKind::DeleteEntity, Some(Target::Entity(entity.id)))?;
    match change_type {
        ChangeType::Delete if entity.deleted => {
            return Err(AppError::NoOpChange(format!(
                "entity ({}) is already deleted",
                entity.id
            )))
        }
        ChangeType::Restore if !entity.deleted => {
            return Err(AppError::NoOpChange(format!(
                "entity ({}) is not deleted",
                entity.id
            )))
        }
        ChangeType::Delete => {
            dry_run!(tx, |sp| store::delete_entity(&sp, schema.id, entity.id))?;
        }
        ChangeType::Restore => {
            dry_run!(tx, |sp| store::restore_entity(&sp, schema.id, entity.id))?;
        }
        other => {
            return Err(AppError::Internal(format!(
                "{} is not a deleted-flag change",
                other
            )))
        }
    }

    let request =
        requests::insert_request(tx, ctx, ObjectType::Entity, change_type, Some(entity.id)).await?;
    requests::insert_changes(tx, request.id, &[flag_row(entity, change_type)]).await?;
    info!(request_id = request.id, entity_id = entity.id, change = %change_type, "entity change staged");
    Ok(request)
}

// ---- applying ----

async fn apply_create(
    tx: &Transaction<'_>,
    request: &ChangeRequest,
    changes: &[Change],
) -> Result<Entity, AppError> {
    let schema_id = changes
        .iter()
        .find(|c| c.is_field("schema_id"))
        .and_then(|c| scalar_id(c.new.as_ref()))
        .ok_or_else(|| {
            AppError::Internal(format!("request {} doesn't name a schema", request.id))
        })?;
    let defs = store::definitions(tx, schema_id).await?;
    let attrs = attr_index(tx, schema_id, &defs, changes).await?;
    let data = rebuild(changes, &attrs)?;

    let entity = store::create_entity(tx, schema_id, &data).await?;
    requests::set_object_id(tx, request.id, ContentType::Entity, entity.id).await?;
    Ok(entity)
}

async fn apply_update(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    entity: Entity,
    changes: &[Change],
) -> Result<Entity, AppError> {
    let defs = store::definitions(tx, entity.schema_id).await?;
    let attrs = attr_index(tx, entity.schema_id, &defs, changes).await?;
    if ctx.config.strict_apply {
        let current = current_values(tx, entity.id, &defs).await?;
        if let Some(field) = stale_field(changes, &entity, &current, &attrs) {
            return Err(AppError::StaleChange { field });
        }
    }
    let data = rebuild(changes, &attrs)?;
    store::update_entity(tx, entity.schema_id, entity.id, &data).await
}

async fn apply_changes(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    request: &ChangeRequest,
    changes: &[Change],
) -> Result<Entity, AppError> {
    if request.change_type == ChangeType::Create {
        return apply_create(tx, request, changes).await;
    }
    let object_id = request.object_id.ok_or_else(|| {
        AppError::Internal(format!("request {} has no target entity", request.id))
    })?;
    let entity = store::entity_by_id(tx, object_id).await?;
    match request.change_type {
        ChangeType::Delete => store::delete_entity(tx, entity.schema_id, entity.id).await,
        ChangeType::Restore => store::restore_entity(tx, entity.schema_id, entity.id).await,
        _ => apply_update(tx, ctx, entity, changes).await,
    }
}

/// Apply a pending entity request and mark it approved
pub async fn apply(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    id: i32,
    change_type: ChangeType,
    comment: Option<&str>,
) -> Result<Entity, AppError> {
    let request = requests::load_pending(tx, id, ObjectType::Entity, change_type).await?;
    ctx.authorize(PermissionKind::UpdateEntity, request.object_id.map(Target::Entity))?;
    let changes = requests::load_changes(tx, id).await?;

    let entity = match apply_changes(tx, ctx, &request, &changes).await {
        Ok(entity) => entity,
        Err(e) => {
            warn!(request_id = id, change = %change_type, error = %e, "entity request failed to apply");
            return Err(e);
        }
    };
    requests::mark_reviewed(tx, ctx, id, ChangeStatus::Approved, comment).await?;
    info!(request_id = id, entity_id = entity.id, change = %change_type, "entity request applied");
    Ok(entity)
}

// ---- submitting ----

/// Apply at once unless the schema wants changes reviewed
async fn settle(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    schema: &Schema,
    request: ChangeRequest,
) -> Result<Submitted<Entity>, AppError> {
    if schema.reviewable {
        return Ok(Submitted::Pending(request));
    }
    let comment = Some(ctx.config.autosubmit_comment.as_str());
    let entity = apply(tx, ctx, request.id, request.change_type, comment).await?;
    Ok(Submitted::Applied(entity))
}

async fn target(
    tx: &Transaction<'_>,
    schema: &IdOrSlug,
    key: &IdOrSlug,
) -> Result<(Schema, Entity), AppError> {
    let schema = store::live_schema(tx, schema).await?;
    let entity = store::find_entity(tx, schema.id, key).await?;
    Ok((schema, entity))
}

pub async fn create(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &IdOrSlug,
    data: &EntityData,
) -> Result<Submitted<Entity>, AppError> {
    let schema = store::live_schema(tx, schema).await?;
    let request = stage_create(tx, ctx, &schema, data).await?;
    settle(tx, ctx, &schema, request).await
}

pub async fn update(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &IdOrSlug,
    key: &IdOrSlug,
    data: &EntityData,
) -> Result<Submitted<Entity>, AppError> {
    let (schema, entity) = target(tx, schema, key).await?;
    if entity.deleted {
        return Err(AppError::MissingEntity(key.clone()));
    }
    let request = stage_update(tx, ctx, &schema, &entity, data).await?;
    settle(tx, ctx, &schema, request).await
}

pub async fn delete(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &IdOrSlug,
    key: &IdOrSlug,
) -> Result<Submitted<Entity>, AppError> {
    let (schema, entity) = target(tx, schema, key).await?;
    let request = stage_flag(tx, ctx, &schema, &entity, ChangeType::Delete).await?;
    settle(tx, ctx, &schema, request).await
}

pub async fn restore(
    tx: &mut Transaction<'_>,
    ctx: &RequestContext,
    schema: &IdOrSlug,
    key: &IdOrSlug,
) -> Result<Submitted<Entity>, AppError> {
    let (schema, entity) = target(tx, schema, key).await?;
    let request = stage_flag(tx, ctx, &schema, &entity, ChangeType::Restore).await?;
    settle(tx, ctx, &schema, request).await
}
