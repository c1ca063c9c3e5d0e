//! Entity operations

use super::schema::{definitions, live_schema};
use super::validation::{check_slug, shape_values};
use super::values;
use crate::db::queries::{
    ENTITY_SLUG_TAKEN, GET_ENTITY_BY_ID, GET_ENTITY_BY_SLUG, INSERT_ENTITY, SET_ENTITY_DELETED,
    UPDATE_ENTITY_FIELDS,
};
use crate::error::AppError;
use crate::models::{AttrDef, Entity, EntityData, IdOrSlug, MAX_TEXT_LEN};
use crate::registry::AttrKind;
use serde_json::Value as Json;
use tokio_postgres::Transaction;
use tracing::info;

/// Entity by id, regardless of schema and deleted flag
pub async fn entity_by_id(tx: &Transaction<'_>, id: i32) -> Result<Entity, AppError> {
    tx.query_opt(GET_ENTITY_BY_ID, &[&id])
        .await?
        .map(|r| Entity::from_row(&r))
        .ok_or(AppError::MissingEntity(IdOrSlug::Id(id)))
}

/// Entity of `schema_id` by id or slug, deleted or not
pub async fn find_entity(
    tx: &Transaction<'_>,
    schema_id: i32,
    key: &IdOrSlug,
) -> Result<Entity, AppError> {
    let entity = match key {
        IdOrSlug::Id(id) => tx.query_opt(GET_ENTITY_BY_ID, &[id]).await?,
        IdOrSlug::Slug(slug) => tx.query_opt(GET_ENTITY_BY_SLUG, &[&schema_id, slug]).await?,
    }
    .map(|r| Entity::from_row(&r))
    .ok_or_else(|| AppError::MissingEntity(key.clone()))?;

    if entity.schema_id != schema_id {
        return Err(AppError::MismatchingSchema {
            entity: key.clone(),
            schema_id,
        });
    }
    Ok(entity)
}

async fn live_entity(tx: &Transaction<'_>, schema_id: i32, id: i32) -> Result<Entity, AppError> {
    let entity = find_entity(tx, schema_id, &IdOrSlug::Id(id)).await?;
    if entity.deleted {
        return Err(AppError::MissingEntity(IdOrSlug::Id(id)));
    }
    Ok(entity)
}

/// Fill in the values of `defs`
pub async fn with_fields(
    tx: &Transaction<'_>,
    mut entity: Entity,
    defs: &[AttrDef],
) -> Result<Entity, AppError> {
    let defs: Vec<&AttrDef> = defs.iter().collect();
    let loaded = values::load(tx, &[entity.id], &defs).await?;
    entity.fields = values::to_fields(entity.id, &defs, &loaded);
    Ok(entity)
}

/// Entity with every attribute of its schema
pub async fn get_entity(
    tx: &Transaction<'_>,
    schema: &IdOrSlug,
    key: &IdOrSlug,
) -> Result<Entity, AppError> {
    let schema = live_schema(tx, schema).await?;
    let entity = find_entity(tx, schema.id, key).await?;
    let defs = definitions(tx, schema.id).await?;
    with_fields(tx, entity, &defs).await
}

fn required_text(data: &EntityData, field: &str) -> Result<Option<String>, AppError> {
    match data.get(field) {
        None => Ok(None),
        Some(Json::Null) => Err(AppError::RequiredField(field.to_string())),
        Some(Json::String(s)) if s.chars().count() > MAX_TEXT_LEN => Err(AppError::Validation(
            format!("`{}` can't exceed {} characters", field, MAX_TEXT_LEN),
        )),
        Some(Json::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(other) => Err(AppError::Validation(format!(
            "`{}` must be a non-empty string, got {}",
            field, other
        ))),
    }
}

/// Pair every submitted attribute with its definition
fn submitted<'a>(
    data: &'a EntityData,
    defs: &'a [AttrDef],
    schema_id: i32,
) -> Result<Vec<(&'a AttrDef, &'a Json)>, AppError> {
    data.iter()
        .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "slug")
        .map(|(key, value)| {
            defs.iter()
                .find(|d| &d.name == key)
                .map(|d| (d, value))
                .ok_or_else(|| AppError::AttributeNotDefined {
                    attr: key.clone(),
                    schema_id,
                })
        })
        .collect()
}

async fn check_slug_free(
    tx: &Transaction<'_>,
    schema_id: i32,
    slug: &str,
    except: i32,
) -> Result<(), AppError> {
    check_slug(slug)?;
    if tx
        .query_opt(ENTITY_SLUG_TAKEN, &[&schema_id, &slug, &except])
        .await?
        .is_some()
    {
        return Err(AppError::EntityExists(slug.to_string()));
    }
    Ok(())
}

/// Validate and store one submitted attribute, replacing earlier values
async fn write_attribute(
    tx: &Transaction<'_>,
    entity_id: i32,
    def: &AttrDef,
    raw: &Json,
) -> Result<(), AppError> {
    if raw.is_null() {
        if def.required {
            return Err(AppError::RequiredField(def.name.clone()));
        }
        values::clear(tx, entity_id, def).await?;
        return Ok(());
    }

    let shaped = shape_values(def, raw)?;
    for value in &shaped {
        if def.enforces_unique() {
            values::check_unique(tx, def, entity_id, value).await?;
        }
        if def.kind == AttrKind::Fk {
            values::check_binding(tx, def, value).await?;
        }
    }
    values::replace(tx, entity_id, def, &shaped).await
}

pub async fn create_entity(
    tx: &Transaction<'_>,
    schema_id: i32,
    data: &EntityData,
) -> Result<Entity, AppError> {
    let schema = live_schema(tx, &IdOrSlug::Id(schema_id)).await?;
    let defs = definitions(tx, schema.id).await?;

    let name = required_text(data, "name")?.ok_or_else(|| AppError::RequiredField("name".into()))?;
    let slug = required_text(data, "slug")?.ok_or_else(|| AppError::RequiredField("slug".into()))?;
    let fields = submitted(data, &defs, schema.id)?;
    for def in defs.iter().filter(|d| d.required) {
        if data.get(&def.name).map_or(true, Json::is_null) {
            return Err(AppError::RequiredField(def.name.clone()));
        }
    }
    check_slug_free(tx, schema.id, &slug, 0).await?;

    let row = tx.query_one(INSERT_ENTITY, &[&schema.id, &name, &slug]).await?;
    let entity = Entity::from_row(&row);
    for (def, raw) in fields {
        write_attribute(tx, entity.id, def, raw).await?;
    }

    info!(schema_id, entity_id = entity.id, slug = %entity.slug, "entity created");
    with_fields(tx, entity, &defs).await
}

pub async fn update_entity(
    tx: &Transaction<'_>,
    schema_id: i32,
    id: i32,
    data: &EntityData,
) -> Result<Entity, AppError> {
    let schema = live_schema(tx, &IdOrSlug::Id(schema_id)).await?;
    let mut entity = live_entity(tx, schema.id, id).await?;
    let defs = definitions(tx, schema.id).await?;
    let fields = submitted(data, &defs, schema.id)?;

    let name = required_text(data, "name")?;
    let slug = required_text(data, "slug")?;
    if let Some(slug) = &slug {
        if *slug != entity.slug {
            check_slug_free(tx, schema.id, slug, entity.id).await?;
        }
    }
    if name.is_some() || slug.is_some() {
        entity.name = name.unwrap_or(entity.name);
        entity.slug = slug.unwrap_or(entity.slug);
        tx.execute(UPDATE_ENTITY_FIELDS, &[&entity.id, &entity.name, &entity.slug])
            .await?;
    }

    for (def, raw) in fields {
        write_attribute(tx, entity.id, def, raw).await?;
    }

    info!(schema_id, entity_id = id, "entity updated");
    with_fields(tx, entity, &defs).await
}

pub async fn delete_entity(
    tx: &Transaction<'_>,
    schema_id: i32,
    id: i32,
) -> Result<Entity, AppError> {
    let mut entity = live_entity(tx, schema_id, id).await?;
    tx.execute(SET_ENTITY_DELETED, &[&id, &true]).await?;
    entity.deleted = true;
    info!(schema_id, entity_id = id, "entity deleted");
    Ok(entity)
}

/// Unique values are not re-checked on restore
pub async fn restore_entity(
    tx: &Transaction<'_>,
    schema_id: i32,
    id: i32,
) -> Result<Entity, AppError> {
    live_schema(tx, &IdOrSlug::Id(schema_id)).await?;
    let mut entity = find_entity(tx, schema_id, &IdOrSlug::Id(id)).await?;
    if !entity.deleted {
        return Err(AppError::NoOpChange(format!("entity ({}) is not deleted", id)));
    }
    tx.execute(SET_ENTITY_DELETED, &[&id, &false]).await?;
    entity.deleted = false;
    info!(schema_id, entity_id = id, "entity restored");
    Ok(entity)
}
