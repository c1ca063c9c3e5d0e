//! Schema and attribute-definition operations

use super::validation::{
    bound_schema_required, check_attr_name, check_schema_slug, classify_attributes,
};
use super::values;
use crate::db::queries::{
    DELETE_DEFINITION, DELETE_SCHEMA_ENTITIES, GET_ATTRIBUTE, INSERT_DEFINITION, INSERT_SCHEMA,
    LIST_ATTRIBUTES, LIST_DEFINITIONS, LIST_SCHEMAS, SCHEMA_COLUMNS, SCHEMA_CONFLICT,
    SET_SCHEMA_DELETED, UPDATE_DEFINITION, UPSERT_ATTRIBUTE,
};
use crate::error::AppError;
use crate::models::{
    AttrDef, AttrDefInput, Attribute, IdOrSlug, Schema, SchemaCreate, SchemaDetail, SchemaUpdate,
};
use crate::registry::AttrKind;
use std::collections::HashSet;
use tokio_postgres::Transaction;
use tracing::{debug, info};

// ---- attributes ----

pub async fn list_attributes(tx: &Transaction<'_>) -> Result<Vec<Attribute>, AppError> {
    let rows = tx.query(LIST_ATTRIBUTES, &[]).await?;
    rows.iter().map(Attribute::from_row).collect()
}

pub async fn get_attribute(tx: &Transaction<'_>, id: i32) -> Result<Attribute, AppError> {
    let row = tx
        .query_opt(GET_ATTRIBUTE, &[&id])
        .await?
        .ok_or(AppError::MissingAttribute(id))?;
    Attribute::from_row(&row)
}

/// Look up the attribute with this (name, kind), creating it when missing
pub async fn get_or_create_attribute(
    tx: &Transaction<'_>,
    name: &str,
    kind: AttrKind,
) -> Result<Attribute, AppError> {
    check_attr_name(name)?;
    let row = tx.query_one(UPSERT_ATTRIBUTE, &[&name, &kind.as_str()]).await?;
    Attribute::from_row(&row)
}

// ---- schemas ----

pub async fn list_schemas(
    tx: &Transaction<'_>,
    all: bool,
    deleted_only: bool,
) -> Result<Vec<Schema>, AppError> {
    let rows = tx.query(LIST_SCHEMAS, &[&all, &deleted_only]).await?;
    Ok(rows.iter().map(Schema::from_row).collect())
}

/// Schema by id or slug, deleted or not
pub async fn find_schema(tx: &Transaction<'_>, key: &IdOrSlug) -> Result<Schema, AppError> {
    let row = match key {
        IdOrSlug::Id(id) => {
            let sql = format!("SELECT {} FROM schemas WHERE id = $1", SCHEMA_COLUMNS);
            tx.query_opt(&sql, &[id]).await?
        }
        IdOrSlug::Slug(slug) => {
            let sql = format!("SELECT {} FROM schemas WHERE slug = $1", SCHEMA_COLUMNS);
            tx.query_opt(&sql, &[slug]).await?
        }
    };
    row.map(|r| Schema::from_row(&r))
        .ok_or_else(|| AppError::MissingSchema(key.clone()))
}

/// Schema that hasn't been deleted
pub async fn live_schema(tx: &Transaction<'_>, key: &IdOrSlug) -> Result<Schema, AppError> {
    let schema = find_schema(tx, key).await?;
    if schema.deleted {
        return Err(AppError::MissingSchema(key.clone()));
    }
    Ok(schema)
}

pub async fn definitions(tx: &Transaction<'_>, schema_id: i32) -> Result<Vec<AttrDef>, AppError> {
    let rows = tx.query(LIST_DEFINITIONS, &[&schema_id]).await?;
    rows.iter().map(AttrDef::from_row).collect()
}

pub async fn get_schema(tx: &Transaction<'_>, key: &IdOrSlug) -> Result<SchemaDetail, AppError> {
    let schema = find_schema(tx, key).await?;
    let attributes = definitions(tx, schema.id).await?;
    Ok(SchemaDetail { schema, attributes })
}

async fn check_schema_free(
    tx: &Transaction<'_>,
    name: &str,
    slug: &str,
    except: i32,
) -> Result<(), AppError> {
    if tx
        .query_opt(SCHEMA_CONFLICT, &[&name, &slug, &except])
        .await?
        .is_some()
    {
        return Err(AppError::SchemaExists {
            name: name.to_string(),
            slug: slug.to_string(),
        });
    }
    Ok(())
}

/// Resolve the stored binding of a definition, checking the target schema
async fn resolve_binding(
    tx: &Transaction<'_>,
    schema_id: i32,
    input: &AttrDefInput,
) -> Result<AttrDefInput, AppError> {
    bound_schema_required(input)?;
    let input = input.normalized(schema_id);
    if let Some(bound) = input.bound_schema_id {
        if bound != schema_id {
            live_schema(tx, &IdOrSlug::Id(bound)).await?;
        }
    }
    Ok(input)
}

async fn insert_definition(
    tx: &Transaction<'_>,
    schema_id: i32,
    input: &AttrDefInput,
) -> Result<(), AppError> {
    let input = resolve_binding(tx, schema_id, input).await?;
    let attribute = get_or_create_attribute(tx, &input.name, input.kind).await?;
    tx.execute(
        INSERT_DEFINITION,
        &[
            &schema_id,
            &attribute.id,
            &input.required,
            &input.unique,
            &input.list,
            &input.key,
            &input.description,
            &input.bound_schema_id,
        ],
    )
    .await?;
    Ok(())
}

pub async fn create_schema(
    tx: &Transaction<'_>,
    data: &SchemaCreate,
) -> Result<SchemaDetail, AppError> {
    check_schema_slug(&data.slug)?;
    let mut seen = HashSet::new();
    for attr in &data.attributes {
        check_attr_name(&attr.name)?;
        bound_schema_required(attr)?;
        if !seen.insert(attr.name.as_str()) {
            return Err(AppError::MultipleAttributeOccurrences(attr.name.clone()));
        }
    }
    check_schema_free(tx, &data.name, &data.slug, 0).await?;

    let row = tx
        .query_one(INSERT_SCHEMA, &[&data.name, &data.slug, &data.reviewable])
        .await?;
    let schema = Schema::from_row(&row);

    for attr in &data.attributes {
        insert_definition(tx, schema.id, attr).await?;
    }

    info!(schema_id = schema.id, slug = %schema.slug, "schema created");
    get_schema(tx, &IdOrSlug::Id(schema.id)).await
}

pub async fn update_schema(
    tx: &Transaction<'_>,
    id: i32,
    data: &SchemaUpdate,
) -> Result<SchemaDetail, AppError> {
    let schema = live_schema(tx, &IdOrSlug::Id(id)).await?;
    let existing = definitions(tx, id).await?;
    let diff = classify_attributes(id, &existing, &data.attributes)?;

    let name = data.name.clone().unwrap_or_else(|| schema.name.clone());
    let slug = data.slug.clone().unwrap_or_else(|| schema.slug.clone());
    let reviewable = data.reviewable.unwrap_or(schema.reviewable);
    if slug != schema.slug {
        check_schema_slug(&slug)?;
    }
    if name != schema.name || slug != schema.slug {
        check_schema_free(tx, &name, &slug, id).await?;
    }
    tx.execute(
        "UPDATE schemas SET name = $2, slug = $3, reviewable = $4 WHERE id = $1",
        &[&id, &name, &slug, &reviewable],
    )
    .await?;

    for def in &diff.deleted {
        tx.execute(DELETE_DEFINITION, &[&def.id]).await?;
        let purged = values::purge(tx, id, def.attribute_id, def.kind).await?;
        debug!(schema_id = id, attr = %def.name, purged, "definition deleted");
    }

    // attribute ids bound to the schema once the updates below have run
    let mut bound: Vec<(i32, i32)> = existing
        .iter()
        .filter(|d| !diff.deleted.iter().any(|x| x.id == d.id))
        .map(|d| (d.id, d.attribute_id))
        .collect();

    for (current, wanted) in &diff.updated {
        let wanted = resolve_binding(tx, id, wanted).await?;

        let mut attribute_id = current.attribute_id;
        if wanted.name != current.name || wanted.kind != current.kind {
            attribute_id = get_or_create_attribute(tx, &wanted.name, wanted.kind).await?.id;
            if bound
                .iter()
                .any(|&(def_id, attr_id)| def_id != current.id && attr_id == attribute_id)
            {
                return Err(AppError::AttributeAlreadyDefined {
                    attr: wanted.name.clone(),
                    schema_id: id,
                });
            }
            if let Some(slot) = bound.iter_mut().find(|(def_id, _)| *def_id == current.id) {
                slot.1 = attribute_id;
            }
            if wanted.kind == current.kind {
                values::repoint(tx, id, current.attribute_id, attribute_id, current.kind).await?;
            } else {
                values::purge(tx, id, current.attribute_id, current.kind).await?;
            }
        }

        if wanted.unique && !wanted.list && !current.enforces_unique() && wanted.kind == current.kind {
            if let Some(dup) = values::find_duplicate(tx, id, attribute_id, wanted.kind).await? {
                return Err(AppError::UniqueValue {
                    attr: wanted.name.clone(),
                    schema_id: id,
                    value: dup.to_string(),
                });
            }
        }

        tx.execute(
            UPDATE_DEFINITION,
            &[
                &current.id,
                &attribute_id,
                &wanted.required,
                &wanted.unique,
                &wanted.list,
                &wanted.key,
                &wanted.description,
                &wanted.bound_schema_id,
            ],
        )
        .await?;
        debug!(schema_id = id, attr = %wanted.name, "definition updated");
    }

    for input in &diff.added {
        let attribute = get_or_create_attribute(tx, &input.name, input.kind).await?;
        if bound.iter().any(|&(_, attr_id)| attr_id == attribute.id) {
            return Err(AppError::AttributeAlreadyDefined {
                attr: input.name.clone(),
                schema_id: id,
            });
        }
        insert_definition(tx, id, input).await?;
        debug!(schema_id = id, attr = %input.name, "definition added");
    }

    info!(schema_id = id, slug = %slug, "schema updated");
    get_schema(tx, &IdOrSlug::Id(id)).await
}

/// Soft-delete a schema together with its entities
pub async fn delete_schema(tx: &Transaction<'_>, id: i32) -> Result<Schema, AppError> {
    let mut schema = live_schema(tx, &IdOrSlug::Id(id)).await?;
    tx.execute(SET_SCHEMA_DELETED, &[&id, &true]).await?;
    let entities = tx.execute(DELETE_SCHEMA_ENTITIES, &[&id]).await?;
    schema.deleted = true;
    info!(schema_id = id, entities, "schema deleted");
    Ok(schema)
}

/// Restore a deleted schema; its entities stay as they are
pub async fn restore_schema(tx: &Transaction<'_>, id: i32) -> Result<Schema, AppError> {
    let mut schema = find_schema(tx, &IdOrSlug::Id(id)).await?;
    if !schema.deleted {
        return Err(AppError::NoOpChange(format!(
            "schema ({}) is not deleted",
            id
        )));
    }
    tx.execute(SET_SCHEMA_DELETED, &[&id, &false]).await?;
    schema.deleted = false;
    info!(schema_id = id, "schema restored");
    Ok(schema)
}
