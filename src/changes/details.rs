//! Diff view of a change request
//!
//! Every stored change is shown as `{old, new, current}`: `old`/`new` as they
//! were staged and `current` read from the store right now, so a reviewer can
//! see whether the target drifted since staging.

use super::models::{Change, ChangeRequest, ChangeType, ContentType, ObjectType};
use super::schema::def_field;
use super::{scalar_id, scalar_text, store as requests};
use crate::error::AppError;
use crate::models::{AttrDef, Entity, IdOrSlug, Schema};
use crate::registry::Scalar;
use crate::store;
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use tokio_postgres::Transaction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub old: Json,
    pub new: Json,
    pub current: Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionDiff {
    pub change_type: ChangeType,
    pub fields: BTreeMap<String, FieldDiff>,
}

#[derive(Debug, Serialize)]
pub struct ChangeDetail {
    #[serde(flatten)]
    pub request: ChangeRequest,
    pub changes: BTreeMap<String, FieldDiff>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, DefinitionDiff>,
}

fn json_of(value: Option<&Scalar>) -> Json {
    value.map_or(Json::Null, Scalar::to_json)
}

/// Attribute rows grouped by attribute id in staging order
fn by_attribute(changes: &[Change], content_type: ContentType) -> Vec<(i32, Vec<&Change>)> {
    let mut groups: Vec<(i32, Vec<&Change>)> = Vec::new();
    for change in changes.iter().filter(|c| c.content_type == content_type) {
        let Some(attribute_id) = change.attribute_id else {
            continue;
        };
        match groups.iter_mut().find(|(id, _)| *id == attribute_id) {
            Some((_, rows)) => rows.push(change),
            None => groups.push((attribute_id, vec![change])),
        }
    }
    groups
}

/// Staged old and new value of one entity attribute
fn attribute_diff(rows: &[&Change], listed: bool) -> (Json, Json) {
    if listed {
        let old = rows.iter().filter_map(|c| c.old.as_ref()).map(Scalar::to_json);
        let new = rows.iter().filter_map(|c| c.new.as_ref()).map(Scalar::to_json);
        return (Json::Array(old.collect()), Json::Array(new.collect()));
    }
    rows.last().map_or((Json::Null, Json::Null), |c| {
        (json_of(c.old.as_ref()), json_of(c.new.as_ref()))
    })
}

async fn entity_details(
    tx: &Transaction<'_>,
    request: &ChangeRequest,
    changes: &[Change],
) -> Result<BTreeMap<String, FieldDiff>, AppError> {
    let staged_schema = changes
        .iter()
        .find(|c| c.is_field("schema_id"))
        .and_then(|c| scalar_id(c.new.as_ref()));
    let entity: Option<Entity> = match request.object_id {
        Some(id) => Some(store::entity_by_id(tx, id).await?),
        None => None,
    };
    let defs = match entity.as_ref().map(|e| e.schema_id).or(staged_schema) {
        Some(schema_id) => store::definitions(tx, schema_id).await?,
        None => Vec::new(),
    };
    let entity = match entity {
        Some(e) => Some(store::with_fields(tx, e, &defs).await?),
        None => None,
    };
    let current = |field: &str| entity.as_ref().map_or(Json::Null, |e| e.field(field));

    let mut out = BTreeMap::new();
    for change in changes {
        if let Some(field) = change.field_name.as_deref() {
            out.insert(
                field.to_string(),
                FieldDiff {
                    old: json_of(change.old.as_ref()),
                    new: json_of(change.new.as_ref()),
                    current: current(field),
                },
            );
        }
    }
    for (attribute_id, rows) in by_attribute(changes, ContentType::Entity) {
        let def = defs.iter().find(|d| d.attribute_id == attribute_id);
        let name = match def {
            Some(def) => def.name.clone(),
            None => store::get_attribute(tx, attribute_id).await?.name,
        };
        let listed = def.map_or(rows.len() > 1, |d| d.list);
        let (old, new) = attribute_diff(&rows, listed);
        out.insert(
            name.clone(),
            FieldDiff {
                old,
                new,
                current: current(&name),
            },
        );
    }
    Ok(out)
}

fn schema_current(schema: Option<&Schema>, field: &str) -> Json {
    let Some(schema) = schema else {
        return Json::Null;
    };
    match field {
        "name" => Json::from(schema.name.clone()),
        "slug" => Json::from(schema.slug.clone()),
        "reviewable" => Json::from(schema.reviewable),
        "deleted" => Json::from(schema.deleted),
        _ => Json::Null,
    }
}

async fn schema_details(
    tx: &Transaction<'_>,
    request: &ChangeRequest,
    changes: &[Change],
) -> Result<(BTreeMap<String, FieldDiff>, BTreeMap<String, DefinitionDiff>), AppError> {
    let (schema, live): (Option<Schema>, Vec<AttrDef>) = match request.object_id {
        Some(id) => {
            let schema = store::find_schema(tx, &IdOrSlug::Id(id)).await?;
            let live = store::definitions(tx, id).await?;
            (Some(schema), live)
        }
        None => (None, Vec::new()),
    };

    let mut fields = BTreeMap::new();
    for change in changes
        .iter()
        .filter(|c| c.content_type == ContentType::Schema)
    {
        if let Some(field) = change.field_name.as_deref() {
            fields.insert(
                field.to_string(),
                FieldDiff {
                    old: json_of(change.old.as_ref()),
                    new: json_of(change.new.as_ref()),
                    current: schema_current(schema.as_ref(), field),
                },
            );
        }
    }

    let mut definitions = BTreeMap::new();
    for (attribute_id, rows) in by_attribute(changes, ContentType::AttributeDefinition) {
        let object_id = rows.iter().find_map(|c| c.object_id);
        let def = live
            .iter()
            .find(|d| Some(d.id) == object_id || d.attribute_id == attribute_id);
        let staged_name = rows
            .iter()
            .find(|c| c.is_field("name"))
            .and_then(|c| scalar_text(c.new.as_ref()));
        let label = match (staged_name, def) {
            (Some(name), _) => name,
            (None, Some(def)) => def.name.clone(),
            (None, None) => store::get_attribute(tx, attribute_id).await?.name,
        };

        let mut diff = DefinitionDiff {
            change_type: rows[0].change_type,
            fields: BTreeMap::new(),
        };
        for change in &rows {
            let Some(field) = change.field_name.as_deref() else {
                continue;
            };
            let current = match (field, def) {
                ("deleted", def) => Json::from(def.is_none()),
                (field, Some(def)) => def_field(def, field),
                (_, None) => Json::Null,
            };
            diff.fields.insert(
                field.to_string(),
                FieldDiff {
                    old: json_of(change.old.as_ref()),
                    new: json_of(change.new.as_ref()),
                    current,
                },
            );
        }
        definitions.insert(label, diff);
    }
    Ok((fields, definitions))
}

/// Request with the `{old, new, current}` triple of every change
pub async fn change_details(tx: &Transaction<'_>, id: i32) -> Result<ChangeDetail, AppError> {
    let request = requests::get_request(tx, id).await?;
    let changes = requests::load_changes(tx, id).await?;
    let (changes, definitions) = match request.object_type {
        ObjectType::Entity => (
            entity_details(tx, &request, &changes).await?,
            BTreeMap::new(),
        ),
        ObjectType::Schema => schema_details(tx, &request, &changes).await?,
    };
    Ok(ChangeDetail {
        request,
        changes,
        definitions,
    })
}
