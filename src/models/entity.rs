//! Entity models
//!
//! Entities carry no columns for their custom attributes; they are exchanged
//! as a JSON object whose keys are attribute names.

use serde::Serialize;
use serde_json::{Map, Value as Json};
use tokio_postgres::Row;

/// Built-in entity fields that can't be used as attribute names
pub const RESERVED_FIELDS: [&str; 4] = ["id", "slug", "deleted", "name"];

/// Longest entity name or slug the `entities` table holds
pub const MAX_TEXT_LEN: usize = 128;

/// Dict-shaped entity payload used for create and update
pub type EntityData = Map<String, Json>;

/// An entity with the attribute values that were requested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: i32,
    #[serde(skip_serializing)]
    pub schema_id: i32,
    pub name: String,
    pub slug: String,
    pub deleted: bool,
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

impl Entity {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            schema_id: row.get("schema_id"),
            name: row.get("name"),
            slug: row.get("slug"),
            deleted: row.get("deleted"),
            fields: Map::new(),
        }
    }

    /// Built-in or attribute value by field name
    pub fn field(&self, name: &str) -> Json {
        match name {
            "id" => Json::from(self.id),
            "name" => Json::from(self.name.clone()),
            "slug" => Json::from(self.slug.clone()),
            "deleted" => Json::from(self.deleted),
            "schema_id" => Json::from(self.schema_id),
            other => self.fields.get(other).cloned().unwrap_or(Json::Null),
        }
    }
}

/// Result of an entity listing
#[derive(Debug, Serialize)]
pub struct EntityPage {
    pub total: i64,
    pub entities: Vec<Entity>,
}
