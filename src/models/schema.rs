//! Schema, attribute and attribute-definition models

use crate::error::AppError;
use crate::registry::AttrKind;
use crate::store::validation::{is_valid_attr_name, is_valid_slug};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use validator::{Validate, ValidationError};

/// `bound_schema_id` sentinel binding a foreign key to the schema being defined
pub const SELF_BINDING: i32 = -1;

/// A user-defined record type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub deleted: bool,
    pub reviewable: bool,
}

impl Schema {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            deleted: row.get("deleted"),
            reviewable: row.get("reviewable"),
        }
    }
}

/// An attribute is identified by its (name, kind) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub id: i32,
    pub name: String,
    pub kind: AttrKind,
}

impl Attribute {
    pub fn from_row(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: row.get("id"),
            name: row.get("name"),
            kind: parse_kind(row.get("kind"))?,
        })
    }
}

/// Binding of an attribute to a schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrDef {
    pub id: i32,
    #[serde(skip_serializing)]
    pub schema_id: i32,
    pub attribute_id: i32,
    pub name: String,
    pub kind: AttrKind,
    pub required: bool,
    pub unique: bool,
    pub list: bool,
    pub key: bool,
    pub description: Option<String>,
    pub bound_schema_id: Option<i32>,
}

impl AttrDef {
    pub fn from_row(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: row.get("id"),
            schema_id: row.get("schema_id"),
            attribute_id: row.get("attribute_id"),
            name: row.get("name"),
            kind: parse_kind(row.get("kind"))?,
            required: row.get("required"),
            unique: row.get("is_unique"),
            list: row.get("is_list"),
            key: row.get("is_key"),
            description: row.get("description"),
            bound_schema_id: row.get("bound_schema_id"),
        })
    }

    /// The submission that would leave this definition unchanged
    pub fn to_input(&self) -> AttrDefInput {
        AttrDefInput {
            id: Some(self.id),
            name: self.name.clone(),
            kind: self.kind,
            required: self.required,
            unique: self.unique,
            list: self.list,
            key: self.key,
            description: self.description.clone(),
            bound_schema_id: self.bound_schema_id,
        }
    }

    /// Whether a single-valued unique constraint applies
    pub fn enforces_unique(&self) -> bool {
        self.unique && !self.list
    }
}

fn parse_kind(raw: &str) -> Result<AttrKind, AppError> {
    raw.parse().map_err(AppError::Internal)
}

/// Schema with all of its attribute definitions
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDetail {
    #[serde(flatten)]
    pub schema: Schema,
    pub attributes: Vec<AttrDef>,
}

impl SchemaDetail {
    pub fn definition(&self, name: &str) -> Option<&AttrDef> {
        self.attributes.iter().find(|d| d.name == name)
    }
}

/// Submitted attribute definition. `id` is set when it refers to an
/// existing definition of the schema being updated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct AttrDefInput {
    #[serde(default)]
    pub id: Option<i32>,

    #[validate(
        length(min = 1, max = 128, message = "Attribute name must be between 1 and 128 characters"),
        custom(function = "check_attr_name")
    )]
    pub name: String,

    pub kind: AttrKind,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub list: bool,

    #[serde(default)]
    pub key: bool,

    #[validate(length(max = 1024, message = "Description can't exceed 1024 characters"))]
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub bound_schema_id: Option<i32>,
}

impl AttrDefInput {
    /// Flags as they will be stored for a definition on `schema_id`
    pub fn normalized(&self, schema_id: i32) -> AttrDefInput {
        let mut out = self.clone();
        if out.list {
            out.unique = false;
        }
        out.bound_schema_id = match (out.kind, out.bound_schema_id) {
            (AttrKind::Fk, Some(SELF_BINDING)) => Some(schema_id),
            (AttrKind::Fk, bound) => bound,
            _ => None,
        };
        out
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchemaCreate {
    #[validate(length(min = 1, max = 128, message = "Schema name must be between 1 and 128 characters"))]
    pub name: String,

    #[validate(
        length(min = 1, max = 128, message = "Schema slug must be between 1 and 128 characters"),
        custom(function = "check_slug")
    )]
    pub slug: String,

    #[serde(default)]
    pub reviewable: bool,

    #[validate(nested)]
    #[serde(default)]
    pub attributes: Vec<AttrDefInput>,
}

/// Schema update. `attributes` is the complete desired list: entries
/// without an id are added, existing definitions left out are deleted.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SchemaUpdate {
    #[validate(length(min = 1, max = 128, message = "Schema name must be between 1 and 128 characters"))]
    pub name: Option<String>,

    #[validate(custom(function = "check_slug"))]
    pub slug: Option<String>,

    pub reviewable: Option<bool>,

    #[validate(nested)]
    #[serde(default)]
    pub attributes: Vec<AttrDefInput>,
}

fn check_slug(slug: &str) -> Result<(), ValidationError> {
    if is_valid_slug(slug) {
        return Ok(());
    }
    let mut err = ValidationError::new("invalid_slug");
    err.message = Some(format!("`{}` is invalid value for slug field", slug).into());
    Err(err)
}

fn check_attr_name(name: &str) -> Result<(), ValidationError> {
    if is_valid_attr_name(name) {
        return Ok(());
    }
    let mut err = ValidationError::new("invalid_attribute_name");
    err.message = Some(
        "Attribute name must be a valid identifier and must not start/end with underscore".into(),
    );
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fk_input(bound: Option<i32>) -> AttrDefInput {
        AttrDefInput {
            id: None,
            name: "friends".into(),
            kind: AttrKind::Fk,
            required: false,
            unique: true,
            list: true,
            key: false,
            description: None,
            bound_schema_id: bound,
        }
    }

    #[test]
    fn test_normalized_resolves_self_binding() {
        let input = fk_input(Some(SELF_BINDING)).normalized(7);
        assert_eq!(input.bound_schema_id, Some(7));
        assert!(!input.unique);
    }

    #[test]
    fn test_normalized_drops_binding_for_scalars() {
        let mut input = fk_input(Some(3));
        input.kind = AttrKind::Int;
        assert_eq!(input.normalized(7).bound_schema_id, None);
    }

    #[test]
    fn test_schema_create_deserializes_with_defaults() {
        let body: SchemaCreate = serde_json::from_value(json!({
            "name": "Person",
            "slug": "person",
            "attributes": [{"name": "age", "kind": "INT", "required": true}]
        }))
        .unwrap();
        assert!(!body.reviewable);
        assert_eq!(body.attributes[0].kind, AttrKind::Int);
        assert!(body.attributes[0].required);
        assert!(!body.attributes[0].list);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_schema_create_rejects_bad_slug_and_name() {
        let body: SchemaCreate = serde_json::from_value(json!({
            "name": "Person",
            "slug": "1person",
            "attributes": [{"name": "age", "kind": "INT"}]
        }))
        .unwrap();
        let errors = body.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("slug"));

        let body: SchemaCreate = serde_json::from_value(json!({
            "name": "Person",
            "slug": "person",
            "attributes": [{"name": "_age", "kind": "INT"}]
        }))
        .unwrap();
        assert!(body.validate().is_err());
        assert!(check_attr_name("age_").is_err());
        assert!(check_attr_name("first_name").is_ok());
    }
}
