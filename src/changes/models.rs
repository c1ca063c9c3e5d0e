//! Change request data models

use crate::error::AppError;
use crate::registry::{AttrKind, Scalar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Row;

/// Kind of object a change request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    Schema,
    Entity,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Schema => "SCHEMA",
            ObjectType::Entity => "ENTITY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Restore,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
            ChangeType::Restore => "RESTORE",
        }
    }
}

/// Review state; APPROVED and DECLINED are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Declined,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Pending => "PENDING",
            ChangeStatus::Approved => "APPROVED",
            ChangeStatus::Declined => "DECLINED",
        }
    }
}

/// Which kind of row a single change touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Schema,
    Entity,
    AttributeDefinition,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Schema => "SCHEMA",
            ContentType::Entity => "ENTITY",
            ContentType::AttributeDefinition => "ATTRIBUTE_DEFINITION",
        }
    }
}

fn parse_enum<T: Copy>(raw: &str, all: &[T], name: fn(T) -> &'static str) -> Result<T, String> {
    all.iter()
        .copied()
        .find(|v| name(*v) == raw)
        .ok_or_else(|| format!("unknown value `{}`", raw))
}

impl FromStr for ObjectType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_enum(s, &[ObjectType::Schema, ObjectType::Entity], ObjectType::as_str)
    }
}

impl FromStr for ChangeType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_enum(
            s,
            &[
                ChangeType::Create,
                ChangeType::Update,
                ChangeType::Delete,
                ChangeType::Restore,
            ],
            ChangeType::as_str,
        )
    }
}

impl FromStr for ChangeStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_enum(
            s,
            &[
                ChangeStatus::Pending,
                ChangeStatus::Approved,
                ChangeStatus::Declined,
            ],
            ChangeStatus::as_str,
        )
    }
}

impl FromStr for ContentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_enum(
            s,
            &[
                ContentType::Schema,
                ContentType::Entity,
                ContentType::AttributeDefinition,
            ],
            ContentType::as_str,
        )
    }
}

// Lowercase in messages: "There is no entity delete request with id 12"
impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_lowercase())
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_lowercase())
    }
}

fn column<T: FromStr<Err = String>>(row: &Row, name: &str) -> Result<T, AppError> {
    row.get::<_, &str>(name)
        .parse()
        .map_err(|e| AppError::Internal(format!("column `{}`: {}", name, e)))
}

/// A durable, reviewable staged mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRequest {
    pub id: i32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub status: ChangeStatus,
    pub comment: Option<String>,
    pub object_type: ObjectType,
    pub change_type: ChangeType,
    pub object_id: Option<i32>,
}

impl ChangeRequest {
    pub fn from_row(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: row.get("id"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
            reviewed_by: row.get("reviewed_by"),
            reviewed_at: row.get("reviewed_at"),
            status: column(row, "status")?,
            comment: row.get("comment"),
            object_type: column(row, "object_type")?,
            change_type: column(row, "change_type")?,
            object_id: row.get("object_id"),
        })
    }
}

/// One stored field or attribute mutation with its old and new value
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub id: i32,
    pub change_request_id: i32,
    pub object_id: Option<i32>,
    pub attribute_id: Option<i32>,
    pub field_name: Option<String>,
    pub content_type: ContentType,
    pub change_type: ChangeType,
    pub data_kind: AttrKind,
    pub old: Option<Scalar>,
    pub new: Option<Scalar>,
}

impl Change {
    pub fn from_row(row: &Row) -> Result<Self, AppError> {
        let data_kind: AttrKind = row
            .get::<_, &str>("data_kind")
            .parse()
            .map_err(AppError::Internal)?;
        Ok(Self {
            id: row.get("id"),
            change_request_id: row.get("change_request_id"),
            object_id: row.get("object_id"),
            attribute_id: row.get("attribute_id"),
            field_name: row.get("field_name"),
            content_type: column(row, "content_type")?,
            change_type: column(row, "change_type")?,
            data_kind,
            old: data_kind.read(row, "old_value"),
            new: data_kind.read(row, "new_value"),
        })
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.field_name.as_deref() == Some(name)
    }
}

/// A change row about to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub object_id: Option<i32>,
    pub attribute_id: Option<i32>,
    pub field_name: Option<&'static str>,
    pub content_type: ContentType,
    pub change_type: ChangeType,
    pub kind: AttrKind,
    pub old: Option<Scalar>,
    pub new: Option<Scalar>,
}

impl NewChange {
    /// Change of a built-in column
    pub fn field(
        content_type: ContentType,
        change_type: ChangeType,
        name: &'static str,
        kind: AttrKind,
        old: Option<Scalar>,
        new: Option<Scalar>,
    ) -> Self {
        Self {
            object_id: None,
            attribute_id: None,
            field_name: Some(name),
            content_type,
            change_type,
            kind,
            old,
            new,
        }
    }

    /// Change of one entity attribute value
    pub fn attribute(
        change_type: ChangeType,
        attribute_id: i32,
        kind: AttrKind,
        old: Option<Scalar>,
        new: Option<Scalar>,
    ) -> Self {
        Self {
            object_id: None,
            attribute_id: Some(attribute_id),
            field_name: None,
            content_type: ContentType::Entity,
            change_type,
            kind,
            old,
            new,
        }
    }

    pub fn on(mut self, object_id: Option<i32>) -> Self {
        self.object_id = object_id;
        self
    }
}

/// Outcome of a mutation: applied right away, or waiting for review
#[derive(Debug)]
pub enum Submitted<T> {
    Applied(T),
    Pending(ChangeRequest),
}
