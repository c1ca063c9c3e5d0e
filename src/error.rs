//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use crate::changes::{ChangeType, ObjectType};
use crate::models::IdOrSlug;
use crate::registry::AttrKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use tracing::error;

/// Coarse classification of every application error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Authorization,
    Internal,
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    // ---- not found ----
    #[error("Schema with id or slug `{0}` doesn't exist or was deleted")]
    MissingSchema(IdOrSlug),

    #[error("Entity with id or slug `{0}` doesn't exist or was deleted")]
    MissingEntity(IdOrSlug),

    #[error("Attribute with id {0} doesn't exist")]
    MissingAttribute(i32),

    #[error("There is no {object_type} {change_type} request with id {id}")]
    MissingChangeRequest {
        object_type: ObjectType,
        change_type: ChangeType,
        id: i32,
    },

    #[error("There is no change request with id {0}")]
    MissingRequest(i32),

    #[error("Attribute `{attr}` is not defined on schema ({schema_id})")]
    AttributeNotDefined { attr: String, schema_id: i32 },

    // ---- conflicts ----
    #[error("Schema with name `{name}` or slug `{slug}` already exists")]
    SchemaExists { name: String, slug: String },

    #[error("Entity with slug `{0}` already exists in this schema")]
    EntityExists(String),

    #[error("Got non-unique value for field `{attr}` on schema ({schema_id}): {value}")]
    UniqueValue {
        attr: String,
        schema_id: i32,
        value: String,
    },

    #[error("Attribute `{attr}` is already defined on schema ({schema_id})")]
    AttributeAlreadyDefined { attr: String, schema_id: i32 },

    #[error("Found multiple occurrences of attribute `{0}`")]
    MultipleAttributeOccurrences(String),

    #[error("Attribute definition with id {0} is listed, can't make unlisted")]
    ListedToUnlisted(i32),

    #[error("No changes were made: {0}")]
    NoOpChange(String),

    #[error("Field `{field}` was changed after the request was staged")]
    StaleChange { field: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // ---- validation ----
    #[error("Attribute `{attr}` on schema ({schema_id}) can't hold multiple values")]
    NotListed { attr: String, schema_id: i32 },

    #[error(
        "Attribute `{attr}` defined on schema ({schema_id}) is bound to schema ({bound_schema_id}); \
         got instead entity ({entity_id}) from schema ({entity_schema_id})"
    )]
    WrongSchemaBinding {
        attr: String,
        schema_id: i32,
        bound_schema_id: i32,
        entity_id: i32,
        entity_schema_id: i32,
    },

    #[error("You must bind attribute `{0}` to some schema")]
    NoSchemaToBind(String),

    #[error("Missing required field: {0}")]
    RequiredField(String),

    #[error("Can't use name `{name}`. Reserved names: {}", reserved.join(", "))]
    ReservedName {
        name: String,
        reserved: Vec<&'static str>,
    },

    #[error("Can't convert value for `{attr}` to {kind}: {message}")]
    ValueCast {
        attr: String,
        kind: AttrKind,
        message: String,
    },

    #[error("`{op}` is invalid filter for attribute `{attr}`")]
    InvalidFilterOperator { attr: String, op: String },

    #[error("Can't filter current schema by attribute `{attr}`. Allowed attributes: {}", allowed.join(", "))]
    InvalidFilterAttribute { attr: String, allowed: Vec<String> },

    #[error("Requested entity ({entity}) doesn't belong to specified schema ({schema_id})")]
    MismatchingSchema { entity: IdOrSlug, schema_id: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    // ---- authorization ----
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ---- internal ----
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingSchema(_)
            | AppError::MissingEntity(_)
            | AppError::MissingAttribute(_)
            | AppError::MissingChangeRequest { .. }
            | AppError::MissingRequest(_)
            | AppError::AttributeNotDefined { .. } => ErrorKind::NotFound,

            AppError::SchemaExists { .. }
            | AppError::EntityExists(_)
            | AppError::UniqueValue { .. }
            | AppError::AttributeAlreadyDefined { .. }
            | AppError::MultipleAttributeOccurrences(_)
            | AppError::ListedToUnlisted(_)
            | AppError::NoOpChange(_)
            | AppError::StaleChange { .. }
            | AppError::Conflict(_) => ErrorKind::Conflict,

            AppError::NotListed { .. }
            | AppError::WrongSchemaBinding { .. }
            | AppError::NoSchemaToBind(_)
            | AppError::RequiredField(_)
            | AppError::ReservedName { .. }
            | AppError::ValueCast { .. }
            | AppError::InvalidFilterOperator { .. }
            | AppError::InvalidFilterAttribute { .. }
            | AppError::MismatchingSchema { .. }
            | AppError::Validation(_) => ErrorKind::Validation,

            AppError::Unauthorized(_) | AppError::Forbidden(_) => ErrorKind::Authorization,

            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Internal(_)
            | AppError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Pool(_) => "POOL_EXHAUSTED",
            AppError::MissingSchema(_) => "MISSING_SCHEMA",
            AppError::MissingEntity(_) => "MISSING_ENTITY",
            AppError::MissingAttribute(_) => "MISSING_ATTRIBUTE",
            AppError::MissingChangeRequest { .. } => "MISSING_CHANGE_REQUEST",
            AppError::MissingRequest(_) => "MISSING_CHANGE_REQUEST",
            AppError::AttributeNotDefined { .. } => "ATTRIBUTE_NOT_DEFINED",
            AppError::SchemaExists { .. } | AppError::EntityExists(_) => "ALREADY_EXISTS",
            AppError::UniqueValue { .. } => "UNIQUE_VALUE",
            AppError::AttributeAlreadyDefined { .. } => "ATTRIBUTE_ALREADY_DEFINED",
            AppError::MultipleAttributeOccurrences(_) => "MULTIPLE_ATTRIBUTE_OCCURRENCES",
            AppError::ListedToUnlisted(_) => "LISTED_TO_UNLISTED",
            AppError::NoOpChange(_) => "NO_OP_CHANGE",
            AppError::StaleChange { .. } => "STALE_CHANGE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotListed { .. } => "NOT_LISTED",
            AppError::WrongSchemaBinding { .. } => "WRONG_SCHEMA_BINDING",
            AppError::NoSchemaToBind(_) => "NO_SCHEMA_TO_BIND",
            AppError::RequiredField(_) => "REQUIRED_FIELD",
            AppError::ReservedName { .. } => "RESERVED_NAME",
            AppError::ValueCast { .. } => "VALUE_CAST",
            AppError::InvalidFilterOperator { .. } => "INVALID_FILTER_OPERATOR",
            AppError::InvalidFilterAttribute { .. } => "INVALID_FILTER_ATTRIBUTE",
            AppError::MismatchingSchema { .. } => "MISMATCHING_SCHEMA",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        if matches!(self, AppError::NoOpChange(_)) {
            return StatusCode::ALREADY_REPORTED;
        }
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Authorization => match self {
                AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::FORBIDDEN,
            },
            ErrorKind::Internal => match self {
                AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<tokio_postgres::Error> for AppError {
    /// Constraint violations raised by a racing transaction surface as the same
    /// kinds as the pre-checked failures.
    fn from(e: tokio_postgres::Error) -> Self {
        let Some(db) = e.as_db_error() else {
            return AppError::Database(e);
        };
        let detail = db.detail().unwrap_or(db.message()).to_string();
        match db.code() {
            c if *c == SqlState::UNIQUE_VIOLATION => AppError::Conflict(format!(
                "{} already exists ({})",
                detail,
                db.constraint().unwrap_or("unique constraint")
            )),
            c if *c == SqlState::FOREIGN_KEY_VIOLATION => AppError::Conflict(format!(
                "Referenced row is missing: {}",
                detail
            )),
            c if *c == SqlState::INVALID_REGULAR_EXPRESSION => {
                AppError::Validation(format!("Invalid regular expression: {}", db.message()))
            }
            c if *c == SqlState::INVALID_TEXT_REPRESENTATION
                || *c == SqlState::STRING_DATA_RIGHT_TRUNCATION
                || *c == SqlState::NUMERIC_VALUE_OUT_OF_RANGE
                || *c == SqlState::DATETIME_FIELD_OVERFLOW =>
            {
                AppError::Validation(db.message().to_string())
            }
            _ => AppError::Database(e),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                ("A database error occurred".to_string(), Some(e.to_string()))
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), Some(msg.clone()))
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            other => (other.to_string(), None),
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(self.code().to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_statuses() {
        let err = AppError::MissingEntity(IdOrSlug::Id(7));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = AppError::UniqueValue {
            attr: "nickname".into(),
            schema_id: 1,
            value: "jack".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = AppError::RequiredField("age".into());
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(
            AppError::Forbidden("nope".into()).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_no_op_is_already_reported() {
        let err = AppError::NoOpChange("nothing to update".into());
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.status(), StatusCode::ALREADY_REPORTED);
    }

    #[test]
    fn test_missing_request_names_combination() {
        let err = AppError::MissingChangeRequest {
            object_type: ObjectType::Entity,
            change_type: ChangeType::Delete,
            id: 12,
        };
        assert_eq!(
            err.to_string(),
            "There is no entity delete request with id 12"
        );
    }

    #[test]
    fn test_wrong_binding_names_both_schemas() {
        let err = AppError::WrongSchemaBinding {
            attr: "friend".into(),
            schema_id: 1,
            bound_schema_id: 1,
            entity_id: 9,
            entity_schema_id: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("bound to schema (1)"));
        assert!(msg.contains("entity (9) from schema (2)"));
    }
}
