//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the record types of the registry and the request/response
//! structures used by the API.

pub mod entity;
pub mod schema;

pub use entity::*;
pub use schema::*;

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Schemas and entities are addressed either by numeric id or by slug
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrSlug {
    Id(i32),
    Slug(String),
}

impl FromStr for IdOrSlug {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i32>() {
            Ok(id) => IdOrSlug::Id(id),
            Err(_) => IdOrSlug::Slug(s.to_string()),
        })
    }
}

impl From<&str> for IdOrSlug {
    fn from(s: &str) -> Self {
        match s.parse::<i32>() {
            Ok(id) => IdOrSlug::Id(id),
            Err(_) => IdOrSlug::Slug(s.to_string()),
        }
    }
}

impl From<i32> for IdOrSlug {
    fn from(id: i32) -> Self {
        IdOrSlug::Id(id)
    }
}

impl fmt::Display for IdOrSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdOrSlug::Id(id) => write!(f, "{}", id),
            IdOrSlug::Slug(slug) => f.write_str(slug),
        }
    }
}

/// Pagination parameters shared by list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    /// Clamps the requested window to `[1, max]`, defaulting to `default`
    pub fn window(&self, default: i64, max: i64) -> (i64, i64) {
        let limit = self.limit.unwrap_or(default).clamp(1, max);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// A page of results with the total count of matching rows
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub total: i64,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_or_slug_parsing() {
        assert_eq!(IdOrSlug::from("42"), IdOrSlug::Id(42));
        assert_eq!(IdOrSlug::from("person"), IdOrSlug::Slug("person".into()));
        assert_eq!(IdOrSlug::from("-1"), IdOrSlug::Id(-1));
        assert_eq!(IdOrSlug::from("person-2").to_string(), "person-2");
    }

    #[test]
    fn test_page_window_is_clamped() {
        let params = PageParams {
            limit: Some(5000),
            offset: Some(-3),
        };
        assert_eq!(params.window(10, 1000), (1000, 0));

        let params = PageParams {
            limit: None,
            offset: Some(20),
        };
        assert_eq!(params.window(10, 1000), (10, 20));
    }
}
