//! Service information

use crate::query::{describe_filters, FilterInfo};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct InfoResponse {
    pub version: &'static str,
    pub filters: FilterInfo,
}

/// Filter operators and the operators each kind supports
pub async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        filters: describe_filters(),
    })
}
