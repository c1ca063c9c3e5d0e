//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod changes;
mod entity;
mod info;
mod schema;

use crate::auth::authenticate;
use crate::changes::Submitted;
use crate::config::Settings;
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    http::{header, Method, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info::info))
        // Attribute catalogue
        .route("/attributes", get(schema::list_attributes))
        .route("/attributes/{id}", get(schema::get_attribute))
        // Schemas
        .route("/schema", get(schema::list_schemas).post(schema::create_schema))
        .route(
            "/schema/{id_or_slug}",
            get(schema::get_schema)
                .put(schema::update_schema)
                .delete(schema::delete_schema),
        )
        .route("/schema/{id_or_slug}/restore", post(schema::restore_schema))
        // Entities
        .route(
            "/entity/{schema}",
            get(entity::list_entities).post(entity::create_entity),
        )
        .route(
            "/entity/{schema}/{id_or_slug}",
            get(entity::get_entity)
                .put(entity::update_entity)
                .delete(entity::delete_entity),
        )
        .route(
            "/entity/{schema}/{id_or_slug}/restore",
            post(entity::restore_entity),
        )
        // Change requests
        .route("/changes", get(changes::list_requests))
        .route("/changes/count", get(changes::count_pending))
        .route("/changes/{id}", get(changes::get_details))
        .route("/changes/{id}/review", post(changes::review))
        .route("/changes/entity/{id}", get(changes::entity_history))
        .route("/changes/schema/{id}", get(changes::schema_history))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    }
}

/// 200 with the applied object, or 202 with the request left for review
fn submitted<T: Serialize>(outcome: Submitted<T>, message: &str) -> Response {
    match outcome {
        Submitted::Applied(object) => (
            StatusCode::OK,
            Json(SuccessResponse::with_data(message, object)),
        )
            .into_response(),
        Submitted::Pending(request) => (
            StatusCode::ACCEPTED,
            Json(SuccessResponse::with_data(
                "Change request is waiting for review.",
                request,
            )),
        )
            .into_response(),
    }
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeRequest, ChangeStatus, ChangeType, ObjectType};
    use chrono::Utc;

    #[test]
    fn test_health_check_reports_version() {
        let Json(body) = tokio_test::block_on(health_check());
        assert_eq!(body["success"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_submitted_status_codes() {
        let applied = submitted(Submitted::Applied(serde_json::json!({"id": 1})), "done");
        assert_eq!(applied.status(), StatusCode::OK);

        let request = ChangeRequest {
            id: 7,
            created_by: "tester".into(),
            created_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
            status: ChangeStatus::Pending,
            comment: None,
            object_type: ObjectType::Entity,
            change_type: ChangeType::Update,
            object_id: Some(3),
        };
        let pending = submitted(Submitted::<serde_json::Value>::Pending(request), "done");
        assert_eq!(pending.status(), StatusCode::ACCEPTED);
    }
}
