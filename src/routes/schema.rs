//! Schema and attribute route handlers

use super::submitted;
use crate::auth::Actor;
use crate::changes;
use crate::db;
use crate::error::{validation_error, ApiResult};
use crate::models::{Attribute, IdOrSlug, Schema, SchemaCreate, SchemaDetail, SchemaUpdate, SuccessResponse};
use crate::state::SharedState;
use crate::store;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use tracing::debug;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct SchemaListQuery {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub deleted_only: bool,
}

pub async fn list_attributes(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<Attribute>>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let attributes = store::list_attributes(&tx).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Found {} attribute(s).", attributes.len()),
        attributes,
    )))
}

pub async fn get_attribute(
    State(state): State<SharedState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SuccessResponse<Attribute>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let attribute = store::get_attribute(&tx, id).await?;
    Ok(Json(SuccessResponse::with_data("Attribute found.", attribute)))
}

pub async fn list_schemas(
    State(state): State<SharedState>,
    Query(query): Query<SchemaListQuery>,
) -> ApiResult<Json<SuccessResponse<Vec<Schema>>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let schemas = store::list_schemas(&tx, query.all, query.deleted_only).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Found {} schema(s).", schemas.len()),
        schemas,
    )))
}

pub async fn get_schema(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> ApiResult<Json<SuccessResponse<SchemaDetail>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let schema = store::get_schema(&tx, &IdOrSlug::from(key.as_str())).await?;
    Ok(Json(SuccessResponse::with_data("Schema found.", schema)))
}

/// Schemas are created at once; there is nobody to review a new schema
pub async fn create_schema(
    State(state): State<SharedState>,
    actor: Actor,
    Json(payload): Json<SchemaCreate>,
) -> ApiResult<Json<SuccessResponse<SchemaDetail>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    debug!(slug = %payload.slug, actor = %actor.name, "creating schema");

    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let schema = changes::schema::create(&mut tx, &ctx, &payload).await?;
    tx.commit().await?;

    Ok(Json(SuccessResponse::with_data(
        "Schema created successfully.",
        schema,
    )))
}

pub async fn update_schema(
    State(state): State<SharedState>,
    actor: Actor,
    Path(key): Path<String>,
    Json(payload): Json<SchemaUpdate>,
) -> ApiResult<Response> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome =
        changes::schema::update(&mut tx, &ctx, &IdOrSlug::from(key.as_str()), &payload).await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Schema updated successfully."))
}

pub async fn delete_schema(
    State(state): State<SharedState>,
    actor: Actor,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome = changes::schema::delete(&mut tx, &ctx, &IdOrSlug::from(key.as_str())).await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Schema deleted successfully."))
}

pub async fn restore_schema(
    State(state): State<SharedState>,
    actor: Actor,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome = changes::schema::restore(&mut tx, &ctx, &IdOrSlug::from(key.as_str())).await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Schema restored successfully."))
}
