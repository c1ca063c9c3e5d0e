//! Entity route handlers
//!
//! Entities are exchanged as plain JSON objects keyed by attribute name and
//! checked against the schema's definitions by the store.

use super::submitted;
use crate::auth::Actor;
use crate::changes;
use crate::db;
use crate::error::ApiResult;
use crate::models::{Entity, EntityData, EntityPage, IdOrSlug, SuccessResponse};
use crate::query::{self, EntityQuery};
use crate::state::SharedState;
use crate::store;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use tracing::debug;

/// List entities; every query key other than the paging and ordering
/// controls is an `attribute.operator` filter
pub async fn list_entities(
    State(state): State<SharedState>,
    Path(schema): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<SuccessResponse<EntityPage>>> {
    let query = EntityQuery::from_params(params, &state.settings.query)?;
    debug!(schema = %schema, filters = query.filters.len(), "listing entities");

    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let page = query::list_entities(&tx, &IdOrSlug::from(schema.as_str()), &query).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Found {} entities.", page.total),
        page,
    )))
}

pub async fn get_entity(
    State(state): State<SharedState>,
    Path((schema, key)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse<Entity>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let entity = store::get_entity(
        &tx,
        &IdOrSlug::from(schema.as_str()),
        &IdOrSlug::from(key.as_str()),
    )
    .await?;
    Ok(Json(SuccessResponse::with_data("Entity found.", entity)))
}

pub async fn create_entity(
    State(state): State<SharedState>,
    actor: Actor,
    Path(schema): Path<String>,
    Json(payload): Json<EntityData>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome =
        changes::entity::create(&mut tx, &ctx, &IdOrSlug::from(schema.as_str()), &payload).await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Entity created successfully."))
}

pub async fn update_entity(
    State(state): State<SharedState>,
    actor: Actor,
    Path((schema, key)): Path<(String, String)>,
    Json(payload): Json<EntityData>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome = changes::entity::update(
        &mut tx,
        &ctx,
        &IdOrSlug::from(schema.as_str()),
        &IdOrSlug::from(key.as_str()),
        &payload,
    )
    .await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Entity updated successfully."))
}

pub async fn delete_entity(
    State(state): State<SharedState>,
    actor: Actor,
    Path((schema, key)): Path<(String, String)>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome = changes::entity::delete(
        &mut tx,
        &ctx,
        &IdOrSlug::from(schema.as_str()),
        &IdOrSlug::from(key.as_str()),
    )
    .await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Entity deleted successfully."))
}

pub async fn restore_entity(
    State(state): State<SharedState>,
    actor: Actor,
    Path((schema, key)): Path<(String, String)>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let mut tx = db::begin(&mut client).await?;
    let outcome = changes::entity::restore(
        &mut tx,
        &ctx,
        &IdOrSlug::from(schema.as_str()),
        &IdOrSlug::from(key.as_str()),
    )
    .await?;
    tx.commit().await?;

    Ok(submitted(outcome, "Entity restored successfully."))
}
