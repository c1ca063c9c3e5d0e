//! Change request route handlers

use crate::auth::Actor;
use crate::changes::{
    self, ChangeDetail, ChangeRequest, ChangeStatus, ObjectType, RequestFilter, ReviewDecision,
};
use crate::db;
use crate::error::{validation_error, ApiResult};
use crate::models::{Page, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

/// Requests shown in the per-object history
const HISTORY_LIMIT: i64 = 20;

#[derive(Serialize)]
pub struct PendingCount {
    pub pending: i64,
}

pub async fn list_requests(
    State(state): State<SharedState>,
    Query(filter): Query<RequestFilter>,
) -> ApiResult<Json<SuccessResponse<Page<ChangeRequest>>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let page = changes::list_requests(
        &tx,
        &filter,
        state.settings.query.default_limit,
        state.settings.query.max_limit,
    )
    .await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Found {} change request(s).", page.total),
        page,
    )))
}

pub async fn count_pending(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<PendingCount>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let pending = changes::count_pending(&tx).await?;
    Ok(Json(SuccessResponse::with_data(
        "Pending change requests counted.",
        PendingCount { pending },
    )))
}

pub async fn get_details(
    State(state): State<SharedState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SuccessResponse<ChangeDetail>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let details = changes::change_details(&tx, id).await?;
    Ok(Json(SuccessResponse::with_data("Change request found.", details)))
}

/// Approve or decline a pending request
pub async fn review(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(decision): Json<ReviewDecision>,
) -> ApiResult<Response> {
    let ctx = state.context(actor);
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let comment = decision.comment.as_deref();

    let response = match decision.result {
        ChangeStatus::Approved => {
            let applied = changes::approve(
                &tx,
                &ctx,
                id,
                decision.object_type,
                decision.change_type,
                comment,
            )
            .await?;
            Json(SuccessResponse::with_data("Change request approved.", applied)).into_response()
        }
        ChangeStatus::Declined => {
            let request = changes::decline(
                &tx,
                &ctx,
                id,
                decision.object_type,
                decision.change_type,
                comment,
            )
            .await?;
            Json(SuccessResponse::with_data("Change request declined.", request)).into_response()
        }
        ChangeStatus::Pending => {
            return Err(validation_error("A review must approve or decline the request"))
        }
    };
    tx.commit().await?;

    info!(request_id = id, result = ?decision.result, "change request reviewed");
    Ok(response)
}

async fn history(
    state: &SharedState,
    object_type: ObjectType,
    id: i32,
) -> ApiResult<Json<SuccessResponse<Vec<ChangeRequest>>>> {
    let mut client = state.db_pool.get().await?;
    let tx = db::begin(&mut client).await?;
    let requests = changes::history(&tx, object_type, id, HISTORY_LIMIT).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Found {} change request(s).", requests.len()),
        requests,
    )))
}

pub async fn entity_history(
    State(state): State<SharedState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SuccessResponse<Vec<ChangeRequest>>>> {
    history(&state, ObjectType::Entity, id).await
}

pub async fn schema_history(
    State(state): State<SharedState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SuccessResponse<Vec<ChangeRequest>>>> {
    history(&state, ObjectType::Schema, id).await
}
