//! Approving and declining pending requests

use super::models::{ChangeRequest, ChangeStatus, ChangeType, ObjectType};
use super::{entity, schema, store as requests};
use crate::auth::{PermissionKind, Target};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::models::{Entity, SchemaDetail};
use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use tracing::info;

/// Object produced by applying a request
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Applied {
    Schema(SchemaDetail),
    Entity(Entity),
}

/// Reviewer's verdict on a request
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDecision {
    pub object_type: ObjectType,
    pub change_type: ChangeType,
    pub result: ChangeStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

/// The author of a request can't approve it unless self review is enabled
fn check_reviewer(ctx: &RequestContext, request: &ChangeRequest) -> Result<(), AppError> {
    if request.created_by == ctx.actor.name && !ctx.config.allow_self_review {
        return Err(AppError::Forbidden(format!(
            "{} can't approve their own change request ({})",
            ctx.actor.name, request.id
        )));
    }
    Ok(())
}

pub async fn approve(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    id: i32,
    object_type: ObjectType,
    change_type: ChangeType,
    comment: Option<&str>,
) -> Result<Applied, AppError> {
    let request = requests::load_pending(tx, id, object_type, change_type).await?;
    check_reviewer(ctx, &request)?;
    match object_type {
        ObjectType::Entity => entity::apply(tx, ctx, id, change_type, comment)
            .await
            .map(Applied::Entity),
        ObjectType::Schema => schema::apply(tx, ctx, id, change_type, comment)
            .await
            .map(Applied::Schema),
    }
}

/// Flip a pending request to DECLINED; nothing is applied
pub async fn decline(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    id: i32,
    object_type: ObjectType,
    change_type: ChangeType,
    comment: Option<&str>,
) -> Result<ChangeRequest, AppError> {
    let request = requests::load_pending(tx, id, object_type, change_type).await?;
    match object_type {
        ObjectType::Entity => ctx.authorize(
            PermissionKind::UpdateEntity,
            request.object_id.map(Target::Entity),
        )?,
        ObjectType::Schema => ctx.authorize(
            PermissionKind::UpdateSchema,
            request.object_id.map(Target::Schema),
        )?,
    }
    let request = requests::mark_reviewed(tx, ctx, id, ChangeStatus::Declined, comment).await?;
    info!(request_id = id, object = %object_type, change = %change_type, "request declined");
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Actor, AllowAll, Role};
    use crate::config::ChangeConfig;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn request_by(author: &str) -> ChangeRequest {
        ChangeRequest {
            id: 4,
            created_by: author.into(),
            created_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
            status: ChangeStatus::Pending,
            comment: None,
            object_type: ObjectType::Entity,
            change_type: ChangeType::Update,
            object_id: Some(9),
        }
    }

    #[test]
    fn test_author_cannot_approve() {
        let mut ctx = RequestContext::new(
            Actor::new("dev", Role::Developer),
            ChangeConfig::default(),
            Arc::new(AllowAll),
        );
        assert!(matches!(
            check_reviewer(&ctx, &request_by("dev")),
            Err(AppError::Forbidden(_))
        ));
        assert!(check_reviewer(&ctx, &request_by("someone")).is_ok());

        ctx.config.allow_self_review = true;
        assert!(check_reviewer(&ctx, &request_by("dev")).is_ok());
    }

    #[test]
    fn test_review_decision_from_json() {
        let decision: ReviewDecision = serde_json::from_value(json!({
            "object_type": "ENTITY",
            "change_type": "DELETE",
            "result": "DECLINED"
        }))
        .unwrap();
        assert_eq!(decision.object_type, ObjectType::Entity);
        assert_eq!(decision.change_type, ChangeType::Delete);
        assert_eq!(decision.result, ChangeStatus::Declined);
        assert_eq!(decision.comment, None);
    }
}
