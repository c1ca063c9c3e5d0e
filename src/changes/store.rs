//! Change request persistence
//!
//! Requests live in `change_requests`; every change row in `changes` points at
//! a row of the change-value table of its data kind holding the old/new pair.

use super::models::{
    Change, ChangeRequest, ChangeStatus, ChangeType, ContentType, NewChange, ObjectType,
};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::models::{Page, PageParams};
use crate::registry::{AttrKind, Scalar};
use postgres_types::ToSql;
use serde::Deserialize;
use tokio_postgres::Transaction;

const REQUEST_COLUMNS: &str = "id, created_by, created_at, reviewed_by, reviewed_at, status, \
                               comment, object_type, change_type, object_id";

const INSERT_REQUEST: &str = r#"
    INSERT INTO change_requests (created_by, created_at, status, object_type, change_type, object_id)
    VALUES ($1, $2, 'PENDING', $3, $4, $5)
    RETURNING id, created_by, created_at, reviewed_by, reviewed_at, status,
              comment, object_type, change_type, object_id
"#;

const INSERT_CHANGE: &str = r#"
    INSERT INTO changes
        (change_request_id, object_id, attribute_id, field_name, content_type,
         change_type, data_kind, value_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const MARK_REVIEWED: &str = r#"
    UPDATE change_requests
    SET status = $2, reviewed_by = $3, reviewed_at = $4, comment = $5
    WHERE id = $1
    RETURNING id, created_by, created_at, reviewed_by, reviewed_at, status,
              comment, object_type, change_type, object_id
"#;

const REQUEST_FILTER: &str = r#"
    WHERE ($1::varchar IS NULL OR status = $1)
      AND ($2::varchar IS NULL OR object_type = $2)
      AND ($3::int IS NULL OR object_id = $3)
"#;

fn value_param(kind: AttrKind, value: &Option<Scalar>) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Some(v) => v.clone().into_sql(),
        None => kind.null_param(),
    }
}

pub async fn insert_request(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    object_type: ObjectType,
    change_type: ChangeType,
    object_id: Option<i32>,
) -> Result<ChangeRequest, AppError> {
    let row = tx
        .query_one(
            INSERT_REQUEST,
            &[
                &ctx.actor.name,
                &ctx.now(),
                &object_type.as_str(),
                &change_type.as_str(),
                &object_id,
            ],
        )
        .await?;
    ChangeRequest::from_row(&row)
}

/// Write the change rows of one request together with their value pairs
pub async fn insert_changes(
    tx: &Transaction<'_>,
    request_id: i32,
    changes: &[NewChange],
) -> Result<(), AppError> {
    let insert = tx.prepare(INSERT_CHANGE).await?;
    for change in changes {
        let sql = format!(
            "INSERT INTO {} (old_value, new_value) VALUES ($1, $2) RETURNING id",
            change.kind.change_table()
        );
        let old = value_param(change.kind, &change.old);
        let new = value_param(change.kind, &change.new);
        let pair: [&(dyn ToSql + Sync); 2] = [&*old, &*new];
        let value_id: i32 = tx.query_one(&sql, &pair).await?.get(0);

        tx.execute(
            &insert,
            &[
                &request_id,
                &change.object_id,
                &change.attribute_id,
                &change.field_name,
                &change.content_type.as_str(),
                &change.change_type.as_str(),
                &change.kind.as_str(),
                &value_id,
            ],
        )
        .await?;
    }
    Ok(())
}

pub async fn get_request(tx: &Transaction<'_>, id: i32) -> Result<ChangeRequest, AppError> {
    let sql = format!("SELECT {} FROM change_requests WHERE id = $1", REQUEST_COLUMNS);
    let row = tx
        .query_opt(&sql, &[&id])
        .await?
        .ok_or(AppError::MissingRequest(id))?;
    ChangeRequest::from_row(&row)
}

/// Pending request of exactly this object and change type
pub async fn load_pending(
    tx: &Transaction<'_>,
    id: i32,
    object_type: ObjectType,
    change_type: ChangeType,
) -> Result<ChangeRequest, AppError> {
    let sql = format!(
        "SELECT {} FROM change_requests
         WHERE id = $1 AND status = 'PENDING' AND object_type = $2 AND change_type = $3
         FOR UPDATE",
        REQUEST_COLUMNS
    );
    let row = tx
        .query_opt(&sql, &[&id, &object_type.as_str(), &change_type.as_str()])
        .await?
        .ok_or(AppError::MissingChangeRequest {
            object_type,
            change_type,
            id,
        })?;
    ChangeRequest::from_row(&row)
}

/// Change rows of a request in staging order
pub async fn load_changes(tx: &Transaction<'_>, request_id: i32) -> Result<Vec<Change>, AppError> {
    let kinds = tx
        .query(
            "SELECT DISTINCT data_kind FROM changes WHERE change_request_id = $1",
            &[&request_id],
        )
        .await?;

    let mut changes = Vec::new();
    for row in kinds {
        let kind: AttrKind = row
            .get::<_, &str>("data_kind")
            .parse()
            .map_err(AppError::Internal)?;
        let sql = format!(
            "SELECT c.id, c.change_request_id, c.object_id, c.attribute_id, c.field_name,
                    c.content_type, c.change_type, c.data_kind, v.old_value, v.new_value
             FROM changes c
             JOIN {} v ON v.id = c.value_id
             WHERE c.change_request_id = $1 AND c.data_kind = $2",
            kind.change_table()
        );
        for row in tx.query(&sql, &[&request_id, &kind.as_str()]).await? {
            changes.push(Change::from_row(&row)?);
        }
    }
    changes.sort_by_key(|c| c.id);
    Ok(changes)
}

pub async fn mark_reviewed(
    tx: &Transaction<'_>,
    ctx: &RequestContext,
    id: i32,
    status: ChangeStatus,
    comment: Option<&str>,
) -> Result<ChangeRequest, AppError> {
    let row = tx
        .query_one(
            MARK_REVIEWED,
            &[&id, &status.as_str(), &ctx.actor.name, &ctx.now(), &comment],
        )
        .await?;
    ChangeRequest::from_row(&row)
}

/// Point a request created before its object existed at the new row
pub async fn set_object_id(
    tx: &Transaction<'_>,
    request_id: i32,
    content_type: ContentType,
    object_id: i32,
) -> Result<(), AppError> {
    tx.execute(
        "UPDATE change_requests SET object_id = $2 WHERE id = $1",
        &[&request_id, &object_id],
    )
    .await?;
    tx.execute(
        "UPDATE changes SET object_id = $3 WHERE change_request_id = $1 AND content_type = $2",
        &[&request_id, &content_type.as_str(), &object_id],
    )
    .await?;
    Ok(())
}

/// Point the definition rows of a schema CREATE at the definitions it created
pub async fn set_definition_ids(
    tx: &Transaction<'_>,
    request_id: i32,
    schema_id: i32,
) -> Result<u64, AppError> {
    Ok(tx
        .execute(
            "UPDATE changes c SET object_id = d.id
             FROM attr_definitions d
             WHERE c.change_request_id = $1
               AND c.content_type = 'ATTRIBUTE_DEFINITION'
               AND d.schema_id = $2
               AND d.attribute_id = c.attribute_id",
            &[&request_id, &schema_id],
        )
        .await?)
}

/// Filters of the request listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub status: Option<ChangeStatus>,
    pub object_type: Option<ObjectType>,
    pub object_id: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Requests matching `filter`, newest first
pub async fn list_requests(
    tx: &Transaction<'_>,
    filter: &RequestFilter,
    default_limit: i64,
    max_limit: i64,
) -> Result<Page<ChangeRequest>, AppError> {
    let status = filter.status.map(ChangeStatus::as_str);
    let object_type = filter.object_type.map(ObjectType::as_str);
    let (limit, offset) = PageParams {
        limit: filter.limit,
        offset: filter.offset,
    }
    .window(default_limit, max_limit);

    let count_sql = format!("SELECT count(*) FROM change_requests {}", REQUEST_FILTER);
    let total: i64 = tx
        .query_one(&count_sql, &[&status, &object_type, &filter.object_id])
        .await?
        .get(0);

    let page_sql = format!(
        "SELECT {} FROM change_requests {} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5",
        REQUEST_COLUMNS, REQUEST_FILTER
    );
    let rows = tx
        .query(
            &page_sql,
            &[&status, &object_type, &filter.object_id, &limit, &offset],
        )
        .await?;
    let items = rows
        .iter()
        .map(ChangeRequest::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page { total, items })
}

pub async fn count_pending(tx: &Transaction<'_>) -> Result<i64, AppError> {
    Ok(tx
        .query_one(
            "SELECT count(*) FROM change_requests WHERE status = 'PENDING'",
            &[],
        )
        .await?
        .get(0))
}

/// Most recent requests about one object
pub async fn history(
    tx: &Transaction<'_>,
    object_type: ObjectType,
    object_id: i32,
    limit: i64,
) -> Result<Vec<ChangeRequest>, AppError> {
    let sql = format!(
        "SELECT {} FROM change_requests
         WHERE object_type = $1 AND object_id = $2
         ORDER BY created_at DESC, id DESC
         LIMIT $3",
        REQUEST_COLUMNS
    );
    let rows = tx
        .query(&sql, &[&object_type.as_str(), &object_id, &limit])
        .await?;
    rows.iter().map(ChangeRequest::from_row).collect()
}
