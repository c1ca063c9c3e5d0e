//! Filter/query engine for entity listings

pub mod filter;
pub mod plan;

use crate::config::QueryConfig;
use crate::error::AppError;
use crate::models::{AttrDef, Entity, EntityPage, IdOrSlug};
use crate::registry::{AttrKind, FilterOp};
use crate::store::{self, values};
use plan::{OrderKey, Visibility, Window};
use postgres_types::ToSql;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_postgres::Transaction;
use tracing::debug;

/// Listing parameters read before filter terms; attributes can't use these names
pub const CONTROL_KEYS: [&str; 7] = [
    "limit",
    "offset",
    "order_by",
    "ascending",
    "all",
    "deleted_only",
    "all_fields",
];

#[derive(Debug, Clone)]
pub struct EntityQuery {
    pub filters: Vec<(String, String)>,
    pub limit: i64,
    pub offset: i64,
    pub order_by: String,
    pub ascending: bool,
    pub all: bool,
    pub deleted_only: bool,
    pub all_fields: bool,
}

impl Default for EntityQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            limit: 10,
            offset: 0,
            order_by: "name".to_string(),
            ascending: true,
            all: false,
            deleted_only: false,
            all_fields: false,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "`{}` expects a boolean, got `{}`",
            key, value
        ))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<i64, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Validation(format!("`{}` expects an integer, got `{}`", key, value)))
}

impl EntityQuery {
    /// Split raw query-string pairs into control parameters and filter terms
    pub fn from_params(params: Vec<(String, String)>, config: &QueryConfig) -> Result<Self, AppError> {
        let mut query = EntityQuery {
            limit: config.default_limit,
            ..Default::default()
        };
        for (key, value) in params {
            match key.as_str() {
                "limit" => query.limit = parse_number(&key, &value)?,
                "offset" => query.offset = parse_number(&key, &value)?,
                "order_by" => query.order_by = value,
                "ascending" => query.ascending = parse_flag(&key, &value)?,
                "all" => query.all = parse_flag(&key, &value)?,
                "deleted_only" => query.deleted_only = parse_flag(&key, &value)?,
                "all_fields" => query.all_fields = parse_flag(&key, &value)?,
                _ => query.filters.push((key.clone(), value)),
            }
        }
        query.limit = query.limit.clamp(1, config.max_limit);
        query.offset = query.offset.max(0);
        Ok(query)
    }
}

fn order_key<'a>(
    order_by: &str,
    schema_id: i32,
    defs: &'a [AttrDef],
) -> Result<OrderKey<'a>, AppError> {
    match order_by {
        "name" => Ok(OrderKey::Column("name")),
        "slug" => Ok(OrderKey::Column("slug")),
        "id" => Ok(OrderKey::Column("id")),
        other => match defs.iter().find(|d| d.name == other) {
            Some(def) if !def.list => Ok(OrderKey::Attr(def)),
            Some(def) => Err(AppError::Validation(format!(
                "Can't order by listed attribute `{}`",
                def.name
            ))),
            None => Err(AppError::AttributeNotDefined {
                attr: other.to_string(),
                schema_id,
            }),
        },
    }
}

/// List entities of a schema matching every filter term
pub async fn list_entities(
    tx: &Transaction<'_>,
    schema: &IdOrSlug,
    query: &EntityQuery,
) -> Result<EntityPage, AppError> {
    let schema = store::live_schema(tx, schema).await?;
    let defs = store::definitions(tx, schema.id).await?;

    let terms = filter::parse_terms(&query.filters, &defs)?;
    let order = order_key(&query.order_by, schema.id, &defs)?;
    let plan = plan::build(
        schema.id,
        terms,
        Visibility::from_flags(query.all, query.deleted_only),
        order,
        Window {
            limit: query.limit,
            offset: query.offset,
            ascending: query.ascending,
        },
    );
    debug!(schema_id = schema.id, sql = %plan.page_sql, "entity listing plan");

    let params: Vec<&(dyn ToSql + Sync)> = plan
        .params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect();
    let total: i64 = tx
        .query_one(&plan.count_sql, &params[..plan.filter_params])
        .await?
        .get(0);
    let rows = tx.query(&plan.page_sql, &params).await?;
    let mut entities: Vec<Entity> = rows.iter().map(Entity::from_row).collect();

    let shown: Vec<&AttrDef> = defs.iter().filter(|d| query.all_fields || d.key).collect();
    let ids: Vec<i32> = entities.iter().map(|e| e.id).collect();
    let loaded = values::load(tx, &ids, &shown).await?;
    for entity in &mut entities {
        entity.fields = values::to_fields(entity.id, &shown, &loaded);
    }

    Ok(EntityPage { total, entities })
}

/// Filter operators and which of them each kind accepts
#[derive(Debug, Serialize)]
pub struct FilterInfo {
    pub operators: BTreeMap<&'static str, &'static str>,
    pub kinds: BTreeMap<&'static str, Vec<&'static str>>,
}

pub fn describe_filters() -> FilterInfo {
    FilterInfo {
        operators: FilterOp::ALL
            .into_iter()
            .map(|op| (op.name(), op.description()))
            .collect(),
        kinds: AttrKind::ALL
            .into_iter()
            .map(|kind| {
                let ops = kind.operators(false).iter().map(|op| op.name()).collect();
                (kind.as_str(), ops)
            })
            .collect(),
    }
}
