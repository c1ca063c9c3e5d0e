//! Per-kind value tables
//!
//! Each function picks the table of the definition's kind from the registry.

use crate::db::queries::UNIQUE_VALUE_LOCK;
use crate::error::AppError;
use crate::models::{AttrDef, IdOrSlug};
use crate::registry::{AttrKind, Scalar};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use tokio_postgres::Transaction;

/// Typed values keyed by (entity id, attribute id)
pub type ValueMap = HashMap<(i32, i32), Vec<Scalar>>;

pub async fn insert(
    tx: &Transaction<'_>,
    entity_id: i32,
    def: &AttrDef,
    values: &[Scalar],
) -> Result<(), AppError> {
    let sql = format!(
        "INSERT INTO {} (entity_id, attribute_id, value) VALUES ($1, $2, $3)",
        def.kind.value_table()
    );
    let stmt = tx.prepare(&sql).await?;
    for value in values {
        tx.execute(&stmt, &[&entity_id, &def.attribute_id, value.as_sql()])
            .await?;
    }
    Ok(())
}

/// Remove every value of one attribute from one entity
pub async fn clear(tx: &Transaction<'_>, entity_id: i32, def: &AttrDef) -> Result<u64, AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE entity_id = $1 AND attribute_id = $2",
        def.kind.value_table()
    );
    Ok(tx.execute(&sql, &[&entity_id, &def.attribute_id]).await?)
}

pub async fn replace(
    tx: &Transaction<'_>,
    entity_id: i32,
    def: &AttrDef,
    values: &[Scalar],
) -> Result<(), AppError> {
    clear(tx, entity_id, def).await?;
    insert(tx, entity_id, def, values).await
}

/// Remove the values of one attribute from all entities of a schema
pub async fn purge(
    tx: &Transaction<'_>,
    schema_id: i32,
    attribute_id: i32,
    kind: AttrKind,
) -> Result<u64, AppError> {
    let sql = format!(
        "DELETE FROM {} v USING entities e
         WHERE e.id = v.entity_id AND e.schema_id = $1 AND v.attribute_id = $2",
        kind.value_table()
    );
    Ok(tx.execute(&sql, &[&schema_id, &attribute_id]).await?)
}

/// Move the values of a renamed attribute onto its new attribute row
pub async fn repoint(
    tx: &Transaction<'_>,
    schema_id: i32,
    from: i32,
    to: i32,
    kind: AttrKind,
) -> Result<u64, AppError> {
    let sql = format!(
        "UPDATE {} v SET attribute_id = $3 FROM entities e
         WHERE e.id = v.entity_id AND e.schema_id = $1 AND v.attribute_id = $2",
        kind.value_table()
    );
    Ok(tx.execute(&sql, &[&schema_id, &from, &to]).await?)
}

/// Fails when another live entity of the schema already holds `value`.
///
/// Takes a transaction-level advisory lock on (attribute, value) first, so a
/// concurrent writer of the same value waits for this transaction to end and
/// then sees its row.
pub async fn check_unique(
    tx: &Transaction<'_>,
    def: &AttrDef,
    entity_id: i32,
    value: &Scalar,
) -> Result<(), AppError> {
    tx.execute(UNIQUE_VALUE_LOCK, &[&def.attribute_id, &value.to_string()])
        .await?;
    let sql = format!(
        "SELECT 1 FROM {} v JOIN entities e ON e.id = v.entity_id
         WHERE v.attribute_id = $1 AND v.value = $2 AND e.schema_id = $3
           AND NOT e.deleted AND e.id <> $4
         LIMIT 1",
        def.kind.value_table()
    );
    let taken = tx
        .query_opt(
            &sql,
            &[&def.attribute_id, value.as_sql(), &def.schema_id, &entity_id],
        )
        .await?;
    match taken {
        Some(_) => Err(AppError::UniqueValue {
            attr: def.name.clone(),
            schema_id: def.schema_id,
            value: value.to_string(),
        }),
        None => Ok(()),
    }
}

/// First value shared by two live entities, if any
pub async fn find_duplicate(
    tx: &Transaction<'_>,
    schema_id: i32,
    attribute_id: i32,
    kind: AttrKind,
) -> Result<Option<Scalar>, AppError> {
    let sql = format!(
        "SELECT v.value FROM {} v JOIN entities e ON e.id = v.entity_id
         WHERE v.attribute_id = $1 AND e.schema_id = $2 AND NOT e.deleted
         GROUP BY v.value HAVING count(*) > 1
         LIMIT 1",
        kind.value_table()
    );
    let row = tx.query_opt(&sql, &[&attribute_id, &schema_id]).await?;
    Ok(row.and_then(|r| kind.read(&r, "value")))
}

/// Foreign-key values must point at a live entity of the bound schema
pub async fn check_binding(tx: &Transaction<'_>, def: &AttrDef, value: &Scalar) -> Result<(), AppError> {
    let Some(target) = value.as_fk() else {
        return Ok(());
    };
    let bound_schema_id = def
        .bound_schema_id
        .ok_or_else(|| AppError::NoSchemaToBind(def.name.clone()))?;

    let row = tx
        .query_opt("SELECT schema_id, deleted FROM entities WHERE id = $1", &[&target])
        .await?;
    let Some(row) = row else {
        return Err(AppError::MissingEntity(IdOrSlug::Id(target)));
    };
    let (entity_schema_id, deleted): (i32, bool) = (row.get(0), row.get(1));
    if deleted {
        return Err(AppError::MissingEntity(IdOrSlug::Id(target)));
    }
    if entity_schema_id != bound_schema_id {
        return Err(AppError::WrongSchemaBinding {
            attr: def.name.clone(),
            schema_id: def.schema_id,
            bound_schema_id,
            entity_id: target,
            entity_schema_id,
        });
    }
    Ok(())
}

/// Load the values of `defs` for a batch of entities, one query per kind
pub async fn load(
    tx: &Transaction<'_>,
    entity_ids: &[i32],
    defs: &[&AttrDef],
) -> Result<ValueMap, AppError> {
    let mut out = ValueMap::new();
    if entity_ids.is_empty() || defs.is_empty() {
        return Ok(out);
    }

    let mut by_kind: HashMap<AttrKind, Vec<i32>> = HashMap::new();
    for def in defs {
        by_kind.entry(def.kind).or_default().push(def.attribute_id);
    }

    for (kind, attribute_ids) in by_kind {
        let sql = format!(
            "SELECT entity_id, attribute_id, value FROM {}
             WHERE entity_id = ANY($1) AND attribute_id = ANY($2)
             ORDER BY id",
            kind.value_table()
        );
        let rows = tx.query(&sql, &[&entity_ids, &attribute_ids]).await?;
        for row in rows {
            if let Some(value) = kind.read(&row, "value") {
                out.entry((row.get("entity_id"), row.get("attribute_id")))
                    .or_default()
                    .push(value);
            }
        }
    }
    Ok(out)
}

/// Render loaded values as the JSON fields of one entity. Missing list
/// values become `[]`, missing single values `null`.
pub fn to_fields(entity_id: i32, defs: &[&AttrDef], values: &ValueMap) -> Map<String, Json> {
    let mut fields = Map::new();
    for def in defs {
        let found = values.get(&(entity_id, def.attribute_id));
        let json = if def.list {
            Json::Array(
                found
                    .map(|vs| vs.iter().map(Scalar::to_json).collect())
                    .unwrap_or_default(),
            )
        } else {
            found
                .and_then(|vs| vs.first())
                .map(Scalar::to_json)
                .unwrap_or(Json::Null)
        };
        fields.insert(def.name.clone(), json);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(attribute_id: i32, name: &str, kind: AttrKind, list: bool) -> AttrDef {
        AttrDef {
            id: attribute_id,
            schema_id: 1,
            attribute_id,
            name: name.into(),
            kind,
            required: false,
            unique: false,
            list,
            key: false,
            description: None,
            bound_schema_id: None,
        }
    }

    #[test]
    fn test_to_fields_fills_missing_values() {
        let age = def(1, "age", AttrKind::Int, false);
        let tags = def(2, "tags", AttrKind::Str, true);
        let nick = def(3, "nickname", AttrKind::Str, false);

        let mut values = ValueMap::new();
        values.insert((5, 1), vec![Scalar::Int(30)]);
        values.insert(
            (5, 2),
            vec![Scalar::Str("a".into()), Scalar::Str("b".into())],
        );

        let fields = to_fields(5, &[&age, &tags, &nick], &values);
        assert_eq!(fields["age"], json!(30));
        assert_eq!(fields["tags"], json!(["a", "b"]));
        assert_eq!(fields["nickname"], Json::Null);

        let empty = to_fields(6, &[&tags], &values);
        assert_eq!(empty["tags"], json!([]));
    }
}
