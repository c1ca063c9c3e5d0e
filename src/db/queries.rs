//! SQL query constants and builders
//!
//! Contains the DDL of the registry and the fixed queries shared by the
//! store and the change-request engine.

use crate::registry::AttrKind;

/// Serializes concurrent migrations
pub const MIGRATION_LOCK: &str = "SELECT pg_advisory_xact_lock(727274)";

/// Held until commit by every writer of one (attribute, value) pair
pub const UNIQUE_VALUE_LOCK: &str = "SELECT pg_advisory_xact_lock($1, hashtext($2))";

pub const CREATE_SCHEMAS: &str = r#"
    CREATE TABLE IF NOT EXISTS schemas (
        id SERIAL PRIMARY KEY,
        name VARCHAR(128) NOT NULL UNIQUE,
        slug VARCHAR(128) NOT NULL UNIQUE,
        deleted BOOLEAN NOT NULL DEFAULT false,
        reviewable BOOLEAN NOT NULL DEFAULT false
    )
"#;

pub const CREATE_ATTRIBUTES: &str = r#"
    CREATE TABLE IF NOT EXISTS attributes (
        id SERIAL PRIMARY KEY,
        name VARCHAR(128) NOT NULL,
        kind VARCHAR(16) NOT NULL,
        UNIQUE (name, kind)
    )
"#;

pub const CREATE_ATTR_DEFINITIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS attr_definitions (
        id SERIAL PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES schemas(id),
        attribute_id INTEGER NOT NULL REFERENCES attributes(id),
        required BOOLEAN NOT NULL DEFAULT false,
        is_unique BOOLEAN NOT NULL DEFAULT false,
        is_list BOOLEAN NOT NULL DEFAULT false,
        is_key BOOLEAN NOT NULL DEFAULT false,
        description VARCHAR(1024),
        bound_schema_id INTEGER REFERENCES schemas(id),
        UNIQUE (schema_id, attribute_id)
    )
"#;

pub const CREATE_ENTITIES: &str = r#"
    CREATE TABLE IF NOT EXISTS entities (
        id SERIAL PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES schemas(id),
        name VARCHAR(128) NOT NULL,
        slug VARCHAR(128) NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT false,
        UNIQUE (schema_id, slug)
    )
"#;

pub const CREATE_CHANGE_REQUESTS: &str = r#"
    CREATE TABLE IF NOT EXISTS change_requests (
        id SERIAL PRIMARY KEY,
        created_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        reviewed_by TEXT,
        reviewed_at TIMESTAMPTZ,
        status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
        comment VARCHAR(1024),
        object_type VARCHAR(16) NOT NULL,
        change_type VARCHAR(16) NOT NULL,
        object_id INTEGER
    )
"#;

pub const CREATE_CHANGES: &str = r#"
    CREATE TABLE IF NOT EXISTS changes (
        id SERIAL PRIMARY KEY,
        change_request_id INTEGER NOT NULL REFERENCES change_requests(id),
        object_id INTEGER,
        attribute_id INTEGER REFERENCES attributes(id),
        field_name VARCHAR(64),
        content_type VARCHAR(32) NOT NULL,
        change_type VARCHAR(16) NOT NULL,
        data_kind VARCHAR(16) NOT NULL,
        value_id INTEGER NOT NULL,
        CHECK (attribute_id IS NOT NULL OR field_name IS NOT NULL)
    )
"#;

pub const CREATE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_entities_schema ON entities(schema_id, deleted)",
    "CREATE INDEX IF NOT EXISTS idx_changes_request ON changes(change_request_id)",
    "CREATE INDEX IF NOT EXISTS idx_change_requests_object ON change_requests(object_type, object_id)",
];

/// Value table of one kind plus its index
pub fn create_value_table(kind: AttrKind) -> [String; 2] {
    let spec = kind.spec();
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id SERIAL PRIMARY KEY,
                entity_id INTEGER NOT NULL REFERENCES entities(id),
                attribute_id INTEGER NOT NULL REFERENCES attributes(id),
                value {ty} NOT NULL
            )",
            table = spec.value_table,
            ty = spec.sql_type
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_lookup ON {table}(entity_id, attribute_id)",
            table = spec.value_table
        ),
    ]
}

/// Old/new pair table of one kind
pub fn create_change_value_table(kind: AttrKind) -> String {
    let spec = kind.spec();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id SERIAL PRIMARY KEY,
            old_value {ty},
            new_value {ty}
        )",
        table = spec.change_table,
        ty = spec.sql_type
    )
}

// ---- schemas ----

pub const SCHEMA_COLUMNS: &str = "id, name, slug, deleted, reviewable";

pub const LIST_SCHEMAS: &str = r#"
    SELECT id, name, slug, deleted, reviewable
    FROM schemas
    WHERE ($1 OR deleted = $2)
    ORDER BY id
"#;

pub const INSERT_SCHEMA: &str = r#"
    INSERT INTO schemas (name, slug, reviewable)
    VALUES ($1, $2, $3)
    RETURNING id, name, slug, deleted, reviewable
"#;

pub const SCHEMA_CONFLICT: &str = r#"
    SELECT id FROM schemas
    WHERE (name = $1 OR slug = $2) AND id <> $3
    LIMIT 1
"#;

pub const SET_SCHEMA_DELETED: &str = "UPDATE schemas SET deleted = $2 WHERE id = $1";

pub const DELETE_SCHEMA_ENTITIES: &str =
    "UPDATE entities SET deleted = true WHERE schema_id = $1 AND NOT deleted";

// ---- attributes ----

pub const LIST_ATTRIBUTES: &str = "SELECT id, name, kind FROM attributes ORDER BY id";

pub const GET_ATTRIBUTE: &str = "SELECT id, name, kind FROM attributes WHERE id = $1";

/// Lookup-or-create in one statement; the no-op update makes RETURNING fire on conflict
pub const UPSERT_ATTRIBUTE: &str = r#"
    INSERT INTO attributes (name, kind) VALUES ($1, $2)
    ON CONFLICT (name, kind) DO UPDATE SET name = EXCLUDED.name
    RETURNING id, name, kind
"#;

pub const LIST_DEFINITIONS: &str = r#"
    SELECT d.id, d.schema_id, d.attribute_id, a.name, a.kind,
           d.required, d.is_unique, d.is_list, d.is_key,
           d.description, d.bound_schema_id
    FROM attr_definitions d
    JOIN attributes a ON a.id = d.attribute_id
    WHERE d.schema_id = $1
    ORDER BY d.id
"#;

pub const INSERT_DEFINITION: &str = r#"
    INSERT INTO attr_definitions
        (schema_id, attribute_id, required, is_unique, is_list, is_key, description, bound_schema_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

pub const UPDATE_DEFINITION: &str = r#"
    UPDATE attr_definitions
    SET attribute_id = $2, required = $3, is_unique = $4, is_list = $5,
        is_key = $6, description = $7, bound_schema_id = $8
    WHERE id = $1
"#;

pub const DELETE_DEFINITION: &str = "DELETE FROM attr_definitions WHERE id = $1";

// ---- entities ----

pub const ENTITY_COLUMNS: &str = "id, schema_id, name, slug, deleted";

pub const INSERT_ENTITY: &str = r#"
    INSERT INTO entities (schema_id, name, slug)
    VALUES ($1, $2, $3)
    RETURNING id, schema_id, name, slug, deleted
"#;

pub const ENTITY_SLUG_TAKEN: &str = r#"
    SELECT id FROM entities
    WHERE schema_id = $1 AND slug = $2 AND id <> $3
    LIMIT 1
"#;

pub const GET_ENTITY_BY_ID: &str = r#"
    SELECT id, schema_id, name, slug, deleted FROM entities WHERE id = $1
"#;

pub const GET_ENTITY_BY_SLUG: &str = r#"
    SELECT id, schema_id, name, slug, deleted FROM entities WHERE schema_id = $1 AND slug = $2
"#;

pub const UPDATE_ENTITY_FIELDS: &str =
    "UPDATE entities SET name = $2, slug = $3 WHERE id = $1";

pub const SET_ENTITY_DELETED: &str = "UPDATE entities SET deleted = $2 WHERE id = $1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_table_ddl_uses_registry() {
        let [table, index] = create_value_table(AttrKind::Dt);
        assert!(table.contains("values_datetime"));
        assert!(table.contains("TIMESTAMPTZ NOT NULL"));
        assert!(index.contains("idx_values_datetime_lookup"));

        let change = create_change_value_table(AttrKind::Float);
        assert!(change.contains("change_values_float"));
        assert!(change.contains("old_value DOUBLE PRECISION"));
    }
}
