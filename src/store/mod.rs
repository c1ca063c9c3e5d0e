//! EAV store
//!
//! Owns schemas, attributes, attribute definitions, entities and the per-kind
//! value tables. Every operation runs on the caller's transaction, so the
//! change-request engine can execute the same write path inside a savepoint
//! and discard it.

pub mod entity;
pub mod schema;
pub mod validation;
pub mod values;

pub use entity::{
    create_entity, delete_entity, entity_by_id, find_entity, get_entity, restore_entity,
    update_entity, with_fields,
};
pub use schema::{
    create_schema, definitions, delete_schema, find_schema, get_attribute,
    get_or_create_attribute, get_schema, list_attributes, list_schemas, live_schema,
    restore_schema, update_schema,
};
