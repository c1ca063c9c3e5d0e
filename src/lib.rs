//! EAV Registry
//!
//! Record types are defined at runtime as schemas of typed attributes.
//! Entities of those schemas are stored attribute-by-attribute in PostgreSQL,
//! and every mutation goes through a change request that is either applied
//! at once or held for review.

pub mod auth;
pub mod changes;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
