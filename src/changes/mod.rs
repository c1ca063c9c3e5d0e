//! Change-request engine
//!
//! Every mutation of a schema or an entity is staged as a change request:
//! the real store operation runs inside a savepoint that is always rolled
//! back, the old and new values are recorded as change rows, and the request
//! is either applied right away (non-reviewable schemas) or left PENDING for a
//! reviewer to approve or decline.

/// Run a store operation inside a savepoint and roll it back whatever the
/// outcome; evaluates to the operation's result.
macro_rules! dry_run {
    ($tx:expr, |$sp:ident| $body:expr) => {{
        let $sp = $tx.savepoint("dry_run").await?;
        let outcome = $body.await;
        $sp.rollback().await?;
        tracing::debug!(ok = outcome.is_ok(), "dry run rolled back");
        outcome
    }};
}

pub mod details;
pub mod entity;
pub mod models;
pub mod review;
pub mod schema;
pub mod store;

pub use details::{change_details, ChangeDetail, FieldDiff};
pub use models::{
    Change, ChangeRequest, ChangeStatus, ChangeType, ContentType, NewChange, ObjectType, Submitted,
};
pub use review::{approve, decline, Applied, ReviewDecision};
pub use store::{count_pending, get_request, history, list_requests, RequestFilter};

use crate::registry::Scalar;

/// Integer id carried by an INT or FK change value
fn scalar_id(value: Option<&Scalar>) -> Option<i32> {
    match value? {
        Scalar::Int(v) => i32::try_from(*v).ok(),
        Scalar::Fk(v) => Some(*v),
        _ => None,
    }
}

fn scalar_text(value: Option<&Scalar>) -> Option<String> {
    match value? {
        Scalar::Str(s) => Some(s.clone()),
        _ => None,
    }
}

fn scalar_flag(value: Option<&Scalar>) -> Option<bool> {
    match value? {
        Scalar::Bool(b) => Some(*b),
        _ => None,
    }
}
