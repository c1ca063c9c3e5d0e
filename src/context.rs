//! Per-request context
//!
//! Store and change-request operations receive the actor, the clock, the
//! change configuration and the authorization gate explicitly instead of
//! reading process-wide state.

use crate::auth::{Actor, Authorizer, PermissionKind, Target};
use crate::config::ChangeConfig;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub clock: Arc<dyn Clock>,
    pub config: ChangeConfig,
    pub authorizer: Arc<dyn Authorizer>,
}

impl RequestContext {
    pub fn new(actor: Actor, config: ChangeConfig, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            actor,
            clock: Arc::new(SystemClock),
            config,
            authorizer,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fail with `Forbidden` unless the gate allows the action
    pub fn authorize(&self, kind: PermissionKind, target: Option<Target>) -> Result<(), AppError> {
        if self.authorizer.is_allowed(&self.actor, kind, target) {
            return Ok(());
        }
        warn!(actor = %self.actor.name, ?kind, ?target, "permission denied");
        Err(AppError::Forbidden(format!(
            "`{}` is not allowed to {:?}",
            self.actor.name, kind
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RoleAuthorizer, Role};
    use chrono::TimeZone;

    #[test]
    fn test_authorize_denies_viewer_writes() {
        let ctx = RequestContext::new(
            Actor::new("viewer", Role::Viewer),
            ChangeConfig::default(),
            Arc::new(RoleAuthorizer),
        );
        assert!(ctx.authorize(PermissionKind::ReadEntity, None).is_ok());
        assert!(matches!(
            ctx.authorize(PermissionKind::CreateEntity, Some(Target::Schema(1))),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_fixed_clock() {
        let at = Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap();
        let ctx = RequestContext::new(
            Actor::new("a", Role::Admin),
            ChangeConfig::default(),
            Arc::new(RoleAuthorizer),
        )
        .with_clock(Arc::new(FixedClock(at)));
        assert_eq!(ctx.now(), at);
    }
}
