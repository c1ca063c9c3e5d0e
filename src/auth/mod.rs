//! Authentication and authorization module
//!
//! Bearer tokens are decoded into an [`Actor`]; the change-request engine asks
//! an [`Authorizer`] whether the actor may perform an action and only ever
//! sees the boolean answer.

mod jwt;
mod middleware;

pub use jwt::{decode_token, Claims};
pub use middleware::authenticate;

use serde::{Deserialize, Serialize};

/// User roles for authorization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can read schemas and entities
    #[default]
    Viewer,
    /// Can also create and edit entities
    Developer,
    /// Can do everything, schemas included
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Developer => write!(f, "developer"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Who is performing a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionKind {
    CreateSchema,
    ReadSchema,
    UpdateSchema,
    DeleteSchema,
    CreateEntity,
    ReadEntity,
    UpdateEntity,
    DeleteEntity,
}

/// What a permission is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Schema(i32),
    Entity(i32),
    Group(i32),
}

pub trait Authorizer: Send + Sync {
    fn is_allowed(&self, actor: &Actor, kind: PermissionKind, target: Option<Target>) -> bool;
}

/// Grants permissions by role, ignoring the target
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn is_allowed(&self, actor: &Actor, kind: PermissionKind, _target: Option<Target>) -> bool {
        use PermissionKind::*;
        match actor.role {
            Role::Admin => true,
            Role::Developer => matches!(
                kind,
                ReadSchema | ReadEntity | CreateEntity | UpdateEntity | DeleteEntity
            ),
            Role::Viewer => matches!(kind, ReadSchema | ReadEntity),
        }
    }
}

/// Allows everything; used by tools and tests that run without tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_allowed(&self, _: &Actor, _: PermissionKind, _: Option<Target>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_authorizer() {
        let gate = RoleAuthorizer;
        let viewer = Actor::new("v", Role::Viewer);
        let dev = Actor::new("d", Role::Developer);
        let admin = Actor::new("a", Role::Admin);

        assert!(gate.is_allowed(&viewer, PermissionKind::ReadEntity, None));
        assert!(!gate.is_allowed(&viewer, PermissionKind::CreateEntity, None));
        assert!(gate.is_allowed(&dev, PermissionKind::UpdateEntity, Some(Target::Entity(1))));
        assert!(!gate.is_allowed(&dev, PermissionKind::UpdateSchema, Some(Target::Schema(1))));
        assert!(gate.is_allowed(&admin, PermissionKind::DeleteSchema, None));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Developer.to_string(), "developer");
        assert_eq!(Role::default(), Role::Viewer);
    }
}
