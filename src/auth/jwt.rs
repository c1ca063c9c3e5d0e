//! JWT token verification
//!
//! Tokens are issued elsewhere; this service only validates them.

use crate::auth::{Actor, Role};
use crate::error::AppError;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user name)
    pub sub: String,
    /// Display name, defaults to the subject
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor::new(self.name.clone().unwrap_or_else(|| self.sub.clone()), self.role)
    }
}

/// Decode and validate a JWT token
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".to_string())
        }
        jsonwebtoken::errors::ErrorKind::InvalidToken => {
            AppError::Unauthorized("Invalid token".to_string())
        }
        _ => AppError::Unauthorized(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(exp: i64) -> Claims {
        Claims {
            sub: "alice".into(),
            name: None,
            role: Role::Developer,
            exp,
        }
    }

    #[test]
    fn test_decode_valid_token() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let decoded = decode_token(&token(&claims(exp), "s3cret"), "s3cret").unwrap();
        assert_eq!(decoded.actor(), Actor::new("alice", Role::Developer));
    }

    #[test]
    fn test_decode_rejects_wrong_secret_and_expired() {
        let exp = chrono::Utc::now().timestamp() + 600;
        assert!(matches!(
            decode_token(&token(&claims(exp), "s3cret"), "other"),
            Err(AppError::Unauthorized(_))
        ));

        let expired = chrono::Utc::now().timestamp() - 3600;
        assert!(matches!(
            decode_token(&token(&claims(expired), "s3cret"), "s3cret"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
