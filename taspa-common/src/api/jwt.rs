//! Viewer token validation
//!
//! Tokens are HS256 JWTs issued by the auth service with `{sub, roles, exp}`
//! claims, signed with the shared secret from `[auth] jwt_secret`.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::roles::RoleSet;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: u64,
}

impl Claims {
    pub fn role_set(&self) -> RoleSet {
        RoleSet::from_names(&self.roles)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token validation failed: {0}")]
    Validation(String),
    #[error("Token generation failed: {0}")]
    Generation(String),
}

/// Validates (and, for tooling and tests, issues) viewer tokens
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::Invalid,
                _ => TokenError::Validation(e.to_string()),
            })
    }

    pub fn issue(&self, sub: &str, roles: &[&str], ttl_secs: u64) -> Result<String, TokenError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl_secs;
        let claims = Claims {
            sub: sub.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Role;

    #[test]
    fn test_issue_and_validate() {
        let verifier = TokenVerifier::new("dev-secret");
        let token = verifier.issue("7", &["admin"], 600).unwrap();

        let claims = verifier.validate(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert!(claims.role_set().contains(Role::Admin));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = TokenVerifier::new("one").issue("1", &["user"], 600).unwrap();
        let err = TokenVerifier::new("two").validate(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(TokenVerifier::new("s").validate("not-a-token").is_err());
    }
}
