//! Progress socket identity.
//!
//! With a configured secret, the owner is the `id` claim of an HS256 token.
//! Without one, the `user_id` query parameter is trusted as given.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// Decoded socket token claims.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketClaims {
    /// User ID, numeric or string depending on the issuer
    pub id: Value,
}

impl SocketClaims {
    pub fn owner_id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Verifies HS256 socket tokens against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not required.
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<String, ApiError> {
        let data = decode::<SocketClaims>(token, &self.key, &self.validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?;
        data.claims
            .owner_id()
            .ok_or_else(|| ApiError::unauthorized("Token missing user id"))
    }
}

/// Resolve the owner of a progress socket.
pub fn resolve_owner(
    verifier: Option<&TokenVerifier>,
    token: Option<&str>,
    user_id: Option<&str>,
) -> Result<String, ApiError> {
    match verifier {
        Some(verifier) => {
            let token = token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::unauthorized("Missing token"))?;
            verifier.verify(token)
        }
        None => user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::unauthorized("Missing user_id")),
    }
}
