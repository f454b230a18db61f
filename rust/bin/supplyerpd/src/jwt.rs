//! JWT bearer authentication.
//!
//! Extracts the token from `Authorization: Bearer <token>`, validates it
//! (HS256, expiry) and checks the requested permission against the claims.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use supplyerp_core::{Authenticator, Principal, ServiceError};

use crate::bootstrap::ROOT_ROLE_ID;

/// JWT claims payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id, recorded as the audit actor.
    pub sub: String,
    /// Granted permissions, e.g. `policy:analytics:read` or `policy:*`.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Roles. `policy:root` bypasses permission checks.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    pub fn is_root(&self) -> bool {
        self.roles.iter().any(|r| r == ROOT_ROLE_ID)
    }

    /// Exact match, or a `prefix:*` grant covering the permission.
    pub fn grants(&self, permission: &str) -> bool {
        self.is_root()
            || self.permissions.iter().any(|p| match p.strip_suffix('*') {
                Some(prefix) => prefix.ends_with(':') && permission.starts_with(prefix),
                None => p == permission,
            })
    }
}

/// Validates bearer tokens signed with the configured secret.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims, ServiceError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))
    }
}

impl Authenticator for JwtAuthenticator {
    fn check(&self, headers: &HeaderMap, permission: &str) -> Result<Principal, ServiceError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization token".into()))?;

        let claims = self.decode(token.trim())?;
        if !claims.grants(permission) {
            return Err(ServiceError::PermissionDenied(format!(
                "user {} lacks permission {}",
                claims.sub, permission
            )));
        }
        Ok(Principal::new(claims.sub))
    }
}

/// Sign a token for `sub`, valid for `ttl_secs` from now.
pub fn issue_token(
    secret: &str,
    sub: &str,
    permissions: Vec<String>,
    roles: Vec<String>,
    ttl_secs: u64,
) -> anyhow::Result<String> {
    let iat = chrono::Utc::now().timestamp();
    let ttl = i64::try_from(ttl_secs).map_err(|_| anyhow::anyhow!("ttl too large"))?;
    let claims = Claims {
        sub: sub.to_string(),
        permissions,
        roles,
        iat,
        exp: iat + ttl,
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
