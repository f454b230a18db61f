//! Authentication trait for service modules.
//!
//! Modules do NOT depend on any specific token format. They only know
//! this trait; the concrete implementation is injected at startup time.

use axum::http::HeaderMap;

use crate::ServiceError;

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject id, recorded as the actor in audit rows.
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The internal actor used when no real identity is attached.
    pub fn system() -> Self {
        Self::new("system")
    }
}

/// Pluggable authenticator. Handlers call this before doing any work.
///
/// - `headers`: the HTTP request headers (for extracting tokens)
/// - `permission`: e.g. `"policy:analytics:read"`
/// - Returns the caller on success, `Unauthorized` or `PermissionDenied`
///   otherwise.
pub trait Authenticator: Send + Sync + 'static {
    fn check(&self, headers: &HeaderMap, permission: &str) -> Result<Principal, ServiceError>;
}

/// Allows everything as the `system` principal. Used for tests and
/// single-tenant local deployments.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn check(&self, _headers: &HeaderMap, _permission: &str) -> Result<Principal, ServiceError> {
        Ok(Principal::system())
    }
}

/// Denies everything. Used for testing.
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn check(&self, _headers: &HeaderMap, permission: &str) -> Result<Principal, ServiceError> {
        Err(ServiceError::PermissionDenied(format!(
            "permission {} denied",
            permission
        )))
    }
}
