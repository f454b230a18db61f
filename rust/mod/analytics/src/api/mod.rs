mod analytics;
mod events;
mod policies;

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use serde::de::DeserializeOwned;

use supplyerp_core::{Authenticator, ServiceError};

use crate::service::AnalyticsService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub svc: Arc<AnalyticsService>,
    pub auth: Arc<dyn Authenticator>,
}

/// Build the analytics API router.
///
/// Routes are relative; the server nests them under `/api`.
pub fn build_router(svc: Arc<AnalyticsService>, auth: Arc<dyn Authenticator>) -> Router {
    Router::new()
        .merge(analytics::routes())
        .merge(policies::routes())
        .merge(events::routes())
        .with_state(AppState { svc, auth })
}

/// `policy:<resource>:<action>`.
pub(crate) fn perm(resource: &str, action: &str) -> String {
    format!("policy:{}:{}", resource, action)
}

/// Decode a JSON request body.
///
/// Bodies are taken as raw bytes so malformed input still gets the
/// standard error envelope.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ServiceError> {
    if body.is_empty() {
        return Err(ServiceError::Validation("request body is required".into()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::Validation(format!("invalid JSON body: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use supplyerp_core::{AllowAll, DenyAll};
    use tower::ServiceExt;

    pub(crate) fn router_with(auth: Arc<dyn Authenticator>) -> (Router, Arc<AnalyticsService>) {
        let svc = crate::service::tests::test_service();
        (build_router(svc.clone(), auth), svc)
    }

    pub(crate) fn router() -> (Router, Arc<AnalyticsService>) {
        router_with(Arc::new(AllowAll))
    }

    pub(crate) async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        router.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    pub(crate) async fn api(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let resp = send(router, method, uri, body).await;
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null))
        };
        (status, json)
    }

    #[test]
    fn permission_names() {
        assert_eq!(perm("analytics", "read"), "policy:analytics:read");
    }

    #[test]
    fn body_parsing_errors_are_validation() {
        let err = parse_body::<serde_json::Value>(&Bytes::new()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err = parse_body::<serde_json::Value>(&Bytes::from_static(b"not json")).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn deny_all_blocks_every_route() {
        let (r, _svc) = router_with(Arc::new(DenyAll));
        for (method, uri) in [
            ("GET", "/policies/analytics"),
            ("POST", "/policies/analytics"),
            ("GET", "/policies"),
            ("POST", "/policies"),
            ("GET", "/policies/abc"),
            ("PUT", "/policies/abc"),
            ("DELETE", "/policies/abc"),
            ("POST", "/evaluation-logs"),
            ("POST", "/access-requests"),
            ("POST", "/audit-logs"),
        ] {
            let (status, json) = api(&r, method, uri, Some(serde_json::json!({}))).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
            assert_eq!(json["success"], false);
            assert_eq!(json["code"], "PERMISSION_DENIED");
        }
    }
}
