//! Ingestion endpoints for the policy engine and other producers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};

use supplyerp_core::{ServiceError, ok};

use crate::api::{AppState, parse_body, perm};
use crate::model::{NewAccessRequest, NewAuditLog, NewEvaluationLog};

type Created = (StatusCode, Json<serde_json::Value>);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/evaluation-logs", post(create_evaluation_log))
        .route("/access-requests", post(create_access_request))
        .route("/audit-logs", post(create_audit_log))
}

async fn create_evaluation_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Created, ServiceError> {
    state.auth.check(&headers, &perm("log", "write"))?;
    let input: NewEvaluationLog = parse_body(&body)?;
    let log = state.svc.record_evaluation(input)?;
    Ok((StatusCode::CREATED, ok(log)))
}

async fn create_access_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Created, ServiceError> {
    state.auth.check(&headers, &perm("log", "write"))?;
    let input: NewAccessRequest = parse_body(&body)?;
    let request = state.svc.record_access_request(input)?;
    Ok((StatusCode::CREATED, ok(request)))
}

async fn create_audit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Created, ServiceError> {
    state.auth.check(&headers, &perm("log", "write"))?;
    let input: NewAuditLog = parse_body(&body)?;
    let log = state.svc.record_audit(input)?;
    Ok((StatusCode::CREATED, ok(log)))
}
