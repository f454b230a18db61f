use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};

use supplyerp_core::{ServiceError, ok};

use crate::api::{AppState, parse_body, perm};
use crate::model::{BulkPolicyUpdate, CreatePolicy, PolicyListQuery, UpdatePolicy};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/policies",
            get(list_policies).post(create_policy).put(bulk_update),
        )
        .route(
            "/policies/{id}",
            get(get_policy).put(update_policy).delete(delete_policy),
        )
}

async fn list_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    state.auth.check(&headers, &perm("policy", "list"))?;
    let query = PolicyListQuery::parse(&params)?;
    let result = state.svc.list_policies(&query)?;
    Ok(ok(result))
}

/// PUT /policies: one operation over many policies.
async fn bulk_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let actor = state.auth.check(&headers, &perm("policy", "update"))?;
    let input: BulkPolicyUpdate = parse_body(&body)?;
    let outcome = state.svc.bulk_update_policies(input, &actor)?;
    Ok(ok(outcome))
}

async fn create_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    let actor = state.auth.check(&headers, &perm("policy", "create"))?;
    let input: CreatePolicy = parse_body(&body)?;
    let policy = state.svc.create_policy(input, &actor)?;
    Ok((StatusCode::CREATED, ok(policy)))
}

async fn get_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    state.auth.check(&headers, &perm("policy", "read"))?;
    let detail = state.svc.policy_detail(&id)?;
    Ok(ok(detail))
}

async fn update_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let actor = state.auth.check(&headers, &perm("policy", "update"))?;
    let patch: UpdatePolicy = parse_body(&body)?;
    let policy = state.svc.update_policy(&id, patch, &actor)?;
    Ok(ok(policy))
}

async fn delete_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let actor = state.auth.check(&headers, &perm("policy", "delete"))?;
    let outcome = state.svc.delete_policy(&id, &actor)?;
    Ok(ok(serde_json::json!({"id": id, "outcome": outcome.as_str()})))
}
