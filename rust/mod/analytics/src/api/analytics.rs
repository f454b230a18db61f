use std::collections::HashMap;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;

use supplyerp_core::{ServiceError, ok};

use crate::api::{AppState, parse_body, perm};
use crate::csv::to_csv;
use crate::model::{AnalyticsQuery, ReportFormat, ReportRequest};

pub fn routes() -> Router<AppState> {
    Router::new().route("/policies/analytics", get(get_analytics).post(create_report))
}

/// GET /policies/analytics
async fn get_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ServiceError> {
    state.auth.check(&headers, &perm("analytics", "read"))?;

    let query = AnalyticsQuery::parse(&params)?;
    let report = state.svc.analytics(&query, Utc::now())?;
    Ok(ok(report).into_response())
}

/// POST /policies/analytics: generate a compliance report.
async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let actor = state.auth.check(&headers, &perm("report", "create"))?;

    let raw: serde_json::Value = parse_body(&body)?;
    let req = ReportRequest::parse(&raw)?;
    let report = state.svc.generate_report(&req, &actor, Utc::now())?;

    match req.format {
        ReportFormat::Json => Ok(ok(report).into_response()),
        ReportFormat::Csv => {
            let disposition = format!("attachment; filename=\"{}\"", report.csv_filename());
            let disposition = HeaderValue::from_str(&disposition)
                .map_err(|e| ServiceError::Internal(format!("content-disposition: {}", e)))?;
            Ok((
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                to_csv(&report.data),
            )
                .into_response())
        }
    }
}
