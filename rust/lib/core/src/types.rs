use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Parameters for list operations.
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Offset for pagination.
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Result wrapper for list operations.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Wrap a payload in the success envelope `{"success": true, "data": ...}`.
pub fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data,
    }))
}

/// Generate a new random ID (UUIDv4, no dashes).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "")
}

/// Canonical timestamp form for indexed columns.
///
/// Fixed nanosecond precision with a `Z` suffix, so string order equals
/// time order and range filters can compare text directly. Nothing is
/// truncated, so a bound and a stored value compare exactly.
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_id() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(!id.contains('-'));
    }

    #[test]
    fn test_db_timestamp_sorts_chronologically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();
        assert_eq!(to_db_timestamp(a), "2024-01-09T23:00:00.000000000Z");
        assert!(to_db_timestamp(a) < to_db_timestamp(b));
    }

    #[test]
    fn test_db_timestamp_keeps_sub_millisecond() {
        let a = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(900);
        assert_eq!(to_db_timestamp(b), "2024-01-09T00:00:00.000900000Z");
        assert!(to_db_timestamp(a) < to_db_timestamp(b));
    }

    #[test]
    fn test_ok_envelope() {
        let Json(body) = ok(serde_json::json!({"n": 1}));
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["n"], 1);
    }
}
