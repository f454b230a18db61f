use supplyerp_sql::SQLStore;

use super::AnalyticsError;

/// DDL for the analytics database.
///
/// Each table stores the full JSON document in a `data` TEXT column, with
/// indexed columns extracted for filtering. Timestamp columns hold
/// canonical nanosecond RFC 3339 text so range predicates compare strings.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS policies (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    effect TEXT NOT NULL,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS policy_evaluation_logs (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    policy_id TEXT NOT NULL,
    final_decision TEXT NOT NULL,
    evaluation_time REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS access_requests (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    decision TEXT NOT NULL,
    ip_address TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_category TEXT NOT NULL,
    success INTEGER NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_policy_status ON policies(status);
CREATE INDEX IF NOT EXISTS idx_policy_effect ON policies(effect);
CREATE INDEX IF NOT EXISTS idx_eval_created ON policy_evaluation_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_eval_policy ON policy_evaluation_logs(policy_id, created_at);
CREATE INDEX IF NOT EXISTS idx_access_created ON access_requests(created_at);
CREATE INDEX IF NOT EXISTS idx_access_decision ON access_requests(decision, created_at);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_category ON audit_logs(event_category, timestamp);
";

pub fn init_schema(sql: &dyn SQLStore) -> Result<(), AnalyticsError> {
    sql.exec_batch(SCHEMA)
        .map_err(|e| AnalyticsError::Storage(format!("schema init failed: {}", e)))
}
