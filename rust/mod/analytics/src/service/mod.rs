pub mod schema;
mod events;
mod metrics;
mod policy;
mod report;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use supplyerp_core::{FieldIssue, ServiceError, to_db_timestamp};
use supplyerp_sql::{SQLError, SQLStore, Value};

use crate::model::SortOrder;

pub use events::AUDIT_REQUIRED;
pub use policy::DeleteOutcome;

pub(crate) const POLICIES: &str = "policies";
pub(crate) const EVALUATION_LOGS: &str = "policy_evaluation_logs";
pub(crate) const ACCESS_REQUESTS: &str = "access_requests";
pub(crate) const AUDIT_LOGS: &str = "audit_logs";

/// Analytics service errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{message}")]
    Invalid {
        message: String,
        details: Vec<FieldIssue>,
    },

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl AnalyticsError {
    pub(crate) fn invalid(message: &str, details: Vec<FieldIssue>) -> Self {
        Self::Invalid {
            message: message.to_string(),
            details,
        }
    }
}

impl From<SQLError> for AnalyticsError {
    fn from(e: SQLError) -> Self {
        if e.is_constraint() {
            AnalyticsError::Conflict(e.to_string())
        } else {
            AnalyticsError::Storage(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(e: serde_json::Error) -> Self {
        AnalyticsError::Internal(format!("json: {}", e))
    }
}

impl From<AnalyticsError> for ServiceError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::NotFound(m) => ServiceError::NotFound(m),
            AnalyticsError::Conflict(m) => ServiceError::Conflict(m),
            AnalyticsError::Invalid { message, details } => {
                ServiceError::InvalidFields { message, details }
            }
            AnalyticsError::Storage(m) => ServiceError::Storage(m),
            AnalyticsError::Internal(m) => ServiceError::Internal(m),
        }
    }
}

/// Tunables for metric computation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// An IP is suspicious above this many denials in the window.
    pub suspicious_ip_threshold: usize,
    /// Length of every "top" list.
    pub top_n: usize,
    /// Number of entries in `slowestPolicies`.
    pub slowest_policies: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            suspicious_ip_threshold: 10,
            top_n: 10,
            slowest_policies: 5,
        }
    }
}

/// The analytics service. Owns the SQL store and metric configuration.
pub struct AnalyticsService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) config: AnalyticsConfig,
}

impl AnalyticsService {
    /// Create the service, initializing the DB schema.
    pub fn new(sql: Arc<dyn SQLStore>, config: AnalyticsConfig) -> Result<Arc<Self>, AnalyticsError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Arc::new(Self { sql, config }))
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    // ── Generic record helpers ──

    /// Insert a record as JSON into a table with indexed columns.
    pub(crate) fn insert_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), AnalyticsError> {
        let json = serde_json::to_string(record)?;

        let mut cols = vec!["id", "data"];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string()];
        let mut params = vec![Value::Text(id.to_string()), Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            cols.push(col);
            placeholders.push(format!("?{}", i + 3));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );
        self.sql.exec(&sql, &params)?;
        Ok(())
    }

    /// Get a record by id, deserializing the JSON `data` column.
    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<T, AnalyticsError> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", table);
        let rows = self.sql.query(&sql, &[Value::Text(id.to_string())])?;
        let row = rows
            .first()
            .ok_or_else(|| AnalyticsError::NotFound(format!("{}/{}", table, id)))?;
        decode_row(row)
    }

    /// Update a record's JSON data and indexed columns.
    pub(crate) fn update_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), AnalyticsError> {
        let json = serde_json::to_string(record)?;

        let mut sets = vec!["data = ?1".to_string()];
        let mut params = vec![Value::Text(json)];
        for (i, (col, val)) in indexes.iter().enumerate() {
            sets.push(format!("{} = ?{}", col, i + 2));
            params.push(val.clone());
        }
        let id_idx = params.len() + 1;
        params.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            sets.join(", "),
            id_idx,
        );
        if self.sql.exec(&sql, &params)? == 0 {
            return Err(AnalyticsError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }

    pub(crate) fn delete_record(&self, table: &str, id: &str) -> Result<(), AnalyticsError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        if self.sql.exec(&sql, &[Value::Text(id.to_string())])? == 0 {
            return Err(AnalyticsError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }

    /// Load records matching `filter` sorted by `order_col`, ties broken
    /// by id in the same direction.
    pub(crate) fn select_records<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &Filter,
        (order_col, order): (&str, SortOrder),
        page: Option<(usize, usize)>,
    ) -> Result<Vec<T>, AnalyticsError> {
        let mut params = filter.params.clone();
        let mut sql = format!(
            "SELECT data FROM {}{} ORDER BY {} {dir}, id {dir}",
            table,
            filter.where_sql(),
            order_col,
            dir = order.as_sql(),
        );
        if let Some((limit, offset)) = page {
            sql.push_str(&format!(
                " LIMIT ?{} OFFSET ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(Value::Integer(limit as i64));
            params.push(Value::Integer(offset as i64));
        }

        tracing::debug!(table, sql = %sql, "select records");
        let rows = self.sql.query(&sql, &params)?;
        rows.iter().map(decode_row).collect()
    }

    pub(crate) fn count_records(&self, table: &str, filter: &Filter) -> Result<usize, AnalyticsError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}{}", table, filter.where_sql());
        let rows = self.sql.query(&sql, &filter.params)?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0).max(0) as usize)
    }

    /// Row counts per distinct value of `group_col` among matching rows.
    pub(crate) fn count_by(
        &self,
        table: &str,
        group_col: &str,
        filter: &Filter,
    ) -> Result<HashMap<String, usize>, AnalyticsError> {
        let sql = format!(
            "SELECT {col} AS grp, COUNT(*) AS cnt FROM {}{} GROUP BY {col}",
            table,
            filter.where_sql(),
            col = group_col,
        );
        let rows = self.sql.query(&sql, &filter.params)?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                let key = r.get_str("grp")?.to_string();
                Some((key, r.get_i64("cnt")?.max(0) as usize))
            })
            .collect())
    }
}

/// Newest first by `col`.
pub(crate) fn newest(col: &str) -> (&str, SortOrder) {
    (col, SortOrder::Desc)
}

fn decode_row<T: DeserializeOwned>(row: &supplyerp_sql::Row) -> Result<T, AnalyticsError> {
    let data = row
        .get_str("data")
        .ok_or_else(|| AnalyticsError::Internal("missing data column".into()))?;
    Ok(serde_json::from_str(data)?)
}

/// Conjunction of column predicates with positional parameters.
#[derive(Debug, Default, Clone)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, col: &str, op: &str, value: Value) -> Self {
        self.params.push(value);
        self.clauses.push(format!("{} {} ?{}", col, op, self.params.len()));
        self
    }

    pub fn eq(self, col: &str, value: impl Into<Value>) -> Self {
        self.push(col, "=", value.into())
    }

    /// `col >= ts`, comparing canonical timestamp text.
    pub fn since(self, col: &str, ts: DateTime<Utc>) -> Self {
        self.push(col, ">=", Value::Text(to_db_timestamp(ts)))
    }

    pub fn until(self, col: &str, ts: DateTime<Utc>) -> Self {
        self.push(col, "<=", Value::Text(to_db_timestamp(ts)))
    }

    pub fn at_least(self, col: &str, value: impl Into<Value>) -> Self {
        self.push(col, ">=", value.into())
    }

    pub fn at_most(self, col: &str, value: impl Into<Value>) -> Self {
        self.push(col, "<=", value.into())
    }

    /// Any of `exprs` contains `needle`, ASCII case-insensitively.
    /// `%` and `_` in the needle match literally.
    pub fn contains(mut self, exprs: &[&str], needle: &str) -> Self {
        let escaped = needle
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        self.params.push(Value::Text(format!("%{}%", escaped)));
        let n = self.params.len();
        let alternatives: Vec<String> = exprs
            .iter()
            .map(|e| format!("{} LIKE ?{} ESCAPE '\\'", e, n))
            .collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
        self
    }

    /// The JSON array at `path` in `table.data` shares an element with
    /// `values`. An empty list matches nothing.
    pub fn json_overlaps(mut self, table: &str, path: &str, values: &[String]) -> Self {
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return self;
        }
        let mut placeholders = Vec::with_capacity(values.len());
        for v in values {
            self.params.push(Value::Text(v.clone()));
            placeholders.push(format!("?{}", self.params.len()));
        }
        self.clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each({}.data, '{}') WHERE value IN ({}))",
            table,
            path,
            placeholders.join(", "),
        ));
        self
    }

    /// `col IN (...)`. An empty list matches nothing.
    pub fn any_of(mut self, col: &str, values: &[String]) -> Self {
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return self;
        }
        let mut placeholders = Vec::with_capacity(values.len());
        for v in values {
            self.params.push(Value::Text(v.clone()));
            placeholders.push(format!("?{}", self.params.len()));
        }
        self.clauses
            .push(format!("{} IN ({})", col, placeholders.join(", ")));
        self
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}
