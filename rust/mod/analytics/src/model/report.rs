use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::{Decision, ReasonCount, ReportFormat, ReportType};

// ---------------------------------------------------------------------------
// Summaries, one per report type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total_records: usize,
    pub event_types: Vec<String>,
    pub success_rate: f64,
    pub compliance_flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSummary {
    pub total_records: usize,
    pub permit_rate: f64,
    pub deny_rate: f64,
    pub average_evaluation_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChangesSummary {
    pub total_records: usize,
    pub change_types: Vec<String>,
    pub affected_policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationsSummary {
    pub total_records: usize,
    /// Number of denials in the period.
    pub violation_rate: usize,
    pub top_violation_reasons: Vec<ReasonCount>,
    /// Denials raised under `environment.threatLevel == "high"`.
    pub suspicious_activity: usize,
}

// ---------------------------------------------------------------------------
// Export rows
//
// Field order here is the CSV column order. Every row of a report has the
// same keys; `details` is present only when the caller asked for it.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub event_category: String,
    pub success: bool,
    pub compliance_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRow {
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub evaluation_time: Option<f64>,
    pub matched_policies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChangeRow {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub policy_id: Option<String>,
    pub policy_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRow {
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub resource_type: Option<String>,
    pub action: Option<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A computed report body before it is wrapped in [`ComplianceReport`].
///
/// Summary and rows are already JSON so every report type shares one
/// envelope and one CSV path.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportData {
    pub summary: Value,
    pub rows: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    pub policy_ids: Option<Vec<String>>,
    pub user_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub format: ReportFormat,
    pub include_details: bool,
    pub filters: ReportFilters,
}

/// A generated compliance report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub report_id: String,
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub period: ReportPeriod,
    pub summary: Value,
    pub data: Vec<Value>,
    pub metadata: ReportMetadata,
}

impl ComplianceReport {
    /// Number of exported rows, as recorded in the audit trail.
    pub fn record_count(&self) -> usize {
        self.data.len()
    }

    pub fn csv_filename(&self) -> String {
        format!("{}.csv", self.report_id)
    }
}
