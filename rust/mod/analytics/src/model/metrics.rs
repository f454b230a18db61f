use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{AccessRequest, RecentEvaluation, TimeRange};

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// Statistics for one time-series bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub period: String,
    pub total_evaluations: usize,
    pub average_time: f64,
    pub max_time: f64,
    pub min_time: f64,
    pub permit_rate: f64,
    pub deny_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowPolicy {
    pub policy_id: String,
    pub name: String,
    pub average_time: f64,
    pub max_time: f64,
    pub evaluation_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallPerformance {
    pub total_evaluations: usize,
    pub average_evaluation_time: f64,
    pub p95_evaluation_time: f64,
    pub p99_evaluation_time: f64,
    pub slowest_policies: Vec<SlowPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub overall: OverallPerformance,
    /// Sorted ascending by `period`.
    pub time_series: Vec<PeriodMetrics>,
}

// ---------------------------------------------------------------------------
// Ranked tallies
//
// Each list keeps the field name clients already read (`type`, `action`,
// `userId`, ...), so every tally gets its own small struct.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceTypeCount {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCount {
    pub user_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagCount {
    pub flag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpCount {
    pub ip: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceCount {
    pub resource: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Usage / compliance / security
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    pub total_requests: usize,
    pub top_resource_types: Vec<ResourceTypeCount>,
    pub top_actions: Vec<ActionCount>,
    pub top_users: Vec<UserCount>,
    /// Always has `PERMIT` and `DENY`, plus any other decision seen.
    pub decision_breakdown: BTreeMap<String, usize>,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceMetrics {
    pub total_auditable_events: usize,
    pub successful_events: usize,
    pub compliance_rate: f64,
    pub compliance_flags: Vec<FlagCount>,
    pub event_categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetrics {
    pub total_denied_requests: usize,
    #[serde(rename = "suspiciousIPs")]
    pub suspicious_ips: Vec<IpCount>,
    pub most_denied_resources: Vec<ResourceCount>,
    pub most_denied_actions: Vec<ActionCount>,
}

// ---------------------------------------------------------------------------
// Summary + response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Warning,
}

/// Raw counts the summary is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    pub total_policies: usize,
    pub active_policies: usize,
    pub total_evaluations: usize,
    pub total_access_requests: usize,
    pub audit_events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_policies: usize,
    pub active_policies: usize,
    pub total_evaluations: usize,
    pub total_access_requests: usize,
    pub audit_events: usize,
    pub evaluations_per_hour: f64,
    pub system_health: SystemHealth,
}

/// The requested metric sections; absent ones are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityMetrics>,
}

/// A denied request as listed in analytics details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&AccessRequest> for DeniedRequest {
    fn from(req: &AccessRequest) -> Self {
        Self {
            id: req.id.clone(),
            user_id: req.user_id().map(String::from),
            resource_type: req.resource_type().map(String::from),
            action: req.action().map(String::from),
            ip_address: req.ip_address.clone(),
            created_at: req.created_at,
        }
    }
}

/// Newest raw rows behind the performance and security sections.
/// Each list is present only when its section was selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_evaluations: Option<Vec<RecentEvaluation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_denials: Option<Vec<DeniedRequest>>,
}

/// Body of a successful `GET /policies/analytics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub time_range: TimeRange,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metrics: MetricsBundle,
    pub summary: AnalyticsSummary,
    /// Only with `includeDetails=true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AnalyticsDetails>,
}
