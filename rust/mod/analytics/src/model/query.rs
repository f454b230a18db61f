//! Request parameters for the analytics endpoints and their validation.
//!
//! Parsing collects every problem before failing, so a client sees all
//! rejected fields in one `400` response.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use supplyerp_core::{FieldIssue, ServiceError};

// ---------------------------------------------------------------------------
// Analytics query
// ---------------------------------------------------------------------------

/// Look-back window ending at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
    #[serde(rename = "90d")]
    LastQuarter,
}

impl TimeRange {
    const ALLOWED: &'static str = "1h, 24h, 7d, 30d, 90d";

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(Self::LastHour),
            "24h" => Some(Self::LastDay),
            "7d" => Some(Self::LastWeek),
            "30d" => Some(Self::LastMonth),
            "90d" => Some(Self::LastQuarter),
            _ => None,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::LastHour => Duration::hours(1),
            Self::LastDay => Duration::hours(24),
            Self::LastWeek => Duration::days(7),
            Self::LastMonth => Duration::days(30),
            Self::LastQuarter => Duration::days(90),
        }
    }

    /// Start of the window that ends at `now`.
    pub fn start_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

/// Which metric sections to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Performance,
    Usage,
    Compliance,
    Security,
    All,
}

impl MetricType {
    const ALLOWED: &'static str = "performance, usage, compliance, security, all";

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "performance" => Some(Self::Performance),
            "usage" => Some(Self::Usage),
            "compliance" => Some(Self::Compliance),
            "security" => Some(Self::Security),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Whether this selection asks for `section`.
    pub fn includes(&self, section: MetricType) -> bool {
        *self == MetricType::All || *self == section
    }
}

/// Bucketing key for the performance time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Hour,
    Day,
    Week,
    Policy,
    User,
    Resource,
}

impl GroupBy {
    const ALLOWED: &'static str = "hour, day, week, policy, user, resource";

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "policy" => Some(Self::Policy),
            "user" => Some(Self::User),
            "resource" => Some(Self::Resource),
            _ => None,
        }
    }
}

/// Validated `GET /policies/analytics` parameters.
#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    pub time_range: TimeRange,
    pub metric_type: MetricType,
    /// `None` means all policies.
    pub policy_ids: Option<Vec<String>>,
    pub group_by: GroupBy,
    pub include_details: bool,
}

impl Default for AnalyticsQuery {
    fn default() -> Self {
        Self {
            time_range: TimeRange::LastDay,
            metric_type: MetricType::All,
            policy_ids: None,
            group_by: GroupBy::Day,
            include_details: false,
        }
    }
}

impl AnalyticsQuery {
    /// Parse raw query-string pairs. Unknown keys are ignored.
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let mut issues = Vec::new();
        let defaults = Self::default();

        let time_range = parse_choice(
            params.get("timeRange"),
            "timeRange",
            TimeRange::from_str,
            TimeRange::ALLOWED,
            defaults.time_range,
            &mut issues,
        );
        let metric_type = parse_choice(
            params.get("metricType"),
            "metricType",
            MetricType::from_str,
            MetricType::ALLOWED,
            defaults.metric_type,
            &mut issues,
        );
        let group_by = parse_choice(
            params.get("groupBy"),
            "groupBy",
            GroupBy::from_str,
            GroupBy::ALLOWED,
            defaults.group_by,
            &mut issues,
        );

        let include_details = match params.get("includeDetails") {
            None => defaults.include_details,
            Some(raw) => parse_bool(raw).unwrap_or_else(|| {
                issues.push(FieldIssue::new("includeDetails", "expected a boolean"));
                defaults.include_details
            }),
        };

        let policy_ids = params.get("policyIds").and_then(|raw| split_ids(raw));

        if !issues.is_empty() {
            return Err(ServiceError::InvalidFields {
                message: "Invalid analytics query".into(),
                details: issues,
            });
        }

        Ok(Self {
            time_range,
            metric_type,
            policy_ids,
            group_by,
            include_details,
        })
    }
}

/// Direction of a listing sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(super) const ALLOWED: &'static str = "asc, desc";

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

// ---------------------------------------------------------------------------
// Compliance report request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Audit,
    Access,
    PolicyChanges,
    Violations,
}

impl ReportType {
    const ALLOWED: &'static str = "audit, access, policy_changes, violations";

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "audit" => Some(Self::Audit),
            "access" => Some(Self::Access),
            "policy_changes" => Some(Self::PolicyChanges),
            "violations" => Some(Self::Violations),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audit => "audit",
            Self::Access => "access",
            Self::PolicyChanges => "policy_changes",
            Self::Violations => "violations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    const ALLOWED: &'static str = "json, csv";

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Validated `POST /policies/analytics` body.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub include_details: bool,
    pub policy_ids: Option<Vec<String>>,
    pub user_ids: Option<Vec<String>>,
}

impl ReportRequest {
    /// Validate a decoded JSON body.
    pub fn parse(body: &Value) -> Result<Self, ServiceError> {
        let mut issues = Vec::new();

        let Some(obj) = body.as_object() else {
            return Err(invalid_report(vec![FieldIssue::new("", "expected an object")]));
        };

        let start_date = parse_datetime(obj.get("startDate"), "startDate", &mut issues);
        let end_date = parse_datetime(obj.get("endDate"), "endDate", &mut issues);

        let report_type = parse_choice(
            string_field(obj.get("reportType"), "reportType", &mut issues).as_ref(),
            "reportType",
            ReportType::from_str,
            ReportType::ALLOWED,
            ReportType::Audit,
            &mut issues,
        );
        let format = parse_choice(
            string_field(obj.get("format"), "format", &mut issues).as_ref(),
            "format",
            ReportFormat::from_str,
            ReportFormat::ALLOWED,
            ReportFormat::Json,
            &mut issues,
        );

        let include_details = match obj.get("includeDetails") {
            None | Some(Value::Null) => Some(true),
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => parse_bool(s),
            Some(_) => None,
        }
        .unwrap_or_else(|| {
            issues.push(FieldIssue::new("includeDetails", "expected a boolean"));
            true
        });

        let policy_ids = string_list(obj.get("policyIds"), "policyIds", &mut issues);
        let user_ids = string_list(obj.get("userIds"), "userIds", &mut issues);

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                issues.push(FieldIssue::new("endDate", "must not be before startDate"));
            }
        }

        match (start_date, end_date) {
            (Some(start_date), Some(end_date)) if issues.is_empty() => Ok(Self {
                start_date,
                end_date,
                report_type,
                format,
                include_details,
                policy_ids,
                user_ids,
            }),
            _ => Err(invalid_report(issues)),
        }
    }
}

fn invalid_report(details: Vec<FieldIssue>) -> ServiceError {
    ServiceError::InvalidFields {
        message: "Invalid compliance report request".into(),
        details,
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

pub(super) fn parse_choice<T: Copy>(
    raw: Option<&String>,
    path: &str,
    from_str: fn(&str) -> Option<T>,
    allowed: &str,
    default: T,
    issues: &mut Vec<FieldIssue>,
) -> T {
    match raw {
        None => default,
        Some(s) => from_str(s).unwrap_or_else(|| {
            issues.push(FieldIssue::new(path, format!("expected one of {allowed}")));
            default
        }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "1" => Some(true),
        "false" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Comma-separated ids, blanks dropped. An empty list means "no filter".
pub(super) fn split_ids(raw: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn string_field(value: Option<&Value>, path: &str, issues: &mut Vec<FieldIssue>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(FieldIssue::new(path, "expected a string"));
            None
        }
    }
}

fn parse_datetime(
    value: Option<&Value>,
    path: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<DateTime<Utc>> {
    match value {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new(path, "required"));
            None
        }
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                issues.push(FieldIssue::new(path, "expected an RFC 3339 datetime"));
                None
            }
        },
        Some(_) => {
            issues.push(FieldIssue::new(path, "expected an RFC 3339 datetime"));
            None
        }
    }
}

fn string_list(value: Option<&Value>, path: &str, issues: &mut Vec<FieldIssue>) -> Option<Vec<String>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => issues.push(FieldIssue::new(format!("{path}.{i}"), "expected a string")),
                }
            }
            // an empty list filters nothing, same as an absent one
            (!out.is_empty()).then_some(out)
        }
        Some(_) => {
            issues.push(FieldIssue::new(path, "expected an array of strings"));
            None
        }
    }
}
