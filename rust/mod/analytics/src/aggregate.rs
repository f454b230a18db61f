//! In-memory aggregation over loaded log rows.
//!
//! Everything here is pure: callers load the rows for a window, these
//! functions reduce them. Averages, rates and percentiles over an empty
//! set are `0.0`.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;

use crate::model::{
    AccessRequest, ActionCount, AnalyticsSummary, AuditLog, CategoryCount, ComplianceMetrics,
    Decision, FlagCount, GroupBy, IpCount, OverallPerformance, PerformanceMetrics,
    PeriodMetrics, PolicyEvaluationLog, ResourceCount, ResourceTypeCount, SecurityMetrics,
    SlowPolicy, SummaryCounts, SystemHealth, UsageMetrics, UserCount,
};

/// Bucket key for rows with no value for the grouping attribute.
pub const UNKNOWN_KEY: &str = "unknown";

/// Display name for policies missing from the catalog.
pub const UNKNOWN_POLICY: &str = "Unknown Policy";

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile: index `ceil(n·p) − 1` into a sorted copy,
/// clamped to the valid range.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (sorted.len() as f64 * p).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// `part / whole`, or 0 when `whole` is 0.
pub fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tally
// ---------------------------------------------------------------------------

/// Frequency counter that ranks keys by descending count.
#[derive(Debug, Default)]
pub struct Tally {
    counts: HashMap<String, usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn add_opt(&mut self, key: Option<&str>) {
        if let Some(key) = key {
            self.add(key);
        }
    }

    /// Keys by descending count, ties broken by key, truncated to `limit`.
    pub fn ranked(self, limit: Option<usize>) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self.counts.into_iter().collect();
        entries.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// Time-series bucket for one evaluation log.
pub fn bucket_key(log: &PolicyEvaluationLog, group_by: GroupBy) -> String {
    let ts = log.created_at;
    match group_by {
        GroupBy::Hour => ts.format("%Y-%m-%dT%H:00:00").to_string(),
        GroupBy::Day => ts.format("%Y-%m-%d").to_string(),
        GroupBy::Week => {
            let week = ts.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        GroupBy::Policy => log.policy_id.clone(),
        GroupBy::User => log.user_id.clone().unwrap_or_else(|| UNKNOWN_KEY.to_string()),
        GroupBy::Resource => log
            .resource_type
            .clone()
            .unwrap_or_else(|| UNKNOWN_KEY.to_string()),
    }
}

fn period_metrics(period: String, logs: &[&PolicyEvaluationLog]) -> PeriodMetrics {
    let times: Vec<f64> = logs.iter().map(|l| l.evaluation_time).collect();
    let permits = logs
        .iter()
        .filter(|l| l.final_decision == Decision::Permit)
        .count();
    let denies = logs
        .iter()
        .filter(|l| l.final_decision == Decision::Deny)
        .count();
    PeriodMetrics {
        period,
        total_evaluations: logs.len(),
        average_time: mean(&times),
        max_time: max_of(&times),
        min_time: min_of(&times),
        permit_rate: ratio(permits, logs.len()),
        deny_rate: ratio(denies, logs.len()),
    }
}

/// Policies with the highest mean evaluation time, slowest first.
pub fn slowest_policies(
    logs: &[PolicyEvaluationLog],
    names: &HashMap<String, String>,
    count: usize,
) -> Vec<SlowPolicy> {
    let mut times: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for log in logs {
        times
            .entry(log.policy_id.as_str())
            .or_default()
            .push(log.evaluation_time);
    }

    let mut policies: Vec<SlowPolicy> = times
        .into_iter()
        .map(|(policy_id, times)| SlowPolicy {
            policy_id: policy_id.to_string(),
            name: names
                .get(policy_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_POLICY.to_string()),
            average_time: mean(&times),
            max_time: max_of(&times),
            evaluation_count: times.len(),
        })
        .collect();
    policies.sort_by(|a, b| b.average_time.total_cmp(&a.average_time));
    policies.truncate(count);
    policies
}

/// Overall statistics plus a time series bucketed by `group_by`.
pub fn performance(
    logs: &[PolicyEvaluationLog],
    group_by: GroupBy,
    names: &HashMap<String, String>,
    slowest: usize,
) -> PerformanceMetrics {
    let mut groups: BTreeMap<String, Vec<&PolicyEvaluationLog>> = BTreeMap::new();
    for log in logs {
        groups.entry(bucket_key(log, group_by)).or_default().push(log);
    }

    let time_series = groups
        .into_iter()
        .map(|(period, members)| period_metrics(period, &members))
        .collect();

    let times: Vec<f64> = logs.iter().map(|l| l.evaluation_time).collect();
    PerformanceMetrics {
        overall: OverallPerformance {
            total_evaluations: logs.len(),
            average_evaluation_time: mean(&times),
            p95_evaluation_time: percentile(&times, 0.95),
            p99_evaluation_time: percentile(&times, 0.99),
            slowest_policies: slowest_policies(logs, names, slowest),
        },
        time_series,
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

pub fn usage(requests: &[AccessRequest], top_n: usize) -> UsageMetrics {
    let mut resource_types = Tally::new();
    let mut actions = Tally::new();
    let mut users = Tally::new();
    let mut decisions: BTreeMap<String, usize> = BTreeMap::from([
        (Decision::Permit.as_str().to_string(), 0),
        (Decision::Deny.as_str().to_string(), 0),
    ]);

    for request in requests {
        resource_types.add_opt(request.resource_type());
        actions.add_opt(request.action());
        users.add_opt(request.user_id());
        *decisions
            .entry(request.decision.as_str().to_string())
            .or_insert(0) += 1;
    }

    let permits = decisions.get(Decision::Permit.as_str()).copied().unwrap_or(0);
    let denies = decisions.get(Decision::Deny.as_str()).copied().unwrap_or(0);

    UsageMetrics {
        total_requests: requests.len(),
        top_resource_types: resource_types
            .ranked(Some(top_n))
            .into_iter()
            .map(|(resource_type, count)| ResourceTypeCount { resource_type, count })
            .collect(),
        top_actions: actions
            .ranked(Some(top_n))
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect(),
        top_users: users
            .ranked(Some(top_n))
            .into_iter()
            .map(|(user_id, count)| UserCount { user_id, count })
            .collect(),
        decision_breakdown: decisions,
        success_rate: ratio(permits, permits + denies),
    }
}

// ---------------------------------------------------------------------------
// Compliance
// ---------------------------------------------------------------------------

/// Only logs carrying at least one compliance flag count as auditable.
pub fn compliance(logs: &[AuditLog]) -> ComplianceMetrics {
    let mut flags = Tally::new();
    let mut categories = Tally::new();
    let mut total = 0;
    let mut successful = 0;

    for log in logs.iter().filter(|l| !l.compliance_flags.is_empty()) {
        total += 1;
        if log.success {
            successful += 1;
        }
        for flag in &log.compliance_flags {
            flags.add(flag);
        }
        categories.add(&log.event_category);
    }

    ComplianceMetrics {
        total_auditable_events: total,
        successful_events: successful,
        compliance_rate: ratio(successful, total),
        compliance_flags: flags
            .ranked(None)
            .into_iter()
            .map(|(flag, count)| FlagCount { flag, count })
            .collect(),
        event_categories: categories
            .ranked(None)
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Security
// ---------------------------------------------------------------------------

/// Denial patterns. Requests with other decisions are ignored.
///
/// An IP is suspicious once it has strictly more than `ip_threshold`
/// denials in the window.
pub fn security(requests: &[AccessRequest], ip_threshold: usize, top_n: usize) -> SecurityMetrics {
    let mut ips = Tally::new();
    let mut resources = Tally::new();
    let mut actions = Tally::new();
    let mut total = 0;

    for request in requests.iter().filter(|r| r.decision == Decision::Deny) {
        total += 1;
        ips.add_opt(request.ip_address.as_deref());
        resources.add_opt(request.resource_type());
        actions.add_opt(request.action());
    }

    SecurityMetrics {
        total_denied_requests: total,
        suspicious_ips: ips
            .ranked(None)
            .into_iter()
            .filter(|(_, count)| *count > ip_threshold)
            .take(top_n)
            .map(|(ip, count)| IpCount { ip, count })
            .collect(),
        most_denied_resources: resources
            .ranked(Some(top_n))
            .into_iter()
            .map(|(resource, count)| ResourceCount { resource, count })
            .collect(),
        most_denied_actions: actions
            .ranked(Some(top_n))
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn summary(counts: SummaryCounts, window_hours: f64) -> AnalyticsSummary {
    let evaluations_per_hour = if window_hours > 0.0 {
        counts.total_evaluations as f64 / window_hours
    } else {
        0.0
    };
    AnalyticsSummary {
        total_policies: counts.total_policies,
        active_policies: counts.active_policies,
        total_evaluations: counts.total_evaluations,
        total_access_requests: counts.total_access_requests,
        audit_events: counts.audit_events,
        evaluations_per_hour,
        system_health: if counts.active_policies > 0 {
            SystemHealth::Healthy
        } else {
            SystemHealth::Warning
        },
    }
}
