//! Compliance report builders.
//!
//! Each builder takes rows already loaded for the report period (newest
//! first) and produces a summary plus flat export rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::aggregate::{Tally, mean, ratio};
use crate::model::{
    AccessRequest, AccessRow, AccessSummary, AuditLog, AuditRow, AuditSummary, Decision,
    PolicyChangeRow, PolicyChangesSummary, ReasonCount, ReportData, ReportRequest, ViolationRow,
    ViolationsSummary,
};

/// Audit category of policy catalog changes.
pub const POLICY_CATEGORY: &str = "POLICY";

/// Reason used when the engine recorded none.
pub const UNKNOWN_REASON: &str = "Unknown";

const THREAT_HIGH: &str = "high";
const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// `report_<unix millis>_<9 random chars>`.
pub fn report_id(now: DateTime<Utc>) -> String {
    let suffix: String = supplyerp_core::new_id().chars().take(9).collect();
    format!("report_{}_{}", now.timestamp_millis(), suffix)
}

/// Whole days covered by the period, rounded up.
pub fn duration_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let ms = (end - start).num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    (ms + MS_PER_DAY - 1) / MS_PER_DAY
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Optional restriction of report rows to given policies and users.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFilter<'a> {
    pub policy_ids: Option<&'a [String]>,
    pub user_ids: Option<&'a [String]>,
}

impl<'a> RecordFilter<'a> {
    pub fn from_request(req: &'a ReportRequest) -> Self {
        Self {
            policy_ids: req.policy_ids.as_deref(),
            user_ids: req.user_ids.as_deref(),
        }
    }

    pub fn matches_access(&self, request: &AccessRequest) -> bool {
        let policy_ok = self.policy_ids.is_none_or(|ids| {
            request.matched_policies.iter().any(|p| ids.contains(p))
        });
        policy_ok && contains_opt(self.user_ids, request.user_id())
    }

    pub fn matches_audit(&self, log: &AuditLog) -> bool {
        contains_opt(self.policy_ids, log.resource_id()) && contains_opt(self.user_ids, log.actor_id())
    }
}

/// True when there is no filter, or `value` is present and listed.
fn contains_opt(ids: Option<&[String]>, value: Option<&str>) -> bool {
    match ids {
        None => true,
        Some(ids) => value.is_some_and(|v| ids.iter().any(|id| id == v)),
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn audit(logs: &[AuditLog], include_details: bool) -> Result<ReportData, serde_json::Error> {
    let successes = logs.iter().filter(|l| l.success).count();
    let summary = AuditSummary {
        total_records: logs.len(),
        event_types: unique(logs.iter().map(|l| l.event_type.as_str())),
        success_rate: ratio(successes, logs.len()),
        compliance_flags: unique(
            logs.iter()
                .flat_map(|l| l.compliance_flags.iter().map(String::as_str)),
        ),
    };
    let rows = logs.iter().map(|log| AuditRow {
        timestamp: log.timestamp,
        event_type: log.event_type.clone(),
        event_category: log.event_category.clone(),
        success: log.success,
        compliance_flags: log.compliance_flags.clone(),
        details: include_details.then(|| log.event_data.clone()),
    });
    build(&summary, rows)
}

pub fn access(
    requests: &[AccessRequest],
    include_details: bool,
) -> Result<ReportData, serde_json::Error> {
    let total = requests.len();
    let permits = count_decision(requests, Decision::Permit);
    let denies = count_decision(requests, Decision::Deny);
    let times: Vec<f64> = requests
        .iter()
        .map(|r| r.evaluation_time.unwrap_or(0.0))
        .collect();
    let summary = AccessSummary {
        total_records: total,
        permit_rate: ratio(permits, total),
        deny_rate: ratio(denies, total),
        average_evaluation_time: mean(&times),
    };
    let rows = requests.iter().map(|req| AccessRow {
        timestamp: req.created_at,
        decision: req.decision,
        evaluation_time: req.evaluation_time,
        matched_policies: req.matched_policies.clone(),
        details: include_details.then(|| req.request_data.clone()),
    });
    build(&summary, rows)
}

/// Audit rows outside the `POLICY` category are skipped.
pub fn policy_changes(
    logs: &[AuditLog],
    include_details: bool,
) -> Result<ReportData, serde_json::Error> {
    let changes: Vec<&AuditLog> = logs
        .iter()
        .filter(|l| l.event_category == POLICY_CATEGORY)
        .collect();
    let summary = PolicyChangesSummary {
        total_records: changes.len(),
        change_types: unique(changes.iter().map(|l| l.event_type.as_str())),
        affected_policies: unique(changes.iter().filter_map(|l| l.resource_id())),
    };
    let rows = changes.iter().map(|log| PolicyChangeRow {
        timestamp: log.timestamp,
        event_type: log.event_type.clone(),
        policy_id: log.resource_id().map(String::from),
        policy_name: log.resource_name().map(String::from),
        details: include_details.then(|| log.event_data.clone()),
    });
    build(&summary, rows)
}

/// Only denied requests count as violations.
pub fn violations(
    requests: &[AccessRequest],
    include_details: bool,
) -> Result<ReportData, serde_json::Error> {
    let denied: Vec<&AccessRequest> = requests
        .iter()
        .filter(|r| r.decision == Decision::Deny)
        .collect();

    let mut reasons = Tally::new();
    for req in &denied {
        reasons.add(req.reason().unwrap_or(UNKNOWN_REASON));
    }

    let summary = ViolationsSummary {
        total_records: denied.len(),
        violation_rate: denied.len(),
        top_violation_reasons: reasons
            .ranked(Some(10))
            .into_iter()
            .map(|(reason, count)| ReasonCount { reason, count })
            .collect(),
        suspicious_activity: denied
            .iter()
            .filter(|r| r.threat_level() == Some(THREAT_HIGH))
            .count(),
    };
    let rows = denied.iter().map(|req| ViolationRow {
        timestamp: req.created_at,
        user_id: req.user_id().map(String::from),
        resource_type: req.resource_type().map(String::from),
        action: req.action().map(String::from),
        reason: req.reason().unwrap_or(UNKNOWN_REASON).to_string(),
        details: include_details.then(|| req.request_data.clone()),
    });
    build(&summary, rows)
}

fn count_decision(requests: &[AccessRequest], decision: Decision) -> usize {
    requests.iter().filter(|r| r.decision == decision).count()
}

/// Distinct values in first-seen order.
fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !out.iter().any(|seen| seen == v) {
            out.push(v.to_string());
        }
    }
    out
}

fn build<S, R>(summary: &S, rows: impl Iterator<Item = R>) -> Result<ReportData, serde_json::Error>
where
    S: Serialize,
    R: Serialize,
{
    Ok(ReportData {
        summary: serde_json::to_value(summary)?,
        rows: rows
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 8, 0, 0).unwrap()
    }

    fn audit_log(event: &str, category: &str, success: bool, data: Value, flags: &[&str]) -> AuditLog {
        AuditLog {
            id: format!("{event}-{category}"),
            event_type: event.into(),
            event_category: category.into(),
            event_data: data,
            success,
            compliance_flags: flags.iter().map(|f| f.to_string()).collect(),
            source: "api".into(),
            timestamp: ts(3),
        }
    }

    fn request(decision: Decision, data: Value, result: Option<Value>, policies: &[&str]) -> AccessRequest {
        AccessRequest {
            id: "r".into(),
            decision,
            request_data: data,
            matched_policies: policies.iter().map(|p| p.to_string()).collect(),
            evaluation_time: Some(4.0),
            evaluation_result: result,
            ip_address: None,
            created_at: ts(2),
        }
    }

    #[test]
    fn audit_summary_and_rows() {
        let logs = vec![
            audit_log("POLICY_CREATED", "POLICY", true, json!({"k": 1}), &["SOX"]),
            audit_log("LOGIN", "AUTH", false, json!({}), &["SOX", "GDPR"]),
            audit_log("POLICY_CREATED", "POLICY", true, json!({}), &[]),
        ];
        let data = audit(&logs, true).unwrap();
        assert_eq!(data.summary["totalRecords"], 3);
        assert_eq!(data.summary["eventTypes"], json!(["POLICY_CREATED", "LOGIN"]));
        assert_eq!(data.summary["complianceFlags"], json!(["SOX", "GDPR"]));
        assert!((data.summary["successRate"].as_f64().unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(data.rows[0]["details"], json!({"k": 1}));

        let keys: Vec<&String> = data.rows[0].as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec!["timestamp", "eventType", "eventCategory", "success", "complianceFlags", "details"]
        );
    }

    #[test]
    fn details_omitted_when_not_requested() {
        let logs = vec![audit_log("X", "Y", true, json!({"secret": true}), &[])];
        let data = audit(&logs, false).unwrap();
        assert!(data.rows[0].get("details").is_none());
    }

    #[test]
    fn empty_reports_have_zero_rates() {
        let data = audit(&[], true).unwrap();
        assert_eq!(data.summary["successRate"], 0.0);
        assert!(data.rows.is_empty());
        let data = access(&[], true).unwrap();
        assert_eq!(data.summary["permitRate"], 0.0);
        assert_eq!(data.summary["averageEvaluationTime"], 0.0);
    }

    #[test]
    fn access_rates() {
        let reqs = vec![
            request(Decision::Permit, json!({}), None, &["p1"]),
            request(Decision::Deny, json!({}), None, &["p2"]),
            request(Decision::Deny, json!({}), None, &[]),
            request(Decision::Indeterminate, json!({}), None, &[]),
        ];
        let data = access(&reqs, false).unwrap();
        assert_eq!(data.summary["permitRate"], 0.25);
        assert_eq!(data.summary["denyRate"], 0.5);
        assert_eq!(data.summary["averageEvaluationTime"], 4.0);
        assert_eq!(data.rows[0]["matchedPolicies"], json!(["p1"]));
    }

    #[test]
    fn policy_changes_keeps_policy_category() {
        let logs = vec![
            audit_log(
                "POLICY_UPDATED",
                "POLICY",
                true,
                json!({"resource": {"resourceId": "p1", "resourceName": "GRN threshold"}}),
                &[],
            ),
            audit_log("LOGIN", "AUTH", true, json!({}), &[]),
            audit_log("POLICY_DELETED", "POLICY", true, json!({}), &[]),
        ];
        let data = policy_changes(&logs, false).unwrap();
        assert_eq!(data.summary["totalRecords"], 2);
        assert_eq!(data.summary["changeTypes"], json!(["POLICY_UPDATED", "POLICY_DELETED"]));
        assert_eq!(data.summary["affectedPolicies"], json!(["p1"]));
        assert_eq!(data.rows[0]["policyName"], "GRN threshold");
        assert_eq!(data.rows[1]["policyId"], Value::Null);
    }

    #[test]
    fn violations_tally_reasons_and_threats() {
        let high = json!({"subject": {"userId": "u1"}, "environment": {"threatLevel": "high"}});
        let reqs = vec![
            request(Decision::Deny, high.clone(), Some(json!({"reason": "over budget"})), &[]),
            request(Decision::Deny, json!({}), Some(json!({"reason": "over budget"})), &[]),
            request(Decision::Deny, high, None, &[]),
            request(Decision::Permit, json!({}), None, &[]),
        ];
        let data = violations(&reqs, false).unwrap();
        assert_eq!(data.summary["totalRecords"], 3);
        assert_eq!(data.summary["violationRate"], 3);
        assert_eq!(data.summary["suspiciousActivity"], 2);
        assert_eq!(
            data.summary["topViolationReasons"],
            json!([{"reason": "over budget", "count": 2}, {"reason": "Unknown", "count": 1}])
        );
        assert_eq!(data.rows[0]["userId"], "u1");
        assert_eq!(data.rows[2]["reason"], UNKNOWN_REASON);
    }

    #[test]
    fn record_filter() {
        let policies = vec!["p1".to_string()];
        let users = vec!["u1".to_string()];
        let filter = RecordFilter {
            policy_ids: Some(&policies),
            user_ids: Some(&users),
        };
        let hit = request(Decision::Deny, json!({"subject": {"userId": "u1"}}), None, &["p2", "p1"]);
        let wrong_user = request(Decision::Deny, json!({"subject": {"userId": "u2"}}), None, &["p1"]);
        let no_policy = request(Decision::Deny, json!({"subject": {"userId": "u1"}}), None, &[]);
        assert!(filter.matches_access(&hit));
        assert!(!filter.matches_access(&wrong_user));
        assert!(!filter.matches_access(&no_policy));
        assert!(RecordFilter::default().matches_access(&no_policy));

        let log = audit_log(
            "POLICY_UPDATED",
            "POLICY",
            true,
            json!({"resource": {"resourceId": "p1"}, "actor": {"userId": "u1"}}),
            &[],
        );
        assert!(filter.matches_audit(&log));
        let users_only = RecordFilter { policy_ids: None, user_ids: Some(&users) };
        assert!(!users_only.matches_audit(&audit_log("X", "Y", true, json!({}), &[])));
    }

    #[test]
    fn id_and_duration() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = report_id(now);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts[0], "report");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);

        assert_eq!(duration_days(ts(1), ts(1)), 0);
        assert_eq!(duration_days(ts(1), ts(2)), 1);
        assert_eq!(duration_days(ts(1), ts(2) + chrono::Duration::seconds(1)), 2);
    }
}
