use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json, json};

use supplyerp_core::{Principal, new_id, to_db_timestamp};
use supplyerp_sql::Value;

use super::{
    ACCESS_REQUESTS, AUDIT_LOGS, AnalyticsError, AnalyticsService, EVALUATION_LOGS, Filter, newest,
};
use crate::model::{
    AccessRequest, AuditLog, Decision, NewAccessRequest, NewAuditLog, NewEvaluationLog, Policy,
    PolicyEvaluationLog,
};

/// Compliance flag carried by every audit row the service writes itself.
pub const AUDIT_REQUIRED: &str = "AUDIT_REQUIRED";

/// An audit row the service emits on its own behalf.
#[derive(Debug, Clone)]
pub(crate) struct AuditEvent {
    event_type: String,
    category: String,
    data: Map<String, Json>,
}

impl AuditEvent {
    pub fn new(event_type: &str, category: &str, actor: &Principal, action: &str) -> Self {
        let mut data = Map::new();
        data.insert("actor".into(), json!({"userId": actor.id, "action": action}));
        Self {
            event_type: event_type.to_string(),
            category: category.to_string(),
            data,
        }
    }

    /// A `POLICY` category event about `policy`.
    pub fn policy(event_type: &str, action: &str, actor: &Principal, policy: &Policy) -> Self {
        Self::new(event_type, "POLICY", actor, action).with(
            "resource",
            json!({
                "resourceType": "policy",
                "resourceId": policy.id,
                "resourceName": policy.name,
            }),
        )
    }

    pub fn with(mut self, key: &str, value: Json) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_changes(self, changes: Json) -> Self {
        self.with("changes", changes)
    }

    pub fn with_reason(self, reason: &str) -> Self {
        self.with("reason", Json::String(reason.to_string()))
    }

    fn into_new(self) -> NewAuditLog {
        NewAuditLog {
            event_type: self.event_type,
            event_category: self.category,
            event_data: Json::Object(self.data),
            success: true,
            compliance_flags: vec![AUDIT_REQUIRED.to_string()],
            source: "api".to_string(),
            timestamp: None,
        }
    }
}

impl AnalyticsService {
    // ── Ingestion ──

    pub fn record_evaluation(
        &self,
        input: NewEvaluationLog,
    ) -> Result<PolicyEvaluationLog, AnalyticsError> {
        let issues = input.validate();
        if !issues.is_empty() {
            return Err(AnalyticsError::invalid("Invalid evaluation log", issues));
        }

        let log = PolicyEvaluationLog {
            id: new_id(),
            policy_id: input.policy_id,
            evaluation_time: input.evaluation_time,
            final_decision: input.final_decision,
            user_id: input.user_id,
            resource_type: input.resource_type,
            created_at: input.created_at.unwrap_or_else(Utc::now),
        };
        self.insert_record(EVALUATION_LOGS, &log.id, &log, &[
            ("policy_id", Value::Text(log.policy_id.clone())),
            ("final_decision", Value::Text(log.final_decision.as_str().into())),
            ("evaluation_time", Value::Real(log.evaluation_time)),
            ("created_at", Value::Text(to_db_timestamp(log.created_at))),
        ])?;
        Ok(log)
    }

    pub fn record_access_request(
        &self,
        input: NewAccessRequest,
    ) -> Result<AccessRequest, AnalyticsError> {
        let issues = input.validate();
        if !issues.is_empty() {
            return Err(AnalyticsError::invalid("Invalid access request", issues));
        }

        let request = AccessRequest {
            id: new_id(),
            decision: input.decision,
            request_data: input.request_data,
            matched_policies: input.matched_policies,
            evaluation_time: input.evaluation_time,
            evaluation_result: input.evaluation_result,
            ip_address: input.ip_address,
            created_at: input.created_at.unwrap_or_else(Utc::now),
        };
        self.insert_record(ACCESS_REQUESTS, &request.id, &request, &[
            ("decision", Value::Text(request.decision.as_str().into())),
            ("ip_address", Value::from(request.ip_address.clone())),
            ("created_at", Value::Text(to_db_timestamp(request.created_at))),
        ])?;
        Ok(request)
    }

    pub fn record_audit(&self, input: NewAuditLog) -> Result<AuditLog, AnalyticsError> {
        let issues = input.validate();
        if !issues.is_empty() {
            return Err(AnalyticsError::invalid("Invalid audit log", issues));
        }

        let log = AuditLog {
            id: new_id(),
            event_type: input.event_type,
            event_category: input.event_category,
            event_data: input.event_data,
            success: input.success,
            compliance_flags: input.compliance_flags,
            source: input.source,
            timestamp: input.timestamp.unwrap_or_else(Utc::now),
        };
        self.insert_record(AUDIT_LOGS, &log.id, &log, &[
            ("event_type", Value::Text(log.event_type.clone())),
            ("event_category", Value::Text(log.event_category.clone())),
            ("success", Value::from(log.success)),
            ("timestamp", Value::Text(to_db_timestamp(log.timestamp))),
        ])?;
        Ok(log)
    }

    /// Write an audit row without failing the caller. Errors are logged.
    pub(crate) fn audit_best_effort(&self, event: AuditEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.record_audit(event.into_new()) {
            tracing::warn!(event_type = %event_type, error = %e, "failed to write audit log");
        }
    }

    // ── Range loaders (newest first) ──

    pub fn evaluation_logs(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        policy_ids: Option<&[String]>,
    ) -> Result<Vec<PolicyEvaluationLog>, AnalyticsError> {
        let mut filter = window(Filter::new(), "created_at", start, end);
        if let Some(ids) = policy_ids {
            filter = filter.any_of("policy_id", ids);
        }
        self.select_records(EVALUATION_LOGS, &filter, newest("created_at"), None)
    }

    pub fn access_requests(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        decision: Option<Decision>,
    ) -> Result<Vec<AccessRequest>, AnalyticsError> {
        let mut filter = window(Filter::new(), "created_at", start, end);
        if let Some(d) = decision {
            filter = filter.eq("decision", d.as_str());
        }
        self.select_records(ACCESS_REQUESTS, &filter, newest("created_at"), None)
    }

    pub fn audit_logs(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        category: Option<&str>,
    ) -> Result<Vec<AuditLog>, AnalyticsError> {
        let mut filter = window(Filter::new(), "timestamp", start, end);
        if let Some(c) = category {
            filter = filter.eq("event_category", c);
        }
        self.select_records(AUDIT_LOGS, &filter, newest("timestamp"), None)
    }

    pub(crate) fn count_since(
        &self,
        table: &str,
        ts_col: &str,
        start: DateTime<Utc>,
    ) -> Result<usize, AnalyticsError> {
        self.count_records(table, &Filter::new().since(ts_col, start))
    }
}

fn window(filter: Filter, col: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Filter {
    let filter = filter.since(col, start);
    match end {
        Some(end) => filter.until(col, end),
        None => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::test_service;
    use chrono::{Duration, TimeZone};

    fn eval_at(policy: &str, ts: DateTime<Utc>) -> NewEvaluationLog {
        NewEvaluationLog {
            policy_id: policy.into(),
            evaluation_time: 2.5,
            final_decision: Decision::Permit,
            user_id: None,
            resource_type: None,
            created_at: Some(ts),
        }
    }

    fn access_at(decision: Decision, ts: DateTime<Utc>) -> NewAccessRequest {
        serde_json::from_value(json!({
            "decision": decision,
            "createdAt": ts,
        }))
        .unwrap()
    }

    #[test]
    fn evaluation_range_and_policy_filter() {
        let svc = test_service();
        let base = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        svc.record_evaluation(eval_at("p1", base - Duration::hours(2))).unwrap();
        svc.record_evaluation(eval_at("p1", base)).unwrap();
        svc.record_evaluation(eval_at("p2", base + Duration::milliseconds(1))).unwrap();

        let all = svc.evaluation_logs(base, None, None).unwrap();
        assert_eq!(all.len(), 2);
        // newest first
        assert_eq!(all[0].policy_id, "p2");

        let ids = vec!["p1".to_string()];
        let p1 = svc.evaluation_logs(base - Duration::days(1), None, Some(&ids)).unwrap();
        assert_eq!(p1.len(), 2);

        let bounded = svc.evaluation_logs(base - Duration::days(1), Some(base), None).unwrap();
        assert_eq!(bounded.len(), 2);
    }

    #[test]
    fn window_bounds_compare_below_a_millisecond() {
        let svc = test_service();
        let midnight = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        svc.record_evaluation(eval_at("p1", midnight)).unwrap();

        let start = midnight + Duration::microseconds(900);
        assert!(svc.evaluation_logs(start, None, None).unwrap().is_empty());
        assert_eq!(svc.count_since(EVALUATION_LOGS, "created_at", start).unwrap(), 0);

        let end = midnight - Duration::microseconds(1);
        let before = svc.evaluation_logs(midnight - Duration::hours(1), Some(end), None).unwrap();
        assert!(before.is_empty());
        assert_eq!(svc.evaluation_logs(midnight, Some(midnight), None).unwrap().len(), 1);
    }

    #[test]
    fn rejects_invalid_ingest() {
        let svc = test_service();
        let mut bad = eval_at("p1", Utc::now());
        bad.evaluation_time = f64::NAN;
        assert!(matches!(svc.record_evaluation(bad), Err(AnalyticsError::Invalid { .. })));
    }

    #[test]
    fn access_decision_filter() {
        let svc = test_service();
        let now = Utc::now();
        svc.record_access_request(access_at(Decision::Deny, now)).unwrap();
        svc.record_access_request(access_at(Decision::Permit, now)).unwrap();
        let start = now - Duration::minutes(1);
        assert_eq!(svc.access_requests(start, None, None).unwrap().len(), 2);
        let denied = svc.access_requests(start, None, Some(Decision::Deny)).unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].decision, Decision::Deny);
        assert_eq!(svc.count_since(ACCESS_REQUESTS, "created_at", start).unwrap(), 2);
    }

    #[test]
    fn audit_event_shape() {
        let svc = test_service();
        let actor = Principal::new("u-9");
        svc.audit_best_effort(
            AuditEvent::new("COMPLIANCE_REPORT_GENERATED", "COMPLIANCE", &actor, "GENERATE_REPORT")
                .with("recordCount", json!(4)),
        );
        let logs = svc
            .audit_logs(Utc::now() - Duration::minutes(1), None, Some("COMPLIANCE"))
            .unwrap();
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.actor_id(), Some("u-9"));
        assert_eq!(log.event_data["recordCount"], 4);
        assert_eq!(log.compliance_flags, vec![AUDIT_REQUIRED]);
        assert_eq!(log.source, "api");
        assert!(log.success);
    }

    #[test]
    fn audit_category_filter() {
        let svc = test_service();
        let input: NewAuditLog = serde_json::from_value(json!({
            "eventType": "LOGIN_FAILED",
            "eventCategory": "AUTH",
            "success": false,
            "complianceFlags": ["SECURITY"]
        }))
        .unwrap();
        svc.record_audit(input).unwrap();
        let start = Utc::now() - Duration::minutes(1);
        assert_eq!(svc.audit_logs(start, None, None).unwrap().len(), 1);
        assert!(svc.audit_logs(start, None, Some("POLICY")).unwrap().is_empty());
    }
}
