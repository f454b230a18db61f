use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{
    ACCESS_REQUESTS, AUDIT_LOGS, AnalyticsError, AnalyticsService, EVALUATION_LOGS, Filter, newest,
};
use crate::aggregate;
use crate::model::{
    AccessRequest, AnalyticsDetails, AnalyticsQuery, AnalyticsReport, AnalyticsSummary,
    ComplianceMetrics, Decision, DeniedRequest, GroupBy, MetricType, MetricsBundle,
    PerformanceMetrics, PolicyEvaluationLog, PolicyStatus, RecentEvaluation, SecurityMetrics,
    SummaryCounts, UsageMetrics,
};

impl AnalyticsService {
    /// Compute the metric sections `query` selects over the window ending
    /// at `now`, plus the summary.
    pub fn analytics(
        &self,
        query: &AnalyticsQuery,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsReport, AnalyticsError> {
        let start = query.time_range.start_from(now);
        let policy_ids = query.policy_ids.as_deref();
        let selected = |section| query.metric_type.includes(section);

        let metrics = MetricsBundle {
            performance: selected(MetricType::Performance)
                .then(|| self.performance_metrics(start, policy_ids, query.group_by))
                .transpose()?,
            usage: selected(MetricType::Usage)
                .then(|| self.usage_metrics(start, policy_ids))
                .transpose()?,
            compliance: selected(MetricType::Compliance)
                .then(|| self.compliance_metrics(start))
                .transpose()?,
            security: selected(MetricType::Security)
                .then(|| self.security_metrics(start))
                .transpose()?,
        };
        let summary = self.summary(start, now)?;
        let details = query
            .include_details
            .then(|| self.analytics_details(query, start))
            .transpose()?;

        tracing::debug!(
            time_range = ?query.time_range,
            metric_type = ?query.metric_type,
            "analytics computed"
        );
        Ok(AnalyticsReport {
            time_range: query.time_range,
            start_time: start,
            end_time: now,
            metrics,
            summary,
            details,
        })
    }

    /// Up to `top_n` newest rows per selected section.
    fn analytics_details(
        &self,
        query: &AnalyticsQuery,
        start: DateTime<Utc>,
    ) -> Result<AnalyticsDetails, AnalyticsError> {
        let page = Some((self.config.top_n, 0));

        let recent_evaluations = query
            .metric_type
            .includes(MetricType::Performance)
            .then(|| {
                let mut filter = Filter::new().since("created_at", start);
                if let Some(ids) = &query.policy_ids {
                    filter = filter.any_of("policy_id", ids);
                }
                let logs: Vec<PolicyEvaluationLog> =
                    self.select_records(EVALUATION_LOGS, &filter, newest("created_at"), page)?;
                Ok::<_, AnalyticsError>(logs.into_iter().map(RecentEvaluation::from).collect())
            })
            .transpose()?;

        let recent_denials = query
            .metric_type
            .includes(MetricType::Security)
            .then(|| {
                let filter = Filter::new()
                    .since("created_at", start)
                    .eq("decision", Decision::Deny.as_str());
                let requests: Vec<AccessRequest> =
                    self.select_records(ACCESS_REQUESTS, &filter, newest("created_at"), page)?;
                Ok::<_, AnalyticsError>(requests.iter().map(DeniedRequest::from).collect())
            })
            .transpose()?;

        Ok(AnalyticsDetails {
            recent_evaluations,
            recent_denials,
        })
    }

    pub fn performance_metrics(
        &self,
        start: DateTime<Utc>,
        policy_ids: Option<&[String]>,
        group_by: GroupBy,
    ) -> Result<PerformanceMetrics, AnalyticsError> {
        let logs = self.evaluation_logs(start, None, policy_ids)?;
        let mut ids: Vec<String> = logs.iter().map(|l| l.policy_id.clone()).collect();
        ids.sort();
        ids.dedup();
        let names: HashMap<String, String> = self.policy_names(&ids)?;
        Ok(aggregate::performance(
            &logs,
            group_by,
            &names,
            self.config.slowest_policies,
        ))
    }

    /// With `policy_ids`, only requests that matched one of them count.
    pub fn usage_metrics(
        &self,
        start: DateTime<Utc>,
        policy_ids: Option<&[String]>,
    ) -> Result<UsageMetrics, AnalyticsError> {
        let mut requests = self.access_requests(start, None, None)?;
        if let Some(ids) = policy_ids {
            requests.retain(|r| r.matched_policies.iter().any(|p| ids.contains(p)));
        }
        Ok(aggregate::usage(&requests, self.config.top_n))
    }

    pub fn compliance_metrics(&self, start: DateTime<Utc>) -> Result<ComplianceMetrics, AnalyticsError> {
        let logs = self.audit_logs(start, None, None)?;
        Ok(aggregate::compliance(&logs))
    }

    pub fn security_metrics(&self, start: DateTime<Utc>) -> Result<SecurityMetrics, AnalyticsError> {
        let denied = self.access_requests(start, None, Some(Decision::Deny))?;
        Ok(aggregate::security(
            &denied,
            self.config.suspicious_ip_threshold,
            self.config.top_n,
        ))
    }

    pub fn summary(
        &self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsSummary, AnalyticsError> {
        let counts = SummaryCounts {
            total_policies: self.count_policies(None)?,
            active_policies: self.count_policies(Some(PolicyStatus::Active))?,
            total_evaluations: self.count_since(EVALUATION_LOGS, "created_at", start)?,
            total_access_requests: self.count_since(ACCESS_REQUESTS, "created_at", start)?,
            audit_events: self.count_since(AUDIT_LOGS, "timestamp", start)?,
        };
        let window_hours = (now - start).num_milliseconds() as f64 / 3_600_000.0;
        Ok(aggregate::summary(counts, window_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CreatePolicy, NewAccessRequest, NewAuditLog, NewEvaluationLog, SystemHealth, TimeRange,
        UpdatePolicy,
    };
    use crate::service::tests::test_service;
    use chrono::Duration;
    use serde_json::json;
    use supplyerp_core::Principal;

    fn seed_eval(svc: &AnalyticsService, policy: &str, ms: f64, decision: Decision, at: DateTime<Utc>) {
        svc.record_evaluation(NewEvaluationLog {
            policy_id: policy.into(),
            evaluation_time: ms,
            final_decision: decision,
            user_id: None,
            resource_type: None,
            created_at: Some(at),
        })
        .unwrap();
    }

    fn seed_access(svc: &AnalyticsService, body: serde_json::Value) {
        let req: NewAccessRequest = serde_json::from_value(body).unwrap();
        svc.record_access_request(req).unwrap();
    }

    #[test]
    fn full_report_over_window() {
        let svc = test_service();
        let now = Utc::now();
        let actor = Principal::system();

        let policy: CreatePolicy =
            serde_json::from_value(json!({"name": "PR approval", "effect": "PERMIT"})).unwrap();
        let policy = svc.create_policy(policy, &actor).unwrap();
        svc.update_policy(
            &policy.id,
            UpdatePolicy { status: Some(PolicyStatus::Active), ..Default::default() },
            &actor,
        )
        .unwrap();

        seed_eval(&svc, &policy.id, 10.0, Decision::Permit, now - Duration::minutes(5));
        seed_eval(&svc, &policy.id, 20.0, Decision::Permit, now - Duration::minutes(4));
        seed_eval(&svc, "orphan", 30.0, Decision::Deny, now - Duration::minutes(3));
        // outside the 24h window
        seed_eval(&svc, &policy.id, 999.0, Decision::Deny, now - Duration::days(3));

        seed_access(&svc, json!({
            "decision": "PERMIT",
            "matchedPolicies": [policy.id],
            "requestData": {"subject": {"userId": "chef"}, "action": {"actionType": "create"}}
        }));
        seed_access(&svc, json!({
            "decision": "DENY",
            "ipAddress": "192.0.2.7",
            "requestData": {"resource": {"resourceType": "vendor"}}
        }));

        let report = svc.analytics(&AnalyticsQuery::default(), now).unwrap();
        assert_eq!(report.time_range, TimeRange::LastDay);
        assert_eq!(report.end_time - report.start_time, Duration::hours(24));

        let perf = report.metrics.performance.unwrap();
        assert_eq!(perf.overall.total_evaluations, 3);
        assert_eq!(perf.overall.average_evaluation_time, 20.0);
        assert_eq!(perf.overall.p95_evaluation_time, 30.0);
        let names: Vec<&str> = perf.overall.slowest_policies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Unknown Policy", "PR approval"]);

        let usage = report.metrics.usage.unwrap();
        assert_eq!(usage.total_requests, 2);
        assert_eq!(usage.success_rate, 0.5);

        let security = report.metrics.security.unwrap();
        assert_eq!(security.total_denied_requests, 1);
        assert!(security.suspicious_ips.is_empty());

        // two POLICY audits written by create + update
        let compliance = report.metrics.compliance.unwrap();
        assert_eq!(compliance.total_auditable_events, 2);
        assert_eq!(compliance.compliance_rate, 1.0);

        assert_eq!(report.summary.total_policies, 1);
        assert_eq!(report.summary.active_policies, 1);
        assert_eq!(report.summary.total_evaluations, 3);
        assert_eq!(report.summary.total_access_requests, 2);
        assert_eq!(report.summary.audit_events, 2);
        assert_eq!(report.summary.evaluations_per_hour, 3.0 / 24.0);
        assert_eq!(report.summary.system_health, SystemHealth::Healthy);
    }

    #[test]
    fn only_selected_sections() {
        let svc = test_service();
        let query = AnalyticsQuery { metric_type: MetricType::Security, ..Default::default() };
        let report = svc.analytics(&query, Utc::now()).unwrap();
        assert!(report.metrics.performance.is_none());
        assert!(report.metrics.usage.is_none());
        assert!(report.metrics.compliance.is_none());
        assert!(report.metrics.security.is_some());
        assert_eq!(report.summary.system_health, SystemHealth::Warning);

        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["metrics"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn policy_filter_applies_to_performance_and_usage() {
        let svc = test_service();
        let now = Utc::now();
        seed_eval(&svc, "p1", 1.0, Decision::Permit, now - Duration::minutes(1));
        seed_eval(&svc, "p2", 9.0, Decision::Permit, now - Duration::minutes(1));
        seed_access(&svc, json!({"decision": "PERMIT", "matchedPolicies": ["p1"]}));
        seed_access(&svc, json!({"decision": "DENY", "matchedPolicies": ["p2"]}));

        let query = AnalyticsQuery {
            policy_ids: Some(vec!["p1".into()]),
            ..Default::default()
        };
        let report = svc.analytics(&query, now).unwrap();
        assert_eq!(report.metrics.performance.unwrap().overall.total_evaluations, 1);
        assert_eq!(report.metrics.usage.unwrap().total_requests, 1);
        // security ignores the policy filter
        assert_eq!(report.metrics.security.unwrap().total_denied_requests, 1);
        // summary counts every evaluation in the window
        assert_eq!(report.summary.total_evaluations, 2);
    }

    #[test]
    fn details_only_when_requested() {
        let svc = test_service();
        let now = Utc::now();
        for i in 0..12 {
            seed_eval(&svc, "p1", 1.0, Decision::Permit, now - Duration::minutes(i));
        }
        seed_eval(&svc, "p2", 1.0, Decision::Permit, now);
        seed_access(&svc, json!({"decision": "DENY", "ipAddress": "198.51.100.4",
            "requestData": {"subject": {"userId": "night-guard"}}}));

        let plain = svc.analytics(&AnalyticsQuery::default(), now).unwrap();
        assert!(plain.details.is_none());
        assert!(serde_json::to_value(&plain).unwrap().get("details").is_none());

        let query = AnalyticsQuery {
            include_details: true,
            policy_ids: Some(vec!["p1".into()]),
            ..Default::default()
        };
        let details = svc.analytics(&query, now).unwrap().details.unwrap();
        let evals = details.recent_evaluations.unwrap();
        assert_eq!(evals.len(), svc.config().top_n);
        assert_eq!(evals[0].created_at, now);
        let denials = details.recent_denials.unwrap();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].user_id.as_deref(), Some("night-guard"));

        let usage_only = AnalyticsQuery {
            include_details: true,
            metric_type: MetricType::Usage,
            ..Default::default()
        };
        let details = svc.analytics(&usage_only, now).unwrap().details.unwrap();
        assert!(details.recent_evaluations.is_none());
        assert!(details.recent_denials.is_none());
    }

    #[test]
    fn compliance_skips_unflagged_audits() {
        let svc = test_service();
        let plain: NewAuditLog =
            serde_json::from_value(json!({"eventType": "VIEW", "eventCategory": "UI"})).unwrap();
        svc.record_audit(plain).unwrap();
        let c = svc.compliance_metrics(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(c.total_auditable_events, 0);
        assert_eq!(c.compliance_rate, 0.0);
    }
}
