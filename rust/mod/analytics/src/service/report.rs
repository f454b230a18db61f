use chrono::{DateTime, Utc};
use serde_json::json;

use supplyerp_core::Principal;

use super::events::AuditEvent;
use super::{AnalyticsError, AnalyticsService};
use crate::model::{
    ComplianceReport, Decision, ReportData, ReportFilters, ReportMetadata, ReportPeriod,
    ReportRequest, ReportType,
};
use crate::report::{self, POLICY_CATEGORY, RecordFilter};

impl AnalyticsService {
    /// Build a compliance report for `[start_date, end_date]` and record
    /// its generation in the audit trail.
    pub fn generate_report(
        &self,
        req: &ReportRequest,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<ComplianceReport, AnalyticsError> {
        let data = self.report_data(req)?;

        let report = ComplianceReport {
            report_id: report::report_id(now),
            report_type: req.report_type,
            generated_at: now,
            period: ReportPeriod {
                start_date: req.start_date,
                end_date: req.end_date,
                duration_days: report::duration_days(req.start_date, req.end_date),
            },
            summary: data.summary,
            data: data.rows,
            metadata: ReportMetadata {
                format: req.format,
                include_details: req.include_details,
                filters: ReportFilters {
                    policy_ids: req.policy_ids.clone(),
                    user_ids: req.user_ids.clone(),
                },
            },
        };

        tracing::info!(
            report_id = %report.report_id,
            report_type = report.report_type.as_str(),
            records = report.record_count(),
            actor = %actor.id,
            "compliance report generated"
        );
        self.audit_best_effort(
            AuditEvent::new("COMPLIANCE_REPORT_GENERATED", "COMPLIANCE", actor, "GENERATE_REPORT")
                .with("reportId", json!(report.report_id))
                .with("reportType", json!(report.report_type))
                .with(
                    "period",
                    json!({"startDate": req.start_date, "endDate": req.end_date}),
                )
                .with("format", json!(req.format))
                .with("recordCount", json!(report.record_count())),
        );
        Ok(report)
    }

    fn report_data(&self, req: &ReportRequest) -> Result<ReportData, AnalyticsError> {
        let filter = RecordFilter::from_request(req);
        let (start, end) = (req.start_date, Some(req.end_date));
        let details = req.include_details;

        let data = match req.report_type {
            ReportType::Audit => {
                let mut logs = self.audit_logs(start, end, None)?;
                logs.retain(|l| filter.matches_audit(l));
                report::audit(&logs, details)?
            }
            ReportType::PolicyChanges => {
                let mut logs = self.audit_logs(start, end, Some(POLICY_CATEGORY))?;
                logs.retain(|l| filter.matches_audit(l));
                report::policy_changes(&logs, details)?
            }
            ReportType::Access => {
                let mut requests = self.access_requests(start, end, None)?;
                requests.retain(|r| filter.matches_access(r));
                report::access(&requests, details)?
            }
            ReportType::Violations => {
                let mut requests = self.access_requests(start, end, Some(Decision::Deny))?;
                requests.retain(|r| filter.matches_access(r));
                report::violations(&requests, details)?
            }
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewAccessRequest, ReportFormat};
    use crate::service::tests::test_service;
    use chrono::{Duration, TimeZone};

    fn request(report_type: ReportType, start: DateTime<Utc>, end: DateTime<Utc>) -> ReportRequest {
        ReportRequest {
            start_date: start,
            end_date: end,
            report_type,
            format: ReportFormat::Json,
            include_details: false,
            policy_ids: None,
            user_ids: None,
        }
    }

    fn deny_at(svc: &AnalyticsService, user: &str, ts: DateTime<Utc>) {
        let req: NewAccessRequest = serde_json::from_value(json!({
            "decision": "DENY",
            "matchedPolicies": ["p-budget"],
            "requestData": {"subject": {"userId": user}},
            "evaluationResult": {"reason": "over budget"},
            "createdAt": ts,
        }))
        .unwrap();
        svc.record_access_request(req).unwrap();
    }

    #[test]
    fn violations_report_in_period() {
        let svc = test_service();
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(7);
        deny_at(&svc, "u1", start + Duration::days(1));
        deny_at(&svc, "u2", start + Duration::days(2));
        deny_at(&svc, "u1", end + Duration::days(1));

        let now = end + Duration::days(2);
        let report = svc
            .generate_report(&request(ReportType::Violations, start, end), &Principal::new("auditor"), now)
            .unwrap();
        assert!(report.report_id.starts_with(&format!("report_{}_", now.timestamp_millis())));
        assert_eq!(report.period.duration_days, 7);
        assert_eq!(report.record_count(), 2);
        assert_eq!(report.summary["topViolationReasons"][0]["count"], 2);
        // newest first
        assert_eq!(report.data[0]["userId"], "u2");
    }

    #[test]
    fn user_filter_restricts_rows() {
        let svc = test_service();
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(3);
        deny_at(&svc, "u1", start + Duration::hours(1));
        deny_at(&svc, "u2", start + Duration::hours(2));

        let mut req = request(ReportType::Access, start, end);
        req.user_ids = Some(vec!["u1".into()]);
        let report = svc.generate_report(&req, &Principal::system(), end).unwrap();
        assert_eq!(report.record_count(), 1);
        assert_eq!(report.metadata.filters.user_ids, Some(vec!["u1".to_string()]));
    }

    #[test]
    fn empty_policy_list_keeps_every_row() {
        let svc = test_service();
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(3);
        deny_at(&svc, "u1", start + Duration::hours(1));
        deny_at(&svc, "u2", start + Duration::hours(2));

        let req = ReportRequest::parse(&json!({
            "startDate": start,
            "endDate": end,
            "reportType": "access",
            "policyIds": [],
        }))
        .unwrap();
        let report = svc.generate_report(&req, &Principal::system(), end).unwrap();
        assert_eq!(report.record_count(), 2);
        assert!(report.metadata.filters.policy_ids.is_none());
    }

    #[test]
    fn generation_is_audited() {
        let svc = test_service();
        let now = Utc::now();
        let req = request(ReportType::Audit, now - Duration::days(1), now);
        let first = svc.generate_report(&req, &Principal::new("auditor"), now).unwrap();
        assert_eq!(first.record_count(), 0);

        let logs = svc
            .audit_logs(now - Duration::minutes(1), None, Some("COMPLIANCE"))
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_type, "COMPLIANCE_REPORT_GENERATED");
        assert_eq!(logs[0].actor_id(), Some("auditor"));
        assert_eq!(logs[0].event_data["recordCount"], 0);
        assert_eq!(logs[0].event_data["reportType"], "audit");
    }
}
