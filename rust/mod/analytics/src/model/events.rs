use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use supplyerp_core::FieldIssue;

/// Outcome of one policy-engine evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Permit,
    Deny,
    NotApplicable,
    Indeterminate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permit => "PERMIT",
            Self::Deny => "DENY",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Indeterminate => "INDETERMINATE",
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyEvaluationLog
// ---------------------------------------------------------------------------

/// One persisted policy-engine decision with its duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationLog {
    pub id: String,
    pub policy_id: String,
    /// Evaluation duration in milliseconds.
    pub evaluation_time: f64,
    pub final_decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvaluationLog {
    pub policy_id: String,
    pub evaluation_time: f64,
    pub final_decision: Decision,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Backfilled imports may carry their own timestamp; defaults to now.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewEvaluationLog {
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if self.policy_id.trim().is_empty() {
            issues.push(FieldIssue::new("policyId", "must not be empty"));
        }
        check_duration("evaluationTime", Some(self.evaluation_time), &mut issues);
        issues
    }
}

// ---------------------------------------------------------------------------
// AccessRequest
// ---------------------------------------------------------------------------

/// An access decision served to a caller, with the request attributes
/// that produced it.
///
/// `request_data` is free-form but conventionally shaped as
/// `{subject:{userId}, resource:{resourceType, resourceId},
/// action:{actionType}, environment:{threatLevel}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: String,
    pub decision: Decision,
    #[serde(default)]
    pub request_data: Value,
    #[serde(default)]
    pub matched_policies: Vec<String>,
    #[serde(default)]
    pub evaluation_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccessRequest {
    pub fn user_id(&self) -> Option<&str> {
        str_at(&self.request_data, "/subject/userId")
    }

    pub fn resource_type(&self) -> Option<&str> {
        str_at(&self.request_data, "/resource/resourceType")
    }

    pub fn action(&self) -> Option<&str> {
        str_at(&self.request_data, "/action/actionType")
    }

    pub fn threat_level(&self) -> Option<&str> {
        str_at(&self.request_data, "/environment/threatLevel")
    }

    /// Reason recorded by the policy engine, if any.
    pub fn reason(&self) -> Option<&str> {
        self.evaluation_result
            .as_ref()
            .and_then(|r| str_at(r, "/reason"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessRequest {
    pub decision: Decision,
    #[serde(default = "empty_object")]
    pub request_data: Value,
    #[serde(default)]
    pub matched_policies: Vec<String>,
    #[serde(default)]
    pub evaluation_time: Option<f64>,
    #[serde(default)]
    pub evaluation_result: Option<Value>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAccessRequest {
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if !self.request_data.is_object() {
            issues.push(FieldIssue::new("requestData", "must be an object"));
        }
        check_duration("evaluationTime", self.evaluation_time, &mut issues);
        if self
            .ip_address
            .as_deref()
            .is_some_and(|ip| ip.parse::<std::net::IpAddr>().is_err())
        {
            issues.push(FieldIssue::new("ipAddress", "must be an IPv4 or IPv6 address"));
        }
        issues
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// A security- or compliance-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: String,
    pub event_type: String,
    pub event_category: String,
    #[serde(default)]
    pub event_data: Value,
    pub success: bool,
    #[serde(default)]
    pub compliance_flags: Vec<String>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    /// `eventData.resource.resourceId`, the policy a POLICY event touched.
    pub fn resource_id(&self) -> Option<&str> {
        str_at(&self.event_data, "/resource/resourceId")
    }

    pub fn resource_name(&self) -> Option<&str> {
        str_at(&self.event_data, "/resource/resourceName")
    }

    pub fn actor_id(&self) -> Option<&str> {
        str_at(&self.event_data, "/actor/userId")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditLog {
    pub event_type: String,
    pub event_category: String,
    #[serde(default = "empty_object")]
    pub event_data: Value,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub compliance_flags: Vec<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewAuditLog {
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if self.event_type.trim().is_empty() {
            issues.push(FieldIssue::new("eventType", "must not be empty"));
        }
        if self.event_category.trim().is_empty() {
            issues.push(FieldIssue::new("eventCategory", "must not be empty"));
        }
        for (i, flag) in self.compliance_flags.iter().enumerate() {
            if flag.trim().is_empty() {
                issues.push(FieldIssue::new(
                    format!("complianceFlags.{i}"),
                    "must not be empty",
                ));
            }
        }
        issues
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_success() -> bool {
    true
}

fn default_source() -> String {
    "api".to_string()
}

fn check_duration(path: &str, value: Option<f64>, issues: &mut Vec<FieldIssue>) {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            issues.push(FieldIssue::new(path, "must be a non-negative number of milliseconds"));
        }
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_wire_format() {
        assert_eq!(serde_json::to_string(&Decision::NotApplicable).unwrap(), "\"NOT_APPLICABLE\"");
        let deny: Decision = serde_json::from_str("\"DENY\"").unwrap();
        assert_eq!(deny, Decision::Deny);
        assert!(serde_json::from_str::<Decision>("\"deny\"").is_err());
    }

    #[test]
    fn access_request_accessors() {
        let req: NewAccessRequest = serde_json::from_value(serde_json::json!({
            "decision": "DENY",
            "requestData": {
                "subject": {"userId": "u-7"},
                "resource": {"resourceType": "purchase_request"},
                "action": {"actionType": "approve"},
                "environment": {"threatLevel": "high"}
            },
            "evaluationResult": {"reason": "outside business hours"},
            "ipAddress": "10.0.0.9"
        }))
        .unwrap();
        assert!(req.validate().is_empty());

        let stored = AccessRequest {
            id: "a1".into(),
            decision: req.decision,
            request_data: req.request_data,
            matched_policies: req.matched_policies,
            evaluation_time: req.evaluation_time,
            evaluation_result: req.evaluation_result,
            ip_address: req.ip_address,
            created_at: Utc::now(),
        };
        assert_eq!(stored.user_id(), Some("u-7"));
        assert_eq!(stored.resource_type(), Some("purchase_request"));
        assert_eq!(stored.action(), Some("approve"));
        assert_eq!(stored.threat_level(), Some("high"));
        assert_eq!(stored.reason(), Some("outside business hours"));
    }

    #[test]
    fn rejects_negative_and_bad_ip() {
        let req: NewAccessRequest = serde_json::from_value(serde_json::json!({
            "decision": "PERMIT",
            "evaluationTime": -1.0,
            "ipAddress": "not-an-ip"
        }))
        .unwrap();
        let paths: Vec<String> = req.validate().into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["evaluationTime", "ipAddress"]);
    }

    #[test]
    fn audit_defaults() {
        let log: NewAuditLog = serde_json::from_value(serde_json::json!({
            "eventType": "POLICY_CREATED",
            "eventCategory": "POLICY"
        }))
        .unwrap();
        assert!(log.success);
        assert_eq!(log.source, "api");
        assert!(log.event_data.is_object());
        assert!(log.validate().is_empty());
    }

    #[test]
    fn evaluation_log_requires_policy() {
        let log: NewEvaluationLog = serde_json::from_value(serde_json::json!({
            "policyId": "",
            "evaluationTime": 4.5,
            "finalDecision": "PERMIT"
        }))
        .unwrap();
        assert_eq!(log.validate()[0].path, "policyId");
    }
}
