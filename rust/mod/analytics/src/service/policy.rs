use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;

use supplyerp_core::{FieldIssue, ListResult, Principal, new_id, to_db_timestamp};
use supplyerp_sql::Value;

use super::events::AuditEvent;
use super::{AnalyticsError, AnalyticsService, EVALUATION_LOGS, Filter, POLICIES, newest};
use crate::model::{
    BulkOperation, BulkOutcome, BulkPolicyUpdate, CreatePolicy, MAX_LIST_LIMIT, Policy,
    PolicyDetail, PolicyEvaluationLog, PolicyListQuery, PolicyStatus, PolicySummary,
    RecentEvaluation, UpdatePolicy,
};

/// Evaluations shown with a single policy.
const RECENT_EVALUATIONS: usize = 10;

/// What `delete_policy` did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The policy has evaluation history, so it was archived instead.
    Archived,
}

impl DeleteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Archived => "archived",
        }
    }
}

impl AnalyticsService {
    pub fn create_policy(
        &self,
        input: CreatePolicy,
        actor: &Principal,
    ) -> Result<Policy, AnalyticsError> {
        let issues = input.validate();
        if !issues.is_empty() {
            return Err(AnalyticsError::invalid("Invalid policy", issues));
        }

        let now = Utc::now();
        let policy = Policy {
            id: new_id(),
            name: input.name.trim().to_string(),
            description: input.description,
            effect: input.effect,
            status: input.status,
            priority: input.priority,
            tags: input.tags,
            created_at: now,
            updated_at: now,
        };

        self.insert_record(POLICIES, &policy.id, &policy, &[
            ("name", Value::Text(policy.name.clone())),
            ("effect", Value::Text(policy.effect.as_str().into())),
            ("status", Value::Text(policy.status.as_str().into())),
            ("priority", Value::Integer(policy.priority as i64)),
            ("created_at", Value::Text(to_db_timestamp(now))),
            ("updated_at", Value::Text(to_db_timestamp(now))),
        ])
        .map_err(|e| name_conflict(e, &policy.name))?;

        tracing::info!(policy_id = %policy.id, name = %policy.name, "policy created");
        self.audit_best_effort(
            AuditEvent::policy("POLICY_CREATED", "CREATE", actor, &policy).with_changes(json!({
                "changeType": "CREATE",
                "newValues": snapshot(&policy),
            })),
        );
        Ok(policy)
    }

    pub fn get_policy(&self, id: &str) -> Result<Policy, AnalyticsError> {
        self.get_record(POLICIES, id)
    }

    /// A policy with its evaluation count and latest evaluations.
    pub fn policy_detail(&self, id: &str) -> Result<PolicyDetail, AnalyticsError> {
        let policy = self.get_policy(id)?;
        let history = Filter::new().eq("policy_id", id);
        let evaluation_count = self.count_records(EVALUATION_LOGS, &history)?;
        let recent: Vec<PolicyEvaluationLog> = self.select_records(
            EVALUATION_LOGS,
            &history,
            newest("created_at"),
            Some((RECENT_EVALUATIONS, 0)),
        )?;
        Ok(PolicyDetail {
            policy,
            evaluation_count,
            recent_evaluations: recent.into_iter().map(RecentEvaluation::from).collect(),
        })
    }

    pub fn list_policies(
        &self,
        query: &PolicyListQuery,
    ) -> Result<ListResult<PolicySummary>, AnalyticsError> {
        let filter = list_filter(query);
        let total = self.count_records(POLICIES, &filter)?;
        let policies: Vec<Policy> = self.select_records(
            POLICIES,
            &filter,
            (query.sort_by.column(), query.sort_order),
            Some((query.page.limit.min(MAX_LIST_LIMIT), query.page.offset)),
        )?;

        let ids: Vec<String> = policies.iter().map(|p| p.id.clone()).collect();
        let counts = self.evaluation_counts(&ids)?;
        let items = policies
            .into_iter()
            .map(|policy| PolicySummary {
                evaluation_count: counts.get(&policy.id).copied().unwrap_or(0),
                policy,
            })
            .collect();
        Ok(ListResult { items, total })
    }

    /// Evaluation log rows per policy id. Ids without history are absent.
    pub fn evaluation_counts(&self, ids: &[String]) -> Result<HashMap<String, usize>, AnalyticsError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.count_by(EVALUATION_LOGS, "policy_id", &Filter::new().any_of("policy_id", ids))
    }

    /// Apply one status or priority change to many policies. Unknown ids
    /// are skipped and not counted.
    pub fn bulk_update_policies(
        &self,
        input: BulkPolicyUpdate,
        actor: &Principal,
    ) -> Result<BulkOutcome, AnalyticsError> {
        let issues = input.validate();
        if !issues.is_empty() {
            return Err(AnalyticsError::invalid("Invalid bulk operation", issues));
        }

        let now = Utc::now();
        let targets: Vec<Policy> = self.select_records(
            POLICIES,
            &Filter::new().any_of("id", &input.policy_ids),
            newest("created_at"),
            None,
        )?;
        let mut affected = 0;
        for mut policy in targets {
            match input.operation {
                BulkOperation::Activate => policy.status = PolicyStatus::Active,
                BulkOperation::Deactivate => policy.status = PolicyStatus::Inactive,
                BulkOperation::Delete => policy.status = PolicyStatus::Archived,
                BulkOperation::UpdatePriority => {
                    if let Some(priority) = input.priority() {
                        policy.priority = priority;
                    }
                }
            }
            policy.updated_at = now;
            self.update_record(POLICIES, &policy.id, &policy, &[
                ("status", Value::Text(policy.status.as_str().into())),
                ("priority", Value::Integer(policy.priority as i64)),
                ("updated_at", Value::Text(to_db_timestamp(now))),
            ])?;
            affected += 1;
        }

        tracing::info!(
            operation = input.operation.as_str(),
            requested = input.policy_ids.len(),
            affected,
            "bulk policy update"
        );
        let mut event = AuditEvent::new("POLICY_BULK_OPERATION", "POLICY", actor, "BULK_UPDATE")
            .with("operation", json!(input.operation))
            .with("affectedPolicies", json!(input.policy_ids));
        if let Some(data) = &input.data {
            event = event.with("data", json!(data));
        }
        self.audit_best_effort(event);

        Ok(BulkOutcome {
            operation: input.operation,
            affected_count: affected,
            policy_ids: input.policy_ids,
        })
    }

    pub fn update_policy(
        &self,
        id: &str,
        patch: UpdatePolicy,
        actor: &Principal,
    ) -> Result<Policy, AnalyticsError> {
        let mut issues = patch.validate();
        if patch.is_empty() {
            issues.push(FieldIssue::new("", "no fields to update"));
        }
        if !issues.is_empty() {
            return Err(AnalyticsError::invalid("Invalid policy update", issues));
        }

        let before: Policy = self.get_policy(id)?;
        let mut policy = before.clone();
        let mut fields_changed: Vec<&str> = Vec::new();
        for (field, present) in [
            ("name", patch.name.is_some()),
            ("description", patch.description.is_some()),
            ("effect", patch.effect.is_some()),
            ("status", patch.status.is_some()),
            ("priority", patch.priority.is_some()),
            ("tags", patch.tags.is_some()),
        ] {
            if present {
                fields_changed.push(field);
            }
        }
        patch.apply(&mut policy);
        policy.name = policy.name.trim().to_string();
        policy.updated_at = Utc::now();

        self.update_record(POLICIES, id, &policy, &[
            ("name", Value::Text(policy.name.clone())),
            ("effect", Value::Text(policy.effect.as_str().into())),
            ("status", Value::Text(policy.status.as_str().into())),
            ("priority", Value::Integer(policy.priority as i64)),
            ("updated_at", Value::Text(to_db_timestamp(policy.updated_at))),
        ])
        .map_err(|e| name_conflict(e, &policy.name))?;

        tracing::info!(policy_id = %id, fields = ?fields_changed, "policy updated");
        self.audit_best_effort(
            AuditEvent::policy("POLICY_UPDATED", "UPDATE", actor, &policy).with_changes(json!({
                "changeType": "UPDATE",
                "oldValues": snapshot(&before),
                "newValues": snapshot(&policy),
                "fieldsChanged": fields_changed,
            })),
        );
        Ok(policy)
    }

    /// Remove a policy. Policies with evaluation history are archived so
    /// analytics keep resolving their names.
    pub fn delete_policy(&self, id: &str, actor: &Principal) -> Result<DeleteOutcome, AnalyticsError> {
        let mut policy: Policy = self.get_policy(id)?;
        let history = self.count_records(EVALUATION_LOGS, &Filter::new().eq("policy_id", id))?;

        if history > 0 {
            policy.status = PolicyStatus::Archived;
            policy.updated_at = Utc::now();
            self.update_record(POLICIES, id, &policy, &[
                ("status", Value::Text(policy.status.as_str().into())),
                ("updated_at", Value::Text(to_db_timestamp(policy.updated_at))),
            ])?;
            tracing::info!(policy_id = %id, history, "policy archived");
            self.audit_best_effort(
                AuditEvent::policy("POLICY_ARCHIVED", "ARCHIVE", actor, &policy)
                    .with_reason("Has evaluation history"),
            );
            return Ok(DeleteOutcome::Archived);
        }

        self.delete_record(POLICIES, id)?;
        tracing::info!(policy_id = %id, "policy deleted");
        self.audit_best_effort(AuditEvent::policy("POLICY_DELETED", "DELETE", actor, &policy));
        Ok(DeleteOutcome::Deleted)
    }

    /// Number of policies, optionally restricted to one status.
    pub fn count_policies(&self, status: Option<PolicyStatus>) -> Result<usize, AnalyticsError> {
        let filter = match status {
            Some(s) => Filter::new().eq("status", s.as_str()),
            None => Filter::new(),
        };
        self.count_records(POLICIES, &filter)
    }

    /// Catalog names for the given ids. Unknown ids are absent from the map.
    pub fn policy_names(&self, ids: &[String]) -> Result<HashMap<String, String>, AnalyticsError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let policies: Vec<Policy> =
            self.select_records(POLICIES, &Filter::new().any_of("id", ids), newest("created_at"), None)?;
        Ok(policies.into_iter().map(|p| (p.id, p.name)).collect())
    }
}

/// The only unique column besides the key is `name`.
fn name_conflict(e: AnalyticsError, name: &str) -> AnalyticsError {
    match e {
        AnalyticsError::Conflict(_) => {
            AnalyticsError::Conflict(format!("policy name {:?} already exists", name))
        }
        other => other,
    }
}

fn list_filter(query: &PolicyListQuery) -> Filter {
    let mut filter = Filter::new();
    if let Some(status) = query.status {
        filter = filter.eq("status", status.as_str());
    }
    if let Some(effect) = query.effect {
        filter = filter.eq("effect", effect.as_str());
    }
    if let Some(search) = &query.search {
        filter = filter.contains(
            &["name", "COALESCE(json_extract(data, '$.description'), '')"],
            search,
        );
    }
    if let Some(min) = query.priority_min {
        filter = filter.at_least("priority", min as i64);
    }
    if let Some(max) = query.priority_max {
        filter = filter.at_most("priority", max as i64);
    }
    if let Some(tags) = &query.tags {
        filter = filter.json_overlaps(POLICIES, "$.tags", tags);
    }
    filter
}

fn snapshot(policy: &Policy) -> serde_json::Value {
    json!({
        "name": policy.name,
        "effect": policy.effect,
        "status": policy.status,
        "priority": policy.priority,
    })
}
