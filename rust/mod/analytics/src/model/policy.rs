use std::collections::HashMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyerp_core::{FieldIssue, ListParams, ServiceError};

use super::query::{SortOrder, parse_choice, split_ids};
use super::{Decision, PolicyEvaluationLog};

/// Whether a matching policy grants or refuses access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyEffect {
    #[serde(alias = "permit")]
    Permit,
    #[serde(alias = "deny")]
    Deny,
}

impl PolicyEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permit => "PERMIT",
            Self::Deny => "DENY",
        }
    }

    /// Case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PERMIT" => Some(Self::Permit),
            "DENY" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// Publication state of a policy. Only `ACTIVE` policies are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    #[serde(alias = "draft")]
    Draft,
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "inactive")]
    Inactive,
    #[serde(alias = "archived")]
    Archived,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// An access-control policy as known to the analytics catalog.
///
/// Only the attributes reporting needs are kept: the name shown in
/// "slowest policies", the status counted by the summary, and the
/// effect/priority/tags used to filter listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub effect: PolicyEffect,
    pub status: PolicyStatus,
    pub priority: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const MAX_PRIORITY: u32 = 1000;
const DEFAULT_PRIORITY: u32 = 500;
const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_TAGS: usize = 20;
const MAX_TAG_LEN: usize = 50;

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

fn default_status() -> PolicyStatus {
    PolicyStatus::Draft
}

/// Input for creating a policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePolicy {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub effect: PolicyEffect,
    #[serde(default = "default_status")]
    pub status: PolicyStatus,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePolicy {
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        check_name(&self.name, &mut issues);
        check_description(self.description.as_deref(), &mut issues);
        check_priority(self.priority, &mut issues);
        check_tags(&self.tags, &mut issues);
        issues
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicy {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub effect: Option<PolicyEffect>,
    #[serde(default)]
    pub status: Option<PolicyStatus>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl UpdatePolicy {
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if let Some(name) = &self.name {
            check_name(name, &mut issues);
        }
        check_description(self.description.as_deref(), &mut issues);
        if let Some(priority) = self.priority {
            check_priority(priority, &mut issues);
        }
        if let Some(tags) = &self.tags {
            check_tags(tags, &mut issues);
        }
        issues
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.effect.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
    }

    /// Apply the present fields onto `policy`.
    pub fn apply(self, policy: &mut Policy) {
        if let Some(name) = self.name {
            policy.name = name;
        }
        if let Some(description) = self.description {
            policy.description = Some(description);
        }
        if let Some(effect) = self.effect {
            policy.effect = effect;
        }
        if let Some(status) = self.status {
            policy.status = status;
        }
        if let Some(priority) = self.priority {
            policy.priority = priority;
        }
        if let Some(tags) = self.tags {
            policy.tags = tags;
        }
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

pub const MAX_LIST_LIMIT: usize = 100;
const DEFAULT_LIST_LIMIT: usize = 20;

/// Sort key for policy listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySort {
    Name,
    Priority,
    CreatedAt,
    UpdatedAt,
}

impl PolicySort {
    const ALLOWED: &'static str = "name, priority, created_at, updated_at";

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "priority" => Some(Self::Priority),
            "created_at" | "createdAt" => Some(Self::CreatedAt),
            "updated_at" | "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    /// Indexed column backing this key.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Priority => "priority",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Validated `GET /policies` parameters.
#[derive(Debug, Clone)]
pub struct PolicyListQuery {
    pub status: Option<PolicyStatus>,
    pub effect: Option<PolicyEffect>,
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
    pub priority_min: Option<u32>,
    pub priority_max: Option<u32>,
    /// Policies carrying at least one of these tags.
    pub tags: Option<Vec<String>>,
    pub sort_by: PolicySort,
    pub sort_order: SortOrder,
    pub page: ListParams,
}

impl Default for PolicyListQuery {
    fn default() -> Self {
        Self {
            status: None,
            effect: None,
            search: None,
            priority_min: None,
            priority_max: None,
            tags: None,
            sort_by: PolicySort::Priority,
            sort_order: SortOrder::Desc,
            page: ListParams {
                limit: DEFAULT_LIST_LIMIT,
                offset: 0,
            },
        }
    }
}

impl PolicyListQuery {
    /// Parse raw query-string pairs. Multi-word keys are accepted in
    /// snake_case or camelCase; unknown keys are ignored.
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let mut issues = Vec::new();
        let defaults = Self::default();
        let get = |snake: &str, camel: &str| params.get(snake).or_else(|| params.get(camel));

        let status = parse_choice(
            params.get("status"),
            "status",
            |s| all_or(s, PolicyStatus::from_str),
            "draft, active, inactive, archived, all",
            None,
            &mut issues,
        );
        let effect = parse_choice(
            params.get("effect"),
            "effect",
            |s| all_or(s, PolicyEffect::from_str),
            "permit, deny, all",
            None,
            &mut issues,
        );
        let sort_by = parse_choice(
            get("sort_by", "sortBy"),
            "sort_by",
            PolicySort::from_str,
            PolicySort::ALLOWED,
            defaults.sort_by,
            &mut issues,
        );
        let sort_order = parse_choice(
            get("sort_order", "sortOrder"),
            "sort_order",
            SortOrder::from_str,
            SortOrder::ALLOWED,
            defaults.sort_order,
            &mut issues,
        );

        let priorities = 0..=MAX_PRIORITY as usize;
        let priority_min = parse_int(
            get("priority_min", "priorityMin"),
            "priority_min",
            priorities.clone(),
            &mut issues,
        )
        .map(|n| n as u32);
        let priority_max = parse_int(
            get("priority_max", "priorityMax"),
            "priority_max",
            priorities,
            &mut issues,
        )
        .map(|n| n as u32);
        if let (Some(min), Some(max)) = (priority_min, priority_max) {
            if max < min {
                issues.push(FieldIssue::new("priority_max", "must not be below priority_min"));
            }
        }

        let limit = parse_int(params.get("limit"), "limit", 1..=MAX_LIST_LIMIT, &mut issues)
            .unwrap_or(defaults.page.limit);
        let offset = parse_int(params.get("offset"), "offset", 0..=usize::MAX, &mut issues);
        let page = parse_int(params.get("page"), "page", 1..=usize::MAX, &mut issues);
        let offset = match (offset, page) {
            (Some(offset), _) => offset,
            (None, Some(page)) => (page - 1).saturating_mul(limit),
            (None, None) => 0,
        };

        let search = params
            .get("search")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from);
        let tags = params.get("tags").and_then(|raw| split_ids(raw));

        if !issues.is_empty() {
            return Err(ServiceError::InvalidFields {
                message: "Invalid policy query".into(),
                details: issues,
            });
        }

        Ok(Self {
            status,
            effect,
            search,
            priority_min,
            priority_max,
            tags,
            sort_by,
            sort_order,
            page: ListParams { limit, offset },
        })
    }
}

/// `all` disables the filter.
fn all_or<T>(s: &str, from_str: fn(&str) -> Option<T>) -> Option<Option<T>> {
    if s.eq_ignore_ascii_case("all") {
        Some(None)
    } else {
        from_str(s).map(Some)
    }
}

fn parse_int(
    raw: Option<&String>,
    path: &str,
    range: RangeInclusive<usize>,
    issues: &mut Vec<FieldIssue>,
) -> Option<usize> {
    let raw = raw?;
    match raw.trim().parse::<usize>() {
        Ok(n) if range.contains(&n) => Some(n),
        _ if *range.end() == usize::MAX => {
            issues.push(FieldIssue::new(
                path,
                format!("must be an integer of at least {}", range.start()),
            ));
            None
        }
        _ => {
            issues.push(FieldIssue::new(
                path,
                format!("must be an integer between {} and {}", range.start(), range.end()),
            ));
            None
        }
    }
}

/// A listed policy with its lifetime evaluation count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    #[serde(flatten)]
    pub policy: Policy,
    pub evaluation_count: usize,
}

/// One of the latest evaluations shown with a policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvaluation {
    pub id: String,
    pub final_decision: Decision,
    pub evaluation_time: f64,
    pub created_at: DateTime<Utc>,
}

impl From<PolicyEvaluationLog> for RecentEvaluation {
    fn from(log: PolicyEvaluationLog) -> Self {
        Self {
            id: log.id,
            final_decision: log.final_decision,
            evaluation_time: log.evaluation_time,
            created_at: log.created_at,
        }
    }
}

/// `GET /policies/{id}` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub policy: Policy,
    pub evaluation_count: usize,
    /// Newest first.
    pub recent_evaluations: Vec<RecentEvaluation>,
}

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

pub const MAX_BULK_POLICIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    Activate,
    Deactivate,
    /// Archives; history stays resolvable.
    Delete,
    UpdatePriority,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Delete => "delete",
            Self::UpdatePriority => "update_priority",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPolicyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

/// `PUT /policies` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPolicyUpdate {
    pub operation: BulkOperation,
    pub policy_ids: Vec<String>,
    #[serde(default)]
    pub data: Option<BulkPolicyData>,
}

impl BulkPolicyUpdate {
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if self.policy_ids.is_empty() || self.policy_ids.len() > MAX_BULK_POLICIES {
            issues.push(FieldIssue::new(
                "policyIds",
                format!("must list 1 to {MAX_BULK_POLICIES} policies"),
            ));
        }
        for (i, id) in self.policy_ids.iter().enumerate() {
            if id.trim().is_empty() {
                issues.push(FieldIssue::new(format!("policyIds.{i}"), "must not be empty"));
            }
        }
        match self.priority() {
            Some(p) if p > MAX_PRIORITY => issues.push(FieldIssue::new(
                "data.priority",
                format!("must be between 0 and {MAX_PRIORITY}"),
            )),
            None if self.operation == BulkOperation::UpdatePriority => issues.push(
                FieldIssue::new("data.priority", "required for update_priority"),
            ),
            _ => {}
        }
        issues
    }

    pub fn priority(&self) -> Option<u32> {
        self.data.as_ref().and_then(|d| d.priority)
    }
}

/// Result of a bulk operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub operation: BulkOperation,
    /// Policies that existed and were changed.
    pub affected_count: usize,
    /// The ids as requested.
    pub policy_ids: Vec<String>,
}

fn check_name(name: &str, issues: &mut Vec<FieldIssue>) {
    let len = name.trim().chars().count();
    if len == 0 {
        issues.push(FieldIssue::new("name", "must not be empty"));
    } else if len > MAX_NAME_LEN {
        issues.push(FieldIssue::new(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
}

fn check_description(description: Option<&str>, issues: &mut Vec<FieldIssue>) {
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        issues.push(FieldIssue::new(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
        ));
    }
}

fn check_priority(priority: u32, issues: &mut Vec<FieldIssue>) {
    if priority > MAX_PRIORITY {
        issues.push(FieldIssue::new(
            "priority",
            format!("must be between 0 and {MAX_PRIORITY}"),
        ));
    }
}

fn check_tags(tags: &[String], issues: &mut Vec<FieldIssue>) {
    if tags.len() > MAX_TAGS {
        issues.push(FieldIssue::new("tags", format!("at most {MAX_TAGS} tags")));
    }
    for (i, tag) in tags.iter().enumerate() {
        if tag.is_empty() || tag.chars().count() > MAX_TAG_LEN {
            issues.push(FieldIssue::new(
                format!("tags.{i}"),
                format!("must be 1 to {MAX_TAG_LEN} characters"),
            ));
        }
    }
}
