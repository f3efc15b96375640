// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Decision Value Objects
//!
//! A [`Decision`] is the immutable output of one policy evaluation. It always
//! names exactly one matched rule; when nothing granted access that rule is
//! [`MatchedRule::DEFAULT_DENY`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::identity::IdentitySummary;

/// Upper bound on a decision reason, in characters.
pub const MAX_REASON_LEN: usize = 1024;

/// Random 128-bit decision identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the rule that decided an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchedRule(pub String);

impl MatchedRule {
    pub const DEFAULT_DENY: &'static str = "default_deny";
    pub const CROSS_TENANT_DENIED: &'static str = "cross_tenant_denied";
    pub const INVALID_TOKEN: &'static str = "invalid_token";
    pub const MALFORMED_CLAIMS: &'static str = "malformed_claims";

    pub fn default_deny() -> Self {
        Self(Self::DEFAULT_DENY.to_string())
    }

    pub fn cross_tenant_denied() -> Self {
        Self(Self::CROSS_TENANT_DENIED.to_string())
    }

    /// `allow_<role>_<action>`
    pub fn allow(role: &str, action: &str) -> Self {
        Self(format!("allow_{}_{}", role, action))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The resource an authorization check is about.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Subject id of the owner, when the resource has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl ResourceRef {
    pub fn in_tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn in_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub resource_type: String,
    pub action: String,
    pub resource: ResourceRef,
    /// Resource ids or owner ids the caller is assigned to (satisfies `assigned`).
    #[serde(default)]
    pub assigned: BTreeSet<String>,
}

impl AuthorizationRequest {
    pub fn new(resource_type: impl Into<String>, action: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            resource_type: resource_type.into(),
            action: action.into(),
            resource,
            assigned: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub id: DecisionId,
    pub allow: bool,
    pub matched_rule: MatchedRule,
    pub reason: String,
    /// Monotonic evaluation time.
    pub evaluation_time: Duration,
    pub resource_type: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub identity: IdentitySummary,
    /// `<name>@<version>` of the policy document the decision was made against.
    pub policy_id: String,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn evaluation_time_ms(&self) -> f64 {
        self.evaluation_time.as_secs_f64() * 1000.0
    }

    pub fn outcome(&self) -> &'static str {
        if self.allow { "allow" } else { "deny" }
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_boundary() {
        let long = "x".repeat(MAX_REASON_LEN + 50);
        assert_eq!(truncate_chars(&long, MAX_REASON_LEN).chars().count(), MAX_REASON_LEN);
        assert_eq!(truncate_chars("short", MAX_REASON_LEN), "short");

        let multibyte = "é".repeat(10);
        let cut = truncate_chars(&multibyte, 3);
        assert_eq!(cut, "ééé");
    }

    #[test]
    fn test_matched_rule_names() {
        assert_eq!(MatchedRule::allow("workspace_editor", "create").as_str(), "allow_workspace_editor_create");
        assert_eq!(MatchedRule::default_deny().as_str(), "default_deny");
    }

    #[test]
    fn test_decision_ids_are_unique() {
        assert_ne!(DecisionId::new(), DecisionId::new());
    }
}
