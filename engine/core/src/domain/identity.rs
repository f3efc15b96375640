// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identity Aggregate
//!
//! The normalized caller identity produced by
//! [`crate::application::claims_resolver::ClaimsResolver`]. An `Identity`
//! lives for exactly one authorization check and is never persisted; the only
//! trace it leaves is the [`IdentitySummary`] carried by a
//! [`crate::domain::decision::Decision`].
//!
//! ## Role claim shape
//!
//! ```json
//! {
//!   "roles": {
//!     "system": ["platform_admin"],
//!     "tenant:acme-corp": ["tenant_member"],
//!     "workspace:project-alpha": ["workspace_editor", { "role": "reviewer", "exp": 1767225600 }],
//!     "resource:note-42": ["note_collaborator"]
//!   }
//! }
//! ```
//!
//! Every key must name an explicit scope. Anything else is
//! [`ClaimsError::MalformedClaims`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use super::role::RoleLevel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("malformed claims: {0}")]
    MalformedClaims(String),
}

/// Where a role assignment applies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AssignmentScope {
    System,
    Tenant(String),
    Workspace(String),
    Resource(String),
}

impl AssignmentScope {
    /// Parse a role-claim key such as `workspace:project-alpha`.
    pub fn parse(key: &str) -> Result<Self, ClaimsError> {
        if key == "system" {
            return Ok(Self::System);
        }
        let (kind, id) = key.split_once(':').ok_or_else(|| {
            ClaimsError::MalformedClaims(format!("role scope '{}' is not of the form kind:id", key))
        })?;
        if id.is_empty() {
            return Err(ClaimsError::MalformedClaims(format!("role scope '{}' has an empty id", key)));
        }
        match kind {
            "tenant" => Ok(Self::Tenant(id.to_string())),
            "workspace" => Ok(Self::Workspace(id.to_string())),
            "resource" => Ok(Self::Resource(id.to_string())),
            other => Err(ClaimsError::MalformedClaims(format!("unknown role scope kind '{}'", other))),
        }
    }

    pub fn level(&self) -> RoleLevel {
        match self {
            Self::System => RoleLevel::System,
            Self::Tenant(_) => RoleLevel::Tenant,
            Self::Workspace(_) => RoleLevel::Workspace,
            Self::Resource(_) => RoleLevel::Resource,
        }
    }
}

impl fmt::Display for AssignmentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Tenant(id) => write!(f, "tenant:{}", id),
            Self::Workspace(id) => write!(f, "workspace:{}", id),
            Self::Resource(id) => write!(f, "resource:{}", id),
        }
    }
}

/// A role bound to an explicit scope, optionally time-limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: String,
    pub scope: AssignmentScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    pub fn new(role: impl Into<String>, scope: AssignmentScope) -> Self {
        Self {
            role: role.into(),
            scope,
            expires_at: None,
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub tenant_id: String,
    pub username: Option<String>,
    /// Raw email; only ever leaves the process hashed.
    pub email: Option<String>,
    pub session_id: Option<String>,
    pub workspaces: BTreeSet<String>,
    /// Assignments in claim order.
    pub assignments: Vec<RoleAssignment>,
}

impl Identity {
    pub fn new(subject_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            tenant_id: tenant_id.into(),
            username: None,
            email: None,
            session_id: None,
            workspaces: BTreeSet::new(),
            assignments: Vec::new(),
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspaces.insert(workspace.into());
        self
    }

    pub fn with_assignment(mut self, assignment: RoleAssignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    pub fn is_member_of(&self, workspace: &str) -> bool {
        self.workspaces.contains(workspace)
    }

    pub fn active_assignments(&self, now: DateTime<Utc>) -> impl Iterator<Item = &RoleAssignment> {
        self.assignments.iter().filter(move |a| !a.is_expired(now))
    }

    /// Active assignments bound at `system` scope. Whether the named role is
    /// actually system-level is for the policy to decide.
    pub fn system_assignments(&self, now: DateTime<Utc>) -> impl Iterator<Item = &RoleAssignment> {
        self.active_assignments(now)
            .filter(|a| a.scope == AssignmentScope::System)
    }

    pub fn summary(&self) -> IdentitySummary {
        let mut roles: Vec<String> = self.assignments.iter().map(|a| a.role.clone()).collect();
        roles.sort();
        roles.dedup();
        IdentitySummary {
            subject_id: self.subject_id.clone(),
            tenant_id: self.tenant_id.clone(),
            username: self.username.clone(),
            roles,
        }
    }
}

/// The part of an identity that may travel with a decision.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub subject_id: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub roles: Vec<String>,
}

/// One entry in a role-claim list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RoleClaimEntry {
    Name(String),
    Expiring { role: String, exp: i64 },
}

/// Parse the `roles` claim into scoped assignments.
pub fn parse_role_claim(value: &Value) -> Result<Vec<RoleAssignment>, ClaimsError> {
    let map = value.as_object().ok_or_else(|| {
        ClaimsError::MalformedClaims("roles claim must be an object of scope -> role list".to_string())
    })?;

    let mut assignments = Vec::new();
    for (key, roles) in map {
        let scope = AssignmentScope::parse(key)?;
        let entries: Vec<RoleClaimEntry> = serde_json::from_value(roles.clone()).map_err(|_| {
            ClaimsError::MalformedClaims(format!("roles for scope '{}' must be a list of role names", key))
        })?;
        for entry in entries {
            let assignment = match entry {
                RoleClaimEntry::Name(role) => RoleAssignment::new(role, scope.clone()),
                RoleClaimEntry::Expiring { role, exp } => {
                    let at = Utc.timestamp_opt(exp, 0).single().ok_or_else(|| {
                        ClaimsError::MalformedClaims(format!("role '{}' has an invalid exp", role))
                    })?;
                    RoleAssignment::new(role, scope.clone()).expiring(at)
                }
            };
            if assignment.role.trim().is_empty() {
                return Err(ClaimsError::MalformedClaims(format!("empty role name in scope '{}'", key)));
            }
            assignments.push(assignment);
        }
    }
    Ok(assignments)
}
