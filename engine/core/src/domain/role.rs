// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Role & Permission Tuple Value Objects
//!
//! A [`RoleDefinition`] is what an operator writes in the policy document. A
//! [`Role`] is what the [`super::matrix::RoleMatrix`] serves at runtime: the
//! same role with its inheritance chain already flattened into one permission
//! set.
//!
//! ## Scope Qualifiers
//!
//! | Qualifier | Satisfied when |
//! |-----------|----------------|
//! | `own` | the resource owner is the calling subject |
//! | `assigned` | the resource (or its owner) is in the caller-supplied assigned set |
//! | `workspace` | the resource's workspace is one of the identity's memberships |
//! | `tenant` | the resource lives in the identity's tenant |
//! | `all` | always, but only for `system` level roles |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Restricts a permission tuple to a relation between identity and resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeQualifier {
    Own,
    Assigned,
    Workspace,
    Tenant,
    All,
}

impl fmt::Display for ScopeQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Own => "own",
            Self::Assigned => "assigned",
            Self::Workspace => "workspace",
            Self::Tenant => "tenant",
            Self::All => "all",
        };
        f.write_str(s)
    }
}

/// The level at which a role is meant to be bound.
///
/// Ordering follows evaluation specificity: `Resource` is the most specific and
/// is consulted first, `System` the least specific and is consulted last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleLevel {
    Resource,
    Workspace,
    Tenant,
    System,
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resource => "resource",
            Self::Workspace => "workspace",
            Self::Tenant => "tenant",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// One `(resource_type, action, scope)` grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionTuple {
    pub resource_type: String,
    pub action: String,
    pub scope: ScopeQualifier,
}

impl PermissionTuple {
    pub fn new(resource_type: impl Into<String>, action: impl Into<String>, scope: ScopeQualifier) -> Self {
        Self {
            resource_type: resource_type.into(),
            action: action.into(),
            scope,
        }
    }

    pub fn matches(&self, resource_type: &str, action: &str) -> bool {
        self.resource_type == resource_type && self.action == action
    }

    pub fn has_wildcard(&self) -> bool {
        self.resource_type.contains('*') || self.action.contains('*')
    }
}

impl fmt::Display for PermissionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.resource_type, self.action, self.scope)
    }
}

/// A role as authored in the policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Binding level. Required; a role without one is rejected at load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<RoleLevel>,

    /// Optional base role whose permissions are folded into this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,

    #[serde(default)]
    pub permissions: Vec<PermissionTuple>,

    /// Administrative roles must either expire or be explicitly permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub permanent: bool,
}

/// A loaded role with its flattened, effective permission set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub level: RoleLevel,
    /// Direct base role, kept for diffing and display only.
    pub inherits: Option<String>,
    /// Own tuples in authoring order followed by inherited tuples not already present.
    pub permissions: Vec<PermissionTuple>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permanent: bool,
}

impl Role {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// First tuple granting `action` on `resource_type`, in effective order.
    pub fn grants<'a, 'r: 'a>(
        &'r self,
        resource_type: &'a str,
        action: &'a str,
    ) -> impl Iterator<Item = &'r PermissionTuple> + 'a {
        self.permissions
            .iter()
            .filter(move |p| p.matches(resource_type, action))
    }

    pub fn permission_set(&self) -> BTreeSet<PermissionTuple> {
        self.permissions.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_detection() {
        assert!(PermissionTuple::new("*", "read", ScopeQualifier::Tenant).has_wildcard());
        assert!(PermissionTuple::new("notes", "re*", ScopeQualifier::Tenant).has_wildcard());
        assert!(!PermissionTuple::new("notes", "read", ScopeQualifier::Tenant).has_wildcard());
    }

    #[test]
    fn test_level_specificity_order() {
        let mut levels = vec![RoleLevel::System, RoleLevel::Workspace, RoleLevel::Resource, RoleLevel::Tenant];
        levels.sort();
        assert_eq!(
            levels,
            vec![RoleLevel::Resource, RoleLevel::Workspace, RoleLevel::Tenant, RoleLevel::System]
        );
    }

    fn first_grant_for<'r>(role: &'r Role, resource_type: &str, action: &str) -> Option<&'r PermissionTuple> {
        role.grants(resource_type, action).next()
    }

    #[test]
    fn test_grants_outlive_query_strings() {
        let role = Role {
            name: "workspace_viewer".to_string(),
            description: String::new(),
            level: RoleLevel::Workspace,
            inherits: None,
            permissions: vec![
                PermissionTuple::new("notes", "read", ScopeQualifier::Workspace),
                PermissionTuple::new("notes", "delete", ScopeQualifier::Own),
            ],
            expires_at: None,
            permanent: false,
        };

        let tuple = {
            let resource_type = String::from("notes");
            let action = String::from("delete");
            first_grant_for(&role, &resource_type, &action)
        };
        assert_eq!(tuple, Some(&PermissionTuple::new("notes", "delete", ScopeQualifier::Own)));
        assert!(first_grant_for(&role, "notes", "create").is_none());
    }

    #[test]
    fn test_tuple_yaml_shape() {
        let tuple: PermissionTuple =
            serde_yaml::from_str("{ resource_type: notes, action: create, scope: workspace }").unwrap();
        assert_eq!(tuple, PermissionTuple::new("notes", "create", ScopeQualifier::Workspace));
        assert_eq!(tuple.to_string(), "notes:create@workspace");
    }

    #[test]
    fn test_unknown_scope_qualifier_rejected() {
        let parsed: Result<PermissionTuple, _> =
            serde_yaml::from_str("{ resource_type: notes, action: create, scope: galaxy }");
        assert!(parsed.is_err());
    }
}
