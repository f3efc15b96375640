// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Role/Permission Matrix
//!
//! Immutable lookup table from role name to flattened [`Role`]. Built once per
//! policy document by [`RoleMatrix::load`]; never mutated afterwards. Reloads
//! build a fresh matrix and swap it in whole (see
//! [`crate::infrastructure::policy_store::PolicyStore`]).
//!
//! ## Load-time validation
//!
//! 1. Every role has a non-empty name, a declared level, and a unique name.
//! 2. No tuple uses a wildcard resource type or action.
//! 3. Base roles exist and the inheritance graph is acyclic (Kahn's algorithm).
//! 4. After flattening, `all` tuples appear only in `system` roles and any role
//!    carrying an administrative action declares `expires_at` or `permanent`.
//!
//! Inheritance is resolved here and only here. Runtime lookups are a single
//! hash-map access.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::role::{PermissionTuple, Role, RoleDefinition, RoleLevel, ScopeQualifier};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("invalid role definition '{role}': {reason}")]
    InvalidRoleDefinition { role: String, reason: String },

    #[error("cyclic role inheritance between: {}", .roles.join(", "))]
    CyclicInheritance { roles: Vec<String> },
}

impl MatrixError {
    fn invalid(role: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRoleDefinition {
            role: role.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleMatrix {
    roles: HashMap<String, Role>,
}

impl RoleMatrix {
    /// Validate and flatten `definitions` into a matrix.
    ///
    /// `administrative_actions` names the actions that make a role
    /// administrative for the expiry-or-permanent rule.
    pub fn load(
        definitions: &[RoleDefinition],
        administrative_actions: &[String],
    ) -> Result<Self, MatrixError> {
        let mut by_name: HashMap<&str, &RoleDefinition> = HashMap::with_capacity(definitions.len());

        for def in definitions {
            validate_definition(def)?;
            if by_name.insert(def.name.as_str(), def).is_some() {
                return Err(MatrixError::invalid(&def.name, "role is defined more than once"));
            }
        }

        for def in definitions {
            if let Some(base) = &def.inherits {
                if !by_name.contains_key(base.as_str()) {
                    return Err(MatrixError::invalid(
                        &def.name,
                        format!("base role '{}' does not exist", base),
                    ));
                }
            }
        }

        let order = topological_order(definitions)?;

        let mut roles: HashMap<String, Role> = HashMap::with_capacity(definitions.len());
        for name in order {
            let def = by_name[name];
            let inherited = def
                .inherits
                .as_deref()
                .and_then(|base| roles.get(base))
                .map(|base| base.permissions.as_slice())
                .unwrap_or(&[]);
            let permissions = merge_permissions(&def.permissions, inherited);
            // validate_definition guarantees the level is present.
            let level = def.scope.unwrap_or(RoleLevel::System);

            let role = Role {
                name: def.name.clone(),
                description: def.description.clone(),
                level,
                inherits: def.inherits.clone(),
                permissions,
                expires_at: def.expires_at,
                permanent: def.permanent,
            };
            validate_flattened(&role, administrative_actions)?;
            roles.insert(role.name.clone(), role);
        }

        Ok(Self { roles })
    }

    pub fn lookup(&self, role_name: &str) -> Option<&Role> {
        self.roles.get(role_name)
    }

    /// Effective permission set of `role_name`, if the role exists.
    pub fn permissions(&self, role_name: &str) -> Option<BTreeSet<PermissionTuple>> {
        self.roles.get(role_name).map(Role::permission_set)
    }

    pub fn role_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Re-express every role as a definition with no inheritance and its
    /// flattened tuples. Loading the result yields an equivalent matrix.
    pub fn to_flat_definitions(&self) -> Vec<RoleDefinition> {
        let mut defs: Vec<RoleDefinition> = self
            .roles
            .values()
            .map(|role| RoleDefinition {
                name: role.name.clone(),
                description: role.description.clone(),
                scope: Some(role.level),
                inherits: None,
                permissions: role.permissions.clone(),
                expires_at: role.expires_at,
                permanent: role.permanent,
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

fn validate_definition(def: &RoleDefinition) -> Result<(), MatrixError> {
    if def.name.trim().is_empty() {
        return Err(MatrixError::invalid("<unnamed>", "role name cannot be empty"));
    }
    if def.scope.is_none() {
        return Err(MatrixError::invalid(
            &def.name,
            "role must declare a scope (system, tenant, workspace or resource)",
        ));
    }
    if def.inherits.as_deref() == Some(def.name.as_str()) {
        return Err(MatrixError::CyclicInheritance {
            roles: vec![def.name.clone()],
        });
    }
    for tuple in &def.permissions {
        if tuple.resource_type.trim().is_empty() || tuple.action.trim().is_empty() {
            return Err(MatrixError::invalid(
                &def.name,
                "permission resource_type and action cannot be empty",
            ));
        }
        if tuple.has_wildcard() {
            return Err(MatrixError::invalid(
                &def.name,
                format!("wildcard permission '{}' is not allowed; enumerate explicitly", tuple),
            ));
        }
    }
    Ok(())
}

fn validate_flattened(role: &Role, administrative_actions: &[String]) -> Result<(), MatrixError> {
    if role.level != RoleLevel::System {
        if let Some(tuple) = role.permissions.iter().find(|p| p.scope == ScopeQualifier::All) {
            return Err(MatrixError::invalid(
                &role.name,
                format!("'all' scope in '{}' is only valid for system roles", tuple),
            ));
        }
    }

    let administrative = role
        .permissions
        .iter()
        .any(|p| administrative_actions.iter().any(|a| a == &p.action));
    if administrative && role.expires_at.is_none() && !role.permanent {
        return Err(MatrixError::invalid(
            &role.name,
            "administrative role must declare expires_at or be marked permanent",
        ));
    }
    Ok(())
}

/// Order roles so every base role precedes the roles inheriting from it.
fn topological_order(definitions: &[RoleDefinition]) -> Result<Vec<&str>, MatrixError> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut pending_parent: HashMap<&str, usize> = HashMap::new();

    for def in definitions {
        let has_parent = usize::from(def.inherits.is_some());
        pending_parent.insert(def.name.as_str(), has_parent);
        if let Some(base) = def.inherits.as_deref() {
            children.entry(base).or_default().push(def.name.as_str());
        }
    }

    // Seed in authoring order so the result is deterministic.
    let mut ready: VecDeque<&str> = definitions
        .iter()
        .filter(|d| d.inherits.is_none())
        .map(|d| d.name.as_str())
        .collect();

    let mut order = Vec::with_capacity(definitions.len());
    while let Some(name) = ready.pop_front() {
        order.push(name);
        if let Some(kids) = children.get(name) {
            for kid in kids {
                if let Some(count) = pending_parent.get_mut(kid) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(*kid);
                    }
                }
            }
        }
    }

    if order.len() != definitions.len() {
        let placed: HashSet<&str> = order.iter().copied().collect();
        let mut roles: Vec<String> = definitions
            .iter()
            .map(|d| d.name.as_str())
            .filter(|n| !placed.contains(n))
            .map(str::to_string)
            .collect();
        roles.sort();
        return Err(MatrixError::CyclicInheritance { roles });
    }

    Ok(order)
}

fn merge_permissions(own: &[PermissionTuple], inherited: &[PermissionTuple]) -> Vec<PermissionTuple> {
    let mut seen: HashSet<&PermissionTuple> = HashSet::with_capacity(own.len() + inherited.len());
    let mut merged = Vec::with_capacity(own.len() + inherited.len());
    for tuple in own.iter().chain(inherited) {
        if seen.insert(tuple) {
            merged.push(tuple.clone());
        }
    }
    merged
}
