// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Evaluator
//!
//! Pure function of (policy snapshot, identity, request) to [`Decision`].
//!
//! ## Rule order
//!
//! 1. Cross-tenant guard: a resource outside the caller's tenant is denied
//!    with `cross_tenant_denied` unless the caller holds an active
//!    system-scoped assignment of a known, unexpired system-level role. Only
//!    system assignments are considered past this point for such requests.
//! 2. Candidate assignments, most specific first: resource, workspace,
//!    tenant, system. Claim order breaks ties within a level.
//! 3. First permission tuple whose scope qualifier holds wins:
//!    `allow_<role>_<action>`.
//! 4. Otherwise `default_deny`.
//!
//! Expired assignments, expired roles, unknown roles and roles bound at a
//! level other than their own are skipped.

use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::debug;

use crate::domain::decision::{
    truncate_chars, AuthorizationRequest, Decision, DecisionId, MatchedRule, MAX_REASON_LEN,
};
use crate::domain::identity::{AssignmentScope, Identity, RoleAssignment};
use crate::domain::policy_config::PolicyBundle;
use crate::domain::role::{PermissionTuple, Role, RoleLevel, ScopeQualifier};

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, policy: &PolicyBundle, identity: &Identity, request: &AuthorizationRequest) -> Decision {
        self.evaluate_at(policy, identity, request, Utc::now())
    }

    /// Evaluate with an explicit wall-clock instant for expiry checks.
    /// Evaluation time is still measured on the monotonic clock.
    pub fn evaluate_at(
        &self,
        policy: &PolicyBundle,
        identity: &Identity,
        request: &AuthorizationRequest,
        now: DateTime<Utc>,
    ) -> Decision {
        self.evaluate_from(policy, identity, request, now, RoleLevel::Resource)
    }

    /// Evaluate an action on process-wide state (the active policy, SLO
    /// windows). Only system-level roles can grant it; tenant and narrower
    /// roles are skipped even when they list the tuple.
    pub fn evaluate_platform(&self, policy: &PolicyBundle, identity: &Identity, request: &AuthorizationRequest) -> Decision {
        self.evaluate_from(policy, identity, request, Utc::now(), RoleLevel::System)
    }

    fn evaluate_from(
        &self,
        policy: &PolicyBundle,
        identity: &Identity,
        request: &AuthorizationRequest,
        now: DateTime<Utc>,
        least_specific: RoleLevel,
    ) -> Decision {
        let started = Instant::now();
        let resource = &request.resource;
        let cross_tenant = resource.tenant != identity.tenant_id;

        let (allow, matched_rule, reason) = if cross_tenant && !holds_system_role(policy, identity, now) {
            (
                false,
                MatchedRule::cross_tenant_denied(),
                format!(
                    "resource tenant '{}' does not match identity tenant '{}'",
                    resource.tenant, identity.tenant_id
                ),
            )
        } else {
            match self.first_grant(policy, identity, request, cross_tenant, least_specific, now) {
                Some((role, tuple)) => (
                    true,
                    MatchedRule::allow(&role.name, &request.action),
                    format!("granted by role '{}' via {}", role.name, tuple),
                ),
                None => (
                    false,
                    MatchedRule::default_deny(),
                    format!(
                        "identity lacks permission: {} on {}",
                        request.action, request.resource_type
                    ),
                ),
            }
        };

        let decision = Decision {
            id: DecisionId::new(),
            allow,
            matched_rule,
            reason: truncate_chars(&reason, MAX_REASON_LEN),
            evaluation_time: started.elapsed(),
            resource_type: request.resource_type.clone(),
            action: request.action.clone(),
            resource_id: resource.id.clone(),
            identity: identity.summary(),
            policy_id: policy.policy_id(),
            decided_at: now,
        };

        debug!(
            decision_id = %decision.id,
            outcome = decision.outcome(),
            rule = %decision.matched_rule,
            subject = %identity.subject_id,
            "Evaluated authorization request"
        );

        decision
    }

    fn first_grant<'p>(
        &self,
        policy: &'p PolicyBundle,
        identity: &Identity,
        request: &AuthorizationRequest,
        cross_tenant: bool,
        least_specific: RoleLevel,
        now: DateTime<Utc>,
    ) -> Option<(&'p Role, &'p PermissionTuple)> {
        let mut candidates: Vec<&RoleAssignment> = identity
            .active_assignments(now)
            .filter(|a| applies_to(a, identity, request, cross_tenant))
            .collect();
        // Stable: claim order survives within a level
        candidates.sort_by_key(|a| a.scope.level());

        for assignment in candidates {
            let Some(role) = policy.matrix.lookup(&assignment.role) else {
                debug!(role = %assignment.role, "Skipping assignment of unknown role");
                continue;
            };
            if role.is_expired(now) {
                debug!(role = %role.name, "Skipping expired role");
                continue;
            }
            if role.level < least_specific {
                debug!(role = %role.name, role_level = %role.level, "Skipping role below required level");
                continue;
            }
            if role.level != assignment.scope.level() {
                debug!(
                    role = %role.name,
                    role_level = %role.level,
                    bound_at = %assignment.scope,
                    "Skipping role bound outside its level"
                );
                continue;
            }

            if let Some(tuple) = role
                .grants(&request.resource_type, &request.action)
                .find(|tuple| qualifier_holds(tuple.scope, role, identity, request, now))
            {
                return Some((role, tuple));
            }
        }

        None
    }
}

fn holds_system_role(policy: &PolicyBundle, identity: &Identity, now: DateTime<Utc>) -> bool {
    identity.system_assignments(now).any(|assignment| {
        policy
            .matrix
            .lookup(&assignment.role)
            .is_some_and(|role| role.level == RoleLevel::System && !role.is_expired(now))
    })
}

fn applies_to(
    assignment: &RoleAssignment,
    identity: &Identity,
    request: &AuthorizationRequest,
    cross_tenant: bool,
) -> bool {
    let resource = &request.resource;
    match &assignment.scope {
        AssignmentScope::System => true,
        _ if cross_tenant => false,
        AssignmentScope::Tenant(tenant) => *tenant == identity.tenant_id && *tenant == resource.tenant,
        AssignmentScope::Workspace(workspace) => resource.workspace.as_deref() == Some(workspace.as_str()),
        AssignmentScope::Resource(id) => resource.id.as_deref() == Some(id.as_str()),
    }
}

fn qualifier_holds(
    qualifier: ScopeQualifier,
    role: &Role,
    identity: &Identity,
    request: &AuthorizationRequest,
    now: DateTime<Utc>,
) -> bool {
    let resource = &request.resource;
    match qualifier {
        ScopeQualifier::Own => resource.owner.as_deref() == Some(identity.subject_id.as_str()),
        ScopeQualifier::Assigned => {
            resource.id.as_ref().is_some_and(|id| request.assigned.contains(id))
                || resource.owner.as_ref().is_some_and(|owner| request.assigned.contains(owner))
        }
        ScopeQualifier::Workspace => resource
            .workspace
            .as_deref()
            .is_some_and(|ws| member_of_workspace(identity, ws, now)),
        ScopeQualifier::Tenant => resource.tenant == identity.tenant_id,
        ScopeQualifier::All => role.level == RoleLevel::System,
    }
}

/// Membership comes from the workspaces claim or from an active
/// workspace-scoped assignment.
fn member_of_workspace(identity: &Identity, workspace: &str, now: DateTime<Utc>) -> bool {
    identity.is_member_of(workspace)
        || identity
            .active_assignments(now)
            .any(|a| matches!(&a.scope, AssignmentScope::Workspace(ws) if ws == workspace))
}
