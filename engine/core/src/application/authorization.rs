// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization Application Service
//!
//! Runs one authorization check end to end on the caller's task:
//!
//! ```text
//! token ──▶ ClaimsResolver ──▶ PolicyEvaluator ──▶ Decision ──▶ caller
//!                                                     │
//!                                                     ├──▶ DecisionRecorder ──▶ AuditDispatcher (queued)
//!                                                     └──▶ EventBus (DecisionObserved → SLO monitor)
//! ```
//!
//! Nothing after the evaluator can change the decision or wait on I/O:
//! audit delivery is queued and event publication never blocks.
//!
//! Also owns the "reload policy" administrative operation.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use super::claims_resolver::ClaimsResolver;
use super::evaluator::PolicyEvaluator;
use super::recorder::DecisionRecorder;
use crate::domain::audit::RequestContext;
use crate::domain::decision::{AuthorizationRequest, Decision, DecisionId, MatchedRule, ResourceRef};
use crate::domain::events::{DecisionEvent, PolicyEvent};
use crate::domain::identity::{ClaimsError, IdentitySummary};
use crate::domain::policy_config::{PolicyBundle, PolicyDiff, PolicyError, PolicyManifest};
use crate::infrastructure::audit::AuditDispatcher;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::policy_store::PolicyStore;
use crate::infrastructure::telemetry;

#[derive(Debug, Clone, Copy)]
enum Reach {
    Request,
    Platform,
}

pub struct AuthorizationService {
    resolver: ClaimsResolver,
    evaluator: PolicyEvaluator,
    recorder: DecisionRecorder,
    policies: Arc<PolicyStore>,
    audit: AuditDispatcher,
    event_bus: EventBus,
}

impl AuthorizationService {
    pub fn new(
        resolver: ClaimsResolver,
        policies: Arc<PolicyStore>,
        audit: AuditDispatcher,
        event_bus: EventBus,
    ) -> Self {
        Self {
            resolver,
            evaluator: PolicyEvaluator::new(),
            recorder: DecisionRecorder::new(),
            policies,
            audit,
            event_bus,
        }
    }

    pub fn authorize(&self, token: &str, request: &AuthorizationRequest, context: RequestContext) -> Decision {
        self.decide(token, context, Reach::Request, |_| request.clone())
    }

    /// Authorize an action on state shared by every tenant, such as the
    /// active policy or the SLO windows. Only a system-level role can grant
    /// it, so a tenant administrator cannot change what other tenants see.
    pub fn authorize_platform_action(
        &self,
        token: &str,
        resource_type: &str,
        action: &str,
        context: RequestContext,
    ) -> Decision {
        self.decide(token, context, Reach::Platform, |tenant| {
            AuthorizationRequest::new(resource_type, action, ResourceRef::in_tenant(tenant.unwrap_or_default()))
        })
    }

    fn decide<F>(&self, token: &str, mut context: RequestContext, reach: Reach, build_request: F) -> Decision
    where
        F: FnOnce(Option<&str>) -> AuthorizationRequest,
    {
        let started = Instant::now();
        // One snapshot per check; a concurrent reload cannot change it
        let policy = self.policies.current();

        let decision = match self.resolver.resolve(token) {
            Ok(identity) => {
                let request = build_request(Some(&identity.tenant_id));
                context.user_email = identity.email.clone();
                context.session_id = identity.session_id.clone();
                match reach {
                    Reach::Request => self.evaluator.evaluate(&policy, &identity, &request),
                    Reach::Platform => self.evaluator.evaluate_platform(&policy, &identity, &request),
                }
            }
            Err(err) => {
                let request = build_request(None);
                warn!(error = %err, resource_type = %request.resource_type, action = %request.action, "Rejected bearer token");
                rejected_token_decision(&err, &request, &policy, started)
            }
        };

        self.event_bus.publish_decision_event(DecisionEvent::DecisionObserved {
            decision_id: decision.id.to_string(),
            allow: decision.allow,
            resource_type: decision.resource_type.clone(),
            action: decision.action.clone(),
            rule: decision.matched_rule.to_string(),
            evaluation_time_ms: decision.evaluation_time_ms(),
            observed_at: decision.decided_at,
        });

        match self.recorder.record(&decision, &context, &policy.pii) {
            Ok(record) => self.audit.dispatch(record),
            Err(err) => {
                error!(decision_id = %decision.id, error = %err, "Failed to construct audit record");
                telemetry::record_construction_failure();
                self.event_bus.publish_decision_event(DecisionEvent::AuditRecordFailed {
                    decision_id: decision.id.to_string(),
                    error: err.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }

        decision
    }

    pub fn current_policy(&self) -> Arc<PolicyBundle> {
        self.policies.current()
    }

    /// Validate `manifest` fully, then swap it in. On error the previous
    /// policy stays active.
    pub fn reload_policy(&self, manifest: &PolicyManifest) -> Result<PolicyDiff, PolicyError> {
        self.finish_reload(self.policies.reload(manifest))
    }

    /// Parse a YAML or JSON policy document and reload it. When the store
    /// was loaded from a file the document replaces that file too, so a
    /// later SIGHUP reload does not revert it.
    pub fn reload_policy_document(&self, document: &str) -> Result<PolicyDiff, PolicyError> {
        self.finish_reload(self.policies.reload_document(document))
    }

    /// Re-read the policy file the store was loaded from.
    pub fn reload_policy_from_source(&self) -> Result<PolicyDiff, PolicyError> {
        self.finish_reload(self.policies.reload_from_source())
    }

    fn finish_reload(&self, outcome: Result<PolicyDiff, PolicyError>) -> Result<PolicyDiff, PolicyError> {
        match &outcome {
            Ok(diff) => {
                info!(
                    previous = %diff.previous_policy,
                    current = %diff.new_policy,
                    added = diff.added_roles.len(),
                    removed = diff.removed_roles.len(),
                    changed = diff.changed_roles.len(),
                    "Policy reloaded"
                );
                telemetry::record_policy_reload(true);
                self.event_bus.publish_policy_event(PolicyEvent::PolicyReloaded {
                    diff: diff.clone(),
                    reloaded_at: Utc::now(),
                });
            }
            Err(err) => {
                warn!(error = %err, "Policy reload rejected; keeping {}", self.policies.current().policy_id());
                telemetry::record_policy_reload(false);
                self.event_bus.publish_policy_event(PolicyEvent::PolicyReloadRejected {
                    reason: err.to_string(),
                    rejected_at: Utc::now(),
                });
            }
        }
        outcome
    }
}

/// Deny decision for a request whose token never resolved to an identity.
/// The reason is generic; the verifier's message stays in the logs.
fn rejected_token_decision(
    err: &ClaimsError,
    request: &AuthorizationRequest,
    policy: &PolicyBundle,
    started: Instant,
) -> Decision {
    let (rule, reason) = match err {
        ClaimsError::InvalidToken(_) => (MatchedRule::INVALID_TOKEN, "bearer token is invalid or expired"),
        ClaimsError::MalformedClaims(_) => (MatchedRule::MALFORMED_CLAIMS, "bearer token claims are malformed"),
    };
    Decision {
        id: DecisionId::new(),
        allow: false,
        matched_rule: MatchedRule(rule.to_string()),
        reason: reason.to_string(),
        evaluation_time: started.elapsed(),
        resource_type: request.resource_type.clone(),
        action: request.action.clone(),
        resource_id: request.resource.id.clone(),
        identity: IdentitySummary::default(),
        policy_id: policy.policy_id(),
        decided_at: Utc::now(),
    }
}
