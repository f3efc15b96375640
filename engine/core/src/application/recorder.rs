// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Decision Recorder
//!
//! Builds the redacted [`AuditRecord`] for a [`Decision`]. The record is
//! serialized, passed through the active [`PiiPolicy`] and read back, so the
//! redaction rules see exactly the JSON shape that sinks will emit.
//!
//! A [`RecordError`] never reaches the authorization caller; the
//! authorization service logs and counts it and still returns the decision.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::audit::{
    AuditDecision, AuditMetadata, AuditRecord, AuditRequest, AuditUser, RequestContext,
};
use crate::domain::decision::Decision;
use crate::domain::redaction::PiiPolicy;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to serialize audit record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("redacted audit record no longer matches the schema: {0}")]
    Schema(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionRecorder;

impl DecisionRecorder {
    pub fn new() -> Self {
        Self
    }

    pub fn record(
        &self,
        decision: &Decision,
        context: &RequestContext,
        pii: &PiiPolicy,
    ) -> Result<AuditRecord, RecordError> {
        let raw = AuditRecord {
            decision_id: decision.id.to_string(),
            timestamp: Utc::now(),
            trace_id: context.trace_id.clone().unwrap_or_else(new_trace_id),
            span_id: context.span_id.clone().unwrap_or_else(new_span_id),
            request_id: context.request_id.clone(),
            user: AuditUser {
                id: decision.identity.subject_id.clone(),
                username: decision.identity.username.clone(),
                email: context.user_email.clone(),
                tenant: decision.identity.tenant_id.clone(),
                roles: decision.identity.roles.clone(),
                session_id: context.session_id.clone(),
            },
            request: AuditRequest {
                method: context.method.clone(),
                path: context.path.clone(),
                resource_type: decision.resource_type.clone(),
                resource_id: decision.resource_id.clone(),
                action: decision.action.clone(),
                body: context.body.clone(),
                headers: context
                    .headers
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect(),
            },
            decision: AuditDecision {
                allow: decision.allow,
                policy_id: decision.policy_id.clone(),
                rule: decision.matched_rule.to_string(),
                reason: decision.reason.clone(),
                evaluation_time_ms: decision.evaluation_time_ms(),
            },
            metadata: AuditMetadata {
                client_ip: context.client_ip.clone(),
                user_agent: context.user_agent.clone(),
                correlation_id: context.correlation_id.clone(),
            },
        };

        let value = serde_json::to_value(&raw).map_err(RecordError::Serialize)?;
        let redacted = pii.apply(value);
        serde_json::from_value(redacted).map_err(RecordError::Schema)
    }
}

fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{DecisionId, MatchedRule, MAX_REASON_LEN};
    use crate::domain::identity::IdentitySummary;
    use crate::domain::redaction::hash_value;
    use serde_json::json;
    use std::time::Duration;

    fn decision() -> Decision {
        Decision {
            id: DecisionId::new(),
            allow: true,
            matched_rule: MatchedRule::allow("workspace_editor", "create"),
            reason: "granted by role 'workspace_editor' via notes:create@workspace".to_string(),
            evaluation_time: Duration::from_micros(250),
            resource_type: "notes".to_string(),
            action: "create".to_string(),
            resource_id: Some("note-42".to_string()),
            identity: IdentitySummary {
                subject_id: "user-123".to_string(),
                tenant_id: "acme-corp".to_string(),
                username: Some("jdoe".to_string()),
                roles: vec!["workspace_editor".to_string()],
            },
            policy_id: "notes@3".to_string(),
            decided_at: Utc::now(),
        }
    }

    fn context() -> RequestContext {
        let mut ctx = RequestContext {
            request_id: Some("req-1".to_string()),
            client_ip: Some("10.0.0.7".to_string()),
            user_agent: Some("A".repeat(600)),
            method: Some("POST".to_string()),
            path: Some("/api/notes".to_string()),
            body: Some(json!({ "title": "secret plans" })),
            user_email: Some("jdoe@acme.example".to_string()),
            ..Default::default()
        }
        .with_traceparent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");
        ctx.headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        ctx.headers.insert("X-Tenant".to_string(), "acme-corp".to_string());
        ctx
    }

    #[test]
    fn test_record_applies_default_pii_policy() {
        let record = DecisionRecorder::new()
            .record(&decision(), &context(), &PiiPolicy::default())
            .unwrap();

        assert_eq!(record.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(record.user.email.as_deref(), Some(hash_value("jdoe@acme.example").as_str()));
        assert!(record.request.body.is_none());
        assert!(!record.request.headers.contains_key("authorization"));
        assert_eq!(record.request.headers.get("x-tenant").map(String::as_str), Some("acme-corp"));
        assert_eq!(record.metadata.user_agent.as_deref().map(str::len), Some(256));
        assert_eq!(record.decision.rule, "allow_workspace_editor_create");
        assert!((record.decision.evaluation_time_ms - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_record_is_fixed_point_of_redaction() {
        let pii = PiiPolicy::default();
        let record = DecisionRecorder::new().record(&decision(), &context(), &pii).unwrap();
        let once = serde_json::to_value(&record).unwrap();
        assert_eq!(pii.apply(once.clone()), once);
    }

    #[test]
    fn test_generated_trace_ids() {
        let record = DecisionRecorder::new()
            .record(&decision(), &RequestContext::default(), &PiiPolicy::default())
            .unwrap();
        assert_eq!(record.trace_id.len(), 32);
        assert_eq!(record.span_id.len(), 16);
        assert!(record.request_id.is_none());
    }

    #[test]
    fn test_long_reason_truncated_exactly() {
        let mut long = decision();
        long.reason = "é".repeat(MAX_REASON_LEN + 300);
        let record = DecisionRecorder::new()
            .record(&long, &RequestContext::default(), &PiiPolicy::default())
            .unwrap();
        assert_eq!(record.decision.reason.chars().count(), MAX_REASON_LEN);
    }

    #[test]
    fn test_default_max_length_keeps_schema_fields() {
        let pii = PiiPolicy {
            default_max_length: Some(20),
            ..PiiPolicy::default()
        };
        let decision = decision();
        let record = DecisionRecorder::new().record(&decision, &context(), &pii).unwrap();

        assert_eq!(record.decision_id, decision.id.to_string());
        assert_eq!(record.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(record.decision.rule, "allow_workspace_editor_create");
        assert_eq!(record.decision.policy_id, "notes@3");
        assert!(record.timestamp <= Utc::now());
        assert_eq!(record.decision.reason, decision.reason);
        assert_eq!(record.request.resource_id.as_deref(), Some("note-42"));
        assert_eq!(record.metadata.user_agent.as_deref().map(str::len), Some(256));
    }

    #[test]
    fn test_excluding_required_field_is_a_record_error() {
        let pii = PiiPolicy {
            pii_exclusion: vec!["decision.reason".to_string()],
            ..PiiPolicy::default()
        };
        let result = DecisionRecorder::new().record(&decision(), &context(), &pii);
        assert!(matches!(result, Err(RecordError::Schema(_))));
    }
}
