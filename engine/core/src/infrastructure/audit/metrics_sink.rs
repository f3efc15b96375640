// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Metrics Audit Sink
//
// Derives decision counters from audit records:
//   authz_decisions_total{decision,resource_type,action,policy_id}
//   authz_decision_duration_ms{decision,resource_type}
//   authz_denied_requests_total{resource_type,action,rule}

use async_trait::async_trait;

use super::{AuditSink, SinkError};
use crate::domain::audit::AuditRecord;
use crate::infrastructure::telemetry::{DECISIONS_TOTAL, DECISION_DURATION_MS, DENIED_REQUESTS_TOTAL};

#[derive(Debug, Default)]
pub struct MetricsAuditSink;

impl MetricsAuditSink {
    pub fn new() -> Self {
        Self
    }

    fn observe(record: &AuditRecord) {
        let decision = if record.decision.allow { "allow" } else { "deny" };
        let resource_type = record.request.resource_type.clone();

        metrics::counter!(
            DECISIONS_TOTAL,
            "decision" => decision,
            "resource_type" => resource_type.clone(),
            "action" => record.request.action.clone(),
            "policy_id" => record.decision.policy_id.clone()
        )
        .increment(1);

        metrics::histogram!(
            DECISION_DURATION_MS,
            "decision" => decision,
            "resource_type" => resource_type.clone()
        )
        .record(record.decision.evaluation_time_ms);

        if !record.decision.allow {
            metrics::counter!(
                DENIED_REQUESTS_TOTAL,
                "resource_type" => resource_type,
                "action" => record.request.action.clone(),
                "rule" => record.decision.rule.clone()
            )
            .increment(1);
        }
    }
}

#[async_trait]
impl AuditSink for MetricsAuditSink {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn deliver(&self, batch: &[AuditRecord]) -> Result<(), SinkError> {
        for record in batch {
            Self::observe(record);
        }
        Ok(())
    }
}
