// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use tracing::info;

use super::{AuditSink, SinkError};
use crate::domain::audit::AuditRecord;

/// Writes one structured log event per record on the `aegis::audit` target.
/// With JSON log output this is directly ingestible by log shippers.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, batch: &[AuditRecord]) -> Result<(), SinkError> {
        for record in batch {
            let payload = serde_json::to_string(record).map_err(|e| SinkError::Encode(e.to_string()))?;
            info!(
                target: "aegis::audit",
                decision_id = %record.decision_id,
                trace_id = %record.trace_id,
                tenant = %record.user.tenant,
                allow = record.decision.allow,
                rule = %record.decision.rule,
                record = %payload,
                "authorization decision"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::test_record;

    #[tokio::test]
    async fn test_accepts_every_batch() {
        let sink = TracingAuditSink::new();
        assert!(sink.deliver(&[test_record("d1"), test_record("d2")]).await.is_ok());
        assert!(sink.deliver(&[]).await.is_ok());
    }
}
