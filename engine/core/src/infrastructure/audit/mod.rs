// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Sink Dispatcher
//!
//! Background delivery of [`AuditRecord`]s to one or more sinks.
//!
//! ```text
//! AuthorizationService ──dispatch()──┬──▶ AuditQueue[log]     ──▶ lane loop ──▶ log
//!                                    ├──▶ AuditQueue[http]    ──▶ lane loop ──▶ http
//!                                    └──▶ AuditQueue[metrics] ──▶ lane loop ──▶ metrics
//!                                     (bounded, drop-oldest)   batch_size / flush_interval
//! ```
//!
//! Delivery is best effort and accounted per sink. Each sink has its own
//! queue, retries and counters, so a sink that is down or slow loses only
//! its own records (overflow, then `max_attempts`) and never delays the
//! others.

mod dispatcher;
mod http_sink;
mod metrics_sink;
mod queue;
mod tracing_sink;

pub use dispatcher::{AuditDispatcher, DispatchSettings, DispatchSnapshot, DispatchStats, SinkSnapshot};
pub use http_sink::HttpAuditSink;
pub use metrics_sink::MetricsAuditSink;
pub use queue::AuditQueue;
pub use tracing_sink::TracingAuditSink;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::audit::AuditRecord;
use crate::domain::engine_config::AuditSinkConfig;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink rejected batch with status {status}")]
    Rejected { status: u16 },

    #[error("sink did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to encode batch: {0}")]
    Encode(String),
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Stable name used in logs and metric labels.
    fn name(&self) -> &str;

    /// Deliver a whole batch. Partial acceptance is not reported; an error
    /// means the batch will be retried.
    async fn deliver(&self, batch: &[AuditRecord]) -> Result<(), SinkError>;
}

/// Instantiate the sinks listed in the `audit.sinks` configuration.
pub fn build_sinks(configs: &[AuditSinkConfig]) -> anyhow::Result<Vec<Arc<dyn AuditSink>>> {
    let mut sinks: Vec<Arc<dyn AuditSink>> = Vec::with_capacity(configs.len());
    for config in configs {
        let sink: Arc<dyn AuditSink> = match config {
            AuditSinkConfig::Log => Arc::new(TracingAuditSink::new()),
            AuditSinkConfig::Metrics => Arc::new(MetricsAuditSink::new()),
            AuditSinkConfig::Http { endpoint, headers } => {
                Arc::new(HttpAuditSink::new(endpoint.clone(), headers.clone())?)
            }
        };
        sinks.push(sink);
    }
    Ok(sinks)
}

#[cfg(test)]
pub(crate) fn test_record(decision_id: &str) -> AuditRecord {
    use crate::domain::audit::{AuditDecision, AuditRequest, AuditUser};

    AuditRecord {
        decision_id: decision_id.to_string(),
        timestamp: chrono::Utc::now(),
        trace_id: "4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
        span_id: "00f067aa0ba902b7".to_string(),
        request_id: None,
        user: AuditUser {
            id: "user-1".to_string(),
            username: Some("jdoe".to_string()),
            email: None,
            tenant: "acme-corp".to_string(),
            roles: vec!["workspace_viewer".to_string()],
            session_id: None,
        },
        request: AuditRequest {
            method: Some("GET".to_string()),
            path: Some("/api/notes/note-42".to_string()),
            resource_type: "notes".to_string(),
            resource_id: Some("note-42".to_string()),
            action: "read".to_string(),
            body: None,
            headers: Default::default(),
        },
        decision: AuditDecision {
            allow: true,
            policy_id: "notes@1".to_string(),
            rule: "allow_workspace_viewer_read".to_string(),
            reason: "granted by role 'workspace_viewer' via notes:read@workspace".to_string(),
            evaluation_time_ms: 0.1,
        },
        metadata: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_build_sinks_from_config() {
        let sinks = build_sinks(&[
            AuditSinkConfig::Log,
            AuditSinkConfig::Metrics,
            AuditSinkConfig::Http {
                endpoint: "http://127.0.0.1:3100/push".to_string(),
                headers: BTreeMap::new(),
            },
        ])
        .unwrap();
        let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["log", "metrics", "http"]);
    }
}
