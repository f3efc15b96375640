// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Record Schema
//!
//! Wire shape of a decision log entry as pushed to log aggregation:
//!
//! ```json
//! {
//!   "decision_id": "…", "timestamp": "…",
//!   "trace_id": "…", "span_id": "…", "request_id": "…",
//!   "user":     { "id", "username", "email", "tenant", "roles", "session_id" },
//!   "request":  { "method", "path", "resource_type", "resource_id", "action", "body", "headers" },
//!   "decision": { "allow", "policy_id", "rule", "reason", "evaluation_time_ms" },
//!   "metadata": { "client_ip", "user_agent", "correlation_id" }
//! }
//! ```
//!
//! Every optional field is skipped when empty so that fields removed by
//! [`super::redaction::PiiPolicy`] deserialize back to `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub user: AuditUser,
    pub request: AuditRequest,
    pub decision: AuditDecision,
    pub metadata: AuditMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub tenant: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDecision {
    pub allow: bool,
    pub policy_id: String,
    pub rule: String,
    pub reason: String,
    pub evaluation_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Per-request metadata supplied by the transport layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub user_email: Option<String>,
    pub session_id: Option<String>,
}

impl RequestContext {
    /// Populate trace and span ids from a W3C `traceparent` header
    /// (`00-<32 hex trace>-<16 hex span>-<flags>`). Malformed values are ignored.
    pub fn with_traceparent(mut self, header: &str) -> Self {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if let [_version, trace, span, _flags] = parts.as_slice() {
            let is_hex = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit());
            if is_hex(trace, 32) && is_hex(span, 16) {
                self.trace_id = Some(trace.to_ascii_lowercase());
                self.span_id = Some(span.to_ascii_lowercase());
            }
        }
        self
    }
}
