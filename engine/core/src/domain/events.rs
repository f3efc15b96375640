// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy_config::PolicyDiff;
use super::slo::{BurnRates, SloState};

/// Emitted once per authorization check, after the decision is final.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecisionEvent {
    DecisionObserved {
        decision_id: String,
        allow: bool,
        resource_type: String,
        action: String,
        rule: String,
        evaluation_time_ms: f64,
        observed_at: DateTime<Utc>,
    },
    AuditRecordFailed {
        decision_id: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SloEvent {
    StateChanged {
        slo: String,
        from: SloState,
        to: SloState,
        burn_rates: BurnRates,
        changed_at: DateTime<Utc>,
    },
    StaleMetrics {
        slo: String,
        detected_at: DateTime<Utc>,
    },
    MetricsResumed {
        slo: String,
        resumed_at: DateTime<Utc>,
    },
    WindowsReset {
        slo: String,
        reset_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PolicyEvent {
    PolicyReloaded {
        diff: PolicyDiff,
        reloaded_at: DateTime<Utc>,
    },
    PolicyReloadRejected {
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}
