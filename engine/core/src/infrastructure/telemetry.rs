// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Metric names and recording helpers.
//!
//! Everything goes through the `metrics` facade; without an installed
//! recorder the calls are no-ops, which keeps unit tests free of exporter
//! setup. `aegis-decision serve` installs the Prometheus exporter.

use crate::domain::slo::{BurnRates, SloState};

pub const DECISIONS_TOTAL: &str = "authz_decisions_total";
pub const DECISION_DURATION_MS: &str = "authz_decision_duration_ms";
pub const DENIED_REQUESTS_TOTAL: &str = "authz_denied_requests_total";
pub const AUDIT_RECORD_CONSTRUCTION_FAILURES_TOTAL: &str = "audit_record_construction_failures_total";
pub const AUDIT_DISPATCH_FAILURES_TOTAL: &str = "audit_dispatch_failures_total";
pub const AUDIT_RECORDS_DROPPED_TOTAL: &str = "audit_records_dropped_total";
pub const AUDIT_RECORDS_DELIVERED_TOTAL: &str = "audit_records_delivered_total";
pub const AUDIT_QUEUE_DEPTH: &str = "audit_queue_depth";
pub const POLICY_RELOADS_TOTAL: &str = "policy_reloads_total";
pub const SLO_BURN_RATE: &str = "slo_burn_rate";
pub const SLO_STATE: &str = "slo_state";
pub const SLO_STALE_METRICS: &str = "slo_stale_metrics";
pub const SLO_EVENTS_LOST_TOTAL: &str = "slo_events_lost_total";

/// Register descriptions with the installed recorder.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    describe_counter!(DECISIONS_TOTAL, "Authorization decisions by outcome, resource type, action and policy");
    describe_histogram!(DECISION_DURATION_MS, Unit::Milliseconds, "Policy evaluation time");
    describe_counter!(DENIED_REQUESTS_TOTAL, "Denied authorization requests by matched rule");
    describe_counter!(
        AUDIT_RECORD_CONSTRUCTION_FAILURES_TOTAL,
        "Decisions whose audit record could not be built"
    );
    describe_counter!(AUDIT_DISPATCH_FAILURES_TOTAL, "Failed audit deliveries, per record per attempt");
    describe_counter!(AUDIT_RECORDS_DROPPED_TOTAL, "Audit records dropped per sink by queue overflow or exhausted retries");
    describe_counter!(AUDIT_RECORDS_DELIVERED_TOTAL, "Audit records accepted per sink");
    describe_gauge!(AUDIT_QUEUE_DEPTH, "Audit records waiting for dispatch per sink");
    describe_counter!(POLICY_RELOADS_TOTAL, "Policy reload attempts by result");
    describe_gauge!(SLO_BURN_RATE, "Current burn rate per SLO and window");
    describe_gauge!(SLO_STATE, "SLO state: 0 nominal, 1 warning, 2 critical");
    describe_gauge!(SLO_STALE_METRICS, "1 while an SLO has not observed decisions recently");
    describe_counter!(SLO_EVENTS_LOST_TOTAL, "Decision events the SLO monitor missed while lagging");
}

pub fn record_construction_failure() {
    metrics::counter!(AUDIT_RECORD_CONSTRUCTION_FAILURES_TOTAL).increment(1);
}

pub fn record_dispatch_failures(sink: &str, records: u64) {
    metrics::counter!(AUDIT_DISPATCH_FAILURES_TOTAL, "sink" => sink.to_string()).increment(records);
}

pub fn record_dropped(sink: &str, reason: &'static str, records: u64) {
    metrics::counter!(AUDIT_RECORDS_DROPPED_TOTAL, "sink" => sink.to_string(), "reason" => reason).increment(records);
}

pub fn record_delivered(sink: &str, records: u64) {
    metrics::counter!(AUDIT_RECORDS_DELIVERED_TOTAL, "sink" => sink.to_string()).increment(records);
}

pub fn record_queue_depth(sink: &str, depth: usize) {
    metrics::gauge!(AUDIT_QUEUE_DEPTH, "sink" => sink.to_string()).set(depth as f64);
}

pub fn record_policy_reload(accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    metrics::counter!(POLICY_RELOADS_TOTAL, "result" => result).increment(1);
}

pub fn record_slo_status(slo: &str, state: SloState, rates: &BurnRates, stale: bool) {
    let windows = [
        ("warning_short", rates.warning_short),
        ("warning_long", rates.warning_long),
        ("critical_short", rates.critical_short),
        ("critical_long", rates.critical_long),
    ];
    for (window, rate) in windows {
        metrics::gauge!(SLO_BURN_RATE, "slo" => slo.to_string(), "window" => window).set(rate);
    }
    let level = match state {
        SloState::Nominal => 0.0,
        SloState::Warning => 1.0,
        SloState::Critical => 2.0,
    };
    metrics::gauge!(SLO_STATE, "slo" => slo.to_string()).set(level);
    metrics::gauge!(SLO_STALE_METRICS, "slo" => slo.to_string()).set(if stale { 1.0 } else { 0.0 });
}

pub fn record_slo_events_lost(events: u64) {
    metrics::counter!(SLO_EVENTS_LOST_TOTAL).increment(events);
}
