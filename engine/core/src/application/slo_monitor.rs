// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SLO Burn-Rate Monitor
//!
//! Per-SLO control loop fed by `DecisionObserved` events.
//!
//! Decisions are counted into fixed-width time buckets on the monotonic
//! clock. Every tick the monitor computes the four burn rates of each SLO and
//! moves its state:
//!
//! ```text
//!             warning pair fires            critical pair fires
//!   Nominal ─────────────────────▶ Warning ─────────────────────▶ Critical
//!      ▲                              │                               │
//!      └──── warning pair clear ──────┘◀──── critical pair clear ─────┘
//! ```
//!
//! A pair fires when both its short and long window exceed the threshold and
//! is clear when both are at or under it. Nominal jumps straight to Critical
//! when the critical pair fires. When Critical clears, the state drops to
//! Warning while the warning pair is not yet clear, otherwise to Nominal.
//!
//! With no decisions for `stale_after` the SLO is marked stale. A stale SLO
//! never escalates; it may still de-escalate.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::engine_config::SloConfig;
use crate::domain::events::{DecisionEvent, SloEvent};
use crate::domain::slo::{BurnRateWindow, BurnRates, SloDefinition, SloState, SloStatus};
use crate::infrastructure::event_bus::{DecisionEventReceiver, EventBus, EventBusError};
use crate::infrastructure::telemetry;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    index: u64,
    total: u64,
    bad: u64,
}

#[derive(Debug)]
struct SloTracker {
    definition: SloDefinition,
    buckets: VecDeque<Bucket>,
    state: SloState,
    burn_rates: BurnRates,
    last_observed: Option<Instant>,
    stale: bool,
    events_observed: u64,
}

impl SloTracker {
    fn new(definition: SloDefinition) -> Self {
        Self {
            definition,
            buckets: VecDeque::new(),
            state: SloState::Nominal,
            burn_rates: BurnRates::default(),
            last_observed: None,
            stale: false,
            events_observed: 0,
        }
    }

    fn observe(&mut self, index: u64, bad: bool, at: Instant) {
        match self.buckets.back_mut() {
            Some(bucket) if bucket.index == index => {
                bucket.total += 1;
                bucket.bad += u64::from(bad);
            }
            // Late events land in the newest bucket
            Some(bucket) if bucket.index > index => {
                bucket.total += 1;
                bucket.bad += u64::from(bad);
            }
            _ => self.buckets.push_back(Bucket {
                index,
                total: 1,
                bad: u64::from(bad),
            }),
        }
        self.events_observed += 1;
        self.last_observed = Some(self.last_observed.map_or(at, |prev| prev.max(at)));
    }

    fn prune(&mut self, oldest_kept: u64) {
        while self.buckets.front().is_some_and(|b| b.index < oldest_kept) {
            self.buckets.pop_front();
        }
    }

    /// Burn rate over the `span` buckets ending at `current`.
    fn burn_rate(&self, current: u64, span: u64) -> f64 {
        let first = current.saturating_sub(span.saturating_sub(1));
        let (total, bad) = self
            .buckets
            .iter()
            .filter(|b| b.index >= first && b.index <= current)
            .fold((0u64, 0u64), |(t, b), bucket| (t + bucket.total, b + bucket.bad));
        if total == 0 {
            return 0.0;
        }
        let budget = self.definition.error_budget();
        (bad as f64 / total as f64) / budget
    }
}

fn fires(short: f64, long: f64, window: &BurnRateWindow) -> bool {
    short > window.threshold && long > window.threshold
}

fn clear(short: f64, long: f64, window: &BurnRateWindow) -> bool {
    short <= window.threshold && long <= window.threshold
}

fn next_state(current: SloState, rates: &BurnRates, definition: &SloDefinition, stale: bool) -> SloState {
    let critical_fires = !stale && fires(rates.critical_short, rates.critical_long, &definition.critical);
    let warning_fires = !stale && fires(rates.warning_short, rates.warning_long, &definition.warning);
    let warning_clear = clear(rates.warning_short, rates.warning_long, &definition.warning);
    let critical_clear = clear(rates.critical_short, rates.critical_long, &definition.critical);

    match current {
        _ if critical_fires => SloState::Critical,
        SloState::Nominal if warning_fires => SloState::Warning,
        SloState::Nominal => SloState::Nominal,
        SloState::Warning if warning_clear => SloState::Nominal,
        SloState::Warning => SloState::Warning,
        SloState::Critical if critical_clear && warning_clear => SloState::Nominal,
        SloState::Critical if critical_clear => SloState::Warning,
        SloState::Critical => SloState::Critical,
    }
}

pub struct SloMonitor {
    trackers: Mutex<Vec<SloTracker>>,
    origin: Instant,
    bucket_width: Duration,
    tick_interval: Duration,
    stale_after: Duration,
    event_bus: EventBus,
}

impl SloMonitor {
    pub fn new(config: &SloConfig, event_bus: EventBus) -> Self {
        Self::with_origin(config, event_bus, Instant::now())
    }

    /// Monitor whose bucket 0 starts at `origin`.
    pub fn with_origin(config: &SloConfig, event_bus: EventBus, origin: Instant) -> Self {
        let trackers = config
            .objectives
            .iter()
            .cloned()
            .map(SloTracker::new)
            .collect();
        Self {
            trackers: Mutex::new(trackers),
            origin,
            bucket_width: config.bucket_width.max(Duration::from_millis(1)),
            tick_interval: config.tick_interval,
            stale_after: config.stale_after,
            event_bus,
        }
    }

    fn bucket_index(&self, at: Instant) -> u64 {
        let elapsed = at.saturating_duration_since(self.origin).as_nanos();
        (elapsed / self.bucket_width.as_nanos()) as u64
    }

    fn span(&self, window: Duration) -> u64 {
        let width = self.bucket_width.as_nanos();
        (window.as_nanos().div_ceil(width) as u64).max(1)
    }

    pub fn observe(&self, allow: bool, evaluation_time_ms: f64) {
        self.observe_at(Instant::now(), allow, evaluation_time_ms);
    }

    pub fn observe_at(&self, at: Instant, allow: bool, evaluation_time_ms: f64) {
        let index = self.bucket_index(at);
        let mut trackers = self.trackers.lock();
        for tracker in trackers.iter_mut() {
            let bad = tracker.definition.is_bad(allow, evaluation_time_ms);
            tracker.observe(index, bad, at);
        }
    }

    /// Recompute burn rates and apply state transitions. Returns the events
    /// raised by this tick, which are also published on the event bus.
    pub fn evaluate_at(&self, now: Instant) -> Vec<SloEvent> {
        let current = self.bucket_index(now);
        let wall_clock = chrono::Utc::now();
        let mut events = Vec::new();

        let mut trackers = self.trackers.lock();
        for tracker in trackers.iter_mut() {
            let longest = self.span(tracker.definition.longest_window());
            tracker.prune(current.saturating_sub(longest.saturating_sub(1)));

            let quiet_since = tracker.last_observed.unwrap_or(self.origin);
            let stale = now.saturating_duration_since(quiet_since) > self.stale_after;
            if stale != tracker.stale {
                tracker.stale = stale;
                let name = tracker.definition.name.clone();
                if stale {
                    warn!(slo = %name, "No decisions observed within {:?}; burn-rate alerting suspended", self.stale_after);
                    events.push(SloEvent::StaleMetrics { slo: name, detected_at: wall_clock });
                } else {
                    info!(slo = %name, "Decision metrics resumed");
                    events.push(SloEvent::MetricsResumed { slo: name, resumed_at: wall_clock });
                }
            }

            let definition = &tracker.definition;
            let rates = BurnRates {
                warning_short: tracker.burn_rate(current, self.span(definition.warning.short)),
                warning_long: tracker.burn_rate(current, self.span(definition.warning.long)),
                critical_short: tracker.burn_rate(current, self.span(definition.critical.short)),
                critical_long: tracker.burn_rate(current, self.span(definition.critical.long)),
            };
            tracker.burn_rates = rates;

            let next = next_state(tracker.state, &rates, definition, tracker.stale);
            telemetry::record_slo_status(&definition.name, next, &rates, tracker.stale);

            if next != tracker.state {
                let from = tracker.state;
                tracker.state = next;
                if next > from {
                    warn!(slo = %definition.name, %from, to = %next, ?rates, "SLO burn rate escalated");
                } else {
                    info!(slo = %definition.name, %from, to = %next, "SLO burn rate recovered");
                }
                events.push(SloEvent::StateChanged {
                    slo: definition.name.clone(),
                    from,
                    to: next,
                    burn_rates: rates,
                    changed_at: wall_clock,
                });
            }
        }
        drop(trackers);

        for event in &events {
            self.event_bus.publish_slo_event(event.clone());
        }
        events
    }

    pub fn evaluate(&self) -> Vec<SloEvent> {
        self.evaluate_at(Instant::now())
    }

    /// Clear every window and return all SLOs to Nominal.
    pub fn reset(&self) {
        let reset_at = chrono::Utc::now();
        let names: Vec<String> = {
            let mut trackers = self.trackers.lock();
            trackers
                .iter_mut()
                .map(|tracker| {
                    tracker.buckets.clear();
                    tracker.state = SloState::Nominal;
                    tracker.burn_rates = BurnRates::default();
                    tracker.definition.name.clone()
                })
                .collect()
        };
        for slo in names {
            info!(slo = %slo, "SLO windows reset");
            self.event_bus.publish_slo_event(SloEvent::WindowsReset { slo, reset_at });
        }
    }

    pub fn status(&self) -> Vec<SloStatus> {
        self.trackers
            .lock()
            .iter()
            .map(|tracker| SloStatus {
                name: tracker.definition.name.clone(),
                state: tracker.state,
                burn_rates: tracker.burn_rates,
                stale_metrics: tracker.stale,
                events_observed: tracker.events_observed,
            })
            .collect()
    }

    /// True while any SLO reports stale metrics.
    pub fn is_degraded(&self) -> bool {
        self.trackers.lock().iter().any(|t| t.stale)
    }

    /// Consume decision events and tick until cancelled.
    pub async fn run(self: Arc<Self>, mut receiver: DecisionEventReceiver, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("SLO monitor started with tick interval {:?}", self.tick_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate();
                }
                event = receiver.recv() => match event {
                    Ok(DecisionEvent::DecisionObserved { allow, evaluation_time_ms, .. }) => {
                        self.observe(allow, evaluation_time_ms);
                    }
                    Ok(_) => {}
                    Err(EventBusError::Lagged(n)) => {
                        debug!("SLO monitor skipped {} decision events", n);
                        telemetry::record_slo_events_lost(n);
                    }
                    Err(EventBusError::Closed) | Err(EventBusError::Empty) => break,
                },
            }
        }

        info!("SLO monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::slo::SloKind;

    const MINUTE: Duration = Duration::from_secs(60);

    fn denial_config() -> SloConfig {
        SloConfig {
            tick_interval: Duration::from_secs(10),
            stale_after: 10 * MINUTE,
            bucket_width: MINUTE,
            objectives: vec![SloDefinition {
                name: "denials".to_string(),
                kind: SloKind::DenialRate,
                objective: 0.99,
                warning: BurnRateWindow::warning_default(),
                critical: BurnRateWindow::critical_default(),
            }],
        }
    }

    /// Feed `per_minute` decisions every minute in `[from, to)`, `bad` of them denied.
    fn feed(monitor: &SloMonitor, t0: Instant, from: u64, to: u64, per_minute: u32, bad: u32) {
        for minute in from..to {
            let at = t0 + MINUTE * minute as u32 + Duration::from_secs(1);
            for i in 0..per_minute {
                monitor.observe_at(at, i >= bad, 0.1);
            }
        }
    }

    fn state(monitor: &SloMonitor) -> SloState {
        monitor.status()[0].state
    }

    #[test]
    fn test_transient_spike_stays_nominal() {
        let t0 = Instant::now();
        let monitor = SloMonitor::with_origin(&denial_config(), EventBus::new(16), t0);

        // Six healthy hours, then three minutes of total denial
        feed(&monitor, t0, 0, 360, 100, 0);
        feed(&monitor, t0, 360, 363, 100, 100);
        monitor.evaluate_at(t0 + MINUTE * 363);

        let status = &monitor.status()[0];
        assert!(status.burn_rates.critical_short > 14.4);
        assert!(status.burn_rates.warning_long < 6.0);
        assert_eq!(status.state, SloState::Nominal);
    }

    #[test]
    fn test_sustained_burn_escalates_then_recovers() {
        let t0 = Instant::now();
        let monitor = SloMonitor::with_origin(&denial_config(), EventBus::new(16), t0);

        // 10% denials for an hour: burn rate 10x, over warning (6x) only
        feed(&monitor, t0, 0, 60, 100, 10);
        monitor.evaluate_at(t0 + MINUTE * 60);
        assert_eq!(state(&monitor), SloState::Warning);

        // 50% denials for another hour: 1h window lands above 14.4x
        feed(&monitor, t0, 60, 120, 100, 50);
        let events = monitor.evaluate_at(t0 + MINUTE * 120);
        assert_eq!(state(&monitor), SloState::Critical);
        assert!(matches!(
            events.as_slice(),
            [SloEvent::StateChanged { from: SloState::Warning, to: SloState::Critical, .. }]
        ));

        // Clean traffic long enough for every window to drain
        feed(&monitor, t0, 120, 500, 100, 0);
        monitor.evaluate_at(t0 + MINUTE * 500);
        assert_eq!(state(&monitor), SloState::Nominal);
    }

    #[test]
    fn test_nominal_jumps_to_critical() {
        let t0 = Instant::now();
        let monitor = SloMonitor::with_origin(&denial_config(), EventBus::new(16), t0);
        feed(&monitor, t0, 0, 60, 100, 100);
        monitor.evaluate_at(t0 + MINUTE * 60);
        assert_eq!(state(&monitor), SloState::Critical);
    }

    #[test]
    fn test_stale_metrics_suppress_alerting() {
        let t0 = Instant::now();
        let monitor = SloMonitor::with_origin(&denial_config(), EventBus::new(16), t0);

        let events = monitor.evaluate_at(t0 + MINUTE * 11);
        assert!(matches!(events.as_slice(), [SloEvent::StaleMetrics { .. }]));
        assert!(monitor.is_degraded());

        // A burst arrives: metrics resume
        feed(&monitor, t0, 11, 12, 100, 0);
        let events = monitor.evaluate_at(t0 + MINUTE * 12);
        assert!(events.iter().any(|e| matches!(e, SloEvent::MetricsResumed { .. })));
        assert!(!monitor.is_degraded());

        // Total denial, then silence past stale_after: no escalation
        feed(&monitor, t0, 12, 13, 100, 100);
        monitor.evaluate_at(t0 + MINUTE * 30);
        let status = &monitor.status()[0];
        assert!(status.stale_metrics);
        assert_eq!(status.state, SloState::Nominal);
    }

    #[test]
    fn test_reset_clears_windows() {
        let t0 = Instant::now();
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let monitor = SloMonitor::with_origin(&denial_config(), bus, t0);

        feed(&monitor, t0, 0, 60, 100, 100);
        monitor.evaluate_at(t0 + MINUTE * 60);
        assert_eq!(state(&monitor), SloState::Critical);

        monitor.reset();
        let status = &monitor.status()[0];
        assert_eq!(status.state, SloState::Nominal);
        assert_eq!(status.burn_rates, BurnRates::default());

        monitor.evaluate_at(t0 + MINUTE * 61);
        assert_eq!(state(&monitor), SloState::Nominal);

        let mut saw_reset = false;
        while let Ok(event) = receiver.try_recv() {
            if matches!(
                event,
                crate::infrastructure::event_bus::DomainEvent::Slo(SloEvent::WindowsReset { .. })
            ) {
                saw_reset = true;
            }
        }
        assert!(saw_reset);
    }

    #[test]
    fn test_latency_slo_counts_slow_decisions() {
        let t0 = Instant::now();
        let mut config = denial_config();
        config.objectives[0].kind = SloKind::Latency { threshold_ms: 5.0 };
        let monitor = SloMonitor::with_origin(&config, EventBus::new(16), t0);

        for minute in 0..60u32 {
            let at = t0 + MINUTE * minute;
            for _ in 0..10 {
                // Denials are fast and therefore good for a latency SLO
                monitor.observe_at(at, false, 1.0);
            }
        }
        monitor.evaluate_at(t0 + MINUTE * 60);
        assert_eq!(state(&monitor), SloState::Nominal);
    }

    #[tokio::test]
    async fn test_run_loop_consumes_bus_events() {
        let bus = EventBus::new(64);
        let monitor = Arc::new(SloMonitor::new(&denial_config(), bus.clone()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.clone().run(bus.subscribe_decisions(), cancel.clone()));

        for _ in 0..5 {
            bus.publish_decision_event(DecisionEvent::DecisionObserved {
                decision_id: uuid::Uuid::new_v4().to_string(),
                allow: true,
                resource_type: "notes".to_string(),
                action: "read".to_string(),
                rule: "allow_workspace_viewer_read".to_string(),
                evaluation_time_ms: 0.3,
                observed_at: chrono::Utc::now(),
            });
        }

        for _ in 0..50 {
            if monitor.status()[0].events_observed == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(monitor.status()[0].events_observed, 5);

        cancel.cancel();
        handle.await.unwrap();
    }
}
