// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::AuditQueue;
use super::{AuditSink, SinkError};
use crate::domain::audit::AuditRecord;
use crate::domain::engine_config::{AuditConfig, MAX_AUDIT_ATTEMPTS, MAX_AUDIT_BACKOFF};
use crate::infrastructure::telemetry;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub sink_timeout: Duration,
}

impl From<&AuditConfig> for DispatchSettings {
    fn from(config: &AuditConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval,
            max_attempts: config.max_attempts.clamp(1, MAX_AUDIT_ATTEMPTS),
            base_backoff: config.base_backoff,
            sink_timeout: config.sink_timeout,
        }
    }
}

/// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_AUDIT_BACKOFF)
}

/// Delivery counters for one sink since start.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Batches handed to the sink
    pub batches_total: AtomicU64,
    /// Records the sink accepted
    pub records_delivered: AtomicU64,
    /// Failed deliveries, counted per record per attempt
    pub dispatch_failures_total: AtomicU64,
    /// Records given up on after exhausting retries or at shutdown
    pub records_abandoned: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkSnapshot {
    pub sink: String,
    pub batches_total: u64,
    pub records_delivered: u64,
    pub dispatch_failures_total: u64,
    pub records_abandoned: u64,
    pub records_dropped_overflow: u64,
    pub queue_depth: usize,
}

/// Totals are summed over sinks; a record accepted by two sinks counts twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub batches_total: u64,
    pub records_delivered: u64,
    pub dispatch_failures_total: u64,
    pub records_abandoned: u64,
    pub records_dropped_overflow: u64,
    /// Records dispatched while no sink was configured
    pub records_unrouted: u64,
    pub queue_depth: usize,
    pub sinks: Vec<SinkSnapshot>,
}

/// One sink with its own queue and counters. Lanes never wait on each other.
struct SinkLane {
    sink: Arc<dyn AuditSink>,
    queue: AuditQueue,
    stats: DispatchStats,
}

impl SinkLane {
    fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            sink: self.sink.name().to_string(),
            batches_total: self.stats.batches_total.load(Ordering::Relaxed),
            records_delivered: self.stats.records_delivered.load(Ordering::Relaxed),
            dispatch_failures_total: self.stats.dispatch_failures_total.load(Ordering::Relaxed),
            records_abandoned: self.stats.records_abandoned.load(Ordering::Relaxed),
            records_dropped_overflow: self.queue.dropped(),
            queue_depth: self.queue.len(),
        }
    }
}

/// Fire-and-forget audit delivery.
///
/// Cheap to clone; all clones share the same lanes. Every sink has its own
/// bounded queue, so a sink that is down or slow only overflows its own
/// queue while the others keep up. [`AuditDispatcher::dispatch`] enqueues a
/// copy per sink and returns immediately; [`AuditDispatcher::run`] drives
/// one delivery loop per sink.
#[derive(Clone)]
pub struct AuditDispatcher {
    lanes: Arc<Vec<SinkLane>>,
    settings: DispatchSettings,
    unrouted: Arc<AtomicU64>,
}

impl AuditDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>, queue_capacity: usize, settings: DispatchSettings) -> Self {
        let lanes = sinks
            .into_iter()
            .map(|sink| SinkLane {
                queue: AuditQueue::new(sink.name(), queue_capacity, settings.batch_size),
                sink,
                stats: DispatchStats::default(),
            })
            .collect();
        Self {
            lanes: Arc::new(lanes),
            settings,
            unrouted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &AuditConfig, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self::new(sinks, config.queue_capacity, DispatchSettings::from(config))
    }

    pub fn dispatch(&self, record: AuditRecord) {
        let Some((last, rest)) = self.lanes.split_last() else {
            let total = self.unrouted.fetch_add(1, Ordering::Relaxed) + 1;
            telemetry::record_dropped("none", "no_sink", 1);
            if total == 1 {
                warn!("No audit sinks configured; audit records are discarded");
            }
            return;
        };
        for lane in rest {
            lane.queue.push(record.clone());
        }
        last.queue.push(record);
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.lanes.iter().map(|lane| lane.sink.name().to_string()).collect()
    }

    pub fn stats(&self) -> DispatchSnapshot {
        let sinks: Vec<SinkSnapshot> = self.lanes.iter().map(SinkLane::snapshot).collect();
        DispatchSnapshot {
            batches_total: sinks.iter().map(|s| s.batches_total).sum(),
            records_delivered: sinks.iter().map(|s| s.records_delivered).sum(),
            dispatch_failures_total: sinks.iter().map(|s| s.dispatch_failures_total).sum(),
            records_abandoned: sinks.iter().map(|s| s.records_abandoned).sum(),
            records_dropped_overflow: sinks.iter().map(|s| s.records_dropped_overflow).sum(),
            records_unrouted: self.unrouted.load(Ordering::Relaxed),
            queue_depth: sinks.iter().map(|s| s.queue_depth).sum(),
            sinks,
        }
    }

    /// Drain every sink's queue until it is empty. Sinks drain concurrently.
    pub async fn flush(&self) {
        join_all(self.lanes.iter().map(|lane| self.drain(lane, false))).await;
    }

    /// Run one delivery loop per sink. Each loop flushes on a full batch or
    /// `flush_interval`, whichever comes first. On cancellation each loop
    /// drains its queue once more; a sink that still fails then has the rest
    /// of its queue abandoned rather than holding up shutdown.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            sinks = ?self.sink_names(),
            batch_size = self.settings.batch_size,
            "Audit dispatcher started"
        );

        join_all(self.lanes.iter().map(|lane| self.run_lane(lane, &cancel))).await;
        info!("Audit dispatcher stopped");
    }

    async fn run_lane(&self, lane: &SinkLane, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = lane.queue.ready() => {}
                _ = tokio::time::sleep(self.settings.flush_interval) => {}
            }
            self.drain(lane, false).await;
        }
        self.drain(lane, true).await;
    }

    async fn drain(&self, lane: &SinkLane, shutting_down: bool) {
        loop {
            let batch = lane.queue.drain(self.settings.batch_size);
            if batch.is_empty() {
                break;
            }
            if !self.deliver_with_retry(lane, &batch).await && shutting_down {
                let rest = lane.queue.drain(usize::MAX).len() as u64;
                if rest > 0 {
                    warn!(sink = lane.sink.name(), records = rest, "Abandoning queued audit records at shutdown");
                    lane.stats.records_abandoned.fetch_add(rest, Ordering::Relaxed);
                    telemetry::record_dropped(lane.sink.name(), "shutdown", rest);
                }
                break;
            }
        }
    }

    async fn deliver_with_retry(&self, lane: &SinkLane, batch: &[AuditRecord]) -> bool {
        let sink = lane.sink.as_ref();
        let records = batch.len() as u64;
        lane.stats.batches_total.fetch_add(1, Ordering::Relaxed);

        for attempt in 0..self.settings.max_attempts {
            let result = match tokio::time::timeout(self.settings.sink_timeout, sink.deliver(batch)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(self.settings.sink_timeout)),
            };

            match result {
                Ok(()) => {
                    debug!(sink = sink.name(), records, attempt = attempt + 1, "Audit batch delivered");
                    lane.stats.records_delivered.fetch_add(records, Ordering::Relaxed);
                    telemetry::record_delivered(sink.name(), records);
                    return true;
                }
                Err(e) => {
                    lane.stats
                        .dispatch_failures_total
                        .fetch_add(records, Ordering::Relaxed);
                    telemetry::record_dispatch_failures(sink.name(), records);
                    warn!(
                        "Audit sink '{}' failed (attempt {}/{}): {}",
                        sink.name(),
                        attempt + 1,
                        self.settings.max_attempts,
                        e
                    );

                    if attempt + 1 < self.settings.max_attempts {
                        tokio::time::sleep(backoff_delay(self.settings.base_backoff, attempt)).await;
                    }
                }
            }
        }

        error!(
            sink = sink.name(),
            records,
            "Audit sink exhausted {} attempts; abandoning batch",
            self.settings.max_attempts
        );
        lane.stats.records_abandoned.fetch_add(records, Ordering::Relaxed);
        telemetry::record_dropped(sink.name(), "undeliverable", records);
        false
    }
}
