// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::warn;

use crate::domain::audit::AuditRecord;
use crate::infrastructure::telemetry;

/// Bounded in-memory buffer between the request path and one sink's
/// delivery loop.
///
/// `push` never blocks on I/O or waits for space: when full, the oldest
/// record is dropped and counted.
pub struct AuditQueue {
    sink: String,
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    flush_threshold: usize,
    ready: Notify,
    dropped: AtomicU64,
}

impl AuditQueue {
    pub fn new(sink: impl Into<String>, capacity: usize, flush_threshold: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink: sink.into(),
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            flush_threshold: flush_threshold.clamp(1, capacity),
            ready: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, record: AuditRecord) {
        let (depth, evicted) = {
            let mut records = self.records.lock();
            let evicted = if records.len() >= self.capacity {
                records.pop_front()
            } else {
                None
            };
            records.push_back(record);
            (records.len(), evicted)
        };

        if let Some(old) = evicted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            telemetry::record_dropped(&self.sink, "overflow", 1);
            // Log the first drop and then every thousandth
            if total == 1 || total % 1000 == 0 {
                warn!(
                    sink = %self.sink,
                    decision_id = %old.decision_id,
                    dropped_total = total,
                    "Audit queue full; dropping oldest record"
                );
            }
        }

        telemetry::record_queue_depth(&self.sink, depth);
        if depth >= self.flush_threshold {
            self.ready.notify_one();
        }
    }

    /// Remove up to `max` records, oldest first.
    pub fn drain(&self, max: usize) -> Vec<AuditRecord> {
        let mut records = self.records.lock();
        let n = max.min(records.len());
        let batch: Vec<AuditRecord> = records.drain(..n).collect();
        telemetry::record_queue_depth(&self.sink, records.len());
        batch
    }

    /// Wait until a full batch is buffered.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records evicted by overflow since start.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
