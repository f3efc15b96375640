// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. The authorization
// hot path publishes one DecisionObserved per check; the SLO monitor is the
// main subscriber. A receiver that falls behind loses the oldest events
// instead of growing the buffer.

use crate::domain::events::{DecisionEvent, PolicyEvent, SloEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Decision(DecisionEvent),
    Slo(SloEvent),
    Policy(PolicyEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of events buffered per receiver before the
    /// oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(4096)
    }

    pub fn publish_decision_event(&self, event: DecisionEvent) {
        self.publish(DomainEvent::Decision(event));
    }

    pub fn publish_slo_event(&self, event: SloEvent) {
        self.publish(DomainEvent::Slo(event));
    }

    pub fn publish_policy_event(&self, event: PolicyEvent) {
        self.publish(DomainEvent::Policy(event));
    }

    fn publish(&self, event: DomainEvent) {
        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to decision observations only
    pub fn subscribe_decisions(&self) -> DecisionEventReceiver {
        DecisionEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver that skips everything except [`DecisionEvent`]s
pub struct DecisionEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl DecisionEventReceiver {
    pub async fn recv(&mut self) -> Result<DecisionEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Decision(decision_event) = event {
                return Ok(decision_event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn observed(allow: bool) -> DecisionEvent {
        DecisionEvent::DecisionObserved {
            decision_id: uuid::Uuid::new_v4().to_string(),
            allow,
            resource_type: "notes".to_string(),
            action: "read".to_string(),
            rule: "default_deny".to_string(),
            evaluation_time_ms: 0.2,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_decision_event(observed(true));

        match receiver.recv().await.unwrap() {
            DomainEvent::Decision(DecisionEvent::DecisionObserved { allow, .. }) => assert!(allow),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decision_receiver_filters_other_events() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_decisions();

        event_bus.publish_slo_event(SloEvent::WindowsReset {
            slo: "decision-denials".to_string(),
            reset_at: Utc::now(),
        });
        event_bus.publish_decision_event(observed(false));

        match receiver.recv().await.unwrap() {
            DecisionEvent::DecisionObserved { allow, .. } => assert!(!allow),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagging_receiver_drops_oldest() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();

        for _ in 0..5 {
            event_bus.publish_decision_event(observed(true));
        }

        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(3))));
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_ok());
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_decision_event(observed(true));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }

    #[test]
    fn test_event_serializes_with_tags() {
        let json = serde_json::to_value(DomainEvent::Slo(SloEvent::StaleMetrics {
            slo: "decision-latency".to_string(),
            detected_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(json["type"], "slo");
        assert_eq!(json["event"], "stale_metrics");
    }
}
