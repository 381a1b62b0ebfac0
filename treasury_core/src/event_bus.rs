//! Event Bus - typed, synchronous publish/subscribe.
//!
//! Producers (coordinator, scenario runner) publish [`EngineEvent`]s;
//! observers register a handler per [`EventKind`] and receive events in
//! publish order, in subscription order. A failing handler (error or panic)
//! is logged and skipped; it never reaches the publisher.
//!
//! Async observers can instead take a `tokio::sync::broadcast` receiver via
//! [`EventBus::subscribe_channel`].

use crate::agent::AgentState;
use crate::decision::Decision;
use crate::error::SubscriberError;
use crate::scenario::RunOutcome;
use crate::sync;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::warn;
use treasury_env::{AgentId, RunId};

/// Discriminant of an [`EngineEvent`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DecisionCreated,
    AgentStateChanged,
    ScenarioStepCompleted,
    ScenarioCompleted,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// A decision was appended to the ledger
    DecisionCreated(Decision),

    /// An agent's lifecycle state changed
    AgentStateChanged {
        agent_id: AgentId,
        from: AgentState,
        to: AgentState,
    },

    /// A scenario step finished successfully
    ScenarioStepCompleted {
        run_id: RunId,
        scenario_id: String,
        step_index: usize,
        step_id: String,
        result: serde_json::Value,
    },

    /// A scenario run reached a terminal state
    ScenarioCompleted {
        run_id: RunId,
        scenario_id: String,
        outcome: RunOutcome,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::DecisionCreated(_) => EventKind::DecisionCreated,
            EngineEvent::AgentStateChanged { .. } => EventKind::AgentStateChanged,
            EngineEvent::ScenarioStepCompleted { .. } => EventKind::ScenarioStepCompleted,
            EngineEvent::ScenarioCompleted { .. } => EventKind::ScenarioCompleted,
        }
    }
}

type Handler = Arc<dyn Fn(&EngineEvent) -> Result<(), SubscriberError> + Send + Sync>;

struct Subscriber {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

/// Token returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct SubscriptionHandle {
    id: u64,
    kind: EventKind,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// In-process event bus.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    channel: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Creates a bus whose broadcast channel buffers `channel_capacity` events.
    pub fn new(channel_capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel,
        }
    }

    /// Creates an Arc-wrapped bus for sharing between producers.
    pub fn shared(channel_capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(channel_capacity))
    }

    /// Registers `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&EngineEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sync::write(&self.subscribers).push(Subscriber {
            id,
            kind,
            handler: Arc::new(handler),
        });
        SubscriptionHandle { id, kind }
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = sync::write(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != handle.id);
        subscribers.len() != before
    }

    /// Returns a receiver that sees every published event.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<EngineEvent> {
        self.channel.subscribe()
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        sync::read(&self.subscribers)
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Delivers `event` to every handler of its kind, in subscription order.
    ///
    /// Handlers run without the registry lock held, so a handler may itself
    /// subscribe, unsubscribe or publish.
    pub fn publish(&self, event: EngineEvent) -> Delivery {
        let kind = event.kind();
        let handlers: Vec<(u64, Handler)> = sync::read(&self.subscribers)
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut delivery = Delivery::default();
        for (id, handler) in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(SubscriberError::new(panic_message(panic.as_ref()))),
            };
            match error {
                None => delivery.delivered += 1,
                Some(e) => {
                    delivery.failed += 1;
                    warn!(subscription = id, ?kind, error = %e, "event handler failed");
                }
            }
        }

        // No receivers is not an error
        let _ = self.channel.send(event);
        delivery
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn state_event(agent: &str) -> EngineEvent {
        EngineEvent::AgentStateChanged {
            agent_id: AgentId::new(agent).unwrap(),
            from: AgentState::Stopped,
            to: AgentState::Active,
        }
    }

    #[test]
    fn test_delivers_in_subscription_order() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            let _ = bus.subscribe(EventKind::AgentStateChanged, move |_| {
                log.lock().unwrap().push(name);
                Ok(())
            });
        }

        let delivery = bus.publish(state_event("trader-1"));
        assert_eq!(delivery.delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_kind_is_delivered() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let _ = bus.subscribe(EventKind::DecisionCreated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(state_event("trader-1"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_handlers_do_not_block_delivery() {
        let bus = EventBus::default();
        let reached = Arc::new(AtomicU64::new(0));

        let _ = bus.subscribe(EventKind::AgentStateChanged, |_| {
            Err(SubscriberError::new("render failed"))
        });
        let _ = bus.subscribe(EventKind::AgentStateChanged, |_| panic!("observer bug"));
        let counter = Arc::clone(&reached);
        let _ = bus.subscribe(EventKind::AgentStateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let delivery = bus.publish(state_event("trader-1"));
        assert_eq!(delivery, Delivery { delivered: 1, failed: 2 });
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let handle = bus.subscribe(EventKind::AgentStateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(state_event("a"));
        assert!(bus.unsubscribe(handle));
        bus.publish(state_event("b"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::AgentStateChanged), 0);
    }

    #[test]
    fn test_handler_may_resubscribe_during_publish() {
        let bus = Arc::new(EventBus::default());
        let inner = Arc::clone(&bus);
        let _ = bus.subscribe(EventKind::AgentStateChanged, move |_| {
            let _ = inner.subscribe(EventKind::DecisionCreated, |_| Ok(()));
            Ok(())
        });

        bus.publish(state_event("a"));
        assert_eq!(bus.subscriber_count(EventKind::DecisionCreated), 1);
    }

    #[test]
    fn test_channel_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_channel();
        bus.publish(state_event("trader-1"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), EventKind::AgentStateChanged);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(state_event("a")), Delivery::default());
    }
}
