//! Coordination event bus.
//!
//! A lightweight publish/subscribe mechanism used to fan coordination events
//! (agent/task lifecycle transitions) out to observers. Unlike the
//! broadcast-channel idiom this crate's sibling components elsewhere favor,
//! subscribers here each own an independent bounded queue: a slow subscriber
//! drops its own oldest events rather than forcing every other subscriber
//! onto a shared lag signal. Emission never blocks, and each subscriber
//! exposes its own overflow counter for observability.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use forgewave_kernel::bus::{EventBus, Event};
//! # use chrono::Utc;
//! # async fn example() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(Event::SystemEvent {
//!     kind: "startup".into(),
//!     message: "kernel initialized".into(),
//!     timestamp: Utc::now(),
//! });
//!
//! let event = rx.recv().await;
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::types::{AgentStatus, TaskStatus};

/// Default bounded capacity for a subscriber's per-subscriber queue when the
/// caller does not specify one explicitly.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// A coordination event flowing through the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    AgentCreated {
        agent_id: Uuid,
        workspace_id: String,
        timestamp: DateTime<Utc>,
    },
    AgentStatusChanged {
        agent_id: Uuid,
        old_status: AgentStatus,
        new_status: AgentStatus,
        timestamp: DateTime<Utc>,
    },
    TaskDelegated {
        task_id: Uuid,
        agent_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    TaskStatusChanged {
        task_id: Uuid,
        old_status: TaskStatus,
        new_status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    MessageReceived {
        agent_id: Uuid,
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    AgentCompleted {
        agent_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// Generic event for anything that does not fit the above (used by
    /// ambient subsystems such as startup/shutdown logging hooks).
    SystemEvent {
        kind: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

struct SubscriberSlot {
    queue: Mutex<VecDeque<Arc<Event>>>,
    notify: Notify,
    overflow: AtomicU64,
    capacity: usize,
}

impl SubscriberSlot {
    fn push(&self, event: Arc<Event>) {
        let mut queue = self.queue.lock().expect("subscriber queue poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

struct EventBusInner {
    subscribers: dashmap::DashMap<Uuid, Arc<SubscriberSlot>>,
    default_capacity: usize,
}

/// Publish/subscribe event bus. Cheaply cloneable (`Arc`-backed).
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl EventBus {
    /// Create a new bus whose subscribers default to `capacity` buffered
    /// events each (drop-oldest once full).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: dashmap::DashMap::new(),
                default_capacity: capacity.max(1),
            }),
        }
    }

    /// Emit an event to all current subscribers. Never blocks, never fails:
    /// a subscriber with a full queue simply drops its oldest buffered event
    /// and records the drop in its overflow counter.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub fn emit(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let count = self.inner.subscribers.len();
        for entry in self.inner.subscribers.iter() {
            entry.value().push(Arc::clone(&event));
        }
        tracing::trace!(subscribers = count, "event emitted");
        count
    }

    /// Register a new subscriber with the bus's default queue capacity.
    pub fn subscribe(&self) -> EventReceiver {
        self.subscribe_with_capacity(self.inner.default_capacity)
    }

    /// Register a new subscriber with an explicit queue capacity.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> EventReceiver {
        let id = Uuid::now_v7();
        let slot = Arc::new(SubscriberSlot {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            overflow: AtomicU64::new(0),
            capacity: capacity.max(1),
        });
        self.inner.subscribers.insert(id, Arc::clone(&slot));
        tracing::trace!(subscriber_id = %id, "new event bus subscriber");
        EventReceiver {
            id,
            slot,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

/// A subscriber's handle onto the bus. Dropping it unsubscribes.
pub struct EventReceiver {
    id: Uuid,
    slot: Arc<SubscriberSlot>,
    bus: Arc<EventBusInner>,
}

impl EventReceiver {
    /// Await the next event in this subscriber's queue (FIFO).
    pub async fn recv(&mut self) -> Arc<Event> {
        loop {
            if let Some(event) = self.slot.queue.lock().expect("poisoned").pop_front() {
                return event;
            }
            self.slot.notify.notified().await;
        }
    }

    /// Non-blocking poll of the next event, if any is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.slot.queue.lock().expect("poisoned").pop_front()
    }

    /// Number of events dropped from this subscriber's queue due to overflow.
    pub fn overflow_count(&self) -> u64 {
        self.slot.overflow.load(Ordering::Relaxed)
    }

    /// This subscriber's stable identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.bus.subscribers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_event(kind: &str) -> Event {
        Event::SystemEvent {
            kind: kind.into(),
            message: "test".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn emit_and_receive_fifo() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(system_event("a"));
        bus.emit(system_event("b"));

        let first = rx.recv().await;
        let second = rx.recv().await;
        assert!(matches!(first.as_ref(), Event::SystemEvent { kind, .. } if kind == "a"));
        assert!(matches!(second.as_ref(), Event::SystemEvent { kind, .. } if kind == "b"));
    }

    #[tokio::test]
    async fn emit_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        let delivered = bus.emit(system_event("lonely"));
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let delivered = bus.emit(system_event("multi"));
        assert_eq!(delivered, 2);

        assert!(rx1.try_recv().is_some());
        assert!(rx2.try_recv().is_some());
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_and_counts_overflow() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_with_capacity(2);

        bus.emit(system_event("1"));
        bus.emit(system_event("2"));
        bus.emit(system_event("3"));

        assert_eq!(slow.overflow_count(), 1);
        let first = slow.recv().await;
        assert!(matches!(first.as_ref(), Event::SystemEvent { kind, .. } if kind == "2"));
        let second = slow.recv().await;
        assert!(matches!(second.as_ref(), Event::SystemEvent { kind, .. } if kind == "3"));
    }

    #[tokio::test]
    async fn fast_subscriber_unaffected_by_slow_one() {
        let bus = EventBus::new(16);
        let slow = bus.subscribe_with_capacity(1);
        let mut fast = bus.subscribe_with_capacity(16);

        for i in 0..5 {
            bus.emit(system_event(&i.to_string()));
        }

        assert!(slow.overflow_count() >= 4);
        // The fast subscriber kept every event, unaffected by the slow one.
        let mut count = 0;
        while fast.try_recv().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn dropping_receiver_unsubscribes() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
