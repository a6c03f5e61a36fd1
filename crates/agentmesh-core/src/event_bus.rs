// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Publish/subscribe event plane (C9): a synchronous [`InMemoryEventBus`]
//! for in-process fan-out, an optional async queue-backed bus behind the
//! `async` feature, and an [`AnalyticsPlane`] subscriber that rolls events
//! into a one-minute sliding window of counters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::clock::Clock;
use crate::storage::glob_match;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub payload: Map<String, Json>,
    pub timestamp_ms: u64,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, timestamp_ms: u64) -> Self {
        let id = NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed);
        Self { event_id: format!("evt-{id}"), event_type: event_type.into(), source: source.into(), payload: Map::new(), timestamp_ms }
    }

    pub fn with_payload(mut self, payload: Map<String, Json>) -> Self {
        self.payload = payload;
        self
    }

    pub fn trust_score(&self) -> Option<f64> {
        self.payload.get("trust_score").and_then(Json::as_f64)
    }
}

pub type Handler = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: Arc<Handler>,
}

/// A synchronous, in-process event bus. `emit` calls matching handlers
/// inline on the caller's thread, in subscription order.
#[derive(Default, Clone)]
pub struct InMemoryEventBus {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, pattern: pattern.into(), handler: Arc::new(handler) });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.write().retain(|sub| sub.id != id);
    }

    pub fn emit(&self, event: Event) {
        let matching: Vec<Arc<Handler>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| glob_match(&sub.pattern, &event.event_type))
            .map(|sub| Arc::clone(&sub.handler))
            .collect();
        for handler in matching {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

/// One minute of rolled-up event counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub total_events: u64,
    pub handshakes_per_min_1m: f64,
    pub violations_per_min_1m: f64,
    pub avg_trust_score_1m: f64,
    pub events_by_type: HashMap<String, u64>,
}

struct WindowedEntry {
    received_at_ms: u64,
    event_type: String,
    trust_score: Option<f64>,
}

/// Subscribes to `*` and maintains a one-minute sliding window used to
/// produce [`AnalyticsSnapshot`]s on demand.
pub struct AnalyticsPlane<C: Clock> {
    clock: C,
    window: Arc<RwLock<VecDeque<WindowedEntry>>>,
    events_by_type: Arc<RwLock<HashMap<String, u64>>>,
    total_events: Arc<std::sync::atomic::AtomicU64>,
    _subscription: SubscriptionId,
}

const WINDOW_MS: u64 = 60_000;

impl<C: Clock + Clone + 'static> AnalyticsPlane<C> {
    pub fn new(bus: &InMemoryEventBus, clock: C) -> Self {
        let window: Arc<RwLock<VecDeque<WindowedEntry>>> = Arc::new(RwLock::new(VecDeque::new()));
        let events_by_type: Arc<RwLock<HashMap<String, u64>>> = Arc::new(RwLock::new(HashMap::new()));
        let total_events = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let clock_for_handler = clock.clone();

        let window_for_handler = Arc::clone(&window);
        let events_by_type_for_handler = Arc::clone(&events_by_type);
        let total_events_for_handler = Arc::clone(&total_events);

        let subscription = bus.subscribe(
            "*",
            Box::new(move |event: &Event| {
                total_events_for_handler.fetch_add(1, Ordering::Relaxed);
                *events_by_type_for_handler.write().entry(event.event_type.clone()).or_insert(0) += 1;
                window_for_handler.write().push_back(WindowedEntry {
                    received_at_ms: clock_for_handler.now_ms(),
                    event_type: event.event_type.clone(),
                    trust_score: event.trust_score(),
                });
            }),
        );

        Self { clock, window, events_by_type, total_events, _subscription: subscription }
    }

    pub fn get_stats(&self) -> AnalyticsSnapshot {
        let now = self.clock.now_ms();
        let cutoff = now.saturating_sub(WINDOW_MS);

        let mut window = self.window.write();
        while window.front().is_some_and(|entry| entry.received_at_ms < cutoff) {
            window.pop_front();
        }

        let elapsed_minutes = 1.0_f64;
        let handshakes = window.iter().filter(|entry| entry.event_type == "handshake.completed").count() as f64;
        let violations = window
            .iter()
            .filter(|entry| entry.event_type == "policy.violated" || entry.event_type == "trust.failed")
            .count() as f64;
        let trust_scores: Vec<f64> = window.iter().filter_map(|entry| entry.trust_score).collect();
        let avg_trust_score = if trust_scores.is_empty() { 0.0 } else { trust_scores.iter().sum::<f64>() / trust_scores.len() as f64 };

        AnalyticsSnapshot {
            total_events: self.total_events.load(Ordering::Relaxed),
            handshakes_per_min_1m: handshakes / elapsed_minutes,
            violations_per_min_1m: violations / elapsed_minutes,
            avg_trust_score_1m: avg_trust_score,
            events_by_type: self.events_by_type.read().clone(),
        }
    }
}

#[cfg(feature = "async")]
pub mod r#async {
    //! Queue-backed event bus for async consumers.
    //!
    //! Events emitted from any thread are buffered in a bounded ring; a
    //! background task drains the ring and dispatches to matching
    //! subscribers, applying a per-handler timeout so one hung handler
    //! cannot stall the drainer.

    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    use super::{Event, Handler, InMemoryEventBus, SubscriptionId};

    pub const DEFAULT_MAX_QUEUE: usize = 10_000;
    const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 1_000;

    struct Queue {
        buffer: Mutex<std::collections::VecDeque<Event>>,
        capacity: usize,
        notify: Notify,
    }

    /// An async-drained event bus. `emit` is non-blocking and synchronous;
    /// delivery happens on the task started by [`start`](AsyncEventBus::start).
    pub struct AsyncEventBus {
        queue: Arc<Queue>,
        sync_bus: InMemoryEventBus,
        drainer: Mutex<Option<JoinHandle<()>>>,
        handler_timeout: Duration,
    }

    impl Default for AsyncEventBus {
        fn default() -> Self {
            Self::new(DEFAULT_MAX_QUEUE)
        }
    }

    impl AsyncEventBus {
        pub fn new(maxsize: usize) -> Self {
            Self {
                queue: Arc::new(Queue { buffer: Mutex::new(std::collections::VecDeque::new()), capacity: maxsize, notify: Notify::new() }),
                sync_bus: InMemoryEventBus::new(),
                drainer: Mutex::new(None),
                handler_timeout: Duration::from_millis(DEFAULT_HANDLER_TIMEOUT_MS),
            }
        }

        pub fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> SubscriptionId {
            self.sync_bus.subscribe(pattern, handler)
        }

        pub fn unsubscribe(&self, id: SubscriptionId) {
            self.sync_bus.unsubscribe(id);
        }

        /// Non-blocking; drops the oldest buffered event when the queue is
        /// already at capacity, so emitters never stall on a slow drainer.
        pub fn emit(&self, event: Event) {
            let mut buffer = self.queue.buffer.lock();
            if buffer.len() >= self.queue.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event);
            drop(buffer);
            self.queue.notify.notify_one();
        }

        pub fn queue_len(&self) -> usize {
            self.queue.buffer.lock().len()
        }

        pub async fn start(&self) {
            let queue = Arc::clone(&self.queue);
            let sync_bus = self.sync_bus.clone();
            let timeout = self.handler_timeout;

            let handle = tokio::spawn(async move {
                loop {
                    let next = { queue.buffer.lock().pop_front() };
                    match next {
                        Some(event) => {
                            let bus = sync_bus.clone();
                            let _ = tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || bus.emit(event))).await;
                        }
                        None => {
                            queue.notify.notified().await;
                        }
                    }
                }
            });

            *self.drainer.lock() = Some(handle);
        }

        /// Stops the drainer (if running) and synchronously delivers
        /// whatever remains in the queue so no event emitted before `stop`
        /// is silently lost.
        pub async fn stop(&self) {
            if let Some(handle) = self.drainer.lock().take() {
                handle.abort();
            }
            loop {
                let next = { self.queue.buffer.lock().pop_front() };
                match next {
                    Some(event) => self.sync_bus.emit(event),
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_and_subscribe_delivers() {
        let bus = InMemoryEventBus::new();
        let received = Arc::new(RwLock::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        bus.subscribe("trust.*", Box::new(move |event: &Event| received_clone.write().push(event.event_type.clone())));

        bus.emit(Event::new("trust.verified", "did:mesh:a", 0));
        assert_eq!(*received.read(), vec!["trust.verified".to_string()]);
    }

    #[test]
    fn glob_pattern_filters_events() {
        let bus = InMemoryEventBus::new();
        let trust_count = Arc::new(AtomicUsize::new(0));
        let all_count = Arc::new(AtomicUsize::new(0));
        let trust_clone = Arc::clone(&trust_count);
        let all_clone = Arc::clone(&all_count);
        bus.subscribe("trust.*", Box::new(move |_| { trust_clone.fetch_add(1, Ordering::Relaxed); }));
        bus.subscribe("*", Box::new(move |_| { all_clone.fetch_add(1, Ordering::Relaxed); }));

        bus.emit(Event::new("trust.verified", "a", 0));
        bus.emit(Event::new("policy.violated", "b", 0));
        bus.emit(Event::new("agent.registered", "c", 0));

        assert_eq!(trust_count.load(Ordering::Relaxed), 1);
        assert_eq!(all_count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = InMemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = bus.subscribe("*", Box::new(move |_| { count_clone.fetch_add(1, Ordering::Relaxed); }));

        bus.emit(Event::new("test.event", "a", 0));
        bus.unsubscribe(id);
        bus.emit(Event::new("test.event", "b", 0));

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn analytics_tracks_handshakes_and_averages_trust_score() {
        let bus = InMemoryEventBus::new();
        let clock = Arc::new(FixedClock::new(0));
        let analytics = AnalyticsPlane::new(&bus, Arc::clone(&clock));

        let mut payload = Map::new();
        payload.insert("trust_score".to_string(), Json::from(800));
        bus.emit(Event::new("handshake.completed", "did:mesh:a", 0).with_payload(payload));

        let mut payload2 = Map::new();
        payload2.insert("trust_score".to_string(), Json::from(600));
        bus.emit(Event::new("trust.verified", "did:mesh:b", 0).with_payload(payload2));

        let stats = analytics.get_stats();
        assert_eq!(stats.total_events, 2);
        assert!(stats.handshakes_per_min_1m > 0.0);
        assert_eq!(stats.avg_trust_score_1m, 700.0);
    }

    #[test]
    fn analytics_empty_snapshot_is_zeroed() {
        let bus = InMemoryEventBus::new();
        let clock = Arc::new(FixedClock::new(0));
        let analytics = AnalyticsPlane::new(&bus, clock);
        let stats = analytics.get_stats();
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.avg_trust_score_1m, 0.0);
        assert!(stats.events_by_type.is_empty());
    }
}
