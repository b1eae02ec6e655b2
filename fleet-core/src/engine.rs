//! Event Engine (§4.2): a priority queue of ready events plus a timer heap
//! of future-scheduled events, with per-agent dispatch.
//!
//! Two `BinaryHeap`s live behind one `tokio::sync::Mutex`: `ready` (events
//! due now, ordered by the `(priority, scheduled_time, sequence)` dispatch
//! key `fleet_protocol::Event` already implements `Ord` for) and `scheduled`
//! (events due later, ordered earliest-first). A dedicated timer task moves
//! entries from `scheduled` to `ready` as their time arrives; a dispatch task
//! drains `ready` and fans each event out to every subscribed agent it
//! targets. Cancellation is a tombstone set checked at pop time, since
//! `BinaryHeap` has no efficient remove.

use fleet_protocol::{Event, EventHistory};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// Wraps a scheduled [`Event`] so the timer heap orders earliest-first
/// (`BinaryHeap` is a max-heap, so we reverse the comparison on time).
struct Scheduled(Event);

impl Scheduled {
    fn due_at(&self) -> SystemTime {
        self.0.scheduled_time.unwrap_or(self.0.created_at)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due_at() == other.due_at()
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse so BinaryHeap pops the earliest due_at first.
        other.due_at().cmp(&self.due_at())
    }
}

/// Key a type-keyed handler is registered under: either one exact
/// `Event::type_tag()` or the wildcard, which matches every type.
const WILDCARD_EVENT_TYPE: &str = "*";

type TypeHandler = Arc<dyn Fn(Event) + Send + Sync>;

struct Inner {
    ready: BinaryHeap<Event>,
    scheduled: BinaryHeap<Reverse<Scheduled>>,
    cancelled: HashSet<String>,
    subscribers: HashMap<String, mpsc::Sender<Event>>,
    type_handlers: HashMap<String, Vec<TypeHandler>>,
}

/// The runtime's central event dispatcher. Cheap to clone (`Arc` internally).
#[derive(Clone)]
pub struct EventEngine {
    inner: Arc<Mutex<Inner>>,
    history: Arc<Mutex<EventHistory>>,
    next_sequence: Arc<AtomicU64>,
    ready_notify: Arc<Notify>,
    scheduled_notify: Arc<Notify>,
}

impl EventEngine {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ready: BinaryHeap::new(),
                scheduled: BinaryHeap::new(),
                cancelled: HashSet::new(),
                subscribers: HashMap::new(),
                type_handlers: HashMap::new(),
            })),
            history: Arc::new(Mutex::new(EventHistory::new(history_capacity))),
            next_sequence: Arc::new(AtomicU64::new(0)),
            ready_notify: Arc::new(Notify::new()),
            scheduled_notify: Arc::new(Notify::new()),
        }
    }

    /// Registers an agent to receive events it is targeted by (including
    /// broadcasts). Replaces any previous subscription for the same id.
    pub async fn subscribe(&self, agent_id: impl Into<String>, buffer: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.inner.lock().await.subscribers.insert(agent_id.into(), tx);
        rx
    }

    pub async fn unsubscribe(&self, agent_id: &str) {
        self.inner.lock().await.subscribers.remove(agent_id);
    }

    /// Registers a handler invoked synchronously (from the dispatch loop)
    /// for every dispatched event whose [`fleet_protocol::EventPayload::type_tag`]
    /// matches `event_type`, or for every event when `event_type` is `"*"`
    /// (§4.2 `subscribe(type, handler)`). Unlike [`Self::subscribe`], this is
    /// additive: registering twice for the same type runs both handlers.
    pub async fn subscribe_type<F>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .await
            .type_handlers
            .entry(event_type.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Enqueues an event, assigning it a monotonic sequence number. Returns
    /// the event id for later cancellation.
    pub async fn enqueue(&self, mut event: Event) -> String {
        event.sequence = self.next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
        let id = event.id.clone();
        let now = SystemTime::now();
        let due_later = event.scheduled_time.is_some_and(|t| t > now);

        let mut inner = self.inner.lock().await;
        if due_later {
            inner.scheduled.push(Reverse(Scheduled(event)));
            drop(inner);
            self.scheduled_notify.notify_one();
        } else {
            inner.ready.push(event);
            drop(inner);
            self.ready_notify.notify_one();
        }
        id
    }

    /// Marks an event as cancelled; it is dropped silently whenever it is
    /// next popped from either heap, whichever comes first.
    pub async fn cancel(&self, event_id: &str) {
        self.inner.lock().await.cancelled.insert(event_id.to_string());
    }

    pub async fn history(&self) -> Vec<Event> {
        self.history.lock().await.snapshot()
    }

    /// Runs the timer loop until `token` is cancelled: moves due entries from
    /// `scheduled` into `ready`, sleeping until the next one is due or a
    /// fresher (earlier) entry is enqueued.
    pub async fn run_timer(&self, token: CancellationToken) {
        loop {
            let sleep_until = {
                let inner = self.inner.lock().await;
                inner.scheduled.peek().map(|Reverse(s)| s.due_at())
            };

            let wait = match sleep_until {
                Some(due) => {
                    let now = SystemTime::now();
                    due.duration_since(now).unwrap_or(std::time::Duration::ZERO)
                }
                None => std::time::Duration::from_secs(3600),
            };

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
                _ = self.scheduled_notify.notified() => {}
            }

            let now = SystemTime::now();
            let mut inner = self.inner.lock().await;
            let mut promoted = false;
            while let Some(Reverse(entry)) = inner.scheduled.peek() {
                if entry.due_at() > now {
                    break;
                }
                let Reverse(entry) = inner.scheduled.pop().unwrap();
                if inner.cancelled.remove(&entry.0.id) {
                    continue;
                }
                inner.ready.push(entry.0);
                promoted = true;
            }
            drop(inner);
            if promoted {
                self.ready_notify.notify_one();
            }
        }
    }

    /// Runs the dispatch loop until `token` is cancelled: pops the
    /// highest-priority ready event and fans it out to every subscriber it
    /// targets, recording it in the bounded history.
    pub async fn run_dispatch(&self, token: CancellationToken) {
        loop {
            let event = loop {
                let mut inner = self.inner.lock().await;
                match inner.ready.pop() {
                    Some(event) if inner.cancelled.remove(&event.id) => continue,
                    Some(event) => break Some(event),
                    None => break None,
                }
            };

            let Some(event) = event else {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = self.ready_notify.notified() => continue,
                }
            };

            let (subscribers, handlers) = {
                let inner = self.inner.lock().await;
                let type_tag = event.type_tag();
                let mut handlers: Vec<TypeHandler> = inner
                    .type_handlers
                    .get(type_tag)
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect();
                handlers.extend(
                    inner
                        .type_handlers
                        .get(WILDCARD_EVENT_TYPE)
                        .into_iter()
                        .flatten()
                        .cloned(),
                );
                (inner.subscribers.clone(), handlers)
            };
            for (agent_id, tx) in subscribers.iter() {
                if event.targets(agent_id) {
                    let _ = tx.send(event.clone()).await;
                }
            }
            for handler in &handlers {
                handler(event.clone());
            }
            self.history.lock().await.push(event);

            if token.is_cancelled() {
                return;
            }
        }
    }
}
