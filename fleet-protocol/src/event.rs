//! Wire-level event shape: tagged payload + priority + scheduling metadata.
//!
//! Mirrors the dispatch order the event engine enforces: `(priority desc,
//! scheduled_time asc, sequence asc)`. `sequence` is assigned by the engine at
//! enqueue time and is the deterministic tie-breaker across otherwise-equal
//! priority/time pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::SystemTime;

/// Dispatch priority. `Critical` always overtakes anything queued behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Tagged event payload. `DebugInject` is the one escape hatch for direct
/// event injection from the control API; every other variant is a concrete
/// struct so handlers never need to probe an opaque map.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SelfPosted {
        post_id: String,
        content: String,
    },
    MentionReceived {
        tweet_id: String,
        author_id: String,
        content: String,
        thread_history: Vec<String>,
    },
    ManualPost {
        context: Option<String>,
        force: bool,
    },
    ManualReply {
        tweet_id: String,
        content: Option<String>,
    },
    MoodShift {
        valence_shift: f32,
        arousal_shift: f32,
        dominance_shift: f32,
    },
    MemoryAdded {
        memory_id: String,
        kind: String,
    },
    TradeExecuted {
        amount: f64,
        token_mint: String,
    },
    TradeDenied {
        reason: String,
    },
    PostFailed {
        reason: String,
    },
    CredentialError {
        detail: String,
    },
    SelfTick,
    TradingTick,
    Shutdown,
    /// Debug-only escape hatch for the control API's direct event-injection endpoint.
    DebugInject(Value),
}

impl EventPayload {
    /// Short tag name, used for `subscribe(type, handler)` matching.
    pub fn type_tag(&self) -> &'static str {
        match self {
            EventPayload::SelfPosted { .. } => "self.posted",
            EventPayload::MentionReceived { .. } => "mention_received",
            EventPayload::ManualPost { .. } => "manual_post",
            EventPayload::ManualReply { .. } => "manual_reply",
            EventPayload::MoodShift { .. } => "mood_shift",
            EventPayload::MemoryAdded { .. } => "memory_added",
            EventPayload::TradeExecuted { .. } => "trade_executed",
            EventPayload::TradeDenied { .. } => "trade_denied",
            EventPayload::PostFailed { .. } => "post_failed",
            EventPayload::CredentialError { .. } => "credential_error",
            EventPayload::SelfTick => "self_tick",
            EventPayload::TradingTick => "trading_tick",
            EventPayload::Shutdown => "shutdown",
            EventPayload::DebugInject(_) => "debug_inject",
        }
    }
}

/// One event in flight through the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub payload: EventPayload,
    pub priority: Priority,
    pub created_at: SystemTime,
    pub scheduled_time: Option<SystemTime>,
    /// Empty means broadcast to every subscribed agent.
    pub target_agent_ids: Vec<String>,
    pub attempt_count: u32,
    /// Assigned by the engine at enqueue time; breaks ties deterministically.
    pub sequence: u64,
}

impl Event {
    pub fn new(id: impl Into<String>, payload: EventPayload, priority: Priority) -> Self {
        Self {
            id: id.into(),
            payload,
            priority,
            created_at: SystemTime::now(),
            scheduled_time: None,
            target_agent_ids: Vec::new(),
            attempt_count: 0,
            sequence: 0,
        }
    }

    pub fn with_targets(mut self, agent_ids: impl IntoIterator<Item = String>) -> Self {
        self.target_agent_ids = agent_ids.into_iter().collect();
        self
    }

    pub fn with_scheduled_time(mut self, at: SystemTime) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }

    /// True if this event targets `agent_id`, or is a broadcast.
    pub fn targets(&self, agent_id: &str) -> bool {
        self.target_agent_ids.is_empty() || self.target_agent_ids.iter().any(|a| a == agent_id)
    }

    /// Dispatch key: `(priority desc, scheduled_time asc, sequence asc)`.
    fn dispatch_key(&self) -> (Priority, std::cmp::Reverse<SystemTime>, std::cmp::Reverse<u64>) {
        let when = self.scheduled_time.unwrap_or(self.created_at);
        (
            self.priority,
            std::cmp::Reverse(when),
            std::cmp::Reverse(self.sequence),
        )
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.dispatch_key() == other.dispatch_key()
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered so a max-heap (`BinaryHeap`) pops in dispatch order: highest
/// priority first, then earliest scheduled time, then lowest sequence.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dispatch_key().cmp(&other.dispatch_key())
    }
}
