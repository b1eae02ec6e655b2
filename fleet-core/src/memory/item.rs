//! Memory and relationship record types (§3 MemoryItem, Relationship).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::SystemTime;

/// Category of a stored memory item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A durable fact injected at config time (`initial_memory`). Never evicted.
    Core,
    /// A record of an action the agent itself took (a reply, a trade).
    Interaction,
    /// Something the agent observed (a mention, a market event).
    Event,
    /// A derived insight, produced by summarizing older memories.
    General,
    /// Content the agent composed and posted itself.
    Post,
}

/// One stored memory item, owned by exactly one agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub agent_id: String,
    pub kind: MemoryKind,
    pub content: String,
    /// `[0.0, 1.0]`; higher survives pruning and ranks higher in search.
    pub importance: f32,
    /// `[-1.0, 1.0]`; how the content felt to the agent at the time.
    #[serde(default)]
    pub valence: f32,
    /// Loosely-coupled ids of other memory items this one was formed from or
    /// relates to (e.g. the memories folded into a reflection).
    #[serde(default)]
    pub associations: Vec<String>,
    pub created_at: SystemTime,
    /// Escape hatch for kind-specific structured data (e.g. a tweet id).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl MemoryItem {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        kind: MemoryKind,
        content: impl Into<String>,
        importance: f32,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            kind,
            content: content.into(),
            importance: importance.clamp(0.0, 1.0),
            valence: 0.0,
            associations: Vec::new(),
            created_at: SystemTime::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_valence(mut self, valence: f32) -> Self {
        self.valence = valence.clamp(-1.0, 1.0);
        self
    }

    pub fn with_associations(mut self, associations: Vec<String>) -> Self {
        self.associations = associations;
        self
    }

    /// Eviction score (§3 invariant): lower means more evictable. Core items
    /// are never scored by callers since they're filtered out first.
    pub fn eviction_score(&self, now: SystemTime) -> f64 {
        let age_secs = now
            .duration_since(self.created_at)
            .unwrap_or_default()
            .as_secs_f64();
        age_secs * (1.0 - self.importance as f64)
    }
}

/// A relationship an agent has formed with one external party (another
/// account, a token holder, etc).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relationship {
    pub agent_id: String,
    pub subject_id: String,
    /// `[-1.0, 1.0]`.
    pub sentiment: f32,
    /// `[0.0, 1.0]`; monotonically non-decreasing per interaction.
    #[serde(default)]
    pub familiarity: f32,
    /// `[0.0, 1.0]`.
    #[serde(default)]
    pub trust: f32,
    pub interaction_count: u32,
    pub last_interaction_at: SystemTime,
    /// Bounded ring buffer of recent interaction notes, oldest dropped first.
    #[serde(default)]
    pub recent_interactions: VecDeque<String>,
    /// Bounded freeform notes, oldest dropped first.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Relationship {
    /// Recent-interaction ring buffer cap (§3 invariant).
    pub const MAX_RECENT_INTERACTIONS: usize = 32;
    /// Notes cap (§3 invariant).
    pub const MAX_NOTES: usize = 16;

    pub fn new(agent_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            agent_id: agent_id.into(),
            subject_id: subject_id.into(),
            sentiment: 0.0,
            familiarity: 0.0,
            trust: 0.0,
            interaction_count: 0,
            last_interaction_at: now,
            recent_interactions: VecDeque::new(),
            notes: Vec::new(),
        }
    }

    /// Records one more interaction (§4.3): applies clamped deltas to
    /// sentiment, familiarity, and trust, bumps the count, and appends `note`
    /// to both bounded note stores.
    pub fn record_interaction(
        &mut self,
        sentiment_change: f32,
        familiarity_change: f32,
        trust_change: f32,
        note: Option<String>,
        at: SystemTime,
    ) {
        let sentiment_change = sentiment_change.clamp(-0.2, 0.2);
        let familiarity_change = familiarity_change.clamp(0.0, 0.1);
        let trust_change = trust_change.clamp(-0.2, 0.2);

        self.sentiment = (self.sentiment + sentiment_change).clamp(-1.0, 1.0);
        self.familiarity = (self.familiarity + familiarity_change).clamp(0.0, 1.0);
        self.trust = (self.trust + trust_change).clamp(0.0, 1.0);
        self.interaction_count += 1;
        self.last_interaction_at = at;

        if let Some(note) = note {
            self.recent_interactions.push_back(note.clone());
            while self.recent_interactions.len() > Self::MAX_RECENT_INTERACTIONS {
                self.recent_interactions.pop_front();
            }
            self.notes.push(note);
            while self.notes.len() > Self::MAX_NOTES {
                self.notes.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_memory_item_clamps_importance() {
        let item = MemoryItem::new("m1", "agent-a", MemoryKind::Core, "hello", 3.0);
        assert_eq!(item.importance, 1.0);
    }

    #[test]
    fn with_valence_clamps_to_range() {
        let item = MemoryItem::new("m1", "agent-a", MemoryKind::Event, "hello", 0.5).with_valence(-4.0);
        assert_eq!(item.valence, -1.0);
    }

    #[test]
    fn record_interaction_clamps_sentiment_delta_not_just_result() {
        let mut rel = Relationship::new("agent-a", "user-42");
        rel.record_interaction(2.0, 0.0, 0.0, None, SystemTime::now());
        assert_eq!(rel.sentiment, 0.2);
        assert_eq!(rel.interaction_count, 1);
    }

    /// **Scenario**: familiarity change is clamped to [0, 0.1] per interaction
    /// and never decreases, even if a caller passes a negative value.
    #[test]
    fn record_interaction_familiarity_never_decreases() {
        let mut rel = Relationship::new("agent-a", "user-42");
        rel.record_interaction(0.0, -1.0, 0.0, None, SystemTime::now());
        assert_eq!(rel.familiarity, 0.0);
        rel.record_interaction(0.0, 1.0, 0.0, None, SystemTime::now());
        assert_eq!(rel.familiarity, 0.1);
    }

    #[test]
    fn record_interaction_appends_note_to_both_bounded_stores() {
        let mut rel = Relationship::new("agent-a", "user-42");
        rel.record_interaction(0.1, 0.05, 0.05, Some("said hi".to_string()), SystemTime::now());
        assert_eq!(rel.notes, vec!["said hi".to_string()]);
        assert_eq!(rel.recent_interactions.len(), 1);
    }

    #[test]
    fn recent_interactions_ring_buffer_drops_oldest_past_cap() {
        let mut rel = Relationship::new("agent-a", "user-42");
        for i in 0..(Relationship::MAX_RECENT_INTERACTIONS + 5) {
            rel.record_interaction(0.0, 0.0, 0.0, Some(format!("note {i}")), SystemTime::now());
        }
        assert_eq!(rel.recent_interactions.len(), Relationship::MAX_RECENT_INTERACTIONS);
        assert_eq!(rel.recent_interactions.front().unwrap(), "note 5");
    }

    #[test]
    fn notes_drops_oldest_past_cap() {
        let mut rel = Relationship::new("agent-a", "user-42");
        for i in 0..(Relationship::MAX_NOTES + 3) {
            rel.record_interaction(0.0, 0.0, 0.0, Some(format!("note {i}")), SystemTime::now());
        }
        assert_eq!(rel.notes.len(), Relationship::MAX_NOTES);
        assert_eq!(rel.notes[0], "note 3");
    }
}
