//! Shared, queryable read-model of every running agent (§6 `GET /agents`).
//!
//! The control API never reaches into a running [`crate::runtime::Agent`]
//! directly — it shares no lock with the per-agent task. Instead each agent
//! publishes a [`AgentSummary`] into this registry after every state
//! transition, and commands flow the other way, as events enqueued onto the
//! [`crate::engine::EventEngine`] (mirrors the teacher's `AppState` being the
//! only thing the control surface touches, never the task internals).

use crate::mood::Mood;
use crate::runtime::AgentState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub state: AgentState,
    pub mood: Mood,
    pub last_post_time: Option<SystemTime>,
    pub trading_enabled: bool,
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentSummary>>,
}

impl AgentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn upsert(&self, summary: AgentSummary) {
        self.agents.write().await.insert(summary.id.clone(), summary);
    }

    pub async fn get(&self, id: &str) -> Option<AgentSummary> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<AgentSummary> {
        let mut agents: Vec<_> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }
}
