//! [`MemoryStore`] trait and its in-memory implementation (§4.3, §4.7).
//!
//! Mirrors the teacher's `Store` trait shape (an `async_trait` over an
//! `Arc<RwLock<HashMap<..>>>`), narrowed from generic namespace/key/value
//! storage to the concrete [`MemoryItem`]/[`Relationship`] schema this
//! runtime needs.

use super::item::{MemoryItem, MemoryKind, Relationship};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// One scored hit from [`MemoryStore::search_similar`].
#[derive(Clone, Debug)]
pub struct MemorySearchHit {
    pub item: MemoryItem,
    /// `similarity * (0.5 + 0.5 * importance)`.
    pub score: f32,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn insert(&self, item: MemoryItem) -> Result<(), StoreError>;

    async fn get(&self, agent_id: &str, id: &str) -> Result<Option<MemoryItem>, StoreError>;

    /// Lists an agent's memory items of one kind, newest first, paginated.
    async fn list_by_kind(
        &self,
        agent_id: &str,
        kind: MemoryKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError>;

    /// Ranks all of an agent's memory items by a caller-supplied raw
    /// similarity function, weighting by importance and breaking ties on
    /// `(importance desc, timestamp desc)` per the fixed scoring rule.
    async fn search_similar(
        &self,
        agent_id: &str,
        similarity_fn: &(dyn Fn(&MemoryItem) -> f32 + Send + Sync),
        limit: usize,
    ) -> Result<Vec<MemorySearchHit>, StoreError>;

    async fn delete(&self, agent_id: &str, id: &str) -> Result<(), StoreError>;

    async fn delete_all_by_kind(&self, agent_id: &str, kind: MemoryKind) -> Result<usize, StoreError>;

    async fn upsert_relationship(&self, relationship: Relationship) -> Result<(), StoreError>;

    async fn get_relationship(
        &self,
        agent_id: &str,
        subject_id: &str,
    ) -> Result<Option<Relationship>, StoreError>;

    async fn list_relationships(&self, agent_id: &str) -> Result<Vec<Relationship>, StoreError>;
}

/// Orders two hits by `(score desc, importance desc, timestamp desc)`,
/// treating a NaN score as the lowest possible value.
fn cmp_hits(a: &MemorySearchHit, b: &MemorySearchHit) -> std::cmp::Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
            a.item
                .importance
                .partial_cmp(&b.item.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .then_with(|| a.item.created_at.cmp(&b.item.created_at))
}

/// Per-agent cap on stored memory items (§3 invariant: non-core evicted by
/// `age * (1 - importance)` once exceeded).
pub const DEFAULT_AGENT_MEMORY_CAP: usize = 500;

/// Evicts the lowest-value non-core item for `agent_id` from `items` while
/// its count for that agent exceeds `cap`. Core memories are never
/// considered, so an agent with more than `cap` core memories simply stays
/// over cap rather than losing any of them.
fn evict_over_cap(items: &mut HashMap<(String, String), MemoryItem>, agent_id: &str, cap: usize) {
    let now = SystemTime::now();
    loop {
        let count = items.keys().filter(|(a, _)| a == agent_id).count();
        if count <= cap {
            return;
        }
        let victim = items
            .iter()
            .filter(|(_, item)| item.agent_id == agent_id && item.kind != MemoryKind::Core)
            .max_by(|(_, a), (_, b)| {
                a.eviction_score(now)
                    .partial_cmp(&b.eviction_score(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(key, _)| key.clone());
        match victim {
            Some(key) => {
                items.remove(&key);
            }
            None => return,
        }
    }
}

/// In-memory [`MemoryStore`]. Not persistent; used for tests and for the
/// control-API default when no durable backend is configured.
pub struct InMemoryMemoryStore {
    items: Arc<RwLock<HashMap<(String, String), MemoryItem>>>,
    relationships: Arc<RwLock<HashMap<(String, String), Relationship>>>,
    cap: usize,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            relationships: Arc::new(RwLock::new(HashMap::new())),
            cap: DEFAULT_AGENT_MEMORY_CAP,
        }
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            relationships: Arc::new(RwLock::new(HashMap::new())),
            cap,
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn insert(&self, item: MemoryItem) -> Result<(), StoreError> {
        let key = (item.agent_id.clone(), item.id.clone());
        let agent_id = item.agent_id.clone();
        let mut items = self.items.write().await;
        items.insert(key, item);
        evict_over_cap(&mut items, &agent_id, self.cap);
        Ok(())
    }

    async fn get(&self, agent_id: &str, id: &str) -> Result<Option<MemoryItem>, StoreError> {
        let key = (agent_id.to_string(), id.to_string());
        Ok(self.items.read().await.get(&key).cloned())
    }

    async fn list_by_kind(
        &self,
        agent_id: &str,
        kind: MemoryKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        let items = self.items.read().await;
        let mut matching: Vec<MemoryItem> = items
            .values()
            .filter(|item| item.agent_id == agent_id && item.kind == kind)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn search_similar(
        &self,
        agent_id: &str,
        similarity_fn: &(dyn Fn(&MemoryItem) -> f32 + Send + Sync),
        limit: usize,
    ) -> Result<Vec<MemorySearchHit>, StoreError> {
        let items = self.items.read().await;
        let mut hits: Vec<MemorySearchHit> = items
            .values()
            .filter(|item| item.agent_id == agent_id)
            .map(|item| {
                let similarity = similarity_fn(item);
                let score = similarity * (0.5 + 0.5 * item.importance);
                MemorySearchHit {
                    item: item.clone(),
                    score,
                }
            })
            .collect();
        hits.sort_by(|a, b| cmp_hits(b, a));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, agent_id: &str, id: &str) -> Result<(), StoreError> {
        let key = (agent_id.to_string(), id.to_string());
        self.items.write().await.remove(&key);
        Ok(())
    }

    async fn delete_all_by_kind(&self, agent_id: &str, kind: MemoryKind) -> Result<usize, StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, item| !(item.agent_id == agent_id && item.kind == kind));
        Ok(before - items.len())
    }

    async fn upsert_relationship(&self, relationship: Relationship) -> Result<(), StoreError> {
        let key = (relationship.agent_id.clone(), relationship.subject_id.clone());
        self.relationships.write().await.insert(key, relationship);
        Ok(())
    }

    async fn get_relationship(
        &self,
        agent_id: &str,
        subject_id: &str,
    ) -> Result<Option<Relationship>, StoreError> {
        let key = (agent_id.to_string(), subject_id.to_string());
        Ok(self.relationships.read().await.get(&key).cloned())
    }

    async fn list_relationships(&self, agent_id: &str) -> Result<Vec<Relationship>, StoreError> {
        let relationships = self.relationships.read().await;
        Ok(relationships
            .values()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect())
    }
}
