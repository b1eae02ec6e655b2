//! SQLite-backed [`MemoryStore`]: memory items and relationships, one
//! database file per runtime. Grounded in the teacher's workspace store
//! (`Arc<Mutex<rusqlite::Connection>>`, blocking calls wrapped in
//! `tokio::task::block_in_place` so they don't stall the async executor).

use async_trait::async_trait;
use fleet_core::memory::{MemoryItem, MemoryKind, MemorySearchHit, MemoryStore, Relationship};
use fleet_core::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-agent cap on stored memory items, mirroring `InMemoryMemoryStore`'s default.
const DEFAULT_AGENT_MEMORY_CAP: usize = 500;

fn to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn from_millis(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

fn kind_to_str(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Core => "core",
        MemoryKind::Interaction => "interaction",
        MemoryKind::Event => "event",
        MemoryKind::General => "general",
        MemoryKind::Post => "post",
    }
}

fn kind_from_str(s: &str) -> Result<MemoryKind, StoreError> {
    match s {
        "core" => Ok(MemoryKind::Core),
        "interaction" => Ok(MemoryKind::Interaction),
        "event" => Ok(MemoryKind::Event),
        "general" => Ok(MemoryKind::General),
        "post" => Ok(MemoryKind::Post),
        other => Err(StoreError::Backend(format!("unknown memory kind {other:?}"))),
    }
}

/// Durable [`MemoryStore`] backed by a single SQLite file.
pub struct SqliteMemoryStore {
    db: Arc<Mutex<Connection>>,
    cap: usize,
}

impl SqliteMemoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| StoreError::Backend(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memory_items (
                agent_id TEXT NOT NULL,
                id TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                importance REAL NOT NULL,
                valence REAL NOT NULL DEFAULT 0.0,
                associations TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                PRIMARY KEY (agent_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_memory_items_agent_kind ON memory_items(agent_id, kind);
            CREATE TABLE IF NOT EXISTS relationships (
                agent_id TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                sentiment REAL NOT NULL,
                familiarity REAL NOT NULL DEFAULT 0.0,
                trust REAL NOT NULL DEFAULT 0.0,
                interaction_count INTEGER NOT NULL,
                last_interaction_at INTEGER NOT NULL,
                recent_interactions TEXT NOT NULL DEFAULT '[]',
                notes TEXT NOT NULL,
                PRIMARY KEY (agent_id, subject_id)
            );
            "#,
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            cap: DEFAULT_AGENT_MEMORY_CAP,
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<MemoryItemRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ))
    }

    /// Deletes the lowest-value non-core item for `agent_id` while its row
    /// count exceeds `cap` (§3 invariant). Runs inside an already-held lock.
    fn evict_over_cap(conn: &Connection, agent_id: &str, cap: usize) -> Result<(), StoreError> {
        loop {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM memory_items WHERE agent_id = ?1",
                    params![agent_id],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if (count as usize) <= cap {
                return Ok(());
            }

            let mut stmt = conn
                .prepare(
                    "SELECT agent_id, id, kind, content, importance, valence, associations, created_at, metadata
                     FROM memory_items WHERE agent_id = ?1 AND kind != 'core'",
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let rows = stmt
                .query_map(params![agent_id], Self::row_to_item)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let candidates: Vec<MemoryItem> = rows
                .map(|r| r.map_err(|e| StoreError::Backend(e.to_string())).and_then(row_to_memory_item))
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            let now = SystemTime::now();
            let victim = candidates
                .iter()
                .max_by(|a, b| {
                    a.eviction_score(now)
                        .partial_cmp(&b.eviction_score(now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            match victim {
                Some(item) => {
                    conn.execute(
                        "DELETE FROM memory_items WHERE agent_id = ?1 AND id = ?2",
                        params![item.agent_id, item.id],
                    )
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                }
                None => return Ok(()),
            }
        }
    }
}

type MemoryItemRow = (String, String, String, String, f32, f32, String, i64, String);

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn insert(&self, item: MemoryItem) -> Result<(), StoreError> {
        let db = self.db.clone();
        let cap = self.cap;
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            let associations = serde_json::to_string(&item.associations)?;
            conn.execute(
                "INSERT OR REPLACE INTO memory_items (agent_id, id, kind, content, importance, valence, associations, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    item.agent_id,
                    item.id,
                    kind_to_str(item.kind),
                    item.content,
                    item.importance,
                    item.valence,
                    associations,
                    to_millis(item.created_at),
                    item.metadata.to_string(),
                ],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Self::evict_over_cap(&conn, &item.agent_id, cap)?;
            Ok(())
        })
    }

    async fn get(&self, agent_id: &str, id: &str) -> Result<Option<MemoryItem>, StoreError> {
        let db = self.db.clone();
        let agent_id = agent_id.to_string();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            let row = conn
                .query_row(
                    "SELECT agent_id, id, kind, content, importance, valence, associations, created_at, metadata
                     FROM memory_items WHERE agent_id = ?1 AND id = ?2",
                    params![agent_id, id],
                    Self::row_to_item,
                )
                .optional()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            row.map(row_to_memory_item).transpose()
        })
    }

    async fn list_by_kind(
        &self,
        agent_id: &str,
        kind: MemoryKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        let db = self.db.clone();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT agent_id, id, kind, content, importance, valence, associations, created_at, metadata
                     FROM memory_items WHERE agent_id = ?1 AND kind = ?2
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let rows = stmt
                .query_map(
                    params![agent_id, kind_to_str(kind), limit as i64, offset as i64],
                    Self::row_to_item,
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            rows.map(|r| r.map_err(|e| StoreError::Backend(e.to_string())).and_then(row_to_memory_item))
                .collect()
        })
    }

    async fn search_similar(
        &self,
        agent_id: &str,
        similarity_fn: &(dyn Fn(&MemoryItem) -> f32 + Send + Sync),
        limit: usize,
    ) -> Result<Vec<MemorySearchHit>, StoreError> {
        // Similarity scoring needs the caller-supplied function evaluated in
        // process; pull every item for this agent, score in memory, then
        // truncate. Acceptable for the per-agent memory volumes this runtime
        // targets (thousands, not millions, of items).
        let all = {
            let db = self.db.clone();
            let agent_id = agent_id.to_string();
            tokio::task::block_in_place(move || {
                let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
                let mut stmt = conn
                    .prepare(
                        "SELECT agent_id, id, kind, content, importance, valence, associations, created_at, metadata
                         FROM memory_items WHERE agent_id = ?1",
                    )
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let rows = stmt
                    .query_map(params![agent_id], Self::row_to_item)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                rows.map(|r| r.map_err(|e| StoreError::Backend(e.to_string())).and_then(row_to_memory_item))
                    .collect::<Result<Vec<_>, _>>()
            })?
        };

        let mut hits: Vec<MemorySearchHit> = all
            .into_iter()
            .map(|item| {
                let similarity = similarity_fn(&item);
                let score = similarity * (0.5 + 0.5 * item.importance);
                MemorySearchHit { item, score }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.item
                        .importance
                        .partial_cmp(&a.item.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, agent_id: &str, id: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let agent_id = agent_id.to_string();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            conn.execute(
                "DELETE FROM memory_items WHERE agent_id = ?1 AND id = ?2",
                params![agent_id, id],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
    }

    async fn delete_all_by_kind(&self, agent_id: &str, kind: MemoryKind) -> Result<usize, StoreError> {
        let db = self.db.clone();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            let removed = conn
                .execute(
                    "DELETE FROM memory_items WHERE agent_id = ?1 AND kind = ?2",
                    params![agent_id, kind_to_str(kind)],
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(removed)
        })
    }

    async fn upsert_relationship(&self, relationship: Relationship) -> Result<(), StoreError> {
        let db = self.db.clone();
        let notes = serde_json::to_string(&relationship.notes)?;
        let recent_interactions = serde_json::to_string(&relationship.recent_interactions)?;
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            conn.execute(
                "INSERT INTO relationships (agent_id, subject_id, sentiment, familiarity, trust, interaction_count, last_interaction_at, recent_interactions, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(agent_id, subject_id) DO UPDATE SET
                    sentiment = excluded.sentiment,
                    familiarity = excluded.familiarity,
                    trust = excluded.trust,
                    interaction_count = excluded.interaction_count,
                    last_interaction_at = excluded.last_interaction_at,
                    recent_interactions = excluded.recent_interactions,
                    notes = excluded.notes",
                params![
                    relationship.agent_id,
                    relationship.subject_id,
                    relationship.sentiment,
                    relationship.familiarity,
                    relationship.trust,
                    relationship.interaction_count,
                    to_millis(relationship.last_interaction_at),
                    recent_interactions,
                    notes,
                ],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
    }

    async fn get_relationship(
        &self,
        agent_id: &str,
        subject_id: &str,
    ) -> Result<Option<Relationship>, StoreError> {
        let db = self.db.clone();
        let agent_id = agent_id.to_string();
        let subject_id = subject_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            let row = conn
                .query_row(
                    "SELECT agent_id, subject_id, sentiment, familiarity, trust, interaction_count, last_interaction_at, recent_interactions, notes
                     FROM relationships WHERE agent_id = ?1 AND subject_id = ?2",
                    params![agent_id, subject_id],
                    row_to_relationship,
                )
                .optional()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            row.map(parse_relationship_row).transpose()
        })
    }

    async fn list_relationships(&self, agent_id: &str) -> Result<Vec<Relationship>, StoreError> {
        let db = self.db.clone();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT agent_id, subject_id, sentiment, familiarity, trust, interaction_count, last_interaction_at, recent_interactions, notes
                     FROM relationships WHERE agent_id = ?1",
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let rows = stmt
                .query_map(params![agent_id], row_to_relationship)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            rows.map(|r| r.map_err(|e| StoreError::Backend(e.to_string())).and_then(parse_relationship_row))
                .collect()
        })
    }
}

fn row_to_memory_item(row: MemoryItemRow) -> Result<MemoryItem, StoreError> {
    let (agent_id, id, kind, content, importance, valence, associations, created_at, metadata) = row;
    Ok(MemoryItem {
        id,
        agent_id,
        kind: kind_from_str(&kind)?,
        content,
        importance,
        valence,
        associations: serde_json::from_str(&associations)?,
        created_at: from_millis(created_at),
        metadata: serde_json::from_str(&metadata)?,
    })
}

type RelationshipRow = (String, String, f32, f32, f32, u32, i64, String, String);

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<RelationshipRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn parse_relationship_row(row: RelationshipRow) -> Result<Relationship, StoreError> {
    let (agent_id, subject_id, sentiment, familiarity, trust, interaction_count, last_interaction_at, recent_interactions, notes) = row;
    let recent_interactions: VecDeque<String> = serde_json::from_str(&recent_interactions)?;
    Ok(Relationship {
        agent_id,
        subject_id,
        sentiment,
        familiarity,
        trust,
        interaction_count,
        last_interaction_at: from_millis(last_interaction_at),
        recent_interactions,
        notes: serde_json::from_str(&notes)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, agent: &str) -> MemoryItem {
        MemoryItem::new(id, agent, MemoryKind::Core, "hello", 0.5)
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.insert(item("m1", "agent-a")).await.unwrap();
        let got = store.get("agent-a", "m1").await.unwrap();
        assert_eq!(got.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn insert_replaces_existing_id() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.insert(item("m1", "agent-a")).await.unwrap();
        let mut updated = item("m1", "agent-a");
        updated.content = "updated".to_string();
        store.insert(updated).await.unwrap();

        let got = store.get("agent-a", "m1").await.unwrap().unwrap();
        assert_eq!(got.content, "updated");
    }

    #[tokio::test]
    async fn list_by_kind_orders_newest_first() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let mut older = item("m1", "agent-a");
        older.created_at = from_millis(1000);
        let mut newer = item("m2", "agent-a");
        newer.created_at = from_millis(2000);
        store.insert(older).await.unwrap();
        store.insert(newer).await.unwrap();

        let page = store.list_by_kind("agent-a", MemoryKind::Core, 0, 10).await.unwrap();
        assert_eq!(page[0].id, "m2");
    }

    #[tokio::test]
    async fn delete_all_by_kind_only_removes_matching_kind() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.insert(item("m1", "agent-a")).await.unwrap();
        store
            .insert(MemoryItem::new("m2", "agent-a", MemoryKind::Event, "x", 0.5))
            .await
            .unwrap();
        let removed = store.delete_all_by_kind("agent-a", MemoryKind::Core).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("agent-a", "m2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn relationship_upsert_is_idempotent_on_conflict() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let mut rel = Relationship::new("agent-a", "user-1");
        rel.interaction_count = 1;
        store.upsert_relationship(rel.clone()).await.unwrap();
        rel.interaction_count = 2;
        store.upsert_relationship(rel).await.unwrap();

        let got = store.get_relationship("agent-a", "user-1").await.unwrap().unwrap();
        assert_eq!(got.interaction_count, 2);
    }

    #[tokio::test]
    async fn relationship_round_trips_familiarity_trust_and_recent_interactions() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let mut rel = Relationship::new("agent-a", "user-1");
        rel.record_interaction(0.1, 0.05, 0.05, Some("hello".to_string()), SystemTime::now());
        store.upsert_relationship(rel).await.unwrap();

        let got = store.get_relationship("agent-a", "user-1").await.unwrap().unwrap();
        assert_eq!(got.familiarity, 0.05);
        assert_eq!(got.trust, 0.05);
        assert_eq!(got.recent_interactions.len(), 1);
    }

    #[tokio::test]
    async fn search_similar_applies_importance_weighting() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.insert(item("low", "agent-a")).await.unwrap();
        let mut high = item("high", "agent-a");
        high.importance = 0.9;
        store.insert(high).await.unwrap();

        let hits = store.search_similar("agent-a", &|_| 1.0, 10).await.unwrap();
        assert_eq!(hits[0].item.id, "high");
    }

    /// **Scenario**: once an agent's row count exceeds the cap, the
    /// lowest-value non-core item is evicted and core memories survive.
    #[tokio::test]
    async fn insert_evicts_lowest_value_non_core_item_past_cap() {
        let store = SqliteMemoryStore::in_memory().unwrap().with_cap(2);
        store
            .insert(MemoryItem::new("core-1", "agent-a", MemoryKind::Core, "c", 0.1))
            .await
            .unwrap();
        store
            .insert(MemoryItem::new("low", "agent-a", MemoryKind::Event, "c", 0.0))
            .await
            .unwrap();
        store
            .insert(MemoryItem::new("high", "agent-a", MemoryKind::Event, "c", 0.9))
            .await
            .unwrap();

        assert!(store.get("agent-a", "core-1").await.unwrap().is_some());
        assert!(store.get("agent-a", "low").await.unwrap().is_none());
        assert!(store.get("agent-a", "high").await.unwrap().is_some());
    }
}
