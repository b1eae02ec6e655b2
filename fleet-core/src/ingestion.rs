//! Mention ingestion (§4.6): a capability trait unifying streaming and
//! polling sources, thread reconstruction, and dedup of already-seen
//! mentions.

use crate::error::IngestError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::SystemTime;

/// One inbound mention as read off a source, before thread reconstruction.
#[derive(Clone, Debug)]
pub struct RawMention {
    pub tweet_id: String,
    pub author_id: String,
    pub content: String,
    pub in_reply_to: Option<String>,
    pub created_at: SystemTime,
}

/// A mention after thread history has been resolved.
#[derive(Clone, Debug)]
pub struct ReconstructedMention {
    pub tweet_id: String,
    pub author_id: String,
    pub content: String,
    /// Oldest first.
    pub thread_history: Vec<String>,
}

/// Ingestion capability, unifying the stream and poll access tiers behind
/// one shape: "give me the next batch". A streaming source yields batches
/// of size 1 as they arrive; a polling source yields whatever accumulated
/// since the last call.
#[async_trait]
pub trait MentionSource: Send + Sync {
    async fn next_batch(&mut self) -> Result<Vec<RawMention>, IngestError>;
}

/// Looks up a tweet's ancestry to reconstruct its thread, oldest first.
#[async_trait]
pub trait ThreadResolver: Send + Sync {
    async fn resolve_thread(&self, mention: &RawMention) -> Result<Vec<String>, IngestError>;
}

/// Deduplicates mentions by tweet id across ingestion cycles, bounded so a
/// long-running agent doesn't grow this set without limit.
pub struct MentionDedup {
    seen: HashSet<String>,
    order: std::collections::VecDeque<String>,
    capacity: usize,
}

impl MentionDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: std::collections::VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns true the first time a tweet id is seen, false on repeats.
    pub fn accept(&mut self, tweet_id: &str) -> bool {
        if self.seen.contains(tweet_id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(tweet_id.to_string());
        self.seen.insert(tweet_id.to_string());
        true
    }
}

/// Filters a batch of raw mentions through dedup, then resolves each
/// survivor's thread history.
pub async fn process_batch(
    batch: Vec<RawMention>,
    dedup: &mut MentionDedup,
    resolver: &dyn ThreadResolver,
) -> Result<Vec<ReconstructedMention>, IngestError> {
    let mut out = Vec::new();
    for mention in batch {
        if !dedup.accept(&mention.tweet_id) {
            continue;
        }
        let thread_history = resolver.resolve_thread(&mention).await?;
        out.push(ReconstructedMention {
            tweet_id: mention.tweet_id,
            author_id: mention.author_id,
            content: mention.content,
            thread_history,
        });
    }
    Ok(out)
}

/// Fake mention source for tests: yields a fixed sequence of batches, one
/// per call, then empty batches forever.
pub struct FakeMentionSource {
    batches: std::collections::VecDeque<Vec<RawMention>>,
}

impl FakeMentionSource {
    pub fn new(batches: Vec<Vec<RawMention>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

#[async_trait]
impl MentionSource for FakeMentionSource {
    async fn next_batch(&mut self) -> Result<Vec<RawMention>, IngestError> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}

/// Fake thread resolver: returns a fixed chain, ignoring the mention.
pub struct FakeThreadResolver {
    pub chain: Vec<String>,
}

#[async_trait]
impl ThreadResolver for FakeThreadResolver {
    async fn resolve_thread(&self, _mention: &RawMention) -> Result<Vec<String>, IngestError> {
        Ok(self.chain.clone())
    }
}
