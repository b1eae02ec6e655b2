//! HTTP polling [`MentionSource`] (grounded in `fleet_core::microblog::HttpMicroblog`'s
//! twitterapi.io-style client): asks for mentions since the last call and
//! turns a bad response into [`IngestError`] the same way the provider's
//! generation path turns a bad response into `ProviderError`.

use async_trait::async_trait;
use fleet_core::ingestion::{MentionSource, RawMention, ThreadResolver};
use fleet_core::{IngestError, Microblog};
use std::sync::Arc;
use std::time::SystemTime;

pub struct HttpMentionSource {
    api_key: String,
    base_url: String,
    author_handle: String,
    client: reqwest::Client,
    since_id: Option<String>,
}

impl HttpMentionSource {
    pub fn new(api_key: impl Into<String>, author_handle: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.twitterapi.io".to_string(),
            author_handle: author_handle.into(),
            client: reqwest::Client::new(),
            since_id: None,
        }
    }

    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(serde::Deserialize)]
struct MentionRow {
    id: String,
    author_id: String,
    text: String,
    in_reply_to_id: Option<String>,
}

#[derive(serde::Deserialize)]
struct MentionsResponse {
    #[serde(default)]
    mentions: Vec<MentionRow>,
}

#[async_trait]
impl MentionSource for HttpMentionSource {
    async fn next_batch(&mut self) -> Result<Vec<RawMention>, IngestError> {
        let mut query = vec![("handle", self.author_handle.clone())];
        if let Some(since) = &self.since_id {
            query.push(("since_id", since.clone()));
        }

        let response = self
            .client
            .get(format!("{}/twitter/mentions", self.base_url))
            .header("x-api-key", &self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| IngestError::SourceUnavailable {
                source: "twitterapi.io".to_string(),
                detail: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IngestError::AccessDenied {
                source: "twitterapi.io".to_string(),
                detail: format!("status {}", response.status()),
            });
        }
        if !response.status().is_success() {
            return Err(IngestError::SourceUnavailable {
                source: "twitterapi.io".to_string(),
                detail: format!("status {}", response.status()),
            });
        }

        let parsed: MentionsResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Malformed(e.to_string()))?;

        if let Some(last) = parsed.mentions.last() {
            self.since_id = Some(last.id.clone());
        }

        Ok(parsed
            .mentions
            .into_iter()
            .map(|row| RawMention {
                tweet_id: row.id,
                author_id: row.author_id,
                content: row.text,
                in_reply_to: row.in_reply_to_id,
                created_at: SystemTime::now(),
            })
            .collect())
    }
}

/// Reconstructs thread history by walking `in_reply_to` through the same
/// microblog client an agent posts through, bounded so a cyclic or very deep
/// thread can't stall ingestion. Oldest first, matching [`ThreadResolver`].
pub struct MicroblogThreadResolver {
    microblog: Arc<dyn Microblog>,
    max_depth: usize,
}

impl MicroblogThreadResolver {
    pub fn new(microblog: Arc<dyn Microblog>) -> Self {
        Self {
            microblog,
            max_depth: 20,
        }
    }
}

#[async_trait]
impl ThreadResolver for MicroblogThreadResolver {
    async fn resolve_thread(&self, mention: &fleet_core::ingestion::RawMention) -> Result<Vec<String>, IngestError> {
        let mut chain = Vec::new();
        let mut cursor = mention.in_reply_to.clone();
        for _ in 0..self.max_depth {
            let Some(tweet_id) = cursor else { break };
            let tweet = self
                .microblog
                .get(&tweet_id)
                .await
                .map_err(|e| IngestError::SourceUnavailable {
                    source: "microblog".to_string(),
                    detail: e.to_string(),
                })?;
            let Some(tweet) = tweet else { break };
            cursor = tweet.in_reply_to.clone();
            chain.push(tweet.content);
        }
        chain.reverse();
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::microblog::FakeMicroblog;

    #[test]
    fn new_starts_with_no_since_id() {
        let source = HttpMentionSource::new("key", "agent_handle");
        assert!(source.since_id.is_none());
    }

    #[tokio::test]
    async fn thread_resolver_walks_reply_chain_oldest_first() {
        let microblog = Arc::new(FakeMicroblog::new());
        let root = microblog.post("agent-a", "root post").await.unwrap();
        let reply = microblog.reply("user-1", &root.id, "a reply").await.unwrap();

        let resolver = MicroblogThreadResolver::new(microblog);
        let mention = RawMention {
            tweet_id: "t-new".to_string(),
            author_id: "user-2".to_string(),
            content: "another reply".to_string(),
            in_reply_to: Some(reply.id.clone()),
            created_at: SystemTime::now(),
        };
        let history = resolver.resolve_thread(&mention).await.unwrap();
        assert_eq!(history, vec!["root post".to_string(), "a reply".to_string()]);
    }

    #[tokio::test]
    async fn thread_resolver_returns_empty_for_top_level_mention() {
        let microblog = Arc::new(FakeMicroblog::new());
        let resolver = MicroblogThreadResolver::new(microblog);
        let mention = RawMention {
            tweet_id: "t-1".to_string(),
            author_id: "user-1".to_string(),
            content: "hello".to_string(),
            in_reply_to: None,
            created_at: SystemTime::now(),
        };
        assert!(resolver.resolve_thread(&mention).await.unwrap().is_empty());
    }
}
