//! Outbound microblog capability (§3 Tweet, §4.4, §4.5): posting and
//! replying, plus a fake backing store for tests.
//!
//! Grounded in the teacher's Twitter search tool shape (an HTTP client
//! wrapped behind a narrow trait) but narrowed to what the content pipeline
//! and outbound gates actually need: post, reply, and a read-back for
//! idempotent re-delivery checks.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MicroblogError {
    #[error("microblog backend unavailable: {0}")]
    Unavailable(String),
    #[error("microblog backend rejected post: {0}")]
    Rejected(String),
}

/// A posted or replied tweet, as recorded by the microblog backend.
#[derive(Clone, Debug)]
pub struct Tweet {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub in_reply_to: Option<String>,
    pub created_at: SystemTime,
}

#[async_trait]
pub trait Microblog: Send + Sync {
    async fn post(&self, author_id: &str, content: &str) -> Result<Tweet, MicroblogError>;

    async fn reply(
        &self,
        author_id: &str,
        in_reply_to: &str,
        content: &str,
    ) -> Result<Tweet, MicroblogError>;

    async fn get(&self, tweet_id: &str) -> Result<Option<Tweet>, MicroblogError>;
}

/// In-memory fake microblog: every call succeeds and is recorded, unless
/// `set_failing` is toggled. IDs are assigned sequentially so tests can
/// assert on ordering.
#[derive(Default)]
pub struct FakeMicroblog {
    tweets: Mutex<Vec<Tweet>>,
    fail: std::sync::atomic::AtomicBool,
}

impl FakeMicroblog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn posted(&self) -> Vec<Tweet> {
        self.tweets.lock().unwrap().clone()
    }

    fn next_id(&self, tweets: &[Tweet]) -> String {
        format!("tweet-{}", tweets.len() + 1)
    }
}

#[async_trait]
impl Microblog for FakeMicroblog {
    async fn post(&self, author_id: &str, content: &str) -> Result<Tweet, MicroblogError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MicroblogError::Unavailable("fake set to fail".to_string()));
        }
        let mut tweets = self.tweets.lock().unwrap();
        let id = self.next_id(&tweets);
        let tweet = Tweet {
            id,
            author_id: author_id.to_string(),
            content: content.to_string(),
            in_reply_to: None,
            created_at: SystemTime::now(),
        };
        tweets.push(tweet.clone());
        Ok(tweet)
    }

    async fn reply(
        &self,
        author_id: &str,
        in_reply_to: &str,
        content: &str,
    ) -> Result<Tweet, MicroblogError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MicroblogError::Unavailable("fake set to fail".to_string()));
        }
        let mut tweets = self.tweets.lock().unwrap();
        let id = self.next_id(&tweets);
        let tweet = Tweet {
            id,
            author_id: author_id.to_string(),
            content: content.to_string(),
            in_reply_to: Some(in_reply_to.to_string()),
            created_at: SystemTime::now(),
        };
        tweets.push(tweet.clone());
        Ok(tweet)
    }

    async fn get(&self, tweet_id: &str) -> Result<Option<Tweet>, MicroblogError> {
        Ok(self
            .tweets
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == tweet_id)
            .cloned())
    }
}

/// HTTP-backed microblog client (twitterapi.io-style: base URL + `x-api-key`
/// header), grounded in the teacher's Twitter search tool. Used when an
/// agent's config carries real credentials instead of running against
/// [`FakeMicroblog`].
pub struct HttpMicroblog {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpMicroblog {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.twitterapi.io".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn write_tweet(
        &self,
        author_id: &str,
        content: &str,
        in_reply_to: Option<&str>,
    ) -> Result<Tweet, MicroblogError> {
        #[derive(serde::Deserialize)]
        struct WriteResponse {
            id: String,
        }

        let body = serde_json::json!({
            "text": content,
            "in_reply_to_tweet_id": in_reply_to,
        });

        let response = self
            .client
            .post(format!("{}/twitter/write_tweet", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MicroblogError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MicroblogError::Rejected(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: WriteResponse = response
            .json()
            .await
            .map_err(|e| MicroblogError::Rejected(e.to_string()))?;

        Ok(Tweet {
            id: parsed.id,
            author_id: author_id.to_string(),
            content: content.to_string(),
            in_reply_to: in_reply_to.map(str::to_string),
            created_at: SystemTime::now(),
        })
    }
}

#[async_trait]
impl Microblog for HttpMicroblog {
    async fn post(&self, author_id: &str, content: &str) -> Result<Tweet, MicroblogError> {
        self.write_tweet(author_id, content, None).await
    }

    async fn reply(
        &self,
        author_id: &str,
        in_reply_to: &str,
        content: &str,
    ) -> Result<Tweet, MicroblogError> {
        self.write_tweet(author_id, content, Some(in_reply_to)).await
    }

    async fn get(&self, tweet_id: &str) -> Result<Option<Tweet>, MicroblogError> {
        let response = self
            .client
            .get(format!("{}/twitter/tweets", self.base_url))
            .header("x-api-key", &self.api_key)
            .query(&[("tweet_ids", tweet_id)])
            .send()
            .await
            .map_err(|e| MicroblogError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Err(MicroblogError::Rejected(format!(
            "lookup not implemented beyond 404 check: status {}",
            response.status()
        )))
    }
}
