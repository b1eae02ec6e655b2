//! Agent Runtime Loop (§4.1): one [`Agent`] per `tokio::spawn`ed task, driven
//! by events delivered from the [`crate::engine::EventEngine`]. Self-ticks
//! are scheduled by re-enqueuing a `SelfTick` event rather than owning an OS
//! timer, so the event engine stays the single source of scheduling truth.

mod state;

pub use state::{transition, AgentState, InvalidTransition, Trigger};

use crate::chain::Chain;
use crate::error::RuntimeError;
use crate::gates::{CadenceGate, IdempotencyGate, RateGate, TradingSafetyState};
use crate::ids::AgentId;
use crate::memory::{MemoryItem, MemoryKind, MemoryStore, Relationship};
use crate::mood::{Mood, MoodState};
use crate::provider::{ContentProvider, GenerationParams};
use crate::microblog::Microblog;
use crate::registry::{AgentRegistry, AgentSummary};
use fleet_config::AgentConfig;
use fleet_protocol::{Event, EventPayload, Priority};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_POST_CHARS: usize = 280;

/// Strips control characters (newlines excepted) and truncates to the
/// platform's post length limit.
fn sanitize_generated_content(content: &str) -> String {
    let stripped: String = content.chars().filter(|c| !c.is_control() || *c == '\n').collect();
    stripped.chars().take(MAX_POST_CHARS).collect()
}

/// Heuristic detection of a model echoing its own system prompt or
/// disclaiming its nature instead of producing in-character content.
fn looks_meta_confused(system_prompt: &str, content: &str) -> bool {
    const META_PHRASES: [&str; 4] = [
        "as an ai language model",
        "i cannot generate content",
        "i'm just a language model",
        "as a large language model",
    ];
    let lower = content.to_lowercase();
    META_PHRASES.iter().any(|phrase| lower.contains(phrase)) || content.contains(system_prompt)
}

/// Everything one agent needs to carry out an action sequence. Built once at
/// startup and handed to [`Agent::new`].
pub struct AgentDeps {
    pub memory: Arc<dyn MemoryStore>,
    pub provider: Arc<dyn ContentProvider>,
    pub microblog: Arc<dyn Microblog>,
    pub chain: Arc<dyn Chain>,
}

/// One running persona. Owns its mood, gate state, and trading safety
/// counters; shares memory/provider/microblog/chain through `Arc`s since
/// those are stateless capabilities (or internally synchronized).
pub struct Agent {
    pub id: AgentId,
    config: AgentConfig,
    state: AgentState,
    mood: MoodState,
    deps: AgentDeps,
    rate_gate: RateGate,
    cadence_gate: CadenceGate,
    trading_safety: TradingSafetyState,
    idempotency: IdempotencyGate,
    last_post_time: Option<SystemTime>,
}

impl Agent {
    pub fn new(id: AgentId, config: AgentConfig, deps: AgentDeps) -> Self {
        let now = SystemTime::now();
        let cadence = CadenceGate::new(config.behavior.post_frequency.min_hours);
        let rate = RateGate::new(24, 24.0);
        Self {
            id,
            config,
            state: AgentState::Idle,
            mood: MoodState::new(Mood::default(), 0.1),
            deps,
            rate_gate: rate,
            cadence_gate: cadence,
            trading_safety: TradingSafetyState::new(now),
            idempotency: IdempotencyGate::new(256),
            last_post_time: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn mood(&mut self, now: SystemTime) -> Mood {
        self.mood.settle(now)
    }

    /// Snapshot published into the control API's [`AgentRegistry`] after
    /// every handled event.
    fn summary(&mut self, now: SystemTime) -> AgentSummary {
        AgentSummary {
            id: self.id.as_str().to_string(),
            name: self.config.name.clone(),
            state: self.state,
            mood: self.mood.settle(now),
            last_post_time: self.last_post_time,
            trading_enabled: self.config.behavior.trading.enabled,
        }
    }

    fn system_prompt(&self) -> String {
        if let Some(custom) = &self.config.custom_system_prompt {
            return custom.clone();
        }
        if !self.config.rotating_system_prompts.is_empty() {
            let index = rand::thread_rng().gen_range(0..self.config.rotating_system_prompts.len());
            return self.config.rotating_system_prompts[index].clone();
        }
        format!("You are {}. {}", self.config.name, self.config.description)
    }

    /// Bounded retry/backoff/deadline around one content-generation call
    /// (§4.1 step 3): up to three attempts, exponential backoff starting at
    /// 1s and capped at 10s between attempts, the whole sequence bounded by
    /// a 30s deadline. Non-transient provider errors are not retried.
    async fn generate_with_retry(
        &self,
        system_prompt: &str,
        instruction: &str,
        params: &GenerationParams,
    ) -> Result<String, RuntimeError> {
        const MAX_ATTEMPTS: u32 = 3;
        const BASE_BACKOFF: Duration = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(10);
        const DEADLINE: Duration = Duration::from_secs(30);

        let attempts = async {
            let mut last_err = None;
            for attempt in 0..MAX_ATTEMPTS {
                match self.deps.provider.generate(system_prompt, instruction, params).await {
                    Ok(content) => return Ok(content),
                    Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                        let backoff = BASE_BACKOFF.saturating_mul(1u32 << attempt).min(MAX_BACKOFF);
                        tokio::time::sleep(backoff).await;
                        last_err = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(last_err.expect("loop only exits without returning after recording an error"))
        };

        tokio::time::timeout(DEADLINE, attempts)
            .await
            .map_err(|_| RuntimeError::InvariantViolated("content generation deadline exceeded".to_string()))?
            .map_err(RuntimeError::from)
    }

    /// Generates one piece of post/reply content, applies post-processing
    /// (§4.1 step 4: control-character stripping, 280-character truncation,
    /// meta-confusion detection with one higher-temperature remediation
    /// retry), and falls back to a canned line plus an incident memory if
    /// generation never recovers.
    async fn generate_post_content(&self, system_prompt: &str, instruction: &str) -> String {
        let params = GenerationParams::default();
        let content = match self.generate_with_retry(system_prompt, instruction, &params).await {
            Ok(content) => content,
            Err(err) => {
                warn!(agent = %self.id, error = %err, "content generation failed after retries");
                self.remember(MemoryKind::Event, format!("generation failure: {err}"), 0.7)
                    .await;
                return Self::fallback_post_content();
            }
        };
        if !looks_meta_confused(system_prompt, &content) {
            return sanitize_generated_content(&content);
        }

        warn!(agent = %self.id, "generated content echoed its own instructions, retrying hotter");
        let hotter = GenerationParams {
            temperature: (params.temperature + 0.2).min(1.0),
            ..params
        };
        match self.generate_with_retry(system_prompt, instruction, &hotter).await {
            Ok(content) if !looks_meta_confused(system_prompt, &content) => sanitize_generated_content(&content),
            _ => {
                self.remember(
                    MemoryKind::Event,
                    "generation repeatedly echoed its own instructions".to_string(),
                    0.7,
                )
                .await;
                Self::fallback_post_content()
            }
        }
    }

    fn fallback_post_content() -> String {
        "taking a moment, back soon.".to_string()
    }

    async fn remember(&self, kind: MemoryKind, content: impl Into<String>, importance: f32) {
        let item = MemoryItem::new(
            crate::memory::uuid6().to_string(),
            self.id.as_str(),
            kind,
            content,
            importance,
        );
        if let Err(err) = self.deps.memory.insert(item).await {
            warn!(agent = %self.id, error = %err, "failed to record memory");
        }
    }

    /// Runs the seven-step action sequence for composing and posting
    /// original content, driven by a `SelfTick` (§4.1):
    /// 1. settle mood, 2. gather recent memory context, 3. generate content,
    /// 4. pass the cadence/rate gates, 5. post, 6. record the outcome as
    /// memory, 7. transition to Cooling.
    async fn compose_and_post(&mut self, now: SystemTime) -> Result<Event, RuntimeError> {
        self.compose_and_post_with(now, None, false).await
    }

    /// Same action sequence, but for a control-API-initiated `manual_post`:
    /// `context` is folded into the generation instruction, and `force`
    /// bypasses the cadence/rate gates (§6 `POST /agents/{id}/post`).
    async fn compose_and_post_with(
        &mut self,
        now: SystemTime,
        context: Option<&str>,
        force: bool,
    ) -> Result<Event, RuntimeError> {
        let _mood = self.mood.settle(now);

        if !force {
            self.cadence_gate.check_and_record(now)?;
            self.rate_gate.check_and_record(now)?;
        }

        let system_prompt = self.system_prompt();
        let instruction = match context {
            Some(context) => format!("Write a new post about: {context}"),
            None => "Write a new post.".to_string(),
        };
        let content = self.generate_post_content(&system_prompt, &instruction).await;

        let tweet = self
            .deps
            .microblog
            .post(self.id.as_str(), &content)
            .await
            .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;

        self.remember(MemoryKind::Post, tweet.content.clone(), 0.3).await;
        self.last_post_time = Some(now);

        Ok(Event::new(
            crate::memory::uuid6().to_string(),
            EventPayload::SelfPosted {
                post_id: tweet.id,
                content: tweet.content,
            },
            Priority::Normal,
        ))
    }

    /// Action sequence for replying to a mention (§4.1, driven by
    /// `MentionReceived`).
    async fn react_to_mention(
        &mut self,
        tweet_id: &str,
        author_id: &str,
        content: &str,
        thread_history: &[String],
    ) -> Result<Event, RuntimeError> {
        let now = SystemTime::now();
        self.idempotency.check_and_record(format!("reply:{tweet_id}"))?;

        let system_prompt = self.system_prompt();
        let instruction = format!(
            "Reply to this mention: \"{content}\"\nThread so far: {}",
            thread_history.join(" -> ")
        );
        let reply_content = self.generate_post_content(&system_prompt, &instruction).await;

        let reply = self
            .deps
            .microblog
            .reply(self.id.as_str(), tweet_id, &reply_content)
            .await
            .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;

        let mut relationship = self
            .deps
            .memory
            .get_relationship(self.id.as_str(), author_id)
            .await?
            .unwrap_or_else(|| Relationship::new(self.id.as_str(), author_id));
        relationship.record_interaction(0.1, 0.05, 0.05, Some(reply.content.clone()), now);
        self.deps.memory.upsert_relationship(relationship).await?;

        self.remember(MemoryKind::Interaction, reply.content.clone(), 0.5).await;

        Ok(Event::new(
            crate::memory::uuid6().to_string(),
            EventPayload::SelfPosted {
                post_id: reply.id,
                content: reply.content,
            },
            Priority::Normal,
        ))
    }

    /// Action sequence for a control-API-initiated reply (§6
    /// `POST /agents/{id}/reply`). Posts `content` verbatim if given,
    /// otherwise generates one.
    async fn manual_reply(&mut self, tweet_id: &str, content: Option<&str>) -> Result<Event, RuntimeError> {
        self.idempotency.check_and_record(format!("reply:{tweet_id}"))?;

        let reply_content = match content {
            Some(content) => content.to_string(),
            None => {
                let system_prompt = self.system_prompt();
                self.generate_post_content(&system_prompt, "Write a reply to this mention.").await
            }
        };

        let reply = self
            .deps
            .microblog
            .reply(self.id.as_str(), tweet_id, &reply_content)
            .await
            .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;

        self.remember(MemoryKind::Interaction, reply.content.clone(), 0.5).await;

        Ok(Event::new(
            crate::memory::uuid6().to_string(),
            EventPayload::SelfPosted {
                post_id: reply.id,
                content: reply.content,
            },
            Priority::Normal,
        ))
    }

    /// Action sequence for a trading decision (§4.1, §4.5, driven by
    /// `TradingTick`). `random_draw` and `quoted_slippage_percent` are
    /// injected so the safety check is deterministic under test;
    /// `is_human_initiated` distinguishes a human trading request from one
    /// the agent decided on its own.
    async fn trade(
        &mut self,
        wallet: &str,
        token_mint: &str,
        amount: f64,
        quoted_slippage_percent: f64,
        is_human_initiated: bool,
        random_draw: f64,
    ) -> Result<Event, RuntimeError> {
        let now = SystemTime::now();
        let balance = self
            .deps
            .chain
            .balance(wallet)
            .await
            .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;

        if let Err(err) = self.trading_safety.check(
            &self.config.behavior.trading,
            token_mint,
            amount,
            balance,
            quoted_slippage_percent,
            is_human_initiated,
            now,
            random_draw,
        ) {
            return Ok(Event::new(
                crate::memory::uuid6().to_string(),
                EventPayload::TradeDenied {
                    reason: err.to_string(),
                },
                Priority::Normal,
            ));
        }

        let receipt = self
            .deps
            .chain
            .swap(wallet, token_mint, amount, self.config.behavior.trading.max_slippage_percent)
            .await
            .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;
        self.trading_safety.record(amount, now);

        self.remember(
            MemoryKind::Interaction,
            format!("traded {amount} of {token_mint}"),
            0.6,
        )
        .await;

        Ok(Event::new(
            crate::memory::uuid6().to_string(),
            EventPayload::TradeExecuted {
                amount: receipt.amount,
                token_mint: receipt.token_mint,
            },
            Priority::Normal,
        ))
    }

    /// Handles one delivered event: runs the matching state transition and
    /// action sequence, and returns a follow-up event (if any) for the
    /// caller to enqueue back onto the event engine.
    pub async fn handle_event(&mut self, event: &Event) -> Result<Option<Event>, RuntimeError> {
        // Mood shifts and memory notifications are orthogonal to the action
        // state machine: they never contend for Idle/Composing/etc, so they
        // are applied directly and never reach the trigger/transition below.
        match &event.payload {
            EventPayload::MoodShift {
                valence_shift,
                arousal_shift,
                dominance_shift,
            } => {
                self.mood
                    .apply_shift(SystemTime::now(), *valence_shift, *arousal_shift, *dominance_shift);
                return Ok(None);
            }
            EventPayload::MemoryAdded { .. } => return Ok(None),
            _ => {}
        }

        let trigger = match &event.payload {
            EventPayload::SelfTick => Trigger::SelfTick,
            EventPayload::ManualPost { .. } => Trigger::SelfTick,
            EventPayload::MentionReceived { .. } => Trigger::MentionReceived,
            EventPayload::ManualReply { .. } => Trigger::MentionReceived,
            EventPayload::TradingTick => Trigger::TradingTick,
            EventPayload::Shutdown => Trigger::Shutdown,
            _ => return Ok(None),
        };

        let next_state = transition(self.state, trigger)
            .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;
        self.state = next_state;

        let outcome = match (&event.payload, self.state) {
            (EventPayload::SelfTick, AgentState::Composing) => {
                self.compose_and_post(SystemTime::now()).await
            }
            (EventPayload::ManualPost { context, force }, AgentState::Composing) => {
                self.compose_and_post_with(SystemTime::now(), context.as_deref(), *force)
                    .await
            }
            (
                EventPayload::MentionReceived {
                    tweet_id,
                    author_id,
                    content,
                    thread_history,
                },
                AgentState::Reacting,
            ) => {
                self.react_to_mention(tweet_id, author_id, content, thread_history)
                    .await
            }
            (EventPayload::ManualReply { tweet_id, content }, AgentState::Reacting) => {
                self.manual_reply(tweet_id, content.as_deref()).await
            }
            (EventPayload::Shutdown, AgentState::Stopped) => {
                info!(agent = %self.id, "agent stopped");
                return Ok(None);
            }
            (EventPayload::SelfTick, AgentState::Idle) => return Ok(None),
            _ => return Ok(None),
        };

        let follow_up_trigger = if outcome.is_ok() {
            Trigger::ActionCompleted
        } else {
            Trigger::ActionFailed
        };
        self.state = transition(self.state, follow_up_trigger)
            .unwrap_or(AgentState::Cooling);

        match outcome {
            Ok(result_event) => Ok(Some(result_event)),
            Err(err) => {
                warn!(agent = %self.id, error = %err, "action sequence failed");
                Ok(Some(Event::new(
                    crate::memory::uuid6().to_string(),
                    EventPayload::PostFailed {
                        reason: err.to_string(),
                    },
                    Priority::Low,
                )))
            }
        }
    }

    /// Drives this agent's loop until `Shutdown` or cancellation: receives
    /// events, handles each, and re-enqueues follow-ups plus the next
    /// self-tick back onto `engine`.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Event>,
        engine: crate::engine::EventEngine,
        registry: Arc<AgentRegistry>,
        token: CancellationToken,
    ) {
        let summary = self.summary(SystemTime::now());
        registry.upsert(summary).await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                event = events.recv() => {
                    let Some(event) = event else { return };
                    let is_shutdown = matches!(event.payload, EventPayload::Shutdown);
                    match self.handle_event(&event).await {
                        Ok(Some(follow_up)) => {
                            engine.enqueue(follow_up).await;
                        }
                        Ok(None) => {}
                        Err(err) => warn!(agent = %self.id, error = %err, "event handling error"),
                    }
                    let summary = self.summary(SystemTime::now());
                    registry.upsert(summary).await;
                    if self.state == AgentState::Cooling {
                        let delay = self.next_tick_delay();
                        let tick = Event::new(
                            crate::memory::uuid6().to_string(),
                            EventPayload::SelfTick,
                            Priority::Low,
                        )
                        .with_targets([self.id.as_str().to_string()])
                        .with_scheduled_time(SystemTime::now() + delay);
                        engine.enqueue(tick).await;
                    }
                    if is_shutdown {
                        return;
                    }
                }
            }
        }
    }

    fn next_tick_delay(&self) -> Duration {
        let min = self.config.behavior.post_frequency.min_hours.max(0.01);
        let max = self.config.behavior.post_frequency.max_hours.max(min);
        let hours = rand::thread_rng().gen_range(min..=max);
        Duration::from_secs_f64(hours * 3600.0)
    }
}
