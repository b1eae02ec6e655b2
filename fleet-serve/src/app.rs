//! Axum app: shared state and the full Control API route table (§6).

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_config::AgentConfig;
use fleet_core::memory::{MemoryItem, MemoryKind};
use fleet_core::{launch_if_needed, AgentRegistry, Chain, EventEngine, LaunchStore, MemoryStore, Microblog};
use fleet_protocol::{Event, EventPayload, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::ApiError;

/// Everything a handler needs, shared across every connection. Built once at
/// startup and handed to [`router`] (mirrors the teacher's `AppState`
/// pattern, widened from one WS upgrade route to this whole REST surface).
pub struct AppState {
    pub engine: EventEngine,
    pub registry: Arc<AgentRegistry>,
    pub memory: Arc<dyn MemoryStore>,
    pub configs: HashMap<String, AgentConfig>,
    pub launch_store: Arc<dyn LaunchStore>,
    pub chains: HashMap<String, Arc<dyn Chain>>,
    pub microblogs: HashMap<String, Arc<dyn Microblog>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/agents", get(list_agents))
        .route("/agents/:id", get(get_agent))
        .route("/agents/:id/post", post(post_manual_post))
        .route("/agents/:id/reply", post(post_manual_reply))
        .route("/agents/:id/mood", post(post_mood_shift))
        .route("/agents/:id/memories", post(post_memory))
        .route("/agents/:id/memory", get(get_memory))
        .route("/agents/:id/relationships", get(get_relationships))
        .route("/agents/:id/context", get(get_context))
        .route("/agents/:id/launch", post(post_launch))
        .route("/events", post(post_event))
        .with_state(state)
}

fn require_agent<'a>(state: &'a AppState, id: &str) -> Result<&'a AgentConfig, ApiError> {
    state
        .configs
        .get(id)
        .ok_or_else(|| ApiError::AgentNotFound(id.to_string()))
}

#[derive(Serialize)]
struct StatusResponse {
    agent_count: usize,
    event_history_len: usize,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        agent_count: state.configs.len(),
        event_history_len: state.engine.history().await.len(),
    })
}

#[derive(Serialize)]
struct AgentSummaryResponse {
    id: String,
    name: String,
    state: fleet_core::AgentState,
    mood: fleet_core::Mood,
    last_post_time: Option<SystemTime>,
    trading_enabled: bool,
}

impl From<fleet_core::AgentSummary> for AgentSummaryResponse {
    fn from(summary: fleet_core::AgentSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            state: summary.state,
            mood: summary.mood,
            last_post_time: summary.last_post_time,
            trading_enabled: summary.trading_enabled,
        }
    }
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentSummaryResponse>> {
    let agents = state.registry.list().await;
    Json(agents.into_iter().map(AgentSummaryResponse::from).collect())
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AgentSummaryResponse>, ApiError> {
    require_agent(&state, &id)?;
    let summary = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::AgentNotFound(id.clone()))?;
    Ok(Json(summary.into()))
}

#[derive(Deserialize)]
struct PostRequest {
    context: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct EnqueuedResponse {
    event_id: String,
}

async fn post_manual_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PostRequest>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
    require_agent(&state, &id)?;
    let event = Event::new(
        fleet_core::memory::uuid6().to_string(),
        EventPayload::ManualPost {
            context: body.context,
            force: body.force,
        },
        Priority::High,
    )
    .with_targets([id]);
    let event_id = state.engine.enqueue(event).await;
    Ok(Json(EnqueuedResponse { event_id }))
}

#[derive(Deserialize)]
struct ReplyRequest {
    #[serde(rename = "tweetId")]
    tweet_id: String,
    content: Option<String>,
}

async fn post_manual_reply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
    require_agent(&state, &id)?;
    let event = Event::new(
        fleet_core::memory::uuid6().to_string(),
        EventPayload::ManualReply {
            tweet_id: body.tweet_id,
            content: body.content,
        },
        Priority::High,
    )
    .with_targets([id]);
    let event_id = state.engine.enqueue(event).await;
    Ok(Json(EnqueuedResponse { event_id }))
}

#[derive(Deserialize)]
struct MoodShiftRequest {
    #[serde(rename = "valenceShift", default)]
    valence_shift: f32,
    #[serde(rename = "arousalShift", default)]
    arousal_shift: f32,
    #[serde(rename = "dominanceShift", default)]
    dominance_shift: f32,
}

async fn post_mood_shift(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MoodShiftRequest>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
    require_agent(&state, &id)?;
    let event = Event::new(
        fleet_core::memory::uuid6().to_string(),
        EventPayload::MoodShift {
            valence_shift: body.valence_shift,
            arousal_shift: body.arousal_shift,
            dominance_shift: body.dominance_shift,
        },
        Priority::Normal,
    )
    .with_targets([id]);
    let event_id = state.engine.enqueue(event).await;
    Ok(Json(EnqueuedResponse { event_id }))
}

#[derive(Deserialize)]
struct AddMemoryRequest {
    content: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    importance: Option<f32>,
}

fn parse_kind(raw: Option<&str>) -> MemoryKind {
    match raw {
        Some("core") => MemoryKind::Core,
        Some("interaction") => MemoryKind::Interaction,
        Some("event") => MemoryKind::Event,
        Some("post") => MemoryKind::Post,
        _ => MemoryKind::General,
    }
}

#[derive(Serialize)]
struct MemoryAddedResponse {
    memory_id: String,
}

async fn post_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddMemoryRequest>,
) -> Result<Json<MemoryAddedResponse>, ApiError> {
    require_agent(&state, &id)?;
    if body.content.trim().is_empty() {
        return Err(ApiError::InvalidRequest("content must not be empty".to_string()));
    }
    let kind = parse_kind(body.kind.as_deref());
    let importance = body.importance.unwrap_or(0.5);
    let memory_id = fleet_core::memory::uuid6().to_string();
    let item = MemoryItem::new(memory_id.clone(), id.clone(), kind, body.content, importance);
    state.memory.insert(item).await?;

    let event = Event::new(
        fleet_core::memory::uuid6().to_string(),
        EventPayload::MemoryAdded {
            memory_id: memory_id.clone(),
            kind: format!("{kind:?}"),
        },
        Priority::Low,
    )
    .with_targets([id]);
    state.engine.enqueue(event).await;

    Ok(Json(MemoryAddedResponse { memory_id }))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn get_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MemoryItem>>, ApiError> {
    require_agent(&state, &id)?;
    let mut items = Vec::new();
    for kind in [
        MemoryKind::Core,
        MemoryKind::Interaction,
        MemoryKind::Event,
        MemoryKind::General,
        MemoryKind::Post,
    ] {
        items.extend(state.memory.list_by_kind(&id, kind, 0, 200).await?);
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(items))
}

async fn get_relationships(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<fleet_core::memory::Relationship>>, ApiError> {
    require_agent(&state, &id)?;
    Ok(Json(state.memory.list_relationships(&id).await?))
}

#[derive(Serialize)]
struct ContextResponse {
    config: AgentConfig,
    mood: Option<fleet_core::Mood>,
    state: Option<fleet_core::AgentState>,
    recent_memory: Vec<MemoryItem>,
}

async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContextResponse>, ApiError> {
    // Debug view, but credentials never cross the control API boundary.
    let mut config = require_agent(&state, &id)?.clone();
    config.twitter_credentials = Default::default();
    config.solana_integration = Default::default();
    let summary = state.registry.get(&id).await;
    let recent_memory = state
        .memory
        .list_by_kind(&id, MemoryKind::Interaction, 0, 20)
        .await?;
    Ok(Json(ContextResponse {
        config,
        mood: summary.as_ref().map(|s| s.mood),
        state: summary.as_ref().map(|s| s.state),
        recent_memory,
    }))
}

#[derive(Deserialize)]
struct LaunchRequest {
    #[serde(rename = "forceTweet", default)]
    force_tweet: bool,
    /// Overrides the agent's configured `simulate_launch` for this call.
    #[serde(default)]
    simulate: Option<bool>,
}

#[derive(Serialize)]
struct LaunchResponse {
    launched: bool,
    mint_address: Option<String>,
    link: Option<String>,
}

impl From<fleet_core::TokenLaunchState> for LaunchResponse {
    fn from(state: fleet_core::TokenLaunchState) -> Self {
        Self {
            launched: state.launched,
            mint_address: state.token_mint,
            link: state.pump_link,
        }
    }
}

/// Launches (or confirms the existing launch of) an agent's token (§8
/// "Idempotent launch"). Synchronous, unlike the other mutating routes,
/// since the caller needs the resulting mint/link back in the response, not
/// just an enqueued event id.
async fn post_launch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>, ApiError> {
    let config = require_agent(&state, &id)?;
    let simulate = body.simulate.unwrap_or(config.behavior.trading.simulate_launch);
    let display_name = config.name.clone();

    let chain = state
        .chains
        .get(&id)
        .ok_or_else(|| ApiError::AgentNotFound(id.clone()))?
        .clone();
    let microblog = state
        .microblogs
        .get(&id)
        .ok_or_else(|| ApiError::AgentNotFound(id.clone()))?
        .clone();

    let result = launch_if_needed(
        &id,
        &display_name,
        &id,
        simulate,
        body.force_tweet,
        chain.as_ref(),
        state.launch_store.as_ref(),
        microblog.as_ref(),
    )
    .await?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
struct DirectEventRequest {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(rename = "targetAgentIds", default)]
    target_agent_ids: Vec<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    delay: Option<f64>,
}

fn parse_priority(raw: Option<&str>) -> Priority {
    match raw {
        Some("low") => Priority::Low,
        Some("high") => Priority::High,
        Some("critical") => Priority::Critical,
        _ => Priority::Normal,
    }
}

async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DirectEventRequest>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
    if body.event_type.trim().is_empty() {
        return Err(ApiError::InvalidRequest("type must not be empty".to_string()));
    }
    let mut payload = serde_json::json!({ "type": body.event_type });
    if let serde_json::Value::Object(map) = &mut payload {
        if let serde_json::Value::Object(extra) = body.data {
            map.extend(extra);
        }
    }
    let mut event = Event::new(
        fleet_core::memory::uuid6().to_string(),
        EventPayload::DebugInject(payload),
        parse_priority(body.priority.as_deref()),
    )
    .with_targets(body.target_agent_ids);
    if let Some(delay) = body.delay {
        event = event.with_scheduled_time(SystemTime::now() + std::time::Duration::from_secs_f64(delay.max(0.0)));
    }
    let event_id = state.engine.enqueue(event).await;
    Ok(Json(EnqueuedResponse { event_id }))
}
