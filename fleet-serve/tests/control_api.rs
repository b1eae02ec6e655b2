//! End-to-end Control API tests: bind to a random port, spawn the server,
//! and hit it with real HTTP requests. Mirrors the teacher's e2e pattern of
//! binding `127.0.0.1:0`, spawning the server, then driving it through a
//! real client rather than calling handlers in-process.

use fleet_config::{AgentConfig, Behavior, Personality, SolanaIntegration, StyleGuide, TwitterCredentials};
use fleet_core::chain::FakeChain;
use fleet_core::memory::InMemoryMemoryStore;
use fleet_core::microblog::FakeMicroblog;
use fleet_core::provider::FakeProvider;
use fleet_core::{Agent, AgentDeps, AgentId, AgentRegistry, EventEngine, MemoryStore};
use fleet_serve::AppState;
use fleet_store::LaunchStateStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn test_config(id: &str) -> AgentConfig {
    AgentConfig {
        id: id.to_string(),
        name: "Test Agent".to_string(),
        description: "a test persona".to_string(),
        personality: Personality::default(),
        style_guide: StyleGuide::default(),
        behavior: Behavior::default(),
        initial_memory: vec![],
        custom_system_prompt: None,
        rotating_system_prompts: vec![],
        twitter_credentials: TwitterCredentials::default(),
        solana_integration: SolanaIntegration::default(),
    }
}

/// Spawns the event engine, one agent, and the control API on a random
/// port. Returns the base URL and the tasks' cancellation token.
async fn spawn_fleet(agent_id: &str) -> (String, CancellationToken, Arc<dyn fleet_core::MemoryStore>) {
    let engine = EventEngine::new(64);
    let registry = AgentRegistry::new();
    let memory: Arc<dyn fleet_core::MemoryStore> = Arc::new(InMemoryMemoryStore::new());
    let token = CancellationToken::new();

    let deps = AgentDeps {
        memory: memory.clone(),
        provider: Arc::new(FakeProvider::new("fake")),
        microblog: Arc::new(FakeMicroblog::new()),
        chain: Arc::new(FakeChain::new(100.0)),
    };
    let agent = Agent::new(AgentId::parse(agent_id).unwrap(), test_config(agent_id), deps);
    let rx = engine.subscribe(agent_id, 16).await;

    let timer_engine = engine.clone();
    let timer_token = token.clone();
    tokio::spawn(async move { timer_engine.run_timer(timer_token).await });
    let dispatch_engine = engine.clone();
    let dispatch_token = token.clone();
    tokio::spawn(async move { dispatch_engine.run_dispatch(dispatch_token).await });
    tokio::spawn(agent.run(rx, engine.clone(), registry.clone(), token.clone()));

    let mut configs = HashMap::new();
    configs.insert(agent_id.to_string(), test_config(agent_id));

    let launch_dir = std::env::temp_dir().join(format!("fleet-serve-test-{agent_id}-{}", fleet_core::memory::uuid6()));
    let launch_store: Arc<dyn fleet_core::LaunchStore> = Arc::new(LaunchStateStore::new(&launch_dir).unwrap());

    let mut chains: HashMap<String, Arc<dyn fleet_core::Chain>> = HashMap::new();
    chains.insert(agent_id.to_string(), Arc::new(FakeChain::new(100.0)));
    let mut microblogs: HashMap<String, Arc<dyn fleet_core::Microblog>> = HashMap::new();
    microblogs.insert(agent_id.to_string(), Arc::new(FakeMicroblog::new()));

    let state = Arc::new(AppState {
        engine,
        registry,
        memory: memory.clone(),
        configs,
        launch_store,
        chains,
        microblogs,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{addr}");
    tokio::spawn(fleet_serve::run_serve_on_listener(listener, state));

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (url, token, memory)
}

#[tokio::test]
async fn status_reports_agent_count() {
    let (url, token, _memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{url}/status")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["agent_count"], 1);
    token.cancel();
}

#[tokio::test]
async fn unknown_agent_returns_404_with_agent_not_found_code() {
    let (url, token, _memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{url}/agents/no-such-agent")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "AGENT_NOT_FOUND");
    token.cancel();
}

#[tokio::test]
async fn manual_post_enqueues_and_eventually_posts() {
    let (url, token, memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/agents/agent-a/post"))
        .json(&serde_json::json!({ "context": "a new release", "force": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let items = memory
        .list_by_kind("agent-a", fleet_core::memory::MemoryKind::Post, 0, 10)
        .await
        .unwrap();
    assert!(!items.is_empty(), "expected the manual post to be recorded as memory");
    token.cancel();
}

#[tokio::test]
async fn add_memory_then_list_memory_round_trips() {
    let (url, token, _memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/agents/agent-a/memories"))
        .json(&serde_json::json!({ "content": "remembers this", "type": "fact", "importance": 0.8 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{url}/agents/agent-a/memory"))
        .send()
        .await
        .unwrap();
    let items: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(items.iter().any(|i| i["content"] == "remembers this"));
    token.cancel();
}

#[tokio::test]
async fn empty_memory_content_is_rejected() {
    let (url, token, _memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/agents/agent-a/memories"))
        .json(&serde_json::json!({ "content": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_REQUEST");
    token.cancel();
}

#[tokio::test]
async fn context_endpoint_never_leaks_credentials() {
    let (url, token, _memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{url}/agents/agent-a/context")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["config"]["twitter_credentials"]["api_key"].is_null());
    token.cancel();
}

/// **Scenario**: relaunching an already-launched agent is a no-op unless
/// `forceTweet` is set (§8 "Idempotent launch").
#[tokio::test]
async fn launch_is_idempotent_across_repeated_calls() {
    let (url, token, _memory) = spawn_fleet("agent-a").await;
    let client = reqwest::Client::new();
    let first = client
        .post(format!("{url}/agents/agent-a/launch"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(first_body["launched"], true);

    let second = client
        .post(format!("{url}/agents/agent-a/launch"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second_body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second_body["mint_address"], first_body["mint_address"]);
    token.cancel();
}
