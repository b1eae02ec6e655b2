//! Fleet daemon entrypoint: loads agent configs, wires each agent's
//! capabilities, runs the event engine and the Control API until a shutdown
//! signal. Structurally grounded in the teacher's `cli::main` (config load,
//! then logging init, then dispatch) and in `AppState` construction already
//! built for `fleet-serve`'s own tests.

mod log_format;
mod logging;
mod mention_source;

use clap::Parser;
use fleet_config::{resolve_credentials, AgentConfig, MentionMode};
use fleet_core::chain::FakeChain;
use fleet_core::ingestion::{process_batch, MentionDedup, MentionSource, ThreadResolver};
use fleet_core::microblog::{FakeMicroblog, HttpMicroblog};
use fleet_core::provider::{FakeProvider, OpenAiProvider};
use fleet_core::{Agent, AgentDeps, AgentId, AgentRegistry, Chain, ContentProvider, EventEngine, LaunchStore, Microblog};
use fleet_protocol::{Event, EventPayload, Priority};
use fleet_serve::AppState;
use fleet_store::{LaunchStateStore, SqliteMemoryStore};
use mention_source::{HttpMentionSource, MicroblogThreadResolver};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs a fleet of autonomous personas: one event engine, one agent per
/// config file, and a Control API for inspecting and commanding them.
#[derive(Parser, Debug)]
#[command(name = "fleet", about = "Run an autonomous persona fleet")]
struct Args {
    /// Directory of per-agent TOML config files.
    #[arg(long, env = "FLEET_AGENTS_DIR", default_value = "agents")]
    agents_dir: std::path::PathBuf,

    /// Directory for durable state: SQLite memory store and launch state.
    #[arg(long, env = "FLEET_DATA_DIR", default_value = "data")]
    data_dir: std::path::PathBuf,

    /// Control API bind host.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Control API bind port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
}

fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Builds the `ContentProvider` for one agent: OpenAI when a key resolves
/// (global or per-agent `OPENAI_API_KEY`), a deterministic fake otherwise so
/// the fleet still runs end to end without external credentials.
fn build_provider(env: &HashMap<String, String>) -> Arc<dyn ContentProvider> {
    match env.get("OPENAI_API_KEY") {
        Some(_) => {
            let chat_model = env
                .get("OPENAI_MODEL")
                .cloned()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            Arc::new(OpenAiProvider::new(chat_model, "text-embedding-3-small"))
        }
        None => Arc::new(FakeProvider::new("fake-provider")),
    }
}

/// Builds the `Microblog` for one agent: real twitterapi.io client when
/// credentials resolve, a fake one otherwise.
fn build_microblog(resolved: &fleet_config::ResolvedCredentials) -> Arc<dyn Microblog> {
    match &resolved.twitter_api_key {
        Some(key) => Arc::new(HttpMicroblog::new(key.clone())),
        None => Arc::new(FakeMicroblog::new()),
    }
}

/// No teacher grounding exists for a real Solana client and the blockchain
/// RPC is explicitly out-of-core-scope plumbing, so every agent trades
/// through the deterministic fake regardless of resolved credentials.
fn build_chain() -> Arc<dyn Chain> {
    Arc::new(FakeChain::new(100.0))
}

/// Periodically enqueues `SelfTick`/`TradingTick` for one agent so it starts
/// acting without waiting on an external trigger. The self-tick cadence is
/// re-driven by `Agent::run` itself after the first tick; this only needs to
/// prime the pump and keep trading on its own schedule.
async fn spawn_initial_ticks(engine: EventEngine, agent_id: String, trading_enabled: bool, min_hours: f64, max_hours: f64) {
    let tick = Event::new(
        fleet_core::memory::uuid6().to_string(),
        EventPayload::SelfTick,
        Priority::Low,
    )
    .with_targets([agent_id.clone()]);
    engine.enqueue(tick).await;

    if trading_enabled {
        tokio::spawn(run_trading_ticker(engine, agent_id, min_hours, max_hours));
    }
}

/// Re-enqueues `TradingTick` for `agent_id` on a random interval within
/// `[min_hours, max_hours]`, since (unlike self-ticks) the agent loop itself
/// never reschedules trading ticks.
async fn run_trading_ticker(engine: EventEngine, agent_id: String, min_hours: f64, max_hours: f64) {
    let min = min_hours.max(0.01);
    let max = max_hours.max(min);
    loop {
        let hours = rand::thread_rng().gen_range(min..=max);
        tokio::time::sleep(Duration::from_secs_f64(hours * 3600.0)).await;
        let tick = Event::new(
            fleet_core::memory::uuid6().to_string(),
            EventPayload::TradingTick,
            Priority::Low,
        )
        .with_targets([agent_id.clone()]);
        engine.enqueue(tick).await;
    }
}

/// The interval a stream-mode source falls back to once it starts returning
/// `IngestError::AccessDenied` (e.g. a revoked streaming entitlement), so the
/// agent keeps receiving mentions at the slower poll cadence instead of
/// hammering a source it no longer has stream access to.
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Widens `current` to `FALLBACK_POLL_INTERVAL` the first time `err` is an
/// access-denial; leaves it untouched once already at or past that width, or
/// for any other ingestion error.
fn next_ingestion_interval(current: Duration, err: &fleet_core::error::IngestError) -> Duration {
    if matches!(err, fleet_core::error::IngestError::AccessDenied { .. }) && current < FALLBACK_POLL_INTERVAL {
        FALLBACK_POLL_INTERVAL
    } else {
        current
    }
}

/// Drives mention ingestion for one agent until `token` is cancelled:
/// fetches a batch, dedups and resolves threads, enqueues `MentionReceived`.
/// Stream mode polls at a short fixed interval (the fake/real source shapes
/// are identical either way, per the mention-ingestion design); poll mode
/// uses the agent's configured interval. If the source denies stream access
/// partway through, the loop widens its own interval to `FALLBACK_POLL_INTERVAL`
/// rather than giving up.
async fn run_ingestion_loop(
    engine: EventEngine,
    agent_id: String,
    mut source: Box<dyn MentionSource>,
    resolver: Box<dyn ThreadResolver>,
    poll_interval: Duration,
    token: CancellationToken,
) {
    let mut dedup = MentionDedup::new(512);
    let mut interval = poll_interval;
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let batch = match source.next_batch().await {
            Ok(batch) => batch,
            Err(err) => {
                let widened = next_ingestion_interval(interval, &err);
                if widened != interval {
                    warn!(agent = %agent_id, error = %err, new_interval_secs = widened.as_secs(), "stream access denied, falling back to polling");
                } else {
                    warn!(agent = %agent_id, error = %err, "mention ingestion failed");
                }
                interval = widened;
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }

        let reconstructed = match process_batch(batch, &mut dedup, resolver.as_ref()).await {
            Ok(reconstructed) => reconstructed,
            Err(err) => {
                warn!(agent = %agent_id, error = %err, "thread reconstruction failed");
                continue;
            }
        };

        for mention in reconstructed {
            let event = Event::new(
                fleet_core::memory::uuid6().to_string(),
                EventPayload::MentionReceived {
                    tweet_id: mention.tweet_id,
                    author_id: mention.author_id,
                    content: mention.content,
                    thread_history: mention.thread_history,
                },
                Priority::Normal,
            )
            .with_targets([agent_id.clone()]);
            engine.enqueue(event).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fleet_config::load_and_apply("fleet", None::<&std::path::Path>).ok();
    logging::init()?;

    let args = Args::parse();
    let env = process_env();

    let configs = AgentConfig::load_dir(&args.agents_dir)?;
    if configs.is_empty() {
        warn!(dir = %args.agents_dir.display(), "no agent configs found");
    }

    let engine = EventEngine::new(1024);
    let registry = AgentRegistry::new();
    let root_token = CancellationToken::new();

    std::fs::create_dir_all(&args.data_dir)?;
    let memory: Arc<dyn fleet_core::MemoryStore> = Arc::new(SqliteMemoryStore::open(args.data_dir.join("memory.db"))?);
    let launch_store: Arc<dyn LaunchStore> = Arc::new(LaunchStateStore::new(args.data_dir.join("launches"))?);

    let mut config_map = HashMap::new();
    let mut chains: HashMap<String, Arc<dyn Chain>> = HashMap::new();
    let mut microblogs: HashMap<String, Arc<dyn Microblog>> = HashMap::new();

    for config in &configs {
        let agent_id = AgentId::parse(config.id.clone())?;
        let resolved = resolve_credentials(config, &env);

        let provider = build_provider(&env);
        let microblog = build_microblog(&resolved);
        let chain = build_chain();

        let deps = AgentDeps {
            memory: memory.clone(),
            provider,
            microblog: microblog.clone(),
            chain: chain.clone(),
        };
        let agent = Agent::new(agent_id.clone(), config.clone(), deps);
        let rx = engine.subscribe(agent_id.as_str(), 64).await;

        info!(agent = %agent_id, "starting agent");
        tokio::spawn(agent.run(rx, engine.clone(), registry.clone(), root_token.clone()));

        spawn_initial_ticks(
            engine.clone(),
            agent_id.as_str().to_string(),
            config.behavior.trading.enabled,
            config.behavior.trading.min_hours_between_trades,
            config.behavior.trading.max_hours_between_trades,
        )
        .await;

        let thread_resolver: Box<dyn ThreadResolver> = Box::new(MicroblogThreadResolver::new(microblog.clone()));
        let mention_source: Box<dyn MentionSource> = match &resolved.twitter_api_key {
            Some(key) => Box::new(HttpMentionSource::new(key.clone(), agent_id.as_str())),
            None => Box::new(fleet_core::ingestion::FakeMentionSource::new(vec![])),
        };
        let poll_interval = match config.behavior.mention_mode {
            MentionMode::Stream => Duration::from_secs(5),
            MentionMode::Poll => Duration::from_secs(60),
        };
        tokio::spawn(run_ingestion_loop(
            engine.clone(),
            agent_id.as_str().to_string(),
            mention_source,
            thread_resolver,
            poll_interval,
            root_token.clone(),
        ));

        chains.insert(config.id.clone(), chain);
        microblogs.insert(config.id.clone(), microblog);
        config_map.insert(config.id.clone(), config.clone());
    }

    let timer_engine = engine.clone();
    let timer_token = root_token.clone();
    tokio::spawn(async move { timer_engine.run_timer(timer_token).await });
    let dispatch_engine = engine.clone();
    let dispatch_token = root_token.clone();
    tokio::spawn(async move { dispatch_engine.run_dispatch(dispatch_token).await });

    let state = Arc::new(AppState {
        engine: engine.clone(),
        registry: registry.clone(),
        memory: memory.clone(),
        configs: config_map,
        launch_store,
        chains,
        microblogs,
    });

    let bind_addr = format!("{}:{}", args.host, args.port);
    let serve_token = root_token.clone();
    let serve_handle = tokio::spawn(async move {
        tokio::select! {
            result = fleet_serve::run_serve(Some(&bind_addr), state) => {
                if let Err(err) = result {
                    warn!(error = %err, "control API exited with error");
                }
            }
            _ = serve_token.cancelled() => {}
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    for config in &configs {
        let shutdown = Event::new(
            fleet_core::memory::uuid6().to_string(),
            EventPayload::Shutdown,
            Priority::Critical,
        )
        .with_targets([config.id.clone()]);
        engine.enqueue(shutdown).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    root_token.cancel();
    let _ = serve_handle.await;

    Ok(())
}
