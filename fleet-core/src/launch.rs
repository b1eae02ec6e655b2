//! Token launch state (§3 TokenLaunchState) and the idempotent launch
//! operation (§8 "Idempotent launch"): a one-shot record of whether an agent
//! has already launched its own token, so a crash mid-launch can never cause
//! a double-launch. Persistence (atomic write-temp-then-rename) lives in
//! `fleet-store`; this module defines the shape, the storage trait, and the
//! operation that ties it to `Chain`/`Microblog`.

use crate::chain::{Chain, ChainError};
use crate::error::RuntimeError;
use crate::microblog::Microblog;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenLaunchState {
    pub agent_id: String,
    pub launched: bool,
    #[serde(rename = "mint_address")]
    pub token_mint: Option<String>,
    pub launched_at: Option<SystemTime>,
    #[serde(rename = "link")]
    pub pump_link: Option<String>,
    pub simulated: bool,
}

impl TokenLaunchState {
    pub fn not_launched(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            launched: false,
            token_mint: None,
            launched_at: None,
            pump_link: None,
            simulated: false,
        }
    }

    pub fn is_launched(&self) -> bool {
        self.launched
    }

    pub fn mark_launched(
        &mut self,
        token_mint: impl Into<String>,
        pump_link: Option<String>,
        simulated: bool,
        at: SystemTime,
    ) {
        self.launched = true;
        self.token_mint = Some(token_mint.into());
        self.pump_link = pump_link;
        self.launched_at = Some(at);
        self.simulated = simulated;
    }
}

/// Durable storage for one [`TokenLaunchState`] per agent. Plain sync trait:
/// the only implementation (`fleet-store`'s `LaunchStateStore`) is a
/// write-temp-then-rename file write with no internal await points.
pub trait LaunchStore: Send + Sync {
    fn load(&self, agent_id: &str) -> Result<TokenLaunchState, StoreError>;
    fn store(&self, state: &TokenLaunchState) -> Result<(), StoreError>;
}

/// In-memory [`LaunchStore`] for tests.
#[derive(Default)]
pub struct FakeLaunchStore {
    states: Mutex<HashMap<String, TokenLaunchState>>,
}

impl FakeLaunchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LaunchStore for FakeLaunchStore {
    fn load(&self, agent_id: &str) -> Result<TokenLaunchState, StoreError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| TokenLaunchState::not_launched(agent_id)))
    }

    fn store(&self, state: &TokenLaunchState) -> Result<(), StoreError> {
        self.states
            .lock()
            .unwrap()
            .insert(state.agent_id.clone(), state.clone());
        Ok(())
    }
}

async fn announce_launch(
    agent_id: &str,
    state: &TokenLaunchState,
    microblog: &dyn Microblog,
) -> Result<(), RuntimeError> {
    let mint = state.token_mint.as_deref().unwrap_or("unknown");
    let content = match &state.pump_link {
        Some(link) => format!("we launched our token, {mint}! {link}"),
        None => format!("we launched our token, {mint}!"),
    };
    microblog
        .post(agent_id, &content)
        .await
        .map_err(|e| RuntimeError::InvariantViolated(e.to_string()))?;
    Ok(())
}

/// Launches `agent_id`'s token exactly once (§8 testable property): if
/// already launched, this is a no-op that returns the stored state
/// unchanged, posting an announcement tweet only when `force_tweet` is set.
/// Otherwise it submits the chain launch, persists the result, and always
/// announces on a fresh launch.
pub async fn launch_if_needed(
    agent_id: &str,
    display_name: &str,
    wallet: &str,
    simulate: bool,
    force_tweet: bool,
    chain: &dyn Chain,
    launch_store: &dyn LaunchStore,
    microblog: &dyn Microblog,
) -> Result<TokenLaunchState, RuntimeError> {
    let mut state = launch_store.load(agent_id)?;
    if state.is_launched() {
        if force_tweet {
            announce_launch(agent_id, &state, microblog).await?;
        }
        return Ok(state);
    }

    let receipt = chain
        .launch_token(wallet, display_name, simulate)
        .await
        .map_err(|e: ChainError| RuntimeError::InvariantViolated(e.to_string()))?;
    state.mark_launched(receipt.token_mint, receipt.link, receipt.simulated, SystemTime::now());
    launch_store.store(&state)?;
    announce_launch(agent_id, &state, microblog).await?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FakeChain;
    use crate::microblog::FakeMicroblog;

    #[test]
    fn not_launched_state_reports_false() {
        let state = TokenLaunchState::not_launched("agent-a");
        assert!(!state.is_launched());
    }

    #[test]
    fn mark_launched_sets_fields() {
        let mut state = TokenLaunchState::not_launched("agent-a");
        state.mark_launched("mint-1", Some("https://pump.fun/mint-1".to_string()), true, SystemTime::now());
        assert!(state.is_launched());
        assert!(state.simulated);
        assert_eq!(state.pump_link.as_deref(), Some("https://pump.fun/mint-1"));
    }

    /// **Scenario**: first call submits a chain launch and posts an announcement.
    #[tokio::test]
    async fn launch_if_needed_launches_and_announces_once() {
        let chain = FakeChain::new(10.0);
        let store = FakeLaunchStore::new();
        let microblog = FakeMicroblog::new();

        let state = launch_if_needed("agent-a", "coby", "wallet", false, false, &chain, &store, &microblog)
            .await
            .unwrap();
        assert!(state.is_launched());
        assert_eq!(microblog.posted().len(), 1);
    }

    /// **Scenario**: re-running after a successful launch is a no-op (§8
    /// "Idempotent launch"): no second chain call, no tweet unless forced.
    #[tokio::test]
    async fn launch_if_needed_is_idempotent_without_force_tweet() {
        let chain = FakeChain::new(10.0);
        let store = FakeLaunchStore::new();
        let microblog = FakeMicroblog::new();

        let first = launch_if_needed("agent-a", "coby", "wallet", false, false, &chain, &store, &microblog)
            .await
            .unwrap();
        let second = launch_if_needed("agent-a", "coby", "wallet", false, false, &chain, &store, &microblog)
            .await
            .unwrap();

        assert_eq!(first.token_mint, second.token_mint);
        assert_eq!(microblog.posted().len(), 1);
    }

    #[tokio::test]
    async fn launch_if_needed_force_tweet_posts_again_on_already_launched() {
        let chain = FakeChain::new(10.0);
        let store = FakeLaunchStore::new();
        let microblog = FakeMicroblog::new();

        launch_if_needed("agent-a", "coby", "wallet", false, false, &chain, &store, &microblog)
            .await
            .unwrap();
        launch_if_needed("agent-a", "coby", "wallet", false, true, &chain, &store, &microblog)
            .await
            .unwrap();

        assert_eq!(microblog.posted().len(), 2);
    }
}
