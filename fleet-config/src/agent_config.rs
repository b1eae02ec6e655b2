//! Per-agent configuration document (§6): schema, TOML loading, and the
//! credential resolution order (agent-config inline → per-agent env var →
//! global env var → fail).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentConfigError {
    #[error("read agent config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse agent config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid agent id {0:?}: must be a non-empty lowercase slug of up to 64 chars")]
    InvalidId(String),
    #[error("rotating_system_prompts has {0} entries, max is 8")]
    TooManyRotatingPrompts(usize),
    #[error("missing credential: {0}")]
    MissingCredential(String),
}

/// Hashtag/emoji usage frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmojiFrequency {
    #[default]
    None,
    Rare,
    Moderate,
    Frequent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Capitalization {
    #[default]
    Standard,
    AllCaps,
    TitleCase,
    Lowercase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SentenceLength {
    Short,
    Medium,
    Long,
    #[default]
    Varied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    #[default]
    FirstPerson,
    ThirdPerson,
    Collective,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Casual,
    Formal,
    Technical,
    Friendly,
    Professional,
    Sarcastic,
    Enthusiastic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalJargon {
    Avoid,
    #[default]
    ExplainWhenUsed,
    UseFreely,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeDecisionFactor {
    TrendingTokens,
    TopGainers,
    #[default]
    RandomSelection,
    Mood,
}

/// Immutable persona traits loaded at config time (§3 Personality).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Personality {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub speaking_style: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub quirks: Vec<String>,
}

impl Personality {
    pub const MAX_TRAITS: usize = 20;
    pub const MAX_VALUES: usize = 10;
    pub const MAX_INTERESTS: usize = 15;
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct StyleGuide {
    #[serde(default)]
    pub voice: Voice,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub emoji_frequency: EmojiFrequency,
    #[serde(default)]
    pub capitalization: Capitalization,
    #[serde(default)]
    pub sentence_length: SentenceLength,
    #[serde(default)]
    pub technical_jargon: TechnicalJargon,
    #[serde(default)]
    pub forbidden_topics: Vec<String>,
}

/// Post-frequency behavior (§3 Behavior).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostFrequency {
    pub min_hours: f64,
    pub max_hours: f64,
    #[serde(default)]
    pub peak_hours: Vec<u8>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for PostFrequency {
    fn default() -> Self {
        Self {
            min_hours: 2.0,
            max_hours: 6.0,
            peak_hours: Vec::new(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct InteractionPatterns {
    #[serde(default)]
    pub reply_probability: f64,
    #[serde(default)]
    pub quote_probability: f64,
    #[serde(default)]
    pub like_probability: f64,
    #[serde(default)]
    pub retweet_probability: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TradingBehavior {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_hours_between_trades: f64,
    #[serde(default)]
    pub max_hours_between_trades: f64,
    #[serde(default)]
    pub random_probability: f64,
    #[serde(default)]
    pub decision_factors: Vec<TradeDecisionFactor>,
    #[serde(default)]
    pub tweet_on_trade_probability: f64,
    #[serde(default)]
    pub max_trade_amount_per_transaction: f64,
    #[serde(default)]
    pub max_daily_trades: u32,
    #[serde(default)]
    pub max_daily_volume: f64,
    #[serde(default)]
    pub min_wallet_balance: f64,
    #[serde(default)]
    pub max_slippage_percent: f64,
    #[serde(default)]
    pub allowed_tokens: Vec<String>,
    #[serde(default)]
    pub blacklisted_tokens: Vec<String>,
    #[serde(default)]
    pub ignore_human_trading_requests: bool,
    /// Per-agent simulation flag (Open Question 3): when true, `launch_if_needed`
    /// never submits a real chain transaction.
    #[serde(default)]
    pub simulate_launch: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Behavior {
    #[serde(default)]
    pub post_frequency: PostFrequency,
    #[serde(default)]
    pub interaction_patterns: InteractionPatterns,
    #[serde(default)]
    pub mention_response_delay_min_secs: u64,
    #[serde(default)]
    pub mention_response_delay_max_secs: u64,
    #[serde(default)]
    pub trading: TradingBehavior,
    #[serde(default)]
    pub mention_mode: MentionMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MentionMode {
    #[default]
    Stream,
    Poll,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TwitterCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_token_secret: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SolanaIntegration {
    pub rpc_url: Option<String>,
    pub private_key: Option<String>,
}

/// Raw per-agent configuration document as loaded from TOML (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub style_guide: StyleGuide,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(default)]
    pub initial_memory: Vec<String>,
    #[serde(default)]
    pub custom_system_prompt: Option<String>,
    #[serde(default)]
    pub rotating_system_prompts: Vec<String>,
    #[serde(default)]
    pub twitter_credentials: TwitterCredentials,
    #[serde(default)]
    pub solana_integration: SolanaIntegration,
}

impl AgentConfig {
    pub const MAX_ROTATING_PROMPTS: usize = 8;

    /// Validates structural invariants that serde alone can't express.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        if self.id.is_empty()
            || self.id.len() > 64
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(AgentConfigError::InvalidId(self.id.clone()));
        }
        if self.rotating_system_prompts.len() > Self::MAX_ROTATING_PROMPTS {
            return Err(AgentConfigError::TooManyRotatingPrompts(
                self.rotating_system_prompts.len(),
            ));
        }
        Ok(())
    }

    /// Loads and validates one agent config document from a TOML file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, AgentConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| AgentConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: AgentConfig =
            toml::from_str(&content).map_err(|source| AgentConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads every `*.toml` file directly under `dir` as an agent config.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>, AgentConfigError> {
        let dir = dir.as_ref();
        let mut configs = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Ok(configs);
        };
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();
        for path in paths {
            configs.push(Self::load_file(path)?);
        }
        Ok(configs)
    }
}

/// Resolved credential bundle for one agent, after `resolve_credentials`.
#[derive(Clone, Debug, Default)]
pub struct ResolvedCredentials {
    pub twitter_api_key: Option<String>,
    pub twitter_api_secret: Option<String>,
    pub twitter_access_token: Option<String>,
    pub twitter_access_token_secret: Option<String>,
    pub twitter_bearer_token: Option<String>,
    pub solana_rpc_url: Option<String>,
    pub solana_private_key: Option<String>,
}

fn agent_env_suffix(agent_id: &str) -> String {
    agent_id.to_uppercase().replace('-', "_")
}

/// One field's resolution: agent-config inline → per-agent env var → global
/// env var → `None`. `env` is injected so tests don't touch the real process
/// environment.
fn resolve_field(
    inline: Option<&str>,
    per_agent_var: &str,
    global_var: &str,
    env: &HashMap<String, String>,
) -> Option<String> {
    inline
        .map(String::from)
        .or_else(|| env.get(per_agent_var).cloned())
        .or_else(|| env.get(global_var).cloned())
}

/// Pure credential resolution function (§9 redesign note): agent-config
/// inline value → per-agent env var (`<VAR>_<AGENT_ID_UPPER_SNAKE>`) →
/// global env var → `None`. Centralizing this as one function, rather than
/// scattering the fallback chain across call sites, is the point.
pub fn resolve_credentials(
    config: &AgentConfig,
    env: &HashMap<String, String>,
) -> ResolvedCredentials {
    let suffix = agent_env_suffix(&config.id);
    let tw = &config.twitter_credentials;
    let sol = &config.solana_integration;

    ResolvedCredentials {
        twitter_api_key: resolve_field(
            tw.api_key.as_deref(),
            &format!("TWITTER_API_KEY_{suffix}"),
            "TWITTER_API_KEY",
            env,
        ),
        twitter_api_secret: resolve_field(
            tw.api_secret.as_deref(),
            &format!("TWITTER_API_SECRET_{suffix}"),
            "TWITTER_API_SECRET",
            env,
        ),
        twitter_access_token: resolve_field(
            tw.access_token.as_deref(),
            &format!("TWITTER_ACCESS_TOKEN_{suffix}"),
            "TWITTER_ACCESS_TOKEN",
            env,
        ),
        twitter_access_token_secret: resolve_field(
            tw.access_token_secret.as_deref(),
            &format!("TWITTER_ACCESS_TOKEN_SECRET_{suffix}"),
            "TWITTER_ACCESS_TOKEN_SECRET",
            env,
        ),
        twitter_bearer_token: resolve_field(
            tw.bearer_token.as_deref(),
            &format!("TWITTER_BEARER_TOKEN_{suffix}"),
            "TWITTER_BEARER_TOKEN",
            env,
        ),
        solana_rpc_url: resolve_field(
            sol.rpc_url.as_deref(),
            &format!("SOLANA_RPC_URL_{suffix}"),
            "SOLANA_RPC_URL",
            env,
        ),
        solana_private_key: resolve_field(
            sol.private_key.as_deref(),
            &format!("SOLANA_PRIVATE_KEY_{suffix}"),
            "SOLANA_PRIVATE_KEY",
            env,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(id: &str) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            name: "Test Agent".to_string(),
            description: "a test agent".to_string(),
            personality: Personality::default(),
            style_guide: StyleGuide::default(),
            behavior: Behavior::default(),
            initial_memory: Vec::new(),
            custom_system_prompt: None,
            rotating_system_prompts: Vec::new(),
            twitter_credentials: TwitterCredentials::default(),
            solana_integration: SolanaIntegration::default(),
        }
    }

    /// **Scenario**: id must be a lowercase slug.
    #[test]
    fn validate_rejects_uppercase_id() {
        let config = minimal_config("Bad-Id");
        assert!(matches!(
            config.validate(),
            Err(AgentConfigError::InvalidId(_))
        ));
    }

    #[test]
    fn validate_accepts_lowercase_slug() {
        let config = minimal_config("tech-enthusiast");
        assert!(config.validate().is_ok());
    }

    /// **Scenario**: more than 8 rotating prompts is rejected.
    #[test]
    fn validate_rejects_too_many_rotating_prompts() {
        let mut config = minimal_config("agent-a");
        config.rotating_system_prompts = (0..9).map(|i| format!("prompt {i}")).collect();
        assert!(matches!(
            config.validate(),
            Err(AgentConfigError::TooManyRotatingPrompts(9))
        ));
    }

    /// **Scenario**: inline credential wins over both env vars.
    #[test]
    fn resolve_credentials_prefers_inline() {
        let mut config = minimal_config("coby-trader");
        config.twitter_credentials.api_key = Some("inline-key".to_string());
        let mut env = HashMap::new();
        env.insert("TWITTER_API_KEY_COBY_TRADER".to_string(), "per-agent".to_string());
        env.insert("TWITTER_API_KEY".to_string(), "global".to_string());

        let creds = resolve_credentials(&config, &env);
        assert_eq!(creds.twitter_api_key.as_deref(), Some("inline-key"));
    }

    /// **Scenario**: per-agent env var wins over global when inline is absent.
    #[test]
    fn resolve_credentials_prefers_per_agent_env_over_global() {
        let config = minimal_config("coby-trader");
        let mut env = HashMap::new();
        env.insert("TWITTER_API_KEY_COBY_TRADER".to_string(), "per-agent".to_string());
        env.insert("TWITTER_API_KEY".to_string(), "global".to_string());

        let creds = resolve_credentials(&config, &env);
        assert_eq!(creds.twitter_api_key.as_deref(), Some("per-agent"));
    }

    /// **Scenario**: falls back to global env var when no inline or per-agent value.
    #[test]
    fn resolve_credentials_falls_back_to_global() {
        let config = minimal_config("coby-trader");
        let mut env = HashMap::new();
        env.insert("TWITTER_API_KEY".to_string(), "global".to_string());

        let creds = resolve_credentials(&config, &env);
        assert_eq!(creds.twitter_api_key.as_deref(), Some("global"));
    }

    /// **Scenario**: no source at all resolves to None.
    #[test]
    fn resolve_credentials_none_when_unset() {
        let config = minimal_config("coby-trader");
        let env = HashMap::new();
        let creds = resolve_credentials(&config, &env);
        assert!(creds.twitter_api_key.is_none());
    }

    /// **Scenario**: agent id with hyphens maps to upper-snake env suffix.
    #[test]
    fn agent_env_suffix_converts_hyphens() {
        assert_eq!(agent_env_suffix("tech-enthusiast"), "TECH_ENTHUSIAST");
    }

    #[test]
    fn load_dir_reads_all_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agent-a.toml"),
            "id = \"agent-a\"\nname = \"A\"\ndescription = \"d\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("agent-b.toml"),
            "id = \"agent-b\"\nname = \"B\"\ndescription = \"d\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not toml").unwrap();

        let configs = AgentConfig::load_dir(dir.path()).unwrap();
        assert_eq!(configs.len(), 2);
    }

    #[test]
    fn load_dir_missing_directory_returns_empty() {
        let configs = AgentConfig::load_dir("/nonexistent/path/xyz").unwrap();
        assert!(configs.is_empty());
    }
}
