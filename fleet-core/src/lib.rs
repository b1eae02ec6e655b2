//! Autonomous persona fleet runtime.
//!
//! An agent is a state machine ([`runtime::AgentState`]) driven by events
//! from a central [`engine::EventEngine`], generating content through a
//! [`provider::ContentProvider`], posting through a [`microblog::Microblog`],
//! trading through a [`chain::Chain`], and remembering through a
//! [`memory::MemoryStore`] — each a narrow capability trait with a
//! deterministic fake implementation for tests. [`gates`] enforces rate,
//! cadence, trading-safety, and idempotency before any outbound action.
//! [`ingestion`] unifies streaming and polling mention sources.

pub mod chain;
pub mod engine;
pub mod error;
pub mod gates;
pub mod ids;
pub mod ingestion;
pub mod launch;
pub mod memory;
pub mod microblog;
pub mod mood;
pub mod provider;
pub mod registry;
pub mod runtime;

pub use chain::{Chain, ChainError, FakeChain, LaunchReceipt, SwapReceipt};
pub use engine::EventEngine;
pub use error::{GateError, IngestError, ProviderError, RuntimeError, StoreError};
pub use gates::{CadenceGate, IdempotencyGate, RateGate, TradingSafetyState};
pub use ids::{AgentId, InvalidAgentId};
pub use ingestion::{
    FakeMentionSource, FakeThreadResolver, MentionDedup, MentionSource, RawMention,
    ReconstructedMention, ThreadResolver, process_batch,
};
pub use launch::{launch_if_needed, FakeLaunchStore, LaunchStore, TokenLaunchState};
pub use memory::{InMemoryMemoryStore, MemoryItem, MemoryKind, MemorySearchHit, MemoryStore, Relationship};
pub use microblog::{FakeMicroblog, HttpMicroblog, Microblog, MicroblogError, Tweet};
pub use mood::{Mood, MoodState};
pub use provider::{ContentProvider, FakeProvider, GenerationParams, OpenAiProvider};
pub use registry::{AgentRegistry, AgentSummary};
pub use runtime::{Agent, AgentDeps, AgentState, Trigger};
