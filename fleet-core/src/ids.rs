//! Validated identifiers used across the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated agent identifier: a non-empty lowercase slug of up to 64
/// characters (`[a-z0-9-]+`). Constructed once at config-load time via
/// [`AgentId::parse`]; every other layer treats it as already-valid.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid agent id {0:?}: must be a non-empty lowercase slug of up to 64 chars")]
pub struct InvalidAgentId(pub String);

impl AgentId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidAgentId> {
        let raw = raw.into();
        if raw.is_empty()
            || raw.len() > 64
            || !raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(InvalidAgentId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentId {
    type Error = InvalidAgentId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_lowercase_slug() {
        assert!(AgentId::parse("tech-enthusiast-01").is_ok());
    }

    #[test]
    fn parse_rejects_uppercase() {
        assert!(AgentId::parse("Tech").is_err());
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(AgentId::parse("").is_err());
    }

    #[test]
    fn parse_rejects_too_long() {
        let raw = "a".repeat(65);
        assert!(AgentId::parse(raw).is_err());
    }

    #[test]
    fn parse_rejects_underscore() {
        assert!(AgentId::parse("tech_enthusiast").is_err());
    }
}
