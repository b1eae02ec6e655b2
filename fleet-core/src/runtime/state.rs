//! Agent state machine (§4.1): the pure transition function is unit-tested
//! in isolation from the async loop that drives it.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Composing,
    Reacting,
    Trading,
    Cooling,
    Stopped,
}

/// What moved the agent out of its current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    SelfTick,
    MentionReceived,
    TradingTick,
    ActionCompleted,
    ActionFailed,
    Shutdown,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("no transition from {from:?} on {trigger:?}")]
pub struct InvalidTransition {
    pub from: AgentState,
    pub trigger: Trigger,
}

/// Pure transition function: given the current state and what triggered a
/// transition attempt, returns the next state or an error if that trigger
/// isn't valid from that state. `Shutdown` is valid from every state.
pub fn transition(current: AgentState, trigger: Trigger) -> Result<AgentState, InvalidTransition> {
    use AgentState::*;
    use Trigger::*;

    if trigger == Shutdown {
        return Ok(Stopped);
    }
    if current == Stopped {
        return Err(InvalidTransition { from: current, trigger });
    }

    match (current, trigger) {
        (Idle, SelfTick) => Ok(Composing),
        (Idle, MentionReceived) => Ok(Reacting),
        (Idle, TradingTick) => Ok(Trading),
        (Composing, ActionCompleted) => Ok(Cooling),
        (Composing, ActionFailed) => Ok(Cooling),
        (Reacting, ActionCompleted) => Ok(Cooling),
        (Reacting, ActionFailed) => Ok(Cooling),
        (Trading, ActionCompleted) => Ok(Cooling),
        (Trading, ActionFailed) => Ok(Cooling),
        (Cooling, SelfTick) => Ok(Idle),
        // A mention or trading tick arriving while busy or cooling is queued
        // by the event engine and re-delivered once idle; it isn't a valid
        // transition from a non-idle state.
        _ => Err(InvalidTransition { from: current, trigger }),
    }
}
