//! Outbound gates (§4.5): rate limiting, posting cadence, trading safety,
//! and idempotent re-delivery. Each gate is plain owned state updated
//! through `check_and_record`, so the runtime loop can hold one gate set
//! per agent without any shared locking.

use crate::error::GateError;
use fleet_config::TradingBehavior;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, SystemTime};

/// Caps the number of posts in a rolling time window.
#[derive(Debug)]
pub struct RateGate {
    max_posts: u32,
    window: Duration,
    history: VecDeque<SystemTime>,
}

impl RateGate {
    pub fn new(max_posts: u32, window_hours: f64) -> Self {
        Self {
            max_posts,
            window: Duration::from_secs_f64((window_hours * 3600.0).max(0.0)),
            history: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: SystemTime) {
        while let Some(&front) = self.history.front() {
            if now.duration_since(front).unwrap_or(Duration::ZERO) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns an error if the window is already full; otherwise records the
    /// action and allows it.
    pub fn check_and_record(&mut self, now: SystemTime) -> Result<(), GateError> {
        self.prune(now);
        if self.history.len() as u32 >= self.max_posts {
            return Err(GateError::RateLimited {
                posts_in_window: self.history.len() as u32,
                window_hours: self.window.as_secs_f64() / 3600.0,
            });
        }
        self.history.push_back(now);
        Ok(())
    }
}

/// Enforces a minimum gap between consecutive posts.
#[derive(Debug, Default)]
pub struct CadenceGate {
    min_gap: Duration,
    last_action: Option<SystemTime>,
}

impl CadenceGate {
    pub fn new(min_hours: f64) -> Self {
        Self {
            min_gap: Duration::from_secs_f64((min_hours * 3600.0).max(0.0)),
            last_action: None,
        }
    }

    pub fn check_and_record(&mut self, now: SystemTime) -> Result<(), GateError> {
        if let Some(last) = self.last_action {
            let elapsed = now.duration_since(last).unwrap_or(Duration::ZERO);
            if elapsed < self.min_gap {
                return Err(GateError::TooSoon {
                    elapsed_hours: elapsed.as_secs_f64() / 3600.0,
                    min_hours: self.min_gap.as_secs_f64() / 3600.0,
                });
            }
        }
        self.last_action = Some(now);
        Ok(())
    }
}

/// Per-agent trading safety counters (§3 TradingSafetyState).
#[derive(Debug)]
pub struct TradingSafetyState {
    daily_trade_count: u32,
    daily_volume: f64,
    day_start: SystemTime,
    last_trade_at: Option<SystemTime>,
}

impl TradingSafetyState {
    pub fn new(now: SystemTime) -> Self {
        Self {
            daily_trade_count: 0,
            daily_volume: 0.0,
            day_start: now,
            last_trade_at: None,
        }
    }

    fn roll_day_if_needed(&mut self, now: SystemTime) {
        if now.duration_since(self.day_start).unwrap_or(Duration::ZERO) >= Duration::from_secs(86_400) {
            self.day_start = now;
            self.daily_trade_count = 0;
            self.daily_volume = 0.0;
        }
    }

    /// Checks every trading-safety invariant (§9 Open Question 4: both the
    /// random-probability draw and the hours-since-last-trade window must
    /// hold for a trade to proceed) without mutating state.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &mut self,
        behavior: &TradingBehavior,
        token_mint: &str,
        amount: f64,
        wallet_balance: f64,
        quoted_slippage_percent: f64,
        is_human_initiated: bool,
        now: SystemTime,
        random_draw: f64,
    ) -> Result<(), GateError> {
        if !behavior.enabled {
            return Err(GateError::TradingDisabled);
        }
        if is_human_initiated && behavior.ignore_human_trading_requests {
            return Err(GateError::TradingUnsafe {
                reason: "human-initiated trade requests are ignored for this agent".to_string(),
            });
        }
        self.roll_day_if_needed(now);

        if let Some(last) = self.last_trade_at {
            let elapsed_hours = now.duration_since(last).unwrap_or(Duration::ZERO).as_secs_f64() / 3600.0;
            if elapsed_hours < behavior.min_hours_between_trades {
                return Err(GateError::TooSoon {
                    elapsed_hours,
                    min_hours: behavior.min_hours_between_trades,
                });
            }
        }
        if random_draw >= behavior.random_probability {
            return Err(GateError::TradingUnsafe {
                reason: "random probability draw did not favor a trade".to_string(),
            });
        }
        if !behavior.allowed_tokens.is_empty() && !behavior.allowed_tokens.iter().any(|t| t == token_mint) {
            return Err(GateError::TradingUnsafe {
                reason: format!("token_mint {token_mint} is not in allowed_tokens"),
            });
        }
        if behavior.blacklisted_tokens.iter().any(|t| t == token_mint) {
            return Err(GateError::TradingUnsafe {
                reason: format!("token_mint {token_mint} is blacklisted"),
            });
        }
        if quoted_slippage_percent > behavior.max_slippage_percent {
            return Err(GateError::TradingUnsafe {
                reason: format!(
                    "quoted slippage {quoted_slippage_percent}% exceeds max_slippage_percent {}%",
                    behavior.max_slippage_percent
                ),
            });
        }
        if amount > behavior.max_trade_amount_per_transaction {
            return Err(GateError::TradingUnsafe {
                reason: format!(
                    "amount {amount} exceeds max_trade_amount_per_transaction {}",
                    behavior.max_trade_amount_per_transaction
                ),
            });
        }
        if self.daily_trade_count + 1 > behavior.max_daily_trades {
            return Err(GateError::TradingUnsafe {
                reason: format!("max_daily_trades {} reached", behavior.max_daily_trades),
            });
        }
        if self.daily_volume + amount > behavior.max_daily_volume {
            return Err(GateError::TradingUnsafe {
                reason: format!("max_daily_volume {} would be exceeded", behavior.max_daily_volume),
            });
        }
        if wallet_balance - amount < behavior.min_wallet_balance {
            return Err(GateError::TradingUnsafe {
                reason: format!(
                    "wallet balance {wallet_balance} minus {amount} would fall below min_wallet_balance {}",
                    behavior.min_wallet_balance
                ),
            });
        }
        Ok(())
    }

    /// Records a trade that passed `check`.
    pub fn record(&mut self, amount: f64, now: SystemTime) {
        self.daily_trade_count += 1;
        self.daily_volume += amount;
        self.last_trade_at = Some(now);
    }
}

/// Deduplicates actions by an idempotency key, bounded so memory doesn't
/// grow without limit across a long-running agent.
#[derive(Debug)]
pub struct IdempotencyGate {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl IdempotencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn check_and_record(&mut self, key: impl Into<String>) -> Result<(), GateError> {
        let key = key.into();
        if self.seen.contains(&key) {
            return Err(GateError::Duplicate(key));
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_gate_allows_up_to_max_then_denies() {
        let mut gate = RateGate::new(2, 1.0);
        let now = SystemTime::now();
        assert!(gate.check_and_record(now).is_ok());
        assert!(gate.check_and_record(now).is_ok());
        assert!(matches!(
            gate.check_and_record(now),
            Err(GateError::RateLimited { .. })
        ));
    }

    #[test]
    fn rate_gate_prunes_entries_outside_window() {
        let mut gate = RateGate::new(1, 1.0);
        let now = SystemTime::now();
        gate.check_and_record(now).unwrap();
        let later = now + Duration::from_secs(3700);
        assert!(gate.check_and_record(later).is_ok());
    }

    #[test]
    fn cadence_gate_denies_too_soon() {
        let mut gate = CadenceGate::new(2.0);
        let now = SystemTime::now();
        gate.check_and_record(now).unwrap();
        let soon = now + Duration::from_secs(60);
        assert!(matches!(
            gate.check_and_record(soon),
            Err(GateError::TooSoon { .. })
        ));
    }

    #[test]
    fn cadence_gate_allows_after_min_gap() {
        let mut gate = CadenceGate::new(1.0);
        let now = SystemTime::now();
        gate.check_and_record(now).unwrap();
        let later = now + Duration::from_secs(3700);
        assert!(gate.check_and_record(later).is_ok());
    }

    fn trading_behavior() -> TradingBehavior {
        TradingBehavior {
            enabled: true,
            min_hours_between_trades: 1.0,
            max_hours_between_trades: 10.0,
            random_probability: 1.0,
            decision_factors: vec![],
            tweet_on_trade_probability: 0.0,
            max_trade_amount_per_transaction: 5.0,
            max_daily_trades: 3,
            max_daily_volume: 100.0,
            min_wallet_balance: 1.0,
            max_slippage_percent: 1.0,
            allowed_tokens: vec![],
            blacklisted_tokens: vec![],
            ignore_human_trading_requests: false,
            simulate_launch: false,
        }
    }

    #[test]
    fn trading_safety_denies_when_disabled() {
        let mut behavior = trading_behavior();
        behavior.enabled = false;
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "mint-1", 1.0, 10.0, 0.5, false, SystemTime::now(), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingDisabled));
    }

    /// **Scenario**: random draw failing to favor a trade denies it even
    /// though the time window has elapsed.
    #[test]
    fn trading_safety_denies_when_random_draw_unfavorable() {
        let mut behavior = trading_behavior();
        behavior.random_probability = 0.1;
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "mint-1", 1.0, 10.0, 0.5, false, SystemTime::now(), 0.5)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    #[test]
    fn trading_safety_denies_too_soon_since_last_trade() {
        let behavior = trading_behavior();
        let now = SystemTime::now();
        let mut state = TradingSafetyState::new(now);
        state.record(1.0, now);
        let err = state
            .check(&behavior, "mint-1", 1.0, 10.0, 0.5, false, now + Duration::from_secs(60), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TooSoon { .. }));
    }

    #[test]
    fn trading_safety_denies_when_balance_too_low() {
        let behavior = trading_behavior();
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "mint-1", 4.0, 4.5, 0.5, false, SystemTime::now(), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    #[test]
    fn trading_safety_allows_valid_trade_and_records_it() {
        let behavior = trading_behavior();
        let mut state = TradingSafetyState::new(SystemTime::now());
        let now = SystemTime::now();
        assert!(state.check(&behavior, "mint-1", 2.0, 10.0, 0.5, false, now, 0.0).is_ok());
        state.record(2.0, now);
        assert_eq!(state.daily_trade_count, 1);
    }

    #[test]
    fn trading_safety_denies_past_max_daily_trades() {
        let behavior = trading_behavior();
        let now = SystemTime::now();
        let mut state = TradingSafetyState::new(now);
        for i in 0..3 {
            let at = now + Duration::from_secs(3700 * (i + 1));
            state.check(&behavior, "mint-1", 1.0, 50.0, 0.5, false, at, 0.0).unwrap();
            state.record(1.0, at);
        }
        let at = now + Duration::from_secs(3700 * 4);
        let err = state.check(&behavior, "mint-1", 1.0, 50.0, 0.5, false, at, 0.0).unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    #[test]
    fn trading_safety_denies_blacklisted_token() {
        let mut behavior = trading_behavior();
        behavior.blacklisted_tokens = vec!["bad-mint".to_string()];
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "bad-mint", 1.0, 10.0, 0.5, false, SystemTime::now(), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    #[test]
    fn trading_safety_denies_token_not_in_allow_list() {
        let mut behavior = trading_behavior();
        behavior.allowed_tokens = vec!["good-mint".to_string()];
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "other-mint", 1.0, 10.0, 0.5, false, SystemTime::now(), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    #[test]
    fn trading_safety_denies_quoted_slippage_above_max() {
        let behavior = trading_behavior();
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "mint-1", 1.0, 10.0, 5.0, false, SystemTime::now(), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    /// **Scenario**: an agent configured to ignore human trading requests
    /// denies a human-initiated trade even if every other check would pass.
    #[test]
    fn trading_safety_denies_human_initiated_when_ignoring_humans() {
        let mut behavior = trading_behavior();
        behavior.ignore_human_trading_requests = true;
        let mut state = TradingSafetyState::new(SystemTime::now());
        let err = state
            .check(&behavior, "mint-1", 1.0, 10.0, 0.5, true, SystemTime::now(), 0.0)
            .unwrap_err();
        assert!(matches!(err, GateError::TradingUnsafe { .. }));
    }

    #[test]
    fn idempotency_gate_denies_duplicate_key() {
        let mut gate = IdempotencyGate::new(8);
        gate.check_and_record("key-1").unwrap();
        assert!(matches!(
            gate.check_and_record("key-1"),
            Err(GateError::Duplicate(_))
        ));
    }

    #[test]
    fn idempotency_gate_evicts_oldest_past_capacity() {
        let mut gate = IdempotencyGate::new(2);
        gate.check_and_record("a").unwrap();
        gate.check_and_record("b").unwrap();
        gate.check_and_record("c").unwrap();
        assert!(gate.check_and_record("a").is_ok());
    }
}
