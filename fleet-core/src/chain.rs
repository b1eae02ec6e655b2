//! Onchain capability (§3 TradingSafetyState, TokenLaunchState; §4.5): swap
//! execution, balance reads, and token launch, plus a fake for tests.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("chain backend unavailable: {0}")]
    Unavailable(String),
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: f64, need: f64 },
    #[error("slippage exceeded: quoted {quoted_percent}%, max {max_percent}%")]
    SlippageExceeded {
        quoted_percent: f64,
        max_percent: f64,
    },
}

#[derive(Clone, Debug)]
pub struct SwapReceipt {
    pub signature: String,
    pub amount: f64,
    pub token_mint: String,
}

#[derive(Clone, Debug)]
pub struct LaunchReceipt {
    pub token_mint: String,
    pub signature: String,
    pub simulated: bool,
    /// Shareable link to the launched token (e.g. a pump.fun page), when the
    /// launch backend returns one.
    pub link: Option<String>,
}

#[async_trait]
pub trait Chain: Send + Sync {
    async fn balance(&self, wallet: &str) -> Result<f64, ChainError>;

    async fn swap(
        &self,
        wallet: &str,
        token_mint: &str,
        amount: f64,
        max_slippage_percent: f64,
    ) -> Result<SwapReceipt, ChainError>;

    /// Launches a new token for `wallet`, unless `simulate` is set, in which
    /// case no transaction is submitted and the returned receipt is marked
    /// `simulated`.
    async fn launch_token(
        &self,
        wallet: &str,
        name: &str,
        simulate: bool,
    ) -> Result<LaunchReceipt, ChainError>;
}

/// In-memory fake chain: fixed balance, deterministic swap/launch receipts.
pub struct FakeChain {
    balance: Mutex<f64>,
    next_sig: std::sync::atomic::AtomicU64,
    fail: std::sync::atomic::AtomicBool,
}

impl FakeChain {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balance: Mutex::new(starting_balance),
            next_sig: std::sync::atomic::AtomicU64::new(1),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn next_signature(&self) -> String {
        let n = self.next_sig.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("sig-{n}")
    }
}

#[async_trait]
impl Chain for FakeChain {
    async fn balance(&self, _wallet: &str) -> Result<f64, ChainError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn swap(
        &self,
        _wallet: &str,
        token_mint: &str,
        amount: f64,
        _max_slippage_percent: f64,
    ) -> Result<SwapReceipt, ChainError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ChainError::Unavailable("fake set to fail".to_string()));
        }
        let mut balance = self.balance.lock().unwrap();
        if *balance < amount {
            return Err(ChainError::InsufficientBalance {
                have: *balance,
                need: amount,
            });
        }
        *balance -= amount;
        Ok(SwapReceipt {
            signature: self.next_signature(),
            amount,
            token_mint: token_mint.to_string(),
        })
    }

    async fn launch_token(
        &self,
        _wallet: &str,
        name: &str,
        simulate: bool,
    ) -> Result<LaunchReceipt, ChainError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ChainError::Unavailable("fake set to fail".to_string()));
        }
        let token_mint = format!("mint-{name}");
        let link = Some(format!("https://pump.fun/{token_mint}"));
        Ok(LaunchReceipt {
            token_mint,
            signature: self.next_signature(),
            simulated: simulate,
            link,
        })
    }
}
