//! ERC-20 approval gates. A dependent action is enabled once the user has
//! approved a sufficiently large allowance to the front office; sufficiency
//! is judged against a fixed generous threshold rather than the exact pending
//! amount, so differing request sizes do not force fresh approvals.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::cfg::Cfg;
use crate::chain_client::ChainClient;
use crate::contracts::IERC20;

/// Allowance at or above this is considered sufficient (10^27, one billion
/// tokens at 18 decimals).
pub fn min_allowance() -> U256 {
    U256::from(10u8).pow(U256::from(27u8))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ApprovalPhase {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
}

#[derive(Debug, Default)]
struct GateState {
    allowance: Option<U256>,
    phase: ApprovalPhase,
}

#[derive(Clone, Debug, Serialize)]
pub struct GateSnapshot {
    pub token: Address,
    pub spender: Address,
    pub allowance: Option<U256>,
    pub is_allowance_sufficient: bool,
    pub phase: ApprovalPhase,
}

pub struct AllowanceGate {
    pub token: Address,
    pub spender: Address,
    state: Mutex<GateState>,
}

impl AllowanceGate {
    pub fn new(token: Address, spender: Address) -> Self {
        Self {
            token,
            spender,
            state: Mutex::new(GateState::default()),
        }
    }

    pub async fn snapshot(&self) -> GateSnapshot {
        let st = self.state.lock().await;
        GateSnapshot {
            token: self.token,
            spender: self.spender,
            allowance: st.allowance,
            is_allowance_sufficient: st.allowance.is_some_and(|a| a >= min_allowance()),
            phase: st.phase,
        }
    }

    pub async fn is_allowance_sufficient(&self) -> bool {
        self.state
            .lock()
            .await
            .allowance
            .is_some_and(|a| a >= min_allowance())
    }

    /// Re-reads the allowance for the connected user.
    pub async fn refresh(&self, chain: &ChainClient) -> Result<()> {
        let Some(user) = chain.user_address().await else {
            self.state.lock().await.allowance = None;
            return Ok(());
        };
        let erc20 = IERC20::new(self.token, chain.provider.clone());
        let value = erc20
            .allowance(user, self.spender)
            .call()
            .await
            .context("reading allowance")?;
        self.state.lock().await.allowance = Some(value);
        Ok(())
    }

    /// Applies an observed `Approval` event. Approvals to other spenders for
    /// the same token are ignored.
    pub async fn observe_approval(&self, spender: Address, value: U256) {
        if spender != self.spender {
            return;
        }
        self.state.lock().await.allowance = Some(value);
    }

    /// Approves the maximal sentinel value so the gate stays open for any
    /// later request size.
    pub async fn approve(&self, chain: &ChainClient) -> Result<()> {
        let Some(wallet) = chain.wallet().await else {
            debug!("approval skipped: wallet not connected");
            return Ok(());
        };
        self.state.lock().await.phase = ApprovalPhase::Submitting;
        let result = self.submit_approval(wallet.provider.clone()).await;
        self.state.lock().await.phase = ApprovalPhase::Idle;
        result
    }

    async fn submit_approval(
        &self,
        provider: alloy::providers::DynProvider,
    ) -> Result<()> {
        let erc20 = IERC20::new(self.token, provider);
        let pending = erc20
            .approve(self.spender, U256::MAX)
            .send()
            .await
            .context("submitting approval")?;

        self.state.lock().await.phase = ApprovalPhase::AwaitingConfirmation;
        pending
            .get_receipt()
            .await
            .context("awaiting approval confirmation")?;
        Ok(())
    }
}

/// Lazily-created gates, one per token, all approving the front office.
pub struct AllowanceService {
    cfg: Arc<Cfg>,
    chain: Arc<ChainClient>,
    gates: RwLock<HashMap<Address, Arc<AllowanceGate>>>,
}

impl AllowanceService {
    pub fn new(cfg: Arc<Cfg>, chain: Arc<ChainClient>) -> Self {
        Self {
            cfg,
            chain,
            gates: RwLock::new(HashMap::new()),
        }
    }

    pub async fn gate(&self, token: Address) -> Result<Arc<AllowanceGate>> {
        if let Some(gate) = self.gates.read().await.get(&token) {
            return Ok(gate.clone());
        }

        let gate = Arc::new(AllowanceGate::new(token, self.cfg.front_office_address));
        gate.refresh(&self.chain).await?;
        self.gates.write().await.insert(token, gate.clone());
        Ok(gate)
    }

    pub async fn gates(&self) -> Vec<Arc<AllowanceGate>> {
        self.gates.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AllowanceGate {
        let token: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let spender: Address = "0x00000000000000000000000000000000000000bb".parse().unwrap();
        AllowanceGate::new(token, spender)
    }

    #[tokio::test]
    async fn test_unknown_allowance_is_insufficient() {
        let gate = gate();
        assert!(!gate.is_allowance_sufficient().await);
    }

    #[tokio::test]
    async fn test_zero_allowance_is_insufficient() {
        let gate = gate();
        gate.observe_approval(gate.spender, U256::ZERO).await;
        assert!(!gate.is_allowance_sufficient().await);
    }

    #[tokio::test]
    async fn test_threshold_allowance_is_sufficient() {
        let gate = gate();
        gate.observe_approval(gate.spender, min_allowance()).await;
        assert!(gate.is_allowance_sufficient().await);

        gate.observe_approval(gate.spender, U256::MAX).await;
        assert!(gate.is_allowance_sufficient().await);
    }

    #[tokio::test]
    async fn test_below_threshold_is_insufficient() {
        let gate = gate();
        gate.observe_approval(gate.spender, min_allowance() - U256::from(1u8)).await;
        assert!(!gate.is_allowance_sufficient().await);
    }

    #[tokio::test]
    async fn test_other_spender_approvals_ignored() {
        let gate = gate();
        let other: Address = "0x00000000000000000000000000000000000000cc".parse().unwrap();
        gate.observe_approval(other, U256::MAX).await;
        assert!(!gate.is_allowance_sufficient().await);
    }
}
