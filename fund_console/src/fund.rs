//! Slow-changing fund parameters (loaded once) and fast-changing fund state
//! (replaced wholesale on every new-block refresh).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::info;

use crate::cfg::Cfg;
use crate::chain_client::ChainClient;
use crate::contracts::{IAccounting, IERC20, IFrontOfficeParameters, IIncentive, IIncentivesManager};

#[derive(Clone, Debug, Serialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub oracle: Option<Address>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IncentiveInfo {
    pub address: Address,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FundDetails {
    pub management_fee: U256,
    pub evaluation_period_blocks: U256,
    pub max_single_withdrawal_fund_token_amount: U256,
    pub allowed_tokens: HashMap<Address, TokenInfo>,
    pub incentives: Vec<IncentiveInfo>,
    pub fund_token: TokenInfo,
}

#[derive(Clone, Debug, Serialize)]
pub struct FundState {
    pub aum_value: U256,
    pub fund_token_price: U256,
    pub period_beginning_block: U256,
    pub period_beginning_supply: U256,
    pub theoretical_supply: U256,
    pub actual_supply: U256,
}

pub struct FundService {
    cfg: Arc<Cfg>,
    chain: Arc<ChainClient>,
    details: RwLock<Option<Arc<FundDetails>>>,
    state: RwLock<Option<FundState>>,
    user_fund_token_balance: RwLock<U256>,
}

impl FundService {
    pub fn new(cfg: Arc<Cfg>, chain: Arc<ChainClient>) -> Self {
        Self {
            cfg,
            chain,
            details: RwLock::new(None),
            state: RwLock::new(None),
            user_fund_token_balance: RwLock::new(U256::ZERO),
        }
    }

    pub async fn details(&self) -> Option<Arc<FundDetails>> {
        self.details.read().await.clone()
    }

    pub async fn state(&self) -> Option<FundState> {
        self.state.read().await.clone()
    }

    pub async fn user_fund_token_balance(&self) -> U256 {
        *self.user_fund_token_balance.read().await
    }

    /// One-time load of the slow-changing protocol configuration. Subsequent
    /// calls are no-ops once details are cached.
    pub async fn load_details(&self) -> Result<()> {
        if self.details.read().await.is_some() {
            return Ok(());
        }
        let details = self.fetch_details().await?;
        info!(
            tokens = details.allowed_tokens.len(),
            incentives = details.incentives.len(),
            "fund parameters loaded"
        );
        *self.details.write().await = Some(Arc::new(details));
        Ok(())
    }

    async fn fetch_details(&self) -> Result<FundDetails> {
        let provider = self.chain.provider.clone();
        let accounting = IAccounting::new(self.cfg.accounting_address, provider.clone());
        let parameters =
            IFrontOfficeParameters::new(self.cfg.front_office_parameters_address, provider.clone());
        let manager = IIncentivesManager::new(self.cfg.incentives_manager_address, provider.clone());

        let management_fee = accounting
            .getManagementFee()
            .call()
            .await
            .context("fetching management fee")?;
        let evaluation_period_blocks = accounting
            .getEvaluationPeriodBlocks()
            .call()
            .await
            .context("fetching evaluation period")?;
        let allowed_addresses = parameters
            .getAllowedTokens()
            .call()
            .await
            .context("fetching allowed tokens")?;
        let max_single_withdrawal_fund_token_amount = parameters
            .getMaxSingleWithdrawalFundTokenAmount()
            .call()
            .await
            .context("fetching max single withdrawal amount")?;
        let incentive_addresses = manager
            .getIncentives()
            .call()
            .await
            .context("fetching incentives")?;

        let allowed_tokens = self.resolve_tokens(&allowed_addresses).await?;
        let incentives = self.resolve_incentives(&incentive_addresses).await?;
        let fund_token = self.resolve_fund_token().await?;

        Ok(FundDetails {
            management_fee,
            evaluation_period_blocks,
            max_single_withdrawal_fund_token_amount,
            allowed_tokens,
            incentives,
            fund_token,
        })
    }

    /// Token metadata reads are grouped to bound the number of simultaneous
    /// outstanding requests, with a short pause between groups so the
    /// upstream node does not reject us for request rate.
    async fn resolve_tokens(&self, addresses: &[Address]) -> Result<HashMap<Address, TokenInfo>> {
        let batch = self.cfg.detail_batch_size.max(1);
        let mut resolved = HashMap::new();

        for (i, chunk) in addresses.chunks(batch).enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(self.cfg.batch_delay_ms)).await;
            }
            let infos =
                try_join_all(chunk.iter().map(|&address| self.resolve_token(address))).await?;
            for info in infos {
                resolved.insert(info.address, info);
            }
        }

        Ok(resolved)
    }

    async fn resolve_token(&self, address: Address) -> Result<TokenInfo> {
        let provider = self.chain.provider.clone();
        let erc20 = IERC20::new(address, provider.clone());
        let parameters =
            IFrontOfficeParameters::new(self.cfg.front_office_parameters_address, provider);

        let (name, symbol, decimals, oracle) = tokio::try_join!(
            async {
                erc20
                    .name()
                    .call()
                    .await
                    .with_context(|| format!("fetching name of {address}"))
            },
            async {
                erc20
                    .symbol()
                    .call()
                    .await
                    .with_context(|| format!("fetching symbol of {address}"))
            },
            async {
                erc20
                    .decimals()
                    .call()
                    .await
                    .with_context(|| format!("fetching decimals of {address}"))
            },
            async {
                parameters
                    .getAllowedTokenOracle(address)
                    .call()
                    .await
                    .with_context(|| format!("fetching oracle of {address}"))
            },
        )?;

        Ok(TokenInfo {
            address,
            name,
            symbol,
            decimals,
            oracle: (oracle != Address::ZERO).then_some(oracle),
        })
    }

    async fn resolve_incentives(&self, addresses: &[Address]) -> Result<Vec<IncentiveInfo>> {
        let batch = self.cfg.detail_batch_size.max(1);
        let mut resolved = Vec::new();

        for (i, chunk) in addresses.chunks(batch).enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(self.cfg.batch_delay_ms)).await;
            }
            let infos = try_join_all(chunk.iter().map(|&address| async move {
                let incentive = IIncentive::new(address, self.chain.provider.clone());
                let name = incentive
                    .getName()
                    .call()
                    .await
                    .with_context(|| format!("fetching incentive name of {address}"))?;
                Ok::<_, anyhow::Error>(IncentiveInfo { address, name })
            }))
            .await?;
            resolved.extend(infos);
        }

        Ok(resolved)
    }

    async fn resolve_fund_token(&self) -> Result<TokenInfo> {
        let erc20 = IERC20::new(self.cfg.fund_token_address, self.chain.provider.clone());

        let (name, symbol, decimals) = tokio::try_join!(
            async { erc20.name().call().await.context("fetching fund token name") },
            async { erc20.symbol().call().await.context("fetching fund token symbol") },
            async { erc20.decimals().call().await.context("fetching fund token decimals") },
        )?;

        Ok(TokenInfo {
            address: self.cfg.fund_token_address,
            name,
            symbol,
            decimals,
            oracle: None,
        })
    }

    /// Recomputes the live figures and installs them as a single atomic
    /// replace; readers never observe a partially-merged state.
    pub async fn refresh_state(&self) -> Result<()> {
        let provider = self.chain.provider.clone();
        let accounting = IAccounting::new(self.cfg.accounting_address, provider.clone());
        let fund_token = IERC20::new(self.cfg.fund_token_address, provider);

        let (price, state, actual_supply) = tokio::try_join!(
            async {
                accounting
                    .getFundTokenPrice()
                    .call()
                    .await
                    .context("fetching fund token price")
            },
            async { accounting.getState().call().await.context("fetching fund state") },
            async {
                fund_token
                    .totalSupply()
                    .call()
                    .await
                    .context("fetching fund token supply")
            },
        )?;

        let next = FundState {
            aum_value: state.aumValue,
            fund_token_price: price.price,
            period_beginning_block: state.periodBeginningBlock,
            period_beginning_supply: state.periodBeginningSupply,
            theoretical_supply: state.theoreticalSupply,
            actual_supply,
        };

        *self.state.write().await = Some(next);
        Ok(())
    }

    /// Fetches the connected user's fund token balance from scratch.
    pub async fn refresh_user_balance(&self) -> Result<()> {
        let Some(user) = self.chain.user_address().await else {
            *self.user_fund_token_balance.write().await = U256::ZERO;
            return Ok(());
        };
        let erc20 = IERC20::new(self.cfg.fund_token_address, self.chain.provider.clone());
        let balance = erc20
            .balanceOf(user)
            .call()
            .await
            .context("fetching fund token balance")?;
        *self.user_fund_token_balance.write().await = balance;
        Ok(())
    }

    /// Adjusts the tracked balance by an observed transfer, instead of
    /// re-reading it.
    pub async fn apply_transfer(&self, from: Address, to: Address, value: U256) {
        let Some(user) = self.chain.user_address().await else {
            return;
        };
        let mut balance = self.user_fund_token_balance.write().await;
        if from == user {
            *balance = balance.saturating_sub(value);
        }
        if to == user {
            *balance = balance.saturating_add(value);
        }
    }
}
