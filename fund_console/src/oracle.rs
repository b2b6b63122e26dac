//! Price oracle reads. Oracles may sit behind proxies, so prices are polled
//! on every new block rather than subscribed.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::chain_client::ChainClient;
use crate::contracts::IChainlinkOracle;

#[derive(Clone, Copy, Debug, Serialize)]
pub struct OraclePrice {
    pub price: U256,
    pub decimals: u8,
}

pub struct OracleBoard {
    chain: Arc<ChainClient>,
    prices: RwLock<HashMap<Address, OraclePrice>>,
}

impl OracleBoard {
    pub fn new(chain: Arc<ChainClient>) -> Self {
        Self {
            chain,
            prices: RwLock::new(HashMap::new()),
        }
    }

    pub async fn price(&self, oracle: Address) -> Option<OraclePrice> {
        self.prices.read().await.get(&oracle).copied()
    }

    /// Starts tracking an oracle: reads its decimals once and takes a first
    /// price sample. Idempotent.
    pub async fn track(&self, oracle: Address) -> Result<()> {
        if self.prices.read().await.contains_key(&oracle) {
            return Ok(());
        }
        let contract = IChainlinkOracle::new(oracle, self.chain.provider.clone());
        let decimals = contract
            .decimals()
            .call()
            .await
            .with_context(|| format!("fetching oracle decimals of {oracle}"))?;

        let mut prices = self.prices.write().await;
        prices.insert(
            oracle,
            OraclePrice {
                price: U256::ZERO,
                decimals,
            },
        );
        drop(prices);

        self.refresh_one(oracle).await
    }

    /// Re-samples every tracked oracle. Called once per observed block.
    pub async fn refresh(&self) -> Result<()> {
        let tracked: Vec<Address> = self.prices.read().await.keys().copied().collect();
        for oracle in tracked {
            self.refresh_one(oracle).await?;
        }
        Ok(())
    }

    async fn refresh_one(&self, oracle: Address) -> Result<()> {
        let contract = IChainlinkOracle::new(oracle, self.chain.provider.clone());
        let answer = contract
            .latestAnswer()
            .call()
            .await
            .with_context(|| format!("fetching oracle price of {oracle}"))?;

        if answer.is_negative() {
            warn!("oracle {} reported a negative price, keeping last value", oracle);
            return Ok(());
        }

        if let Some(entry) = self.prices.write().await.get_mut(&oracle) {
            entry.price = answer.unsigned_abs();
        }
        Ok(())
    }
}
