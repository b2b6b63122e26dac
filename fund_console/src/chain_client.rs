use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use tokio::sync::RwLock;
use tracing::info;

/// The user-authorizing connection. Only created by the explicit wallet
/// connect flow; everything that signs goes through it.
#[derive(Clone)]
pub struct WalletConnection {
    pub address: Address,
    pub provider: DynProvider,
}

/// Wraps the read-only connection to the configured node and the optional
/// signing connection. Components treat an absent wallet as "not ready" and
/// no-op rather than error.
pub struct ChainClient {
    pub provider: DynProvider,
    rpc_url: String,
    wallet: RwLock<Option<WalletConnection>>,
}

impl ChainClient {
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect provider: {e}"))?;

        Ok(Self {
            provider: provider.erased(),
            rpc_url: rpc_url.to_string(),
            wallet: RwLock::new(None),
        })
    }

    /// Creates (or replaces) the signing connection. Replacement invalidates
    /// subscriptions held by dependent components; the block watcher re-reads
    /// the wallet each tick so its filters re-bind to the new address.
    pub async fn connect_wallet(&self, signer: PrivateKeySigner) -> Result<Address> {
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&self.rpc_url)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect signing provider: {e}"))?;

        *self.wallet.write().await = Some(WalletConnection {
            address,
            provider: provider.erased(),
        });
        info!("wallet connected: {}", address);

        Ok(address)
    }

    pub async fn wallet(&self) -> Option<WalletConnection> {
        self.wallet.read().await.clone()
    }

    pub async fn user_address(&self) -> Option<Address> {
        self.wallet.read().await.as_ref().map(|w| w.address)
    }
}
