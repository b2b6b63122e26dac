use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::allowance::AllowanceService;
use crate::app_state::AppState;
use crate::cfg::Cfg;
use crate::chain_client::ChainClient;
use crate::fund::FundService;
use crate::incentives::IncentiveService;
use crate::oracle::OracleBoard;
use crate::requests::RequestService;
use crate::session::SessionStore;
use crate::watcher::watch_blocks;

mod allowance;
mod app_state;
mod cfg;
mod chain_client;
mod contracts;
mod fund;
mod http;
mod incentives;
mod ledger;
mod oracle;
mod quote;
mod requests;
mod session;
mod watcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging: controlled via RUST_LOG, e.g. RUST_LOG=info,fund_console=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(Cfg::parse());

    let chain = Arc::new(ChainClient::connect(&cfg.eth_rpc_url).await?);
    let session = Arc::new(SessionStore::new(cfg.session_file.clone()));
    let fund = Arc::new(FundService::new(cfg.clone(), chain.clone()));
    let oracles = Arc::new(OracleBoard::new(chain.clone()));
    let ledger = Arc::new(RequestService::new(cfg.clone(), chain.clone()));
    let allowances = Arc::new(AllowanceService::new(cfg.clone(), chain.clone()));
    let incentives = Arc::new(IncentiveService::new(cfg.clone(), chain.clone()));

    let state = AppState {
        cfg: cfg.clone(),
        chain: chain.clone(),
        session: session.clone(),
        fund: fund.clone(),
        oracles,
        ledger: ledger.clone(),
        allowances,
        incentives: incentives.clone(),
    };

    // A cached session matching the configured signer reconnects without the
    // explicit connect flow.
    if let (Some(signer), Some(cached)) = (cfg.wallet_private_key.clone(), session.load()) {
        if signer.address() == cached {
            chain.connect_wallet(signer).await?;
        } else {
            warn!("cached session {} does not match configured signer, clearing", cached);
            session.clear()?;
        }
    }

    // One-time parameter load. A failure here leaves the cache empty, the
    // same as any other failed load; the user retries by restarting.
    match fund.load_details().await {
        Ok(()) => {
            if let Some(details) = fund.details().await {
                incentives.install(&details.incentives).await;
            }
        }
        Err(err) => warn!("loading fund parameters failed: {:#}", err),
    }
    if let Err(err) = fund.refresh_state().await {
        warn!("initial fund state load failed: {:#}", err);
    }

    if chain.user_address().await.is_some() {
        if let Err(err) = ledger.load_initial().await {
            warn!("initial request load failed: {:#}", err);
        }
        if let Err(err) = fund.refresh_user_balance().await {
            warn!("initial balance load failed: {:#}", err);
        }
        if let Err(err) = incentives.load_qualifications().await {
            warn!("initial qualification load failed: {:#}", err);
        }
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = watch_blocks(state).await {
                error!("block watcher stopped: {:#}", err);
            }
        });
    }

    let app = http::router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port)
        .parse()
        .context("valid listen addr")?;
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");

    Ok(())
}

// Graceful shutdown on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
