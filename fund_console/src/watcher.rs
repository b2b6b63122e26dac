//! Block watcher: everything that reacts to "a new block was observed" hangs
//! off this loop. Live fund state and oracle prices are recomputed, and the
//! elapsed block range is drained for the events the components reconcile
//! against.

use std::time::Duration;

use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::contracts::{IERC20, IFrontOffice, IIncentive};
use crate::ledger::Accessor;

pub async fn watch_blocks(state: AppState) -> Result<()> {
    info!("block watcher started");

    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);
    let poll_interval = Duration::from_secs(state.cfg.poll_secs);
    let mut last_block: Option<u64> = None;

    loop {
        match watch_tick(&state, last_block).await {
            Ok(next_block) => {
                backoff = Duration::from_secs(1);
                last_block = Some(next_block);
                sleep(poll_interval).await;
            }
            Err(err) => {
                warn!("block tick failed; backing off: {:#}", err);
                sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}

async fn watch_tick(state: &AppState, last_block: Option<u64>) -> Result<u64> {
    let head = state
        .chain
        .provider
        .get_block_number()
        .await
        .context("fetching block number")?;

    // First observation just establishes the cursor.
    let Some(last) = last_block else {
        return Ok(head);
    };
    if head <= last {
        return Ok(last);
    }

    // Fast-changing values are replaced wholesale on each new block.
    state.fund.refresh_state().await?;
    refresh_oracles(state).await?;
    drain_events(state, last + 1, head).await?;

    Ok(head)
}

async fn refresh_oracles(state: &AppState) -> Result<()> {
    if let Some(details) = state.fund.details().await {
        for token in details.allowed_tokens.values() {
            if let Some(oracle) = token.oracle {
                state.oracles.track(oracle).await?;
            }
        }
    }
    state.oracles.refresh().await
}

/// Fetches and applies the events the components subscribe to, over the
/// block range that elapsed since the previous tick. The wallet is re-read
/// here every tick, so a replaced signing connection transparently re-binds
/// every filter to the new user.
async fn drain_events(state: &AppState, from: u64, to: u64) -> Result<()> {
    let Some(user) = state.chain.user_address().await else {
        return Ok(());
    };
    let user_topic = user.into_word();

    // Approvals, per active allowance gate. Approvals to other spenders are
    // filtered out by the gate itself.
    for gate in state.allowances.gates().await {
        let filter = Filter::new()
            .address(gate.token)
            .event_signature(IERC20::Approval::SIGNATURE_HASH)
            .topic1(user_topic)
            .from_block(from)
            .to_block(to);
        for log in state
            .chain
            .provider
            .get_logs(&filter)
            .await
            .context("fetching approval logs")?
        {
            if let Ok(event) = IERC20::Approval::decode_log(&log.inner) {
                gate.observe_approval(event.data.spender, event.data.value).await;
            }
        }
    }

    // Fund token transfers touching the user adjust the tracked balance.
    let transfers_out = Filter::new()
        .address(state.cfg.fund_token_address)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .topic1(user_topic)
        .from_block(from)
        .to_block(to);
    let transfers_in = Filter::new()
        .address(state.cfg.fund_token_address)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .topic2(user_topic)
        .from_block(from)
        .to_block(to);
    for filter in [transfers_out, transfers_in] {
        for log in state
            .chain
            .provider
            .get_logs(&filter)
            .await
            .context("fetching transfer logs")?
        {
            if let Ok(event) = IERC20::Transfer::decode_log(&log.inner) {
                state
                    .fund
                    .apply_transfer(event.data.from, event.data.to, event.data.value)
                    .await;
            }
        }
    }

    // Qualification flips for registered incentive programs.
    for incentive in state.incentives.qualification_addresses().await {
        let filter = Filter::new()
            .address(incentive)
            .event_signature(IIncentive::UserQualified::SIGNATURE_HASH)
            .topic1(user_topic)
            .from_block(from)
            .to_block(to);
        let logs = state
            .chain
            .provider
            .get_logs(&filter)
            .await
            .context("fetching qualification logs")?;
        if !logs.is_empty() {
            state.incentives.note_qualified(incentive).await;
        }
    }

    // Reclaims settled outside this process still reconcile the ledger.
    let reclaimed = Filter::new()
        .address(state.cfg.front_office_address)
        .event_signature(IFrontOffice::RequestReclaimed::SIGNATURE_HASH)
        .topic1(user_topic)
        .from_block(from)
        .to_block(to);
    for log in state
        .chain
        .provider
        .get_logs(&reclaimed)
        .await
        .context("fetching reclaim logs")?
    {
        if let Ok(event) = IFrontOffice::RequestReclaimed::decode_log(&log.inner) {
            let accessor = Accessor {
                is_deposit: event.data.accessor.isDeposit,
                token: event.data.accessor.token,
                queue_number: event.data.accessor.queueNumber,
            };
            state.ledger.note_reclaimed_event(&accessor).await;
        }
    }

    Ok(())
}
