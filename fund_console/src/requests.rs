//! RPC orchestration around the request [`Ledger`]: paginated loads from the
//! front office contract, signed submissions, and the optimistic patches
//! applied once a transaction confirms.

use std::sync::Arc;

use alloy::consensus::TxReceipt as _;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::cfg::Cfg;
use crate::chain_client::{ChainClient, WalletConnection};
use crate::contracts::IFrontOffice;
use crate::ledger::{
    Accessor, Ledger, Origin, RequestRecord, RequestStatus, INITIAL_BATCH, LOAD_MORE_BATCH,
};

#[derive(Clone, Debug, Deserialize)]
pub struct DepositArgs {
    pub token: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub block_deadline: U256,
    pub incentive: Address,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalArgs {
    pub token: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub block_deadline: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LedgerOp {
    Deposit,
    Withdrawal,
    Cancel,
    Reclaim(u64),
}

/// Per-operation submission state machine. The local ledger patch is applied
/// only after `AwaitingConfirmation` observes the receipt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Activity {
    #[default]
    Idle,
    Submitting(LedgerOp),
    AwaitingConfirmation(LedgerOp),
}

#[derive(Debug, Default)]
struct LedgerView {
    ledger: Ledger,
    loading: bool,
    activity: Activity,
}

#[derive(Clone, Debug, Serialize)]
pub struct LedgerSnapshot {
    pub total: u64,
    pub has_more: bool,
    pub loading: bool,
    pub activity: Activity,
    pub requests: Vec<RequestRecord>,
}

pub struct RequestService {
    cfg: Arc<Cfg>,
    chain: Arc<ChainClient>,
    state: Mutex<LedgerView>,
}

impl RequestService {
    pub fn new(cfg: Arc<Cfg>, chain: Arc<ChainClient>) -> Self {
        Self {
            cfg,
            chain,
            state: Mutex::new(LedgerView::default()),
        }
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let st = self.state.lock().await;
        LedgerSnapshot {
            total: st.ledger.total(),
            has_more: st.ledger.has_more(),
            loading: st.loading,
            activity: st.activity,
            requests: st.ledger.entries().to_vec(),
        }
    }

    /// Fetches the request count and the first batch of most-recent requests.
    /// Silently no-ops without a connected wallet.
    pub async fn load_initial(&self) -> Result<()> {
        let Some(user) = self.chain.user_address().await else {
            return Ok(());
        };
        self.state.lock().await.loading = true;
        let result = self.load_window(user, INITIAL_BATCH).await;
        self.state.lock().await.loading = false;
        result
    }

    /// Full reload from chain. Clears local patches by construction: every
    /// record it installs is chain-origin. Reloads at least as much as the
    /// window currently shows so no displayed entry disappears.
    pub async fn resync(&self) -> Result<()> {
        let Some(user) = self.chain.user_address().await else {
            return Ok(());
        };
        let held = self.state.lock().await.ledger.len().max(INITIAL_BATCH);
        self.load_window(user, held).await
    }

    async fn load_window(&self, user: Address, batch: u64) -> Result<()> {
        let front_office =
            IFrontOffice::new(self.cfg.front_office_address, self.chain.provider.clone());
        let total: U256 = front_office
            .getUserRequestCount(user)
            .call()
            .await
            .context("fetching request count")?;
        let total: u64 = total.try_into().context("request count overflows u64")?;

        let count = total.min(batch);
        let indexes: Vec<u64> = (0..count).map(|i| total - 1 - i).collect();
        let records = self.fetch_records(user, &indexes).await?;

        self.state.lock().await.ledger.reset(total, records);
        Ok(())
    }

    /// Extends the window backward by the next older batch. No-op when the
    /// window already covers every request.
    pub async fn load_more(&self) -> Result<()> {
        let Some(user) = self.chain.user_address().await else {
            return Ok(());
        };
        let indexes = {
            let mut st = self.state.lock().await;
            if !st.ledger.has_more() {
                return Ok(());
            }
            st.loading = true;
            st.ledger.next_indexes(LOAD_MORE_BATCH)
        };

        let result = self.fetch_records(user, &indexes).await;

        let mut st = self.state.lock().await;
        st.loading = false;
        st.ledger.extend_older(result?);
        Ok(())
    }

    async fn fetch_records(&self, user: Address, indexes: &[u64]) -> Result<Vec<RequestRecord>> {
        let front_office =
            IFrontOffice::new(self.cfg.front_office_address, self.chain.provider.clone());

        // Reads within a batch are concurrent and unordered among themselves.
        try_join_all(indexes.iter().map(|&index| {
            let front_office = front_office.clone();
            async move {
                let ret = front_office
                    .getUserRequestByIndex(user, U256::from(index))
                    .call()
                    .await
                    .with_context(|| format!("fetching request {index}"))?;
                Ok(record_from_parts(index, &ret.accessor, &ret.request, Origin::Chain))
            }
        }))
        .await
    }

    pub async fn request_deposit(&self, args: DepositArgs) -> Result<()> {
        let Some(wallet) = self.chain.wallet().await else {
            debug!("deposit request skipped: wallet not connected");
            return Ok(());
        };
        self.set_activity(Activity::Submitting(LedgerOp::Deposit)).await;
        let result = self.submit_deposit(&wallet, args).await;
        self.set_activity(Activity::Idle).await;
        result
    }

    async fn submit_deposit(&self, wallet: &WalletConnection, args: DepositArgs) -> Result<()> {
        let front_office = IFrontOffice::new(self.cfg.front_office_address, wallet.provider.clone());
        let pending = front_office
            .requestDeposit(
                args.token,
                args.amount_in,
                args.min_amount_out,
                args.block_deadline,
                args.incentive,
            )
            .send()
            .await
            .context("submitting deposit request")?;

        self.set_activity(Activity::AwaitingConfirmation(LedgerOp::Deposit)).await;
        let receipt = pending
            .get_receipt()
            .await
            .context("awaiting deposit confirmation")?;

        self.absorb_created(&receipt).await
    }

    pub async fn request_withdrawal(&self, args: WithdrawalArgs) -> Result<()> {
        let Some(wallet) = self.chain.wallet().await else {
            debug!("withdrawal request skipped: wallet not connected");
            return Ok(());
        };
        self.set_activity(Activity::Submitting(LedgerOp::Withdrawal)).await;
        let result = self.submit_withdrawal(&wallet, args).await;
        self.set_activity(Activity::Idle).await;
        result
    }

    async fn submit_withdrawal(
        &self,
        wallet: &WalletConnection,
        args: WithdrawalArgs,
    ) -> Result<()> {
        let front_office = IFrontOffice::new(self.cfg.front_office_address, wallet.provider.clone());
        let pending = front_office
            .requestWithdrawal(
                args.token,
                args.amount_in,
                args.min_amount_out,
                args.block_deadline,
            )
            .send()
            .await
            .context("submitting withdrawal request")?;

        self.set_activity(Activity::AwaitingConfirmation(LedgerOp::Withdrawal)).await;
        let receipt = pending
            .get_receipt()
            .await
            .context("awaiting withdrawal confirmation")?;

        self.absorb_created(&receipt).await
    }

    /// Cancels the user's latest pending request. Only the head of the list
    /// is eligible; the patch is applied after confirmation.
    pub async fn cancel_latest_request(&self) -> Result<()> {
        let Some(wallet) = self.chain.wallet().await else {
            debug!("cancel skipped: wallet not connected");
            return Ok(());
        };
        self.set_activity(Activity::Submitting(LedgerOp::Cancel)).await;
        let result = self.submit_cancel(&wallet).await;
        self.set_activity(Activity::Idle).await;
        result
    }

    async fn submit_cancel(&self, wallet: &WalletConnection) -> Result<()> {
        let front_office = IFrontOffice::new(self.cfg.front_office_address, wallet.provider.clone());
        let pending = front_office
            .cancelLatestRequest()
            .send()
            .await
            .context("submitting cancellation")?;

        self.set_activity(Activity::AwaitingConfirmation(LedgerOp::Cancel)).await;
        let receipt = pending
            .get_receipt()
            .await
            .context("awaiting cancellation confirmation")?;
        let block = receipt
            .block_number
            .context("cancellation receipt missing block number")?;

        self.state.lock().await.ledger.cancel_head(block)
    }

    /// Withdraws the locked funds of a failed request, then flags the
    /// matching local entry by logical index.
    pub async fn reclaim_from_failed_request(&self, index: u64) -> Result<()> {
        let Some(wallet) = self.chain.wallet().await else {
            debug!("reclaim skipped: wallet not connected");
            return Ok(());
        };
        self.set_activity(Activity::Submitting(LedgerOp::Reclaim(index))).await;
        let result = self.submit_reclaim(&wallet, index).await;
        self.set_activity(Activity::Idle).await;
        result
    }

    async fn submit_reclaim(&self, wallet: &WalletConnection, index: u64) -> Result<()> {
        let front_office = IFrontOffice::new(self.cfg.front_office_address, wallet.provider.clone());
        let pending = front_office
            .reclaimFromFailedRequest(U256::from(index))
            .send()
            .await
            .context("submitting reclaim")?;

        self.set_activity(Activity::AwaitingConfirmation(LedgerOp::Reclaim(index))).await;
        pending
            .get_receipt()
            .await
            .context("awaiting reclaim confirmation")?;

        self.state.lock().await.ledger.mark_reclaimed(index)
    }

    /// Applies a `RequestReclaimed` event observed by the block watcher.
    pub async fn note_reclaimed_event(&self, accessor: &Accessor) {
        let mut st = self.state.lock().await;
        if !st.ledger.mark_reclaimed_by_accessor(accessor) {
            debug!("reclaimed event for request outside the local window");
        }
    }

    /// The definitive fields of a new request come from the transaction's
    /// emitted `RequestCreated` event, not a re-fetch.
    async fn absorb_created(&self, receipt: &TransactionReceipt) -> Result<()> {
        let event = decode_receipt_event::<IFrontOffice::RequestCreated>(receipt)
            .context("confirmation missing RequestCreated event")?;

        let mut st = self.state.lock().await;
        let index = st.ledger.total();
        let record = record_from_parts(index, &event.accessor, &event.request, Origin::LocalPatch);
        if !st.ledger.admit_new(record) {
            debug!("duplicate request notification suppressed");
        }
        Ok(())
    }

    async fn set_activity(&self, activity: Activity) {
        self.state.lock().await.activity = activity;
    }
}

fn record_from_parts(
    index: u64,
    accessor: &IFrontOffice::RequestAccessor,
    request: &IFrontOffice::Request,
    origin: Origin,
) -> RequestRecord {
    RequestRecord {
        index,
        accessor: Accessor {
            is_deposit: accessor.isDeposit,
            token: accessor.token,
            queue_number: accessor.queueNumber,
        },
        user: request.user,
        amount_in: request.amountIn,
        min_amount_out: request.minAmountOut,
        block_deadline: request.blockDeadline,
        incentive: request.incentive,
        status: RequestStatus::from_u8(request.status),
        block_updated: request.blockUpdated.saturating_to(),
        computed_amount_out: request.computedAmountOut,
        is_reclaimed: request.isReclaimed,
        origin,
    }
}

fn decode_receipt_event<E: SolEvent>(receipt: &TransactionReceipt) -> Option<E> {
    receipt
        .inner
        .logs()
        .iter()
        .find_map(|log| E::decode_log(&log.inner).ok())
        .map(|decoded| decoded.data)
}
