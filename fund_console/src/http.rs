//! The dashboard route table. Handlers delegate to the services and convert
//! failures to display strings; no business logic lives here.

use alloy::primitives::{Address, U256};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use decimal_util::to_decimal_string;

use crate::allowance::GateSnapshot;
use crate::app_state::AppState;
use crate::fund::{FundDetails, FundState};
use crate::incentives::{IncentiveCapability, IncentiveSnapshot, ReferralUser};
use crate::quote::{self, QuoteLeg};
use crate::requests::{DepositArgs, LedgerSnapshot, WithdrawalArgs};

const DISPLAY_DP: usize = 6;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/requests") }))
        .route("/health", get(health))
        .route("/fund", get(get_fund))
        .route("/quote", get(get_quote))
        .route("/requests", get(get_requests))
        .route("/requests/load-more", post(post_load_more))
        .route("/requests/resync", post(post_resync))
        .route("/requests/deposit", post(post_deposit))
        .route("/requests/withdrawal", post(post_withdrawal))
        .route("/requests/cancel", post(post_cancel))
        .route("/requests/reclaim", post(post_reclaim))
        .route("/allowance/{token}", get(get_allowance))
        .route("/allowance/{token}/approve", post(post_approve))
        .route("/incentives", get(get_incentives))
        .route("/incentives/{address}", get(get_incentive))
        .route("/incentives/register", post(post_register))
        .route("/wallet", get(get_wallet))
        .route("/wallet/connect", post(post_connect))
        .with_state(state)
}

/// Failures surface to the caller as a display string; the underlying
/// operation has already restored its busy flags, so a retry is always safe.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct FundStateView {
    aum_value: String,
    fund_token_price: String,
    period_beginning_block: String,
    period_beginning_supply: String,
    theoretical_supply: String,
    actual_supply: String,
}

#[derive(Serialize)]
struct FundView {
    details: Option<FundDetails>,
    state: Option<FundStateView>,
    user_fund_token_balance: String,
}

async fn get_fund(State(state): State<AppState>) -> Result<Json<FundView>, ApiError> {
    let details = state.fund.details().await;
    let fund_decimals = details.as_ref().map(|d| d.fund_token.decimals).unwrap_or(18);
    let fund_state = state.fund.state().await.map(|s| state_view(&s, fund_decimals));
    let balance = state.fund.user_fund_token_balance().await;

    Ok(Json(FundView {
        details: details.map(|d| (*d).clone()),
        state: fund_state,
        user_fund_token_balance: to_decimal_string(balance, fund_decimals, DISPLAY_DP),
    }))
}

fn state_view(state: &FundState, fund_decimals: u8) -> FundStateView {
    let fmt = |v: U256| to_decimal_string(v, fund_decimals, DISPLAY_DP);
    FundStateView {
        aum_value: fmt(state.aum_value),
        fund_token_price: fmt(state.fund_token_price),
        period_beginning_block: state.period_beginning_block.to_string(),
        period_beginning_supply: fmt(state.period_beginning_supply),
        theoretical_supply: fmt(state.theoretical_supply),
        actual_supply: fmt(state.actual_supply),
    }
}

#[derive(Deserialize)]
struct QuoteParams {
    token: Address,
    amount_in: String,
    is_deposit: bool,
}

async fn get_quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<quote::Quote>, ApiError> {
    let amount_in: U256 = params
        .amount_in
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid amount_in: {e}"))?;

    let details = state
        .fund
        .details()
        .await
        .ok_or_else(|| anyhow::anyhow!("fund parameters not loaded"))?;
    let fund_state = state
        .fund
        .state()
        .await
        .ok_or_else(|| anyhow::anyhow!("fund state not loaded"))?;
    let token = details
        .allowed_tokens
        .get(&params.token)
        .ok_or_else(|| anyhow::anyhow!("token {} is not allowed", params.token))?;
    let oracle = token
        .oracle
        .ok_or_else(|| anyhow::anyhow!("token {} has no oracle", params.token))?;
    let oracle_price = state
        .oracles
        .price(oracle)
        .await
        .ok_or_else(|| anyhow::anyhow!("no oracle price for {}", params.token))?;

    let token_leg = QuoteLeg {
        decimals: token.decimals,
        price: oracle_price.price,
        price_decimals: oracle_price.decimals,
    };
    let fund_leg = QuoteLeg {
        decimals: details.fund_token.decimals,
        price: fund_state.fund_token_price,
        price_decimals: details.fund_token.decimals,
    };

    let (input, output) = if params.is_deposit {
        (token_leg, fund_leg)
    } else {
        (fund_leg, token_leg)
    };

    let quote = quote::quote(amount_in, &input, &output)
        .ok_or_else(|| anyhow::anyhow!("quote not computable"))?;
    Ok(Json(quote))
}

async fn get_requests(State(state): State<AppState>) -> Json<LedgerSnapshot> {
    Json(state.ledger.snapshot().await)
}

async fn post_load_more(State(state): State<AppState>) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.ledger.load_more().await?;
    Ok(Json(state.ledger.snapshot().await))
}

async fn post_resync(State(state): State<AppState>) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.ledger.resync().await?;
    Ok(Json(state.ledger.snapshot().await))
}

async fn post_deposit(
    State(state): State<AppState>,
    Json(args): Json<DepositArgs>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.ledger.request_deposit(args).await?;
    Ok(Json(state.ledger.snapshot().await))
}

async fn post_withdrawal(
    State(state): State<AppState>,
    Json(args): Json<WithdrawalArgs>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.ledger.request_withdrawal(args).await?;
    Ok(Json(state.ledger.snapshot().await))
}

async fn post_cancel(State(state): State<AppState>) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.ledger.cancel_latest_request().await?;
    Ok(Json(state.ledger.snapshot().await))
}

#[derive(Deserialize)]
struct ReclaimBody {
    index: u64,
}

async fn post_reclaim(
    State(state): State<AppState>,
    Json(body): Json<ReclaimBody>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    state.ledger.reclaim_from_failed_request(body.index).await?;
    Ok(Json(state.ledger.snapshot().await))
}

async fn get_allowance(
    State(state): State<AppState>,
    Path(token): Path<Address>,
) -> Result<Json<GateSnapshot>, ApiError> {
    let gate = state.allowances.gate(token).await?;
    Ok(Json(gate.snapshot().await))
}

async fn post_approve(
    State(state): State<AppState>,
    Path(token): Path<Address>,
) -> Result<Json<GateSnapshot>, ApiError> {
    let gate = state.allowances.gate(token).await?;
    gate.approve(&state.chain).await?;
    Ok(Json(gate.snapshot().await))
}

async fn get_incentives(State(state): State<AppState>) -> Json<Vec<IncentiveSnapshot>> {
    Json(state.incentives.snapshot().await)
}

#[derive(Serialize)]
struct IncentiveDetailView {
    #[serde(flatten)]
    snapshot: IncentiveSnapshot,
    referral_user: Option<ReferralUser>,
    is_registering: bool,
}

async fn get_incentive(
    State(state): State<AppState>,
    Path(address): Path<Address>,
) -> Result<Json<IncentiveDetailView>, ApiError> {
    let snapshot = state
        .incentives
        .snapshot_one(address)
        .await
        .ok_or_else(|| anyhow::anyhow!("unknown incentive {address}"))?;

    let referral_user = if snapshot
        .capabilities
        .contains(&IncentiveCapability::Registration)
    {
        state.incentives.referral_user().await?
    } else {
        None
    };

    Ok(Json(IncentiveDetailView {
        snapshot,
        referral_user,
        is_registering: state.incentives.is_registering().await,
    }))
}

#[derive(Deserialize)]
struct RegisterBody {
    referrer: Address,
}

async fn post_register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<StatusCode, ApiError> {
    state.incentives.register_referral(body.referrer).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct WalletView {
    address: Option<Address>,
}

async fn get_wallet(State(state): State<AppState>) -> Json<WalletView> {
    Json(WalletView {
        address: state.chain.user_address().await,
    })
}

async fn post_connect(State(state): State<AppState>) -> Result<Json<WalletView>, ApiError> {
    let signer = state
        .cfg
        .wallet_private_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no wallet key configured"))?;

    let address = state.chain.connect_wallet(signer).await?;
    state.session.store(address)?;

    // First loads of everything scoped to the connected user.
    state.ledger.load_initial().await?;
    state.fund.refresh_user_balance().await?;
    state.incentives.load_qualifications().await?;

    Ok(Json(WalletView {
        address: Some(address),
    }))
}
