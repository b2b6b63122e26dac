use std::sync::Arc;

use crate::allowance::AllowanceService;
use crate::cfg::Cfg;
use crate::chain_client::ChainClient;
use crate::fund::FundService;
use crate::incentives::IncentiveService;
use crate::oracle::OracleBoard;
use crate::requests::RequestService;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Cfg>,
    pub chain: Arc<ChainClient>,
    pub session: Arc<SessionStore>,
    pub fund: Arc<FundService>,
    pub oracles: Arc<OracleBoard>,
    pub ledger: Arc<RequestService>,
    pub allowances: Arc<AllowanceService>,
    pub incentives: Arc<IncentiveService>,
}
