use std::path::PathBuf;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Parser, Debug)]
pub struct Cfg {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "ETH_RPC_URL")]
    pub eth_rpc_url: String,

    #[arg(long, env = "ACCOUNTING_ADDRESS", default_value = ZERO_ADDRESS)]
    pub accounting_address: Address,

    #[arg(long, env = "FRONT_OFFICE_ADDRESS", default_value = ZERO_ADDRESS)]
    pub front_office_address: Address,

    #[arg(long, env = "FRONT_OFFICE_PARAMETERS_ADDRESS", default_value = ZERO_ADDRESS)]
    pub front_office_parameters_address: Address,

    #[arg(long, env = "FUND_TOKEN_ADDRESS", default_value = ZERO_ADDRESS)]
    pub fund_token_address: Address,

    #[arg(long, env = "INCENTIVES_MANAGER_ADDRESS", default_value = ZERO_ADDRESS)]
    pub incentives_manager_address: Address,

    // Explicitly specified incentives
    #[arg(long, env = "REFERRAL_INCENTIVE_ADDRESS", default_value = ZERO_ADDRESS)]
    pub referral_incentive_address: Address,

    #[arg(long, env = "WALLET_PRIVATE_KEY")]
    pub wallet_private_key: Option<PrivateKeySigner>,

    #[arg(long, env = "POLL_SECS", default_value_t = 5)]
    pub poll_secs: u64,

    #[arg(long, env = "DETAIL_BATCH_SIZE", default_value_t = 4)]
    pub detail_batch_size: usize,

    #[arg(long, env = "BATCH_DELAY_MS", default_value_t = 1000)]
    pub batch_delay_ms: u64,

    #[arg(long, env = "SESSION_FILE", default_value = ".fund_console/session.json")]
    pub session_file: PathBuf,
}
