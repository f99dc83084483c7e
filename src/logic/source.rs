use super::types::{AccountSnapshot, EventBatch};
use crate::error::Result;
use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::BlockId;
use async_trait::async_trait;

/// How patient chain reads should be right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPhase {
    /// (Re)initialization: retry for hours rather than give up on a flaky endpoint.
    Startup,
    /// Steady-state polling: give up sooner, the scheduler is restarted externally.
    Steady,
}

/// Everything the sync engine reads from one chain's deployment of the protocol.
#[async_trait]
pub trait StakingSource: Send + Sync {
    fn set_read_phase(&self, _phase: ReadPhase) {}

    /// Resolves and installs all protocol contracts.
    async fn install_contracts(&self) -> Result<()>;

    /// Re-resolves contracts; `true` if any was redeployed and reinstalled.
    async fn check_contract_updates(&self) -> Result<bool>;

    async fn block_number(&self) -> Result<u64>;

    /// Current `(snx_price, debt_share_price)`.
    async fn prices(&self) -> Result<(U256, U256)>;

    /// Start timestamp of the current fee period.
    async fn current_period_start(&self) -> Result<u64>;

    async fn load_account(&self, address: Address, block: BlockId) -> Result<AccountSnapshot>;

    /// Decoded protocol events over `[from_block, to_block]`.
    async fn fetch_events(&self, from_block: u64, to_block: u64) -> Result<EventBatch>;

    /// Transfers out of this contract are vesting payouts, not new activity.
    fn vesting_contract(&self) -> Result<Address>;
}
