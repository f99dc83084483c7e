/// Logic Layer - Staking State
///
/// This layer is responsible for:
/// - Fixed-point valuation of collateral, debt and collateralization ratio
/// - Tracking chain-wide prices and the current fee period
/// - Applying full reloads and decoded events to tracked accounts
///
/// It talks to the chain only through [`StakingSource`], so everything here
/// runs against a scripted source in tests.

pub mod math;
pub mod source;
pub mod synchronizer;
pub mod tracker;
pub mod types;

// Re-export key components from the logic layer
pub use math::{CRatio, RAY, WAD};
pub use source::{ReadPhase, StakingSource};
pub use synchronizer::{AccountSynchronizer, SyncSummary};
pub use tracker::{DEFAULT_PERIOD_LENGTH_SECS, PriceAndPeriodTracker};
pub use types::{
    AccountSnapshot, ChainEvent, EventBatch, EventKind, EventPosition, GlobalChainState, TrackedAccount, TransferEvent,
};
