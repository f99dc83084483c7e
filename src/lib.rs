// Layered architecture
pub mod chain; // Chain access: throttled, retrying RPC reads
pub mod contracts; // Contract resolution, ABIs, typed protocol reads
pub mod data_sync; // Schedulers, registration, service wiring
pub mod logic; // Valuation, price/period tracking, account updates
pub mod store; // Account persistence contract

// Common utilities and types
pub mod error;
pub mod utils;

// Re-export key components from each layer
pub use chain::{ChainGateway, RetryPolicy};
pub use contracts::{ContractDescriptor, ContractName, ContractRegistry, Synthetix};
pub use data_sync::{AccountRegistrar, CycleReport, SyncConfig, SyncScheduler, SyncService, SyncServiceBuilder};
pub use error::{Result, SyncError};
pub use logic::{
    AccountSynchronizer, CRatio, GlobalChainState, PriceAndPeriodTracker, StakingSource, TrackedAccount,
};
pub use store::{AccountStore, InMemoryAccountStore};
pub use utils::Chain;
