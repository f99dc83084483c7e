/// Data Synchronization Layer
///
/// This layer keeps tracked accounts in step with the chain. It provides:
///
/// - One polling scheduler per chain, driving full and incremental syncs
/// - The registration queue through which new accounts reach a scheduler
/// - Cycle reports for collaborators that read account values
/// - Service wiring from configuration to running schedulers

// Core data sync components
pub mod config;
pub mod registrar;
pub mod scheduler;
pub mod service;


// Re-export main components for easy usage
pub use config::{ChainConfig, SyncConfig};
pub use registrar::{AccountRegistrar, NewAccountQueue};
pub use scheduler::{CycleReport, ReinitReason, SchedulerIntervals, SchedulerState, SyncScheduler, TickOutcome};
pub use service::{SyncService, SyncServiceBuilder};
