use crate::data_sync::config::SyncConfig;
use crate::data_sync::registrar::NewAccountQueue;
use crate::error::Result;
use crate::logic::source::{ReadPhase, StakingSource};
use crate::logic::synchronizer::{AccountSynchronizer, SyncSummary};
use crate::logic::tracker::PriceAndPeriodTracker;
use crate::logic::types::{EventBatch, GlobalChainState};
use crate::store::AccountStore;
use crate::utils::Chain;
use alloy_rpc_types_eth::BlockId;
use eyre::WrapErr;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    Uninitialized,
    SteadyPolling,
    Reinitializing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReinitReason {
    ContractsMoved,
    PeriodRolledOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The first tick ran the initial sync.
    Initialized,
    /// Nothing was due this tick.
    Idle,
    Reinitialized(ReinitReason),
    EventsApplied { from_block: u64, to_block: u64, new_accounts: usize, summary: SyncSummary },
}

/// Published after every initialization and every incremental pass. Account
/// values in the store are consistent with `globals` at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub chain: Chain,
    pub state: SchedulerState,
    pub block: u64,
    pub globals: GlobalChainState,
    pub accounts_updated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerIntervals {
    pub tick: Duration,
    pub contract_check: Duration,
    pub events_check: Duration,
}

impl SchedulerIntervals {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            tick: config.tick_interval(),
            contract_check: config.contract_check_interval(),
            events_check: config.events_check_interval(),
        }
    }
}

/// Per-chain polling loop.
///
/// `Uninitialized -> SteadyPolling <-> Reinitializing`. Contract redeployments
/// and fee period rollovers force a full reload; ordinary activity is applied
/// incrementally from event logs. Any error escaping a tick ends the loop.
pub struct SyncScheduler {
    chain: Chain,
    source: Arc<dyn StakingSource>,
    tracker: PriceAndPeriodTracker,
    synchronizer: AccountSynchronizer,
    new_accounts: NewAccountQueue,
    intervals: SchedulerIntervals,

    state: SchedulerState,
    last_contract_check: Instant,
    last_events_check: Instant,
    last_checked_block: u64,
    // price moves seen on ticks without an events pass
    pending_snx_change: bool,
    pending_debt_share_change: bool,

    reports: watch::Sender<Option<CycleReport>>,
}

impl SyncScheduler {
    pub fn new(
        chain: Chain,
        source: Arc<dyn StakingSource>,
        store: Arc<dyn AccountStore>,
        new_accounts: NewAccountQueue,
        intervals: SchedulerIntervals,
        period_length_secs: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            chain,
            tracker: PriceAndPeriodTracker::new(chain, Arc::clone(&source), period_length_secs),
            synchronizer: AccountSynchronizer::new(chain, Arc::clone(&source), store),
            source,
            new_accounts,
            intervals,
            state: SchedulerState::Uninitialized,
            last_contract_check: now,
            last_events_check: now,
            last_checked_block: 0,
            pending_snx_change: false,
            pending_debt_share_change: false,
            reports: watch::Sender::new(None),
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn last_checked_block(&self) -> u64 {
        self.last_checked_block
    }

    pub fn globals(&self) -> &GlobalChainState {
        self.tracker.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    /// Installs contracts and reloads every tracked account at the current
    /// block. Used both for the first start and for every full resync.
    pub async fn initialize(&mut self) -> Result<SyncSummary> {
        let started = Instant::now();
        if self.state == SchedulerState::SteadyPolling {
            self.state = SchedulerState::Reinitializing;
        }
        self.source.set_read_phase(ReadPhase::Startup);

        self.source.install_contracts().await?;
        let block = self.source.block_number().await?;
        let globals = self.tracker.update().await?;
        let summary = self.synchronizer.init_all(BlockId::number(block), &globals).await?;

        let now = Instant::now();
        self.last_contract_check = now;
        self.last_events_check = now;
        self.last_checked_block = block;
        self.pending_snx_change = false;
        self.pending_debt_share_change = false;

        self.source.set_read_phase(ReadPhase::Steady);
        self.state = SchedulerState::SteadyPolling;
        self.publish(block, globals, summary.updated);

        info!("{}: synced {} accounts at block {} in {:?}", self.chain, summary.updated, block, started.elapsed());
        Ok(summary)
    }

    /// One steady-state step. The first tick initializes instead.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if self.state == SchedulerState::Uninitialized {
            self.initialize().await?;
            return Ok(TickOutcome::Initialized);
        }

        let now = Instant::now();
        if now.duration_since(self.last_contract_check) >= self.intervals.contract_check {
            self.last_contract_check = now;
            if self.source.check_contract_updates().await? {
                return self.reinitialize(ReinitReason::ContractsMoved).await;
            }
        }

        let mut globals = self.tracker.update().await?;
        if globals.period_changed {
            return self.reinitialize(ReinitReason::PeriodRolledOver).await;
        }

        self.pending_snx_change |= globals.snx_price_changed;
        self.pending_debt_share_change |= globals.debt_share_price_changed;
        if now.duration_since(self.last_events_check) < self.intervals.events_check {
            return Ok(TickOutcome::Idle);
        }

        globals.snx_price_changed = self.pending_snx_change;
        globals.debt_share_price_changed = self.pending_debt_share_change;
        self.apply_new_blocks(now, globals).await
    }

    /// Runs until a tick fails. The error is logged and handed to whoever
    /// supervises the process; nothing is retried here.
    pub async fn run(mut self) -> eyre::Result<()> {
        info!("{}: scheduler starting", self.chain);
        loop {
            if let Err(e) = self.tick().await {
                error!("{}: scheduler stopped in state {}: {:?}", self.chain, self.state, e);
                return Err(e).wrap_err_with(|| format!("{} scheduler stopped", self.chain));
            }
            sleep(self.intervals.tick).await;
        }
    }

    async fn reinitialize(&mut self, reason: ReinitReason) -> Result<TickOutcome> {
        info!("{}: full resync ({})", self.chain, reason);
        self.state = SchedulerState::Reinitializing;
        self.initialize().await?;
        Ok(TickOutcome::Reinitialized(reason))
    }

    async fn apply_new_blocks(&mut self, now: Instant, globals: GlobalChainState) -> Result<TickOutcome> {
        let current_block = self.source.block_number().await?;
        let from_block = self.last_checked_block + 1;

        let batch = if current_block >= from_block {
            self.source.fetch_events(from_block, current_block).await?
        } else {
            EventBatch::new(from_block, current_block)
        };
        debug!("{}: {} events in [{}, {}]", self.chain, batch.len(), from_block, current_block);

        // accounts registered since the last pass start from a snapshot at
        // `current_block`, which already includes this batch
        let new_accounts = self.new_accounts.drain_snapshot();
        let (fresh, failed) = self
            .synchronizer
            .init_accounts_with_failures(&new_accounts, BlockId::number(current_block), &globals)
            .await;
        let excluded: HashSet<_> = new_accounts.iter().copied().collect();
        if !failed.is_empty() {
            warn!("{}: {} new accounts failed to load, retrying next pass", self.chain, failed.len());
            self.new_accounts.requeue(failed);
        }

        let summary = self.synchronizer.apply_events(batch, &globals, &excluded).await?;

        self.last_checked_block = self.last_checked_block.max(current_block);
        self.last_events_check = now;
        self.pending_snx_change = false;
        self.pending_debt_share_change = false;
        self.publish(current_block, globals, summary.updated + fresh.updated);

        Ok(TickOutcome::EventsApplied {
            from_block,
            to_block: current_block,
            new_accounts: new_accounts.len(),
            summary,
        })
    }

    fn publish(&self, block: u64, globals: GlobalChainState, accounts_updated: usize) {
        self.reports.send_replace(Some(CycleReport {
            chain: self.chain,
            state: self.state,
            block,
            globals,
            accounts_updated,
        }));
    }
}
