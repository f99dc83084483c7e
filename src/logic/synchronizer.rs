use super::source::StakingSource;
use super::types::{ChainEvent, EventBatch, EventKind, GlobalChainState, TransferEvent};
use crate::error::Result;
use crate::store::AccountStore;
use crate::utils::{Chain, gather_partitioned};
use alloy_primitives::Address;
use alloy_rpc_types_eth::BlockId;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Counts for one fan-out over accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub updated: usize,
    /// Addresses no longer in the store when their turn came.
    pub skipped: usize,
    pub failed: usize,
}

/// Applies full reloads and incremental events to tracked accounts.
///
/// Each account is read from the store, changed in memory and written back;
/// no store access is held across a chain read.
pub struct AccountSynchronizer {
    chain: Chain,
    source: Arc<dyn StakingSource>,
    store: Arc<dyn AccountStore>,
}

impl AccountSynchronizer {
    pub fn new(chain: Chain, source: Arc<dyn StakingSource>, store: Arc<dyn AccountStore>) -> Self {
        Self { chain, source, store }
    }

    /// Reloads every known address at `block`.
    pub async fn init_all(&self, block: BlockId, globals: &GlobalChainState) -> Result<SyncSummary> {
        let addresses = self.store.addresses(self.chain).await?;
        let summary = self.init_accounts(&addresses, block, globals).await;
        info!("{}: initialized {} accounts at {:?} ({:?})", self.chain, summary.updated, block, summary);
        Ok(summary)
    }

    /// Reloads the given addresses concurrently, one job per address. A single
    /// address failing is logged and counted, never fatal for the batch.
    pub async fn init_accounts(
        &self,
        addresses: &[Address],
        block: BlockId,
        globals: &GlobalChainState,
    ) -> SyncSummary {
        self.init_accounts_with_failures(addresses, block, globals).await.0
    }

    /// Like [`Self::init_accounts`], also returning the addresses that failed.
    pub async fn init_accounts_with_failures(
        &self,
        addresses: &[Address],
        block: BlockId,
        globals: &GlobalChainState,
    ) -> (SyncSummary, Vec<Address>) {
        let jobs = addresses.iter().map(|&address| (address, self.init_account(address, block, globals)));
        let report = gather_partitioned("account init", jobs).await;
        let summary = summarize(&report.succeeded, report.failed.len());
        (summary, report.failed.into_iter().map(|(address, _)| address).collect())
    }

    async fn init_account(&self, address: Address, block: BlockId, globals: &GlobalChainState) -> Result<bool> {
        let snapshot = self.source.load_account(address, block).await?;

        let Some(mut account) = self.store.get(self.chain, address).await? else {
            debug!("{}: {} vanished before init, skipping", self.chain, address);
            return Ok(false);
        };
        account.reset_from(&snapshot, globals);
        self.store.save(&account).await
    }

    /// Applies one block range of events.
    ///
    /// When either price moved, every known account is recomputed, events or
    /// not, so derived values stay consistent with the new globals.
    /// Events whose subject is in `excluded` are dropped (those accounts were
    /// just loaded at the end of the range).
    pub async fn apply_events(
        &self,
        batch: EventBatch,
        globals: &GlobalChainState,
        excluded: &HashSet<Address>,
    ) -> Result<SyncSummary> {
        let vesting = self.source.vesting_contract()?;
        let mut by_address = group_events(batch, vesting);
        by_address.retain(|address, _| !excluded.contains(address));

        let targets: BTreeSet<Address> = if globals.prices_changed() {
            self.store.addresses(self.chain).await?.into_iter().collect()
        } else {
            by_address.keys().copied().collect()
        };

        let jobs = targets.into_iter().map(|address| {
            let events = by_address.remove(&address).unwrap_or_default();
            (address, self.update_account(address, events, globals))
        });
        let report = gather_partitioned("account update", jobs).await;
        let summary = summarize(&report.succeeded, report.failed.len());

        debug!("{}: applied events ({:?})", self.chain, summary);
        Ok(summary)
    }

    async fn update_account(
        &self,
        address: Address,
        events: Vec<ChainEvent>,
        globals: &GlobalChainState,
    ) -> Result<bool> {
        let Some(mut account) = self.store.get(self.chain, address).await? else {
            debug!("{}: {} not tracked anymore, skipping {} events", self.chain, address, events.len());
            return Ok(false);
        };

        let mut collateral_touched = globals.snx_price_changed;
        let mut debt_touched = globals.debt_share_price_changed;
        for event in &events {
            account.apply(&event.kind);
            collateral_touched |= event.kind.touches_collateral();
            debt_touched |= event.kind.touches_debt();
        }

        if collateral_touched {
            account.recompute_collateral(globals);
        }
        if debt_touched {
            account.recompute_debt(globals);
        }
        if collateral_touched || debt_touched {
            account.recompute_c_ratio();
        }

        self.store.save(&account).await
    }
}

/// Splits transfers into SEND/RECEIVE pairs, buckets everything by subject and
/// orders each bucket by chain position.
pub fn group_events(batch: EventBatch, vesting_contract: Address) -> BTreeMap<Address, Vec<ChainEvent>> {
    let mut by_address: BTreeMap<Address, Vec<ChainEvent>> = BTreeMap::new();

    for event in split_transfers(&batch.transfers, vesting_contract).into_iter().chain(batch.events) {
        by_address.entry(event.subject).or_default().push(event);
    }
    for events in by_address.values_mut() {
        // stable: a SEND and RECEIVE to self from one log keep their order
        events.sort_by_key(|event| event.position);
    }

    by_address
}

/// Transfers paid out by the vesting contract move balances that are already
/// accounted for and produce no events.
pub fn split_transfers(transfers: &[TransferEvent], vesting_contract: Address) -> Vec<ChainEvent> {
    transfers
        .iter()
        .filter(|transfer| transfer.from != vesting_contract)
        .flat_map(|transfer| {
            [
                ChainEvent {
                    subject: transfer.from,
                    kind: EventKind::Send { amount: transfer.value },
                    position: transfer.position,
                },
                ChainEvent {
                    subject: transfer.to,
                    kind: EventKind::Receive { amount: transfer.value },
                    position: transfer.position,
                },
            ]
        })
        .collect()
}

fn summarize(succeeded: &[(Address, bool)], failed: usize) -> SyncSummary {
    let updated = succeeded.iter().filter(|(_, saved)| *saved).count();
    SyncSummary { updated, skipped: succeeded.len() - updated, failed }
}
