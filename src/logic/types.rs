use super::math::{self, CRatio};
use crate::utils::Chain;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Derived staking position of one tracked address on one chain.
///
/// This is the flat per-address record handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAccount {
    pub chain: Chain,
    pub address: Address,
    pub collateral_units: U256,
    pub debt_share_units: U256,
    pub collateral_value: U256,
    pub debt_value: U256,
    pub c_ratio: CRatio,
    pub claimable_rewards: U256,
    /// Unix seconds; `None` when the account is not flagged.
    pub liquidation_deadline: Option<u64>,
}

impl TrackedAccount {
    pub fn new(chain: Chain, address: Address) -> Self {
        Self {
            chain,
            address,
            collateral_units: U256::ZERO,
            debt_share_units: U256::ZERO,
            collateral_value: U256::ZERO,
            debt_value: U256::ZERO,
            c_ratio: CRatio::ZERO,
            claimable_rewards: U256::ZERO,
            liquidation_deadline: None,
        }
    }

    /// Overwrites every on-chain field and recomputes all derived values.
    pub fn reset_from(&mut self, snapshot: &AccountSnapshot, globals: &GlobalChainState) {
        self.collateral_units = snapshot.collateral_units;
        self.debt_share_units = snapshot.debt_share_units;
        self.claimable_rewards = snapshot.claimable_rewards;
        self.liquidation_deadline = snapshot.liquidation_deadline;

        self.recompute_collateral(globals);
        self.recompute_debt(globals);
        self.recompute_c_ratio();
    }

    pub fn apply(&mut self, event: &EventKind) {
        match *event {
            EventKind::Mint { amount } => self.debt_share_units += amount,
            EventKind::Burn { amount } => {
                self.debt_share_units = self.checked_decrease("debt shares", self.debt_share_units, amount)
            }
            EventKind::Send { amount } => {
                self.collateral_units = self.checked_decrease("collateral", self.collateral_units, amount)
            }
            EventKind::Receive { amount } => self.collateral_units += amount,
            EventKind::FeesClaimed { rewards } => {
                self.collateral_units += rewards;
                self.claimable_rewards = U256::ZERO;
            }
            EventKind::Flagged { deadline } => self.liquidation_deadline = Some(deadline),
            EventKind::Unflagged => self.liquidation_deadline = None,
        }
    }

    pub fn recompute_collateral(&mut self, globals: &GlobalChainState) {
        self.collateral_value = math::collateral_value(self.collateral_units, globals.snx_price);
    }

    pub fn recompute_debt(&mut self, globals: &GlobalChainState) {
        self.debt_value = math::debt_value(self.debt_share_units, globals.debt_share_price);
    }

    pub fn recompute_c_ratio(&mut self) {
        self.c_ratio = math::c_ratio(self.collateral_value, self.debt_value);
    }

    fn checked_decrease(&self, what: &str, current: U256, amount: U256) -> U256 {
        if amount > current {
            // local cache drifted from chain; the next full resync corrects it
            warn!("{} {}: {} decrease {} exceeds cached {}", self.chain, self.address, what, amount, current);
        }
        current.saturating_sub(amount)
    }
}

/// On-chain state of one address as read at a given block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub collateral_units: U256,
    pub debt_share_units: U256,
    pub claimable_rewards: U256,
    pub liquidation_deadline: Option<u64>,
}

/// Protocol-wide values for one chain as of the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalChainState {
    pub chain: Chain,
    pub snx_price: U256,
    pub debt_share_price: U256,
    /// Unix seconds.
    pub period_start: u64,
    pub period_end: u64,
    pub snx_price_changed: bool,
    pub debt_share_price_changed: bool,
    pub period_changed: bool,
}

impl GlobalChainState {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            snx_price: U256::ZERO,
            debt_share_price: U256::ZERO,
            period_start: 0,
            period_end: 0,
            snx_price_changed: false,
            debt_share_price_changed: false,
            period_changed: false,
        }
    }

    /// Whether either price moved this cycle.
    pub fn prices_changed(&self) -> bool {
        self.snx_price_changed || self.debt_share_price_changed
    }
}

/// Where a log sits in the chain; orders events for one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

/// The closed set of per-account mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Mint { amount: U256 },
    Burn { amount: U256 },
    Send { amount: U256 },
    Receive { amount: U256 },
    FeesClaimed { rewards: U256 },
    Flagged { deadline: u64 },
    Unflagged,
}

impl EventKind {
    pub fn touches_collateral(&self) -> bool {
        matches!(self, EventKind::Send { .. } | EventKind::Receive { .. } | EventKind::FeesClaimed { .. })
    }

    pub fn touches_debt(&self) -> bool {
        matches!(self, EventKind::Mint { .. } | EventKind::Burn { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainEvent {
    pub subject: Address,
    pub kind: EventKind,
    pub position: EventPosition,
}

/// A raw collateral token transfer, before it is split into SEND/RECEIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub position: EventPosition,
}

/// Everything decoded from one block range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub from_block: u64,
    pub to_block: u64,
    pub transfers: Vec<TransferEvent>,
    pub events: Vec<ChainEvent>,
}

impl EventBatch {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self { from_block, to_block, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.transfers.len() + self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::math::{RAY, WAD};

    fn wad(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    fn globals() -> GlobalChainState {
        GlobalChainState {
            snx_price: WAD,
            debt_share_price: RAY * U256::from(2),
            ..GlobalChainState::new(Chain::Ethereum)
        }
    }

    #[test]
    fn test_reset_recomputes_everything() {
        let mut account = TrackedAccount::new(Chain::Ethereum, Address::repeat_byte(1));
        let snapshot = AccountSnapshot {
            collateral_units: wad(100),
            debt_share_units: wad(50),
            claimable_rewards: wad(3),
            liquidation_deadline: Some(1_700_000_000),
        };
        account.reset_from(&snapshot, &globals());

        assert_eq!(account.collateral_value, wad(100) * WAD);
        assert_eq!(account.debt_value, wad(100));
        assert_eq!(account.c_ratio.to_string(), "1.00000");
        assert_eq!(account.claimable_rewards, wad(3));
        assert_eq!(account.liquidation_deadline, Some(1_700_000_000));
    }

    #[test]
    fn test_send_then_receive_nets_out() {
        let mut account = TrackedAccount::new(Chain::Optimism, Address::repeat_byte(2));
        account.collateral_units = wad(10);
        account.apply(&EventKind::Send { amount: wad(4) });
        account.apply(&EventKind::Receive { amount: wad(4) });
        assert_eq!(account.collateral_units, wad(10));
    }

    #[test]
    fn test_fees_claimed_zeroes_rewards() {
        let mut account = TrackedAccount::new(Chain::Ethereum, Address::repeat_byte(3));
        account.collateral_units = wad(1);
        account.claimable_rewards = wad(7);
        account.apply(&EventKind::FeesClaimed { rewards: wad(2) });
        assert_eq!(account.collateral_units, wad(3));
        assert_eq!(account.claimable_rewards, U256::ZERO);

        account.apply(&EventKind::FeesClaimed { rewards: U256::ZERO });
        assert_eq!(account.claimable_rewards, U256::ZERO);
    }

    #[test]
    fn test_flag_then_unflag_clears_deadline() {
        let mut account = TrackedAccount::new(Chain::Ethereum, Address::repeat_byte(4));
        account.apply(&EventKind::Flagged { deadline: 123 });
        assert_eq!(account.liquidation_deadline, Some(123));
        account.apply(&EventKind::Unflagged);
        assert_eq!(account.liquidation_deadline, None);
    }

    #[test]
    fn test_oversized_burn_saturates() {
        let mut account = TrackedAccount::new(Chain::Ethereum, Address::repeat_byte(5));
        account.debt_share_units = wad(1);
        account.apply(&EventKind::Burn { amount: wad(2) });
        assert_eq!(account.debt_share_units, U256::ZERO);
    }

    #[test]
    fn test_event_kind_partitions() {
        assert!(EventKind::Mint { amount: U256::ZERO }.touches_debt());
        assert!(!EventKind::Mint { amount: U256::ZERO }.touches_collateral());
        assert!(EventKind::FeesClaimed { rewards: U256::ZERO }.touches_collateral());
        assert!(!EventKind::Unflagged.touches_collateral() && !EventKind::Unflagged.touches_debt());
    }
}
