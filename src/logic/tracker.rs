use super::source::StakingSource;
use super::types::GlobalChainState;
use crate::error::Result;
use crate::utils::Chain;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Fee periods last one week.
pub const DEFAULT_PERIOD_LENGTH_SECS: u64 = 604_800;

/// Keeps the chain-wide prices and fee period current and flags what moved.
pub struct PriceAndPeriodTracker {
    source: Arc<dyn StakingSource>,
    period_length: u64,
    state: GlobalChainState,
}

impl PriceAndPeriodTracker {
    pub fn new(chain: Chain, source: Arc<dyn StakingSource>, period_length: u64) -> Self {
        Self { source, period_length, state: GlobalChainState::new(chain) }
    }

    pub fn state(&self) -> &GlobalChainState {
        &self.state
    }

    pub async fn update(&mut self) -> Result<GlobalChainState> {
        self.update_at(unix_now()).await
    }

    /// Refreshes prices and, once `now` is past the cached period end, the
    /// period. Both reads run concurrently and both finish before returning.
    /// Returns a snapshot for the rest of the cycle to consume.
    pub async fn update_at(&mut self, now: u64) -> Result<GlobalChainState> {
        let period_due = now > self.state.period_end;
        let source = &self.source;

        let (prices, fetched_start) = tokio::try_join!(source.prices(), async {
            if period_due { source.current_period_start().await.map(Some) } else { Ok(None) }
        })?;

        let (snx_price, debt_share_price) = prices;
        self.state.snx_price_changed = snx_price != self.state.snx_price;
        self.state.debt_share_price_changed = debt_share_price != self.state.debt_share_price;
        self.state.snx_price = snx_price;
        self.state.debt_share_price = debt_share_price;

        self.state.period_changed = false;
        if let Some(start) = fetched_start {
            if start != self.state.period_start {
                self.state.period_start = start;
                self.state.period_end = start + self.period_length;
                self.state.period_changed = true;
                info!("{}: new fee period {} -> {}", self.state.chain, start, self.state.period_end);
            }
        }

        debug!(
            "{}: globals snx_price={} (changed {}), debt_share_price={} (changed {})",
            self.state.chain,
            snx_price,
            self.state.snx_price_changed,
            debt_share_price,
            self.state.debt_share_price_changed
        );
        Ok(self.state.clone())
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
