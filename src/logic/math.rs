use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 10^18, the token amount scale.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
/// 10^27, the debt-share price scale.
pub const RAY: U256 = U256::from_limbs([11_515_845_246_265_065_472, 54_210_108, 0, 0]);

pub const C_RATIO_DECIMALS: u32 = 5;
const C_RATIO_SCALE: u64 = 100_000;

/// Collateralization ratio with five fixed decimals, stored as `ratio * 10^5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CRatio(U256);

impl CRatio {
    pub const ZERO: CRatio = CRatio(U256::ZERO);

    pub const fn from_scaled(scaled: U256) -> Self {
        Self(scaled)
    }

    pub const fn scaled(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Lossy view for display and threshold comparison by collaborators.
    pub fn as_f64(&self) -> f64 {
        self.0.to_string().parse::<f64>().unwrap_or(0.0) / C_RATIO_SCALE as f64
    }
}

impl fmt::Display for CRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (whole, frac) = self.0.div_rem(U256::from(C_RATIO_SCALE));
        let frac = u64::try_from(frac).unwrap_or_default();
        write!(f, "{}.{:0width$}", whole, frac, width = C_RATIO_DECIMALS as usize)
    }
}

pub fn collateral_value(collateral_units: U256, snx_price: U256) -> U256 {
    collateral_units.saturating_mul(snx_price)
}

/// Debt-share price carries 27 decimals; the division floors.
pub fn debt_value(debt_share_units: U256, debt_share_price: U256) -> U256 {
    debt_share_units.saturating_mul(debt_share_price) / RAY
}

/// `round(collateral_value / debt_value / 10^18, 5)` with round-half-up,
/// computed exactly in integers. Zero debt yields a zero ratio.
pub fn c_ratio(collateral_value: U256, debt_value: U256) -> CRatio {
    if debt_value.is_zero() {
        return CRatio::ZERO;
    }

    let numerator = collateral_value.saturating_mul(U256::from(C_RATIO_SCALE));
    let divisor = debt_value.saturating_mul(WAD);
    let (quotient, remainder) = numerator.div_rem(divisor);

    // remainder >= divisor / 2, written without losing the odd bit
    let round_up = remainder >= divisor - remainder;
    CRatio(if round_up { quotient + U256::from(1) } else { quotient })
}
