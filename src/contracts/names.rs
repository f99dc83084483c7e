use alloy_primitives::B256;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Logical contract names registered in the protocol's address resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr, EnumIter, EnumString)]
pub enum ContractName {
    ExchangeRates,
    Synthetix,
    Liquidator,
    SynthetixDebtShare,
    ProxyFeePool,
    #[strum(serialize = "ProxyERC20")]
    ProxyErc20,
    RewardEscrowV2,
    #[strum(serialize = "ext:AggregatorDebtRatio")]
    AggregatorDebtRatio,
}

impl ContractName {
    /// Proxies forward to an upgradeable implementation reachable via `target()`.
    pub fn is_proxy(&self) -> bool {
        self.as_ref().starts_with("Proxy")
    }

    /// The resolver key: the name's bytes, right-padded with zeros to 32 bytes.
    pub fn resolver_key(&self) -> B256 {
        str_to_bytes32(self.as_ref())
    }
}

/// Protocol events the sync engine follows, keyed by their ABI names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr, EnumIter)]
pub enum WatchedEvent {
    Mint,
    Burn,
    Transfer,
    FeesClaimed,
    #[strum(serialize = "AccountFlaggedForLiquidation")]
    FlaggedForLiquidation,
    #[strum(serialize = "AccountRemovedFromLiquidation")]
    RemovedFromLiquidation,
}

impl WatchedEvent {
    /// The contract whose logs carry this event.
    pub const fn contract(&self) -> ContractName {
        match self {
            WatchedEvent::Mint | WatchedEvent::Burn => ContractName::SynthetixDebtShare,
            WatchedEvent::Transfer => ContractName::ProxyErc20,
            WatchedEvent::FeesClaimed => ContractName::ProxyFeePool,
            WatchedEvent::FlaggedForLiquidation | WatchedEvent::RemovedFromLiquidation => ContractName::Liquidator,
        }
    }
}

/// Currency key of the collateral token in the exchange rates contract.
pub const SNX_CURRENCY_KEY: &str = "SNX";

pub fn str_to_bytes32(text: &str) -> B256 {
    let mut word = [0u8; 32];
    let bytes = text.as_bytes();
    let len = bytes.len().min(32);
    word[..len].copy_from_slice(&bytes[..len]);
    B256::from(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_names_round_trip_through_resolver_spelling() {
        assert_eq!(ContractName::ProxyErc20.to_string(), "ProxyERC20");
        assert_eq!(ContractName::AggregatorDebtRatio.as_ref(), "ext:AggregatorDebtRatio");
        assert_eq!(ContractName::from_str("ProxyFeePool").unwrap(), ContractName::ProxyFeePool);
        assert_eq!(ContractName::iter().count(), 8);
    }

    #[test]
    fn test_proxy_detection() {
        let proxies: Vec<_> = ContractName::iter().filter(ContractName::is_proxy).collect();
        assert_eq!(proxies, vec![ContractName::ProxyFeePool, ContractName::ProxyErc20]);
    }

    #[test]
    fn test_bytes32_encoding() {
        assert_eq!(
            str_to_bytes32(SNX_CURRENCY_KEY),
            b256!("534e580000000000000000000000000000000000000000000000000000000000")
        );
        assert_eq!(ContractName::Synthetix.resolver_key()[..9], *b"Synthetix");
    }

    #[test]
    fn test_every_watched_event_has_a_contract() {
        for event in WatchedEvent::iter() {
            assert!(ContractName::iter().any(|c| c == event.contract()));
        }
        assert_eq!(WatchedEvent::FlaggedForLiquidation.as_ref(), "AccountFlaggedForLiquidation");
    }
}
