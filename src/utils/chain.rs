use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Chains the staking protocol is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Display, AsRefStr, EnumIter, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Chain {
    #[strum(to_string = "ethereum", serialize = "eth", serialize = "e")]
    Ethereum,
    #[strum(to_string = "optimism", serialize = "op", serialize = "o")]
    Optimism,
}

impl Chain {
    pub const fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Optimism => 10,
        }
    }

    /// Subdomain prefix used by hosted RPC providers.
    pub const fn provider_name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "eth",
            Chain::Optimism => "opt",
        }
    }
}
