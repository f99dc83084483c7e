use crate::chain::RetryPolicy;
use crate::contracts::abi_source::{DEFAULT_ABI_FETCH_ATTEMPTS, ETHERSCAN_V2_URL};
use crate::utils::Chain;
use crate::utils::config_loader::{ConfigSectionLoader, LoadConfigError, load_from_file};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use strum::IntoEnumIterator;
use url::Url;

#[derive(Clone, Deserialize, Debug)]
pub struct SyncConfigRoot {
    pub sync: SyncConfig,
}

/// One chain deployment to keep in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    pub chain: Chain,
    /// HTTP JSON-RPC endpoint
    pub rpc_url: String,
    /// The protocol's on-chain address resolver
    pub address_resolver: String,
    /// Target c-ratio on this chain, for collaborators that compare against it
    pub issuance_ratio: f64,
}

impl ChainConfig {
    pub fn resolver_address(&self) -> eyre::Result<Address> {
        Address::from_str(&self.address_resolver)
            .map_err(|e| eyre::eyre!("Invalid address_resolver for {}: {}", self.chain, e))
    }

    pub fn rpc_url(&self) -> eyre::Result<Url> {
        Url::parse(&self.rpc_url).map_err(|e| eyre::eyre!("Invalid rpc_url for {}: {}", self.chain, e))
    }
}

/// Configuration for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Maximum in-flight RPC requests per chain endpoint
    pub gateway_max_parallel_calls: usize,
    /// Scheduler tick in seconds
    pub tick_interval_secs: u64,
    /// How often contracts are re-resolved, in seconds
    pub contract_check_interval_secs: u64,
    /// How often event logs are fetched, in seconds
    pub events_check_interval_secs: u64,
    /// Fee period length in seconds
    pub period_length_secs: u64,
    /// Retry deadline for reads made while (re)initializing
    pub startup_retry_deadline_secs: u64,
    /// Retry deadline for reads made while polling
    pub polling_retry_deadline_secs: u64,
    /// Cap on the exponential backoff between RPC retries
    pub max_backoff_secs: u64,
    /// Attempts against the ABI verification service per contract
    pub abi_fetch_attempts: u32,
    pub abi_api_url: String,
    pub abi_api_key: String,
    /// Timeout for ABI service requests in seconds
    pub http_timeout_secs: u64,
    pub chains: Vec<ChainConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            gateway_max_parallel_calls: 10,
            tick_interval_secs: 5,
            contract_check_interval_secs: 24 * 60 * 60,
            events_check_interval_secs: 10 * 60,
            period_length_secs: 7 * 24 * 60 * 60,
            startup_retry_deadline_secs: 6 * 60 * 60,
            polling_retry_deadline_secs: 10 * 60,
            max_backoff_secs: 60,
            abi_fetch_attempts: DEFAULT_ABI_FETCH_ATTEMPTS,
            abi_api_url: ETHERSCAN_V2_URL.to_string(),
            abi_api_key: String::new(),
            http_timeout_secs: 10,
            chains: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// A chain is enabled when `<CHAIN>_ADDRESS_RESOLVER_ADDRESS` is set. Its
    /// endpoint is `<CHAIN>_RPC_URL` or, failing that, the hosted provider URL
    /// built from `ALCHEMY_KEY`.
    pub fn from_env() -> eyre::Result<Self> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("ETHERSCAN_KEY") {
            config.abi_api_key = key;
        }

        if let Ok(api_url) = std::env::var("ABI_API_URL") {
            let _url = Url::parse(&api_url).map_err(|e| eyre::eyre!("Invalid ABI_API_URL: {}", e))?;
            config.abi_api_url = api_url;
        }

        if let Some(value) = env_parse("GATEWAY_MAX_PARALLEL_CALLS")? {
            config.gateway_max_parallel_calls = value;
        }
        if let Some(value) = env_parse("TICK_INTERVAL_SECS")? {
            config.tick_interval_secs = value;
        }
        if let Some(value) = env_parse("CONTRACT_CHECK_INTERVAL_SECS")? {
            config.contract_check_interval_secs = value;
        }
        if let Some(value) = env_parse("EVENTS_CHECK_INTERVAL_SECS")? {
            config.events_check_interval_secs = value;
        }
        if let Some(value) = env_parse("STARTUP_RETRY_DEADLINE_SECS")? {
            config.startup_retry_deadline_secs = value;
        }
        if let Some(value) = env_parse("POLLING_RETRY_DEADLINE_SECS")? {
            config.polling_retry_deadline_secs = value;
        }
        if let Some(value) = env_parse("HTTP_TIMEOUT_SECS")? {
            config.http_timeout_secs = value;
        }
        if let Some(value) = env_parse("PERIOD_LENGTH_SECS")? {
            config.period_length_secs = value;
        }
        if let Some(value) = env_parse("MAX_BACKOFF_SECS")? {
            config.max_backoff_secs = value;
        }
        if let Some(value) = env_parse("ABI_FETCH_ATTEMPTS")? {
            config.abi_fetch_attempts = value;
        }

        let alchemy_key = std::env::var("ALCHEMY_KEY").ok();
        for chain in Chain::iter() {
            let prefix = chain.to_string().to_uppercase();
            let Ok(address_resolver) = std::env::var(format!("{prefix}_ADDRESS_RESOLVER_ADDRESS")) else {
                continue;
            };

            let rpc_url = match (std::env::var(format!("{prefix}_RPC_URL")), &alchemy_key) {
                (Ok(url), _) => url,
                (Err(_), Some(key)) => format!("https://{}-mainnet.g.alchemy.com/v2/{}", chain.provider_name(), key),
                (Err(_), None) => eyre::bail!("{prefix}_RPC_URL or ALCHEMY_KEY must be set for {chain}"),
            };
            let issuance_ratio = env_parse(&format!("{prefix}_ISSUANCE_RATIO"))?.unwrap_or_default();

            config.chains.push(ChainConfig { chain, rpc_url, address_resolver, issuance_ratio });
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects configs the engine cannot run with.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.gateway_max_parallel_calls == 0 {
            eyre::bail!("gateway_max_parallel_calls must be at least 1");
        }
        if self.tick_interval_secs == 0 {
            eyre::bail!("tick_interval_secs must be at least 1");
        }
        if self.period_length_secs == 0 {
            eyre::bail!("period_length_secs must be at least 1");
        }
        Url::parse(&self.abi_api_url).map_err(|e| eyre::eyre!("Invalid abi_api_url: {}", e))?;

        for (i, chain_config) in self.chains.iter().enumerate() {
            chain_config.rpc_url()?;
            chain_config.resolver_address()?;
            if self.chains[..i].iter().any(|other| other.chain == chain_config.chain) {
                eyre::bail!("chain {} is configured twice", chain_config.chain);
            }
        }
        Ok(())
    }

    pub fn chain(&self, chain: Chain) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == chain)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn contract_check_interval(&self) -> Duration {
        Duration::from_secs(self.contract_check_interval_secs)
    }

    pub fn events_check_interval(&self) -> Duration {
        Duration::from_secs(self.events_check_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn startup_policy(&self) -> RetryPolicy {
        RetryPolicy::startup()
            .with_deadline(Duration::from_secs(self.startup_retry_deadline_secs))
            .with_max_backoff(Duration::from_secs(self.max_backoff_secs))
    }

    pub fn polling_policy(&self) -> RetryPolicy {
        RetryPolicy::polling()
            .with_deadline(Duration::from_secs(self.polling_retry_deadline_secs))
            .with_max_backoff(Duration::from_secs(self.max_backoff_secs))
    }
}

fn env_parse<T>(name: &str) -> eyre::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|e| eyre::eyre!("Invalid {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}

#[async_trait]
impl ConfigSectionLoader for SyncConfig {
    type SectionType = SyncConfig;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: SyncConfigRoot = load_from_file(file_name).await?;
        root.sync.validate().map_err(|e| LoadConfigError::ConfigError(e.to_string()))?;
        Ok(root.sync)
    }
}
