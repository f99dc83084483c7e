use crate::chain::{AlloyRpcClient, ChainGateway};
use crate::contracts::{ContractRegistry, EtherscanAbiSource, Synthetix};
use crate::data_sync::{
    config::{ChainConfig, SyncConfig},
    registrar::AccountRegistrar,
    scheduler::{CycleReport, SchedulerIntervals, SyncScheduler},
};
use crate::logic::source::StakingSource;
use crate::store::AccountStore;
use crate::utils::Chain;
use eyre::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Runs one [`SyncScheduler`] per configured chain and owns the registration
/// entry point that feeds them.
///
/// Schedulers share nothing but the store and static configuration. When one
/// of them stops with an error the service reports it and leaves restarting
/// to process supervision.
pub struct SyncService {
    config: SyncConfig,
    registrar: AccountRegistrar,
    schedulers: Vec<SyncScheduler>,
    reports: HashMap<Chain, watch::Receiver<Option<CycleReport>>>,
    tasks: JoinSet<(Chain, Result<()>)>,
}

impl SyncService {
    /// Wires schedulers over already-built protocol sources.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn AccountStore>,
        sources: Vec<(Chain, Arc<dyn StakingSource>)>,
    ) -> Result<Self> {
        let chains: Vec<Chain> = sources.iter().map(|(chain, _)| *chain).collect();
        info!("Initializing SyncService for chains {:?}", chains);

        let (registrar, mut queues) = AccountRegistrar::new(Arc::clone(&store), &chains);
        let intervals = SchedulerIntervals::from_config(&config);

        let mut schedulers = Vec::with_capacity(sources.len());
        let mut reports = HashMap::new();
        for (chain, source) in sources {
            let queue = queues.remove(&chain).ok_or_else(|| eyre::eyre!("chain {} configured twice", chain))?;
            let scheduler =
                SyncScheduler::new(chain, source, Arc::clone(&store), queue, intervals, config.period_length_secs);
            reports.insert(chain, scheduler.subscribe());
            schedulers.push(scheduler);
        }

        Ok(Self { config, registrar, schedulers, reports, tasks: JoinSet::new() })
    }

    /// Connects every configured chain to its RPC endpoint and the ABI service.
    pub fn connect(config: SyncConfig, store: Arc<dyn AccountStore>) -> Result<Self> {
        config.validate()?;
        let sources = config
            .chains
            .iter()
            .map(|chain_config| Ok((chain_config.chain, connect_chain(&config, chain_config)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(config, store, sources)
    }

    /// Spawns all schedulers. Each one initializes on its first tick.
    pub fn start(&mut self) -> Result<()> {
        if self.schedulers.is_empty() {
            return Err(eyre::eyre!("SyncService already started or has no chains"));
        }
        info!("Starting SyncService");

        for scheduler in self.schedulers.drain(..) {
            let chain = scheduler.chain();
            self.tasks.spawn(async move { (chain, scheduler.run().await) });
        }
        Ok(())
    }

    /// Waits until the first scheduler stops and returns why.
    pub async fn wait(&mut self) -> Result<()> {
        match self.tasks.join_next().await {
            Some(Ok((chain, Ok(())))) => Err(eyre::eyre!("{} scheduler exited", chain)),
            Some(Ok((chain, Err(e)))) => {
                error!("{} scheduler failed: {:?}", chain, e);
                Err(e)
            }
            Some(Err(e)) => Err(eyre::eyre!("scheduler task panicked: {}", e)),
            None => Err(eyre::eyre!("SyncService is not running")),
        }
    }

    /// Stop all schedulers
    pub async fn stop(&mut self) {
        info!("Stopping SyncService");
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    warn!("Scheduler task error during shutdown: {}", e);
                }
            }
        }
        info!("SyncService stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn registrar(&self) -> AccountRegistrar {
        self.registrar.clone()
    }

    /// Cycle boundaries of `chain`'s scheduler.
    pub fn reports(&self, chain: Chain) -> Option<watch::Receiver<Option<CycleReport>>> {
        self.reports.get(&chain).cloned()
    }

    pub fn get_config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncService dropped while running, aborting schedulers");
        }
    }
}

fn connect_chain(config: &SyncConfig, chain_config: &ChainConfig) -> Result<Arc<dyn StakingSource>> {
    let chain = chain_config.chain;
    let rpc = Arc::new(AlloyRpcClient::new_http(chain_config.rpc_url()?));
    let gateway = ChainGateway::new(chain, rpc, config.gateway_max_parallel_calls, config.startup_policy());
    let abi_source = Arc::new(EtherscanAbiSource::new(
        config.abi_api_url.clone(),
        config.abi_api_key.clone(),
        config.http_timeout(),
        config.abi_fetch_attempts,
    )?);
    let registry = ContractRegistry::new(chain, gateway, abi_source, chain_config.resolver_address()?)?;
    Ok(Arc::new(Synthetix::new(registry, config.polling_policy())))
}

/// Builder for SyncService to make creation more ergonomic
pub struct SyncServiceBuilder {
    config: Option<SyncConfig>,
    store: Option<Arc<dyn AccountStore>>,
    sources: Vec<(Chain, Arc<dyn StakingSource>)>,
}

impl SyncServiceBuilder {
    pub fn new() -> Self {
        Self { config: None, store: None, sources: Vec::new() }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `source` for `chain` instead of connecting to the configured endpoint.
    pub fn with_source(mut self, chain: Chain, source: Arc<dyn StakingSource>) -> Self {
        self.sources.push((chain, source));
        self
    }

    pub fn build(self) -> Result<SyncService> {
        let config = match self.config {
            Some(config) => config,
            None => SyncConfig::from_env()?,
        };
        let store = self.store.ok_or_else(|| eyre::eyre!("SyncServiceBuilder needs an account store"))?;

        if self.sources.is_empty() {
            SyncService::connect(config, store)
        } else {
            SyncService::new(config, store, self.sources)
        }
    }
}

impl Default for SyncServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAccountStore;

    #[test]
    fn test_connect_builds_every_configured_chain() {
        let chains = [Chain::Ethereum, Chain::Optimism]
            .into_iter()
            .map(|chain| ChainConfig {
                chain,
                rpc_url: format!("https://{}.example", chain.provider_name()),
                address_resolver: "0x823bE81bbF96BEc0e25CA13170F5AaCb5B79ba83".to_string(),
                issuance_ratio: 4.0,
            })
            .collect();
        let config = SyncConfig { chains, ..Default::default() };

        let service = SyncService::connect(config, Arc::new(InMemoryAccountStore::new())).unwrap();
        assert!(!service.is_running());
        assert!(service.reports(Chain::Ethereum).is_some());
        assert!(service.reports(Chain::Optimism).is_some());
    }

    #[test]
    fn test_builder_requires_store() {
        let result = SyncServiceBuilder::new().with_config(SyncConfig::default()).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_without_chains_fails() {
        let mut service = SyncServiceBuilder::new()
            .with_config(SyncConfig::default())
            .with_store(Arc::new(InMemoryAccountStore::new()))
            .build()
            .unwrap();
        assert!(service.start().is_err());
        assert!(service.wait().await.is_err());
    }
}
