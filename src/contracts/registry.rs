use crate::chain::ChainGateway;
use crate::contracts::abi_source::AbiSource;
use crate::contracts::descriptor::ContractDescriptor;
use crate::contracts::names::ContractName;
use crate::error::{Result, SyncError};
use crate::utils::{Chain, FanOut, gather_partitioned};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use alloy_rpc_types_eth::BlockId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const ADDRESS_RESOLVER_ABI: &[&str] = &["function getAddress(bytes32 name) view returns (address)"];
const PROXY_ABI: &[&str] = &["function target() view returns (address)"];

pub type InstallReport = FanOut<ContractName, Arc<ContractDescriptor>, SyncError>;

/// Resolves logical contract names to installed descriptors and notices
/// when the resolver starts pointing somewhere else.
///
/// Installing a given name is single-writer: `install` and
/// `check_for_updates` both serialize on a per-name lock, so two concurrent
/// re-resolutions cannot interleave on the same slot.
pub struct ContractRegistry {
    chain: Chain,
    gateway: ChainGateway,
    abi_source: Arc<dyn AbiSource>,
    resolver: ContractDescriptor,
    installed: DashMap<ContractName, Arc<ContractDescriptor>>,
    install_locks: DashMap<ContractName, Arc<Mutex<()>>>,
}

impl ContractRegistry {
    pub fn new(
        chain: Chain,
        gateway: ChainGateway,
        abi_source: Arc<dyn AbiSource>,
        resolver_address: Address,
    ) -> Result<Self> {
        let abi = JsonAbi::parse(ADDRESS_RESOLVER_ABI.iter().copied())
            .map_err(|e| SyncError::Config(format!("resolver ABI: {e}")))?;

        Ok(Self {
            chain,
            gateway,
            abi_source,
            resolver: ContractDescriptor::new("AddressResolver", resolver_address, resolver_address, abi),
            installed: DashMap::new(),
            install_locks: DashMap::new(),
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn gateway(&self) -> &ChainGateway {
        &self.gateway
    }

    /// Installed descriptor for `name`. Asking for a name that was never
    /// installed is a wiring bug and surfaces as a fatal error.
    pub fn get(&self, name: ContractName) -> Result<Arc<ContractDescriptor>> {
        self.installed
            .get(&name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SyncError::ContractNotInstalled(name.to_string()))
    }

    pub fn installed_names(&self) -> Vec<ContractName> {
        let mut names: Vec<_> = self.installed.iter().map(|entry| *entry.key()).collect();
        names.sort();
        names
    }

    /// Resolves and installs every name concurrently. A failing name does not
    /// stop the others; failures come back in the report.
    pub async fn install(&self, names: &[ContractName]) -> InstallReport {
        let jobs = names.iter().map(|&name| (name, self.install_locked(name, None)));
        let report = gather_partitioned("contract install", jobs).await;
        info!(
            "{}: installed {}/{} contracts",
            self.chain,
            report.succeeded.len(),
            report.total()
        );
        report
    }

    /// Re-resolves every installed name and reinstalls the ones whose address
    /// moved. Returns `true` if any contract changed.
    pub async fn check_for_updates(&self) -> Result<bool> {
        let names = self.installed_names();
        let jobs = names.iter().map(|&name| (name, self.refresh(name)));
        let report = gather_partitioned("contract update check", jobs).await;

        if !report.is_clean() {
            return Err(SyncError::ContractInstall(
                report.failed.into_iter().map(|(name, e)| (name.to_string(), e)).collect(),
            ));
        }

        let changed: Vec<_> = report.succeeded.iter().filter(|(_, changed)| *changed).map(|(name, _)| *name).collect();
        if !changed.is_empty() {
            info!("{}: contracts redeployed: {:?}", self.chain, changed);
        }
        Ok(!changed.is_empty())
    }

    pub async fn resolve_address(&self, name: ContractName) -> Result<Address> {
        let key = DynSolValue::FixedBytes(name.resolver_key(), 32);
        let out = self.gateway.call(&self.resolver, "getAddress", BlockId::latest(), &[key]).await?;
        first_address(&out, &format!("resolver.getAddress({name})"))
    }

    async fn refresh(&self, name: ContractName) -> Result<bool> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let current = self.get(name)?.address;
        let resolved = self.resolve_address(name).await?;
        if resolved == current {
            return Ok(false);
        }

        info!("{}: {} moved {} -> {}", self.chain, name, current, resolved);
        self.install_unlocked(name, Some(resolved)).await?;
        Ok(true)
    }

    async fn install_locked(&self, name: ContractName, address: Option<Address>) -> Result<Arc<ContractDescriptor>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.install_unlocked(name, address).await
    }

    async fn install_unlocked(&self, name: ContractName, address: Option<Address>) -> Result<Arc<ContractDescriptor>> {
        let address = match address {
            Some(address) => address,
            None => self.resolve_address(name).await?,
        };

        let implementation = if name.is_proxy() { self.proxy_target(name, address).await? } else { address };
        let abi = self.abi_source.fetch_abi(self.chain, implementation).await?;

        let descriptor = Arc::new(ContractDescriptor::new(name.to_string(), address, implementation, abi));
        self.installed.insert(name, Arc::clone(&descriptor));
        debug!("{}: installed {} at {} (implementation {})", self.chain, name, address, implementation);
        Ok(descriptor)
    }

    async fn proxy_target(&self, name: ContractName, proxy_address: Address) -> Result<Address> {
        let abi = JsonAbi::parse(PROXY_ABI.iter().copied()).map_err(|e| SyncError::Config(format!("proxy ABI: {e}")))?;
        let proxy = ContractDescriptor::new(name.to_string(), proxy_address, proxy_address, abi);
        let out = self.gateway.call(&proxy, "target", BlockId::latest(), &[]).await?;
        first_address(&out, &format!("{name}.target()"))
    }

    fn lock_for(&self, name: ContractName) -> Arc<Mutex<()>> {
        Arc::clone(self.install_locks.entry(name).or_default().value())
    }
}

fn first_address(out: &[DynSolValue], context: &str) -> Result<Address> {
    out.first().and_then(DynSolValue::as_address).ok_or_else(|| SyncError::unexpected(context))
}
