use crate::chain::{ChainGateway, RetryPolicy};
use crate::contracts::events::decode_into;
use crate::contracts::names::{ContractName, SNX_CURRENCY_KEY, WatchedEvent, str_to_bytes32};
use crate::contracts::registry::ContractRegistry;
use crate::error::{Result, SyncError};
use crate::logic::source::{ReadPhase, StakingSource};
use crate::logic::types::{AccountSnapshot, EventBatch};
use crate::utils::Chain;
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::{BlockId, Filter};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::IntoEnumIterator;
use tracing::{debug, info};

/// The protocol as one chain deploys it: installed contracts plus the typed
/// reads the sync engine needs from them.
///
/// Contract resolution always uses the registry's own (patient) gateway.
/// Protocol reads use the startup gateway while a (re)initialization is in
/// progress and the steady gateway otherwise; both share one request gate.
pub struct Synthetix {
    registry: ContractRegistry,
    startup: ChainGateway,
    steady: ChainGateway,
    in_startup: AtomicBool,
}

impl Synthetix {
    pub fn new(registry: ContractRegistry, steady_policy: RetryPolicy) -> Self {
        let startup = registry.gateway().clone();
        let steady = startup.with_policy(steady_policy);
        Self { registry, startup, steady, in_startup: AtomicBool::new(true) }
    }

    pub fn chain(&self) -> Chain {
        self.registry.chain()
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Gateway matching the current read phase.
    pub fn gateway(&self) -> &ChainGateway {
        if self.in_startup.load(Ordering::Relaxed) { &self.startup } else { &self.steady }
    }

    async fn call(
        &self,
        name: ContractName,
        function: &str,
        block: BlockId,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>> {
        let contract = self.registry.get(name)?;
        self.gateway().call(&contract, function, block, args).await
    }

    /// Output `index` of `function` as an unsigned integer.
    async fn call_uint(
        &self,
        name: ContractName,
        function: &str,
        index: usize,
        block: BlockId,
        args: &[DynSolValue],
    ) -> Result<U256> {
        let out = self.call(name, function, block, args).await?;
        out.get(index)
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
            .ok_or_else(|| SyncError::unexpected(format!("{name}.{function}[{index}]")))
    }

    pub async fn snx_price(&self) -> Result<U256> {
        let key = DynSolValue::FixedBytes(str_to_bytes32(SNX_CURRENCY_KEY), 32);
        self.call_uint(ContractName::ExchangeRates, "rateAndInvalid", 0, BlockId::latest(), &[key]).await
    }

    /// The debt ratio feed answers a signed value; a negative answer is a
    /// broken feed, not a price.
    pub async fn debt_share_price(&self) -> Result<U256> {
        let name = ContractName::AggregatorDebtRatio;
        let out = self.call(name, "latestAnswer", BlockId::latest(), &[]).await?;
        match out.first() {
            Some(DynSolValue::Int(answer, _)) if !answer.is_negative() => Ok(answer.into_raw()),
            Some(DynSolValue::Uint(answer, _)) => Ok(*answer),
            _ => Err(SyncError::unexpected(format!("{name}.latestAnswer"))),
        }
    }

    async fn collateral(&self, account: Address, block: BlockId) -> Result<U256> {
        self.call_uint(ContractName::Synthetix, "collateral", 0, block, &[DynSolValue::Address(account)]).await
    }

    async fn debt_shares(&self, account: Address, block: BlockId) -> Result<U256> {
        self.call_uint(ContractName::SynthetixDebtShare, "balanceOf", 0, block, &[DynSolValue::Address(account)])
            .await
    }

    /// Second output of `feesAvailable` is the claimable SNX reward.
    async fn claimable_rewards(&self, account: Address, block: BlockId) -> Result<U256> {
        self.call_uint(ContractName::ProxyFeePool, "feesAvailable", 1, block, &[DynSolValue::Address(account)])
            .await
    }

    async fn liquidation_deadline(&self, account: Address, block: BlockId) -> Result<Option<u64>> {
        let deadline = self
            .call_uint(
                ContractName::Liquidator,
                "getLiquidationDeadlineForAccount",
                0,
                block,
                &[DynSolValue::Address(account)],
            )
            .await?;
        if deadline.is_zero() {
            return Ok(None);
        }
        u64::try_from(deadline)
            .map(Some)
            .map_err(|_| SyncError::unexpected(format!("liquidation deadline {deadline} for {account}")))
    }

    async fn watched_logs(&self, event: WatchedEvent, from_block: u64, to_block: u64) -> Result<EventBatch> {
        let contract = self.registry.get(event.contract())?;
        let abi_event = contract.event(event.as_ref())?;
        let filter = Filter::new()
            .address(contract.address)
            .event_signature(abi_event.selector())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.gateway().logs(&filter).await?;
        let mut batch = EventBatch::new(from_block, to_block);
        decode_into(&mut batch, event, abi_event, &logs);
        debug!("{}: {} {} logs in [{}, {}]", self.chain(), logs.len(), event, from_block, to_block);
        Ok(batch)
    }
}

#[async_trait]
impl StakingSource for Synthetix {
    fn set_read_phase(&self, phase: ReadPhase) {
        self.in_startup.store(phase == ReadPhase::Startup, Ordering::Relaxed);
    }

    async fn install_contracts(&self) -> Result<()> {
        let names: Vec<_> = ContractName::iter().collect();
        let report = self.registry.install(&names).await;
        if !report.is_clean() {
            return Err(SyncError::ContractInstall(
                report.failed.into_iter().map(|(name, e)| (name.to_string(), e)).collect(),
            ));
        }
        info!("{}: all {} contracts installed", self.chain(), names.len());
        Ok(())
    }

    async fn check_contract_updates(&self) -> Result<bool> {
        self.registry.check_for_updates().await
    }

    async fn block_number(&self) -> Result<u64> {
        self.gateway().block_number().await
    }

    async fn prices(&self) -> Result<(U256, U256)> {
        tokio::try_join!(self.snx_price(), self.debt_share_price())
    }

    async fn current_period_start(&self) -> Result<u64> {
        let name = ContractName::ProxyFeePool;
        let current_period = [DynSolValue::Uint(U256::ZERO, 256)];
        let start = self.call_uint(name, "recentFeePeriods", 2, BlockId::latest(), &current_period).await?;
        u64::try_from(start).map_err(|_| SyncError::unexpected(format!("{name}.recentFeePeriods startTime {start}")))
    }

    async fn load_account(&self, address: Address, block: BlockId) -> Result<AccountSnapshot> {
        let (collateral_units, debt_share_units, claimable_rewards, liquidation_deadline) = tokio::try_join!(
            self.collateral(address, block),
            self.debt_shares(address, block),
            self.claimable_rewards(address, block),
            self.liquidation_deadline(address, block),
        )?;
        Ok(AccountSnapshot { collateral_units, debt_share_units, claimable_rewards, liquidation_deadline })
    }

    async fn fetch_events(&self, from_block: u64, to_block: u64) -> Result<EventBatch> {
        let jobs = WatchedEvent::iter().map(|event| self.watched_logs(event, from_block, to_block));
        let parts = try_join_all(jobs).await?;

        let mut batch = EventBatch::new(from_block, to_block);
        for part in parts {
            batch.transfers.extend(part.transfers);
            batch.events.extend(part.events);
        }
        Ok(batch)
    }

    fn vesting_contract(&self) -> Result<Address> {
        Ok(self.registry.get(ContractName::RewardEscrowV2)?.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RpcClient;
    use crate::contracts::abi_source::AbiSource;
    use crate::logic::types::{EventKind, EventPosition};
    use alloy_json_abi::JsonAbi;
    use alloy_primitives::{B256, Bytes, FixedBytes, I256, LogData};
    use alloy_rpc_types_eth::Log;
    use alloy_transport::{TransportError, TransportErrorKind};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const RESOLVER: Address = Address::repeat_byte(0xAA);
    const ALICE: Address = Address::repeat_byte(0xA1);
    const BOB: Address = Address::repeat_byte(0xB0);

    const PROTOCOL_ABI: &[&str] = &[
        "function rateAndInvalid(bytes32 currencyKey) view returns (uint256 rate, bool isInvalid)",
        "function latestAnswer() view returns (int256)",
        "function recentFeePeriods(uint256 index) view returns (uint64 feePeriodId, uint64 unused, uint64 startTime, uint256 feesToDistribute, uint256 feesClaimed, uint256 rewardsToDistribute, uint256 rewardsClaimed)",
        "function feesAvailable(address account) view returns (uint256, uint256)",
        "function collateral(address account) view returns (uint256)",
        "function balanceOf(address account) view returns (uint256)",
        "function getLiquidationDeadlineForAccount(address account) view returns (uint256)",
        "event Transfer(address indexed from, address indexed to, uint256 value)",
        "event Mint(address indexed account, uint256 amount)",
        "event Burn(address indexed account, uint256 amount)",
        "event FeesClaimed(address account, uint256 sUSDAmount, uint256 snxRewards)",
        "event AccountFlaggedForLiquidation(address indexed account, uint256 deadline)",
        "event AccountRemovedFromLiquidation(address indexed account, uint256 time)",
    ];

    fn protocol_abi() -> JsonAbi {
        JsonAbi::parse(PROTOCOL_ABI.iter().copied()).unwrap()
    }

    fn selector(function: &str) -> FixedBytes<4> {
        protocol_abi().function(function).unwrap()[0].selector()
    }

    fn address_of(name: ContractName) -> Address {
        Address::with_last_byte(ContractName::iter().position(|n| n == name).unwrap() as u8 + 1)
    }

    fn uint(value: u64) -> DynSolValue {
        DynSolValue::Uint(U256::from(value), 256)
    }

    /// Deployment where every contract answers with canned outputs keyed by
    /// `(address, selector)`, and every proxy forwards to one shared implementation.
    #[derive(Default)]
    struct ScriptedChain {
        answers: Mutex<HashMap<(Address, FixedBytes<4>), Bytes>>,
        logs: Mutex<Vec<Log>>,
    }

    impl ScriptedChain {
        fn answer(&self, name: ContractName, function: &str, outputs: Vec<DynSolValue>) {
            let encoded = DynSolValue::Tuple(outputs).abi_encode_params();
            self.answers.lock().unwrap().insert((address_of(name), selector(function)), encoded.into());
        }

        fn emit(
            &self,
            name: ContractName,
            event: &str,
            topics: Vec<B256>,
            data: Vec<u8>,
            block_number: u64,
            log_index: u64,
        ) {
            let signature = protocol_abi().event(event).unwrap()[0].selector();
            let topics = std::iter::once(signature).chain(topics).collect();
            self.logs.lock().unwrap().push(Log {
                inner: alloy_primitives::Log {
                    address: address_of(name),
                    data: LogData::new_unchecked(topics, data.into()),
                },
                block_number: Some(block_number),
                log_index: Some(log_index),
                ..Default::default()
            });
        }
    }

    #[async_trait]
    impl RpcClient for ScriptedChain {
        async fn block_number(&self) -> std::result::Result<u64, TransportError> {
            Ok(1_000)
        }

        async fn call(&self, to: Address, input: Bytes, _block: BlockId) -> std::result::Result<Bytes, TransportError> {
            if to == RESOLVER {
                let key = B256::from_slice(&input[4..36]);
                let name = ContractName::iter()
                    .find(|name| name.resolver_key() == key)
                    .ok_or_else(|| TransportErrorKind::custom_str("execution reverted"))?;
                return Ok(DynSolValue::Address(address_of(name)).abi_encode().into());
            }

            let called = FixedBytes::<4>::from_slice(&input[..4]);
            if called[..] == alloy_primitives::keccak256("target()")[..4] {
                return Ok(DynSolValue::Address(Address::repeat_byte(0x77)).abi_encode().into());
            }

            self.answers
                .lock()
                .unwrap()
                .get(&(to, called))
                .cloned()
                .ok_or_else(|| TransportErrorKind::custom_str("execution reverted"))
        }

        async fn logs(&self, filter: &Filter) -> std::result::Result<Vec<Log>, TransportError> {
            let logs = self.logs.lock().unwrap();
            Ok(logs
                .iter()
                .filter(|log| filter.address.matches(&log.inner.address))
                .filter(|log| log.inner.data.topics().first().is_some_and(|t0| filter.topics[0].matches(t0)))
                .cloned()
                .collect())
        }
    }

    struct StaticAbis;

    #[async_trait]
    impl AbiSource for StaticAbis {
        async fn fetch_abi(&self, _chain: Chain, _address: Address) -> Result<JsonAbi> {
            Ok(protocol_abi())
        }
    }

    async fn installed(chain: Arc<ScriptedChain>) -> Synthetix {
        let gateway = ChainGateway::new(Chain::Optimism, chain, 4, RetryPolicy::startup());
        let registry = ContractRegistry::new(Chain::Optimism, gateway, Arc::new(StaticAbis), RESOLVER).unwrap();
        let synthetix = Synthetix::new(registry, RetryPolicy::polling().with_deadline(Duration::from_secs(30)));
        synthetix.install_contracts().await.unwrap();
        synthetix
    }

    #[tokio::test]
    async fn test_read_phase_switches_gateway() {
        let synthetix = installed(Arc::new(ScriptedChain::default())).await;
        assert_eq!(synthetix.gateway().policy().deadline, RetryPolicy::startup().deadline);

        synthetix.set_read_phase(ReadPhase::Steady);
        assert_eq!(synthetix.gateway().policy().deadline, Duration::from_secs(30));

        synthetix.set_read_phase(ReadPhase::Startup);
        assert_eq!(synthetix.gateway().policy().deadline, RetryPolicy::startup().deadline);
    }

    #[tokio::test]
    async fn test_prices_and_period() {
        let chain = Arc::new(ScriptedChain::default());
        chain.answer(ContractName::ExchangeRates, "rateAndInvalid", vec![uint(2_500), DynSolValue::Bool(false)]);
        chain.answer(
            ContractName::AggregatorDebtRatio,
            "latestAnswer",
            vec![DynSolValue::Int(I256::from_raw(U256::from(7_000)), 256)],
        );
        chain.answer(
            ContractName::ProxyFeePool,
            "recentFeePeriods",
            vec![uint(41), uint(0), uint(1_700_000_000), uint(1), uint(2), uint(3), uint(4)],
        );
        let synthetix = installed(chain.clone()).await;

        assert_eq!(synthetix.prices().await.unwrap(), (U256::from(2_500), U256::from(7_000)));
        assert_eq!(synthetix.current_period_start().await.unwrap(), 1_700_000_000);

        chain.answer(ContractName::AggregatorDebtRatio, "latestAnswer", vec![DynSolValue::Int(I256::MINUS_ONE, 256)]);
        assert!(matches!(synthetix.prices().await, Err(SyncError::UnexpectedReturn { .. })));
    }

    #[tokio::test]
    async fn test_load_account() {
        let chain = Arc::new(ScriptedChain::default());
        chain.answer(ContractName::Synthetix, "collateral", vec![uint(100)]);
        chain.answer(ContractName::SynthetixDebtShare, "balanceOf", vec![uint(50)]);
        chain.answer(ContractName::ProxyFeePool, "feesAvailable", vec![uint(9), uint(3)]);
        chain.answer(ContractName::Liquidator, "getLiquidationDeadlineForAccount", vec![uint(0)]);
        let synthetix = installed(chain.clone()).await;

        let snapshot = synthetix.load_account(ALICE, BlockId::number(900)).await.unwrap();
        assert_eq!(
            snapshot,
            AccountSnapshot {
                collateral_units: U256::from(100),
                debt_share_units: U256::from(50),
                claimable_rewards: U256::from(3),
                liquidation_deadline: None,
            }
        );

        chain.answer(ContractName::Liquidator, "getLiquidationDeadlineForAccount", vec![uint(1_700_000_123)]);
        let snapshot = synthetix.load_account(ALICE, BlockId::latest()).await.unwrap();
        assert_eq!(snapshot.liquidation_deadline, Some(1_700_000_123));
    }

    #[tokio::test]
    async fn test_fetch_events_filters_on_resolved_addresses() {
        let chain = Arc::new(ScriptedChain::default());
        let value = U256::from(5).to_be_bytes::<32>().to_vec();
        let parties = vec![ALICE.into_word(), BOB.into_word()];
        chain.emit(ContractName::ProxyErc20, "Transfer", parties, value.clone(), 10, 2);
        chain.emit(ContractName::SynthetixDebtShare, "Mint", vec![ALICE.into_word()], value.clone(), 11, 0);
        // same signature, wrong emitter: must not be picked up
        chain.emit(ContractName::Synthetix, "Mint", vec![BOB.into_word()], value, 11, 1);
        let synthetix = installed(chain).await;

        let batch = synthetix.fetch_events(10, 20).await.unwrap();
        assert_eq!((batch.from_block, batch.to_block), (10, 20));
        assert_eq!(batch.transfers.len(), 1);
        assert_eq!((batch.transfers[0].from, batch.transfers[0].to), (ALICE, BOB));
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].subject, ALICE);
        assert_eq!(batch.events[0].kind, EventKind::Mint { amount: U256::from(5) });
        assert_eq!(batch.events[0].position, EventPosition { block_number: 11, log_index: 0 });
    }

    #[tokio::test]
    async fn test_vesting_contract_is_reward_escrow() {
        let synthetix = installed(Arc::new(ScriptedChain::default())).await;
        assert_eq!(synthetix.vesting_contract().unwrap(), address_of(ContractName::RewardEscrowV2));
    }
}
