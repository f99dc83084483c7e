use crate::chain::retry::{RetryPolicy, retry_until_deadline};
use crate::chain::rpc::RpcClient;
use crate::contracts::ContractDescriptor;
use crate::error::{Result, SyncError};
use crate::utils::Chain;
use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_primitives::Bytes;
use alloy_rpc_types_eth::{BlockId, Filter, Log};
use alloy_transport::{TransportError, TransportErrorKind};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_PARALLEL_CALLS: usize = 10;

/// Throttled, retrying executor for chain reads.
///
/// Clones share the same gate, so a clone obtained through
/// [`ChainGateway::with_policy`] still counts against the same endpoint limit.
#[derive(Clone)]
pub struct ChainGateway {
    chain: Chain,
    rpc: Arc<dyn RpcClient>,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl ChainGateway {
    pub fn new(chain: Chain, rpc: Arc<dyn RpcClient>, max_parallel_calls: usize, policy: RetryPolicy) -> Self {
        Self { chain, rpc, permits: Arc::new(Semaphore::new(max_parallel_calls.max(1))), policy }
    }

    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self { policy, ..self.clone() }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Calls `function` on `contract` at `block` and returns the decoded outputs.
    ///
    /// Transport failures are retried; encoding and decoding failures are not,
    /// since retrying cannot fix an ABI mismatch.
    pub async fn call(
        &self,
        contract: &ContractDescriptor,
        function: &str,
        block: BlockId,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>> {
        let func = contract.function(function, args.len())?;
        let context = format!("{}:{}.{}", self.chain, contract.name, function);
        let input: Bytes = func.abi_encode_input(args).map_err(|e| SyncError::codec(&context, e))?.into();

        let rpc = &self.rpc;
        let to = contract.address;
        let output = self
            .gated(&context, || {
                let input = input.clone();
                async move { rpc.call(to, input, block).await }
            })
            .await?;

        func.abi_decode_output(&output).map_err(|e| SyncError::codec(&context, e))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let rpc = &self.rpc;
        self.gated(&format!("{}:eth_blockNumber", self.chain), || async move { rpc.block_number().await })
            .await
    }

    pub async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let rpc = &self.rpc;
        self.gated(&format!("{}:eth_getLogs", self.chain), || async move { rpc.logs(filter).await })
            .await
    }

    /// Each attempt holds a permit only while the request is in flight, never
    /// across a backoff sleep.
    async fn gated<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let permits = &self.permits;
        retry_until_deadline(operation, &self.policy, || {
            let request = op();
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| TransportErrorKind::custom_str("gateway closed"))?;
                request.await
            }
        })
        .await
    }
}

impl std::fmt::Debug for ChainGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainGateway")
            .field("chain", &self.chain)
            .field("available_permits", &self.permits.available_permits())
            .field("policy", &self.policy)
            .finish()
    }
}
