use alloy_primitives::{Address, Bytes, TxKind};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::{BlockId, Filter, Log, TransactionInput, TransactionRequest};
use alloy_transport::TransportError;
use async_trait::async_trait;
use url::Url;

/// The slice of the JSON-RPC surface the sync engine consumes.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, TransportError>;

    /// `eth_call` of raw calldata against `to` at `block`.
    async fn call(&self, to: Address, input: Bytes, block: BlockId) -> Result<Bytes, TransportError>;

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError>;
}

/// HTTP JSON-RPC client backed by an alloy provider.
#[derive(Debug, Clone)]
pub struct AlloyRpcClient {
    provider: RootProvider,
}

impl AlloyRpcClient {
    pub fn new_http(rpc_url: Url) -> Self {
        Self { provider: RootProvider::new_http(rpc_url) }
    }
}

#[async_trait]
impl RpcClient for AlloyRpcClient {
    async fn block_number(&self) -> Result<u64, TransportError> {
        self.provider.get_block_number().await
    }

    async fn call(&self, to: Address, input: Bytes, block: BlockId) -> Result<Bytes, TransportError> {
        let tx = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(input),
            ..Default::default()
        };
        self.provider.call(tx).block(block).await
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError> {
        self.provider.get_logs(filter).await
    }
}
