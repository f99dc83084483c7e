/// Chain Access Layer
///
/// Every read the sync engine makes toward an RPC endpoint goes through the
/// [`ChainGateway`]: a counting gate caps in-flight requests and transient
/// failures are retried with exponential backoff up to a wall-clock deadline.
pub mod gateway;
pub mod retry;
pub mod rpc;

pub use gateway::ChainGateway;
pub use retry::{RetryPolicy, retry_until_deadline};
pub use rpc::{AlloyRpcClient, RpcClient};
