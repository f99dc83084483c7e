use alloy_primitives::Address;
use alloy_transport::TransportError;
use eyre::Report;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // Chain access
    #[error("{operation} still failing after {attempts} attempts over {elapsed:?}")]
    RetryDeadlineExceeded {
        operation: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: TransportError,
    },
    #[error("{operation} rejected by the node: {source}")]
    CallRejected {
        operation: String,
        #[source]
        source: TransportError,
    },

    // ABI verification service
    #[error("ABI fetch for {address} failed after {attempts} attempts: {reason}")]
    AbiFetch { address: Address, attempts: u32, reason: String },

    // Contract registry
    #[error("failed to install {} contract(s): {}", .0.len(), format_install_failures(.0))]
    ContractInstall(Vec<(String, SyncError)>),
    #[error("contract {0} is not installed")]
    ContractNotInstalled(String),

    // ABI coding
    #[error("contract {contract} has no function {function}")]
    UnknownFunction { contract: String, function: String },
    #[error("contract {contract} has no event {event}")]
    UnknownEvent { contract: String, event: String },
    #[error("ABI coding error in {context}: {source}")]
    AbiCodec {
        context: String,
        #[source]
        source: alloy_dyn_abi::Error,
    },
    #[error("unexpected return value from {context}")]
    UnexpectedReturn { context: String },

    // Configuration surface
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error(transparent)]
    Other(Report),
}

impl SyncError {
    pub fn codec(context: impl Into<String>, source: alloy_dyn_abi::Error) -> Self {
        Self::AbiCodec { context: context.into(), source }
    }

    pub fn unexpected(context: impl Into<String>) -> Self {
        Self::UnexpectedReturn { context: context.into() }
    }
}

impl From<Report> for SyncError {
    fn from(error: Report) -> Self {
        Self::Other(error)
    }
}

fn format_install_failures(failures: &[(String, SyncError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_failures_are_listed() {
        let err = SyncError::ContractInstall(vec![
            ("Synthetix".to_string(), SyncError::ContractNotInstalled("x".to_string())),
            ("Liquidator".to_string(), SyncError::Config("bad".to_string())),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("failed to install 2 contract(s)"));
        assert!(msg.contains("Synthetix: contract x is not installed"));
        assert!(msg.contains("Liquidator: invalid configuration: bad"));
    }
}
