use crate::error::{Result, SyncError};
use alloy_json_abi::{Event, Function, JsonAbi};
use alloy_primitives::Address;

/// An installed contract: where to send calls and how to encode them.
///
/// `address` is what the resolver returned and is the target for calls and
/// log filters. For proxies `implementation` is the proxy's `target()` and the
/// ABI belongs to it; for everything else the two addresses are equal.
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    pub name: String,
    pub address: Address,
    pub implementation: Address,
    pub abi: JsonAbi,
}

impl ContractDescriptor {
    pub fn new(name: impl Into<String>, address: Address, implementation: Address, abi: JsonAbi) -> Self {
        Self { name: name.into(), address, implementation, abi }
    }

    /// Looks up `function` by name, picking the overload taking `arity` inputs.
    pub fn function(&self, function: &str, arity: usize) -> Result<&Function> {
        self.abi
            .function(function)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
            .ok_or_else(|| SyncError::UnknownFunction { contract: self.name.clone(), function: function.to_string() })
    }

    pub fn event(&self, event: &str) -> Result<&Event> {
        self.abi
            .event(event)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| SyncError::UnknownEvent { contract: self.name.clone(), event: event.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn erc20() -> ContractDescriptor {
        let abi = JsonAbi::parse([
            "function balanceOf(address account) view returns (uint256)",
            "event Transfer(address indexed from, address indexed to, uint256 value)",
        ])
        .unwrap();
        ContractDescriptor::new("ProxyERC20", Address::repeat_byte(1), Address::repeat_byte(2), abi)
    }

    #[test]
    fn test_function_lookup_by_arity() {
        let contract = erc20();
        assert!(contract.function("balanceOf", 1).is_ok());
        assert!(matches!(contract.function("balanceOf", 2), Err(SyncError::UnknownFunction { .. })));
        assert!(matches!(contract.function("totalSupply", 0), Err(SyncError::UnknownFunction { .. })));
    }

    #[test]
    fn test_event_lookup() {
        let contract = erc20();
        assert_eq!(contract.event("Transfer").unwrap().inputs.len(), 3);
        assert!(matches!(contract.event("Approval"), Err(SyncError::UnknownEvent { .. })));
    }
}
