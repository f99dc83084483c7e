//! Persistence contract for tracked accounts.
//!
//! The sync engine only reads a record, updates it in memory and writes it
//! back; schemas and transactions belong to the implementation.

use crate::error::Result;
use crate::logic::types::TrackedAccount;
use crate::utils::Chain;
use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, chain: Chain, address: Address) -> Result<Option<TrackedAccount>>;

    /// All distinct tracked addresses on `chain`.
    async fn addresses(&self, chain: Chain) -> Result<Vec<Address>>;

    /// Creates an empty record, or returns the existing one untouched.
    async fn create(&self, chain: Chain, address: Address) -> Result<TrackedAccount>;

    /// Writes back an updated record. Returns `false` when the record no
    /// longer exists; a deleted account is never resurrected.
    async fn save(&self, account: &TrackedAccount) -> Result<bool>;

    async fn delete(&self, chain: Chain, address: Address) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<(Chain, Address), TrackedAccount>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, chain: Chain, address: Address) -> Result<Option<TrackedAccount>> {
        Ok(self.accounts.get(&(chain, address)).map(|entry| entry.value().clone()))
    }

    async fn addresses(&self, chain: Chain) -> Result<Vec<Address>> {
        let mut addresses: Vec<_> = self.accounts.iter().filter(|e| e.key().0 == chain).map(|e| e.key().1).collect();
        addresses.sort();
        Ok(addresses)
    }

    async fn create(&self, chain: Chain, address: Address) -> Result<TrackedAccount> {
        Ok(self.accounts.entry((chain, address)).or_insert_with(|| TrackedAccount::new(chain, address)).value().clone())
    }

    async fn save(&self, account: &TrackedAccount) -> Result<bool> {
        match self.accounts.get_mut(&(account.chain, account.address)) {
            Some(mut entry) => {
                *entry = account.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, chain: Chain, address: Address) -> Result<bool> {
        Ok(self.accounts.remove(&(chain, address)).is_some())
    }
}
