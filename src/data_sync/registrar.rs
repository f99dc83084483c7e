use crate::error::{Result, SyncError};
use crate::store::AccountStore;
use crate::utils::Chain;
use alloy_primitives::Address;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Inbound side of account registration: creates the stored record and hands
/// the address to that chain's scheduler for its next incremental pass.
#[derive(Clone)]
pub struct AccountRegistrar {
    store: Arc<dyn AccountStore>,
    queues: HashMap<Chain, UnboundedSender<Address>>,
}

impl AccountRegistrar {
    /// Opens one queue per chain. The receivers go to the schedulers.
    pub fn new(store: Arc<dyn AccountStore>, chains: &[Chain]) -> (Self, HashMap<Chain, NewAccountQueue>) {
        let mut queues = HashMap::new();
        let mut receivers = HashMap::new();
        for &chain in chains {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(chain, tx);
            receivers.insert(chain, NewAccountQueue { chain, rx, retry: Vec::new() });
        }
        (Self { store, queues }, receivers)
    }

    /// Accepts any address spelling; the parsed address is what gets stored
    /// and compared from here on.
    pub async fn register(&self, chain: Chain, address: &str) -> Result<Address> {
        let address = Address::from_str(address.trim()).map_err(|_| SyncError::InvalidAddress(address.to_string()))?;
        self.register_account(chain, address).await?;
        Ok(address)
    }

    pub async fn register_account(&self, chain: Chain, address: Address) -> Result<()> {
        let queue = self
            .queues
            .get(&chain)
            .ok_or_else(|| SyncError::Config(format!("chain {chain} is not being synced")))?;

        self.store.create(chain, address).await?;
        queue
            .send(address)
            .map_err(|_| SyncError::Other(eyre::eyre!("{chain} scheduler is gone, cannot enqueue {address}")))?;
        info!("{}: registered {}", chain, address.to_checksum(None));
        Ok(())
    }
}

/// Consumer end of one chain's new-account queue.
#[derive(Debug)]
pub struct NewAccountQueue {
    chain: Chain,
    rx: UnboundedReceiver<Address>,
    retry: Vec<Address>,
}

impl NewAccountQueue {
    /// Takes what is queued right now, without waiting. Addresses enqueued
    /// while draining stay for the next call.
    pub fn drain_snapshot(&mut self) -> Vec<Address> {
        let queued = self.rx.len();
        let mut addresses = std::mem::take(&mut self.retry);
        addresses.reserve(queued);
        for _ in 0..queued {
            match self.rx.try_recv() {
                Ok(address) => addresses.push(address),
                Err(_) => break,
            }
        }
        addresses.sort();
        addresses.dedup();
        if !addresses.is_empty() {
            debug!("{}: picked up {} new accounts", self.chain, addresses.len());
        }
        addresses
    }

    /// Hands addresses back for the next [`Self::drain_snapshot`].
    pub fn requeue(&mut self, addresses: impl IntoIterator<Item = Address>) {
        self.retry.extend(addresses);
    }
}
