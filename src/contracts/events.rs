use crate::contracts::names::WatchedEvent;
use crate::error::{Result, SyncError};
use crate::logic::types::{ChainEvent, EventBatch, EventKind, EventPosition, TransferEvent};
use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::Event;
use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::Log;
use std::collections::HashMap;
use tracing::warn;

/// A decoded watched log, before it is bucketed per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedLog {
    Transfer(TransferEvent),
    Account(ChainEvent),
}

/// Decodes `logs` of one watched event into `batch`. Logs that do not decode
/// are logged and dropped; they cannot be retried into shape.
pub fn decode_into(batch: &mut EventBatch, watched: WatchedEvent, event: &Event, logs: &[Log]) {
    for log in logs {
        match decode_log(watched, event, log) {
            Ok(DecodedLog::Transfer(transfer)) => batch.transfers.push(transfer),
            Ok(DecodedLog::Account(account_event)) => batch.events.push(account_event),
            Err(e) => warn!(
                "dropping {} log in tx {:?} at block {:?}: {}",
                watched, log.transaction_hash, log.block_number, e
            ),
        }
    }
}

pub fn decode_log(watched: WatchedEvent, event: &Event, log: &Log) -> Result<DecodedLog> {
    let context = format!("{watched} log");
    let position = EventPosition {
        block_number: log.block_number.ok_or_else(|| SyncError::unexpected(format!("{context} without block number")))?,
        log_index: log.log_index.ok_or_else(|| SyncError::unexpected(format!("{context} without log index")))?,
    };
    let decoded = event.decode_log(&log.inner.data).map_err(|e| SyncError::codec(&context, e))?;
    let params = Params::new(event, decoded.indexed, decoded.body, context);

    let account_event = |kind: EventKind| -> Result<DecodedLog> {
        Ok(DecodedLog::Account(ChainEvent { subject: params.address("account")?, kind, position }))
    };

    match watched {
        WatchedEvent::Transfer => Ok(DecodedLog::Transfer(TransferEvent {
            from: params.address("from")?,
            to: params.address("to")?,
            value: params.uint("value")?,
            position,
        })),
        WatchedEvent::Mint => account_event(EventKind::Mint { amount: params.uint("amount")? }),
        WatchedEvent::Burn => account_event(EventKind::Burn { amount: params.uint("amount")? }),
        WatchedEvent::FeesClaimed => account_event(EventKind::FeesClaimed { rewards: params.uint("snxRewards")? }),
        WatchedEvent::FlaggedForLiquidation => {
            let deadline = params.uint("deadline")?;
            let deadline = u64::try_from(deadline).map_err(|_| params.missing("deadline"))?;
            account_event(EventKind::Flagged { deadline })
        }
        WatchedEvent::RemovedFromLiquidation => account_event(EventKind::Unflagged),
    }
}

/// Decoded event arguments keyed by their ABI names.
struct Params {
    values: HashMap<String, DynSolValue>,
    context: String,
}

impl Params {
    /// Indexed and body values come back in two lists; the ABI inputs say
    /// which list each named argument was taken from.
    fn new(event: &Event, indexed: Vec<DynSolValue>, body: Vec<DynSolValue>, context: String) -> Self {
        let mut indexed = indexed.into_iter();
        let mut body = body.into_iter();
        let values = event
            .inputs
            .iter()
            .filter_map(|input| {
                let value = if input.indexed { indexed.next() } else { body.next() };
                value.map(|value| (input.name.clone(), value))
            })
            .collect();
        Self { values, context }
    }

    fn address(&self, name: &str) -> Result<Address> {
        self.values.get(name).and_then(DynSolValue::as_address).ok_or_else(|| self.missing(name))
    }

    fn uint(&self, name: &str) -> Result<U256> {
        self.values.get(name).and_then(DynSolValue::as_uint).map(|(value, _)| value).ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> SyncError {
        SyncError::unexpected(format!("{} argument {name}", self.context))
    }
}
