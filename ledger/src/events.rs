//! Ledger events and transaction receipts

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    UserFunded { user: Address, amount: U256 },

    #[serde(rename_all = "camelCase")]
    Withdrawn { user: Address, amount: U256 },

    /// Emitted by both charge paths. On the proof path the token counts are
    /// always zero.
    #[serde(rename_all = "camelCase")]
    UserCharged {
        user: Address,
        model_id: B256,
        input_tokens: u64,
        output_tokens: u64,
        cost_wei: U256,
        usage_hash: B256,
    },
}

/// Result of one successful ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub events: Vec<LedgerEvent>,
}

/// An event together with the transaction that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedEvent {
    pub block_number: u64,
    pub tx_hash: B256,
    pub event: LedgerEvent,
}
