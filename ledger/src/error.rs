//! Ledger rejection reasons
//!
//! Display strings are the revert reasons of the deployed contract and are
//! surfaced verbatim.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerRejection {
    #[error("not owner")]
    NotOwner,

    #[error("not billing")]
    NotBilling,

    #[error("price mismatch")]
    PriceMismatch,

    #[error("nullifier used")]
    NullifierUsed,

    #[error("invalid proof")]
    InvalidProof,

    #[error("insufficient balance")]
    InsufficientBalance,

    /// Checked arithmetic panic in the contract.
    #[error("arithmetic overflow")]
    Overflow,
}

impl LedgerRejection {
    pub const ALL: [LedgerRejection; 7] = [
        LedgerRejection::NotOwner,
        LedgerRejection::NotBilling,
        LedgerRejection::PriceMismatch,
        LedgerRejection::NullifierUsed,
        LedgerRejection::InvalidProof,
        LedgerRejection::InsufficientBalance,
        LedgerRejection::Overflow,
    ];

    /// Finds a known revert reason inside an RPC error message.
    pub fn from_revert_message(message: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rejection| message.contains(&rejection.to_string()))
            .or_else(|| message.contains("underflow or overflow").then_some(LedgerRejection::Overflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_match_contract() {
        assert_eq!(LedgerRejection::NotBilling.to_string(), "not billing");
        assert_eq!(LedgerRejection::NullifierUsed.to_string(), "nullifier used");
        assert_eq!(LedgerRejection::InsufficientBalance.to_string(), "insufficient balance");
    }

    #[test]
    fn test_parse_revert_message() {
        let message = "server returned an error response: error code 3: execution reverted: nullifier used";
        assert_eq!(
            LedgerRejection::from_revert_message(message),
            Some(LedgerRejection::NullifierUsed)
        );
        assert_eq!(LedgerRejection::from_revert_message("connection refused"), None);
        assert_eq!(
            LedgerRejection::from_revert_message("execution reverted: panic: arithmetic underflow or overflow (0x11)"),
            Some(LedgerRejection::Overflow)
        );
    }
}
