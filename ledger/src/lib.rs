//! Harpocrates billing ledger
//!
//! State machine behind usage settlement: per-model prices, prepaid user
//! balances, a billing role allowed to charge, and a nullifier set that makes
//! every proof-backed charge settle at most once.

pub mod charge;
pub mod error;
pub mod events;
pub mod ledger;

pub use charge::ChargeRequest;
pub use error::LedgerRejection;
pub use events::{LedgerEvent, LoggedEvent, TxReceipt};
pub use ledger::{BillingLedger, LedgerResult};
