pub mod blockchain_alloy;
pub mod ledger;
pub mod orchestrator;
pub mod retry;
pub mod secrets;
