//! Shared fixtures for server tests

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use harpocrates_circuit::prover::generate_keys;
use harpocrates_circuit::{normalize_model_id, BillingProver, Groth16Verifier};
use harpocrates_ledger::BillingLedger;
use rand::{rngs::StdRng, SeedableRng};

use crate::services::ledger::LocalLedger;
use crate::services::orchestrator::BillingService;
use crate::services::retry::RetryConfig;
use crate::services::secrets::MemorySecretStore;

pub const BILLING: Address = Address::repeat_byte(0xb1);
pub const USER: Address = Address::repeat_byte(0xc0);
pub const OTHER_USER: Address = Address::repeat_byte(0xc1);
pub const MODEL: &str = "llm-secure-7b";

pub fn initial_balance() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

/// Keys are generated once per test binary.
pub fn circuit() -> &'static (Arc<BillingProver>, Arc<Groth16Verifier>) {
    static CIRCUIT: OnceLock<(Arc<BillingProver>, Arc<Groth16Verifier>)> = OnceLock::new();
    CIRCUIT.get_or_init(|| {
        let (pk, vk) = generate_keys(&mut StdRng::seed_from_u64(1234)).unwrap();
        (
            Arc::new(BillingProver::new(pk)),
            Arc::new(Groth16Verifier::new(&vk).unwrap()),
        )
    })
}

/// Devnet where `BILLING` owns the ledger and holds the billing role, the
/// model costs 1 gwei per token, and `USER` holds 1 ETH. Charges are sent
/// from `signer`.
pub fn local_ledger_inner(signer: Address) -> LocalLedger {
    let ledger = BillingLedger::new(BILLING, BILLING);
    ledger
        .set_verifier(BILLING, circuit().1.clone())
        .unwrap();
    ledger
        .set_price(BILLING, normalize_model_id(MODEL), U256::from(1_000_000_000u64))
        .unwrap();
    ledger.fund(USER, initial_balance()).unwrap();
    LocalLedger::new(Arc::new(ledger), signer)
}

pub fn local_ledger(signer: Address) -> Arc<LocalLedger> {
    Arc::new(local_ledger_inner(signer))
}

pub fn service(ledger: Arc<dyn crate::services::ledger::LedgerClient>) -> BillingService {
    let (prover, verifier) = circuit();
    BillingService::new(
        prover.clone(),
        verifier.clone(),
        ledger,
        Arc::new(MemorySecretStore::new()),
    )
    .with_retry(RetryConfig {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
    })
}
