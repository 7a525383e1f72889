//! In-process billing ledger
//!
//! Mirrors the deployed billing contract: one owner, one billing role, a price
//! registry, prepaid balances and an append-only nullifier set. Every
//! operation runs under a single lock and either applies completely or
//! returns a rejection with no state touched, the way a reverted transaction
//! behaves.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy_primitives::{keccak256, Address, B256, U256};
use harpocrates_circuit::{BillingCommitment, ProofVerifier, PublicSignals, SolidityProof};

use crate::charge::ChargeRequest;
use crate::error::LedgerRejection;
use crate::events::{LedgerEvent, LoggedEvent, TxReceipt};

pub type LedgerResult<T> = std::result::Result<T, LedgerRejection>;

#[derive(Default)]
struct LedgerState {
    billing_role: Address,
    verifier: Option<Arc<dyn ProofVerifier>>,
    balances: HashMap<Address, U256>,
    prices: HashMap<B256, U256>,
    nullifiers: HashSet<B256>,
    events: Vec<LoggedEvent>,
    block_number: u64,
}

impl LedgerState {
    fn balance(&self, user: &Address) -> U256 {
        self.balances.get(user).copied().unwrap_or_default()
    }

    fn price(&self, model_id: &B256) -> U256 {
        self.prices.get(model_id).copied().unwrap_or_default()
    }

    /// Seals a successful transaction into the next block.
    fn commit(&mut self, caller: Address, kind: &str, events: Vec<LedgerEvent>) -> TxReceipt {
        self.block_number += 1;
        let mut preimage = Vec::with_capacity(8 + 20 + kind.len());
        preimage.extend_from_slice(&self.block_number.to_be_bytes());
        preimage.extend_from_slice(caller.as_slice());
        preimage.extend_from_slice(kind.as_bytes());
        let tx_hash = keccak256(&preimage);

        self.events.extend(events.iter().cloned().map(|event| LoggedEvent {
            block_number: self.block_number,
            tx_hash,
            event,
        }));

        TxReceipt {
            tx_hash,
            block_number: self.block_number,
            events,
        }
    }
}

pub struct BillingLedger {
    owner: Address,
    state: Mutex<LedgerState>,
}

impl BillingLedger {
    /// Deploys a ledger owned by `owner` with `billing_role` allowed to charge.
    pub fn new(owner: Address, billing_role: Address) -> Self {
        Self {
            owner,
            state: Mutex::new(LedgerState {
                billing_role,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // No operation panics between its checks and its writes, so a
        // poisoned guard still holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn only_owner(&self, caller: Address) -> LedgerResult<()> {
        if caller != self.owner {
            return Err(LedgerRejection::NotOwner);
        }
        Ok(())
    }

    pub fn fund(&self, caller: Address, value: U256) -> LedgerResult<TxReceipt> {
        let mut state = self.state();
        let balance = state
            .balance(&caller)
            .checked_add(value)
            .ok_or(LedgerRejection::Overflow)?;
        state.balances.insert(caller, balance);
        tracing::debug!("Funded {} with {} wei", caller, value);
        Ok(state.commit(
            caller,
            "fund",
            vec![LedgerEvent::UserFunded {
                user: caller,
                amount: value,
            }],
        ))
    }

    pub fn withdraw(&self, caller: Address, amount: U256) -> LedgerResult<TxReceipt> {
        let mut state = self.state();
        let balance = state.balance(&caller);
        if amount > balance {
            return Err(LedgerRejection::InsufficientBalance);
        }
        state.balances.insert(caller, balance - amount);
        Ok(state.commit(
            caller,
            "withdraw",
            vec![LedgerEvent::Withdrawn {
                user: caller,
                amount,
            }],
        ))
    }

    pub fn set_price(&self, caller: Address, model_id: B256, price: U256) -> LedgerResult<TxReceipt> {
        self.only_owner(caller)?;
        let mut state = self.state();
        state.prices.insert(model_id, price);
        tracing::info!("Price for model {} set to {} wei/token", model_id, price);
        Ok(state.commit(caller, "setPrice", Vec::new()))
    }

    pub fn set_verifier(
        &self,
        caller: Address,
        verifier: Arc<dyn ProofVerifier>,
    ) -> LedgerResult<TxReceipt> {
        self.only_owner(caller)?;
        let mut state = self.state();
        state.verifier = Some(verifier);
        Ok(state.commit(caller, "setVerifier", Vec::new()))
    }

    pub fn set_billing_role(&self, caller: Address, billing_role: Address) -> LedgerResult<TxReceipt> {
        self.only_owner(caller)?;
        let mut state = self.state();
        state.billing_role = billing_role;
        tracing::info!("Billing role set to {}", billing_role);
        Ok(state.commit(caller, "setBillingRole", Vec::new()))
    }

    /// Plaintext charge priced from the registry.
    pub fn charge(
        &self,
        caller: Address,
        user: Address,
        model_id: B256,
        input_tokens: u64,
        output_tokens: u64,
        usage_hash: B256,
    ) -> LedgerResult<TxReceipt> {
        self.submit(
            caller,
            &ChargeRequest::Plaintext {
                user,
                model_id,
                input_tokens,
                output_tokens,
                usage_hash,
            },
        )
    }

    /// Proof-gated charge. Token counts never reach the ledger.
    pub fn charge_with_proof(
        &self,
        caller: Address,
        commitment: &BillingCommitment,
        proof: &SolidityProof,
    ) -> LedgerResult<TxReceipt> {
        self.submit(
            caller,
            &ChargeRequest::Proven {
                commitment: *commitment,
                proof: *proof,
            },
        )
    }

    /// Runs either charge variant as one transaction.
    pub fn submit(&self, caller: Address, request: &ChargeRequest) -> LedgerResult<TxReceipt> {
        let mut state = self.state();
        if caller != state.billing_role {
            tracing::warn!("Rejected {} from {}: not billing", request.kind(), caller);
            return Err(LedgerRejection::NotBilling);
        }

        let (cost, event) = match request {
            ChargeRequest::Plaintext {
                user,
                model_id,
                input_tokens,
                output_tokens,
                usage_hash,
            } => {
                let cost = ChargeRequest::plaintext_cost(
                    *input_tokens,
                    *output_tokens,
                    state.price(model_id),
                )
                .ok_or(LedgerRejection::Overflow)?;
                let event = LedgerEvent::UserCharged {
                    user: *user,
                    model_id: *model_id,
                    input_tokens: *input_tokens,
                    output_tokens: *output_tokens,
                    cost_wei: cost,
                    usage_hash: *usage_hash,
                };
                (cost, event)
            }
            ChargeRequest::Proven { commitment, proof } => {
                if commitment.price_per_token_wei != state.price(&commitment.model_id) {
                    return Err(LedgerRejection::PriceMismatch);
                }
                if state.nullifiers.contains(&commitment.nullifier) {
                    return Err(LedgerRejection::NullifierUsed);
                }
                if !commitment.is_canonical() {
                    tracing::warn!("Rejected chargeWithProof for {}: public value outside the field", commitment.user);
                    return Err(LedgerRejection::InvalidProof);
                }
                let signals = PublicSignals::from_commitment(commitment);
                let verified = state
                    .verifier
                    .as_ref()
                    .is_some_and(|verifier| verifier.verify(proof, &signals));
                if !verified {
                    return Err(LedgerRejection::InvalidProof);
                }
                let event = LedgerEvent::UserCharged {
                    user: commitment.user,
                    model_id: commitment.model_id,
                    input_tokens: 0,
                    output_tokens: 0,
                    cost_wei: commitment.cost_wei,
                    usage_hash: commitment.usage_hash,
                };
                (commitment.cost_wei, event)
            }
        };

        let user = request.user();
        let balance = state.balance(&user);
        if balance < cost {
            return Err(LedgerRejection::InsufficientBalance);
        }

        state.balances.insert(user, balance - cost);
        if let Some(nullifier) = request.nullifier() {
            state.nullifiers.insert(nullifier);
        }
        tracing::info!("Charged {} wei from {} via {}", cost, user, request.kind());
        Ok(state.commit(caller, request.kind(), vec![event]))
    }

    pub fn balance_of(&self, user: Address) -> U256 {
        self.state().balance(&user)
    }

    pub fn nullifier_used(&self, nullifier: B256) -> bool {
        self.state().nullifiers.contains(&nullifier)
    }

    pub fn price_per_token_wei(&self, model_id: B256) -> U256 {
        self.state().price(&model_id)
    }

    pub fn billing_role(&self) -> Address {
        self.state().billing_role
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn block_number(&self) -> u64 {
        self.state().block_number
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.state().events.clone()
    }
}
