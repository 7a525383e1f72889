//! Per-user long-term secrets
//!
//! A secret is drawn once per user, on first use, and kept for the lifetime
//! of the store. Nullifiers derive from it, so replacing a secret would let
//! the same usage settle twice.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use alloy::primitives::{Address, U256};
use rand::{rngs::OsRng, RngCore};

use crate::error::BillingError;

/// 31 bytes keeps every secret strictly below the scalar field modulus.
const SECRET_BYTES: usize = 31;

pub trait SecretStore: Send + Sync {
    /// Returns the user's secret, creating and persisting it on first use.
    fn get_or_create(&self, user: Address) -> Result<U256, BillingError>;
}

/// Uniform 248-bit value, always a valid field element.
pub fn random_scalar() -> U256 {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    U256::from_be_slice(&bytes)
}

/// Process-local store for tests and throwaway deployments.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<Address, U256>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_or_create(&self, user: Address) -> Result<U256, BillingError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(*secrets.entry(user).or_insert_with(random_scalar))
    }
}

/// JSON file of `address -> decimal secret`, rewritten atomically on every
/// new user.
pub struct FileSecretStore {
    path: PathBuf,
    secrets: Mutex<BTreeMap<Address, U256>>,
}

impl FileSecretStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BillingError> {
        let path = path.as_ref().to_path_buf();
        let secrets = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                BillingError::Configuration(format!("cannot read {}: {}", path.display(), e))
            })?;
            let encoded: BTreeMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
                BillingError::Configuration(format!("corrupt secret store {}: {}", path.display(), e))
            })?;
            encoded
                .into_iter()
                .map(|(user, secret)| -> Result<(Address, U256), BillingError> {
                    let user = user.parse::<Address>().map_err(|e| {
                        BillingError::Configuration(format!("bad address {user} in secret store: {e}"))
                    })?;
                    let secret = secret.parse::<U256>().map_err(|e| {
                        BillingError::Configuration(format!("bad secret for {user} in secret store: {e}"))
                    })?;
                    Ok((user, secret))
                })
                .collect::<Result<BTreeMap<_, _>, BillingError>>()?
        } else {
            BTreeMap::new()
        };

        tracing::info!(
            "Opened secret store {} ({} users)",
            path.display(),
            secrets.len()
        );
        Ok(Self {
            path,
            secrets: Mutex::new(secrets),
        })
    }

    fn persist(&self, secrets: &BTreeMap<Address, U256>) -> Result<(), BillingError> {
        let encoded: BTreeMap<String, String> = secrets
            .iter()
            .map(|(user, secret)| (user.to_checksum(None), secret.to_string()))
            .collect();
        let json = serde_json::to_string_pretty(&encoded)
            .map_err(|e| BillingError::Configuration(e.to_string()))?;

        let io_error = |e: std::io::Error| {
            BillingError::Configuration(format!("cannot write {}: {}", self.path.display(), e))
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)
    }
}

impl SecretStore for FileSecretStore {
    fn get_or_create(&self, user: Address) -> Result<U256, BillingError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(secret) = secrets.get(&user) {
            return Ok(*secret);
        }

        let secret = random_scalar();
        secrets.insert(user, secret);
        if let Err(e) = self.persist(&secrets) {
            // Never hand out a secret that would be lost on restart.
            secrets.remove(&user);
            return Err(e);
        }
        tracing::info!("Created secret for new user {}", user);
        Ok(secret)
    }
}
