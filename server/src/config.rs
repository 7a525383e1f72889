//! Configuration management

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::retry::RetryConfig;

/// Anvil's first dev account.
const DEFAULT_LOCAL_BILLING_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const DEFAULT_LOCAL_MODEL_PRICES: &str = "llm-secure-7b=1000000000";

#[derive(Clone, Debug)]
pub struct RpcSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub billing_contract: String,
    pub private_key: String,
}

#[derive(Clone, Debug)]
pub struct LocalSettings {
    /// Owner, billing role and submitting signer of the devnet ledger.
    pub billing_address: Address,
    /// `(model name or bytes32, wei per token)`
    pub model_prices: Vec<(String, U256)>,
    pub balances: Vec<(Address, U256)>,
}

#[derive(Clone, Debug)]
pub enum LedgerMode {
    Rpc(RpcSettings),
    Local(LocalSettings),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub ledger: LedgerMode,
    pub artifacts_dir: PathBuf,
    pub secret_store_path: Option<PathBuf>,
    pub verify_signals: bool,
    pub retry: RetryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .with_context(|| format!("{key} must be set when LEDGER_MODE=rpc"))
        };

        let ledger = match var("LEDGER_MODE", "rpc").as_str() {
            "rpc" => LedgerMode::Rpc(RpcSettings {
                rpc_url: required("RPC_URL")?,
                chain_id: var("CHAIN_ID", "0").parse().context("Invalid CHAIN_ID")?,
                billing_contract: required("BILLING_CONTRACT")?,
                private_key: required("BILLING_PRIVATE_KEY")?,
            }),
            "local" => LedgerMode::Local(LocalSettings {
                billing_address: var("LOCAL_BILLING_ADDRESS", DEFAULT_LOCAL_BILLING_ADDRESS)
                    .parse()
                    .context("Invalid LOCAL_BILLING_ADDRESS")?,
                model_prices: parse_pairs(&var("LOCAL_MODEL_PRICES", DEFAULT_LOCAL_MODEL_PRICES))
                    .context("Invalid LOCAL_MODEL_PRICES")?,
                balances: parse_pairs(&var("LOCAL_BALANCES", ""))
                    .context("Invalid LOCAL_BALANCES")?
                    .into_iter()
                    .map(|(user, amount)| -> Result<(Address, U256)> {
                        let user = user
                            .parse::<Address>()
                            .with_context(|| format!("Invalid address {user}"))?;
                        Ok((user, amount))
                    })
                    .collect::<Result<_>>()?,
            }),
            other => bail!("Invalid LEDGER_MODE {other:?}: expected rpc or local"),
        };

        Ok(Self {
            port: var("PORT", "8080").parse().context("Invalid PORT")?,

            app_env: var("APP_ENV", "development"),

            ledger,

            artifacts_dir: PathBuf::from(var("ZK_ARTIFACTS_DIR", "zk/build")),

            secret_store_path: lookup("SECRET_STORE_PATH")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),

            verify_signals: var("VERIFY_SIGNALS", "true")
                .parse()
                .context("Invalid VERIFY_SIGNALS")?,

            retry: RetryConfig {
                max_retries: var("RETRY_MAX", "3").parse().context("Invalid RETRY_MAX")?,
                initial_delay: Duration::from_millis(
                    var("RETRY_INITIAL_MS", "500")
                        .parse()
                        .context("Invalid RETRY_INITIAL_MS")?,
                ),
                max_delay: Duration::from_millis(
                    var("RETRY_MAX_MS", "10000")
                        .parse()
                        .context("Invalid RETRY_MAX_MS")?,
                ),
                ..RetryConfig::default()
            },
        })
    }

    /// Signal diffs are only returned to callers outside production.
    pub fn expose_signal_diffs(&self) -> bool {
        self.app_env != "production"
    }
}

/// Parses `key=decimal,key=decimal`. Empty input yields no pairs.
fn parse_pairs(raw: &str) -> Result<Vec<(String, U256)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(String, U256)> {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("expected key=value, got {entry:?}"))?;
            let value = harpocrates_circuit::codec::parse_decimal("value", value.trim())?;
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_local_defaults() {
        let config = config(&[("LEDGER_MODE", "local")]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.expose_signal_diffs());
        assert!(config.verify_signals);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.artifacts_dir, PathBuf::from("zk/build"));
        match config.ledger {
            LedgerMode::Local(local) => {
                assert_eq!(
                    local.model_prices,
                    vec![("llm-secure-7b".to_string(), U256::from(1_000_000_000u64))]
                );
                assert!(local.balances.is_empty());
            }
            LedgerMode::Rpc(_) => panic!("expected local mode"),
        }
    }

    #[test]
    fn test_rpc_mode_requires_contract_and_key() {
        let err = config(&[("RPC_URL", "http://localhost:8545")]).unwrap_err();
        assert!(err.to_string().contains("BILLING_CONTRACT"));
    }

    #[test]
    fn test_production_hides_diffs() {
        let config = config(&[("LEDGER_MODE", "local"), ("APP_ENV", "production")]).unwrap();
        assert!(!config.expose_signal_diffs());
    }

    #[test]
    fn test_local_balances_are_parsed() {
        let config = config(&[
            ("LEDGER_MODE", "local"),
            (
                "LOCAL_BALANCES",
                "0x1111111111111111111111111111111111111111=5, 0x2222222222222222222222222222222222222222=7",
            ),
        ])
        .unwrap();
        let LedgerMode::Local(local) = config.ledger else {
            panic!("expected local mode");
        };
        assert_eq!(local.balances.len(), 2);
        assert_eq!(local.balances[1].1, U256::from(7u8));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(config(&[("LEDGER_MODE", "local"), ("PORT", "http")]).is_err());
        assert!(config(&[("LEDGER_MODE", "local"), ("LOCAL_MODEL_PRICES", "m=-1")]).is_err());
        assert!(config(&[("LEDGER_MODE", "ganache")]).is_err());
    }
}
