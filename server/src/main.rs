//! Harpocrates Billing Server
//!
//! Proves AI usage in zero knowledge and settles its cost on the billing
//! ledger without revealing token counts.

use anyhow::Context;
use harpocrates_circuit::{ArtifactPaths, BillingProver, Groth16Verifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod handlers;
mod models;
mod services;
#[cfg(test)]
mod test_support;

use config::{Config, LedgerMode};
use services::blockchain_alloy::AlloyLedger;
use services::ledger::{LedgerClient, LocalLedger};
use services::orchestrator::BillingService;
use services::secrets::{FileSecretStore, MemorySecretStore, SecretStore};

/// `RUST_LOG`, read after `.env` has been loaded.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "harpocrates_server=debug,tower_http=debug".into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting Harpocrates billing server ({})", config.app_env);

    // Circuit artifacts are required; a missing key aborts startup
    let artifacts = ArtifactPaths::in_dir(&config.artifacts_dir);
    let prover = BillingProver::load(&artifacts).context("Failed to load proving key")?;
    let verifier = Arc::new(
        Groth16Verifier::load(&artifacts.verifying_key).context("Failed to load verifying key")?,
    );

    let ledger: Arc<dyn LedgerClient> = match &config.ledger {
        LedgerMode::Rpc(settings) => Arc::new(AlloyLedger::new(settings)?),
        LedgerMode::Local(settings) => Arc::new(
            LocalLedger::deploy(settings, verifier.clone()).context("Failed to seed local ledger")?,
        ),
    };
    tracing::info!("Ledger: {} (signer {})", ledger.name(), ledger.signer());

    let secrets: Arc<dyn SecretStore> = match &config.secret_store_path {
        Some(path) => Arc::new(FileSecretStore::open(path).context("Failed to open secret store")?),
        None => {
            tracing::warn!("SECRET_STORE_PATH not set, user secrets will not survive a restart");
            Arc::new(MemorySecretStore::new())
        }
    };

    let billing = BillingService::new(Arc::new(prover), verifier, ledger, secrets)
        .with_retry(config.retry.clone())
        .with_signal_verification(config.verify_signals)
        .with_signal_diffs(config.expose_signal_diffs());
    let port = config.port;
    let state = handlers::AppState::new(config, billing);

    // Build router
    let app = handlers::router(state)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_reads_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "RUST_LOG=harpocrates_server=trace\n").unwrap();

        dotenvy::from_path_override(&env_file).unwrap();
        assert_eq!(log_filter().to_string(), "harpocrates_server=trace");
    }
}
