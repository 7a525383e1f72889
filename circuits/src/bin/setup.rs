//! Billing circuit key generation
//!
//! Runs a circuit-specific Groth16 setup and writes `billing.pk` / `billing.vk`.
//! Usage: cargo run --release --bin harpocrates-setup -- --out zk/build

use anyhow::{Context, Result};
use clap::Parser;
use harpocrates_circuit::prover::{self, ArtifactPaths};
use rand::rngs::OsRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory the artifacts are written to
    #[arg(short, long, default_value = "zk/build")]
    out: String,

    /// Overwrite existing artifacts
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harpocrates_setup=info,harpocrates_circuit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let paths = ArtifactPaths::in_dir(&args.out);

    if !args.force && paths.ensure().is_ok() {
        anyhow::bail!(
            "artifacts already exist in {} (pass --force to regenerate)",
            args.out
        );
    }

    let summary = prover::setup(&paths, &mut OsRng).context("setup failed")?;

    let report = serde_json::json!({
        "constraints": summary.constraints,
        "provingKey": paths.proving_key,
        "verifyingKey": paths.verifying_key,
        "publicInputs": summary.public_inputs,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
