//! Harpocrates billing agent
//!
//! Drives the billing server from the command line:
//! 1. Check server and ledger health
//! 2. Prove usage and optionally save the proof
//! 3. Submit a saved proof as a charge
//! 4. Or prove and settle in one step

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Client for zero-knowledge AI usage billing")]
struct Cli {
    /// Billing server URL
    #[arg(long, env = "HARPOCRATES_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server and ledger status
    Health,

    /// Generate a billing proof for metered usage
    Prove {
        #[command(flatten)]
        usage: UsageArgs,

        /// Write the proof to this JSON file for a later `charge`
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Submit a proof written by `prove --out`
    Charge {
        /// Proof file
        #[arg(short, long)]
        file: PathBuf,

        /// Skip sending public signals (no off-chain signal check)
        #[arg(long)]
        no_signals: bool,
    },

    /// Prove and settle in one request
    Settle {
        #[command(flatten)]
        usage: UsageArgs,
    },
}

#[derive(Args, Debug)]
struct UsageArgs {
    /// User address being billed
    #[arg(short, long)]
    user: String,

    /// Model name or 0x-prefixed bytes32 id
    #[arg(short, long, default_value = "llm-secure-7b")]
    model: String,

    /// Prompt tokens
    #[arg(short = 'i', long)]
    input_tokens: u64,

    /// Completion tokens
    #[arg(short = 'o', long)]
    output_tokens: u64,

    /// Fixed nonce (decimal); random when omitted
    #[arg(long)]
    nonce: Option<String>,

    /// User secret (decimal); the server's secret store is used when omitted
    #[arg(long)]
    user_secret: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProveRequest {
    user_address: String,
    model_id: String,
    input_tokens: String,
    output_tokens: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_secret: Option<String>,
}

impl TryFrom<UsageArgs> for ProveRequest {
    type Error = anyhow::Error;

    fn try_from(args: UsageArgs) -> Result<Self> {
        let user: Address = args.user.parse().context("Invalid user address")?;
        Ok(Self {
            user_address: user.to_checksum(None),
            model_id: args.model,
            input_tokens: args.input_tokens.to_string(),
            output_tokens: args.output_tokens.to_string(),
            nonce: args.nonce,
            user_secret: args.user_secret,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    ledger: String,
    environment: String,
    billing_role: Option<String>,
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeReceipt {
    tx_hash: String,
    block_number: u64,
    status: bool,
}

#[derive(Debug, Deserialize)]
struct SettleResponse {
    proof: Value,
    receipt: ChargeReceipt,
}

/// Builds the charge body from a saved proof. The file is the prove response
/// plus the `userAddress` it was generated for.
fn charge_body(saved: &Value, include_signals: bool) -> Result<Value> {
    let mut body = serde_json::Map::new();
    for key in [
        "userAddress",
        "modelId",
        "usageHash",
        "nullifier",
        "pricePerTokenWei",
        "costWei",
        "proof",
    ] {
        let value = saved
            .get(key)
            .with_context(|| format!("proof file is missing {key}"))?;
        body.insert(key.to_string(), value.clone());
    }
    if include_signals {
        if let Some(signals) = saved.get("publicSignals") {
            body.insert("publicSignals".to_string(), signals.clone());
        }
    }
    Ok(Value::Object(body))
}

struct Agent {
    client: Client,
    server: String,
}

impl Agent {
    fn new(server: &str) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let url = format!("{}{}", self.server, path);
        tracing::debug!("POST {}", url);
        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = payload["error"].as_str().unwrap_or("unknown error");
            if let Some(diffs) = payload["debug"]["diffs"].as_array() {
                for diff in diffs {
                    eprintln!("    signal {}", diff);
                }
            }
            anyhow::bail!("{} failed ({}): {}", path, status, message);
        }
        Ok(payload)
    }

    async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.server);
        let resp = self.client.get(&url).send().await?;
        Ok(resp.json().await?)
    }

    async fn prove(&self, request: &ProveRequest) -> Result<Value> {
        self.post("/api/zk/prove", request).await
    }

    async fn charge(&self, body: &Value) -> Result<ChargeReceipt> {
        let payload = self.post("/api/zk/charge", body).await?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn settle(&self, request: &ProveRequest) -> Result<SettleResponse> {
        let payload = self.post("/api/zk/settle", request).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

fn print_receipt(receipt: &ChargeReceipt) {
    println!("  TX Hash:       {}", receipt.tx_hash);
    println!("  Block:         {}", receipt.block_number);
    println!(
        "  Status:        {}",
        if receipt.status { "success" } else { "reverted" }
    );
}

fn print_proof_summary(proof: &Value) {
    println!("  Model ID:      {}", proof["modelId"].as_str().unwrap_or("-"));
    println!("  Price/Token:   {} wei", proof["pricePerTokenWei"].as_str().unwrap_or("-"));
    println!("  Cost:          {} wei", proof["costWei"].as_str().unwrap_or("-"));
    println!("  Usage Hash:    {}", proof["usageHash"].as_str().unwrap_or("-"));
    println!("  Nullifier:     {}", proof["nullifier"].as_str().unwrap_or("-"));
}

fn read_proof_file(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let agent = Agent::new(&cli.server);

    match cli.command {
        Commands::Health => {
            let health = agent.health().await?;
            println!("Server Health:");
            println!("  Status:        {}", health.status);
            println!("  Ledger:        {}", health.ledger);
            println!("  Environment:   {}", health.environment);
            println!(
                "  Billing Role:  {}",
                health.billing_role.as_deref().unwrap_or("unreachable")
            );
            println!("  Version:       {}", health.version);
        }

        Commands::Prove { usage, out } => {
            let request = ProveRequest::try_from(usage)?;
            println!("Generating billing proof for {}...\n", request.user_address);
            let mut proof = agent.prove(&request).await?;

            println!("Proof Generated:");
            print_proof_summary(&proof);

            if let Some(path) = out {
                proof["userAddress"] = Value::String(request.user_address.clone());
                std::fs::write(&path, serde_json::to_string_pretty(&proof)?)
                    .with_context(|| format!("Cannot write {}", path.display()))?;
                println!("\nSaved to {}", path.display());
            }
        }

        Commands::Charge { file, no_signals } => {
            let saved = read_proof_file(&file)?;
            let body = charge_body(&saved, !no_signals)?;
            println!("Submitting charge from {}...\n", file.display());
            let receipt = agent.charge(&body).await?;

            println!("Charge Settled:");
            print_receipt(&receipt);
        }

        Commands::Settle { usage } => {
            let request = ProveRequest::try_from(usage)?;
            println!("Proving and settling usage for {}...\n", request.user_address);
            let settlement = agent.settle(&request).await?;

            println!("Settlement Complete:");
            print_proof_summary(&settlement.proof);
            print_receipt(&settlement.receipt);
        }
    }

    Ok(())
}
