//! claimtrust CLI
//!
//! Scores a scientific claim result against public data sources and prints
//! the verification result as JSON.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use claimtrust_core::{
    domain_weight, infer_claim_type, infer_domain, ClaimMetadata, DEFERRED_DOMAINS, SUPPORTED_DOMAINS,
};
use claimtrust_net::{HttpClient, StubFetcher};
use claimtrust_runtime::{EngineConfig, Registry, VerificationEngine};

#[derive(Parser)]
#[command(name = "claimtrust")]
#[command(author, version, about = "claimtrust: scientific claim verification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3), logs go to stderr
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a claim result
    Verify {
        /// Claim result JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Domain; inferred from the result fields when omitted
        #[arg(short, long, default_value = "")]
        domain: String,

        /// Claim type; inferred when omitted
        #[arg(long)]
        claim_type: Option<String>,

        #[arg(long)]
        task_type: Option<String>,

        #[arg(long)]
        lab: Option<String>,

        /// Engine configuration (TOML)
        #[arg(short, long, env = "CLAIMTRUST_CONFIG")]
        config: Option<PathBuf>,

        /// Never touch the network; every external lookup scores neutral
        #[arg(long)]
        offline: bool,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Infer domain and claim type of a claim result
    Infer {
        /// Claim result JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List supported and deferred domains
    Domains,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Verify {
            input,
            domain,
            claim_type,
            task_type,
            lab,
            config,
            offline,
            output,
        } => {
            let mut metadata = ClaimMetadata::new(&domain);
            metadata.claim_type = claim_type;
            metadata.task_type = task_type;
            metadata.lab_slug = lab;
            run_verify(&input, &domain, metadata, config.as_deref(), offline, output).await?;
        }
        Commands::Infer { input } => {
            let claim = read_claim(&input)?;
            let domain = infer_domain(&claim);
            let claim_type = domain.and_then(|d| infer_claim_type(d, &claim));
            print_json(&json!({ "domain": domain, "claim_type": claim_type }))?;
        }
        Commands::Domains => {
            // adapters are only inspected, never run
            let registry = Registry::standard(&HttpClient::new(Arc::new(StubFetcher::offline())));
            print_json(&domain_listing(&registry))?;
        }
    }

    Ok(())
}

async fn run_verify(
    input: &Path,
    domain: &str,
    metadata: ClaimMetadata,
    config: Option<&Path>,
    offline: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let claim = read_claim(input)?;
    let config = match config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let engine = if offline {
        info!("Offline mode: external lookups score neutral");
        VerificationEngine::with_client(config, HttpClient::new(Arc::new(StubFetcher::offline())))
    } else {
        VerificationEngine::new(config).context("building HTTP client")?
    };

    let result = engine.verify(domain, &claim, &metadata).await;
    info!(
        "{}: score {} badge {} ({} warnings, {} errors)",
        result.domain,
        result.score,
        result.badge,
        result.warnings.len(),
        result.errors.len()
    );

    let rendered = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            fs::write(&path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!("Result saved to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn read_claim(input: &Path) -> Result<Value> {
    let raw = if input.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer).context("reading stdin")?;
        buffer
    } else {
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?
    };
    let claim: Value = serde_json::from_str(&raw).context("claim result is not valid JSON")?;
    if !claim.is_object() {
        anyhow::bail!("claim result must be a JSON object");
    }
    Ok(claim)
}

fn domain_listing(registry: &Registry) -> Value {
    let mut supported = Map::new();
    for domain in SUPPORTED_DOMAINS {
        let claim_types: Map<String, Value> = registry
            .get(domain)
            .map(|adapter| {
                adapter
                    .claim_types()
                    .iter()
                    .map(|spec| {
                        let weights: Map<String, Value> =
                            spec.weights.iter().map(|(name, w)| (name.to_string(), json!(w))).collect();
                        (spec.name.to_string(), Value::Object(weights))
                    })
                    .collect()
            })
            .unwrap_or_default();
        supported.insert(
            domain.to_string(),
            json!({ "domain_weight": domain_weight(domain), "claim_types": claim_types }),
        );
    }
    let deferred: Vec<Value> = DEFERRED_DOMAINS
        .iter()
        .map(|d| json!({ "domain": d.name, "requires": d.dependency, "domain_weight": domain_weight(d.name) }))
        .collect();
    json!({ "supported": supported, "deferred": deferred })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
