//! Interactive console for a limitforge decision service.
//!
//! ```text
//! limitforge-console --base-url http://localhost:8000 health
//! limitforge-console --api-key $KEY check --resource GET:/orders --subject abc --repeat 5
//! ```

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use limitforge::{CheckRequest, DecisionClient, DecisionSource};
use render::HistoryRow;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "limitforge-console", about = "Explore a rate-limit decision service")]
struct Cli {
    /// Service root URL.
    #[arg(long, env = "LIMITFORGE_BASE_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// API key sent as X-API-Key.
    #[arg(long, env = "LIMITFORGE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Bound on each round trip, in milliseconds.
    #[arg(long, env = "LIMITFORGE_TIMEOUT_MS", default_value_t = 1000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe /v1/health.
    Health,
    /// Issue one or more checks and show the decision.
    Check {
        #[arg(long)]
        resource: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 1)]
        cost: u32,
        /// Number of sequential checks.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_millis(cli.timeout_ms);

    match cli.command {
        Command::Health => {
            let probe = DecisionClient::builder()
                .base_url(cli.base_url.as_str())
                .timeout(timeout)
                .build_health_probe()
                .context("invalid client configuration")?;
            let result = probe.health().await;
            if let Err(err) = &result {
                tracing::debug!(error = %err, "health probe failed");
            }
            println!("{}", render::health_badge(&result));
        }
        Command::Check { resource, subject, cost, repeat } => {
            let api_key = cli.api_key.context("an API key is required (--api-key)")?;
            let client = DecisionClient::builder()
                .base_url(cli.base_url.as_str())
                .api_key(api_key.as_str())
                .timeout(timeout)
                .build()
                .context("invalid client configuration")?;
            let request = CheckRequest::new(resource, subject, cost)?;
            println!("{}\n", render::curl_snippet(client.base_url(), &api_key, &request));

            let mut history = Vec::new();
            for _ in 0..repeat.max(1) {
                let result = client.check(&request).await;
                println!("{}", render::verdict(&result));
                match &result {
                    Ok(decision) => {
                        print!("{}", render::header_block(decision));
                        println!("  {}", render::meter(decision.remaining(), decision.limit()));
                        println!("{}", serde_json::to_string_pretty(decision)?);
                        history.push(HistoryRow::from_decision(decision, request.subject()));
                    }
                    Err(err) => println!("  {err}"),
                }
                println!();
            }
            if history.len() > 1 {
                print!("{}", render::history_table(&history));
            }
        }
    }
    Ok(())
}
