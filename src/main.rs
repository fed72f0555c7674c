//! Remote Signer CLI
//!
//! Runs the signing service and a few operator helpers around it.

use clap::{Parser, Subcommand};
use remote_signer::auth::{self, SignedRequest};
use remote_signer::config::env_vars;
use remote_signer::{server, Config, Error, Result, SigningGateway};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "remote-signer")]
#[command(about = "Policy-gated remote signer for EVM and Solana transactions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to an allowlist override file (JSON)
    #[arg(short, long, global = true)]
    allowlist: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP signing service
    Serve {
        /// Listen address, overrides HOST and PORT
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Derive the signer keys and print their addresses
    Status,

    /// Validate configuration and print the effective allowlists
    CheckConfig,

    /// Compute authentication headers for a request
    SignHeaders {
        /// HTTP method
        #[arg(short, long, default_value = "POST")]
        method: String,

        /// Path including any query string
        #[arg(short, long, default_value = "/sign")]
        path: String,

        /// Request body as a literal string
        #[arg(short, long, conflicts_with = "body_file")]
        body: Option<String>,

        /// Read the request body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Serve { listen } => {
            let mut config = Config::from_env(cli.allowlist.as_deref())?;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            run_serve(config).await?;
        }
        Commands::Status => {
            let config = Config::from_env(cli.allowlist.as_deref())?;
            let gateway = SigningGateway::from_config(config).await?;
            let status = gateway.signer_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::CheckConfig => {
            let config = Config::from_env(cli.allowlist.as_deref())?;
            tracing::info!(
                listen = %config.listen,
                secret_len = config.secret_len(),
                ipv4_allowlist_configured = config.ipv4_allowlist_configured,
                "configuration is valid"
            );
            println!("{}", serde_json::to_string_pretty(&config.allowlist)?);
        }
        Commands::SignHeaders {
            method,
            path,
            body,
            body_file,
        } => {
            run_sign_headers(method, path, body, body_file)?;
        }
    }

    Ok(())
}

async fn run_serve(config: Config) -> Result<()> {
    let listen = config.listen;
    tracing::info!(
        listen = %listen,
        evm_chains = ?config.allowlist.evm.allowed_chain_ids,
        evm_targets = config.allowlist.evm.allowed_to.len(),
        solana_enabled = config.allowlist.solana.enabled,
        solana_programs = config.allowlist.solana.allowed_program_ids.len(),
        "Starting remote signer"
    );

    let gateway = Arc::new(SigningGateway::from_config(config).await?);
    server::serve(gateway, listen).await
}

fn run_sign_headers(
    method: String,
    path: String,
    body: Option<String>,
    body_file: Option<PathBuf>,
) -> Result<()> {
    let secret = std::env::var(env_vars::REMOTE_SIGNER_SECRET)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            Error::Config(format!("{} is not set", env_vars::REMOTE_SIGNER_SECRET))
        })?;
    let secret = SecretString::from(secret);

    let body = match (body, body_file) {
        (Some(body), _) => body.into_bytes(),
        (None, Some(path)) => std::fs::read(path)?,
        (None, None) => Vec::new(),
    };

    let method = method.to_uppercase();
    let headers = auth::sign_request_headers(
        &secret,
        SignedRequest {
            method: &method,
            path_and_query: &path,
            body: &body,
        },
        auth::unix_now(),
        &auth::generate_nonce(),
    )?;

    for (name, value) in [
        (auth::HEADER_TIMESTAMP, headers.timestamp),
        (auth::HEADER_NONCE, headers.nonce),
        (auth::HEADER_SIGNATURE, headers.signature),
    ] {
        println!("{}: {}", name, value.unwrap_or_default());
    }
    Ok(())
}
