//! Sealpost server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development (no function key, armored output)
//! PGP_PUBLIC_KEY=... PGP_PRIVATE_KEY_SIGN=... sealpost-server --bind 127.0.0.1:8080
//!
//! # Production
//! PGP_PUBLIC_KEY=... PGP_PRIVATE_KEY_SIGN=... PGP_PASSPHRASE_SIGN=... \
//! FUNCTION_KEY=... sealpost-server --bind 0.0.0.0:8080
//! ```
//!
//! Key material is read from the environment as base64-encoded key blocks
//! (armored or binary inside the base64).

use std::sync::Arc;

use clap::Parser;
use sealpost_server::{AppState, config::EnvSecrets, serve};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sealpost encrypt-and-sign service
#[derive(Parser, Debug)]
#[command(name = "sealpost-server")]
#[command(about = "OpenPGP encrypt-and-sign HTTP service")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Maximum request body size in MiB
    #[arg(long, default_value = "32")]
    max_body_mib: usize,

    /// Emit raw binary messages instead of ASCII armor
    #[arg(long)]
    binary: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Sealpost server starting");
    tracing::info!("Binding to {}", args.bind);

    let secrets = EnvSecrets::new();
    if secrets_missing(&secrets) {
        tracing::warn!(
            "PGP_PUBLIC_KEY or PGP_PRIVATE_KEY_SIGN is not set - requests will be rejected"
        );
    }

    let mut state = AppState::new(Arc::new(secrets));
    state.body_limit = args.max_body_mib * 1024 * 1024;
    state.options.armor = !args.binary;

    let addr = args.bind.parse()?;
    serve(addr, Arc::new(state)).await?;

    Ok(())
}

fn secrets_missing(secrets: &EnvSecrets) -> bool {
    use sealpost_server::config::{PRIVATE_KEY_SIGN, PUBLIC_KEY, SecretsProvider as _};
    secrets.get(PUBLIC_KEY).is_none() || secrets.get(PRIVATE_KEY_SIGN).is_none()
}
