//!
//! facegate server binary
//! ----------------------
//! Command-line entry point for the interaction service. Supports configuration
//! via CLI flags and environment variables; see `--help`.

use anyhow::Result;
use std::env;

use facegate::config::{has_flag, ServerConfig, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    // Initialize tracing subscriber; RUST_LOG overrides the default level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cfg = ServerConfig::load(&args);
    println!("facegate starting: http={}, issuer={}", cfg.http_port, cfg.issuer);
    facegate::server::run_with_config(cfg).await
}
