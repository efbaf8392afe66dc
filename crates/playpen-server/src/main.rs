//! Web server for running untrusted code snippets in disposable sandboxes
//!
//! This binary wires the execution pipeline to its HTTP boundary: it loads
//! service configuration, connects the Docker executor, and serves the JSON
//! API plus the embedded browser page. Everything interesting about how a
//! submission is validated, isolated, and journaled lives in playpen-core;
//! this file only assembles the pieces and owns process-level concerns like
//! logging setup and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use playpen_core::config::ConfigLoader;
use playpen_core::{
    DockerExecutor, ExecutionJournal, ExecutionLimits, ExecutionPipeline, ServiceConfig,
};
use playpen_server::{shutdown_signal, PlaypenServer, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Playpen - run untrusted code in disposable Docker sandboxes")]
struct Cli {
    #[clap(long, short, help = "Path to a YAML configuration file")]
    config: Option<String>,

    #[clap(long, help = "Bind address, overriding the configuration file")]
    bind_addr: Option<String>,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(long, help = "Disable CORS")]
    no_cors: bool,

    #[clap(long, help = "Disable per-request logging")]
    quiet_requests: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    run_server(cli).await
}

async fn run_server(cli: Cli) -> Result<()> {
    let service_config = match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path);
            ConfigLoader::from_file(path).await?
        }
        None => {
            log::info!("No configuration file given, using built-in defaults");
            ConfigLoader::from_defaults()?
        }
    };

    let bind_addr = resolve_bind_addr(&cli, &service_config)?;

    let registry = service_config.registry();
    let journal = Arc::new(ExecutionJournal::new(service_config.journal.capacity));
    let executor = Arc::new(DockerExecutor::connect(service_config.limits.memory_bytes)?);
    let limits = ExecutionLimits {
        max_code_length: service_config.limits.max_code_length,
        timeout: service_config.limits.timeout(),
    };
    let pipeline = Arc::new(
        ExecutionPipeline::new(registry, executor, journal, limits)
            .with_max_concurrent(service_config.limits.max_concurrent),
    );

    let server_config = ServerConfig::default()
        .with_bind_addr(bind_addr)
        .with_cors(!cli.no_cors)
        .with_logging(!cli.quiet_requests);

    log::info!("Starting playpen server on {}...", bind_addr);
    log::info!("Configuration:");
    log::info!("  Languages: {}", pipeline.registry().supported_label());
    log::info!(
        "  Max code length: {} chars",
        service_config.limits.max_code_length
    );
    log::info!("  Timeout: {}s", service_config.limits.timeout_seconds);
    log::info!("  Memory ceiling: {} bytes", service_config.limits.memory_bytes);
    log::info!("  Journal capacity: {}", service_config.journal.capacity);
    match service_config.limits.max_concurrent {
        Some(limit) => log::info!("  Max concurrent executions: {}", limit),
        None => log::info!("  Max concurrent executions: unbounded"),
    }

    let server = PlaypenServer::with_config(pipeline, server_config);

    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    log::info!("Playpen server shut down gracefully.");
    Ok(())
}

fn resolve_bind_addr(cli: &Cli, service_config: &ServiceConfig) -> Result<SocketAddr> {
    let raw = cli
        .bind_addr
        .as_deref()
        .unwrap_or(&service_config.server.bind_addr);
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", raw, e))
}
