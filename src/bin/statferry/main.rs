//! statferry CLI
//!
//! Reads an export definition (YAML), pulls the requested metrics and
//! properties from the monitoring platform, and streams the rows to the
//! configured sink.
//!
//! # Commands
//!
//! - `run` - Execute the export (default if no command specified)
//! - `check-config` - Validate the definition and print the compiled
//!   column layout without contacting the platform
//!
//! # Configuration
//!
//! The definition file is taken from `--config` or the `STATFERRY_CONFIG`
//! environment variable. Credentials can be supplied or overridden with
//! `STATFERRY_HOST` / `STATFERRY_TOKEN`, or with `--host` / `--token`.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use statferry::client::RestClient;
use statferry::collect::Collector;
use statferry::config::ExportConfig;
use statferry::sink;

// =============================================================================
// CLI Definition
// =============================================================================

/// statferry - bulk metrics export
#[derive(Parser)]
#[command(name = "statferry")]
#[command(version)]
#[command(about = "Bulk metrics and property export from a monitoring platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the export definition file (YAML)
    #[arg(short, long, global = true, env = "STATFERRY_CONFIG")]
    config: Option<String>,

    /// Override the platform host URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// Override the API token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Override the output target (file path, or - for stdout)
    #[arg(short, long, global = true)]
    output: Option<String>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the export (default)
    Run,

    /// Validate the definition file without contacting the platform
    CheckConfig,
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Load the definition and layer the overrides on top: environment first,
/// then explicit flags
fn load_config(cli: &Cli) -> Result<ExportConfig, Box<dyn std::error::Error>> {
    let path = cli
        .config
        .as_deref()
        .ok_or("no export definition given (use --config or STATFERRY_CONFIG)")?;
    let mut config = ExportConfig::from_file(path)?;
    config.apply_env_overrides();
    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(token) = &cli.token {
        config.connection.token = token.clone();
    }
    if let Some(output) = &cli.output {
        config.output.path = Some(output.clone());
    }
    Ok(config)
}

/// Validate the definition and print a summary of what an export would do
fn cmd_check_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    config.validate()?;
    let schema = config.compile_schema()?;

    println!("Configuration is valid!");
    println!();
    println!("Connection:");
    println!("  Host: {}", config.connection.host);
    println!("  Verify TLS: {}", config.connection.verify_tls);
    println!();
    println!("Query:");
    println!("  Resource kind: {}", config.query.resource_kind);
    if let Some(adapter) = &config.query.adapter_kind {
        println!("  Adapter kind: {}", adapter);
    }
    if config.query.latest {
        println!("  Window: latest samples only");
    } else {
        println!(
            "  Rollup: {} every {} minutes",
            config.query.rollup, config.query.rollup_minutes
        );
    }
    println!();
    println!("Columns ({} metric, {} property):", schema.num_metrics(), schema.num_props());
    for field in schema.fields() {
        let aggregation = match field.aggregation {
            Some(kind) => format!("  [{}]", kind.as_str()),
            None => String::new(),
        };
        println!(
            "  {:<24} <- {}{}",
            field.alias,
            field.qualified_name(),
            aggregation
        );
    }
    println!();
    println!("Output:");
    println!("  Format: {}", config.output.format);
    match (&config.output.path, &config.output.address) {
        (Some(path), _) => println!("  Target: {}", path),
        (None, Some(address)) => println!("  Target: {}", address),
        (None, None) => println!("  Target: stdout"),
    }
    println!();
    println!("Collection:");
    println!("  Workers: {}", config.collect.workers);
    println!("  Max rows per chunk: {}", config.collect.max_rows);
    if config.collect.compact {
        println!("  Compaction: {}", config.collect.compact_policy);
    }

    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Commands::CheckConfig) = &cli.command {
        return cmd_check_config(&cli);
    }

    let default_level = if cli.verbose {
        "statferry=debug"
    } else {
        "statferry=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout may carry the export itself.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting statferry v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    config.validate()?;

    let api = Arc::new(RestClient::new(&config.connection)?);
    let sink = sink::build_sink(&config.output).await?;
    let collector = Collector::new(api, sink, &config)?;

    let started = std::time::Instant::now();
    collector.run().await?;

    let stats = collector.stats();
    info!(
        resources = stats.resources_listed(),
        rows = stats.rows_written(),
        failed = stats.resources_failed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Export complete"
    );
    Ok(())
}
