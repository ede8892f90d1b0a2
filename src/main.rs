use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use promtap::client::Client;
use promtap::config::Config;
use promtap::engine::Engine;
use promtap::record::stream_name;
use promtap::sink::JsonLinesSink;
use promtap::state::StateStore;

/// Per-day rollup extractor for Prometheus-compatible endpoints.
#[derive(Parser)]
#[command(name = "promtap", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the JSON progress state file.
    #[arg(short, long, default_value = "promtap.state.json")]
    state: PathBuf,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,

    /// Print the JSON catalog of output streams for the config and exit.
    Discover,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("promtap {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing. Logs go to stderr; stdout is the record channel.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    // Config is required for both discovery and a run.
    let config_path = cli
        .config
        .context("--config is required (use --help for usage)")?;

    let cfg = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Some(Command::Discover) = &cli.command {
        println!("{}", serde_json::to_string_pretty(&catalog(&cfg))?);
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %cfg.endpoint,
        metrics = cfg.metrics.len(),
        "starting promtap",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg, &cli.state).await })
}

async fn run(cfg: Config, state_path: &std::path::Path) -> Result<()> {
    let client = Client::new(&cfg.endpoint, cfg.timeout)?;
    let mut sink = JsonLinesSink::stdout();
    let mut state = StateStore::open(state_path)?;

    let summary = Engine::new(&client, &mut sink, &mut state, cfg.start_date)
        .run(&cfg.metrics, Utc::now())
        .await?;

    if !summary.failed_metrics.is_empty() {
        bail!(
            "{} of {} metrics stopped early on fetch failures: {}",
            summary.failed_metrics.len(),
            cfg.metrics.len(),
            summary.failed_metrics.join(", "),
        );
    }

    tracing::info!("promtap run complete");

    Ok(())
}

/// Catalog of the streams this configuration produces.
fn catalog(cfg: &Config) -> serde_json::Value {
    let streams: Vec<serde_json::Value> = cfg
        .metrics
        .iter()
        .flat_map(|metric| {
            metric.aggregations.iter().map(|kind| {
                serde_json::json!({
                    "stream": stream_name(&metric.name, *kind),
                    "key_properties": ["metric", "aggregation", "period_start"],
                    "schema": {
                        "type": "object",
                        "properties": {
                            "stream": {"type": "string"},
                            "metric": {"type": "string"},
                            "aggregation": {"type": "string"},
                            "period_start": {"type": "string", "format": "date-time"},
                            "period_end": {"type": "string", "format": "date-time"},
                            "value": {"type": "number"},
                        },
                    },
                })
            })
        })
        .collect();

    serde_json::json!({ "streams": streams })
}
