//! Navsession Sim - Scenario Driver
//!
//! Runs a navigation session against recording collaborators and prints
//! one JSON object per line for every step, reply and collaborator call.
//! Logs go to stderr so stdout stays machine-readable.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario with defaults
//! navsession-sim --scenario scenarios/resume-pause.toml
//!
//! # Only the logo overlay, faster pacing
//! navsession-sim -s scenarios/auto-drive.toml --overlays logo --pacing-ms 2
//!
//! # Start on the night style
//! navsession-sim -s scenarios/resume-pause.toml --map-style night
//!
//! # Verbose logging
//! RUST_LOG=debug navsession-sim -s scenarios/resume-pause.toml
//! ```

mod scenario;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use navsession_core::config::parse_overlay_list;
use navsession_core::{
    load_config, load_config_from_path, ConfigOverrides, MapStyle, SessionConfig,
};
use tracing::{error, info};

use scenario::{Scenario, ScenarioRunner};

/// Navsession Sim - drive a navigation session from a scenario file
#[derive(Parser, Debug)]
#[command(name = "navsession-sim")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Scenario file to run
    #[arg(short = 's', long, value_name = "FILE")]
    scenario: PathBuf,

    /// Configuration file path
    #[arg(short = 'c', long, env = "NAVSESSION_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overlays to register while resumed (comma-separated)
    #[arg(long, value_name = "IDS")]
    overlays: Option<String>,

    /// Per-subscription buffer size
    #[arg(long, value_name = "N")]
    signal_buffer: Option<usize>,

    /// Map style applied when the session is created
    #[arg(long, value_name = "STYLE")]
    map_style: Option<String>,

    /// Delay after signal steps, overriding the scenario
    #[arg(long, value_name = "MS")]
    pacing_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NAVSESSION_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref overlays) = self.overlays {
            overrides = overrides.with_overlays(parse_overlay_list(overlays));
        }
        if let Some(size) = self.signal_buffer {
            overrides = overrides.with_signal_buffer(size);
        }
        if let Some(ref style) = self.map_style {
            overrides = overrides.with_map_style(MapStyle::new(style.as_str()));
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "navsession_sim={level},navsession_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration from file, environment and flags
fn resolve_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone()))
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => load_config().context("Failed to load config")?,
    };

    let overrides = args.overrides();
    if !overrides.is_empty() {
        overrides
            .apply(&mut config)
            .context("Invalid command-line overrides")?;
    }

    info!(
        source = %config.source(),
        overlays = config.overlays.len(),
        signal_buffer = config.signal_buffer,
        "Configuration resolved"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Navsession sim starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario: {}", args.scenario.display()))?;

    let pacing = args.pacing_ms.map(Duration::from_millis);
    let mut runner = ScenarioRunner::new(&scenario, pacing, tokio::io::stdout());

    match runner.run(&scenario, &config).await {
        Ok(summary) => {
            info!(
                steps = summary.steps,
                calls = summary.calls,
                rejected = summary.rejected,
                screens_pushed = runner.host().screens.pushed().len(),
                "Scenario complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Scenario failed");
            Err(e.into())
        }
    }
}
