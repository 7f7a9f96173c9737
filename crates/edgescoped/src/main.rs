//! edgescoped — the edgescope daemon.
//!
//! Connects to the orchestrator's proxy store, then polls it every period:
//! static entities are refreshed when their markers move, node health and
//! performance series are read over the trailing window, and performance
//! samples are correlated with instance placements and node health.
//!
//! # Usage
//!
//! ```text
//! edgescoped run --config /etc/edgescope.toml --host 10.0.0.7 --period 5
//! edgescoped print-config > edgescope.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

use edgescope_collector::{Collector, SummarySink};
use edgescope_core::EdgescopeConfig;
use edgescope_core::config::StoreConfig;
use edgescope_store::{ConnectOptions, RedisStore};

#[derive(Parser)]
#[command(name = "edgescoped", about = "edgescope telemetry collector")]
struct Cli {
    /// Enable debug logging for edgescope crates.
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collection loop until interrupted.
    Run(RunArgs),
    /// Print the effective configuration as TOML.
    PrintConfig(RunArgs),
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Path to edgescope.toml. Defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Proxy store host.
    #[arg(long)]
    host: Option<String>,

    /// Proxy store port.
    #[arg(long)]
    port: Option<u16>,

    /// Proxy store database index.
    #[arg(long)]
    db: Option<i64>,

    /// Seconds between cycle starts.
    #[arg(long)]
    period: Option<f64>,

    /// Length of the sample window in seconds.
    #[arg(long)]
    window: Option<f64>,

    /// Do not attach node health to performance records.
    #[arg(long)]
    no_health_enrichment: bool,
}

impl RunArgs {
    /// Load the config file (or defaults) and apply command-line overrides.
    fn load_config(&self) -> anyhow::Result<EdgescopeConfig> {
        let mut config = match &self.config {
            Some(path) => EdgescopeConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EdgescopeConfig::default(),
        };

        if let Some(host) = &self.host {
            config.store.host = host.clone();
        }
        if let Some(port) = self.port {
            config.store.port = port;
        }
        if let Some(db) = self.db {
            config.store.db = db;
        }
        if let Some(period) = self.period {
            config.collector.period_secs = period;
        }
        if let Some(window) = self.window {
            config.collector.window_secs = window;
        }
        if self.no_health_enrichment {
            config.collector.enrich_with_health = false;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn connect_options(store: &StoreConfig) -> ConnectOptions {
    ConnectOptions {
        host: store.host.clone(),
        port: store.port,
        db: store.db,
        password: store.password.clone(),
        tls: store.tls,
        connect_timeout: store.connect_timeout(),
        io_timeout: store.io_timeout(),
    }
}

fn init_tracing(debug: bool, format: LogFormat) {
    let default_filter = if debug { "info,edgescope=debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::PrintConfig(args) => {
            print!("{}", args.load_config()?.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.load_config()?;
    info!(store = %config.store.target(), "connecting to proxy store");

    let store = match RedisStore::connect(&connect_options(&config.store)) {
        Ok(store) => store,
        Err(e) => {
            error!(store = %config.store.target(), error = %e, "cannot connect to proxy store");
            return Err(e).context("connecting to proxy store");
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut collector = Collector::new(store, config).with_sink(Box::new(SummarySink::new()));
    collector.run(shutdown_rx).await?;

    info!("edgescoped stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cli = Cli::try_parse_from([
            "edgescoped",
            "run",
            "--host",
            "10.0.0.7",
            "--port",
            "6380",
            "--period",
            "2.5",
            "--no-health-enrichment",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.store.host, "10.0.0.7");
        assert_eq!(config.store.port, 6380);
        assert_eq!(config.collector.period_secs, 2.5);
        assert_eq!(config.collector.window_secs, 1800.0);
        assert!(!config.collector.enrich_with_health);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = RunArgs {
            window: Some(-1.0),
            ..RunArgs::default()
        };
        assert!(args.load_config().is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["edgescoped", "print-config", "--debug", "--log-format", "json"])
            .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn connect_options_follow_store_config() {
        let store = StoreConfig {
            password: Some("pw".to_string()),
            db: 2,
            ..StoreConfig::default()
        };
        let opts = connect_options(&store);
        assert_eq!(opts.password.as_deref(), Some("pw"));
        assert_eq!(opts.db, 2);
        assert_eq!(opts.port, 6379);
    }
}
