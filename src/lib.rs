// Module declarations for the bridge's core components
pub mod config;         // YAML configuration handling
pub mod datalog_writer; // JSON-lines snapshot logging
pub mod error;          // Typed protocol errors
pub mod felicity;       // Felicity local wifi protocol implementation
pub mod options;        // Command line options parsing
pub mod prelude;        // Common imports and types
pub mod scheduler;      // Periodic poll loop
pub mod sensor;         // Derived readings and state classification

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use std::sync::Arc;

fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();
}

/// Main application entry point: load config, then either a single poll
/// pass (`--once`) or the scheduler loop until the shutdown channel fires.
pub async fn app(shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let options = Options::new();

    // Config must load before the logger so its loglevel applies from the
    // first line.
    let config = match Config::new(options.config_file.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config {}: {:?}", options.config_file, err);
            std::process::exit(255);
        }
    };
    init_logger(config.loglevel());

    info!(
        "Starting felicity-bridge {} with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );
    config.log_summary();

    let config = Arc::new(config);

    if options.once {
        return poll_once(&config).await;
    }

    let datalog = match config.datalog_file() {
        Some(path) => Some(DatalogWriter::new(path)?),
        None => None,
    };

    let scheduler = Scheduler::new(config, datalog);
    scheduler.start(shutdown_rx).await
}

/// One poll per enabled battery, snapshots printed as JSON on stdout.
/// Fails if any battery failed, so commissioning scripts can check the exit
/// code.
async fn poll_once(config: &Config) -> Result<()> {
    let mut failed = false;

    for battery in config.enabled_batteries() {
        let client = Client::for_battery(battery);
        match client.fetch().await {
            Ok(snapshot) => {
                for diagnostic in snapshot.diagnostics() {
                    warn!("battery {}: {}", battery.label(), diagnostic);
                }
                println!("{}", serde_json::to_string_pretty(&snapshot.to_value())?);
            }
            Err(e) => {
                error!("battery {}: poll failed: {}", battery.label(), e);
                failed = true;
            }
        }
    }

    if failed {
        bail!("one or more batteries failed to poll");
    }
    Ok(())
}
