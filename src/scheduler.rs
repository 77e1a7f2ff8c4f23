use crate::prelude::*;
use crate::sensor;
use std::sync::{Arc, Mutex};

/// Counters kept across the whole run and dumped at shutdown.
#[derive(Default)]
pub struct PollStats {
    polls_attempted: u64,
    polls_ok: u64,
    connect_errors: u64,
    timeouts: u64,
    empty_responses: u64,
    decode_errors: u64,
    diagnostics_seen: u64,
}

impl PollStats {
    pub fn record_ok(&mut self, diagnostics: usize) {
        self.polls_attempted += 1;
        self.polls_ok += 1;
        self.diagnostics_seen += diagnostics as u64;
    }

    pub fn record_err(&mut self, error: &felicity::Error) {
        self.polls_attempted += 1;
        match error {
            felicity::Error::Connect { .. } => self.connect_errors += 1,
            felicity::Error::Timeout { .. } => self.timeouts += 1,
            felicity::Error::EmptyResponse { .. } => self.empty_responses += 1,
            felicity::Error::Parse { .. } | felicity::Error::EssentialFieldsMissing { .. } => {
                self.decode_errors += 1
            }
        }
    }

    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Polls attempted: {}", self.polls_attempted);
        info!("  Polls successful: {}", self.polls_ok);
        info!("  Failures:");
        info!("    Connect errors: {}", self.connect_errors);
        info!("    Timeouts: {}", self.timeouts);
        info!("    Empty responses: {}", self.empty_responses);
        info!("    Decode errors: {}", self.decode_errors);
        info!(
            "  Non-fatal parse diagnostics: {}",
            self.diagnostics_seen
        );
    }
}

/// Drives the poll loop: one pass over the enabled batteries per interval
/// tick, until the shutdown channel fires.
pub struct Scheduler {
    config: Arc<Config>,
    datalog: Option<DatalogWriter>,
    pub stats: Arc<Mutex<PollStats>>,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, datalog: Option<DatalogWriter>) -> Self {
        Self {
            config,
            datalog,
            stats: Arc::new(Mutex::new(PollStats::default())),
        }
    }

    pub async fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.poll_interval()));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for battery in self.config.enabled_batteries() {
                        self.poll_one(battery).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, stopping poll loop");
                    break;
                }
            }
        }

        if let Ok(stats) = self.stats.lock() {
            stats.print_summary();
        }
        Ok(())
    }

    /// A failed battery never takes the loop down; the error is counted and
    /// the next battery (or tick) proceeds.
    async fn poll_one(&self, battery: &config::Battery) {
        let client = Client::for_battery(battery);
        match client.fetch().await {
            Ok(snapshot) => {
                for diagnostic in snapshot.diagnostics() {
                    warn!("battery {}: {}", battery.label(), diagnostic);
                }
                self.log_readings(battery, &snapshot);

                if let Some(writer) = &self.datalog {
                    if let Err(e) = writer.write_snapshot(battery.host(), &snapshot) {
                        error!("battery {}: datalog write failed: {}", battery.label(), e);
                    }
                }

                if let Ok(mut stats) = self.stats.lock() {
                    stats.record_ok(snapshot.diagnostics().len());
                }
            }
            Err(e) => {
                error!("battery {}: poll failed: {}", battery.label(), e);
                if let Ok(mut stats) = self.stats.lock() {
                    stats.record_err(&e);
                }
            }
        }
    }

    fn log_readings(&self, battery: &config::Battery, snapshot: &TelemetrySnapshot) {
        let serial = snapshot.serial().unwrap_or_else(|| "unknown".to_string());
        for (sensor, reading) in sensor::readings(snapshot) {
            info!(
                "battery {} [{}]: {} = {}",
                battery.label(),
                serial,
                sensor.key(),
                reading
            );
        }
        if let Some(stats) = sensor::cell_stats(snapshot) {
            if stats.drift_high() {
                warn!(
                    "battery {} [{}]: cell drift {}mV exceeds 30mV",
                    battery.label(),
                    serial,
                    stats.drift_raw()
                );
            }
        }
    }
}
