use crate::prelude::*;

use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub batteries: Vec<Battery>,

    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Optional path to append each snapshot as one JSON line
    pub datalog_file: Option<String>,
}

// Battery {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Battery {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,

    /// Model tag for log labelling only; the wire protocol is identical
    /// across models.
    pub device_type: Option<String>,

    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
}

impl Battery {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn device_type(&self) -> Option<&str> {
        self.device_type.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.unwrap_or(5000))
    }

    pub fn read_timeout(&self) -> Duration {
        // matches the 3s the stock monitor tooling uses
        Duration::from_millis(self.read_timeout_ms.unwrap_or(3000))
    }

    pub fn label(&self) -> String {
        match self.device_type() {
            Some(device_type) => format!("{}:{} ({})", self.host, self.port, device_type),
            None => format!("{}:{}", self.host, self.port),
        }
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Dumps the loaded configuration, called once the logger is up.
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!(
            "  Batteries: {} configured, {} enabled",
            self.batteries.len(),
            self.batteries.iter().filter(|b| b.enabled).count()
        );
        for (i, battery) in self.batteries.iter().enumerate() {
            info!("    Battery[{}]:", i);
            info!("      Enabled: {}", battery.enabled);
            info!("      Host: {}", battery.host);
            info!("      Port: {}", battery.port);
            info!(
                "      Device Type: {}",
                battery.device_type().unwrap_or("(unset)")
            );
            info!("      Connect Timeout: {:?}", battery.connect_timeout());
            info!("      Read Timeout: {:?}", battery.read_timeout());
        }
        info!("  Poll Interval: {}s", self.poll_interval);
        info!("  Log Level: {}", self.loglevel);
        info!(
            "  Datalog File: {}",
            self.datalog_file.as_deref().unwrap_or("(disabled)")
        );
    }

    fn validate(&self) -> Result<()> {
        if self.batteries.is_empty() {
            bail!("at least one battery must be configured");
        }
        for battery in &self.batteries {
            if battery.host.is_empty() {
                bail!("battery host cannot be empty");
            }
            if battery.port == 0 {
                bail!("battery port must be between 1 and 65535");
            }
        }
        if self.poll_interval == 0 {
            bail!("poll_interval must be at least 1 second");
        }
        Ok(())
    }

    pub fn enabled_batteries(&self) -> impl Iterator<Item = &Battery> {
        self.batteries.iter().filter(|battery| battery.enabled())
    }

    pub fn poll_interval(&self) -> u64 {
        self.poll_interval
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    pub fn datalog_file(&self) -> Option<&str> {
        self.datalog_file.as_deref()
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_port() -> u16 {
        // the dongle's local monitor port
        53970
    }

    fn default_poll_interval() -> u64 {
        30
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
