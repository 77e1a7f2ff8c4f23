pub use std::io::Write;

pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, warn};
pub use tokio::sync::broadcast;

pub use crate::config::{self, Config};
pub use crate::datalog_writer::DatalogWriter;
pub use crate::felicity::{self, Client, TelemetrySnapshot};
pub use crate::options::Options;
pub use crate::scheduler::Scheduler;
