pub mod client;
pub mod command;
pub mod decoder;
pub mod frame;
pub mod snapshot;

pub use crate::error::Error;
pub use client::Client;
pub use command::Command;
pub use snapshot::TelemetrySnapshot;
