use std::io;

/// Errors surfaced by the Felicity protocol client.
///
/// Every failure path of a poll maps to exactly one of these kinds; no raw
/// io or serde error crosses the fetch boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The socket could not be opened, or died mid-exchange.
    #[error("error talking to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// No (or incomplete) data within the allotted window.
    #[error("timed out waiting for {command} response from {host}:{port}")]
    Timeout {
        host: String,
        port: u16,
        command: &'static str,
    },

    /// The connection succeeded but the device sent zero bytes.
    #[error("empty {command} response from {host}:{port}")]
    EmptyResponse {
        host: String,
        port: u16,
        command: &'static str,
    },

    /// A non-essential sub-document failed to parse. Never fatal to a poll;
    /// carried as a snapshot diagnostic rather than returned from fetch().
    #[error("could not parse {section}: {detail}")]
    Parse {
        section: &'static str,
        detail: String,
        snippet: String,
    },

    /// The real-info response carries neither `Batsoc` nor `Batt`.
    #[error("response carries neither Batsoc nor Batt: {raw:?}")]
    EssentialFieldsMissing { raw: String },
}

impl Error {
    /// Stable name for stats counters and log filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Connect { .. } => "connect",
            Error::Timeout { .. } => "timeout",
            Error::EmptyResponse { .. } => "empty-response",
            Error::Parse { .. } => "parse",
            Error::EssentialFieldsMissing { .. } => "essential-fields-missing",
        }
    }
}
