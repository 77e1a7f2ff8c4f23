use bytes::BytesMut;
use log::debug;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::command::Command;
use super::decoder;
use super::snapshot::{ParseDiagnostic, TelemetrySnapshot, BASIC_KEY, SETTINGS_KEY};
use crate::config;
use crate::error::Error;

// The device sends no length header or terminator, so reads are bounded and
// end-of-message is inferred from quiescence after the closing brace.
const MAX_READ_ATTEMPTS: usize = 20;
const READ_CHUNK_SIZE: usize = 4096;
const QUIESCENCE_WINDOW_MS: u64 = 200;

/// TCP client for the battery's local wifi dongle.
///
/// Stateless apart from the connection parameters: every command opens a
/// fresh socket and closes it before returning, and nothing is cached
/// between polls.
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Client {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            read_timeout,
        }
    }

    pub fn for_battery(battery: &config::Battery) -> Self {
        Self::new(
            battery.host(),
            battery.port(),
            battery.connect_timeout(),
            battery.read_timeout(),
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// One full poll: real info (mandatory), then basic and settings info
    /// (best effort). Three sequential round trips, each on its own
    /// connection.
    pub async fn fetch(&self) -> Result<TelemetrySnapshot, Error> {
        let raw = self.send_and_receive(Command::RealInfo).await?;
        let fields = decoder::decode_real(&raw)?;
        let mut snapshot = TelemetrySnapshot::new(fields);

        match self.send_and_receive(Command::BasicInfo).await {
            Ok(raw) => match decoder::decode_basic(&raw) {
                Ok(map) => snapshot.attach(BASIC_KEY, map),
                Err(diagnostic) => snapshot.push_diagnostic(diagnostic),
            },
            Err(e) => {
                snapshot.push_diagnostic(ParseDiagnostic::new("basic-info", e.to_string(), ""))
            }
        }

        match self.send_and_receive(Command::SetInfo).await {
            Ok(raw) => match decoder::decode_settings(&raw) {
                Ok(map) => snapshot.attach(SETTINGS_KEY, map),
                Err(diagnostic) => snapshot.push_diagnostic(diagnostic),
            },
            Err(e) => {
                snapshot.push_diagnostic(ParseDiagnostic::new("set-info", e.to_string(), ""))
            }
        }

        Ok(snapshot)
    }

    /// Sends one command over a fresh connection and returns the leniently
    /// decoded response text. The socket closes on every exit path.
    pub async fn send_and_receive(&self, command: Command) -> Result<String, Error> {
        let address = (self.host.as_str(), self.port);
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.io_error(e)),
            Err(_) => {
                return Err(self.io_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };

        debug!("{} -> {}:{}", command, self.host, self.port);
        let result = self.exchange(&mut stream, command).await;
        // Close no matter how the exchange went; shutdown failures are not
        // interesting.
        let _ = stream.shutdown().await;

        if let Ok(text) = &result {
            debug!(
                "{} <- {} bytes from {}:{}: {:?}",
                command,
                text.len(),
                self.host,
                self.port,
                text
            );
        }
        result
    }

    async fn exchange(&self, stream: &mut TcpStream, command: Command) -> Result<String, Error> {
        stream
            .write_all(command.bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        stream.flush().await.map_err(|e| self.io_error(e))?;

        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        for _ in 0..MAX_READ_ATTEMPTS {
            let complete = buf.contains(&b'}');
            // Once the closing brace has shown up, one short grace read
            // decides whether the device is still talking.
            let window = if complete {
                Duration::from_millis(QUIESCENCE_WINDOW_MS)
            } else {
                self.read_timeout
            };

            match timeout(window, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(self.io_error(e)),
                Err(_) if complete => break,
                Err(_) => return Err(self.timeout_error(command)),
            }
        }

        if buf.is_empty() {
            return Err(Error::EmptyResponse {
                host: self.host.clone(),
                port: self.port,
                command: command.label(),
            });
        }

        Ok(decode_lossy(&buf))
    }

    fn io_error(&self, source: io::Error) -> Error {
        Error::Connect {
            host: self.host.clone(),
            port: self.port,
            source,
        }
    }

    fn timeout_error(&self, command: Command) -> Error {
        Error::Timeout {
            host: self.host.clone(),
            port: self.port,
            command: command.label(),
        }
    }
}

/// Best-effort text decode: the device speaks ASCII, so anything else is
/// dropped rather than surfaced as an error.
fn decode_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}
