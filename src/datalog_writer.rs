use crate::prelude::*;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Appends one JSON line per snapshot to a local file.
#[derive(Debug, Clone)]
pub struct DatalogWriter {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
    lines_written: Arc<Mutex<u64>>,
}

impl DatalogWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("Opening datalog file at {}", path);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open datalog file {}: {}", path, e);
                return Err(e.into());
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
            {
                error!("Failed to set permissions on datalog file {}: {}", path, e);
                return Err(e.into());
            }
        }

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
            lines_written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn write_snapshot(&self, host: &str, snapshot: &TelemetrySnapshot) -> Result<()> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let mut json_data = serde_json::Map::new();
        json_data.insert(
            "utc_timestamp".to_string(),
            serde_json::Value::Number(timestamp.into()),
        );
        json_data.insert(
            "host".to_string(),
            serde_json::Value::String(host.to_string()),
        );
        if let Some(serial) = snapshot.serial() {
            json_data.insert("serial".to_string(), serde_json::Value::String(serial));
        }
        json_data.insert("fields".to_string(), snapshot.to_value());

        let json_string = serde_json::to_string(&serde_json::Value::Object(json_data))?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("Failed to lock datalog file"))?;
        match writeln!(file, "{}", json_string) {
            Ok(_) => {
                if let Err(e) = file.flush() {
                    error!("Failed to flush datalog file {}: {}", self.path, e);
                    return Err(e.into());
                }

                let mut lines_written = self
                    .lines_written
                    .lock()
                    .map_err(|_| anyhow!("Failed to lock line counter"))?;
                *lines_written += 1;
                debug!("Snapshots stored in datalog file: {}", *lines_written);

                Ok(())
            }
            Err(e) => {
                error!("Failed to write to datalog file {}: {}", self.path, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_snapshot() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let writer = DatalogWriter::new(temp_file.path().to_str().unwrap())?;

        let mut fields = serde_json::Map::new();
        fields.insert("DevSN".to_string(), json!("F2100123456"));
        fields.insert("Batsoc".to_string(), json!([[8400, 0, 0]]));
        let snapshot = TelemetrySnapshot::new(fields);

        writer.write_snapshot("192.168.1.50", &snapshot)?;
        writer.write_snapshot("192.168.1.50", &snapshot)?;

        let contents = std::fs::read_to_string(temp_file.path())?;
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let json: serde_json::Value = serde_json::from_str(lines[0])?;
        assert_eq!(json["host"], "192.168.1.50");
        assert_eq!(json["serial"], "F2100123456");
        assert_eq!(json["fields"]["Batsoc"][0][0], 8400);
        assert!(json["utc_timestamp"].is_u64());

        Ok(())
    }
}
