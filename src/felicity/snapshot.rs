use serde_json::{Map, Value};

/// Reserved key holding versions/types/serials from the basic-info query.
pub const BASIC_KEY: &str = "_basic";
/// Reserved key holding merged thresholds/limits from the set-info query.
pub const SETTINGS_KEY: &str = "_settings";

/// One non-fatal decode failure. Kept on the snapshot so the caller decides
/// whether to log, surface or ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub section: &'static str,
    pub detail: String,
    pub snippet: String,
}

impl ParseDiagnostic {
    pub fn new(section: &'static str, detail: impl Into<String>, raw: &str) -> Self {
        Self {
            section,
            detail: detail.into(),
            snippet: raw.chars().take(120).collect(),
        }
    }
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.snippet.is_empty() {
            write!(f, "{}: {}", self.section, self.detail)
        } else {
            write!(f, "{}: {} (raw: {:?})", self.section, self.detail, self.snippet)
        }
    }
}

/// The unified result of one poll.
///
/// Field values are exactly what the device reported: raw fixed-point
/// integers, strings and small nested arrays. Scaling to physical units is
/// the job of [`crate::sensor`]. A snapshot is assembled once and never
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    fields: Map<String, Value>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl TelemetrySnapshot {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn attach(&mut self, key: &str, map: Map<String, Value>) {
        self.fields.insert(key.to_string(), Value::Object(map));
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: ParseDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Non-fatal parse failures collected while assembling this snapshot.
    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn basic(&self) -> Option<&Map<String, Value>> {
        self.fields.get(BASIC_KEY)?.as_object()
    }

    pub fn settings(&self) -> Option<&Map<String, Value>> {
        self.fields.get(SETTINGS_KEY)?.as_object()
    }

    /// Integer at `field[i][j]..`; `None` when any step is missing, null or
    /// the wrong shape.
    pub fn nested_int(&self, field: &str, path: &[usize]) -> Option<i64> {
        let mut current = self.fields.get(field)?;
        for &index in path {
            current = current.get(index)?;
        }
        current.as_i64()
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.fields.get(field)?.as_i64()
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field)?.as_str()
    }

    /// Device serial for labelling, preferring the BMS serial over the wifi
    /// dongle's.
    pub fn serial(&self) -> Option<String> {
        for key in ["DevSN", "wifiSN"] {
            match self.fields.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }

    /// The field map as one JSON object, e.g. for datalog output.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}
