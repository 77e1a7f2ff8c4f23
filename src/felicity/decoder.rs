//! Tolerant decoders for the three query responses.
//!
//! The real-info decoder combines a best-effort whole-document parse with an
//! ordered list of independent per-field extractors, so one corrupted key
//! cannot take the rest of the document down with it. All values come out as
//! the device sent them: raw fixed-point integers, unscaled.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::frame;
use super::snapshot::ParseDiagnostic;
use crate::error::Error;

// Value shapes seen on the wire. Inner arrays never nest further, which
// keeps the patterns regular.
const NESTED_ARRAY: &str = r"\[\s*\[[^\[\]]*\](?:\s*,\s*(?:\[[^\[\]]*\]|null))*\s*\]";
const FLAT_ARRAY: &str = r"\[[^\[\]]*\]";
const INTEGER: &str = r"-?\d+";
const TEXT: &str = r#""[^"]*""#;

fn field_pattern(key: &str, value: &str) -> Regex {
    Regex::new(&format!(r#""{}"\s*:\s*({})"#, key, value)).unwrap()
}

lazy_static! {
    /// One entry per known field; patterns are tried in order and the first
    /// capture that parses wins. `Batt` lists its third-element arities most
    /// specific first: a charge/discharge pair or combined value, then an
    /// explicit null, then the legacy two-array form.
    static ref FIELD_EXTRACTORS: Vec<(&'static str, Vec<Regex>)> = vec![
        ("Batt", vec![
            field_pattern("Batt", r"\[\s*\[[^\[\]]*\]\s*,\s*\[[^\[\]]*\]\s*,\s*\[[^\[\]]*\]\s*\]"),
            field_pattern("Batt", r"\[\s*\[[^\[\]]*\]\s*,\s*\[[^\[\]]*\]\s*,\s*null\s*\]"),
            field_pattern("Batt", r"\[\s*\[[^\[\]]*\]\s*,\s*\[[^\[\]]*\]\s*\]"),
        ]),
        ("Batsoc", vec![field_pattern("Batsoc", NESTED_ARRAY)]),
        ("BMaxMin", vec![field_pattern("BMaxMin", NESTED_ARRAY)]),
        ("LVolCur", vec![field_pattern("LVolCur", NESTED_ARRAY)]),
        ("BTemp", vec![field_pattern("BTemp", NESTED_ARRAY)]),
        ("Templist", vec![field_pattern("Templist", NESTED_ARRAY)]),
        ("BatcelList", vec![field_pattern("BatcelList", NESTED_ARRAY)]),
        ("BatInOut", vec![field_pattern("BatInOut", FLAT_ARRAY)]),
        ("CommVer", vec![
            field_pattern("CommVer", TEXT),
            field_pattern("CommVer", INTEGER),
        ]),
        ("DevSN", vec![field_pattern("DevSN", TEXT)]),
        ("wifiSN", vec![field_pattern("wifiSN", TEXT)]),
        ("Estate", vec![field_pattern("Estate", INTEGER)]),
        ("Bfault", vec![field_pattern("Bfault", INTEGER)]),
        ("Bwarn", vec![field_pattern("Bwarn", INTEGER)]),
    ];

    // Some firmware writes Python-style None for missing numbers.
    static ref BARE_NONE: Regex = Regex::new(r"\bNone\b").unwrap();
}

/// Quote normalization, tail truncation and None-to-null rewriting, applied
/// to every response before any parse attempt.
fn sanitize(text: &str) -> String {
    let normalized = frame::normalize_quotes(text);
    let truncated = frame::truncate_at_last_brace(&normalized);
    BARE_NONE.replace_all(truncated, "null").into_owned()
}

fn extract_field(text: &str, patterns: &[Regex]) -> Option<Value> {
    for pattern in patterns {
        if let Some(captures) = pattern.captures(text) {
            if let Ok(value) = serde_json::from_str(&captures[1]) {
                return Some(value);
            }
        }
    }
    None
}

fn has_value(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).map(|v| !v.is_null()).unwrap_or(false)
}

/// Older firmware reports pack temperatures under `Templist` only; expose
/// its first two values under the canonical `BTemp` shape.
fn templist_fallback(fields: &Map<String, Value>) -> Option<Value> {
    let list = fields.get("Templist")?.get(0)?.as_array()?;
    let temps: Vec<Value> = list.iter().take(2).cloned().collect();
    if temps.is_empty() {
        None
    } else {
        Some(json!([temps]))
    }
}

/// Decodes the real-info response into the canonical field map.
///
/// Never fails on malformed input except for the final essential-field
/// check: a response from which neither `Batsoc` nor `Batt` can be recovered
/// is not usable telemetry.
pub fn decode_real(text: &str) -> Result<Map<String, Value>, Error> {
    let sanitized = sanitize(text);
    let mut fields = Map::new();

    // Best-effort whole-document parse keeps unknown keys around for
    // downstream consumers.
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&sanitized) {
        fields = map;
    }

    // Per-field extraction runs regardless of the outcome above, recovering
    // known fields from documents that are not valid JSON as a whole.
    for (key, patterns) in FIELD_EXTRACTORS.iter() {
        if let Some(value) = extract_field(&sanitized, patterns) {
            fields.insert((*key).to_string(), value);
        }
    }

    if !has_value(&fields, "BTemp") {
        if let Some(temps) = templist_fallback(&fields) {
            fields.insert("BTemp".to_string(), temps);
        }
    }

    if !has_value(&fields, "Batsoc") && !has_value(&fields, "Batt") {
        return Err(Error::EssentialFieldsMissing {
            raw: text.to_string(),
        });
    }

    Ok(fields)
}

/// Decodes the basic-info response as a single JSON object. Failure is
/// reported as a diagnostic, never as a poll error.
pub fn decode_basic(text: &str) -> Result<Map<String, Value>, ParseDiagnostic> {
    let sanitized = sanitize(text);
    match serde_json::from_str::<Value>(&sanitized) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ParseDiagnostic::new(
            "basic-info",
            format!("expected an object, got {}", value_kind(&other)),
            text,
        )),
        Err(e) => Err(ParseDiagnostic::new("basic-info", e.to_string(), text)),
    }
}

/// Decodes the set-info response, which may carry several concatenated
/// objects. All parseable candidates merge left to right; a later key wins,
/// matching how the device emits overlapping threshold blocks.
pub fn decode_settings(text: &str) -> Result<Map<String, Value>, ParseDiagnostic> {
    let sanitized = sanitize(text);
    let mut merged = Map::new();
    let mut parsed_any = false;

    for candidate in frame::split_objects(&sanitized) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            parsed_any = true;
            for (key, value) in map {
                merged.insert(key, value);
            }
        }
    }

    if parsed_any {
        Ok(merged)
    } else {
        Err(ParseDiagnostic::new(
            "set-info",
            "no parseable settings object",
            text,
        ))
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
