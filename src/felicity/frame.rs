//! Buffer-level cleanup for the battery's loosely JSON-shaped replies.
//!
//! The device quotes with `'`, appends garbage after the closing brace, and
//! answers the settings query with several objects glued together with no
//! separator. Everything here is best-effort and never fails.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Last-resort object match when the depth scan pairs nothing up.
    static ref FALLBACK_OBJECT: Regex = Regex::new(r"(?s)\{.*?\}").unwrap();
}

/// Replaces every single quote with a double quote. Idempotent.
pub fn normalize_quotes(text: &str) -> String {
    text.replace('\'', "\"")
}

/// Drops anything after the final `}`. Text without a brace passes through.
pub fn truncate_at_last_brace(text: &str) -> &str {
    match text.rfind('}') {
        Some(pos) => &text[..=pos],
        None => text,
    }
}

/// Scans for brace-balanced object candidates.
///
/// Each span where the brace depth returns to zero is emitted as one
/// candidate; noise outside the spans is skipped. When the scan pairs
/// nothing up, a permissive `{...}` match is tried before giving up with an
/// empty vec. Candidates are not guaranteed to be valid JSON.
pub fn split_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        objects.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    if objects.is_empty() {
        objects.extend(FALLBACK_OBJECT.find_iter(text).map(|m| m.as_str()));
    }

    objects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_quotes_is_idempotent() {
        let once = normalize_quotes("{'a': 'b'}");
        assert_eq!(once, r#"{"a": "b"}"#);
        assert_eq!(normalize_quotes(&once), once);
    }

    #[test]
    fn truncates_trailing_garbage() {
        assert_eq!(truncate_at_last_brace("{\"a\":1}\x00\x00junk"), "{\"a\":1}");
        assert_eq!(truncate_at_last_brace("no brace here"), "no brace here");
    }

    #[test]
    fn splits_concatenated_objects() {
        let text = r#"{"cVolHi":3650}{"cVolLo":2800}{"cCurHi":100}"#;
        let objects = split_objects(text);
        assert_eq!(objects.len(), 3);
        for object in &objects {
            assert!(serde_json::from_str::<serde_json::Value>(object).is_ok());
        }
        assert_eq!(objects[0], r#"{"cVolHi":3650}"#);
        assert_eq!(objects[2], r#"{"cCurHi":100}"#);
    }

    #[test]
    fn tolerates_noise_between_objects() {
        let text = "ACK{\"a\":1}\r\n--{\"b\":{\"c\":2}}trailing";
        let objects = split_objects(text);
        assert_eq!(objects, vec!["{\"a\":1}", "{\"b\":{\"c\":2}}"]);
    }

    #[test]
    fn falls_back_to_permissive_match() {
        // Unbalanced open brace defeats the depth scan but not the fallback.
        let text = "{\"a\":{\"b\":1}";
        let objects = split_objects(text);
        assert_eq!(objects, vec!["{\"a\":{\"b\":1}"]);
    }

    #[test]
    fn empty_when_no_object_found() {
        assert!(split_objects("no json at all").is_empty());
        assert!(split_objects("").is_empty());
    }
}
