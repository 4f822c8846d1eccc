//! Tolerant parsing of the LLM's response into classification results.
//!
//! A 1:1 port of `classifier.py::_parse_response`'s seven rules
//! (`SPEC_FULL.md` §4.3). Never panics: any input that isn't valid JSON
//! after cleanup yields an empty result list, which the orchestrator turns
//! into per-file synthesized `KEEP` results.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::catalog::models::Action;

/// One classification as returned by the LLM, before the Safety Engine runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawClassification {
    pub path: String,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub category: String,
}

/// Non-fatal parse diagnostics — surfaced as warnings, never errors
/// (`SPEC_FULL.md` §4.3 rule 7: "Log a warning, not an error").
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub results: Vec<RawClassification>,
    pub warnings: Vec<String>,
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:json)?\s*|\s*```$").unwrap())
}

fn array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\]").unwrap())
}

/// Parse an AI response into classification results, tolerating code fences,
/// surrounding prose, and trailing commas. `expected_count` is only used to
/// emit a count-mismatch warning (rule 7) — it never changes the result.
#[must_use]
pub fn parse_response(text: &str, expected_count: usize) -> ParseOutcome {
    let mut warnings = Vec::new();

    // Rule 1: strip leading/trailing code-fence markers.
    let cleaned = fence_re().replace_all(text.trim(), "");
    let cleaned = cleaned.trim();

    // Rule 2: extract the first bracket-balanced [...] block if present.
    let cleaned = array_re()
        .find(cleaned)
        .map_or_else(|| cleaned.to_string(), |m| m.as_str().to_string());

    // Rule 3: remove trailing commas before ].
    let cleaned = trailing_comma_re().replace_all(&cleaned, "]");

    let raw: Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(_) => {
            warnings.push("response was not valid JSON after tolerant cleanup".to_string());
            return ParseOutcome {
                results: Vec::new(),
                warnings,
            };
        }
    };

    let Value::Array(items) = raw else {
        warnings.push("response JSON was not an array".to_string());
        return ParseOutcome {
            results: Vec::new(),
            warnings,
        };
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        // Rule 4: skip non-object items with a warning.
        let Value::Object(map) = item else {
            warnings.push(format!("skipping non-object item: {item}"));
            continue;
        };

        // Rule 5: uppercase action; coerce unknown tokens to KEEP.
        let action_token = map
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("KEEP")
            .to_string();
        let action = Action::parse(&action_token).unwrap_or_else(|| {
            warnings.push(format!("invalid action {action_token:?} — defaulting to KEEP"));
            Action::Keep
        });

        // Rule 6: coerce confidence to float, clamp to [0,1]; 0.0 on failure.
        let confidence = coerce_confidence(map.get("confidence"), &mut warnings);

        let path = map
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let reason = map
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let category = map
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        results.push(RawClassification {
            path,
            action,
            confidence,
            reason,
            category,
        });
    }

    // Rule 7: log (don't error) on count mismatch.
    if results.len() != expected_count {
        warnings.push(format!(
            "AI returned {} classifications but expected {expected_count}",
            results.len()
        ));
    }

    ParseOutcome { results, warnings }
}

fn coerce_confidence(value: Option<&Value>, warnings: &mut Vec<String>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(f) => f.clamp(0.0, 1.0),
        None => {
            warnings.push(format!("invalid confidence {value:?} — defaulting to 0.0"));
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json_array() {
        let text = r#"[{"path":"C:\\a","action":"MOVE_DATA","confidence":0.9,"reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 1);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].action, Action::MoveData);
        assert!((outcome.results[0].confidence - 0.9).abs() < f64::EPSILON);
    }

    // Property 9 / scenario 6: wrapped-in-prose-and-fences response tolerance.
    #[test]
    fn parses_response_wrapped_in_prose_and_fences_with_trailing_comma() {
        let text = "Here you go:\n```json\n[{\"path\":\"C:\\\\a\",\"action\":\"move_data\",\"confidence\":\"0.9\",\"reason\":\"r\",\"category\":\"c\"},]\n```\nOK";
        let outcome = parse_response(text, 1);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].action, Action::MoveData);
        assert!((outcome.results[0].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn skips_non_object_items_with_warning() {
        let text = r#"[{"path":"C:\\a","action":"KEEP","confidence":0.5,"reason":"r","category":"c"}, "not an object", 42]"#;
        let outcome = parse_response(text, 3);
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.warnings.iter().any(|w| w.contains("non-object")));
    }

    #[test]
    fn unknown_action_coerced_to_keep_with_warning() {
        let text = r#"[{"path":"C:\\a","action":"DESTROY","confidence":0.5,"reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 1);
        assert_eq!(outcome.results[0].action, Action::Keep);
        assert!(outcome.warnings.iter().any(|w| w.contains("invalid action")));
    }

    #[test]
    fn empty_action_token_coerced_to_keep() {
        let text = r#"[{"path":"C:\\a","action":"","confidence":0.5,"reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 1);
        assert_eq!(outcome.results[0].action, Action::Keep);
    }

    #[test]
    fn confidence_clamped_above_one() {
        let text = r#"[{"path":"C:\\a","action":"KEEP","confidence":5.0,"reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 1);
        assert!((outcome.results[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_clamped_below_zero() {
        let text = r#"[{"path":"C:\\a","action":"KEEP","confidence":-5.0,"reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 1);
        assert!((outcome.results[0].confidence - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_confidence_defaults_to_zero_with_warning() {
        let text = r#"[{"path":"C:\\a","action":"KEEP","confidence":"not a number","reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 1);
        assert!((outcome.results[0].confidence - 0.0).abs() < f64::EPSILON);
        assert!(outcome.warnings.iter().any(|w| w.contains("invalid confidence")));
    }

    #[test]
    fn malformed_json_yields_empty_result_list() {
        let outcome = parse_response("not json at all {{{", 1);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn count_mismatch_is_a_warning_not_an_error() {
        let text = r#"[{"path":"C:\\a","action":"KEEP","confidence":0.5,"reason":"r","category":"c"}]"#;
        let outcome = parse_response(text, 5);
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.warnings.iter().any(|w| w.contains("expected 5")));
    }

    #[test]
    fn non_array_json_yields_empty_result_list() {
        let outcome = parse_response(r#"{"not": "an array"}"#, 1);
        assert!(outcome.results.is_empty());
    }
}
