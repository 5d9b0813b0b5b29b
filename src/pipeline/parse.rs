//! Analyzer output parsing: locate the JSON object and decode it.
//!
//! The analyzer prints progress noise, warnings and the result object to the
//! same stream, so the result has to be fished out of arbitrary text. Two
//! strategies exist (see [`JsonExtraction`]); both return the span including
//! its outer braces.
//!
//! Decoding is deliberately lenient about *fields*: an absent or oddly typed
//! field becomes `None` and is rendered as a placeholder later. Only a span
//! that is not a JSON object at all is an error.

use crate::config::JsonExtraction;
use crate::error::PipelineError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Facial analysis reported by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "AcnePrediction")]
    pub acne_prediction: Option<f64>,
    #[serde(rename = "FaceShape")]
    pub face_shape: Option<String>,
    #[serde(rename = "SkinType")]
    pub skin_type: Option<String>,
    #[serde(rename = "Wrinkles")]
    pub wrinkles: Option<String>,
}

/// Extract, decode and project the analyzer's JSON object.
///
/// In balanced mode every balanced span is tried in order and the first one
/// that decodes wins; `MalformedJson` reports the first span's error.
pub fn parse_analysis(raw: &str, mode: JsonExtraction) -> Result<AnalysisResult, PipelineError> {
    let mut first_error = None;
    let candidates: Vec<&str> = match mode {
        JsonExtraction::Balanced => balanced_spans(raw).collect(),
        JsonExtraction::Greedy => greedy_span(raw).into_iter().collect(),
    };
    for span in candidates {
        match decode_object(span) {
            Ok(map) => {
                debug!("JSON span: {} of {} bytes", span.len(), raw.len());
                return Ok(project(&map));
            }
            Err(e) => {
                debug!("Skipping undecodable span of {} bytes: {}", span.len(), e);
                first_error.get_or_insert(e);
            }
        }
    }
    Err(match first_error {
        Some(detail) => PipelineError::MalformedJson { detail },
        None => PipelineError::MissingJsonSubstring { len: raw.len() },
    })
}

fn decode_object(span: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(span).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        _ => Err("top-level value is not an object".into()),
    }
}

fn project(map: &Map<String, Value>) -> AnalysisResult {
    AnalysisResult {
        acne_prediction: number_field(map, "AcnePrediction"),
        face_shape: text_field(map, "FaceShape"),
        skin_type: text_field(map, "SkinType"),
        wrinkles: text_field(map, "Wrinkles"),
    }
}

/// Locate the JSON object span inside `raw`.
pub fn extract_json_span(raw: &str, mode: JsonExtraction) -> Option<&str> {
    match mode {
        JsonExtraction::Balanced => balanced_spans(raw).next(),
        JsonExtraction::Greedy => greedy_span(raw),
    }
}

// ── Balanced scanner ─────────────────────────────────────────────────────

/// Every balanced `{...}` span, left to right. Braces inside string
/// literals (including escaped quotes) do not count. A `{` that never
/// closes is skipped and the scan restarts at the next `{`.
fn balanced_spans(raw: &str) -> impl Iterator<Item = &str> {
    let mut from = 0;
    std::iter::from_fn(move || {
        while let Some(rel) = raw[from..].find('{') {
            let start = from + rel;
            match closing_len(&raw[start..]) {
                Some(len) => {
                    from = start + len;
                    return Some(&raw[start..start + len]);
                }
                None => from = start + 1,
            }
        }
        None
    })
}

/// Length of the object opening at `s[0]`, closing brace included.
fn closing_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, b) in s.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Greedy (legacy) ──────────────────────────────────────────────────────

static RE_GREEDY_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

fn greedy_span(raw: &str) -> Option<&str> {
    RE_GREEDY_OBJECT.find(raw).map(|m| m.as_str())
}

// ── Field projection ─────────────────────────────────────────────────────

fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        r#"{"AcnePrediction":2,"FaceShape":"Oval","SkinType":"Oily","Wrinkles":"None"}"#;

    #[test]
    fn extracts_object_surrounded_by_noise() {
        let raw = format!("loading model...\n0: 640x640 1 face\n{SAMPLE}\ndone\n");
        let r = parse_analysis(&raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(r.acne_prediction, Some(2.0));
        assert_eq!(r.face_shape.as_deref(), Some("Oval"));
        assert_eq!(r.skin_type.as_deref(), Some("Oily"));
        assert_eq!(r.wrinkles.as_deref(), Some("None"));
    }

    #[test]
    fn object_may_span_lines() {
        let raw = "text... {\n  \"FaceShape\": \"Round\",\n  \"AcnePrediction\": 0\n}\n";
        for mode in [JsonExtraction::Balanced, JsonExtraction::Greedy] {
            let r = parse_analysis(raw, mode).unwrap();
            assert_eq!(r.face_shape.as_deref(), Some("Round"));
            assert_eq!(r.acne_prediction, Some(0.0));
        }
    }

    #[test]
    fn no_braces_is_missing_substring() {
        let err = parse_analysis("nothing to see", JsonExtraction::Balanced).unwrap_err();
        assert!(matches!(err, PipelineError::MissingJsonSubstring { .. }));
        let err = parse_analysis("} reversed {", JsonExtraction::Greedy).unwrap_err();
        assert!(matches!(err, PipelineError::MissingJsonSubstring { .. }));
    }

    #[test]
    fn unclosed_object_is_missing_substring() {
        let err = parse_analysis(r#"{"FaceShape": "Oval""#, JsonExtraction::Balanced).unwrap_err();
        assert!(matches!(err, PipelineError::MissingJsonSubstring { .. }));
    }

    #[test]
    fn unclosed_brace_before_the_object_is_skipped() {
        let raw = "progress {50%\n{\"FaceShape\":\"Oval\"}\n";
        let span = extract_json_span(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(span, r#"{"FaceShape":"Oval"}"#);
        let r = parse_analysis(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(r.face_shape.as_deref(), Some("Oval"));
    }

    #[test]
    fn undecodable_span_before_the_object_is_skipped() {
        let raw = format!("warn: {{cuda unavailable}}\n{SAMPLE}\n");
        let r = parse_analysis(&raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(r.skin_type.as_deref(), Some("Oily"));
    }

    #[test]
    fn invalid_span_is_malformed() {
        for mode in [JsonExtraction::Balanced, JsonExtraction::Greedy] {
            let err = parse_analysis("out: {FaceShape: Oval}", mode).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedJson { .. }), "{mode:?}");
        }
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_object() {
        let raw = r#"x {"FaceShape":"Oval }","Wrinkles":"a \" { b"} trailing }"#;
        let span = extract_json_span(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(span, r#"{"FaceShape":"Oval }","Wrinkles":"a \" { b"}"#);
        let r = parse_analysis(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(r.face_shape.as_deref(), Some("Oval }"));
    }

    #[test]
    fn greedy_spans_to_last_brace() {
        let raw = format!("{SAMPLE} then {{\"extra\":1}}");
        let span = extract_json_span(&raw, JsonExtraction::Greedy).unwrap();
        assert!(span.ends_with("{\"extra\":1}"));
        assert!(matches!(
            parse_analysis(&raw, JsonExtraction::Greedy),
            Err(PipelineError::MalformedJson { .. })
        ));
        // The balanced scanner stops at the first complete object.
        let r = parse_analysis(&raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(r.face_shape.as_deref(), Some("Oval"));
    }

    #[test]
    fn nested_objects_are_balanced() {
        let raw = r#"{"FaceShape":"Heart","meta":{"boxes":[{"a":1}]}} ok"#;
        let r = parse_analysis(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(r.face_shape.as_deref(), Some("Heart"));
    }

    #[test]
    fn absent_fields_are_tolerated() {
        let r = parse_analysis(r#"{"error": "No face shape detected"}"#, JsonExtraction::Balanced)
            .unwrap();
        assert_eq!(r, AnalysisResult::default());
    }

    #[test]
    fn loosely_typed_fields_are_coerced() {
        let r = parse_analysis(
            r#"{"AcnePrediction":"3","FaceShape":"","SkinType":4,"Wrinkles":null}"#,
            JsonExtraction::Balanced,
        )
        .unwrap();
        assert_eq!(r.acne_prediction, Some(3.0));
        assert_eq!(r.face_shape, None);
        assert_eq!(r.skin_type.as_deref(), Some("4"));
        assert_eq!(r.wrinkles, None);
    }
}
