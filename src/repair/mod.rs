mod extract;

pub use extract::extract_structured_block;

use regex::Regex;
use serde_json::{json, Value};

use crate::errors::{PinpointError, PinpointResult};
use crate::model::family::{adapter_for, ModelFamily};

const RAW_EXCERPT_LEN: usize = 200;

/// Known field-name hallucinations, renamed to the canonical field
/// before decoding. Qwen models sometimes emit `bbox_2d`.
const FIELD_ALIASES: &[(&str, &str)] = &[("bbox_2d", "bbox")];

/// Recovers a structured value from raw model text.
///
/// Stages, each skipped when the previous one already produced a value:
/// fence extraction, point shorthand, direct parse, family-specific
/// text fixup, tolerant (json5) parse, bracket-balance repair. Keys and
/// string values are whitespace-trimmed and hallucinated field names
/// renamed on the way out. A box is never guessed from unparseable
/// text — that is a `Parse` error carrying the raw excerpt.
pub fn repair_response(raw: &str, family: ModelFamily) -> PinpointResult<Value> {
    let block = extract_structured_block(raw, "bbox").unwrap_or_else(|| raw.trim().to_string());

    if let Some(point) = parse_point_shorthand(&block) {
        return Ok(point);
    }

    if let Ok(value) = serde_json::from_str::<Value>(&block) {
        return Ok(finalize(value));
    }

    let preprocessed = (adapter_for(family).preprocess)(&block);
    let candidate = preprocessed.as_deref().unwrap_or(&block);
    if preprocessed.is_some() {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(finalize(value));
        }
    }

    if let Ok(value) = json5::from_str::<Value>(candidate) {
        tracing::debug!(family = %family, "model response parsed via tolerant repair");
        return Ok(finalize(value));
    }

    if let Some(balanced) = close_open_brackets(candidate) {
        if let Ok(value) = json5::from_str::<Value>(&balanced) {
            tracing::debug!(family = %family, "model response parsed after bracket repair");
            return Ok(finalize(value));
        }
    }

    Err(PinpointError::Parse(format!(
        "no structured payload in model response: {}",
        excerpt(raw)
    )))
}

fn finalize(value: Value) -> Value {
    let mut value = normalize_value(value);
    rename_hallucinated_fields(&mut value);
    value
}

/// Trims whitespace around object keys and string values, recursively.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut normalized = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                normalized.insert(key.trim().to_string(), normalize_value(val));
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

pub fn rename_hallucinated_fields(value: &mut Value) {
    if let Value::Object(map) = value {
        for (alias, canonical) in FIELD_ALIASES {
            if !map.contains_key(*canonical) {
                if let Some(v) = map.remove(*alias) {
                    map.insert((*canonical).to_string(), v);
                }
            }
        }
    }
}

/// No family quirk: leave the text alone.
pub fn preprocess_none(_raw: &str) -> Option<String> {
    None
}

/// Doubao/UI-TARS quirk: bbox values may arrive as bare space-separated
/// digit runs ("940 445 969 490"); comma-join them so the payload
/// tokenizes. Returns `None` when nothing needed fixing.
pub fn preprocess_space_separated_bbox(raw: &str) -> Option<String> {
    if !raw.contains("bbox") {
        return None;
    }
    let re = Regex::new(r"(\d+)[ \t]+(\d+)").ok()?;
    let mut text = raw.to_string();
    let mut changed = false;
    while re.is_match(&text) {
        text = re.replace_all(&text, "$1,$2").into_owned();
        changed = true;
    }
    changed.then_some(text)
}

/// Bare `(x,y)` point shorthand parses straight to a two-number array.
fn parse_point_shorthand(text: &str) -> Option<Value> {
    let re = Regex::new(r"^\((\d+)\s*,\s*(\d+)\)$").ok()?;
    let caps = re.captures(text.trim())?;
    let x: i64 = caps[1].parse().ok()?;
    let y: i64 = caps[2].parse().ok()?;
    Some(json!([x, y]))
}

/// Closes unterminated strings and unbalanced brackets so a truncated
/// response gets one more shot at the tolerant parser. Returns `None`
/// when the text is already balanced or closes brackets it never
/// opened.
fn close_open_brackets(text: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                } else {
                    return None;
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() && !in_string {
        return None;
    }
    let mut repaired = text.trim_end().trim_end_matches(',').to_string();
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    Some(repaired)
}

fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= RAW_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(RAW_EXCERPT_LEN).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_json_passes_through() {
        let value = repair_response("{\"bbox\": [1, 2, 3, 4]}", ModelFamily::Qwen25Vl).unwrap();
        assert_eq!(value["bbox"], json!([1, 2, 3, 4]));
    }

    /// The tolerant parser is free to represent numbers as floats, so
    /// repaired payloads are compared numerically.
    fn bbox_numbers(value: &Value) -> Vec<f64> {
        value["bbox"]
            .as_array()
            .expect("bbox array")
            .iter()
            .map(|v| v.as_f64().expect("numeric"))
            .collect()
    }

    #[test]
    fn fenced_block_with_trailing_comma_is_repaired() {
        // A fenced payload with a trailing comma is the common failure shape.
        let raw = "```json\n{\"bbox\": [100, 200, 300, 400],}\n```";
        let value = repair_response(raw, ModelFamily::Qwen3Vl).unwrap();
        assert_eq!(bbox_numbers(&value), vec![100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn unquoted_keys_are_repaired() {
        let value = repair_response("{bbox: [1, 2, 3, 4]}", ModelFamily::Qwen3Vl).unwrap();
        assert_eq!(bbox_numbers(&value), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn missing_closing_brackets_are_repaired() {
        let value =
            repair_response("{\"bbox\": [100, 200, 300, 400", ModelFamily::Qwen3Vl).unwrap();
        assert_eq!(bbox_numbers(&value), vec![100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn keys_and_string_values_are_trimmed() {
        let value =
            repair_response("{\" bbox \": \" 1, 2, 3, 4 \"}", ModelFamily::Qwen3Vl).unwrap();
        assert_eq!(value["bbox"], json!("1, 2, 3, 4"));
    }

    #[test]
    fn hallucinated_bbox_2d_is_renamed() {
        let value = repair_response("{\"bbox_2d\": [5, 6, 7, 8]}", ModelFamily::Qwen25Vl).unwrap();
        assert_eq!(value["bbox"], json!([5, 6, 7, 8]));
        assert!(value.get("bbox_2d").is_none());
    }

    #[test]
    fn canonical_field_wins_over_the_alias() {
        let raw = "{\"bbox\": [1, 2, 3, 4], \"bbox_2d\": [9, 9, 9, 9]}";
        let value = repair_response(raw, ModelFamily::Qwen25Vl).unwrap();
        assert_eq!(value["bbox"], json!([1, 2, 3, 4]));
    }

    #[test]
    fn point_shorthand_becomes_a_two_number_array() {
        let value = repair_response("(350,80)", ModelFamily::DoubaoVision).unwrap();
        assert_eq!(value, json!([350, 80]));
    }

    #[test]
    fn doubao_digit_runs_are_comma_joined() {
        let fixed = preprocess_space_separated_bbox("{\"bbox\": \"940 445 969 490\"}").unwrap();
        assert_eq!(fixed, "{\"bbox\": \"940,445,969,490\"}");
    }

    #[test]
    fn preprocess_leaves_clean_text_alone() {
        assert!(preprocess_space_separated_bbox("{\"bbox\": [940, 445]}").is_none());
        assert!(preprocess_space_separated_bbox("no coordinates here").is_none());
    }

    #[test]
    fn unparseable_text_is_a_parse_error_with_the_raw_text() {
        let err = repair_response("I could not find the element.", ModelFamily::Qwen3Vl)
            .unwrap_err();
        match err {
            PinpointError::Parse(msg) => assert!(msg.contains("could not find")),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn a_box_is_never_guessed_from_numbers_in_prose() {
        let err = repair_response(
            "maybe around 100 200 but I am not sure",
            ModelFamily::Qwen3Vl,
        )
        .unwrap_err();
        assert!(matches!(err, PinpointError::Parse(_)));
    }
}
