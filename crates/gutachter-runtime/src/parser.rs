//! Best-effort parsing of judge responses.
//!
//! Models are asked for bare JSON but occasionally wrap it in prose or code
//! fences. Repair lives here and only here; everything downstream consumes
//! typed partial results.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use gutachter_core::checklist::{ItemRating, LevelAnswer};
use gutachter_core::gate::RuleTrigger;
use gutachter_core::rubric::AnchorSelection;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Extract the first JSON object from a judge response.
///
/// Tries a direct parse, then the content of a ``` fence, then the first
/// balanced `{...}` span.
pub fn extract_json(raw: &str) -> Result<Value, ParseError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            return Ok(value);
        }
    }

    if let Some(span) = balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }
    }

    Err(ParseError::NoJson)
}

fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// First balanced `{...}` span outside of string literals.
fn balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn as_object(value: Value) -> Result<serde_json::Map<String, Value>, ParseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::Shape(format!(
            "expected object, got {other}"
        ))),
    }
}

/// `{ "<rule_id>": {"triggered": bool, "reasoning": str} }`
///
/// Rules missing from the response are simply absent from the map; the gate
/// treats them as not triggered.
pub fn parse_gate_response(raw: &str) -> Result<BTreeMap<String, RuleTrigger>, ParseError> {
    let object = as_object(extract_json(raw)?)?;
    let mut triggers = BTreeMap::new();
    for (rule_id, entry) in object {
        let Some(triggered) = lenient_bool(entry.get("triggered")) else {
            continue;
        };
        triggers.insert(
            rule_id,
            RuleTrigger {
                triggered,
                reasoning: entry
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        );
    }
    Ok(triggers)
}

/// `{ "<item_id>": {"level": int|"na", "reasoning": str} }`
pub fn parse_checklist_response(raw: &str) -> Result<BTreeMap<String, ItemRating>, ParseError> {
    let object = as_object(extract_json(raw)?)?;
    let mut ratings = BTreeMap::new();
    for (item_id, entry) in object {
        let Some(level) = lenient_level(entry.get("level")) else {
            continue;
        };
        ratings.insert(
            item_id,
            ItemRating {
                level,
                reasoning: entry
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                confidence: entry.get("confidence").and_then(Value::as_f64),
            },
        );
    }
    Ok(ratings)
}

/// `{"value": int, "reasoning": str, "confidence": number}`
pub fn parse_ordinal_response(raw: &str) -> Result<AnchorSelection, ParseError> {
    let object = as_object(extract_json(raw)?)?;
    let value = match object.get("value") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ParseError::Shape("missing numeric `value`".to_string()))?;

    Ok(AnchorSelection {
        value,
        reasoning: object
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string),
        confidence: object.get("confidence").and_then(Value::as_f64),
    })
}

fn lenient_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "ja" | "yes" => Some(true),
            "false" | "nein" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_level(value: Option<&Value>) -> Option<LevelAnswer> {
    match value? {
        Value::Number(n) => n.as_i64().map(LevelAnswer::Level),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("na") {
                Some(LevelAnswer::Na)
            } else {
                s.parse::<i64>().ok().map(LevelAnswer::Level)
            }
        }
        Value::Null => Some(LevelAnswer::Na),
        _ => None,
    }
}
