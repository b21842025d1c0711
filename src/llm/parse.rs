//! Lenient decoding of model output into an itinerary or a JSON object

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryFormat {
    Structured,
    PlainText,
}

/// A JSON itinerary object, or the model's text when it could not be read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Itinerary {
    Structured(Map<String, Value>),
    PlainText(String),
}

impl Itinerary {
    #[must_use]
    pub fn format(&self) -> ItineraryFormat {
        match self {
            Self::Structured(_) => ItineraryFormat::Structured,
            Self::PlainText(_) => ItineraryFormat::PlainText,
        }
    }

    /// Number of itinerary days, zero for plain text
    #[must_use]
    pub fn day_count(&self) -> usize {
        match self {
            Self::Structured(map) => days(map).map_or(0, Vec::len),
            Self::PlainText(_) => 0,
        }
    }
}

fn days(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    map.get("itinerary").and_then(Value::as_array)
}

/// Fenced blocks win; otherwise the whole text
fn strip_fences(text: &str) -> &str {
    FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Drops trailing commas, and comments when asked, outside string literals
fn relax(text: &str, strip_comments: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if strip_comments && chars.peek() == Some(&'/') => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            '/' if strip_comments && chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            '}' | ']' => {
                let kept = out.trim_end().len();
                if out[..kept].ends_with(',') {
                    out.truncate(kept - 1);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn decode(candidate: &str, strip_comments: bool) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(&relax(candidate, strip_comments)) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, line = e.line(), column = e.column(), "model JSON rejected");
            None
        }
    }
}

/// The JSON object in model output, tolerating fences, chatter, trailing
/// commas and comments
#[must_use]
pub fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    let text = strip_fences(raw);
    let candidate = outermost_object(text).unwrap_or(text);
    decode(candidate, false).or_else(|| decode(candidate, true))
}

/// Interpret model output; never fails
#[must_use]
pub fn parse_itinerary(raw: &str) -> Itinerary {
    match parse_object(raw) {
        Some(map) if days(&map).is_some_and(|d| !d.is_empty()) => Itinerary::Structured(map),
        Some(_) => {
            tracing::warn!("itinerary JSON has no days, keeping text");
            Itinerary::PlainText(raw.trim().to_string())
        }
        None => {
            tracing::warn!(chars = raw.len(), "itinerary is not JSON, keeping text");
            Itinerary::PlainText(raw.trim().to_string())
        }
    }
}
