//! Report format detection.
//!
//! Report files arrive unlabeled. The shape of the parsed JSON decides which
//! test framework produced it:
//!
//! | Format | Shape |
//! |--------|-------|
//! | Tap | object with `stats` and `asserts`, or `stats.asserts` |
//! | Mocha | object with `stats` and `tests` |
//! | Jest | any other non-empty object |
//! | Empty | `{}`, `null`, `[]`, or no file at all |
//!
//! The checks run in exactly that order. Tap is tested before Mocha because
//! both carry `stats`, so a report holding `stats`, `asserts` and `tests` is
//! Tap. An array is classified by its first element.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Test framework a report was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Tap,
    Mocha,
    Jest,
    Empty,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tap => "tap",
            Self::Mocha => "mocha",
            Self::Jest => "jest",
            Self::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Classifies a parsed report.
pub fn detect(raw: &Value) -> ReportFormat {
    match raw {
        Value::Array(items) => items.first().map_or(ReportFormat::Empty, classify),
        other => classify(other),
    }
}

fn classify(value: &Value) -> ReportFormat {
    match value {
        Value::Null => ReportFormat::Empty,
        Value::Object(map) if map.is_empty() => ReportFormat::Empty,
        Value::Object(map) if is_tap(map) => ReportFormat::Tap,
        Value::Object(map) if map.contains_key("stats") && map.contains_key("tests") => {
            ReportFormat::Mocha
        }
        _ => ReportFormat::Jest,
    }
}

/// Tap output carries `asserts` either beside `stats` or inside it.
fn is_tap(map: &serde_json::Map<String, Value>) -> bool {
    match map.get("stats") {
        Some(stats) => map.contains_key("asserts") || stats.get("asserts").is_some(),
        None => false,
    }
}
