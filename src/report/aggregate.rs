//! Folding detected report fragments into one [`CanonicalReport`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::format::ReportFormat;
use super::{CanonicalReport, ReportError, ReportStatus, Totals};
use crate::clock::Clock;

/// Tap-style report (`tape` JSON output).
#[derive(Debug, Deserialize)]
struct TapReport {
    stats: TapStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TapStats {
    asserts: u64,
    passes: u64,
    failures: u64,
}

/// Mocha JSON reporter output.
#[derive(Debug, Deserialize)]
struct MochaReport {
    stats: MochaStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MochaStats {
    tests: u64,
    passes: u64,
    failures: u64,
    start: Option<RawTimestamp>,
    end: Option<RawTimestamp>,
}

/// Jest `--json` output.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JestReport {
    num_total_tests: u64,
    num_passed_tests: u64,
    num_failed_tests: u64,
    num_todo_tests: u64,
    start_time: Option<RawTimestamp>,
    test_results: Vec<JestFileResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JestFileResult {
    end_time: Option<RawTimestamp>,
}

/// Timestamps appear as epoch milliseconds (Jest) or ISO 8601 text (Mocha).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(f64),
    Text(String),
}

impl RawTimestamp {
    fn resolve(&self) -> Result<DateTime<Utc>, ReportError> {
        match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(*ms as i64)
                .ok_or_else(|| ReportError::InvalidTimestamp(ms.to_string())),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| ReportError::InvalidTimestamp(text.clone())),
        }
    }
}

/// Resolves an optional timestamp, using the clock when it is absent.
fn resolve_or_now(
    raw: Option<&RawTimestamp>,
    clock: &dyn Clock,
) -> Result<DateTime<Utc>, ReportError> {
    raw.map_or_else(|| Ok(clock.now()), RawTimestamp::resolve)
}

/// Aggregates same-shape fragments of a detected format.
///
/// # Errors
///
/// - [`ReportError::Schema`] if a fragment does not match the format's shape.
/// - [`ReportError::UnexpectedFragments`] if Tap or Jest receives more than
///   one fragment.
/// - [`ReportError::InvalidTimestamp`] for unparseable times.
pub fn aggregate(
    format: ReportFormat,
    fragments: &[Value],
    clock: &dyn Clock,
) -> Result<CanonicalReport, ReportError> {
    match format {
        ReportFormat::Empty => Ok(CanonicalReport::empty(clock.now())),
        ReportFormat::Tap => aggregate_tap(single(format, fragments)?, clock),
        ReportFormat::Mocha => aggregate_mocha(fragments, clock),
        ReportFormat::Jest => aggregate_jest(single(format, fragments)?, clock),
    }
}

fn single(format: ReportFormat, fragments: &[Value]) -> Result<&Value, ReportError> {
    match fragments {
        [only] => Ok(only),
        _ => Err(ReportError::UnexpectedFragments {
            kind: format,
            count: fragments.len(),
        }),
    }
}

fn parse<T: DeserializeOwned>(format: ReportFormat, value: &Value) -> Result<T, ReportError> {
    T::deserialize(value).map_err(|source| ReportError::Schema {
        kind: format,
        source,
    })
}

fn aggregate_tap(fragment: &Value, clock: &dyn Clock) -> Result<CanonicalReport, ReportError> {
    debug!("Parsing Tap report");

    let report: TapReport = parse(ReportFormat::Tap, fragment)?;
    let stats = report.stats;
    let now = clock.now();

    Ok(CanonicalReport::build(
        ReportFormat::Tap,
        status_for(stats.asserts, stats.failures),
        now,
        now,
        Totals {
            tests: stats.asserts,
            passed: stats.passes,
            skipped: 0,
            failed: stats.failures,
        },
    ))
}

fn aggregate_mocha(fragments: &[Value], clock: &dyn Clock) -> Result<CanonicalReport, ReportError> {
    debug!("Parsing Mocha report with {} fragment(s)", fragments.len());

    let mut total = 0u64;
    let mut passed = 0u64;
    let mut failed = 0u64;
    let mut any_failed = false;
    let mut start = None;
    let mut end = None;

    for fragment in fragments {
        let report: MochaReport = parse(ReportFormat::Mocha, fragment)?;
        let stats = report.stats;

        if stats.failures > 0 {
            any_failed = true;
        }

        // Fragments are appended chronologically; the last one's window wins.
        start = stats.start;
        end = stats.end;

        total = total.saturating_add(stats.tests);
        passed = passed.saturating_add(stats.passes);
        failed = failed.saturating_add(stats.failures);
    }

    let status = if any_failed {
        ReportStatus::Failed
    } else {
        status_for(total, failed)
    };

    Ok(CanonicalReport::build(
        ReportFormat::Mocha,
        status,
        resolve_or_now(start.as_ref(), clock)?,
        resolve_or_now(end.as_ref(), clock)?,
        Totals {
            tests: total,
            passed,
            skipped: 0,
            failed,
        },
    ))
}

fn aggregate_jest(fragment: &Value, clock: &dyn Clock) -> Result<CanonicalReport, ReportError> {
    debug!("Parsing Jest report");

    let report: JestReport = parse(ReportFormat::Jest, fragment)?;

    let status = if report.num_total_tests > 0 && report.num_total_tests == report.num_passed_tests
    {
        ReportStatus::Passed
    } else {
        ReportStatus::Failed
    };

    let last_end = report
        .test_results
        .last()
        .and_then(|result| result.end_time.as_ref());

    Ok(CanonicalReport::build(
        ReportFormat::Jest,
        status,
        resolve_or_now(report.start_time.as_ref(), clock)?,
        resolve_or_now(last_end, clock)?,
        Totals {
            tests: report.num_total_tests,
            passed: report.num_passed_tests,
            skipped: report.num_todo_tests,
            failed: report.num_failed_tests,
        },
    ))
}

/// Passed only when something ran and nothing failed.
fn status_for(total: u64, failed: u64) -> ReportStatus {
    if total > 0 && failed == 0 {
        ReportStatus::Passed
    } else {
        ReportStatus::Failed
    }
}
