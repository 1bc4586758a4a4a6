//! Test report normalization.
//!
//! CI workflows leave a single `report.json` behind, written by whichever
//! test framework the registrant uses. This module turns that file into one
//! [`CanonicalReport`] regardless of the framework:
//!
//! ```text
//! bytes ──► serde_json::Value ──► format::detect ──► aggregate::aggregate ──► CanonicalReport
//!   │
//!   └── absent ──► ReportFormat::Empty
//! ```
//!
//! # Example
//!
//! ```
//! use sentinel_relay::clock::SystemClock;
//! use sentinel_relay::report::{ReportStatus, normalize};
//!
//! let raw = br#"{"stats": {"asserts": 24, "passes": 24, "failures": 0}}"#;
//! let report = normalize(Some(raw.as_slice()), &SystemClock)?;
//!
//! assert_eq!(report.status, ReportStatus::Passed);
//! assert_eq!(report.total_tests, 24);
//! # Ok::<(), sentinel_relay::report::ReportError>(())
//! ```

pub mod aggregate;
pub mod format;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;

pub use aggregate::aggregate;
pub use format::{ReportFormat, detect};

/// Canonical timestamp layout: second precision, UTC, no offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised while normalizing a report.
///
/// A missing report is not an error; it normalizes to a failed, empty
/// report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report file exists but is not valid JSON.
    #[error("Report is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The JSON does not match the detected framework's shape.
    #[error("Report does not match the {kind} shape: {source}")]
    Schema {
        kind: ReportFormat,
        #[source]
        source: serde_json::Error,
    },

    /// A start or end time could not be parsed.
    #[error("Invalid timestamp in report: {0}")]
    InvalidTimestamp(String),

    /// A single-report format arrived as an array of several reports.
    #[error("Expected a single {kind} report, found {count}")]
    UnexpectedFragments { kind: ReportFormat, count: usize },

    /// The report file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ReportStatus {
    Passed,
    Failed,
}

/// Aggregated counts, before validation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Totals {
    pub tests: u64,
    pub passed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// The normalized result relayed to the registrant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalReport {
    pub status: ReportStatus,

    /// `YYYY-MM-DD HH:mm:ss`, UTC.
    pub time_start: String,

    /// `YYYY-MM-DD HH:mm:ss`, UTC.
    pub time_stop: String,

    pub total_tests: u64,
    pub total_passed: u64,
    pub total_skipped: u64,

    /// No supported format reports warnings; always 0.
    pub total_warnings: u64,

    pub total_failed: u64,
}

impl CanonicalReport {
    /// The report for a run that produced no data.
    pub fn empty(now: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(now);
        Self {
            status: ReportStatus::Failed,
            time_start: stamp.clone(),
            time_stop: stamp,
            total_tests: 0,
            total_passed: 0,
            total_skipped: 0,
            total_warnings: 0,
            total_failed: 0,
        }
    }

    /// Builds a report, widening the total when passed and failed counts
    /// exceed it.
    ///
    /// Mocha counts failed hooks as failures without counting them as tests,
    /// so such a run is reported as failed with `totalTests` raised to
    /// `passed + failed`.
    pub(crate) fn build(
        kind: ReportFormat,
        status: ReportStatus,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        totals: Totals,
    ) -> Self {
        let counted = totals.passed.saturating_add(totals.failed);
        let (status, total_tests) = if counted > totals.tests {
            warn!(
                "{} report counts {} passed + {} failed against {} tests",
                kind, totals.passed, totals.failed, totals.tests
            );
            (ReportStatus::Failed, counted)
        } else {
            (status, totals.tests)
        };

        Self {
            status,
            time_start: format_timestamp(start),
            time_stop: format_timestamp(stop),
            total_tests,
            total_passed: totals.passed,
            total_skipped: totals.skipped,
            total_warnings: 0,
            total_failed: totals.failed,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ReportStatus::Passed
    }
}

/// Renders a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Normalizes raw report bytes; `None` means the report file was absent.
///
/// # Errors
///
/// Returns [`ReportError::Malformed`] if the bytes are not JSON, or any
/// error from [`aggregate`].
pub fn normalize(raw: Option<&[u8]>, clock: &dyn Clock) -> Result<CanonicalReport, ReportError> {
    let Some(bytes) = raw else {
        debug!("report.json does not exist");
        return Ok(CanonicalReport::empty(clock.now()));
    };

    let value: Value = serde_json::from_slice(bytes).map_err(ReportError::Malformed)?;
    let format = detect(&value);
    debug!("Detected {} report", format);

    let fragments = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    aggregate(format, &fragments, clock)
}

/// Reads and normalizes the report at `path`.
///
/// A missing file is normalized as an empty report.
///
/// # Errors
///
/// Returns [`ReportError::Io`] for read failures other than not-found, or
/// any error from [`normalize`].
pub async fn normalize_file(
    path: &Path,
    clock: &dyn Clock,
) -> Result<CanonicalReport, ReportError> {
    debug!("Parsing Report at {}", path.display());

    let raw = match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    normalize(raw.as_deref(), clock)
}

/// Prints a summary of a canonical report to the console.
pub fn print_summary(report: &CanonicalReport) {
    println!();
    println!("Test Results:");
    println!("  Total:   {}", report.total_tests);
    println!("  Passed:  {}", console::style(report.total_passed).green());
    println!("  Failed:  {}", console::style(report.total_failed).red());
    println!("  Skipped: {}", console::style(report.total_skipped).yellow());
    println!("  Window:  {} .. {}", report.time_start, report.time_stop);

    println!();
    if report.passed() {
        println!("{}", console::style("All tests passed!").green().bold());
    } else if report.total_tests == 0 {
        println!(
            "{}",
            console::style("No test results were collected.")
                .red()
                .bold()
        );
    } else {
        println!("{}", console::style("Some tests failed.").red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2020, 7, 17, 21, 0, 0).unwrap())
    }

    #[test]
    fn test_absent_report() {
        let report = normalize(None, &clock()).unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.total_passed, 0);
        assert_eq!(report.total_skipped, 0);
        assert_eq!(report.total_warnings, 0);
        assert_eq!(report.total_failed, 0);
        assert_eq!(report.time_start, report.time_stop);
        assert_eq!(report.time_start, "2020-07-17 21:00:00");
    }

    #[test]
    fn test_empty_object() {
        let report = normalize(Some(b"{}".as_slice()), &clock()).unwrap();
        assert_eq!(report, CanonicalReport::empty(clock().now()));
    }

    #[test]
    fn test_malformed_is_surfaced() {
        let err = normalize(Some(b"{ not json".as_slice()), &clock()).unwrap_err();
        assert!(matches!(err, ReportError::Malformed(_)));
    }

    #[test]
    fn test_tap_scenario() {
        let raw = br#"{"stats": {"asserts": 24, "passes": 24, "failures": 0}}"#;
        let report = normalize(Some(raw.as_slice()), &clock()).unwrap();

        assert_eq!(report.status, ReportStatus::Passed);
        assert_eq!(report.total_tests, 24);
        assert_eq!(report.total_passed, 24);
        assert_eq!(report.total_failed, 0);
        assert_eq!(report.total_skipped, 0);
        assert_eq!(report.total_warnings, 0);
    }

    #[test]
    fn test_mocha_array() {
        let raw = br#"[
            {"stats": {"tests": 2, "passes": 2, "failures": 0,
                       "start": "2020-07-17T21:01:19Z", "end": "2020-07-17T21:01:30Z"}, "tests": []},
            {"stats": {"tests": 3, "passes": 3, "failures": 0,
                       "start": "2020-07-17T21:01:31Z", "end": "2020-07-17T21:02:05Z"}, "tests": []}
        ]"#;
        let report = normalize(Some(raw.as_slice()), &clock()).unwrap();

        assert_eq!(report.status, ReportStatus::Passed);
        assert_eq!(report.total_tests, 5);
        assert_eq!(report.total_passed, 5);
        assert_eq!(report.time_stop, "2020-07-17 21:02:05");
    }

    #[test]
    fn test_mixed_array_fails_schema() {
        let raw = br#"[
            {"stats": {"tests": 2, "passes": 2}, "tests": []},
            {"numTotalTests": 3}
        ]"#;
        let err = normalize(Some(raw.as_slice()), &clock()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::Schema {
                kind: ReportFormat::Mocha,
                ..
            }
        ));
    }

    #[test]
    fn test_serialized_field_names() {
        let report = CanonicalReport::empty(clock().now());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "Failed");
        assert_eq!(json["timeStart"], "2020-07-17 21:00:00");
        assert_eq!(json["totalWarnings"], 0);
        assert!(json.get("totalTests").is_some());
    }

    #[tokio::test]
    async fn test_normalize_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report").join("report.json");

        let report = normalize_file(&path, &clock()).await.unwrap();
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.total_tests, 0);
    }

    #[tokio::test]
    async fn test_normalize_file_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.json");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"stats": {"asserts": 3, "passes": 2, "failures": 1}, "asserts": []}"#)
            .unwrap();
        drop(file);

        let report = normalize_file(&path, &clock()).await.unwrap();
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.total_failed, 1);
    }
}
