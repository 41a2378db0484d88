//! Report normalization.
//!
//! Reads a JUnit XML report from disk, validates its aggregate counters,
//! rewrites it into the single-suite layout described in [`junit`] and
//! writes it back to the same path.

pub mod junit;
pub mod xml;

pub use junit::{COUNTER_NAMES, Counter, Counters, JUnitReport, RewriteMode};
pub use xml::{Element, Node};

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Errors that can occur while normalizing a report.
///
/// # Error Categories
///
/// - **Parsing**: the file is missing, unreadable or not well-formed XML
/// - **Format**: the root lacks a counter or a counter is not an integer
/// - **Write**: the rewritten report could not be serialized or saved
///
/// Only write failures are recoverable; see [`ReportError::is_recoverable`].
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report file could not be read.
    #[error("Failed to read report {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report is not well-formed XML.
    #[error("Malformed XML: {0}")]
    Malformed(String),

    /// The root element lacks one of the aggregate counters.
    #[error("Root element is missing the '{0}' attribute")]
    MissingCounter(&'static str),

    /// An aggregate counter is not an integer.
    #[error("Root attribute '{name}' is not an integer: {value:?}")]
    InvalidCounter { name: &'static str, value: String },

    /// The rewritten report could not be serialized or written.
    #[error("Failed to write report {}: {source:#}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl ReportError {
    /// Returns true for failures after which publishing may continue with
    /// the file as it is on disk.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReportError::Write { .. })
    }
}

/// Normalizes the report at `path` in place.
///
/// Nothing is written unless the report parses and its counters validate.
///
/// # Errors
///
/// Returns [`ReportError::Read`] or [`ReportError::Malformed`] if the file
/// can't be parsed, [`ReportError::MissingCounter`] or
/// [`ReportError::InvalidCounter`] if the root counters are unusable, and
/// [`ReportError::Write`] if the result can't be saved.
pub fn normalize_file(path: &Path, mode: RewriteMode) -> Result<Counters, ReportError> {
    normalize_file_with(path, mode, write_document)
}

/// Writes a rendered document over the file at `path`.
pub fn write_document(path: &Path, xml: &str) -> std::io::Result<()> {
    std::fs::write(path, xml)
}

/// Like [`normalize_file`], but saves the rewritten document through
/// `write` instead of writing the file directly.
pub fn normalize_file_with<F>(
    path: &Path,
    mode: RewriteMode,
    write: F,
) -> Result<Counters, ReportError>
where
    F: FnOnce(&Path, &str) -> std::io::Result<()>,
{
    let content = std::fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let report = JUnitReport::parse(content)?;
    debug!(
        "Parsed {}: root <{}> with {} test cases",
        path.display(),
        report.root().name,
        report.testcase_count()
    );

    let write_error = |source: anyhow::Error| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    let xml = report.render(mode).map_err(write_error)?;
    write(path, &xml).map_err(|e| write_error(e.into()))?;

    info!("Report written to: {} ({:?})", path.display(), mode);
    Ok(report.counters().clone())
}

/// Prints the aggregate counters of a normalized report to `out`.
pub fn print_summary(
    out: &mut dyn Write,
    path: &Path,
    counters: &Counters,
) -> std::io::Result<()> {
    writeln!(out, "Report: {}", path.display())?;
    writeln!(out, "  Tests:    {}", counters.tests.value())?;
    writeln!(
        out,
        "  Failures: {}",
        console::style(counters.failures.value()).red()
    )?;
    writeln!(
        out,
        "  Errors:   {}",
        console::style(counters.errors.value()).red()
    )?;
    writeln!(
        out,
        "  Skipped:  {}",
        console::style(counters.skipped.value()).yellow()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites tests="2" failures="1" errors="0" skipped="0">
  <testsuite name="pytest" tests="2">
    <testcase classname="t" name="a"/>
    <testcase classname="t" name="b"><failure message="no">trace</failure></testcase>
  </testsuite>
</testsuites>
"#;

    fn write_report(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("report.xml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_normalize_flatten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, REPORT);

        let counters = normalize_file(&path, RewriteMode::Flatten).unwrap();
        assert_eq!(counters.tests.value(), 2);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));

        let report = JUnitReport::parse(&written).unwrap();
        assert_eq!(report.counters(), &counters);
        let suite = report.root().child_elements().next().unwrap();
        assert_eq!(suite.name, "testsuite");
        assert_eq!(suite.child_elements().count(), 2);
        assert_eq!(report.root().child_elements().count(), 1);
    }

    #[test]
    fn test_normalize_preserve_keeps_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, REPORT);

        let before = JUnitReport::parse(REPORT).unwrap();
        normalize_file(&path, RewriteMode::Preserve).unwrap();

        let after = JUnitReport::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(after.root(), before.root());
        assert_eq!(after.counters(), before.counters());
    }

    #[test]
    fn test_normalize_keeps_multiline_failure_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(
            &dir,
            r#"<testsuites tests="1" failures="1" errors="0" skipped="0">
  <testsuite><testcase name="a"><failure message="line1&#10;line2">t&#13;x</failure></testcase></testsuite>
</testsuites>"#,
        );

        normalize_file(&path, RewriteMode::Flatten).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#"message="line1&#10;line2""#));
        assert!(written.contains("t&#13;x"));

        let report = JUnitReport::parse(&written).unwrap();
        let failure = report.root().descendants("failure")[0];
        assert_eq!(failure.attribute("message"), Some("line1\nline2"));
        assert_eq!(failure.children, vec![Node::Text("t\rx".to_string())]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, REPORT);

        normalize_file(&path, RewriteMode::Flatten).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        normalize_file(&path, RewriteMode::Flatten).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        let first = JUnitReport::parse(&first).unwrap();
        let second = JUnitReport::parse(&second).unwrap();
        assert_eq!(first.counters(), second.counters());
        assert_eq!(first.testcase_count(), second.testcase_count());
    }

    #[test]
    fn test_normalize_strips_byte_order_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, &format!("\u{feff}{}", REPORT));

        assert!(normalize_file(&path, RewriteMode::Flatten).is_ok());
    }

    #[test]
    fn test_normalize_malformed_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let broken = r#"<testsuites tests="1" failures="0" errors="0" skipped="0"><testcase name="a">"#;
        let path = write_report(&dir, broken);

        let err = normalize_file(&path, RewriteMode::Flatten).unwrap_err();
        assert!(matches!(err, ReportError::Malformed(_)));
        assert!(!err.is_recoverable());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);
    }

    #[test]
    fn test_normalize_bad_counter_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"<testsuites tests="2" failures="x" errors="0" skipped="0"/>"#;
        let path = write_report(&dir, content);

        let err = normalize_file(&path, RewriteMode::Flatten).unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidCounter {
                name: "failures",
                ..
            }
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_normalize_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalize_file(&dir.path().join("absent.xml"), RewriteMode::Flatten)
            .unwrap_err();
        assert!(matches!(err, ReportError::Read { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_normalize_write_failure_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, REPORT);

        let err = normalize_file_with(&path, RewriteMode::Flatten, |_, _| {
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();

        assert!(matches!(err, ReportError::Write { .. }));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("disk full"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), REPORT);
    }

    #[test]
    fn test_print_summary_lists_counters() {
        let report = JUnitReport::parse(REPORT).unwrap();
        let mut out = Vec::new();
        print_summary(&mut out, Path::new("report.xml"), report.counters()).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Report: report.xml"));
        assert!(out.contains("Tests:    2"));
    }

    #[test]
    fn test_write_error_is_recoverable() {
        let err = ReportError::Write {
            path: PathBuf::from("report.xml"),
            source: anyhow::anyhow!("disk full"),
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("disk full"));
    }
}
