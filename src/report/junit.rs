//! JUnit XML report model and flattening.
//!
//! Test runners disagree on how deeply they nest suites. pytest emits a
//! `<testsuites>` root around one `<testsuite>`; other tools nest suites per
//! module or per file. The result aggregator that consumes our reports only
//! accepts a single suite, so reports are flattened into this shape:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites tests="3" failures="1" errors="0" skipped="1">
//!   <testsuite tests="3" failures="1" errors="0" skipped="1" time="1.234">
//!     <testcase classname="tests.test_math" name="test_add" time="0.100"/>
//!     <testcase classname="tests.test_math" name="test_sub" time="0.150">
//!       <failure message="AssertionError">assert 2 - 1 == 0</failure>
//!     </testcase>
//!     <testcase classname="tests.test_math" name="test_mul" time="0.050">
//!       <skipped/>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```
//!
//! The `<testsuites>` root carries the four aggregate counters of the input
//! root; the single `<testsuite>` carries every attribute of the input root;
//! each `<testcase>` found anywhere in the input is moved under it with its
//! attributes and child elements intact.

use super::ReportError;
use super::xml::Element;

/// Names of the aggregate counters read from the report root.
pub const COUNTER_NAMES: [&str; 4] = ["tests", "failures", "errors", "skipped"];

/// Controls what [`JUnitReport::render`] writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewriteMode {
    /// Write the flattened single-suite document.
    #[default]
    Flatten,

    /// Re-emit the original document unchanged. The flattened tree is still
    /// built and validated, but not written.
    Preserve,
}

/// An aggregate counter from the report root.
///
/// The attribute string is kept as found so that it is written back
/// byte-for-byte; the parsed value is only used for validation and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    name: &'static str,
    raw: String,
    value: i64,
}

impl Counter {
    fn read(root: &Element, name: &'static str) -> Result<Self, ReportError> {
        let raw = root
            .attribute(name)
            .ok_or(ReportError::MissingCounter(name))?;
        let value = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ReportError::InvalidCounter {
                name,
                value: raw.to_string(),
            })?;

        Ok(Self {
            name,
            raw: raw.to_string(),
            value,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The attribute value as it appeared in the input.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

/// The `tests`, `failures`, `errors` and `skipped` counters of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    pub tests: Counter,
    pub failures: Counter,
    pub errors: Counter,
    pub skipped: Counter,
}

impl Counters {
    /// Reads all four counters from `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::MissingCounter`] if an attribute is absent and
    /// [`ReportError::InvalidCounter`] if one is not an integer.
    pub fn from_root(root: &Element) -> Result<Self, ReportError> {
        let [tests, failures, errors, skipped] = COUNTER_NAMES;
        Ok(Self {
            tests: Counter::read(root, tests)?,
            failures: Counter::read(root, failures)?,
            errors: Counter::read(root, errors)?,
            skipped: Counter::read(root, skipped)?,
        })
    }

    /// Iterates over the counters in `tests, failures, errors, skipped` order.
    pub fn iter(&self) -> impl Iterator<Item = &Counter> {
        [&self.tests, &self.failures, &self.errors, &self.skipped].into_iter()
    }
}

/// A parsed JUnit report.
#[derive(Debug, Clone)]
pub struct JUnitReport {
    root: Element,
    counters: Counters,
}

impl JUnitReport {
    /// Parses a report document and validates its root counters.
    pub fn parse(xml: &str) -> Result<Self, ReportError> {
        let root = Element::parse(xml)?;
        let counters = Counters::from_root(&root)?;
        Ok(Self { root, counters })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Number of `<testcase>` elements at any depth.
    pub fn testcase_count(&self) -> usize {
        self.root.descendants("testcase").len()
    }

    /// Builds the flattened single-suite tree.
    pub fn flatten(&self) -> Element {
        let mut testsuites = Element::new("testsuites");
        for counter in self.counters.iter() {
            testsuites.set_attribute(counter.name(), counter.raw());
        }

        let mut testsuite = Element::new("testsuite");
        testsuite.attributes = self.root.attributes.clone();

        for source in self.root.descendants("testcase") {
            let mut testcase = Element::new("testcase");
            testcase.attributes = source.attributes.clone();
            for child in source.child_elements() {
                testcase.push(child.clone());
            }
            testsuite.push(testcase);
        }

        testsuites.push(testsuite);
        testsuites
    }

    /// Serializes the report as a document for the given mode.
    pub fn render(&self, mode: RewriteMode) -> anyhow::Result<String> {
        match mode {
            RewriteMode::Flatten => self.flatten().to_document(),
            RewriteMode::Preserve => {
                let flattened = self.flatten();
                tracing::debug!(
                    "Flattened tree has {} test cases; writing original document",
                    flattened.descendants("testcase").len()
                );
                self.root.to_document()
            }
        }
    }
}
