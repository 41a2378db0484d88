//! junit-publish: flatten JUnit XML reports and publish them to object storage.
//!
//! Some test-result aggregators only accept a report with exactly one test
//! suite. This crate rewrites a JUnit XML report into that shape in place
//! and uploads it to an S3-compatible bucket.
//!
//! # Architecture
//!
//! The work happens in two sequential steps:
//!
//! - **Report**: parse the report, validate the root counters and write the
//!   flattened document back to the same path
//! - **Upload**: put the file into the configured bucket under a key equal
//!   to its filename
//!
//! [`pipeline::run`] chains the two the way the CLI does.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use junit_publish::config::{Credentials, UploadConfig};
//! use junit_publish::report::{RewriteMode, normalize_file};
//! use junit_publish::upload::publish;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = UploadConfig::default();
//!     normalize_file(Path::new("report.xml"), RewriteMode::Flatten)?;
//!     publish(&config, &Credentials::from_env(&config), "report.xml").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod pipeline;
pub mod report;
pub mod upload;

// Re-export commonly used types
pub use config::{Credentials, UploadConfig};
pub use report::{JUnitReport, ReportError, RewriteMode, normalize_file};
pub use upload::{ObjectStore, S3ObjectStore, UploadError, publish, upload_report};
