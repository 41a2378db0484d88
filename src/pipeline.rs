//! The normalize-then-upload flow run by the CLI.
//!
//! Both steps always run in order. A report that can't be parsed stops the
//! run before anything is written or uploaded; a report that can't be saved
//! is announced and the file on disk is uploaded as it is. Missing
//! credentials are announced and end the run successfully.
//!
//! User-facing messages go to the `out` writer (stdout in the binary).

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::{Credentials, UploadConfig};
use crate::report::{self, RewriteMode};
use crate::upload::{self, CREDENTIALS_UNAVAILABLE_MESSAGE, UPLOAD_SUCCESS_MESSAGE};

/// Rewrites the report at `path`, saving it through `write`.
///
/// # Errors
///
/// Returns an error if the report can't be read, parsed or validated.
/// A failure to save it is reported to `out` and is not an error.
pub fn normalize_step<F>(out: &mut dyn Write, path: &Path, mode: RewriteMode, write: F) -> Result<()>
where
    F: FnOnce(&Path, &str) -> std::io::Result<()>,
{
    match report::normalize_file_with(path, mode, write) {
        Ok(counters) => report::print_summary(out, path, &counters)?,
        Err(e) if e.is_recoverable() => {
            warn!("Uploading {} unchanged", path.display());
            writeln!(out, "Error writing file: {}", e)?;
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to normalize {}", path.display()));
        }
    }

    Ok(())
}

/// Uploads `filename` to the configured bucket.
///
/// # Errors
///
/// Returns an error for any upload failure other than unavailable
/// credentials, which is reported to `out`.
pub async fn upload_step(
    out: &mut dyn Write,
    config: &UploadConfig,
    credentials: &Credentials,
    filename: &str,
) -> Result<()> {
    match upload::publish(config, credentials, filename).await {
        Ok(()) => writeln!(out, "{}", UPLOAD_SUCCESS_MESSAGE)?,
        Err(e) if e.is_credentials() => writeln!(out, "{}", CREDENTIALS_UNAVAILABLE_MESSAGE)?,
        Err(e) => return Err(e).with_context(|| format!("Failed to upload {}", filename)),
    }

    Ok(())
}

/// Flattens `filename` in place and uploads it.
pub async fn run<F>(
    out: &mut dyn Write,
    config: &UploadConfig,
    credentials: &Credentials,
    filename: &str,
    write: F,
) -> Result<()>
where
    F: FnOnce(&Path, &str) -> std::io::Result<()>,
{
    normalize_step(out, Path::new(filename), RewriteMode::Flatten, write)?;
    upload_step(out, config, credentials, filename).await
}
