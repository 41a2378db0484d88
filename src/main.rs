//! junit-publish CLI - flatten a JUnit XML report and upload it.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use junit_publish::config::{Credentials, UploadConfig};
use junit_publish::{pipeline, report};

const USAGE: &str = "Usage: junit-publish <filename>";

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "warn,junit_publish=info";

// Exactly one argument, taken verbatim: no flags, and `-name.xml` is a filename.
#[derive(Parser)]
#[command(name = "junit-publish")]
#[command(about = "Flatten a JUnit XML report and upload it to object storage", long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// JUnit XML report to rewrite in place and upload
    #[arg(allow_hyphen_values = true)]
    filename: String,
}

fn usage() -> ! {
    println!("{}", USAGE);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args_os().len() != 2 {
        usage();
    }
    let Ok(cli) = Cli::try_parse() else {
        usage();
    };

    // Set up logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if cli.filename.is_empty() {
        println!("Error: filename must not be empty");
        std::process::exit(1);
    }

    let config = UploadConfig::default();
    let credentials = Credentials::from_env(&config);

    pipeline::run(
        &mut std::io::stdout(),
        &config,
        &credentials,
        &cli.filename,
        report::write_document,
    )
    .await
}
