//! image-migrator binary entry point

use anyhow::{Context, Result};
use image_migrator::cli::{Args, Runner};
use image_migrator::logging::init_tracing;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse_args();
    init_tracing(args.verbose);

    if args.config.is_none() && args.source.is_none() {
        Args::print_examples();
        return Ok(ExitCode::from(2));
    }

    let runner = Runner::new(args).context("invalid configuration")?;
    let summary = runner.run().await.context("migration run aborted")?;

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
