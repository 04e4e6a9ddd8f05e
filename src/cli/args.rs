//! Command-line argument parsing

use crate::config::{AppConfig, ImageMapping};
use crate::error::{MigrateError, Result};
use crate::registry::ImageLocation;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "image-migrator")]
#[command(about = "Copy Docker images between registries through the v2 HTTP API")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(
        long = "config",
        short = 'c',
        help = "Path to a YAML configuration file"
    )]
    pub config: Option<PathBuf>,

    /// Source image
    #[arg(
        long = "source",
        short = 's',
        requires = "destination",
        help = "Full source image URL, e.g. https://src.example.com/project/app:1.0"
    )]
    pub source: Option<String>,

    /// Destination image
    #[arg(
        long = "destination",
        short = 'd',
        requires = "source",
        help = "Full destination image URL, e.g. https://dst.example.com/project/app:1.0"
    )]
    pub destination: Option<String>,

    #[arg(long = "source-username", help = "Username for the source registry")]
    pub source_username: Option<String>,

    #[arg(long = "source-password", help = "Password for the source registry")]
    pub source_password: Option<String>,

    #[arg(long = "dest-username", help = "Username for the destination registry")]
    pub dest_username: Option<String>,

    #[arg(long = "dest-password", help = "Password for the destination registry")]
    pub dest_password: Option<String>,

    /// Number of concurrent blob transfers
    #[arg(
        long = "concurrency",
        short = 'j',
        help = "Number of concurrent blob transfers (default: 8)"
    )]
    pub concurrency: Option<usize>,

    #[arg(
        long = "chunk-size",
        help = "Read buffer size in bytes used when hashing blobs (default: 8192)"
    )]
    pub chunk_size: Option<usize>,

    /// Timeout in seconds for network operations
    #[arg(
        long = "timeout",
        short = 't',
        help = "Timeout for network operations in seconds (default: 600)"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "work-dir",
        short = 'w',
        help = "Directory for downloaded manifests and blobs"
    )]
    pub work_dir: Option<PathBuf>,

    /// Skip TLS verification
    #[arg(
        long = "insecure",
        short = 'k',
        help = "Skip TLS certificate verification"
    )]
    pub insecure: bool,

    #[arg(
        long = "skip-existing",
        help = "Skip images whose destination tag already exists"
    )]
    pub skip_existing: bool,

    #[arg(
        long = "keep-work-dir",
        help = "Keep downloaded files after a successful migration"
    )]
    pub keep_work_dir: bool,

    #[arg(
        long = "no-verify",
        help = "Do not check blob contents against their manifest digests"
    )]
    pub no_verify: bool,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(
        long = "quiet",
        short = 'q',
        conflicts_with = "verbose",
        help = "Only print errors"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Build the effective configuration: file, then environment, then flags
    pub fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        config.apply_env()?;
        self.apply_to(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay command-line values onto `config`
    pub fn apply_to(&self, config: &mut AppConfig) -> Result<()> {
        if let (Some(source), Some(destination)) = (&self.source, &self.destination) {
            let source = ImageLocation::parse(source, None)?;
            let destination = ImageLocation::parse(destination, None)?;
            config.source.url = source.coordinates.base_url.clone();
            config.destination.url = destination.coordinates.base_url.clone();
            config.images = vec![ImageMapping::new(
                image_path(&source),
                Some(image_path(&destination)),
            )];
        } else if self.source.is_some() || self.destination.is_some() {
            return Err(MigrateError::Config(
                "--source and --destination must be given together".into(),
            ));
        }

        override_with(&mut config.source.username, &self.source_username);
        override_with(&mut config.source.password, &self.source_password);
        override_with(&mut config.destination.username, &self.dest_username);
        override_with(&mut config.destination.password, &self.dest_password);

        if let Some(concurrency) = self.concurrency {
            config.transfer.concurrency = concurrency;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.transfer.chunk_size = chunk_size;
        }
        if let Some(timeout) = self.timeout {
            config.transfer.timeout_secs = timeout;
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        if self.insecure {
            config.transfer.insecure = true;
        }
        if self.skip_existing {
            config.skip_existing = true;
        }
        if self.keep_work_dir {
            config.keep_work_dir = true;
        }
        if self.no_verify {
            config.transfer.verify_digests = false;
        }
        Ok(())
    }

    /// Print usage examples
    pub fn print_examples() {
        println!("Examples:");
        println!("  # Single image");
        println!("  image-migrator -s https://src.example.com/project/app:1.0 \\");
        println!("                 -d https://dst.example.com/project/app:1.0 \\");
        println!("                 --dest-username admin --dest-password secret");
        println!();
        println!("  # Every image listed in a configuration file");
        println!("  image-migrator --config migrate.yaml -j 4 --verbose");
        println!();
        println!("  # Credentials from the environment");
        println!("  export MIGRATOR_DEST_USERNAME=admin");
        println!("  export MIGRATOR_DEST_PASSWORD=secret");
        println!("  image-migrator --config migrate.yaml --skip-existing");
    }
}

fn image_path(location: &ImageLocation) -> String {
    format!("{}:{}", location.coordinates.repository, location.reference)
}

fn override_with(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}
