//! Console output and diagnostics
//!
//! This module provides the [`Logger`] for controlling output verbosity and
//! formatting user-visible messages, and [`init_tracing`] for the `tracing`
//! diagnostics emitted by the registry client and transfer engine.

use crate::digest::DigestUtils;
use crate::events::{EventSink, TransferEvent};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber (stderr, `RUST_LOG` aware)
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "image_migrator=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second initialisation (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Instant,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Instant::now(),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Instant::now(),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        if !self.quiet {
            println!("\n=== {} ===", title);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("ℹ️  {}", message);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("✅ {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("⚠️  WARNING: {}", message);
        }
    }

    /// Errors are printed even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("   {}", message);
        }
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.quiet {
            println!("\n--- {} ---", title);
            for (key, value) in items {
                println!("  {}: {}", key, value);
            }
        }
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    pub fn elapsed(&self) -> String {
        self.format_duration(self.start_time.elapsed())
    }
}

impl EventSink for Logger {
    fn emit(&self, event: TransferEvent) {
        match event {
            TransferEvent::MigrationStarted { source, destination } => {
                self.section(&format!("Migrating {} -> {}", source, destination));
            }
            TransferEvent::DestinationExists { destination } => {
                self.info(&format!("{} already exists, skipping", destination));
            }
            TransferEvent::ManifestFetched {
                image,
                digest,
                layers,
                total_size,
            } => {
                self.info(&format!(
                    "Resolved {} ({}, {} layers, {})",
                    image,
                    DigestUtils::format_digest_short(&digest),
                    layers,
                    self.format_size(total_size)
                ));
            }
            TransferEvent::BatchStarted {
                direction,
                blobs,
                concurrency,
            } => {
                self.info(&format!(
                    "Starting {} of {} blobs with {} concurrent workers",
                    direction, blobs, concurrency
                ));
            }
            TransferEvent::BlobStarted {
                direction,
                role,
                digest,
            } => {
                self.detail(&format!(
                    "{} {} ({})",
                    direction,
                    role,
                    DigestUtils::format_digest_short(&digest)
                ));
            }
            TransferEvent::UploadSessionOpened { role, location } => {
                self.detail(&format!("Upload session for {}: {}", role, location));
            }
            TransferEvent::BlobCompleted {
                direction,
                role,
                bytes,
                elapsed,
                ..
            } => {
                self.success(&format!(
                    "{} {} done ({} in {})",
                    direction,
                    role,
                    self.format_size(bytes),
                    self.format_duration(elapsed)
                ));
            }
            TransferEvent::BlobAlreadyPresent { role, digest } => {
                self.info(&format!(
                    "{} ({}) already exists, skipping upload",
                    role,
                    DigestUtils::format_digest_short(&digest)
                ));
            }
            TransferEvent::BlobFailed {
                direction,
                role,
                error,
                ..
            } => {
                self.error(&format!("{} of {} failed: {}", direction, role, error));
            }
            TransferEvent::BatchFinished {
                direction,
                transferred,
                skipped,
                failed,
                elapsed,
            } => {
                let message = format!(
                    "{} batch finished in {}: {} transferred, {} skipped, {} failed",
                    direction,
                    self.format_duration(elapsed),
                    transferred,
                    skipped,
                    failed
                );
                if failed == 0 {
                    self.success(&message);
                } else {
                    self.warning(&message);
                }
            }
            TransferEvent::ManifestCommitted { image, digest } => {
                self.success(&format!(
                    "Manifest published at {} ({})",
                    image,
                    DigestUtils::format_digest_short(&digest)
                ));
            }
            TransferEvent::MigrationFinished {
                destination,
                elapsed,
            } => {
                self.success(&format!(
                    "Migration complete in {}, new image: {}",
                    self.format_duration(elapsed),
                    destination
                ));
            }
        }
    }
}
