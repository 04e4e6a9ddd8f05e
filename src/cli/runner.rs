//! Runner that migrates every configured image and reports the outcome

use crate::cli::args::Args;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::EventSink;
use crate::logging::Logger;
use crate::migrate::{MigrationCoordinator, MigrationReport, MigrationStatus};
use crate::registry::{RegistryClient, RegistryTransport};
use std::sync::Arc;

/// What happened to each image of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub migrated: Vec<MigrationReport>,
    pub skipped: Vec<MigrationReport>,
    /// Source image and error message
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Runner {
    config: AppConfig,
    logger: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        let logger = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };
        let config = args.into_config()?;
        Ok(Self { config, logger })
    }

    pub fn with_config(config: AppConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build the HTTP client from the transfer settings and run every image
    pub async fn run(&self) -> Result<RunSummary> {
        let client = RegistryClient::builder()
            .with_timeout(self.config.transfer.timeout())
            .with_insecure(self.config.transfer.insecure)
            .with_chunk_size(self.config.transfer.chunk_size)
            .build()?;
        if self.config.transfer.insecure {
            self.logger.warning("TLS certificate verification is disabled");
        }
        self.run_with(Arc::new(client)).await
    }

    /// Migrate every configured image over `transport`, one image at a time
    pub async fn run_with(&self, transport: Arc<dyn RegistryTransport>) -> Result<RunSummary> {
        let plans = self.config.plans()?;
        let events: Arc<dyn EventSink> = Arc::new(self.logger.clone());
        let coordinator = MigrationCoordinator::new(
            transport,
            self.config.transfer_settings(),
            self.config.migration_options(),
            events,
        );

        self.logger.section("Image Migrator");
        self.logger.info(&format!(
            "{} image(s) from {} to {}",
            plans.len(),
            self.config.source.url,
            self.config.destination.url
        ));
        self.logger.detail(&format!(
            "Concurrency: {}, work directory: {}",
            self.config.transfer.concurrency,
            self.config.work_dir.display()
        ));

        let mut summary = RunSummary::default();
        for plan in &plans {
            match coordinator.migrate(plan).await {
                Ok(report) if report.status == MigrationStatus::Skipped => {
                    summary.skipped.push(report)
                }
                Ok(report) => summary.migrated.push(report),
                Err(e) => {
                    tracing::error!(source = %plan.source, error = %e, "migration failed");
                    self.logger.error(&format!("{}: {}", plan.source, e));
                    summary.failed.push((plan.source.to_string(), e.to_string()));
                }
            }
        }

        self.print_summary(&summary);
        Ok(summary)
    }

    fn print_summary(&self, summary: &RunSummary) {
        let bytes: u64 = summary
            .migrated
            .iter()
            .map(MigrationReport::bytes_transferred)
            .sum();
        self.logger.summary_kv(
            "Migration Summary",
            &[
                ("Migrated", summary.migrated.len().to_string()),
                ("Skipped", summary.skipped.len().to_string()),
                ("Failed", summary.failed.len().to_string()),
                ("Transferred", self.logger.format_size(bytes)),
                ("Total time", self.logger.elapsed()),
            ],
        );

        for report in &summary.migrated {
            let digest = report.manifest_digest.as_deref().unwrap_or("-");
            self.logger
                .success(&format!("{} ({})", report.image_url, digest));
        }
        for (image, error) in &summary.failed {
            self.logger.error(&format!("{}: {}", image, error));
        }
    }
}
