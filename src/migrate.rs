//! Migration coordinator
//!
//! Drives one image from a source registry to a destination registry:
//! fetch the manifest, persist it, download every blob, upload every blob,
//! and only then publish the manifest under the destination tag. Each step
//! gates the next. A failure leaves the work directory in place.

use crate::digest::DigestUtils;
use crate::error::{MigrateError, Result};
use crate::events::{EventSink, TransferEvent};
use crate::image::{BlobSet, ImageManifest, MANIFEST_FILE};
use crate::registry::{ImageLocation, RegistryTransport};
use crate::transfer::{BatchReport, TransferOrchestrator, TransferSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Per-run switches that do not affect individual blob transfers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Leave downloaded files on disk after a successful migration
    pub keep_work_dir: bool,
    /// Skip images whose destination tag already resolves
    pub skip_existing: bool,
}

/// One image to migrate
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub source: ImageLocation,
    pub destination: ImageLocation,
    /// Directory holding this image's manifest and blobs
    pub work_dir: PathBuf,
}

impl MigrationPlan {
    /// Plan with a work directory named after the source image under `work_root`
    pub fn new(source: ImageLocation, destination: ImageLocation, work_root: &Path) -> Self {
        let work_dir = work_root.join(source.sanitized_name());
        Self {
            source,
            destination,
            work_dir,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(MANIFEST_FILE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Migrated,
    /// Destination tag already existed; nothing was transferred
    Skipped,
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub source: String,
    pub destination: String,
    pub status: MigrationStatus,
    /// Address of the published manifest
    pub image_url: String,
    pub manifest_digest: Option<String>,
    pub download: Option<BatchReport>,
    pub upload: Option<BatchReport>,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn bytes_transferred(&self) -> u64 {
        [&self.download, &self.upload]
            .into_iter()
            .flatten()
            .map(BatchReport::bytes_transferred)
            .sum()
    }
}

pub struct MigrationCoordinator {
    transport: Arc<dyn RegistryTransport>,
    orchestrator: TransferOrchestrator,
    options: MigrationOptions,
    events: Arc<dyn EventSink>,
}

impl MigrationCoordinator {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        settings: TransferSettings,
        options: MigrationOptions,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let orchestrator =
            TransferOrchestrator::new(Arc::clone(&transport), settings, Arc::clone(&events));
        Self {
            transport,
            orchestrator,
            options,
            events,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Migrate one image, publishing its manifest only after every blob landed
    pub async fn migrate(&self, plan: &MigrationPlan) -> Result<MigrationReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "migration",
            %run_id,
            source = %plan.source,
            destination = %plan.destination
        );
        self.run(run_id, plan).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, plan: &MigrationPlan) -> Result<MigrationReport> {
        let start_time = Instant::now();
        let source = &plan.source;
        let destination = &plan.destination;

        self.events.emit(TransferEvent::MigrationStarted {
            source: source.to_string(),
            destination: destination.to_string(),
        });

        if self.options.skip_existing
            && self
                .transport
                .manifest_exists(&destination.coordinates, &destination.reference)
                .await?
        {
            tracing::info!("destination tag already present");
            self.events.emit(TransferEvent::DestinationExists {
                destination: destination.to_string(),
            });
            return Ok(MigrationReport {
                run_id,
                source: source.to_string(),
                destination: destination.to_string(),
                status: MigrationStatus::Skipped,
                image_url: destination.manifest_url(),
                manifest_digest: None,
                download: None,
                upload: None,
                elapsed: start_time.elapsed(),
            });
        }

        let fetched = self
            .transport
            .fetch_manifest(&source.coordinates, &source.reference)
            .await?;
        self.events.emit(TransferEvent::ManifestFetched {
            image: source.to_string(),
            digest: fetched.digest(),
            layers: fetched.manifest.layers.len(),
            total_size: fetched.manifest.total_size(),
        });

        tokio::fs::create_dir_all(&plan.work_dir)
            .await
            .map_err(|e| MigrateError::io(&plan.work_dir, e))?;
        let manifest_path = plan.manifest_path();
        tokio::fs::write(&manifest_path, &fetched.raw)
            .await
            .map_err(|e| MigrateError::io(&manifest_path, e))?;
        let content_type = fetched.publish_content_type().to_string();
        tracing::debug!(path = %manifest_path.display(), content_type = %content_type, "manifest persisted");

        let blobs = BlobSet::from_manifest(&fetched.manifest, &plan.work_dir);
        let download = self
            .orchestrator
            .download_all(&source.coordinates, &blobs)
            .await?;

        // The upload side works from what is on disk, not from memory.
        let raw = tokio::fs::read(&manifest_path)
            .await
            .map_err(|e| MigrateError::io(&manifest_path, e))?;
        let manifest =
            ImageManifest::from_slice(&raw).map_err(|reason| MigrateError::ManifestFormat {
                registry: source.coordinates.base_url.clone(),
                repository: source.coordinates.repository.clone(),
                reference: source.reference.clone(),
                reason: format!("{} at {}", reason, manifest_path.display()),
            })?;
        let blobs = BlobSet::from_manifest(&manifest, &plan.work_dir);
        let upload = self
            .orchestrator
            .upload_all(&destination.coordinates, &blobs)
            .await?;

        let reported = self
            .transport
            .commit_manifest(
                &destination.coordinates,
                &destination.reference,
                &raw,
                &content_type,
            )
            .await?;
        let manifest_digest =
            reported.unwrap_or_else(|| DigestUtils::compute_docker_digest(&raw));
        let image_url = destination.manifest_url();
        self.events.emit(TransferEvent::ManifestCommitted {
            image: image_url.clone(),
            digest: manifest_digest.clone(),
        });

        if !self.options.keep_work_dir {
            if let Err(e) = tokio::fs::remove_dir_all(&plan.work_dir).await {
                tracing::warn!(path = %plan.work_dir.display(), error = %e, "failed to remove work directory");
            }
        }

        let elapsed = start_time.elapsed();
        self.events.emit(TransferEvent::MigrationFinished {
            destination: image_url.clone(),
            elapsed,
        });

        Ok(MigrationReport {
            run_id,
            source: source.to_string(),
            destination: destination.to_string(),
            status: MigrationStatus::Migrated,
            image_url,
            manifest_digest: Some(manifest_digest),
            download: Some(download),
            upload: Some(upload),
            elapsed,
        })
    }
}
