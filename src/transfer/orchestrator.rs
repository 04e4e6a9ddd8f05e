//! Concurrent blob transfer batches
//!
//! A batch spawns one task per blob and bounds how many run at once with a
//! semaphore. Outcomes are collected in completion order. A failing blob
//! never cancels its siblings: the batch always drains every spawned task
//! and then reports the first failure it observed.

use crate::digest::{DigestUtils, digest_file};
use crate::error::{MigrateError, Result};
use crate::events::{EventSink, TransferEvent};
use crate::image::BlobSet;
use crate::registry::{RegistryCoordinates, RegistryTransport};
use crate::transfer::task::{BatchReport, Direction, TaskOutcome, TransferTask};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Maximum number of blobs in flight per batch
    pub concurrency: usize,
    /// Read buffer size used when hashing local blobs
    pub chunk_size: usize,
    /// Check downloaded bytes against the digest the manifest names.
    /// Uploads are always checked.
    pub verify_digests: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            chunk_size: crate::digest::DEFAULT_CHUNK_SIZE,
            verify_digests: true,
        }
    }
}

pub struct TransferOrchestrator {
    transport: Arc<dyn RegistryTransport>,
    settings: TransferSettings,
    events: Arc<dyn EventSink>,
}

impl TransferOrchestrator {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        settings: TransferSettings,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            transport,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Fetch every blob of the set from `coords` into its local path
    pub async fn download_all(&self, coords: &RegistryCoordinates, blobs: &BlobSet) -> Result<BatchReport> {
        self.run_batch(Direction::Download, coords, blobs).await
    }

    /// Publish every local blob of the set to `coords`
    pub async fn upload_all(&self, coords: &RegistryCoordinates, blobs: &BlobSet) -> Result<BatchReport> {
        self.run_batch(Direction::Upload, coords, blobs).await
    }

    #[tracing::instrument(skip_all, fields(direction = %direction, registry = %coords.base_url, repository = %coords.repository))]
    async fn run_batch(
        &self,
        direction: Direction,
        coords: &RegistryCoordinates,
        blobs: &BlobSet,
    ) -> Result<BatchReport> {
        let start_time = Instant::now();
        let concurrency = self.settings.concurrency.max(1);
        let coordinates = Arc::new(coords.clone());
        let semaphore = Arc::new(Semaphore::new(concurrency));

        self.events.emit(TransferEvent::BatchStarted {
            direction,
            blobs: blobs.len(),
            concurrency,
        });

        let mut pending: FuturesUnordered<_> = blobs
            .iter()
            .cloned()
            .map(|blob| {
                let task = TransferTask::new(direction, Arc::clone(&coordinates), blob.clone());
                let worker = Worker {
                    transport: Arc::clone(&self.transport),
                    settings: self.settings.clone(),
                    events: Arc::clone(&self.events),
                };
                let semaphore = Arc::clone(&semaphore);

                tokio::spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => worker.execute(&task).await,
                        Err(e) => Err(MigrateError::Worker(format!("worker pool closed: {}", e))),
                    };
                    (task, result)
                })
                .map(move |joined| (blob, joined))
            })
            .collect();

        let mut completed = Vec::with_capacity(blobs.len());
        let mut first_failure: Option<MigrateError> = None;

        while let Some((blob, joined)) = pending.next().await {
            let (mut task, result) = match joined {
                Ok(finished) => finished,
                Err(join_error) => (
                    TransferTask::new(direction, Arc::clone(&coordinates), blob),
                    Err(MigrateError::Worker(join_error.to_string())),
                ),
            };

            match result {
                Ok(outcome) => task.outcome = Some(outcome),
                Err(error) => {
                    tracing::warn!(role = %task.blob.role, digest = %task.blob.digest, %error, "blob transfer failed");
                    self.events.emit(TransferEvent::BlobFailed {
                        direction,
                        role: task.blob.role,
                        digest: task.blob.digest.clone(),
                        error: error.to_string(),
                    });
                    task.outcome = Some(TaskOutcome::Failed {
                        error: error.to_string(),
                    });
                    if first_failure.is_none() {
                        first_failure = Some(MigrateError::TransferBatch {
                            direction,
                            role: task.blob.role,
                            digest: task.blob.digest.clone(),
                            source: Box::new(error),
                        });
                    }
                }
            }
            completed.push(task);
        }

        let report = BatchReport {
            direction,
            tasks: completed,
            elapsed: start_time.elapsed(),
        };

        self.events.emit(TransferEvent::BatchFinished {
            direction,
            transferred: report.transferred(),
            skipped: report.skipped(),
            failed: report.failed(),
            elapsed: report.elapsed,
        });

        match first_failure {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }
}

/// Everything one spawned task needs, owned so it can outlive the caller's borrow
struct Worker {
    transport: Arc<dyn RegistryTransport>,
    settings: TransferSettings,
    events: Arc<dyn EventSink>,
}

impl Worker {
    async fn execute(&self, task: &TransferTask) -> Result<TaskOutcome> {
        match task.direction {
            Direction::Download => self.download(task).await,
            Direction::Upload => self.upload(task).await,
        }
    }

    async fn download(&self, task: &TransferTask) -> Result<TaskOutcome> {
        let blob = &task.blob;
        let start_time = Instant::now();
        self.events.emit(TransferEvent::BlobStarted {
            direction: Direction::Download,
            role: blob.role,
            digest: blob.digest.clone(),
        });

        let written = self
            .transport
            .download_blob(&task.coordinates, &blob.digest, &blob.path)
            .await?;
        if self.settings.verify_digests {
            DigestUtils::verify(blob.role, &blob.digest, &written.digest)?;
        }

        self.events.emit(TransferEvent::BlobCompleted {
            direction: Direction::Download,
            role: blob.role,
            digest: written.digest.clone(),
            bytes: written.size,
            elapsed: start_time.elapsed(),
        });
        Ok(TaskOutcome::Transferred {
            bytes: written.size,
            digest: written.digest,
        })
    }

    async fn upload(&self, task: &TransferTask) -> Result<TaskOutcome> {
        let blob = &task.blob;
        let coords = &task.coordinates;
        let start_time = Instant::now();

        // Published under the manifest's digest, so the local bytes must match it
        // whether or not downloads were verified.
        let (digest, size) = digest_file(&blob.path, self.settings.chunk_size).await?;
        DigestUtils::verify(blob.role, &blob.digest, &digest)?;

        if self.transport.blob_exists(coords, &digest).await? {
            tracing::debug!(role = %blob.role, %digest, "blob already present");
            self.events.emit(TransferEvent::BlobAlreadyPresent {
                role: blob.role,
                digest: digest.clone(),
            });
            return Ok(TaskOutcome::AlreadyPresent { digest });
        }

        self.events.emit(TransferEvent::BlobStarted {
            direction: Direction::Upload,
            role: blob.role,
            digest: digest.clone(),
        });

        let location = self.transport.open_upload_session(coords).await?;
        self.events.emit(TransferEvent::UploadSessionOpened {
            role: blob.role,
            location: location.clone(),
        });
        self.transport
            .commit_blob(coords, &location, &digest, &blob.path)
            .await?;

        self.events.emit(TransferEvent::BlobCompleted {
            direction: Direction::Upload,
            role: blob.role,
            digest: digest.clone(),
            bytes: size,
            elapsed: start_time.elapsed(),
        });
        Ok(TaskOutcome::Transferred { bytes: size, digest })
    }
}
