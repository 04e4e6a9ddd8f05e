//! Structured migration events
//!
//! The transfer engine reports progress through an [`EventSink`] instead of
//! printing. The console [`Logger`](crate::logging::Logger) is the usual
//! implementation; tests plug in collectors.

use crate::image::BlobRole;
use crate::transfer::Direction;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    MigrationStarted {
        source: String,
        destination: String,
    },
    /// Destination already serves the tag and the migration was skipped
    DestinationExists {
        destination: String,
    },
    ManifestFetched {
        image: String,
        digest: String,
        layers: usize,
        total_size: u64,
    },
    BatchStarted {
        direction: Direction,
        blobs: usize,
        concurrency: usize,
    },
    BlobStarted {
        direction: Direction,
        role: BlobRole,
        digest: String,
    },
    UploadSessionOpened {
        role: BlobRole,
        location: String,
    },
    BlobCompleted {
        direction: Direction,
        role: BlobRole,
        digest: String,
        bytes: u64,
        elapsed: Duration,
    },
    /// Upload skipped because the destination already has the blob
    BlobAlreadyPresent {
        role: BlobRole,
        digest: String,
    },
    BlobFailed {
        direction: Direction,
        role: BlobRole,
        digest: String,
        error: String,
    },
    BatchFinished {
        direction: Direction,
        transferred: usize,
        skipped: usize,
        failed: usize,
        elapsed: Duration,
    },
    ManifestCommitted {
        image: String,
        digest: String,
    },
    MigrationFinished {
        destination: String,
        elapsed: Duration,
    },
}

/// Receiver of migration events; must be callable from any worker
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransferEvent);
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: TransferEvent) {}
}
