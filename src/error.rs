//! Error types for the image migrator
//!
//! Every failure in the transfer engine is a [`MigrateError`]. Registry
//! failures always carry enough context (registry, repository, digest or
//! tag, HTTP status and body) to be reported to the user as-is.

use crate::image::BlobRole;
use crate::transfer::Direction;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// The registry answered with a status the protocol step does not accept
    #[error("{operation} failed on {registry}/{repository} ({target}): HTTP {status} - {body}")]
    Protocol {
        registry: String,
        repository: String,
        operation: &'static str,
        target: String,
        status: u16,
        body: String,
    },

    /// The manifest body could not be interpreted as a single-image manifest
    #[error("invalid manifest {repository}:{reference} from {registry}: {reason}")]
    ManifestFormat {
        registry: String,
        repository: String,
        reference: String,
        reason: String,
    },

    /// Computed content digest differs from the one the manifest names
    #[error("content digest mismatch for {role}: expected {expected}, computed {actual}")]
    ContentIntegrity {
        role: BlobRole,
        expected: String,
        actual: String,
    },

    /// First failure observed in a concurrent transfer batch
    #[error("{direction} of {role} ({digest}) failed: {source}")]
    TransferBatch {
        direction: Direction,
        role: BlobRole,
        digest: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("upload session on {registry}/{repository} returned no Location header")]
    MissingLocation { registry: String, repository: String },

    #[error("network error talking to {registry}: {source}")]
    Network {
        registry: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A transfer worker panicked or was aborted by the runtime
    #[error("transfer worker failed: {0}")]
    Worker(String),
}

impl MigrateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrateError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn network(registry: &str, source: reqwest::Error) -> Self {
        MigrateError::Network {
            registry: registry.to_string(),
            source,
        }
    }

    /// HTTP status behind this error, looking through batch wrappers
    pub fn status(&self) -> Option<u16> {
        match self {
            MigrateError::Protocol { status, .. } => Some(*status),
            MigrateError::TransferBatch { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Innermost error, looking through batch wrappers
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::TransferBatch { source, .. } => source.root(),
            other => other,
        }
    }
}
