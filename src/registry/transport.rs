//! Transport seam for Docker Registry API v2 operations
//!
//! The transfer engine only talks to registries through
//! [`RegistryTransport`]. Implementations must be stateless between calls:
//! every call carries its own coordinates and credentials, so one instance
//! can be shared by all transfer workers without locking.

use crate::error::Result;
use crate::image::FetchedManifest;
use crate::registry::coordinates::RegistryCoordinates;
use async_trait::async_trait;
use std::path::Path;

/// Result of streaming a blob to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobWritten {
    pub size: u64,
    /// Digest computed over the bytes actually written
    pub digest: String,
}

#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// GET the manifest for a tag
    async fn fetch_manifest(
        &self,
        coords: &RegistryCoordinates,
        reference: &str,
    ) -> Result<FetchedManifest>;

    /// HEAD the manifest for a tag
    async fn manifest_exists(&self, coords: &RegistryCoordinates, reference: &str) -> Result<bool>;

    /// HEAD a blob; only 200 counts as present
    async fn blob_exists(&self, coords: &RegistryCoordinates, digest: &str) -> Result<bool>;

    /// Stream a blob into `dest`
    async fn download_blob(
        &self,
        coords: &RegistryCoordinates,
        digest: &str,
        dest: &Path,
    ) -> Result<BlobWritten>;

    /// POST a new upload session and return its absolute location
    async fn open_upload_session(&self, coords: &RegistryCoordinates) -> Result<String>;

    /// PUT the whole blob to an upload session, closing it under `digest`
    async fn commit_blob(
        &self,
        coords: &RegistryCoordinates,
        location: &str,
        digest: &str,
        source: &Path,
    ) -> Result<()>;

    /// PUT a manifest under a tag; returns the digest the registry reports, if any
    async fn commit_manifest(
        &self,
        coords: &RegistryCoordinates,
        reference: &str,
        manifest: &[u8],
        content_type: &str,
    ) -> Result<Option<String>>;
}
