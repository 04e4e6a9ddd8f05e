// This file contains the implementation of the RegistryClient struct,
// which speaks the Docker Registry HTTP API v2 on behalf of the transfer
// engine: manifest fetch and publish, blob existence checks, streamed blob
// downloads and the two-step upload session protocol.

use crate::digest::{ContentHasher, DEFAULT_CHUNK_SIZE};
use crate::error::{MigrateError, Result};
use crate::image::FetchedManifest;
use crate::image::manifest::ACCEPTED_MANIFEST_TYPES;
use crate::registry::coordinates::RegistryCoordinates;
use crate::registry::transport::{BlobWritten, RegistryTransport};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use url::Url;

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

pub struct RegistryClientBuilder {
    timeout: Duration,
    insecure: bool,
    chunk_size: usize,
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClientBuilder {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            insecure: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept self-signed or otherwise invalid TLS certificates
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.insecure)
            .build()
            .map_err(|e| MigrateError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(RegistryClient {
            client,
            chunk_size: self.chunk_size,
        })
    }
}

/// Stateless Registry API v2 client
///
/// Holds only the connection pool; coordinates and credentials arrive with
/// every call, so a single instance serves both registries of a migration.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    chunk_size: usize,
}

impl RegistryClient {
    pub fn builder() -> RegistryClientBuilder {
        RegistryClientBuilder::new()
    }

    fn request(&self, method: Method, url: &str, coords: &RegistryCoordinates) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &coords.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    async fn send(&self, coords: &RegistryCoordinates, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| MigrateError::network(&coords.base_url, e))
    }

    async fn protocol_error(
        coords: &RegistryCoordinates,
        operation: &'static str,
        target: &str,
        response: Response,
    ) -> MigrateError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        MigrateError::Protocol {
            registry: coords.base_url.clone(),
            repository: coords.repository.clone(),
            operation,
            target: target.to_string(),
            status,
            body: body.trim().to_string(),
        }
    }
}

#[async_trait]
impl RegistryTransport for RegistryClient {
    async fn fetch_manifest(
        &self,
        coords: &RegistryCoordinates,
        reference: &str,
    ) -> Result<FetchedManifest> {
        let url = coords.manifest_url(reference);
        tracing::debug!(%url, "fetching manifest");

        let request = self
            .request(Method::GET, &url, coords)
            .header(ACCEPT, ACCEPTED_MANIFEST_TYPES.join(", "));
        let response = self.send(coords, request).await?;

        if response.status() != StatusCode::OK {
            return Err(Self::protocol_error(coords, "fetch manifest", reference, response).await);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw = response
            .bytes()
            .await
            .map_err(|e| MigrateError::network(&coords.base_url, e))?
            .to_vec();

        FetchedManifest::parse(raw, content_type).map_err(|reason| MigrateError::ManifestFormat {
            registry: coords.base_url.clone(),
            repository: coords.repository.clone(),
            reference: reference.to_string(),
            reason,
        })
    }

    async fn manifest_exists(&self, coords: &RegistryCoordinates, reference: &str) -> Result<bool> {
        let url = coords.manifest_url(reference);
        let request = self
            .request(Method::HEAD, &url, coords)
            .header(ACCEPT, ACCEPTED_MANIFEST_TYPES.join(", "));
        let response = self.send(coords, request).await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::protocol_error(coords, "check manifest", reference, response).await),
        }
    }

    async fn blob_exists(&self, coords: &RegistryCoordinates, digest: &str) -> Result<bool> {
        let url = coords.blob_url(digest);
        let response = self.send(coords, self.request(Method::HEAD, &url, coords)).await?;
        let status = response.status();

        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                // Any other status is treated as absent; the upload that
                // follows will surface a real permission or server problem.
                tracing::warn!(
                    registry = %coords.base_url,
                    repository = %coords.repository,
                    digest,
                    status = status.as_u16(),
                    "unexpected status checking blob, treating as absent"
                );
                Ok(false)
            }
        }
    }

    async fn download_blob(
        &self,
        coords: &RegistryCoordinates,
        digest: &str,
        dest: &Path,
    ) -> Result<BlobWritten> {
        let url = coords.blob_url(digest);
        tracing::debug!(%url, dest = %dest.display(), "downloading blob");

        let response = self.send(coords, self.request(Method::GET, &url, coords)).await?;
        if response.status() != StatusCode::OK {
            return Err(Self::protocol_error(coords, "download blob", digest, response).await);
        }

        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| MigrateError::io(dest, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut hasher = ContentHasher::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MigrateError::network(&coords.base_url, e))?;
            hasher.update(&chunk);
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| MigrateError::io(dest, e))?;
        }
        writer.flush().await.map_err(|e| MigrateError::io(dest, e))?;

        Ok(BlobWritten {
            size: hasher.size(),
            digest: hasher.finalize(),
        })
    }

    async fn open_upload_session(&self, coords: &RegistryCoordinates) -> Result<String> {
        let url = coords.uploads_url();
        let response = self.send(coords, self.request(Method::POST, &url, coords)).await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::protocol_error(coords, "open upload session", &url, response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| MigrateError::MissingLocation {
                registry: coords.base_url.clone(),
                repository: coords.repository.clone(),
            })?;

        let resolved = resolve_location(&coords.base_url, location)?;
        tracing::debug!(location = %resolved, "upload session opened");
        Ok(resolved)
    }

    async fn commit_blob(
        &self,
        coords: &RegistryCoordinates,
        location: &str,
        digest: &str,
        source: &Path,
    ) -> Result<()> {
        let url = upload_url_with_digest(location, digest)?;

        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| MigrateError::io(source, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| MigrateError::io(source, e))?
            .len();
        let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(file, self.chunk_size));

        let request = self
            .request(Method::PUT, &url, coords)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(body);
        let response = self.send(coords, request).await?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::protocol_error(coords, "commit blob", digest, response).await);
        }
        Ok(())
    }

    async fn commit_manifest(
        &self,
        coords: &RegistryCoordinates,
        reference: &str,
        manifest: &[u8],
        content_type: &str,
    ) -> Result<Option<String>> {
        let url = coords.manifest_url(reference);
        tracing::debug!(%url, content_type, "publishing manifest");

        let request = self
            .request(Method::PUT, &url, coords)
            .header(CONTENT_TYPE, content_type)
            .body(manifest.to_vec());
        let response = self.send(coords, request).await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response
                .headers()
                .get(DOCKER_CONTENT_DIGEST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)),
            _ => Err(Self::protocol_error(coords, "commit manifest", reference, response).await),
        }
    }
}

/// Resolve an upload `Location` header against the registry base URL
pub fn resolve_location(base_url: &str, location: &str) -> Result<String> {
    let base = Url::parse(base_url).map_err(|e| MigrateError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    let resolved = base.join(location).map_err(|e| MigrateError::InvalidUrl {
        url: location.to_string(),
        reason: e.to_string(),
    })?;
    Ok(resolved.into())
}

/// Append the `digest` query parameter that closes an upload session
pub fn upload_url_with_digest(location: &str, digest: &str) -> Result<String> {
    let mut url = Url::parse(location).map_err(|e| MigrateError::InvalidUrl {
        url: location.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut().append_pair("digest", digest);
    Ok(url.into())
}
