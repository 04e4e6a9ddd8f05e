//! SHA256 digest utilities for registry blobs
//!
//! Digests are always rendered as `sha256:<lowercase hex>`. Files are hashed
//! in fixed-size chunks so memory use stays bounded by the chunk size no
//! matter how large a layer is.

use crate::error::{MigrateError, Result};
use crate::image::BlobRole;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Content hash algorithm used for every blob and manifest
pub const ALGORITHM: &str = "sha256";

/// Default read/write chunk size for blob streams
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Docker digest of zero bytes
pub const EMPTY_DIGEST: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Incremental hasher for content that arrives in chunks
#[derive(Clone, Default)]
pub struct ContentHasher {
    hasher: Sha256,
    size: u64,
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher").field("size", &self.size).finish()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consume the hasher and return the `sha256:<hex>` digest
    pub fn finalize(self) -> String {
        format!("{}:{}", ALGORITHM, hex::encode(self.hasher.finalize()))
    }
}

/// Utilities for working with SHA256 digests in registry context
pub struct DigestUtils;

impl DigestUtils {
    /// Compute full Docker digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Validate SHA256 hex string (64 characters, lowercase hex)
    pub fn is_valid_sha256_hex(hex_part: &str) -> bool {
        hex_part.len() == 64
            && hex_part
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    /// Validate full Docker digest format (sha256:xxxxx)
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix("sha256:")
            .is_some_and(Self::is_valid_sha256_hex)
    }

    pub fn validate(digest: &str) -> Result<()> {
        if Self::is_valid_docker_digest(digest) {
            Ok(())
        } else {
            Err(MigrateError::InvalidDigest(digest.to_string()))
        }
    }

    /// Compare a computed digest with the one the manifest claims
    pub fn verify(role: BlobRole, expected: &str, actual: &str) -> Result<()> {
        if expected != actual {
            return Err(MigrateError::ContentIntegrity {
                role,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Format digest for display (truncated for readability)
    pub fn format_digest_short(digest: &str) -> String {
        if digest.len() > 19 {
            format!("{}...", &digest[..19])
        } else {
            digest.to_string()
        }
    }
}

/// Hash a file on disk, returning its digest and size
pub async fn digest_file(path: &Path, chunk_size: usize) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| MigrateError::io(path, e))?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut hasher = ContentHasher::new();

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| MigrateError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let size = hasher.size();
    Ok((hasher.finalize(), size))
}
