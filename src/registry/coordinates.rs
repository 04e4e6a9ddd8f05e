//! Registry coordinates and image locations
//!
//! A [`RegistryCoordinates`] value names one repository on one registry,
//! together with the basic credentials used for every request against it.

use crate::digest::DigestUtils;
use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP basic credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCoordinates {
    /// Scheme and host, e.g. `https://harbor.example.com`
    pub base_url: String,
    /// Repository path, e.g. `project/app`
    pub repository: String,
    pub credentials: Option<Credentials>,
}

impl RegistryCoordinates {
    pub fn new(base_url: &str, repository: &str, credentials: Option<Credentials>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            repository: repository.trim_matches('/').to_string(),
            credentials,
        }
    }

    pub fn manifest_url(&self, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.base_url, self.repository, reference)
    }

    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.base_url, self.repository, digest)
    }

    pub fn uploads_url(&self) -> String {
        format!("{}/v2/{}/blobs/uploads/", self.base_url, self.repository)
    }
}

impl fmt::Display for RegistryCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_url, self.repository)
    }
}

/// A tagged image on a specific registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    pub coordinates: RegistryCoordinates,
    pub reference: String,
}

impl ImageLocation {
    pub fn new(coordinates: RegistryCoordinates, reference: &str) -> Self {
        Self {
            coordinates,
            reference: reference.to_string(),
        }
    }

    /// Parse `https://registry/project/repo:tag` or `.../repo@sha256:<hex>`;
    /// the scheme defaults to `https://` and the tag to `latest`
    pub fn parse(image: &str, credentials: Option<Credentials>) -> Result<Self> {
        let (scheme, remaining) = match image.find("://") {
            Some(pos) => (&image[..pos + 3], &image[pos + 3..]),
            None => ("https://", image),
        };

        let (host, path) = remaining.split_once('/').ok_or_else(|| {
            MigrateError::InvalidReference(format!(
                "{}: expected registry/project/repo:tag",
                image
            ))
        })?;
        if host.is_empty() {
            return Err(MigrateError::InvalidReference(format!("{}: missing registry host", image)));
        }

        let (repository, tag) = split_repository_tag(path);
        if repository.is_empty() {
            return Err(MigrateError::InvalidReference(format!("{}: empty repository", image)));
        }
        if path.contains('@') && !DigestUtils::is_valid_docker_digest(tag) {
            return Err(MigrateError::InvalidReference(format!("{}: invalid digest '{}'", image, tag)));
        }

        let base_url = format!("{}{}", scheme, host);
        Ok(Self::new(
            RegistryCoordinates::new(&base_url, repository, credentials),
            tag,
        ))
    }

    /// Address of the manifest this location names
    pub fn manifest_url(&self) -> String {
        self.coordinates.manifest_url(&self.reference)
    }

    /// Short filesystem-safe name, used for per-image work directories
    pub fn sanitized_name(&self) -> String {
        format!("{}_{}", self.coordinates.repository, self.reference)
            .replace(['/', ':', '@'], "_")
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if DigestUtils::is_valid_docker_digest(&self.reference) {
            write!(f, "{}@{}", self.coordinates, self.reference)
        } else {
            write!(f, "{}:{}", self.coordinates, self.reference)
        }
    }
}

/// Split `project/repo:tag` into repository and tag (default `latest`).
/// A `@digest` suffix wins over any tag.
pub fn split_repository_tag(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    if let Some((name, digest)) = path.split_once('@') {
        let (repository, _) = split_repository_tag(name);
        return (repository, digest);
    }
    let last_segment = path.rfind('/').map_or(0, |p| p + 1);
    match path[last_segment..].rfind(':') {
        Some(colon) => {
            let colon = last_segment + colon;
            (&path[..colon], &path[colon + 1..])
        }
        None => (path, "latest"),
    }
}
