//! Image manifest model
//!
//! Only single-image manifests (Docker schema 2 and OCI image manifest) are
//! accepted. The raw bytes fetched from the registry are kept next to the
//! parsed form so the manifest can be republished byte-for-byte.

use crate::digest::DigestUtils;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG_V1: &str = "application/vnd.oci.image.config.v1+json";

/// Media types sent in the `Accept` header when resolving a tag
pub const ACCEPTED_MANIFEST_TYPES: &[&str] = &[DOCKER_MANIFEST_V2, OCI_MANIFEST_V1];

/// A content descriptor (config or layer) inside a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub size: u64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ImageManifest {
    /// Parse and validate a manifest body
    pub fn from_slice(data: &[u8]) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(|e| format!("not valid JSON: {}", e))?;

        if let Some(media_type) = value.get("mediaType").and_then(|m| m.as_str()) {
            if is_index_media_type(media_type) {
                return Err(format!("manifest lists are not supported ({})", media_type));
            }
        }
        if value.get("manifests").is_some() {
            return Err("manifest lists are not supported".to_string());
        }

        let manifest: ImageManifest =
            serde_json::from_value(value).map_err(|e| format!("unexpected schema: {}", e))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != 2 {
            return Err(format!("unsupported schema version {}", self.schema_version));
        }
        for descriptor in std::iter::once(&self.config).chain(self.layers.iter()) {
            if !DigestUtils::is_valid_docker_digest(&descriptor.digest) {
                return Err(format!("invalid digest '{}'", descriptor.digest));
            }
        }
        Ok(())
    }

    /// Content type inferred from the body alone
    ///
    /// `mediaType` is optional in OCI manifests, so an OCI config descriptor
    /// also marks the manifest as OCI.
    pub fn content_type(&self) -> &str {
        match self.media_type.as_deref() {
            Some(OCI_MANIFEST_V1) => OCI_MANIFEST_V1,
            Some(DOCKER_MANIFEST_V2) => DOCKER_MANIFEST_V2,
            _ if self.config.media_type == OCI_CONFIG_V1 => OCI_MANIFEST_V1,
            _ => DOCKER_MANIFEST_V2,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}

pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == DOCKER_MANIFEST_LIST_V2 || media_type == OCI_INDEX_V1
}

/// A manifest as served by a registry: raw bytes plus the parsed form
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub raw: Vec<u8>,
    pub manifest: ImageManifest,
    pub content_type: Option<String>,
}

impl FetchedManifest {
    pub fn parse(raw: Vec<u8>, content_type: Option<String>) -> Result<Self, String> {
        let manifest = ImageManifest::from_slice(&raw)?;
        Ok(Self {
            raw,
            manifest,
            content_type,
        })
    }

    /// Digest of the raw manifest bytes
    pub fn digest(&self) -> String {
        DigestUtils::compute_docker_digest(&self.raw)
    }

    /// Content type to republish under: the source's `Content-Type` when it
    /// names a single-image manifest, otherwise whatever the body implies.
    pub fn publish_content_type(&self) -> &str {
        let served = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim);
        match served {
            Some(ct) if ACCEPTED_MANIFEST_TYPES.contains(&ct) => ct,
            _ => self.manifest.content_type(),
        }
    }
}
