//! Configuration module for managing application settings
//!
//! Settings come from an optional YAML file, then environment variables fill
//! whatever the file left unset, then command-line flags override both.

use crate::digest::DEFAULT_CHUNK_SIZE;
use crate::error::{MigrateError, Result};
use crate::migrate::{MigrationOptions, MigrationPlan};
use crate::registry::{Credentials, ImageLocation};
use crate::transfer::TransferSettings;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_WORK_DIR: &str = "./downloaded_files";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

pub const ENV_SOURCE_USERNAME: &str = "MIGRATOR_SOURCE_USERNAME";
pub const ENV_SOURCE_PASSWORD: &str = "MIGRATOR_SOURCE_PASSWORD";
pub const ENV_DEST_USERNAME: &str = "MIGRATOR_DEST_USERNAME";
pub const ENV_DEST_PASSWORD: &str = "MIGRATOR_DEST_PASSWORD";
pub const ENV_CONCURRENCY: &str = "MIGRATOR_CONCURRENCY";

/// One registry, e.g. `https://harbor.example.com`, plus its basic credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEndpoint {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RegistryEndpoint {
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }

    /// Resolve `project/repo:tag` against this registry
    pub fn location(&self, image: &str) -> Result<ImageLocation> {
        let full = format!("{}/{}", self.url.trim_end_matches('/'), image.trim_start_matches('/'));
        ImageLocation::parse(&full, self.credentials())
    }

    fn validate(&self, side: &str) -> Result<()> {
        if self.url.is_empty() {
            return Err(MigrateError::Config(format!("{} registry url is not set", side)));
        }
        let parsed = Url::parse(&self.url)
            .map_err(|e| MigrateError::Config(format!("{} registry url '{}': {}", side, self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MigrateError::Config(format!(
                "{} registry url '{}' must use http or https",
                side, self.url
            )));
        }
        // Repositories are given per image, so the endpoint names only the host
        if !matches!(parsed.path(), "" | "/") || parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(MigrateError::Config(format!(
                "{} registry url '{}' must name only the registry host",
                side, self.url
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(MigrateError::Config(format!(
                "{} registry needs both username and password",
                side
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub concurrency: usize,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub verify_digests: bool,
    /// Accept invalid TLS certificates
    pub insecure: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verify_digests: true,
            insecure: false,
        }
    }
}

impl TransferConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Source image and where it should land; the destination defaults to the
/// same repository and tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMapping {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl ImageMapping {
    pub fn new(source: impl Into<String>, destination: Option<String>) -> Self {
        Self {
            source: source.into(),
            destination,
        }
    }

    pub fn destination(&self) -> &str {
        self.destination.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: RegistryEndpoint,
    pub destination: RegistryEndpoint,
    pub transfer: TransferConfig,
    pub work_dir: PathBuf,
    pub keep_work_dir: bool,
    pub skip_existing: bool,
    pub images: Vec<ImageMapping>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: RegistryEndpoint::default(),
            destination: RegistryEndpoint::default(),
            transfer: TransferConfig::default(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            keep_work_dir: false,
            skip_existing: false,
            images: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| MigrateError::Config(format!("invalid configuration: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
        Self::from_yaml_str(&content)
    }

    /// Fill unset credentials and concurrency from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fill(&mut self.source.username, lookup(ENV_SOURCE_USERNAME));
        fill(&mut self.source.password, lookup(ENV_SOURCE_PASSWORD));
        fill(&mut self.destination.username, lookup(ENV_DEST_USERNAME));
        fill(&mut self.destination.password, lookup(ENV_DEST_PASSWORD));

        if let Some(value) = lookup(ENV_CONCURRENCY) {
            self.transfer.concurrency = value.trim().parse().map_err(|_| {
                MigrateError::Config(format!("{}='{}' is not a number", ENV_CONCURRENCY, value))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;

        if self.transfer.concurrency == 0 {
            return Err(MigrateError::Config("concurrency must be at least 1".into()));
        }
        if self.transfer.chunk_size == 0 {
            return Err(MigrateError::Config("chunk_size must be at least 1".into()));
        }
        if self.transfer.timeout_secs == 0 {
            return Err(MigrateError::Config("timeout_secs must be at least 1".into()));
        }
        if self.images.is_empty() {
            return Err(MigrateError::Config("no images to migrate".into()));
        }
        Ok(())
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            concurrency: self.transfer.concurrency,
            chunk_size: self.transfer.chunk_size,
            verify_digests: self.transfer.verify_digests,
        }
    }

    pub fn migration_options(&self) -> MigrationOptions {
        MigrationOptions {
            keep_work_dir: self.keep_work_dir,
            skip_existing: self.skip_existing,
        }
    }

    /// One plan per configured image, in file order
    pub fn plans(&self) -> Result<Vec<MigrationPlan>> {
        self.images
            .iter()
            .map(|mapping| {
                let source = self.source.location(&mapping.source)?;
                let destination = self.destination.location(mapping.destination())?;
                Ok(MigrationPlan::new(source, destination, &self.work_dir))
            })
            .collect()
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.is_empty());
    }
}
