//! Blob descriptors and the on-disk layout of a migrated image
//!
//! A migration work directory holds `manifest.json`, `config.json` and one
//! `layer{N}.tar.gz` per layer, N counting from 1 in manifest order.

use crate::image::manifest::ImageManifest;
use std::fmt;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONFIG_FILE: &str = "config.json";

/// Logical role of a blob inside its image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlobRole {
    Config,
    /// Layer position, starting at 1
    Layer(usize),
}

impl BlobRole {
    /// File name of this blob in the work directory
    pub fn file_name(&self) -> String {
        match self {
            BlobRole::Config => CONFIG_FILE.to_string(),
            BlobRole::Layer(n) => format!("layer{}.tar.gz", n),
        }
    }
}

impl fmt::Display for BlobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobRole::Config => write!(f, "config"),
            BlobRole::Layer(n) => write!(f, "layer-{}", n),
        }
    }
}

/// One content-addressed object of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    /// Digest the manifest names for this blob
    pub digest: String,
    pub role: BlobRole,
    pub path: PathBuf,
    /// Size declared by the manifest
    pub size: u64,
}

/// Config plus ordered layers of one image
#[derive(Debug, Clone)]
pub struct BlobSet {
    pub config: BlobDescriptor,
    pub layers: Vec<BlobDescriptor>,
}

impl BlobSet {
    pub fn from_manifest(manifest: &ImageManifest, work_dir: &Path) -> Self {
        let config = BlobDescriptor {
            digest: manifest.config.digest.clone(),
            role: BlobRole::Config,
            path: work_dir.join(BlobRole::Config.file_name()),
            size: manifest.config.size,
        };

        let layers = manifest
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let role = BlobRole::Layer(i + 1);
                BlobDescriptor {
                    digest: layer.digest.clone(),
                    role,
                    path: work_dir.join(role.file_name()),
                    size: layer.size,
                }
            })
            .collect();

        Self { config, layers }
    }

    /// Config first, then layers in manifest order
    pub fn iter(&self) -> impl Iterator<Item = &BlobDescriptor> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn total_size(&self) -> u64 {
        self.iter().map(|b| b.size).sum()
    }
}

impl IntoIterator for BlobSet {
    type Item = BlobDescriptor;
    type IntoIter = std::iter::Chain<std::iter::Once<BlobDescriptor>, std::vec::IntoIter<BlobDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self.config).chain(self.layers)
    }
}
