//! Image model: manifests and the blobs they reference
//!
//! [`ImageManifest`] is the parsed registry manifest, [`FetchedManifest`]
//! keeps the exact bytes served by the source registry, and [`BlobSet`]
//! maps every referenced blob to its file in the migration work directory.

pub mod blob;
pub mod manifest;

pub use blob::{BlobDescriptor, BlobRole, BlobSet, CONFIG_FILE, MANIFEST_FILE};
pub use manifest::{Descriptor, FetchedManifest, ImageManifest};
