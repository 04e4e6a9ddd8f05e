//! Image Migrator Library
//!
//! Copies container images between Docker Registry v2 endpoints: the
//! manifest is fetched from the source, every blob is downloaded and then
//! uploaded concurrently, and the manifest is published at the destination
//! only after all blobs have landed.

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod events;
pub mod image;
pub mod logging;
pub mod migrate;
pub mod registry;
pub mod transfer;

pub use config::AppConfig;
pub use error::{MigrateError, Result};
pub use events::{EventSink, TransferEvent};
pub use logging::Logger;
pub use migrate::{MigrationCoordinator, MigrationOptions, MigrationPlan, MigrationReport, MigrationStatus};
pub use registry::{RegistryClient, RegistryTransport};
pub use transfer::{TransferOrchestrator, TransferSettings};
