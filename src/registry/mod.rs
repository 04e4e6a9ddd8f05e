//! Registry module for Docker registry interactions
//!
//! This module provides the stateless Docker Registry HTTP API v2 client,
//! the [`RegistryTransport`] seam the transfer engine is written against,
//! and the coordinates that address a repository on a registry.

pub mod client;
pub mod coordinates;
pub mod transport;

pub use client::{RegistryClient, RegistryClientBuilder};
pub use coordinates::{Credentials, ImageLocation, RegistryCoordinates};
pub use transport::{BlobWritten, RegistryTransport};
