//! Blob transfer engine
//!
//! [`TransferOrchestrator`] turns a [`BlobSet`](crate::image::BlobSet) into
//! a batch of concurrent [`TransferTask`]s in one [`Direction`] and reports
//! them as a [`BatchReport`].

pub mod orchestrator;
pub mod task;

pub use orchestrator::{TransferOrchestrator, TransferSettings};
pub use task::{BatchReport, Direction, TaskOutcome, TransferTask};
