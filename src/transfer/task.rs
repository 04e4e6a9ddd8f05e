//! Transfer tasks and batch reports

use crate::image::{BlobDescriptor, BlobRole};
use crate::registry::RegistryCoordinates;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Bytes moved over the network; `digest` is computed from them
    Transferred { bytes: u64, digest: String },
    /// Destination already had the blob, nothing was sent
    AlreadyPresent { digest: String },
    Failed { error: String },
}

/// One planned blob transfer
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub direction: Direction,
    pub coordinates: Arc<RegistryCoordinates>,
    pub blob: BlobDescriptor,
    /// `None` until the task has run
    pub outcome: Option<TaskOutcome>,
}

impl TransferTask {
    pub fn new(direction: Direction, coordinates: Arc<RegistryCoordinates>, blob: BlobDescriptor) -> Self {
        Self {
            direction,
            coordinates,
            blob,
            outcome: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(
            self.outcome,
            Some(TaskOutcome::Transferred { .. } | TaskOutcome::AlreadyPresent { .. })
        )
    }
}

/// Tasks of a finished batch, in completion order
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub direction: Direction,
    pub tasks: Vec<TransferTask>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn transferred(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Transferred { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::AlreadyPresent { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.tasks
            .iter()
            .filter_map(|t| match &t.outcome {
                Some(TaskOutcome::Transferred { bytes, .. }) => Some(*bytes),
                _ => None,
            })
            .sum()
    }

    pub fn task(&self, role: BlobRole) -> Option<&TransferTask> {
        self.tasks.iter().find(|t| t.blob.role == role)
    }

    /// Roles in the order their tasks completed
    pub fn completion_order(&self) -> Vec<BlobRole> {
        self.tasks.iter().map(|t| t.blob.role).collect()
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.outcome.as_ref().is_some_and(&predicate))
            .count()
    }
}
