//! Artifact sinks: where checkpoint snapshots go.

use async_trait::async_trait;
use parking_lot::Mutex;
use portalflow_core_types::CheckpointName;

use crate::errors::ArtifactError;

/// Accepts a checkpoint snapshot and returns a reference to the stored artifact.
///
/// Never read back by the engine. Failures are logged by the runner and otherwise ignored.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(&self, checkpoint: &CheckpointName, png: &[u8]) -> Result<String, ArtifactError>;
}

/// Discards every artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullArtifactSink;

#[async_trait]
impl ArtifactSink for NullArtifactSink {
    async fn store(&self, checkpoint: &CheckpointName, _png: &[u8]) -> Result<String, ArtifactError> {
        Err(ArtifactError::Rejected(format!(
            "no artifact destination for {}",
            checkpoint
        )))
    }
}

/// Keeps artifacts in memory; references are `mem://<checkpoint>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    stored: Mutex<Vec<(CheckpointName, usize)>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored checkpoints with their snapshot sizes, in store order.
    pub fn stored(&self) -> Vec<(CheckpointName, usize)> {
        self.stored.lock().clone()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn store(&self, checkpoint: &CheckpointName, png: &[u8]) -> Result<String, ArtifactError> {
        self.stored.lock().push((checkpoint.clone(), png.len()));
        Ok(format!("mem://{}", checkpoint))
    }
}
