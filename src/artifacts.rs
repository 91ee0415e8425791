//! On-disk artifacts: one directory per run, one PNG per checkpoint.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use action_flow::{ArtifactError, ArtifactSink};
use async_trait::async_trait;
use chrono::Utc;
use portalflow_core_types::CheckpointName;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const SUFFIX_LEN: usize = 6;
const CREATE_ATTEMPTS: usize = 5;

/// Create `<root>/<YYYY-MM-DD>_<suffix>` where the suffix is 6 random lowercase alphanumerics.
pub async fn create_run_dir(root: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(root).await?;
    let stamp = Utc::now().format("%Y-%m-%d");

    let mut last_err = None;
    for _ in 0..CREATE_ATTEMPTS {
        let dir = root.join(format!("{}_{}", stamp, random_suffix()));
        match fs::create_dir(&dir).await {
            Ok(()) => {
                debug!(run_dir = %dir.display(), "run directory created");
                return Ok(dir);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => last_err = Some(err),
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no run directory")))
}

fn random_suffix() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect()
}

/// Writes each snapshot as `NN_<checkpoint>.png` in store order, returning the file path.
#[derive(Debug)]
pub struct FsArtifactSink {
    dir: PathBuf,
    next: AtomicUsize,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn store(&self, checkpoint: &CheckpointName, png: &[u8]) -> Result<String, ArtifactError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("{:02}_{}.png", index, file_stem(checkpoint.as_str())));
        fs::write(&path, png).await?;
        Ok(path.display().to_string())
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
