//! Persisting downloaded files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, instrument};

use super::error::DownloadError;
use super::filename::resolve_unique_path;

/// Final step of a download: hands the bytes to the user.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Saves `bytes` under (a unique variant of) `filename` and returns where it went.
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError>;
}

/// Writes files into a directory, never overwriting existing ones.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Sink for DirectorySink {
    #[instrument(skip(self, bytes), fields(dir = %self.dir.display(), len = bytes.len()))]
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::io(&self.dir, e))?;

        let path = resolve_unique_path(&self.dir, filename);
        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;

        let mut writer = BufWriter::new(file);
        if let Err(e) = write_all(&mut writer, bytes).await {
            let _ = fs::remove_file(&path).await;
            return Err(DownloadError::io(&path, e));
        }

        info!(path = %path.display(), "file saved");
        Ok(path)
    }
}

async fn write_all(writer: &mut BufWriter<File>, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
