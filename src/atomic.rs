//! Temp-file-plus-rename helper for atomic file replacement.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A file staged next to its target and renamed over it on commit.
///
/// The temp name is dot-prefixed so directory listings never surface a
/// half-written file. A failed commit removes the temp file and leaves
/// whatever was at the target untouched.
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    pub async fn create(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{base}.tmp.{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await
    }

    /// Abandons the staged content.
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// Flushes the temp file to disk and renames it over the target.
    pub async fn commit(self) -> io::Result<()> {
        self.file.sync_all().await?;
        drop(self.file);

        if let Err(err) = rename_into_place(&self.temp_path, &self.target).await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }
        Ok(())
    }
}

#[cfg(not(windows))]
async fn rename_into_place(temp_path: &Path, target: &Path) -> io::Result<()> {
    fs::rename(temp_path, target).await
}

#[cfg(windows)]
async fn rename_into_place(temp_path: &Path, target: &Path) -> io::Result<()> {
    // rename does not replace an existing file on Windows; retry after unlink.
    match fs::rename(temp_path, target).await {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::remove_file(target).await?;
            fs::rename(temp_path, target).await
        }
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
