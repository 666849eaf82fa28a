//! The upload root: safe path resolution, recursive listing, reads and
//! atomic writes for user files.
//!
//! Every user-visible file operation funnels through [`Storage`], which
//! confines it beneath one canonicalized root directory. Resolution is
//! lexical first (no filesystem access until the requested name is proven to
//! stay inside the root) and then verifies that no existing component is a
//! symlink, so a link inside the root can never point an operation outside
//! of it.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;

use crate::atomic::AtomicFile;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Opens (creating if necessary) and canonicalizes the upload root.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Maps a user-supplied relative name to an absolute path under the root.
    ///
    /// Leading separators are stripped (absolute inputs are treated as
    /// root-relative), `.` segments are dropped, and `..` pops the previous
    /// segment; popping past the top rejects the name. The result is
    /// guaranteed to sit strictly below the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, StorageError> {
        let trimmed = requested.trim().trim_start_matches(['/', '\\']);
        if trimmed.is_empty() {
            return Err(StorageError::InvalidName);
        }

        let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => segments.push(segment),
                Component::CurDir => continue,
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(StorageError::Traversal);
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::Traversal);
                }
            }
        }
        if segments.is_empty() {
            return Err(StorageError::InvalidName);
        }

        let mut resolved = self.root.clone();
        resolved.extend(segments);
        if !resolved.starts_with(&self.root) || resolved == self.root {
            return Err(StorageError::Traversal);
        }
        Ok(resolved)
    }

    /// Rejects targets whose existing components include a symlink.
    ///
    /// Components that do not exist yet end the walk; the write path creates
    /// them afterwards.
    async fn reject_symlink_components(&self, target: &Path) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::Traversal)?;
        let mut current = self.root.clone();
        for component in relative.components() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    return Err(StorageError::Traversal);
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
        Ok(())
    }

    /// Reads the file as text; a missing file is `None`, not an error.
    pub async fn read_text(&self, requested: &str) -> Result<Option<String>, StorageError> {
        let target = self.resolve(requested)?;
        self.reject_symlink_components(&target).await?;
        match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_dir() => return Err(StorageError::InvalidName),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        }
        let bytes = fs::read(&target).await.map_err(StorageError::Io)?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Atomically replaces the file at the resolved path with `content`,
    /// creating missing parent directories after the traversal check.
    pub async fn write(&self, requested: &str, content: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(requested)?;
        self.reject_symlink_components(&target).await?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(StorageError::Save)?;
        }

        let mut staged = AtomicFile::create(&target).await.map_err(StorageError::Save)?;
        if let Err(err) = staged.write_all(content).await {
            staged.discard().await;
            return Err(StorageError::Save(err));
        }
        staged.commit().await.map_err(StorageError::Save)
    }

    /// Walks the whole tree and returns every regular file, sorted by
    /// relative path. Directories are descended into but never emitted;
    /// symlinks and dot-prefixed names are skipped.
    pub async fn list_files(&self) -> Result<Vec<FileEntry>, StorageError> {
        let mut pending = vec![self.root.clone()];
        let mut entries = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut reader = fs::read_dir(&dir).await.map_err(StorageError::Listing)?;
            while let Some(entry) = reader.next_entry().await.map_err(StorageError::Listing)? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let metadata = fs::symlink_metadata(&path)
                    .await
                    .map_err(StorageError::Listing)?;
                if metadata.file_type().is_symlink() {
                    continue;
                }
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !metadata.is_file() {
                    continue;
                }

                let relative = path
                    .strip_prefix(&self.root)
                    .map_err(|_| StorageError::Traversal)?
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                let modified = metadata
                    .modified()
                    .ok()
                    .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                    .map(format_timestamp);
                entries.push(FileEntry {
                    path: relative,
                    size: metadata.len(),
                    modified,
                });
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Removes staged temp files older than `ttl` anywhere under the root.
    /// Returns how many were removed.
    pub async fn sweep_stale_temps(&self, ttl: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut pending = vec![self.root.clone()];
        let mut removed = 0;

        while let Some(dir) = pending.pop() {
            let mut reader = fs::read_dir(&dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                let path = entry.path();
                let metadata = fs::symlink_metadata(&path).await?;
                if metadata.file_type().is_symlink() {
                    continue;
                }
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !(name.starts_with('.') && name.contains(".tmp.")) {
                    continue;
                }
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|ts| now.duration_since(ts).ok());
                if age.is_some_and(|age| age >= ttl) {
                    fs::remove_file(&path).await?;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One regular file under the upload root, path relative to it in POSIX
/// form. Produced per listing call, never persisted.
#[derive(Debug)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub modified: Option<String>,
}

#[derive(Debug)]
pub enum StorageError {
    /// The requested name escapes the upload root, or crosses a symlink.
    Traversal,
    /// Empty or otherwise unusable file name.
    InvalidName,
    /// The tree walk behind the file index failed.
    Listing(io::Error),
    /// Staging or renaming the replacement file failed.
    Save(io::Error),
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
