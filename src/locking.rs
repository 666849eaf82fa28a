//! In-process per-path locks that serialize writes to the same file.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// Async mutexes keyed by the storage-relative file name.
///
/// Two requests writing the same name take turns; writes to different names
/// proceed concurrently. Only guards against racers inside this process.
#[derive(Debug, Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `path`, waiting at most `timeout`.
    /// `None` means the wait timed out and nothing was locked.
    pub async fn acquire(&self, path: &str, timeout: Duration) -> Option<OwnedMutexGuard<()>> {
        let key = lock_key(path);
        let lock = {
            let mut locks = self.inner.lock().await;
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned()).await.ok()
    }
}

fn lock_key(path: &str) -> String {
    path.trim()
        .trim_start_matches(['/', '\\'])
        .replace('\\', "/")
}
