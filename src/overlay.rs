//! Layered lookup of templates and static assets.
//!
//! A deployment ships compiled-in defaults and an operator points extra
//! directories at the same logical namespace; the registry answers "which
//! physical file backs this name" with last-registered-wins precedence,
//! like a union filesystem resolved per lookup instead of merged on disk.
//! Registration only happens while the process composes itself in `main`;
//! after that the registry is shared behind an `Arc` and is read-only.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Template,
    Asset,
}

#[derive(Debug, Default)]
pub struct OverlayRegistry {
    layers: HashMap<ResourceKind, Vec<PathBuf>>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an override directory. Later registrations win over earlier
    /// ones when both contain the same logical name.
    pub fn register(&mut self, kind: ResourceKind, dir: impl Into<PathBuf>) {
        self.layers.entry(kind).or_default().push(dir.into());
    }

    pub fn layer_count(&self, kind: ResourceKind) -> usize {
        self.layers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Returns the physical path backing `name`, scanning layers from the
    /// most recently registered down. Pure read; `None` when no layer has
    /// the name (callers fall back to their compiled-in defaults).
    pub async fn resolve(&self, kind: ResourceKind, name: &str) -> Option<PathBuf> {
        let name = sanitize(name)?;
        let layers = self.layers.get(&kind)?;
        for dir in layers.iter().rev() {
            let candidate = dir.join(&name);
            if fs::metadata(&candidate).await.is_ok() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Logical names come from our own templates and from request paths; only
/// plain relative names are ever looked up.
fn sanitize(name: &str) -> Option<PathBuf> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let mut clean = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => clean.push(segment),
            Component::CurDir => continue,
            _ => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
