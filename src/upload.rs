//! Viewing and replacing one file through the editor page.
//!
//! GET shows the current content of the named file (empty when it does not
//! exist yet); POST takes a multipart body with a single file field and
//! atomically replaces the target. The target name comes from the
//! `filename` query parameter, or from the uploaded payload's own name when
//! the parameter is absent. Bad names render an error page and never touch
//! the filesystem.

use axum::body::Bytes;
use axum::extract::{Extension, Multipart, Query};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::{Identity, Permission, require};
use crate::config::{LOCK_WAIT_TIMEOUT_SECS, SiteConfig};
use crate::error::AppError;
use crate::http::upload_url;
use crate::locking::PathLocks;
use crate::render::Renderer;
use crate::storage::{Storage, StorageError};

#[derive(Deserialize)]
pub(crate) struct UploadQuery {
    filename: Option<String>,
}

/// Renders the editor for the named file.
pub async fn edit_page(
    Extension(identity): Extension<Identity>,
    Extension(site): Extension<Arc<SiteConfig>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(renderer): Extension<Arc<Renderer>>,
    Query(query): Query<UploadQuery>,
) -> Result<Response, AppError> {
    require(&identity, Permission::Admin, &site.sign_in_url)?;

    let filename = query.filename.unwrap_or_default();
    match storage.read_text(&filename).await {
        Ok(content) => {
            let editor = Editor {
                filename: &filename,
                content: content.as_deref().unwrap_or_default(),
                notice: "",
                error: "",
            };
            editor.render(&renderer, &site, &identity, StatusCode::OK).await
        }
        Err(StorageError::Traversal) => {
            warn!(filename, "rejected path outside the upload root");
            invalid_name(&renderer, &site, &identity, &filename).await
        }
        Err(StorageError::InvalidName) => {
            invalid_name(&renderer, &site, &identity, &filename).await
        }
        Err(err) => Err(err.into()),
    }
}

/// Persists the uploaded payload to the named file.
pub async fn save_file(
    Extension(identity): Extension<Identity>,
    Extension(site): Extension<Arc<SiteConfig>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(locks): Extension<Arc<PathLocks>>,
    Extension(renderer): Extension<Arc<Renderer>>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    require(&identity, Permission::Admin, &site.sign_in_url)?;

    let payload = file_payload(multipart).await?;
    let filename = query
        .filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| payload.fallback_name.clone());

    match store(&storage, &locks, &filename, &payload.content).await {
        Ok(()) => {
            info!(filename, bytes = payload.content.len(), "file saved");
            let content = storage.read_text(&filename).await?.unwrap_or_default();
            let editor = Editor {
                filename: &filename,
                content: &content,
                notice: "File saved.",
                error: "",
            };
            editor.render(&renderer, &site, &identity, StatusCode::OK).await
        }
        Err(failure) => {
            let attempted = String::from_utf8_lossy(&payload.content);
            let (status, message) = match failure {
                SaveFailure::Rejected => (StatusCode::BAD_REQUEST, "Invalid filename."),
                SaveFailure::Busy => (StatusCode::CONFLICT, "The file is busy, try again."),
                SaveFailure::Failed => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Could not save the file.")
                }
            };
            let editor = Editor {
                filename: &filename,
                content: &attempted,
                notice: "",
                error: message,
            };
            editor.render(&renderer, &site, &identity, status).await
        }
    }
}

/// One view of the editor page.
struct Editor<'a> {
    filename: &'a str,
    content: &'a str,
    notice: &'a str,
    error: &'a str,
}

impl Editor<'_> {
    async fn render(
        &self,
        renderer: &Renderer,
        site: &SiteConfig,
        identity: &Identity,
        status: StatusCode,
    ) -> Result<Response, AppError> {
        let action = upload_url(&site.base_path, self.filename);
        renderer
            .page(
                "upload.html",
                status,
                &[
                    ("title", "Upload"),
                    ("user", identity.display_name()),
                    ("filename", self.filename),
                    ("content", self.content),
                    ("notice", self.notice),
                    ("error", self.error),
                    ("action", &action),
                ],
            )
            .await
            .map_err(Into::into)
    }
}

async fn invalid_name(
    renderer: &Renderer,
    site: &SiteConfig,
    identity: &Identity,
    filename: &str,
) -> Result<Response, AppError> {
    let editor = Editor {
        filename,
        content: "",
        notice: "",
        error: "Invalid filename.",
    };
    editor
        .render(renderer, site, identity, StatusCode::BAD_REQUEST)
        .await
}

struct FilePayload {
    fallback_name: String,
    content: Bytes,
}

/// Pulls the single file field out of the multipart body. No file field is
/// a client error, and so is more than one.
async fn file_payload(mut multipart: Multipart) -> Result<FilePayload, AppError> {
    let mut payload: Option<FilePayload> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let Some(fallback_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if payload.is_some() {
            return Err(AppError::BadRequest("expected exactly one file".into()));
        }
        let content = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(err.to_string()))?;
        payload = Some(FilePayload {
            fallback_name,
            content,
        });
    }
    payload.ok_or_else(|| AppError::BadRequest("no file supplied".into()))
}

enum SaveFailure {
    /// Traversal or unusable name; nothing was written.
    Rejected,
    /// Another writer holds the path lock.
    Busy,
    Failed,
}

async fn store(
    storage: &Storage,
    locks: &PathLocks,
    filename: &str,
    content: &[u8],
) -> Result<(), SaveFailure> {
    let timeout = Duration::from_secs(LOCK_WAIT_TIMEOUT_SECS);
    let Some(_guard) = locks.acquire(filename, timeout).await else {
        warn!(filename, "timed out waiting for the path lock");
        return Err(SaveFailure::Busy);
    };

    match storage.write(filename, content).await {
        Ok(()) => Ok(()),
        Err(StorageError::Traversal) => {
            warn!(filename, "rejected path outside the upload root");
            Err(SaveFailure::Rejected)
        }
        Err(StorageError::InvalidName) => Err(SaveFailure::Rejected),
        Err(err) => {
            error!(filename, error = ?err, "write failed");
            Err(SaveFailure::Failed)
        }
    }
}
