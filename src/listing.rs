//! The file index page.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Response;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::{Identity, Permission, require};
use crate::config::SiteConfig;
use crate::error::AppError;
use crate::http::upload_url;
use crate::render::{Renderer, escape_html};
use crate::storage::{FileEntry, Storage};

/// Lists every file under the upload root with a link to its editor page.
/// Fails closed: a broken walk is a 500, never an empty listing.
pub async fn list_page(
    Extension(identity): Extension<Identity>,
    Extension(site): Extension<Arc<SiteConfig>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(renderer): Extension<Arc<Renderer>>,
) -> Result<Response, AppError> {
    require(&identity, Permission::SignedIn, &site.sign_in_url)?;

    let entries = storage.list_files().await.map_err(|err| {
        error!(error = ?err, "could not list upload directory");
        AppError::Internal("could not list the upload directory".into())
    })?;
    info!(count = entries.len(), "listed files");

    let rows = render_rows(&site.base_path, &entries);
    renderer
        .page(
            "list.html",
            StatusCode::OK,
            &[
                ("title", "Files"),
                ("user", identity.display_name()),
                ("rows", &rows),
            ],
        )
        .await
        .map_err(Into::into)
}

fn render_rows(base_path: &str, entries: &[FileEntry]) -> String {
    if entries.is_empty() {
        return r#"<li class="empty">No files uploaded yet.</li>"#.to_string();
    }
    let mut rows = String::new();
    for entry in entries {
        let meta = match &entry.modified {
            Some(modified) => format!("{} bytes, {modified}", entry.size),
            None => format!("{} bytes", entry.size),
        };
        rows.push_str(&format!(
            "<li><a href=\"{}\">{}</a> <span class=\"meta\">{}</span></li>\n",
            escape_html(&upload_url(base_path, &entry.path)),
            escape_html(&entry.path),
            escape_html(&meta),
        ));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::list_page;
    use crate::auth::Identity;
    use crate::config::SiteConfig;
    use crate::error::AppError;
    use crate::overlay::OverlayRegistry;
    use crate::render::Renderer;
    use crate::storage::Storage;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn fixture() -> (
        tempfile::TempDir,
        Arc<Storage>,
        Arc<SiteConfig>,
        Arc<Renderer>,
    ) {
        let temp = tempdir().expect("tempdir");
        let storage = Arc::new(
            Storage::open(temp.path().join("root"))
                .await
                .expect("open storage"),
        );
        let site = Arc::new(SiteConfig {
            base_path: String::new(),
            sign_in_url: "/user/signin".to_string(),
            sign_out_url: "/user/signout".to_string(),
        });
        let renderer = Arc::new(Renderer::new(Arc::new(OverlayRegistry::new()), &site));
        (temp, storage, site, renderer)
    }

    fn signed_in() -> Identity {
        let Value::Object(claims) = json!({"sub": "ines"}) else {
            unreachable!()
        };
        Identity {
            signed_in: true,
            claims,
        }
    }

    async fn body_of(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn lists_files_with_editor_links() {
        let (_temp, storage, site, renderer) = fixture().await;
        storage.write("notes.txt", b"hi").await.expect("write");
        storage.write("a dir/plan.txt", b"p").await.expect("write");

        let response = list_page(
            Extension(signed_in()),
            Extension(site),
            Extension(storage),
            Extension(renderer),
        )
        .await
        .expect("list page");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_of(response).await;
        assert!(body.contains("notes.txt"));
        assert!(body.contains("/upload?filename=notes.txt"));
        assert!(body.contains("/upload?filename=a%20dir%2Fplan.txt"));
    }

    #[tokio::test]
    async fn anonymous_request_reveals_no_names() {
        let (_temp, storage, site, renderer) = fixture().await;
        storage.write("secret.txt", b"s").await.expect("write");

        let result = list_page(
            Extension(Identity::anonymous()),
            Extension(site),
            Extension(storage),
            Extension(renderer),
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn broken_listing_is_a_server_error() {
        let (_temp, storage, site, renderer) = fixture().await;
        tokio::fs::remove_dir_all(storage.root_path())
            .await
            .expect("remove root");

        let result = list_page(
            Extension(signed_in()),
            Extension(site),
            Extension(storage),
            Extension(renderer),
        )
        .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
