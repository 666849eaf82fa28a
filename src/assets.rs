//! Static asset delivery and the 404 page.
//!
//! Fallback handler for everything the page routes do not claim. Assets go
//! through the overlay first so an operator directory can replace any
//! compiled-in file; unknown paths render the 404 template.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;
use std::sync::Arc;

use crate::auth::Identity;
use crate::error::AppError;
use crate::overlay::{OverlayRegistry, ResourceKind};
use crate::render::Renderer;

#[derive(RustEmbed)]
#[folder = "assets"]
struct BuiltinAssets;

pub async fn serve_asset(
    Extension(overlay): Extension<Arc<OverlayRegistry>>,
    Extension(renderer): Extension<Arc<Renderer>>,
    Extension(identity): Extension<Identity>,
    req: Request<AxumBody>,
) -> Result<Response, AppError> {
    let path = req.uri().path().trim_start_matches('/');

    if !path.is_empty() {
        if let Some(physical) = overlay.resolve(ResourceKind::Asset, path).await {
            let bytes = tokio::fs::read(&physical)
                .await
                .map_err(|err| AppError::Internal(err.to_string()))?;
            return asset_response(path, bytes);
        }
        if let Some(asset) = BuiltinAssets::get(path) {
            return asset_response(path, asset.data.into_owned());
        }
    }

    renderer
        .page(
            "404.html",
            StatusCode::NOT_FOUND,
            &[("title", "Not Found"), ("user", identity.display_name())],
        )
        .await
        .map_err(Into::into)
}

fn asset_response(path: &str, bytes: Vec<u8>) -> Result<Response, AppError> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| AppError::Internal("invalid mime type".into()))?,
    );
    Ok((headers, AxumBody::from(bytes)).into_response())
}
