//! filedeck server binary.
//!
//! Lists, shows and overwrites text files under one upload directory
//! through a small set of HTML pages, gated by the claims carried in a
//! signed session token. Startup composes the template/asset overlay,
//! opens the upload root, builds the Axum router and serves until SIGINT
//! or SIGTERM.

mod assets;
mod atomic;
mod auth;
mod background;
mod config;
mod error;
mod http;
mod listing;
mod locking;
mod logging;
mod overlay;
mod render;
mod storage;
mod upload;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::get;
use axum::{Router, middleware};
use clap::Parser;
use shadow_rs::shadow;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::auth::AuthConfig;
use crate::background::spawn_background_tasks;
use crate::config::{Args, MIN_SECRET_LEN, SiteConfig};
use crate::locking::PathLocks;
use crate::overlay::{OverlayRegistry, ResourceKind};
use crate::render::Renderer;
use crate::storage::Storage;

shadow!(build);

#[tokio::main]
async fn main() -> Result<(), io::Error> {
    logging::init_logging();

    let args = Args::parse();
    if args.secret.len() < MIN_SECRET_LEN {
        return Err(invalid_input(format!(
            "the signing secret must be at least {MIN_SECRET_LEN} characters"
        )));
    }
    let base_path = normalize_base_path(&args.base_path)?;

    let storage = Arc::new(Storage::open(&args.dir).await?);
    info!(root = %storage.root_path().display(), "upload root ready");

    let mut registry = OverlayRegistry::new();
    for dir in config::split_dirs(args.template_dirs.as_deref()) {
        registry.register(ResourceKind::Template, dir);
    }
    for dir in config::split_dirs(args.asset_dirs.as_deref()) {
        registry.register(ResourceKind::Asset, dir);
    }
    info!(
        template_layers = registry.layer_count(ResourceKind::Template),
        asset_layers = registry.layer_count(ResourceKind::Asset),
        "overlay composed"
    );
    let registry = Arc::new(registry);

    let site = Arc::new(SiteConfig {
        base_path: base_path.clone(),
        sign_in_url: args.sign_in_url.clone(),
        sign_out_url: args.sign_out_url.clone(),
    });
    let renderer = Arc::new(Renderer::new(registry.clone(), &site));
    let auth_config = Arc::new(AuthConfig::new(args.secret.as_bytes(), args.auth_disabled));
    let locks = Arc::new(PathLocks::new());

    let pages = Router::new()
        .route("/", get(listing::list_page))
        .route("/upload", get(upload::edit_page).post(upload::save_file));
    let routed = if base_path.is_empty() {
        pages
    } else {
        Router::new().nest(&base_path, pages)
    };

    let app = routed
        .fallback(assets::serve_asset)
        .layer(middleware::from_fn(auth::attach_identity))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(DefaultBodyLimit::max(args.max_upload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage.clone()))
        .layer(Extension(registry))
        .layer(Extension(renderer))
        .layer(Extension(auth_config))
        .layer(Extension(site))
        .layer(Extension(locks));

    spawn_background_tasks(storage, Duration::from_secs(args.temp_ttl_secs));

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| invalid_input(err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}{base_path}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

fn invalid_input(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.into())
}

/// Empty, or `/prefix` without a trailing slash.
fn normalize_base_path(raw: &str) -> Result<String, io::Error> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.starts_with('/') {
        return Err(invalid_input("the base path must start with /"));
    }
    Ok(trimmed.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
}
