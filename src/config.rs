//! CLI arguments, environment configuration and process constants.

use clap::Parser;
use shadow_rs::formatcp;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const AUTH_COOKIE_NAME: &str = "filedeck_session";
pub const MIN_SECRET_LEN: usize = 8;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 60 * 60;
pub const TEMP_SWEEP_INTERVAL_SECS: u64 = 900;
pub const LOCK_WAIT_TIMEOUT_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(
    name = "filedeck",
    version = VERSION_INFO,
    about = "Web editor for text files under one upload directory"
)]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "FILEDECK_DIR",
        help = "Directory the uploaded files live in (created if missing)"
    )]
    pub dir: PathBuf,
    #[arg(
        long,
        env = "FILEDECK_SECRET",
        help = "HS256 secret the session tokens are signed with (min 8 chars)"
    )]
    pub secret: String,
    #[arg(
        long,
        env = "FILEDECK_SIGN_IN_URL",
        help = "Where anonymous users are sent to sign in"
    )]
    pub sign_in_url: String,
    #[arg(
        long,
        env = "FILEDECK_SIGN_OUT_URL",
        default_value = "/user/signout",
        help = "Sign-out link shown in page headers"
    )]
    pub sign_out_url: String,
    #[arg(
        long,
        env = "FILEDECK_BASE_PATH",
        default_value = "",
        help = "Path prefix the pages are mounted under, e.g. /files"
    )]
    pub base_path: String,
    #[arg(
        short = 'b',
        long,
        env = "FILEDECK_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILEDECK_PORT",
        default_value_t = 9005,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "FILEDECK_TEMPLATE_DIRS",
        help = "Colon separated template override directories, later entries win"
    )]
    pub template_dirs: Option<String>,
    #[arg(
        long,
        env = "FILEDECK_ASSET_DIRS",
        help = "Colon separated static asset override directories, later entries win"
    )]
    pub asset_dirs: Option<String>,
    #[arg(
        long,
        env = "FILEDECK_AUTH_DISABLED",
        default_value_t = false,
        help = "Treat every request as a signed-in admin (development only)"
    )]
    pub auth_disabled: bool,
    #[arg(
        long,
        env = "FILEDECK_MAX_UPLOAD_BYTES",
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        help = "Largest accepted upload body in bytes"
    )]
    pub max_upload_bytes: usize,
    #[arg(
        long,
        env = "FILEDECK_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Age after which abandoned temp files are swept (0 to disable)"
    )]
    pub temp_ttl_secs: u64,
}

/// Runtime site settings shared by URL construction and templates.
#[derive(Clone, Debug)]
pub struct SiteConfig {
    pub base_path: String,
    pub sign_in_url: String,
    pub sign_out_url: String,
}

/// Splits a colon separated directory list, dropping empty entries.
pub fn split_dirs(value: Option<&str>) -> Vec<PathBuf> {
    value
        .unwrap_or_default()
        .split(':')
        .filter(|entry| !entry.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}
