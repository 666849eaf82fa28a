//! HTML page rendering.
//!
//! Templates are plain HTML with `{{name}}` tags (escaped) and `{{{name}}}`
//! tags (raw, for pre-built markup). Lookup goes through the overlay
//! registry first so operator directories can replace individual pages; the
//! compiled-in defaults below back every name that no layer overrides.
//! Deliberately small — the interesting part is where templates come from,
//! not the substitution.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use rust_embed::RustEmbed;
use std::io;
use std::sync::Arc;

use crate::config::SiteConfig;
use crate::overlay::{OverlayRegistry, ResourceKind};

#[derive(RustEmbed)]
#[folder = "templates"]
struct BuiltinTemplates;

#[derive(Debug)]
pub enum RenderError {
    MissingTemplate(String),
    Io(io::Error),
}

pub struct Renderer {
    overlay: Arc<OverlayRegistry>,
    globals: Vec<(String, String)>,
}

impl Renderer {
    pub fn new(overlay: Arc<OverlayRegistry>, site: &SiteConfig) -> Self {
        let globals = vec![
            ("basePath".to_string(), site.base_path.clone()),
            ("signInUrl".to_string(), site.sign_in_url.clone()),
            ("signOutUrl".to_string(), site.sign_out_url.clone()),
        ];
        Self { overlay, globals }
    }

    /// Renders a template into a complete HTML response.
    pub async fn page(
        &self,
        name: &str,
        status: StatusCode,
        vars: &[(&str, &str)],
    ) -> Result<Response, RenderError> {
        let template = self.load(name).await?;
        let body = expand(&template, |key| {
            vars.iter()
                .find(|(var, _)| *var == key)
                .map(|(_, value)| *value)
                .or_else(|| {
                    self.globals
                        .iter()
                        .find(|(var, _)| var == key)
                        .map(|(_, value)| value.as_str())
                })
        });
        Ok((status, Html(body)).into_response())
    }

    async fn load(&self, name: &str) -> Result<String, RenderError> {
        if let Some(path) = self.overlay.resolve(ResourceKind::Template, name).await {
            return tokio::fs::read_to_string(&path)
                .await
                .map_err(RenderError::Io);
        }
        match BuiltinTemplates::get(name) {
            Some(asset) => Ok(String::from_utf8_lossy(&asset.data).into_owned()),
            None => Err(RenderError::MissingTemplate(name.to_string())),
        }
    }
}

/// Replaces `{{key}}` (escaped) and `{{{key}}}` (raw) tags; unknown keys
/// expand to nothing, unterminated tags are left as-is.
fn expand<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let raw = after.starts_with('{');
        let (body, close) = if raw {
            (&after[1..], "}}}")
        } else {
            (after, "}}")
        };
        match body.find(close) {
            Some(end) => {
                let key = body[..end].trim();
                if let Some(value) = lookup(key) {
                    if raw {
                        out.push_str(value);
                    } else {
                        out.push_str(&escape_html(value));
                    }
                }
                rest = &body[end + close.len()..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{RenderError, Renderer, expand};
    use crate::config::SiteConfig;
    use crate::overlay::{OverlayRegistry, ResourceKind};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn site() -> SiteConfig {
        SiteConfig {
            base_path: String::new(),
            sign_in_url: "/user/signin".to_string(),
            sign_out_url: "/user/signout".to_string(),
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

    #[test]
    fn expand_escapes_double_stache_and_keeps_triple_raw() {
        let vars = [("name", "<b>&amp;</b>"), ("rows", "<li>x</li>")];
        let lookup = |key: &str| {
            vars.iter()
                .find(|(var, _)| *var == key)
                .map(|(_, value)| *value)
        };
        let out = expand("{{name}}|{{{rows}}}|{{missing}}|{{broken", lookup);
        assert_eq!(out, "&lt;b&gt;&amp;amp;&lt;/b&gt;|<li>x</li>||{{broken");
    }

    #[tokio::test]
    async fn builtin_templates_back_every_page() {
        let renderer = Renderer::new(Arc::new(OverlayRegistry::new()), &site());
        for name in ["list.html", "upload.html", "404.html"] {
            let response = renderer
                .page(name, StatusCode::OK, &[("title", "T")])
                .await
                .unwrap_or_else(|_| panic!("render {name}"));
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn overlay_template_replaces_builtin() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("list.html"), "custom {{title}}").expect("write");

        let mut registry = OverlayRegistry::new();
        registry.register(ResourceKind::Template, dir.path());
        let renderer = Renderer::new(Arc::new(registry), &site());

        let response = renderer
            .page("list.html", StatusCode::OK, &[("title", "Files")])
            .await
            .expect("render");
        assert_eq!(body_of(response).await, "custom Files");
    }

    #[tokio::test]
    async fn globals_reach_the_template() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("nav.html"), "<a href=\"{{signOutUrl}}\">out</a>")
            .expect("write");

        let mut registry = OverlayRegistry::new();
        registry.register(ResourceKind::Template, dir.path());
        let renderer = Renderer::new(Arc::new(registry), &site());

        let response = renderer
            .page("nav.html", StatusCode::OK, &[])
            .await
            .expect("render");
        assert_eq!(body_of(response).await, "<a href=\"/user/signout\">out</a>");
    }

    #[tokio::test]
    async fn unknown_template_is_an_error() {
        let renderer = Renderer::new(Arc::new(OverlayRegistry::new()), &site());
        let result = renderer.page("nope.html", StatusCode::OK, &[]).await;
        assert!(matches!(result, Err(RenderError::MissingTemplate(_))));
    }
}
