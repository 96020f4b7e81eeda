//! Static file handler.
//!
//! Serves `<root>/<file>.<extension>` for single-component paths. `/` maps to
//! the index file and a missing extension falls back to the default one.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};

use super::handler::Handler;
use super::request::HandlerRequest;
use super::response::Response;
use crate::config::StaticFilesConfig;
use crate::routing::{Pattern, RouteBinding, RouteError, Router};

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index: String,
    default_extension: String,
    exclude_extensions: Vec<String>,
}

impl StaticFiles {
    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self {
            root: config.root.clone(),
            index: config.index.clone(),
            default_extension: config.default_extension.clone(),
            exclude_extensions: config
                .exclude_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Register `/` and `/<file>[extension]` as cacheable GET routes.
    pub fn register(self, router: &Router) -> Result<(), RouteError> {
        let handler: Arc<dyn Handler> = Arc::new(self);

        router.register(
            RouteBinding::from_pattern(Pattern::compile("/")?, Arc::clone(&handler))
                .with_method(Method::GET)
                .with_name("static-index")
                .with_cacheable(true),
        )?;
        router.register(
            RouteBinding::from_pattern(Pattern::compile("<file>[extension]")?, handler)
                .with_method(Method::GET)
                .with_name("static-files")
                .with_cacheable(true),
        )?;
        Ok(())
    }

    fn is_excluded(&self, extension: &str) -> bool {
        self.exclude_extensions
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(extension))
    }
}

#[async_trait]
impl Handler for StaticFiles {
    async fn handle(&self, request: HandlerRequest) -> anyhow::Result<Response> {
        let file = request.param("file").unwrap_or(self.index.as_str());
        let extension = request.param("extension").unwrap_or(self.default_extension.as_str());

        if file.starts_with('.')
            || file.contains("..")
            || file.contains('\\')
            || self.is_excluded(extension)
        {
            return Ok(Response::not_found());
        }

        let path = self.root.join(format!("{file}.{extension}"));
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Response::new(StatusCode::OK, contents)
                .with_content_type(content_type_for(extension))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Response::not_found()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("reading {}", path.display()))),
        }
    }
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(root: PathBuf) -> StaticFiles {
        StaticFiles::from_config(&StaticFilesConfig {
            enabled: true,
            root,
            index: "index".into(),
            default_extension: "html".into(),
            exclude_extensions: vec!["txt".into()],
        })
    }

    async fn get(router: &Router, path: &str) -> Response {
        let matched = router.resolve(&Method::GET, path).unwrap();
        let request = HandlerRequest::new(Method::GET, path).with_params(matched.params);
        matched.binding.handler().handle(request).await.unwrap()
    }

    #[tokio::test]
    async fn serves_index_and_named_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("app.css"), "body {}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "secret").unwrap();

        let router = Router::new();
        files(dir.path().to_path_buf()).register(&router).unwrap();

        let index = get(&router, "/").await;
        assert_eq!(index.body().as_ref(), b"<h1>home</h1>");
        assert_eq!(index.content_type(), Some("text/html; charset=utf-8"));

        assert_eq!(get(&router, "/index").await.body().as_ref(), b"<h1>home</h1>");
        assert_eq!(get(&router, "/app.css").await.content_type(), Some("text/css; charset=utf-8"));

        assert_eq!(get(&router, "/notes.txt").await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(get(&router, "/missing.html").await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_get_is_routed() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new();
        files(dir.path().to_path_buf()).register(&router).unwrap();

        assert!(router.resolve(&Method::POST, "/index").is_none());
        assert!(router.resolve(&Method::HEAD, "/index").is_some());
        // Nested paths are outside the single-component pattern.
        assert!(router.resolve(&Method::GET, "/a/b.html").is_none());
    }
}
