use std::convert::Infallible;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use tower::Service;
use tracing::{debug, error};

use shared::access::routes::canonical_path;

use crate::AppState;
use crate::handlers::utils::*;

// ---------------------------------------------------------------------------
// PageService
// ---------------------------------------------------------------------------

/// Serves the static front end out of `paths.web_dir`.
///
/// Sits behind the edge guard, so anything reaching it has already been let
/// through; it only resolves paths to files. Each page has exactly one URL:
/// non-canonical spellings and direct `.html` names outside `/static/` are
/// not found.
#[derive(Clone, Debug)]
pub struct PageService {
    state: AppState,
}

impl PageService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<B> Service<Request<B>> for PageService
where
    B: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let state = self.state.clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            match serve(&method, &path, &state).await {
                Ok(res) => Ok(res),
                Err(e) => {
                    error!("Failed to serve {} {}: {:#}", method, path, e);
                    Ok(internal_error())
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn serve(
    method: &Method,
    path: &str,
    state: &AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    if *method != Method::GET && *method != Method::HEAD {
        return deliver_error_json(
            "METHOD_NOT_ALLOWED",
            "Only GET and HEAD are served",
            StatusCode::METHOD_NOT_ALLOWED,
        )
        .context("Failed to deliver 405 response");
    }

    if path == "/health" {
        return deliver_serialized_json(&json!({ "status": "ok" }), StatusCode::OK)
            .context("Failed to deliver health response");
    }

    let (web_dir, not_found) = {
        let cfg = state.config.read().await;
        (expand_tilde(&cfg.paths.web_dir), cfg.paths.not_found.clone())
    };

    if canonical_path(path).as_deref() != Some(path) {
        debug!("Refused non-canonical path: {}", path);
        return deliver_not_found(&web_dir, &not_found).await;
    }

    match path {
        "/" => {
            let file = web_dir.join("index.html");
            if is_file(&file).await {
                return deliver_html_page(&file).context("Failed to deliver index page");
            }
        }

        p if p.starts_with("/static/") => {
            let file = web_dir.join(p.trim_start_matches('/'));
            if is_file(&file).await {
                return deliver_page_with_status(&file, StatusCode::OK, CacheStrategy::Yes)
                    .context("Failed to deliver static file");
            }
        }

        p => {
            if let Some(res) = try_page(&web_dir, p).await? {
                return Ok(res);
            }
        }
    }

    deliver_not_found(&web_dir, &not_found).await
}

/// `/a/b` resolves to `a/b.html`, then `a/b/index.html`. Other files whose
/// last segment has an extension are served as-is; `.html` files never are.
async fn try_page(
    web_dir: &Path,
    path: &str,
) -> Result<Option<Response<BoxBody<Bytes, Infallible>>>> {
    let rel = path.trim_matches('/');
    if rel.is_empty() {
        return Ok(None);
    }

    let last = rel.rsplit('/').next().unwrap_or(rel);
    if last.contains('.') {
        let file = web_dir.join(rel);
        if file.extension().is_some_and(|e| e.eq_ignore_ascii_case("html")) {
            debug!("Refused direct page file: {}", path);
            return Ok(None);
        }
        if is_file(&file).await {
            return deliver_page_with_status(&file, StatusCode::OK, CacheStrategy::No)
                .context("Failed to deliver file")
                .map(Some);
        }
        return Ok(None);
    }

    let candidates: [PathBuf; 2] = [
        web_dir.join(format!("{}.html", rel)),
        web_dir.join(rel).join("index.html"),
    ];
    for file in candidates {
        if is_file(&file).await {
            return deliver_html_page(&file)
                .context("Failed to deliver page")
                .map(Some);
        }
    }
    Ok(None)
}

async fn deliver_not_found(
    web_dir: &Path,
    not_found: &str,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let file = web_dir.join(not_found);
    if is_file(&file).await {
        return deliver_page_with_status(&file, StatusCode::NOT_FOUND, CacheStrategy::Explicit)
            .context("Failed to deliver not-found page");
    }
    deliver_error_json("NOT_FOUND", "Page not found", StatusCode::NOT_FOUND)
        .context("Failed to deliver 404 response")
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
