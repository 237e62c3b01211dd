//! HTTP serving of materialised cache files.
//!
//! URLs produced by the store look like `{base_url}/{shard}/{file}?{name}`.
//! The router mounts the path part of `base_url` and streams the file from
//! the cache root. The query string only busts browser caches, so responses
//! are marked immutable.

use std::{io, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use mime_guess::Mime;
use tracing::{debug, error};
use url::Url;

use crate::application::error::ErrorReport;
use crate::cache::{CacheError, CacheStore};

const SOURCE: &str = "infra::http::serve_cached";

/// Shared state for the cache file router.
#[derive(Debug, Clone)]
pub struct HttpState {
    root: Arc<PathBuf>,
    mount: Arc<str>,
}

impl HttpState {
    /// Capture the cache root and mount point of `store`.
    pub fn from_store(store: &CacheStore) -> Result<Self, CacheError> {
        let config = store.config();
        let root = config.root().ok_or(CacheError::CacheRootNotConfigured)?;
        Ok(Self {
            root: Arc::new(root.to_path_buf()),
            mount: mount_path(&config.base_url).into(),
        })
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }
}

/// Router serving `GET {mount}/{shard}/{file}`.
pub fn build_router(state: HttpState) -> Router {
    let route = format!("{}/{{shard}}/{{file}}", state.mount);
    Router::new()
        .route(&route, get(serve_cached))
        .with_state(state)
}

/// Serve one cache file.
pub async fn serve_cached(
    State(state): State<HttpState>,
    Path((shard, file)): Path<(String, String)>,
) -> Response {
    if !is_shard(&shard) || !is_file_name(&file) {
        return not_found_response("Cache file request rejected");
    }

    let path = state.root.join(&shard).join(&file);
    match tokio::fs::read(&path).await {
        // A zero-length file is a placeholder that has not been filled yet.
        Ok(bytes) if bytes.is_empty() => not_found_response("Cache entry not materialised"),
        Ok(bytes) => {
            debug!(
                target = "kiln::http",
                op = "serve",
                path = %path.display(),
                bytes = bytes.len(),
                "Serving cache file"
            );
            build_response(Bytes::from(bytes), mime_guess::from_path(&file).first_or_octet_stream())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            not_found_response("Cache file not found")
        }
        Err(err) => {
            error!(
                target = "kiln::http",
                op = "serve",
                path = %path.display(),
                error = %err,
                "Failed to read cache file"
            );
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let mut response = status.into_response();
            ErrorReport::from_error(SOURCE, status, &err).attach(&mut response);
            response
        }
    }
}

/// Path component of `base_url`, without a trailing slash.
fn mount_path(base_url: &str) -> String {
    let path = match Url::parse(base_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => base_url.to_string(),
    };
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn is_shard(segment: &str) -> bool {
    segment.len() == 2
        && segment
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn is_file_name(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains("..")
        && !segment.contains('/')
        && !segment.contains('\\')
}

fn not_found_response(message: &'static str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, message).attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
