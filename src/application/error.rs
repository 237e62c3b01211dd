use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{cache::CacheError, infra::error::InfraError};

/// Diagnostic chain attached to HTTP responses as an extension.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let err = CacheError::Filesystem {
            op: "read cache file",
            path: "/var/cache/kiln/ab/cd.css".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &err);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "denied");
    }

    #[test]
    fn cache_errors_stay_transparent() {
        let err = AppError::from(CacheError::CacheRootNotConfigured);
        assert_eq!(err.to_string(), "cache root is not configured");
    }

    #[test]
    fn configuration_failures_surface_as_infra_errors() {
        let err = AppError::from(InfraError::configuration("cache.file_mode: not octal"));
        assert!(matches!(err, AppError::Infra(InfraError::Configuration { .. })));
        assert_eq!(err.to_string(), "configuration error: cache.file_mode: not octal");
    }
}
