use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::compile::CompileError;

/// Failures surfaced by [`CacheStore`](super::CacheStore) operations.
///
/// Every variant is fatal for the request that triggered it. Nothing in the
/// cache layer retries.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache root is not configured")]
    CacheRootNotConfigured,
    #[error("source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("failed to {op} `{}`", path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    pub(crate) fn filesystem(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn source_not_found(path: impl AsRef<Path>) -> Self {
        Self::SourceNotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Whether the failure was caused by a missing source file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_error_names_operation_and_path() {
        let err = CacheError::filesystem(
            "create shard directory",
            "/var/cache/kiln/ab",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("create shard directory"));
        assert!(message.contains("/var/cache/kiln/ab"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn source_not_found_is_flagged() {
        let err = CacheError::source_not_found("/srv/app/missing.css");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("missing.css"));
        assert!(!CacheError::CacheRootNotConfigured.is_not_found());
    }
}
