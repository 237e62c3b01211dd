//! Cache entry identity and on-disk layout.
//!
//! An entry is addressed by a digest of the canonical source path plus the
//! active locale tag. The digest is split into a two-character shard
//! directory and a file stem:
//!
//! ```text
//! {root}/{digest[..2]}/{digest[2..]}.{ext}
//! ```

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Extension used when the source file has none.
pub const FALLBACK_EXTENSION: &str = "cache";

// 20 bytes keeps the 2 + 38 hex layout external warmers rely on.
const DIGEST_BYTES: usize = 20;
const SHARD_LEN: usize = 2;

/// Resolved identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    digest: String,
    extension: String,
    path: PathBuf,
}

impl Fingerprint {
    /// Full hex digest (40 characters).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// First two hex characters of the digest.
    pub fn shard(&self) -> &str {
        &self.digest[..SHARD_LEN]
    }

    /// Remaining hex characters of the digest.
    pub fn stem(&self) -> &str {
        &self.digest[SHARD_LEN..]
    }

    /// Lowercase extension of the cache file, without a leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `{stem}.{extension}`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.extension)
    }

    /// Absolute location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the cache file.
    pub fn shard_dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

/// Maps canonical source paths onto the sharded cache layout under a root.
#[derive(Debug, Clone)]
pub struct FingerprintIndex {
    root: PathBuf,
}

impl FingerprintIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the cache entry for `source` under `locale`.
    ///
    /// `source` must already be canonical (absolute, `/` separators). An
    /// empty `locale` means no locale is active. The result is a pure
    /// function of the inputs.
    pub fn resolve(&self, source: &str, locale: &str) -> Fingerprint {
        let digest = digest_hex(source, locale);
        let extension = extension_of(source);
        let path = self
            .root
            .join(&digest[..SHARD_LEN])
            .join(format!("{}.{}", &digest[SHARD_LEN..], extension));

        Fingerprint {
            digest,
            extension,
            path,
        }
    }
}

/// Hex digest over `source` immediately followed by `locale`.
pub fn digest_hex(source: &str, locale: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(locale.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..DIGEST_BYTES])
}

/// Lowercase extension of `source`, or [`FALLBACK_EXTENSION`] when it has none.
pub fn extension_of(source: impl AsRef<Path>) -> String {
    source
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Render `path` with `/` separators so digests agree across platforms.
pub fn canonical_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
