//! Filesystem-backed cache store.
//!
//! Entry lifecycle:
//!
//! ```text
//! Missing ──placeholder──▶ PlaceholderEmpty ──▶ Stale ──regenerate──▶ Fresh
//!                                                 ▲                     │
//!                                                 └──── source mtime ───┘
//! ```
//!
//! Regeneration writes to a temporary file in the shard directory, stamps it
//! with the source mtime and renames it over the entry, all while holding the
//! entry's lock.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use metrics::{counter, histogram};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::compile::{Bindings, Compiler};
use crate::minify::Minifier;

use super::config::CacheConfig;
use super::error::CacheError;
use super::fingerprint::{Fingerprint, FingerprintIndex, canonical_key, extension_of};
use super::freshness::EntryState;
use super::lock::{KeyedLocks, mutex_lock};
use super::url::UrlMapper;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_HIT_TOTAL: &str = "kiln_cache_hit_total";
const METRIC_CACHE_REGENERATE_TOTAL: &str = "kiln_cache_regenerate_total";
const METRIC_CACHE_PLACEHOLDER_TOTAL: &str = "kiln_cache_placeholder_total";
const METRIC_CACHE_CLEAR_TOTAL: &str = "kiln_cache_clear_total";
const METRIC_CACHE_REGENERATE_MS: &str = "kiln_cache_regenerate_ms";

/// Per-request inputs: the active locale and the template bindings.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub locale: Option<String>,
    pub bindings: Bindings,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Locale mixed into the fingerprint; empty when none is active.
    pub fn locale_tag(&self) -> &str {
        self.locale.as_deref().unwrap_or_default()
    }
}

/// Content cache keyed by source path and locale.
///
/// Construct once per process and share it (usually behind an `Arc`).
#[derive(Debug)]
pub struct CacheStore {
    config: CacheConfig,
    compiler: Compiler,
    minifier: Minifier,
    urls: UrlMapper,
    locks: KeyedLocks,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        let mut compiler = Compiler::new(&config.dynamic_extensions);
        if let Some(dir) = config.include_dir.as_deref() {
            compiler = compiler.with_include_dir(dir);
        }
        let urls = UrlMapper::new(config.base_url.clone());
        Self {
            config,
            compiler,
            minifier: Minifier::new(),
            urls,
            locks: KeyedLocks::new(),
        }
    }

    /// Replace the built-in JS/CSS minifiers.
    pub fn with_minifier(mut self, minifier: Minifier) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Resolve the cache entry for `source` without touching the cache tree.
    pub fn resolve(&self, source: &Path, ctx: &RenderContext) -> Result<Fingerprint, CacheError> {
        let source = canonicalize_source(source)?;
        let index = self.index()?;
        Ok(index.resolve(&canonical_key(&source), ctx.locale_tag()))
    }

    /// Content for `source`.
    ///
    /// With cache mode on this reads the up-to-date cache file. With cache
    /// mode off the source is compiled (and minified, if enabled) on every
    /// call and the cache tree is not touched.
    #[instrument(level = "debug", skip_all, fields(source = %source.display()))]
    pub fn get_content(&self, source: &Path, ctx: &RenderContext) -> Result<Vec<u8>, CacheError> {
        let source = canonicalize_source(source)?;
        self.index()?;

        if !self.config.enabled {
            return self.render_canonical(&source, ctx);
        }

        let path = self.materialize(&source, ctx)?;
        fs::read(&path).map_err(|err| CacheError::filesystem("read cache file", &path, err))
    }

    /// Path of the up-to-date cache file for `source`.
    ///
    /// The entry is materialised on disk even when cache mode is off, since
    /// URLs always point into the cache tree.
    #[instrument(level = "debug", skip_all, fields(source = %source.display()))]
    pub fn get_cache_file_path(
        &self,
        source: &Path,
        ctx: &RenderContext,
    ) -> Result<PathBuf, CacheError> {
        let source = canonicalize_source(source)?;
        self.index()?;
        self.materialize(&source, ctx)
    }

    /// Public URL of the cache file for `source`.
    pub fn get_file_url(&self, source: &Path, ctx: &RenderContext) -> Result<String, CacheError> {
        let path = self.get_cache_file_path(source, ctx)?;
        Ok(self.urls.url_for(&path, source))
    }

    /// Remove the whole cache tree.
    pub fn clear_cache(&self) -> Result<(), CacheError> {
        let index = self.index()?;
        let root = index.root();

        match fs::remove_dir_all(root) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(
                    target = "kiln::cache",
                    op = "clear",
                    root = %root.display(),
                    result = "already_empty",
                    "Cache root does not exist"
                );
            }
            Err(err) => return Err(CacheError::filesystem("remove cache root", root, err)),
        }

        // Lock slots outlive the tree so a request still holding one keeps
        // excluding later writers for the same entry.
        counter!(METRIC_CACHE_CLEAR_TOTAL).increment(1);
        info!(
            target = "kiln::cache",
            op = "clear",
            root = %root.display(),
            lock_slots = self.locks.len(),
            "Cache cleared"
        );
        Ok(())
    }

    /// Compile `source` without minifying or caching it.
    pub fn compile(&self, source: &Path, ctx: &RenderContext) -> Result<Vec<u8>, CacheError> {
        let source = canonicalize_source(source)?;
        Ok(self.compiler.compile(&source, &ctx.bindings)?)
    }

    fn index(&self) -> Result<FingerprintIndex, CacheError> {
        self.config
            .root()
            .map(FingerprintIndex::new)
            .ok_or(CacheError::CacheRootNotConfigured)
    }

    /// Compile, then minify when minify mode is on.
    fn render_canonical(&self, source: &Path, ctx: &RenderContext) -> Result<Vec<u8>, CacheError> {
        let content = self.compiler.compile(source, &ctx.bindings)?;
        if self.config.minify {
            Ok(self.minifier.minify(&extension_of(source), content))
        } else {
            Ok(content)
        }
    }

    /// Bring the entry for a canonical `source` up to date and return its path.
    fn materialize(&self, source: &Path, ctx: &RenderContext) -> Result<PathBuf, CacheError> {
        let index = self.index()?;
        let entry = index.resolve(&canonical_key(source), ctx.locale_tag());

        let slot = self.locks.slot(entry.digest());
        let _guard = mutex_lock(&slot, SOURCE, "materialize");

        let source_modified = modified_time(source)
            .map_err(|err| not_found_or(err, source, "read source metadata"))?;

        self.ensure_shard_dir(&entry)?;
        let created = self.ensure_placeholder(&entry)?;

        let metadata = fs::metadata(entry.path())
            .map_err(|err| CacheError::filesystem("read cache file metadata", entry.path(), err))?;
        let cache_modified = metadata
            .modified()
            .map_err(|err| CacheError::filesystem("read cache file mtime", entry.path(), err))?;

        let state = if created {
            EntryState::Missing
        } else {
            EntryState::classify(source_modified, Some((cache_modified, metadata.len())))
        };

        if state.is_fresh() {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            debug!(
                target = "kiln::cache",
                op = "materialize",
                fingerprint = entry.digest(),
                result = "hit",
                "Cache entry is fresh"
            );
        } else {
            let started_at = Instant::now();
            let content = self.render_canonical(source, ctx)?;
            self.write_entry(&entry, &content, source_modified)?;

            counter!(METRIC_CACHE_REGENERATE_TOTAL).increment(1);
            histogram!(METRIC_CACHE_REGENERATE_MS)
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            info!(
                target = "kiln::cache",
                op = "materialize",
                fingerprint = entry.digest(),
                source = %source.display(),
                state = state.as_str(),
                bytes = content.len(),
                minified = self.config.minify,
                result = "regenerated",
                "Cache entry regenerated"
            );
        }

        fs::canonicalize(entry.path())
            .map_err(|err| CacheError::filesystem("canonicalize cache file", entry.path(), err))
    }

    fn ensure_shard_dir(&self, entry: &Fingerprint) -> Result<(), CacheError> {
        let dir = entry.shard_dir();
        if dir.is_dir() {
            return Ok(());
        }

        match fs::create_dir_all(dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(err) => return Err(CacheError::filesystem("create shard directory", dir, err)),
        }

        apply_mode(dir, self.config.dir_mode)
            .map_err(|err| CacheError::filesystem("set shard directory permissions", dir, err))
    }

    /// Create an empty entry file when none exists. Returns whether one was created.
    fn ensure_placeholder(&self, entry: &Fingerprint) -> Result<bool, CacheError> {
        let path = entry.path();
        if path.exists() {
            return Ok(false);
        }

        // No truncation: a concurrent writer in another process may already
        // have renamed real content into place.
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| CacheError::filesystem("create placeholder", path, err))?;
        apply_mode(path, self.config.file_mode)
            .map_err(|err| CacheError::filesystem("set cache file permissions", path, err))?;

        counter!(METRIC_CACHE_PLACEHOLDER_TOTAL).increment(1);
        debug!(
            target = "kiln::cache",
            op = "placeholder",
            fingerprint = entry.digest(),
            "Created cache placeholder"
        );
        Ok(true)
    }

    /// Atomically replace the entry with `content` stamped with `modified`.
    fn write_entry(
        &self,
        entry: &Fingerprint,
        content: &[u8],
        modified: SystemTime,
    ) -> Result<(), CacheError> {
        let dir = entry.shard_dir();
        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|err| CacheError::filesystem("create temporary cache file", dir, err))?;

        temp.write_all(content)
            .and_then(|()| temp.flush())
            .map_err(|err| CacheError::filesystem("write cache file", temp.path(), err))?;

        // mtime goes on last so an interrupted write is never mistaken for fresh.
        temp.as_file()
            .set_modified(modified)
            .map_err(|err| CacheError::filesystem("sync cache file mtime", temp.path(), err))?;

        match self.config.file_mode {
            Some(mode) => apply_mode(temp.path(), Some(mode)),
            None => fs::metadata(entry.path())
                .and_then(|existing| fs::set_permissions(temp.path(), existing.permissions())),
        }
        .map_err(|err| CacheError::filesystem("set cache file permissions", temp.path(), err))?;

        temp.persist(entry.path())
            .map_err(|err| CacheError::filesystem("replace cache file", entry.path(), err.error))?;
        Ok(())
    }
}

fn canonicalize_source(source: &Path) -> Result<PathBuf, CacheError> {
    let canonical =
        fs::canonicalize(source).map_err(|err| not_found_or(err, source, "resolve source path"))?;
    if canonical.is_file() {
        Ok(canonical)
    } else {
        Err(CacheError::source_not_found(source))
    }
}

fn modified_time(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn not_found_or(err: io::Error, source: &Path, op: &'static str) -> CacheError {
    if err.kind() == io::ErrorKind::NotFound {
        CacheError::source_not_found(source)
    } else {
        CacheError::filesystem(op, source, err)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}
