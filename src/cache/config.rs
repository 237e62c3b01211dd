//! Cache store configuration.
//!
//! Built once at startup from `[cache]` in `kiln.toml` and handed to
//! [`CacheStore::new`](super::CacheStore::new).

use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "/cache";
pub const DEFAULT_DYNAMIC_EXTENSION: &str = "tpl";

/// Process-wide cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the sharded cache tree. `None` makes every cache
    /// operation fail with `CacheRootNotConfigured`.
    pub root: Option<PathBuf>,
    /// Public URL prefix under which the cache root is served.
    pub base_url: String,
    /// Cache mode. When off, content is recompiled on every call.
    pub enabled: bool,
    /// Minify mode for JS and CSS.
    pub minify: bool,
    /// Permission bits applied to cache files. `None` keeps the host default.
    pub file_mode: Option<u32>,
    /// Permission bits applied to created shard directories.
    pub dir_mode: Option<u32>,
    /// Lowercase extensions rendered as dynamic templates.
    pub dynamic_extensions: Vec<String>,
    /// Directory that `{% include %}` names in dynamic templates resolve
    /// against. `None` disables includes.
    pub include_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            enabled: true,
            minify: false,
            file_mode: None,
            dir_mode: None,
            dynamic_extensions: vec![DEFAULT_DYNAMIC_EXTENSION.to_string()],
            include_dir: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            root: settings.root.clone(),
            base_url: settings.base_url.clone(),
            enabled: settings.enabled,
            minify: settings.minify,
            file_mode: settings.file_mode,
            dir_mode: settings.dir_mode,
            dynamic_extensions: settings.dynamic_extensions.clone(),
            include_dir: None,
        }
    }
}

impl CacheConfig {
    /// Configuration rooted at `root` with every other field defaulted.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Default::default()
        }
    }

    /// The configured root, ignoring an empty path.
    pub fn root(&self) -> Option<&std::path::Path> {
        self.root
            .as_deref()
            .filter(|root| !root.as_os_str().is_empty())
    }
}
