//! Kiln content cache
//!
//! Maps source files to content-addressed copies under a cache root:
//!
//! - **Fingerprint**: digest of canonical source path plus locale, sharded
//!   into `{root}/{xx}/{rest}.{ext}`
//! - **Freshness**: an entry is current iff its mtime equals the source mtime
//!   and it is non-empty
//! - **Store**: materialises entries under a per-entry lock and serves their
//!   content and public URLs
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! root = "/var/cache/kiln"
//! base_url = "/cache"
//! enabled = true
//! minify = false
//! ```

mod config;
mod error;
pub mod fingerprint;
pub mod freshness;
mod lock;
mod store;
mod url;

pub use config::{CacheConfig, DEFAULT_BASE_URL, DEFAULT_DYNAMIC_EXTENSION};
pub use error::CacheError;
pub use fingerprint::{Fingerprint, FingerprintIndex};
pub use freshness::EntryState;
pub use store::{CacheStore, RenderContext};
pub use url::UrlMapper;
