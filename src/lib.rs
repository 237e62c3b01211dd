//! Kiln: a content-addressed asset cache.
//!
//! Source files are compiled (dynamic templates rendered through minijinja),
//! optionally minified, and stored under a sharded cache root keyed by source
//! path and locale. Entries are regenerated whenever the source mtime differs
//! from the entry's mtime.

pub mod application;
pub mod cache;
pub mod compile;
pub mod config;
pub mod infra;
pub mod minify;
pub mod template;
