use std::path::Path;

use url::form_urlencoded::byte_serialize;

/// Builds public URLs for cache files.
///
/// The URL keeps the last two path segments of the cache file (shard and
/// file name) and appends the encoded basename of the original source as the
/// query string. The query is only a human-readable marker; freshness never
/// depends on it.
#[derive(Debug, Clone)]
pub struct UrlMapper {
    base_url: String,
}

impl UrlMapper {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim_end_matches('/').to_string();
        Self { base_url: trimmed }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/{shard}/{file}?{basename of source}`
    pub fn url_for(&self, cache_file: &Path, source: &Path) -> String {
        let file = segment(Some(cache_file));
        let shard = segment(cache_file.parent());
        let marker = source
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        let marker: String = byte_serialize(marker.as_bytes()).collect();

        format!("{}/{shard}/{file}?{marker}", self.base_url)
    }
}

fn segment(path: Option<&Path>) -> String {
    path.and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_shard_and_file_name() {
        let mapper = UrlMapper::new("https://example.com/cache");
        let url = mapper.url_for(
            Path::new("/var/cache/kiln/ab/0123456789abcdef.css"),
            Path::new("/srv/app/public/style.css"),
        );
        assert_eq!(
            url,
            "https://example.com/cache/ab/0123456789abcdef.css?style.css"
        );
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let mapper = UrlMapper::new("/cache/");
        let url = mapper.url_for(Path::new("/c/ff/1.js"), Path::new("/app/main.js"));
        assert_eq!(url, "/cache/ff/1.js?main.js");
    }

    #[test]
    fn basename_is_url_encoded() {
        let mapper = UrlMapper::new("/cache");
        let url = mapper.url_for(
            Path::new("/c/0a/feed.css"),
            Path::new("/app/my theme&dark.css"),
        );
        assert_eq!(url, "/cache/0a/feed.css?my+theme%26dark.css");
    }
}
