use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::{CacheStore, RenderContext};

/// Outcome of a warm run. One failing file never stops the others.
#[derive(Debug, Default)]
pub struct WarmReport {
    pub warmed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl WarmReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Materialises cache entries ahead of the first request.
pub struct CacheWarmer {
    store: Arc<CacheStore>,
}

impl CacheWarmer {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Warm every regular file under `paths`. Directories are walked
    /// recursively, following symlinks.
    pub fn warm<I, P>(&self, paths: I, ctx: &RenderContext) -> WarmReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let started_at = Instant::now();
        let mut report = WarmReport::default();

        for root in paths {
            let root = root.as_ref();
            for entry in WalkDir::new(root).follow_links(true) {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        self.warm_file(entry.path(), ctx, &mut report);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let path = err
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| root.to_path_buf());
                        warn!(
                            target = "kiln::warmer",
                            path = %path.display(),
                            error = %err,
                            "Skipping unreadable path"
                        );
                        report.failed.push((path, err.to_string()));
                    }
                }
            }
        }

        info!(
            target = "kiln::warmer",
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Cache warm finished"
        );
        report
    }

    fn warm_file(&self, path: &Path, ctx: &RenderContext, report: &mut WarmReport) {
        match self.store.get_cache_file_path(path, ctx) {
            Ok(_) => report.warmed.push(path.to_path_buf()),
            Err(err) => {
                warn!(
                    target = "kiln::warmer",
                    path = %path.display(),
                    error = %err,
                    "Failed to warm cache entry"
                );
                report.failed.push((path.to_path_buf(), err.to_string()));
            }
        }
    }
}
