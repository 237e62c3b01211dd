use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::time::{Duration, SystemTime};

use kiln::cache::{CacheConfig, CacheStore, RenderContext};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn unchanged_sources_regenerate_once_and_hit_afterwards() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("app.js");
    let broken = dir.path().join("broken.js");
    fs::write(&source, "var a = 1;").expect("write source");
    fs::write(&broken, "var s = 'open;\n").expect("write broken source");
    OpenOptions::new()
        .write(true)
        .open(&source)
        .and_then(|file| file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1000)))
        .expect("set mtime");

    let store = CacheStore::new(CacheConfig {
        minify: true,
        ..CacheConfig::with_root(dir.path().join("cache"))
    });
    let ctx = RenderContext::new();

    // placeholder + regenerate, then two hits
    store.get_content(&source, &ctx).expect("first read");
    store.get_content(&source, &ctx).expect("second read");
    store.get_file_url(&source, &ctx).expect("url read");
    // placeholder + regenerate with minify fallback
    store.get_content(&broken, &ctx).expect("fallback read");
    store.clear_cache().expect("clear");

    let snapshot: HashMap<String, DebugValue> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| (composite_key.key().name().to_string(), value))
        .collect();

    assert!(
        snapshot.contains_key("kiln_cache_regenerate_ms"),
        "missing metric: kiln_cache_regenerate_ms"
    );

    let expected = [
        ("kiln_cache_hit_total", 2),
        ("kiln_cache_regenerate_total", 2),
        ("kiln_cache_placeholder_total", 2),
        ("kiln_minify_fallback_total", 1),
        ("kiln_cache_clear_total", 1),
    ];

    for (metric, count) in expected {
        match snapshot.get(metric) {
            Some(DebugValue::Counter(value)) => {
                assert_eq!(*value, count, "unexpected value for {metric}")
            }
            other => panic!("expected counter {metric}, got {other:?}"),
        }
    }
}
