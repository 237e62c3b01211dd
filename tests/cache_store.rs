//! End-to-end behaviour of the cache store against a real filesystem.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

use kiln::cache::{CacheConfig, CacheStore, EntryState, RenderContext};
use serde_json::json;
use tempfile::tempdir;

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn set_mtime(path: &Path, secs: u64) {
    OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open for mtime")
        .set_modified(at(secs))
        .expect("set mtime");
}

fn write_source(path: &Path, content: &str, secs: u64) {
    fs::write(path, content).expect("write source");
    set_mtime(path, secs);
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .expect("read mtime")
}

#[cfg(unix)]
fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).expect("read inode").ino()
}

fn cache_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for shard in fs::read_dir(root).expect("read root") {
        let shard = shard.expect("shard entry").path();
        for file in fs::read_dir(&shard).expect("read shard") {
            files.push(file.expect("file entry").path());
        }
    }
    files
}

#[test]
fn stylesheet_lifecycle_follows_source_mtime() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("style.css");
    let root = dir.path().join("cache");
    write_source(&source, "body { color: red; }", 1000);

    let store = CacheStore::new(CacheConfig::with_root(&root));
    let ctx = RenderContext::new();

    let path = store.get_cache_file_path(&source, &ctx).expect("first path");
    let relative = path
        .strip_prefix(fs::canonicalize(&root).expect("canonical root"))
        .expect("entry under root");
    let shard = relative
        .parent()
        .and_then(Path::to_str)
        .expect("shard segment");
    let stem = relative
        .file_stem()
        .and_then(|stem| stem.to_str())
        .expect("file stem");

    assert_eq!(shard.len(), 2);
    assert_eq!(stem.len(), 38);
    assert_eq!(relative.extension().and_then(|ext| ext.to_str()), Some("css"));
    assert_eq!(fs::read(&path).expect("read entry"), b"body { color: red; }");
    assert_eq!(mtime(&path), at(1000));

    // Unchanged source: the entry is left alone. Regeneration renames a new
    // file into place, so a stable inode means nothing was rewritten.
    let untouched = mtime(&path);
    #[cfg(unix)]
    let first_inode = inode(&path);
    assert_eq!(store.get_cache_file_path(&source, &ctx).expect("second path"), path);
    store.get_file_url(&source, &ctx).expect("url");
    assert_eq!(mtime(&path), untouched);
    #[cfg(unix)]
    assert_eq!(inode(&path), first_inode);

    write_source(&source, "body { color: blue; }", 2000);
    assert_eq!(
        store.get_content(&source, &ctx).expect("regenerated content"),
        b"body { color: blue; }"
    );
    assert_eq!(mtime(&path), at(2000));
    assert_eq!(cache_files(&root), vec![path]);
}

#[test]
fn url_for_script_keeps_shard_file_and_basename() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("main app.js");
    write_source(&source, "var a = 1;", 1000);

    let store = CacheStore::new(CacheConfig {
        base_url: "https://cdn.example.com/cache/".to_string(),
        ..CacheConfig::with_root(dir.path().join("cache"))
    });
    let ctx = RenderContext::new();

    let path = store.get_cache_file_path(&source, &ctx).expect("path");
    let url = store.get_file_url(&source, &ctx).expect("url");

    let shard = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .expect("shard");
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file");
    assert_eq!(
        url,
        format!("https://cdn.example.com/cache/{shard}/{file}?main+app.js")
    );
}

#[test]
fn source_without_extension_uses_fallback() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("LICENSE");
    write_source(&source, "BSD", 1000);

    let store = CacheStore::new(CacheConfig::with_root(dir.path().join("cache")));
    let path = store
        .get_cache_file_path(&source, &RenderContext::new())
        .expect("path");

    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("cache"));
}

#[test]
fn relative_and_absolute_spellings_share_an_entry() {
    let dir = tempdir().expect("tempdir");
    let nested = dir.path().join("public/css");
    fs::create_dir_all(&nested).expect("mkdir");
    let source = nested.join("site.css");
    write_source(&source, "a{}", 1000);

    let store = CacheStore::new(CacheConfig::with_root(dir.path().join("cache")));
    let ctx = RenderContext::new();

    let direct = store.get_cache_file_path(&source, &ctx).expect("direct");
    let dotted = store
        .get_cache_file_path(&dir.path().join("public/css/../css/./site.css"), &ctx)
        .expect("dotted");
    assert_eq!(direct, dotted);
}

#[test]
fn placeholder_left_by_a_crash_is_refilled() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("app.js");
    write_source(&source, "var a = 1;", 1000);

    let store = CacheStore::new(CacheConfig::with_root(dir.path().join("cache")));
    let ctx = RenderContext::new();
    let entry = store.resolve(&source, &ctx).expect("resolve");

    fs::create_dir_all(entry.shard_dir()).expect("shard");
    fs::write(entry.path(), "").expect("placeholder");
    set_mtime(entry.path(), 1000);
    assert_eq!(
        EntryState::classify(at(1000), Some((mtime(entry.path()), 0))),
        EntryState::PlaceholderEmpty
    );

    assert_eq!(store.get_content(&source, &ctx).expect("content"), b"var a = 1;");
}

#[test]
fn dynamic_template_is_rendered_per_locale() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("hello.tpl");
    write_source(&source, "{{ greeting }}, {{ name }}!", 1000);

    let store = CacheStore::new(CacheConfig::with_root(dir.path().join("cache")));
    let bindings = |greeting: &str| {
        json!({"greeting": greeting, "name": "Ada"})
            .as_object()
            .cloned()
            .expect("object bindings")
    };

    let de = RenderContext::new()
        .with_locale("de_DE")
        .with_bindings(bindings("Hallo"));
    let en = RenderContext::new()
        .with_locale("en_US")
        .with_bindings(bindings("Hello"));

    assert_eq!(store.get_content(&source, &de).expect("de"), b"Hallo, Ada!");
    assert_eq!(store.get_content(&source, &en).expect("en"), b"Hello, Ada!");
    assert_ne!(
        store.get_cache_file_path(&source, &de).expect("de path"),
        store.get_cache_file_path(&source, &en).expect("en path")
    );
}

#[test]
fn dynamic_template_includes_partials_from_the_include_dir() {
    let dir = tempdir().expect("tempdir");
    let views = dir.path().join("views");
    fs::create_dir_all(&views).expect("mkdir");
    fs::write(views.join("footer.tpl"), "<footer>{{ year }}</footer>").expect("write partial");
    let source = views.join("page.tpl");
    write_source(&source, "<main></main>{% include \"footer.tpl\" %}", 1000);

    let store = CacheStore::new(CacheConfig {
        include_dir: Some(views.clone()),
        ..CacheConfig::with_root(dir.path().join("cache"))
    });
    let ctx = RenderContext::new().with_bindings(
        json!({"year": 2024})
            .as_object()
            .cloned()
            .expect("object bindings"),
    );

    assert_eq!(
        store.get_content(&source, &ctx).expect("content"),
        b"<main></main><footer>2024</footer>"
    );
}

#[test]
fn cache_mode_off_recompiles_every_call() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("site.css");
    write_source(&source, "a { color : red ; }", 1000);
    let root = dir.path().join("cache");

    let store = CacheStore::new(CacheConfig {
        enabled: false,
        ..CacheConfig::with_root(&root)
    });
    let ctx = RenderContext::new();

    assert_eq!(store.get_content(&source, &ctx).expect("first"), b"a { color : red ; }");
    // Same mtime, different bytes: only a non-caching read sees the change.
    fs::write(&source, "b{}").expect("rewrite");
    set_mtime(&source, 1000);
    assert_eq!(store.get_content(&source, &ctx).expect("second"), b"b{}");
    assert!(!root.exists());
}

#[test]
fn minify_mode_applies_to_scripts_and_stylesheets_only() {
    let dir = tempdir().expect("tempdir");
    let script = dir.path().join("app.js");
    let style = dir.path().join("site.css");
    let page = dir.path().join("page.html");
    write_source(&script, "/* banner */\nfunction  add ( a , b ) {\n  return a + b ;\n}\n", 1000);
    write_source(&style, "a , b {\n  margin : 0 auto ;\n}\n", 1000);
    write_source(&page, "<p>  spaced  </p>\n", 1000);

    let store = CacheStore::new(CacheConfig {
        minify: true,
        ..CacheConfig::with_root(dir.path().join("cache"))
    });
    let ctx = RenderContext::new();

    assert_eq!(
        store.get_content(&script, &ctx).expect("js"),
        b"function add(a,b){return a+b;}"
    );
    assert_eq!(store.get_content(&style, &ctx).expect("css"), b"a,b{margin:0 auto}");
    assert_eq!(
        store.get_content(&page, &ctx).expect("html"),
        b"<p>  spaced  </p>\n"
    );
}

#[test]
fn broken_script_is_cached_unminified() {
    let dir = tempdir().expect("tempdir");
    let script = dir.path().join("broken.js");
    write_source(&script, "var s = 'unterminated;\n", 1000);

    let store = CacheStore::new(CacheConfig {
        minify: true,
        ..CacheConfig::with_root(dir.path().join("cache"))
    });

    assert_eq!(
        store
            .get_content(&script, &RenderContext::new())
            .expect("fallback content"),
        b"var s = 'unterminated;\n"
    );
}

#[test]
fn clear_cache_then_rebuild() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("site.css");
    write_source(&source, "a{}", 1000);
    let root = dir.path().join("cache");

    let store = CacheStore::new(CacheConfig::with_root(&root));
    let ctx = RenderContext::new();
    let first = store.get_cache_file_path(&source, &ctx).expect("first");

    store.clear_cache().expect("clear");
    assert!(!root.exists());

    let second = store.get_cache_file_path(&source, &ctx).expect("second");
    assert_eq!(first, second);
    assert_eq!(fs::read(&second).expect("read"), b"a{}");
}

#[test]
fn concurrent_requests_converge_on_one_complete_entry() {
    const THREADS: usize = 8;

    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("bundle.js");
    let body = "var x = 1;\n".repeat(2048);
    write_source(&source, &body, 1000);

    let store = Arc::new(CacheStore::new(CacheConfig::with_root(dir.path().join("cache"))));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let source = source.clone();
            thread::spawn(move || {
                barrier.wait();
                store
                    .get_content(&source, &RenderContext::new())
                    .expect("content")
            })
        })
        .collect();

    for handle in handles {
        let content = handle.join().expect("thread");
        assert_eq!(content, body.as_bytes());
    }

    let files = cache_files(&dir.path().join("cache"));
    assert_eq!(files.len(), 1, "no temporary files left behind: {files:?}");
    assert_eq!(mtime(&files[0]), at(1000));
}

#[test]
fn distinct_sources_do_not_block_each_other() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(CacheStore::new(CacheConfig::with_root(dir.path().join("cache"))));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let source = dir.path().join(format!("part{i}.css"));
            write_source(&source, &format!(".p{i}{{}}"), 1000 + i);
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .get_content(&source, &RenderContext::new())
                    .expect("content")
            })
        })
        .collect();

    let mut outputs: Vec<_> = handles
        .into_iter()
        .map(|handle| String::from_utf8(handle.join().expect("thread")).expect("utf8"))
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec![".p0{}", ".p1{}", ".p2{}", ".p3{}"]);
}
