//! Page assembly on top of the cache store.
//!
//! Views queue JS, CSS and template files; [`HtmlTemplate::render`] turns
//! them into `css`, `js` and `content` blocks and renders a layout that
//! places those blocks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{CacheError, CacheStore, RenderContext};
use crate::cache::fingerprint::extension_of;
use crate::compile::Bindings;

/// Rendered page fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocks {
    pub css: String,
    pub js: String,
    pub content: String,
}

impl Blocks {
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "css" => Some(self.css.as_str()),
            "js" => Some(self.js.as_str()),
            "content" => Some(self.content.as_str()),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "css": self.css,
            "js": self.js,
            "content": self.content,
        })
    }
}

#[derive(Debug, Clone)]
struct QueuedFile {
    path: PathBuf,
    inline: bool,
}

/// Layout renderer bound to a shared [`CacheStore`].
#[derive(Debug)]
pub struct HtmlTemplate {
    store: Arc<CacheStore>,
    template_dir: PathBuf,
    layout: Option<PathBuf>,
    locale: Option<String>,
    vars: Bindings,
    files: Vec<QueuedFile>,
    blocks: Option<Blocks>,
}

impl HtmlTemplate {
    pub fn new(store: Arc<CacheStore>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            template_dir: template_dir.into(),
            layout: None,
            locale: None,
            vars: Bindings::new(),
            files: Vec::new(),
            blocks: None,
        }
    }

    /// Locale used for every cache lookup made by this template.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Default layout used by [`render`](Self::render).
    pub fn set_layout(&mut self, layout: impl AsRef<Path>) {
        self.layout = Some(self.real_path(layout));
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        self.vars.insert(key, value.into());
    }

    /// Merge `vars`, replacing existing keys.
    pub fn extend(&mut self, vars: Bindings) {
        self.vars.extend(vars);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Resolve `name` against the template directory. Absolute paths are
    /// kept as they are.
    pub fn real_path(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.template_dir.join(name)
        }
    }

    /// Queue a JS, CSS or template file. `inline` embeds JS and CSS instead
    /// of linking to the cache URL.
    pub fn add_file(&mut self, name: impl AsRef<Path>, inline: bool) {
        let path = self.real_path(name);
        self.files.push(QueuedFile { path, inline });
    }

    pub fn add_files<I, P>(&mut self, names: I, inline: bool)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for name in names {
            self.add_file(name, inline);
        }
    }

    /// Turn the queued files into blocks and empty the queue.
    ///
    /// With nothing queued the previous blocks are kept.
    pub fn render_blocks(&mut self) -> Result<(), CacheError> {
        if self.files.is_empty() {
            return Ok(());
        }

        let ctx = self.context();
        let mut css = Vec::new();
        let mut js = Vec::new();
        let mut content = Vec::new();

        for file in &self.files {
            match extension_of(&file.path).as_str() {
                "js" if file.inline => js.push(format!(
                    "<script type=\"text/javascript\">{}</script>\n",
                    self.inline_content(&file.path, &ctx)?
                )),
                "js" => js.push(format!(
                    "<script type=\"text/javascript\" src=\"{}\"></script>\n",
                    self.store.get_file_url(&file.path, &ctx)?
                )),
                "css" if file.inline => css.push(format!(
                    "<style>{}</style>\n",
                    self.inline_content(&file.path, &ctx)?
                )),
                "css" => css.push(format!(
                    "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\" media=\"all\" />\n",
                    self.store.get_file_url(&file.path, &ctx)?
                )),
                _ => {
                    let bytes = self.store.compile(&file.path, &ctx)?;
                    content.push(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }

        self.blocks = Some(Blocks {
            css: css.join("\t"),
            js: js.join("\t"),
            content: content.concat(),
        });
        self.files.clear();
        Ok(())
    }

    /// A rendered block, or the empty string.
    pub fn block(&self, name: &str) -> &str {
        self.blocks
            .as_ref()
            .and_then(|blocks| blocks.get(name))
            .unwrap_or_default()
    }

    /// Render blocks, then the layout (or the default layout) with the
    /// variables plus `blocks.css`, `blocks.js` and `blocks.content`.
    ///
    /// Without any layout the `content` block is returned as is.
    pub fn render(&mut self, layout: Option<&Path>) -> Result<String, CacheError> {
        self.render_blocks()?;

        let layout = match layout {
            Some(layout) => self.real_path(layout),
            None => match self.layout.clone() {
                Some(layout) => layout,
                None => return Ok(self.block("content").to_string()),
            },
        };

        let mut bindings = self.vars.clone();
        let blocks = self.blocks.clone().unwrap_or_default();
        bindings.insert("blocks".to_string(), blocks.to_value());

        if !layout.is_file() {
            return Err(CacheError::SourceNotFound { path: layout });
        }
        Ok(self.store.compiler().render(&layout, &bindings)?)
    }

    fn context(&self) -> RenderContext {
        RenderContext {
            locale: self.locale.clone(),
            bindings: self.vars.clone(),
        }
    }

    fn inline_content(&self, path: &Path, ctx: &RenderContext) -> Result<String, CacheError> {
        let bytes = self.store.get_content(path, ctx)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
