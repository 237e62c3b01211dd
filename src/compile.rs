//! Turns source files into servable content.
//!
//! Files whose extension is registered as dynamic are rendered as minijinja
//! templates against a binding map; everything else is returned byte for
//! byte.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::cache::fingerprint::extension_of;

/// Variables visible to dynamic templates.
pub type Bindings = Map<String, Value>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template `{}` is not valid UTF-8", path.display())]
    Encoding { path: PathBuf },
    #[error("failed to render template `{}`", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },
}

/// Renders dynamic templates and passes static files through.
#[derive(Debug)]
pub struct Compiler {
    env: Environment<'static>,
    dynamic_extensions: Vec<String>,
}

impl Compiler {
    pub fn new<I, S>(dynamic_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut env = Environment::new();
        // Output is spliced into HTML, CSS or JS verbatim.
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let dynamic_extensions = dynamic_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            env,
            dynamic_extensions,
        }
    }

    /// Resolve `{% include %}` and `{% extends %}` names against `dir`.
    pub fn with_include_dir(mut self, dir: &Path) -> Self {
        self.env.set_loader(minijinja::path_loader(dir.to_path_buf()));
        self
    }

    /// Whether `path` is rendered rather than copied.
    pub fn is_dynamic(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        self.dynamic_extensions.iter().any(|known| *known == ext)
    }

    /// Produce the content for `source`.
    pub fn compile(&self, source: &Path, bindings: &Bindings) -> Result<Vec<u8>, CompileError> {
        if self.is_dynamic(source) {
            return self.render(source, bindings).map(String::into_bytes);
        }

        fs::read(source).map_err(|err| CompileError::Read {
            path: source.to_path_buf(),
            source: err,
        })
    }

    /// Render `source` as a template regardless of its extension.
    pub fn render(&self, source: &Path, bindings: &Bindings) -> Result<String, CompileError> {
        let bytes = fs::read(source).map_err(|err| CompileError::Read {
            path: source.to_path_buf(),
            source: err,
        })?;
        let template = String::from_utf8(bytes).map_err(|_| CompileError::Encoding {
            path: source.to_path_buf(),
        })?;
        let name = source.to_string_lossy();

        debug!(
            target = "kiln::compile",
            path = %source.display(),
            bindings = bindings.len(),
            "Rendering template"
        );

        self.env
            .render_named_str(&name, &template, bindings)
            .map_err(|err| CompileError::Template {
                path: source.to_path_buf(),
                source: err,
            })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new([crate::cache::DEFAULT_DYNAMIC_EXTENSION])
    }
}
