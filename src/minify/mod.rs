//! Whitespace and comment reduction for JS and CSS.
//!
//! [`Minifier`] dispatches on the lowercase file extension. Unknown
//! extensions pass through untouched, and a handler failure degrades to the
//! original content with a warning instead of failing the request.

mod css;
mod js;

use std::collections::HashMap;
use std::fmt;

use metrics::counter;
use thiserror::Error;
use tracing::warn;

pub use css::CssMinifier;
pub use js::JsMinifier;

const METRIC_MINIFY_FALLBACK_TOTAL: &str = "kiln_minify_fallback_total";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinifyError {
    #[error("unterminated comment starting at offset {0}")]
    UnterminatedComment(usize),
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    #[error("unterminated regular expression starting at offset {0}")]
    UnterminatedRegex(usize),
}

/// A text transform that only removes redundant whitespace and comments.
pub trait Minify: Send + Sync {
    fn minify(&self, input: &str) -> Result<String, MinifyError>;
}

/// Extension-keyed set of minifiers.
pub struct Minifier {
    handlers: HashMap<String, Box<dyn Minify>>,
}

impl Minifier {
    /// Minifier with the built-in `js` and `css` handlers.
    pub fn new() -> Self {
        let mut minifier = Self::empty();
        minifier.register("js", JsMinifier);
        minifier.register("css", CssMinifier);
        minifier
    }

    /// Minifier that passes everything through.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, handler: impl Minify + 'static) {
        self.handlers
            .insert(extension.to_ascii_lowercase(), Box::new(handler));
    }

    pub fn handles(&self, extension: &str) -> bool {
        self.handlers.contains_key(&extension.to_ascii_lowercase())
    }

    /// Minify `content` according to `extension`.
    ///
    /// Returns the input unchanged when no handler is registered, when the
    /// content is not UTF-8, or when the handler fails.
    pub fn minify(&self, extension: &str, content: Vec<u8>) -> Vec<u8> {
        let Some(handler) = self.handlers.get(&extension.to_ascii_lowercase()) else {
            return content;
        };

        let text = match std::str::from_utf8(&content) {
            Ok(text) => text,
            Err(_) => {
                warn!(
                    target = "kiln::minify",
                    extension,
                    result = "fallback",
                    reason = "content is not valid UTF-8",
                    "Serving unminified content"
                );
                counter!(METRIC_MINIFY_FALLBACK_TOTAL).increment(1);
                return content;
            }
        };

        match handler.minify(text) {
            Ok(minified) => minified.into_bytes(),
            Err(err) => {
                warn!(
                    target = "kiln::minify",
                    extension,
                    result = "fallback",
                    error = %err,
                    "Serving unminified content"
                );
                counter!(METRIC_MINIFY_FALLBACK_TOTAL).increment(1);
                content
            }
        }
    }
}

impl Default for Minifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Minifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self.handlers.keys().collect();
        extensions.sort();
        f.debug_struct("Minifier")
            .field("extensions", &extensions)
            .finish()
    }
}
