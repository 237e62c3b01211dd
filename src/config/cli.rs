use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Kiln binary.
#[derive(Debug, Parser)]
#[command(name = "kiln", version, about = "Kiln content cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "KILN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the (possibly cached) content of a source file.
    Content(EntryArgs),
    /// Print the cache file path for a source file, materialising it.
    Path(EntryArgs),
    /// Print the public URL of the cache file for a source file.
    Url(EntryArgs),
    /// Remove the whole cache tree.
    Clear,
    /// Materialise cache entries for files and directory trees.
    Warm(WarmArgs),
    /// Render a page layout with queued JS, CSS and template files.
    Render(RenderArgs),
    /// Serve cache files over HTTP.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the cache root directory.
    #[arg(long = "cache-root", value_name = "PATH", global = true)]
    pub cache_root: Option<PathBuf>,

    /// Override the public URL prefix of the cache root.
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Toggle cache mode.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    /// Toggle minify mode.
    #[arg(
        long = "minify",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub minify: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct EntryArgs {
    /// Source file.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Locale tag mixed into the cache key.
    #[arg(long, value_name = "LOCALE")]
    pub locale: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct WarmArgs {
    /// Files or directories to warm.
    #[arg(value_name = "PATH", required = true, value_hint = ValueHint::AnyPath)]
    pub paths: Vec<PathBuf>,

    /// Locale tag mixed into the cache key.
    #[arg(long, value_name = "LOCALE")]
    pub locale: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Layout template; falls back to `template.layout`.
    #[arg(value_name = "LAYOUT", value_hint = ValueHint::FilePath)]
    pub layout: Option<PathBuf>,

    /// Queue a JS, CSS or template file. Repeatable.
    #[arg(long = "file", value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Inline queued JS and CSS instead of linking to the cache.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub inline: bool,

    /// Template variable as KEY=VALUE. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_binding)]
    pub vars: Vec<(String, String)>,

    /// Locale tag mixed into the cache key.
    #[arg(long, value_name = "LOCALE")]
    pub locale: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
