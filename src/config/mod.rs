//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{DEFAULT_BASE_URL, DEFAULT_DYNAMIC_EXTENSION};

pub use cli::{
    CliArgs, Command, EntryArgs, GlobalOverrides, RenderArgs, ServeArgs, ServeOverrides, WarmArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kiln";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TEMPLATE_DIR: &str = "templates";
const MAX_MODE: u32 = 0o7777;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub template: TemplateSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub root: Option<PathBuf>,
    pub base_url: String,
    pub enabled: bool,
    pub minify: bool,
    pub file_mode: Option<u32>,
    pub dir_mode: Option<u32>,
    pub dynamic_extensions: Vec<String>,
    /// Locale used by CLI commands that do not pass `--locale`.
    pub locale: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateSettings {
    pub dir: PathBuf,
    pub layout: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("KILN")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.dynamic_extensions")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(&cli.overrides);
    if let Some(Command::Serve(args)) = cli.command.as_ref() {
        raw.apply_serve_overrides(&args.overrides);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    template: RawTemplateSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(root) = overrides.cache_root.as_ref() {
            self.cache.root = Some(root.clone());
        }
        if let Some(base_url) = overrides.base_url.as_ref() {
            self.cache.base_url = Some(base_url.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(minify) = overrides.minify {
            self.cache.minify = Some(minify);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            template,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let template = build_template_settings(template);

        Ok(Self {
            server,
            logging,
            cache,
            template,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let root = cache.root.filter(|root| !root.as_os_str().is_empty());

    let base_url = cache
        .base_url
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    if base_url.is_empty() {
        return Err(LoadError::invalid("cache.base_url", "must not be empty"));
    }

    let file_mode = cache
        .file_mode
        .as_deref()
        .map(|value| parse_mode(value, "cache.file_mode"))
        .transpose()?;
    let dir_mode = cache
        .dir_mode
        .as_deref()
        .map(|value| parse_mode(value, "cache.dir_mode"))
        .transpose()?;

    let dynamic_extensions = cache
        .dynamic_extensions
        .unwrap_or_else(|| vec![DEFAULT_DYNAMIC_EXTENSION.to_string()])
        .into_iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();

    let locale = cache.locale.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(CacheSettings {
        root,
        base_url,
        enabled: cache.enabled.unwrap_or(true),
        minify: cache.minify.unwrap_or(false),
        file_mode,
        dir_mode,
        dynamic_extensions,
        locale,
    })
}

fn build_template_settings(template: RawTemplateSettings) -> TemplateSettings {
    let dir = template
        .dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR));
    let layout = template
        .layout
        .filter(|layout| !layout.as_os_str().is_empty());

    TemplateSettings { dir, layout }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    root: Option<PathBuf>,
    base_url: Option<String>,
    enabled: Option<bool>,
    minify: Option<bool>,
    file_mode: Option<String>,
    dir_mode: Option<String>,
    dynamic_extensions: Option<Vec<String>>,
    locale: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTemplateSettings {
    dir: Option<PathBuf>,
    layout: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Parse permission bits written in octal, e.g. `"0644"` or `"0o755"`.
fn parse_mode(value: &str, key: &'static str) -> Result<u32, LoadError> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|err| LoadError::invalid(key, format!("`{value}` is not an octal mode: {err}")))?;
    if mode > MAX_MODE {
        return Err(LoadError::invalid(
            key,
            format!("`{value}` exceeds {MAX_MODE:o}"),
        ));
    }
    Ok(mode)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
