//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::NonZeroU64,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::error_image::ErrorImageStyle;

pub use cli::{CliArgs, Command, StartArgs, StartOverrides};

const TOML_CONFIG_NAME: &str = "livedoc.toml";
const RC_CONFIG_NAME: &str = ".livedocrc";
const JSON_CONFIG_NAME: &str = "livedoc.config.json";
const ENV_PREFIX: &str = "LIVEDOC";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PORT_FALLBACK_ATTEMPTS: u16 = 10;
const DEFAULT_KROKI_URL: &str = "https://kroki.io";
const DEFAULT_KROKI_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_IMAGE_WIDTH: u32 = 600;
const DEFAULT_IMAGE_MIN_HEIGHT: u32 = 200;
const DEFAULT_MAX_CHARS_PER_LINE: usize = 55;
const DEFAULT_MAX_LINES: usize = 40;
const MIN_IMAGE_WIDTH: u32 = 200;
const MIN_CHARS_PER_LINE: usize = 10;

/// Single-underscore variables of the flat format and the keys they set.
const FLAT_ENV_KEYS: [(&str, &str); 5] = [
    ("LIVEDOC_PORT", "server.port"),
    ("LIVEDOC_HOST", "server.host"),
    ("LIVEDOC_KROKI_URL", "kroki.url"),
    ("LIVEDOC_KROKI_TIMEOUT", "kroki.timeout_ms"),
    ("LIVEDOC_MAX_FILE_SIZE", "files.max_file_size"),
];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub kroki: KrokiSettings,
    pub files: FileSettings,
    pub error_image: ErrorImageSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub port_fallback_attempts: u16,
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
pub struct KrokiSettings {
    /// Absolute http(s) URL without a trailing slash.
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FileSettings {
    pub base_dir: PathBuf,
    pub max_file_size: NonZeroU64,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ErrorImageSettings {
    pub width: u32,
    pub min_height: u32,
    pub max_chars_per_line: usize,
    pub max_lines: usize,
}

impl ErrorImageSettings {
    pub fn style(&self) -> ErrorImageStyle {
        ErrorImageStyle {
            width: self.width,
            min_height: self.min_height,
            max_chars_per_line: self.max_chars_per_line,
            max_lines: self.max_lines,
            ..ErrorImageStyle::default()
        }
    }
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

/// Load settings using the configured precedence, resolving relative paths
/// against the process working directory.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let cwd = std::env::current_dir()
        .map_err(|err| LoadError::invalid("files.base_dir", format!("no working directory: {err}")))?;
    load_from(cli, &cwd)
}

/// Load settings with relative paths resolved against `cwd`.
///
/// Project files (`livedoc.toml`, `livedoc.config.json`, `.livedocrc`) are
/// read from the directory named by `--dir`, or from `cwd` when no directory
/// is given.
pub fn load_from(cli: &CliArgs, cwd: &Path) -> Result<Settings, LoadError> {
    let overrides = match cli.command.as_ref() {
        Some(Command::Start(args)) => args.overrides.clone(),
        Some(Command::Formats) | None => StartOverrides::default(),
    };

    let project_dir = overrides
        .dir
        .as_ref()
        .map_or_else(|| cwd.to_path_buf(), |dir| cwd.join(dir));

    let mut builder = Config::builder()
        .add_source(File::from(project_dir.join(TOML_CONFIG_NAME)).required(false))
        .add_source(
            File::from(project_dir.join(JSON_CONFIG_NAME))
                .format(FileFormat::Json)
                .required(false),
        )
        .add_source(
            File::from(project_dir.join(RC_CONFIG_NAME))
                .format(FileFormat::Json)
                .required(false),
        );

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(cwd.join(path)).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    for (key, value) in flat_env_overrides(|name| std::env::var(name).ok()) {
        builder = builder.set_override(key, value)?;
    }

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_start_overrides(&overrides);

    Settings::from_raw(raw, cwd)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

/// Nested keys to set from the single-underscore variables present in `lookup`.
fn flat_env_overrides(
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(&'static str, String)> {
    FLAT_ENV_KEYS
        .iter()
        .filter_map(|(name, key)| {
            let value = lookup(name)?;
            let value = value.trim();
            (!value.is_empty()).then(|| (*key, value.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    kroki: RawKrokiSettings,
    files: RawFileSettings,
    error_image: RawErrorImageSettings,
    // Top-level keys of the flat `.livedocrc` format.
    port: Option<u16>,
    host: Option<String>,
    #[serde(rename = "krokiUrl", alias = "krokiurl")]
    kroki_url: Option<String>,
    #[serde(rename = "krokiTimeout", alias = "krokitimeout")]
    kroki_timeout: Option<u64>,
    #[serde(rename = "maxFileSize", alias = "maxfilesize")]
    max_file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    port_fallback_attempts: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKrokiSettings {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFileSettings {
    base_dir: Option<PathBuf>,
    max_file_size: Option<u64>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawErrorImageSettings {
    width: Option<u32>,
    min_height: Option<u32>,
    max_chars_per_line: Option<usize>,
    max_lines: Option<usize>,
}

impl RawSettings {
    /// Move flat keys under their sections; nested keys win when both are set.
    fn fold_flat_keys(&mut self) {
        self.server.port = self.server.port.or(self.port.take());
        self.server.host = self.server.host.take().or(self.host.take());
        self.kroki.url = self.kroki.url.take().or(self.kroki_url.take());
        self.kroki.timeout_ms = self.kroki.timeout_ms.or(self.kroki_timeout.take());
        self.files.max_file_size = self.files.max_file_size.or(self.max_file_size.take());
    }

    fn apply_start_overrides(&mut self, overrides: &StartOverrides) {
        if let Some(host) = overrides.host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(dir) = overrides.dir.as_ref() {
            self.files.base_dir = Some(dir.clone());
        }
        if let Some(url) = overrides.kroki_url.as_ref() {
            self.kroki.url = Some(url.clone());
        }
        if let Some(timeout) = overrides.kroki_timeout_ms {
            self.kroki.timeout_ms = Some(timeout);
        }
        if let Some(limit) = overrides.max_file_size {
            self.files.max_file_size = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(mut raw: RawSettings, cwd: &Path) -> Result<Self, LoadError> {
        raw.fold_flat_keys();
        let RawSettings {
            server,
            logging,
            kroki,
            files,
            error_image,
            ..
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            kroki: build_kroki_settings(kroki)?,
            files: build_file_settings(files, cwd)?,
            error_image: build_error_image_settings(error_image)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let host = match host.trim() {
        "localhost" => DEFAULT_HOST.to_string(),
        other => other.to_string(),
    };

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings {
        addr,
        port_fallback_attempts: server
            .port_fallback_attempts
            .unwrap_or(DEFAULT_PORT_FALLBACK_ATTEMPTS),
    })
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

fn build_kroki_settings(kroki: RawKrokiSettings) -> Result<KrokiSettings, LoadError> {
    let raw_url = kroki.url.unwrap_or_else(|| DEFAULT_KROKI_URL.to_string());
    let parsed = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("kroki.url", format!("invalid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "kroki.url",
            format!("unsupported scheme `{}`", parsed.scheme()),
        ));
    }
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err(LoadError::invalid("kroki.url", "URL must have a host"));
    }
    let url = raw_url.trim().trim_end_matches('/').to_string();

    let timeout_ms = kroki.timeout_ms.unwrap_or(DEFAULT_KROKI_TIMEOUT_MS);
    let timeout = positive_millis(timeout_ms, "kroki.timeout_ms")?;

    Ok(KrokiSettings { url, timeout })
}

fn build_file_settings(files: RawFileSettings, cwd: &Path) -> Result<FileSettings, LoadError> {
    let base_dir = files.base_dir.unwrap_or_else(|| cwd.to_path_buf());
    if base_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "files.base_dir",
            "path must not be empty",
        ));
    }
    let base_dir = cwd.join(base_dir);

    let max_file_size = NonZeroU64::new(files.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE))
        .ok_or_else(|| LoadError::invalid("files.max_file_size", "must be greater than zero"))?;

    let read_timeout = positive_millis(
        files.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
        "files.read_timeout_ms",
    )?;

    Ok(FileSettings {
        base_dir,
        max_file_size,
        read_timeout,
    })
}

fn build_error_image_settings(
    image: RawErrorImageSettings,
) -> Result<ErrorImageSettings, LoadError> {
    let width = image.width.unwrap_or(DEFAULT_IMAGE_WIDTH);
    if width < MIN_IMAGE_WIDTH {
        return Err(LoadError::invalid(
            "error_image.width",
            format!("must be at least {MIN_IMAGE_WIDTH}"),
        ));
    }

    let min_height = image.min_height.unwrap_or(DEFAULT_IMAGE_MIN_HEIGHT);
    if min_height == 0 {
        return Err(LoadError::invalid(
            "error_image.min_height",
            "must be greater than zero",
        ));
    }

    let max_chars_per_line = image
        .max_chars_per_line
        .unwrap_or(DEFAULT_MAX_CHARS_PER_LINE);
    if max_chars_per_line < MIN_CHARS_PER_LINE {
        return Err(LoadError::invalid(
            "error_image.max_chars_per_line",
            format!("must be at least {MIN_CHARS_PER_LINE}"),
        ));
    }

    let max_lines = image.max_lines.unwrap_or(DEFAULT_MAX_LINES);
    if max_lines == 0 {
        return Err(LoadError::invalid(
            "error_image.max_lines",
            "must be greater than zero",
        ));
    }

    Ok(ErrorImageSettings {
        width,
        min_height,
        max_chars_per_line,
        max_lines,
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}
