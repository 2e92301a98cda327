use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the LiveDoc binary.
#[derive(Debug, Parser)]
#[command(
    name = "livedoc",
    version,
    about = "Serve diagram sources and images from a directory as embeddable images"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LIVEDOC_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve a directory over HTTP.
    Start(StartArgs),
    /// List the supported file extensions.
    Formats,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StartArgs {
    #[command(flatten)]
    pub overrides: StartOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StartOverrides {
    /// Port to listen on; the next free port is used when it is taken.
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Interface to bind.
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Directory to serve files from.
    #[arg(short = 'd', long = "dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Base URL of the Kroki rendering service.
    #[arg(long = "kroki", value_name = "URL", value_hint = ValueHint::Url)]
    pub kroki_url: Option<String>,

    /// Rendering request timeout in milliseconds.
    #[arg(long = "kroki-timeout-ms", value_name = "MILLIS")]
    pub kroki_timeout_ms: Option<u64>,

    /// Largest file served or rendered, in bytes.
    #[arg(long = "max-file-size", value_name = "BYTES")]
    pub max_file_size: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
