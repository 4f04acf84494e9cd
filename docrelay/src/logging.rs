//! Log initialization and its CLI surface.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot set global tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Full,
    /// One JSON object per log line
    Json,
}

#[derive(Debug, Clone, clap::Parser)]
pub struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified as well. For example
    /// `debug,hyper::proto::h1=info` specifies debug logging for all modules
    /// except for the `hyper::proto::h1' module which will only display info
    /// level logging.
    #[clap(long = "log-filter", env = "LOG_FILTER", action)]
    pub log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides --log-filter.
    ///
    /// -v   'debug,hyper::proto::h1=info,h2=info'
    ///
    /// -vv  'trace,hyper::proto::h1=info,h2=info'
    #[clap(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
    )]
    pub log_verbose_count: u8,

    /// Logs: output format
    #[clap(
        long = "log-format",
        env = "DOCRELAY_LOG_FORMAT",
        default_value = "full",
        value_enum,
        action
    )]
    pub log_format: LogFormat,
}

impl LoggingConfig {
    fn filter_directives(&self) -> String {
        match self.log_verbose_count {
            0 => self.log_filter.clone().unwrap_or_else(|| "info".to_string()),
            1 => "debug,hyper::proto::h1=info,h2=info".to_string(),
            _ => "trace,hyper::proto::h1=info,h2=info".to_string(),
        }
    }
}

/// Installs the global tracing subscriber described by `config`.
pub fn init_logs(config: &LoggingConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_new(config.filter_directives())?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);

    use tracing_subscriber::util::SubscriberInitExt;
    match config.log_format {
        LogFormat::Full => subscriber.finish().try_init()?,
        LogFormat::Json => subscriber.json().finish().try_init()?,
    }
    Ok(())
}
