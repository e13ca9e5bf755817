//! Logging setup
//!
//! Console output goes to stderr so the prompts on stdout stay readable.
//! Every run is also appended to a plain-text file under the log directory.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::errors::DeployError;

/// Verbosity accepted by `--log-level` and the settings file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: [(&'static str, LogLevel); 6] = [
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("warning", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    /// Directive for `EnvFilter` when `RUST_LOG` is unset
    pub fn directive(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, level)| *level == self)
            .map(|(name, _)| *name)
            .unwrap_or("info")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, level)| *level)
            .ok_or_else(|| {
                format!(
                    "unknown log level '{}', expected trace, debug, info, warn or error",
                    s
                )
            })
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub log_level: LogLevel,

    /// Write logs to stderr
    pub stderr: bool,

    /// Directory for the run log file, `None` disables file output
    pub log_dir: Option<PathBuf>,

    /// Enable JSON format on the console layer
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stderr: true,
            log_dir: Some(PathBuf::from("/var/log/wardenctl")),
            json_format: false,
        }
    }
}

/// Install the global subscriber. The returned guard flushes the file writer
/// and must live until exit.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, DeployError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.directive()));

    let console = match (options.stderr, options.json_format) {
        (false, _) => None,
        (true, true) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        ),
        (true, false) => Some(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        ),
    };

    let mut unwritable = None;
    let log_dir = options.log_dir.and_then(|dir| match writable_log_dir(dir) {
        Ok(dir) => Some(dir),
        Err(reason) => {
            unwritable = Some(reason);
            None
        }
    });

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "wardenctl.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| DeployError::ConfigError(e.to_string()))?;

    if let Some(reason) = unwritable {
        warn!(%reason, "Log directory unavailable, logging to the console only");
    }
    Ok(guard)
}

/// Create the log directory. An unprivileged run cannot, and still has to
/// reach its own permission check.
fn writable_log_dir(dir: PathBuf) -> Result<PathBuf, String> {
    std::fs::create_dir_all(&dir)
        .map(|()| dir.clone())
        .map_err(|e| format!("{}: {}", dir.display(), e))
}
