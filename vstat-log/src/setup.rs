use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  vstat_pull::cache > pulled 12 samples
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32Z  INFO vstat_pull::cache: pulled 12 samples
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","fields":{"message":"pulled 12 samples"},"target":"vstat_pull::cache"}
    /// ```
    Json,
}

/// The logging level parameter.
///
/// All log messages with a level equal to or higher than the configured one are emitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// The "error" level.
    Error,
    /// The "warn" level.
    Warn,
    /// The "info" level.
    Info,
    /// The "debug" level.
    Debug,
    /// The "trace" level.
    Trace,
    /// No logs at all.
    Off,
}

impl LogLevel {
    /// Returns the tracing [`LevelFilter`] matching this level.
    pub const fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for vstat.
    pub level: LogLevel,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, span close events are logged with their timings.
    pub log_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Auto,
            log_spans: false,
        }
    }
}

/// Initialize the logging system.
///
/// The level configured in [`LogConfig`] is the default, `RUST_LOG` overrides it.
///
/// # Example
///
/// ```
/// let log_config = vstat_log::LogConfig {
///     level: vstat_log::LogLevel::Debug,
///     ..Default::default()
/// };
///
/// vstat_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    let span_events = match config.log_spans {
        true => fmt::format::FmtSpan::CLOSE,
        false => fmt::format::FmtSpan::NONE,
    };

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => fmt::layer()
            .with_span_events(span_events)
            .pretty()
            .boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => fmt::layer()
            .with_span_events(span_events)
            .with_ansi(false)
            .compact()
            .boxed(),
        (LogFormat::Json, _) => fmt::layer()
            .with_span_events(span_events)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
    };

    let filter = EnvFilter::builder()
        .with_default_directive(config.level.level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}
