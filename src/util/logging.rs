//! Structured logging setup for hikitsugi
//!
//! Logs are written to stderr so that documents and JSON summaries printed on
//! stdout stay machine-readable.
//!
//! # Example
//!
//! ```no_run
//! use hikitsugi::util::logging;
//!
//! // Reads HIKITSUGI_LOG_LEVEL and HIKITSUGI_LOG_JSON
//! logging::init_from_env();
//!
//! tracing::info!(session_id = "abc", "Session started");
//! ```

use std::env;
use std::io;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for this crate's own events
    pub level: Level,

    /// One JSON object per line instead of human-readable lines
    pub use_json: bool,

    /// Include the module target (e.g., hikitsugi::events::stream)
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with full metadata, for log collection
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

/// Parses a log level, case-insensitive. Returns `None` for unknown names.
///
/// ```
/// use hikitsugi::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("WARN"), Some(Level::WARN));
/// assert_eq!(parse_level("loud"), None);
/// ```
pub fn parse_level(level_str: &str) -> Option<Level> {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn build_filter(level: Level, rust_log_set: bool) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env()
        .add_directive(format!("hikitsugi={}", level).parse().expect("valid directive"));

    if !rust_log_set {
        for directive in ["h2=warn", "hyper=warn", "reqwest=warn"] {
            filter = filter.add_directive(directive.parse().expect("valid directive"));
        }
    }
    filter
}

/// Installs the global subscriber. Only the first call has an effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level, env::var("RUST_LOG").is_ok());

        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
    });
}

/// Initializes logging from `HIKITSUGI_LOG_LEVEL` and `HIKITSUGI_LOG_JSON`.
///
/// An invalid level falls back to INFO with a note on stderr. `RUST_LOG`
/// still applies on top.
pub fn init_from_env() {
    let level_str = env::var("HIKITSUGI_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let level = parse_level(&level_str).unwrap_or_else(|| {
        eprintln!(
            "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
            level_str
        );
        Level::INFO
    });

    let use_json = env::var("HIKITSUGI_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
