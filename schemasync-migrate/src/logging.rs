//! Logging setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left to
//! the application. With the `tracing-subscriber` feature, [`init`] installs
//! one configured from the environment:
//!
//! - `SCHEMASYNC_DEBUG=true|1|yes` - log at debug level
//! - `SCHEMASYNC_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `SCHEMASYNC_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! use schemasync_migrate::logging;
//!
//! logging::init();
//! ```
//!
//! Events carry the table, column or index they concern as fields:
//!
//! ```rust,ignore
//! info!(table = %table.name(), "Reconciling table");
//! error!(table = %table.name(), subject = %subject, error = %err, "Statement failed, skipping change");
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "SCHEMASYNC_DEBUG";
const LEVEL_VAR: &str = "SCHEMASYNC_LOG_LEVEL";
const FORMAT_VAR: &str = "SCHEMASYNC_LOG_FORMAT";

/// Targets that receive the configured level.
const TARGETS: [&str; 4] = [
    "schemasync",
    "schemasync_schema",
    "schemasync_migrate",
    "schemasync_postgres",
];

/// Check if `SCHEMASYNC_DEBUG` asks for debug logging.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// The level selected by the environment.
///
/// An explicit, valid `SCHEMASYNC_LOG_LEVEL` wins; otherwise debug when
/// `SCHEMASYNC_DEBUG` is set, else warn.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

fn resolve_level(requested: Option<&str>, debug: bool) -> &'static str {
    let explicit = requested.and_then(|level| match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    });
    match explicit {
        Some(level) => level,
        None if debug => "debug",
        None => "warn",
    }
}

/// The output format selected by `SCHEMASYNC_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var(FORMAT_VAR).ok().as_deref())
}

fn resolve_format(requested: Option<&str>) -> &'static str {
    match requested.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// The `EnvFilter` directive for a level.
pub fn filter_directive(level: &str) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install a subscriber configured from the environment.
///
/// Does nothing unless `SCHEMASYNC_DEBUG` or `SCHEMASYNC_LOG_LEVEL` is set.
/// Only the first call has an effect.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(filter_directive(level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "schemasync logging initialized"
            );
        }
    });
}

/// Install a subscriber at the given level.
///
/// Sets `SCHEMASYNC_LOG_LEVEL`, so call it at startup before any threads
/// are spawned.
pub fn init_with_level(level: &str) {
    // SAFETY: called at startup, before other threads read the environment.
    unsafe {
        env::set_var(LEVEL_VAR, level);
    }
    init();
}

/// Install a subscriber at debug level.
///
/// Sets `SCHEMASYNC_DEBUG`, so call it at startup before any threads are
/// spawned.
pub fn init_debug() {
    // SAFETY: called at startup, before other threads read the environment.
    unsafe {
        env::set_var(DEBUG_VAR, "true");
    }
    init();
}
