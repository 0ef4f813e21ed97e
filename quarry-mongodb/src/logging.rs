//! Logging setup.
//!
//! The library only emits `tracing` events. Installing a subscriber is the
//! application's choice; [`init`] provides one, controlled by environment
//! variables, when the `tracing-subscriber` feature is enabled.
//!
//! # Environment Variables
//!
//! - `QUARRY_DEBUG=true|1|yes` - Enable debug logging
//! - `QUARRY_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use quarry_mongodb::logging;
//!
//! // Call once at startup; later calls are no-ops.
//! logging::init();
//! ```
//!
//! Events emitted by the crate:
//!
//! - `info` when a client is created or shut down,
//! - `debug` with the namespace and rendered pipeline before each aggregation,
//! - `warn` when a stored value cannot be coerced into its field type.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Enables debug logging.
pub const DEBUG_VAR: &str = "QUARRY_DEBUG";
/// Overrides the log level.
pub const LEVEL_VAR: &str = "QUARRY_LOG_LEVEL";
/// Selects the output format.
pub const FORMAT_VAR: &str = "QUARRY_LOG_FORMAT";

fn truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Level for the given `QUARRY_DEBUG` and `QUARRY_LOG_LEVEL` values.
///
/// An unknown level falls back to the debug flag: `debug` when set,
/// `warn` otherwise.
pub fn resolve_level(debug: Option<&str>, level: Option<&str>) -> &'static str {
    let debug = debug.is_some_and(truthy);
    let fallback = if debug { "debug" } else { "warn" };
    match level.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

/// Format for the given `QUARRY_LOG_FORMAT` value.
pub fn resolve_format(format: Option<&str>) -> &'static str {
    match format.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// Whether `QUARRY_DEBUG` enables debug logging.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR).is_ok_and(|v| truthy(&v))
}

/// The configured log level.
pub fn get_log_level() -> &'static str {
    resolve_level(
        env::var(DEBUG_VAR).ok().as_deref(),
        env::var(LEVEL_VAR).ok().as_deref(),
    )
}

/// The configured log format.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var(FORMAT_VAR).ok().as_deref())
}

/// Install the subscriber if `QUARRY_DEBUG` or `QUARRY_LOG_LEVEL` asks for
/// logging. Runs at most once per process.
pub fn init() {
    if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
        return;
    }
    install(get_log_level(), get_log_format());
}

/// Install the subscriber at `level`, ignoring `QUARRY_LOG_LEVEL`.
pub fn init_with_level(level: &str) {
    install(resolve_level(None, Some(level)), get_log_format());
}

#[cfg_attr(not(feature = "tracing-subscriber"), allow(unused_variables))]
fn install(level: &'static str, format: &'static str) {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(format!("quarry={level},quarry_mongodb={level}"))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let installed = match format {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(log_level = level, log_format = format, "quarry logging initialized");
            }
        }
    });
}
