//! Gated logging macros and logger setup.
//!
//! Every module that logs through these macros defines two consts:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "kiosk::sampling";
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("sampling started for run {}", run_id);
//! ```
//! Records carry `LOG_TARGET` so `RUST_LOG=kiosk::sampling=debug` narrows
//! output to one component.

use log::LevelFilter;

/// Env var that switches the default filter from `info` to `debug`.
pub const DEBUG_ENV_VAR: &str = "KIOSK_DEBUG";

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::error!(target: LOG_TARGET, $($arg)*);
        }
    };
}

pub fn debug_enabled_from_env() -> bool {
    std::env::var(DEBUG_ENV_VAR)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Installs the global logger. `RUST_LOG` still overrides per-target levels.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
