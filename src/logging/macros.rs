//! Logging macros
//!
//! Thin wrappers so the CLI layer can log without importing `tracing` directly.
//! Each expands to a `()` expression, so they also work as match-arm bodies.

/// Log an informational message on the user-facing channel
#[macro_export]
macro_rules! log_stderr {
    ($($arg:tt)*) => {{
        tracing::info!($($arg)*)
    }};
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        tracing::debug!($($arg)*)
    }};
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        tracing::warn!($($arg)*)
    }};
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        tracing::error!($($arg)*)
    }};
}
