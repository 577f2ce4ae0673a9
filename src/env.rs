//! Environment variable names used by [`HandlerOptions::from_env`].
//!
//! These are purely helpers; handlers themselves never read the
//! environment.
//!
//! [`HandlerOptions::from_env`]: crate::options::HandlerOptions::from_env

/// Minimum level, e.g. `debug`, `info`, `warn+2`.
pub const CTXLOG_LEVEL_ENV: &str = "CTXLOG_LEVEL";

/// Output format, `json` or `text`.
pub const CTXLOG_FORMAT_ENV: &str = "CTXLOG_FORMAT";

/// strftime-style layout for the `time` field.
pub const CTXLOG_TIME_FORMAT_ENV: &str = "CTXLOG_TIME_FORMAT";

/// Whether to emit the call site as `source`.
pub const CTXLOG_ADD_SOURCE_ENV: &str = "CTXLOG_ADD_SOURCE";

/// Enable AWS platform detection.
pub const CTXLOG_ENABLE_AWS_ENV: &str = "CTXLOG_ENABLE_AWS";

/// Enable GCP platform detection.
pub const CTXLOG_ENABLE_GCP_ENV: &str = "CTXLOG_ENABLE_GCP";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an optional environment variable, treating empty as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
