use crate::env::{
    env_opt, env_or, CTXLOG_ADD_SOURCE_ENV, CTXLOG_ENABLE_AWS_ENV, CTXLOG_ENABLE_GCP_ENV,
    CTXLOG_FORMAT_ENV, CTXLOG_LEVEL_ENV, CTXLOG_TIME_FORMAT_ENV,
};
use crate::error::ConfigError;
use crate::record::Level;
use crate::rewrite::{ReplaceAttr, Rewriter, RFC3339};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encoding of written records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        })
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "logfmt" => Ok(LogFormat::Text),
            _ => Err(ConfigError::InvalidFormat(s.to_string())),
        }
    }
}

/// Logger configuration, consumed once at construction.
///
/// **Fields**
/// - `add_source`: emit the calling file and line as `source`.
/// - `level`: minimum level, `INFO` by default.
/// - `replace_attr`: attribute rewriter for the generic handler. `None`
///   means the stock generic [`Rewriter`] with `time_format`. Platform
///   handlers always use their own rewriter.
/// - `time_format`: strftime layout of `time`, RFC3339 by default; empty
///   keeps the encoder's native format.
/// - `format`: JSON or text, text by default.
/// - `enable_aws` / `enable_gcp`: allow [`Logger::detect`] and
///   [`init_detect`] to probe for the platform. Sync constructors ignore them.
///
/// [`Logger::detect`]: crate::Logger::detect
/// [`init_detect`]: crate::init_detect
#[derive(Clone)]
pub struct HandlerOptions {
    pub add_source: bool,
    pub level: Level,
    pub replace_attr: Option<ReplaceAttr>,
    pub time_format: String,
    pub format: LogFormat,
    pub enable_aws: bool,
    pub enable_gcp: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            add_source: false,
            level: Level::INFO,
            replace_attr: None,
            time_format: RFC3339.to_string(),
            format: LogFormat::Text,
            enable_aws: false,
            enable_gcp: false,
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("add_source", &self.add_source)
            .field("level", &self.level)
            .field("replace_attr", &self.replace_attr.as_ref().map(|_| "custom"))
            .field("time_format", &self.time_format)
            .field("format", &self.format)
            .field("enable_aws", &self.enable_aws)
            .field("enable_gcp", &self.enable_gcp)
            .finish()
    }
}

impl HandlerOptions {
    /// Defaults overridden by the `CTXLOG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            add_source: env_bool(CTXLOG_ADD_SOURCE_ENV, defaults.add_source)?,
            level: env_or(CTXLOG_LEVEL_ENV, "info").parse()?,
            replace_attr: None,
            time_format: env_or(CTXLOG_TIME_FORMAT_ENV, &defaults.time_format),
            format: env_or(CTXLOG_FORMAT_ENV, "text").parse()?,
            enable_aws: env_bool(CTXLOG_ENABLE_AWS_ENV, defaults.enable_aws)?,
            enable_gcp: env_bool(CTXLOG_ENABLE_GCP_ENV, defaults.enable_gcp)?,
        })
    }

    /// The rewriter the generic handler will use.
    pub fn generic_replace_attr(&self) -> ReplaceAttr {
        match &self.replace_attr {
            Some(replace) => replace.clone(),
            None => Rewriter::generic(self.time_format.clone()).into_replace_attr(),
        }
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool { key, value }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
