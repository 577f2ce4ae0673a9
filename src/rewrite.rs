//! Per-attribute rewriting applied when a record is encoded.
//!
//! A [`ReplaceAttr`] function sees every non-group attr (built-ins with an
//! empty group path) and returns the attr to encode. [`Rewriter`] is the
//! stock implementation, with one [`Flavor`] per log consumer.

use crate::record::{LEVEL_KEY, MESSAGE_KEY, SOURCE_KEY, TIME_KEY};
use crate::trace::format_error;
use crate::value::{Attr, Value, SOURCE_TIME_FORMAT};
use chrono::{DateTime, Utc};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Rewrites one attr. Receives the names of the enclosing groups.
///
/// Returning an attr with an empty key and a non-group value drops it.
pub type ReplaceAttr = Arc<dyn Fn(&[String], Attr) -> Attr + Send + Sync>;

/// `2006-01-02T15:04:05+07:00` style.
pub const RFC3339: &str = "%Y-%m-%dT%H:%M:%S%:z";
/// RFC3339 with as many fractional digits as needed.
pub const RFC3339_NANO: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";
/// Calendar date only.
pub const DATE_ONLY: &str = "%Y-%m-%d";
/// Wall clock only.
pub const TIME_ONLY: &str = "%H:%M:%S";
/// Time layout written for AWS consumers (always UTC).
pub const AWS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
/// Time layout written for Cloud Logging (always UTC).
pub const GCP_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Key Cloud Logging reads the severity from.
pub const GCP_SEVERITY_KEY: &str = "severity";
/// Key Cloud Logging reads the source location from.
pub const GCP_SOURCE_KEY: &str = "logging.googleapis.com/sourceLocation";
/// Message key used by the AWS and GCP flavors.
pub const PLATFORM_MESSAGE_KEY: &str = "message";

/// The log consumer a [`Rewriter`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Generic,
    Aws,
    Gcp,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Flavor::Generic => "generic",
            Flavor::Aws => "aws",
            Flavor::Gcp => "gcp",
        })
    }
}

/// Stock attribute rewriter: time normalization, key renames and error
/// expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewriter {
    flavor: Flavor,
    time_format: String,
}

impl Rewriter {
    /// Reformat times with `time_format`; an empty format leaves them alone.
    pub fn generic(time_format: impl Into<String>) -> Self {
        Self {
            flavor: Flavor::Generic,
            time_format: time_format.into(),
        }
    }

    pub fn aws() -> Self {
        Self {
            flavor: Flavor::Aws,
            time_format: AWS_TIME_FORMAT.to_string(),
        }
    }

    pub fn gcp() -> Self {
        Self {
            flavor: Flavor::Gcp,
            time_format: GCP_TIME_FORMAT.to_string(),
        }
    }

    pub fn for_flavor(flavor: Flavor, time_format: impl Into<String>) -> Self {
        match flavor {
            Flavor::Generic => Self::generic(time_format),
            Flavor::Aws => Self::aws(),
            Flavor::Gcp => Self::gcp(),
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    pub fn rewrite(&self, _groups: &[String], attr: Attr) -> Attr {
        let platform = self.flavor != Flavor::Generic;
        let gcp = self.flavor == Flavor::Gcp;

        if attr.key == TIME_KEY && !self.time_format.is_empty() {
            return self.reformat_time(attr);
        }
        if attr.key == MESSAGE_KEY && platform {
            return Attr::new(PLATFORM_MESSAGE_KEY, attr.value);
        }
        if attr.key == LEVEL_KEY && gcp {
            return Attr::new(GCP_SEVERITY_KEY, attr.value);
        }
        if attr.key == SOURCE_KEY && gcp && attr.value.is_group() {
            return Attr::new(GCP_SOURCE_KEY, attr.value);
        }

        match &attr.value {
            Value::Error(err) => Attr::new(attr.key, format_error(&**err)),
            _ => attr,
        }
    }

    /// Wrap this rewriter into a [`ReplaceAttr`].
    pub fn into_replace_attr(self) -> ReplaceAttr {
        Arc::new(move |groups, attr| self.rewrite(groups, attr))
    }

    fn reformat_time(&self, attr: Attr) -> Attr {
        let parsed = match &attr.value {
            Value::Time(t) => *t,
            Value::String(s) => match DateTime::parse_from_str(s, SOURCE_TIME_FORMAT) {
                Ok(t) => t,
                Err(_) => return attr,
            },
            _ => return attr,
        };

        // An invalid layout makes the formatter fail; keep the attr as is.
        let mut formatted = String::new();
        let written = match self.flavor {
            Flavor::Generic => write!(formatted, "{}", parsed.format(&self.time_format)),
            Flavor::Aws | Flavor::Gcp => write!(
                formatted,
                "{}",
                parsed.with_timezone(&Utc).format(&self.time_format)
            ),
        };
        match written {
            Ok(()) => Attr::new(attr.key, formatted),
            Err(_) => attr,
        }
    }
}

/// The generic rewriter with RFC3339 times.
pub fn replace_attr() -> ReplaceAttr {
    Rewriter::generic(RFC3339).into_replace_attr()
}

/// A rewriter that returns every attr unchanged.
pub fn passthrough() -> ReplaceAttr {
    Arc::new(|_, attr| attr)
}
