use crate::error::ConfigError;
use crate::value::{Attr, Value};
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::panic::Location;
use std::str::FromStr;

/// Key of the built-in timestamp attr.
pub const TIME_KEY: &str = "time";
/// Key of the built-in level attr.
pub const LEVEL_KEY: &str = "level";
/// Key of the built-in message attr.
pub const MESSAGE_KEY: &str = "msg";
/// Key of the built-in source location attr.
pub const SOURCE_KEY: &str = "source";

/// Severity of a record.
///
/// Levels are plain integers so that intermediate levels are expressible;
/// the named constants are four apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub i32);

impl Level {
    pub const DEBUG: Level = Level(-4);
    pub const INFO: Level = Level(0);
    pub const WARN: Level = Level(4);
    pub const ERROR: Level = Level(8);
    pub const CRITICAL: Level = Level(12);
    /// Alias of [`Level::CRITICAL`].
    pub const FATAL: Level = Level::CRITICAL;

    fn base(self) -> (&'static str, Level) {
        if self < Level::INFO {
            ("DEBUG", Level::DEBUG)
        } else if self < Level::WARN {
            ("INFO", Level::INFO)
        } else if self < Level::ERROR {
            ("WARN", Level::WARN)
        } else if self < Level::CRITICAL {
            ("ERROR", Level::ERROR)
        } else {
            ("CRITICAL", Level::CRITICAL)
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::INFO
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, base) = self.base();
        let delta = self.0 - base.0;
        if delta == 0 {
            f.write_str(name)
        } else {
            write!(f, "{name}{delta:+}")
        }
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    /// Parses `debug`, `INFO`, `warn+2`, `error-1`, `fatal`...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(['+', '-']).unwrap_or(s.len());
        let (name, offset) = s.split_at(split);
        let base = match name.to_ascii_uppercase().as_str() {
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARN" | "WARNING" => Level::WARN,
            "ERROR" => Level::ERROR,
            "CRITICAL" | "FATAL" => Level::CRITICAL,
            _ => return Err(ConfigError::InvalidLevel(s.to_string())),
        };
        let offset = if offset.is_empty() {
            0
        } else {
            offset
                .parse::<i32>()
                .map_err(|_| ConfigError::InvalidLevel(s.to_string()))?
        };
        base.0
            .checked_add(offset)
            .map(Level)
            .ok_or_else(|| ConfigError::InvalidLevel(s.to_string()))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::ERROR,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::DEBUG => Level::DEBUG,
            tracing::Level::TRACE => Level(Level::DEBUG.0 - 4),
        }
    }
}

/// Call site of a log statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub function: Option<String>,
    pub file: String,
    pub line: u32,
}

impl Source {
    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            function: None,
            file: location.file().to_string(),
            line: location.line(),
        }
    }

    /// The source as a group value, the shape encoders and rewriters see.
    pub fn to_value(&self) -> Value {
        let mut attrs = Vec::with_capacity(3);
        if let Some(function) = &self.function {
            attrs.push(Attr::string("function", function.clone()));
        }
        attrs.push(Attr::string("file", self.file.clone()));
        attrs.push(Attr::new("line", self.line));
        Value::Group(attrs)
    }
}

/// A single log event on its way to a handler.
///
/// Records are handed to [`Handler::handle`](crate::handler::Handler::handle)
/// by value; a handler that adds attrs works on its own copy.
#[derive(Debug, Clone)]
pub struct Record {
    pub time: DateTime<FixedOffset>,
    pub level: Level,
    pub message: String,
    pub source: Option<Source>,
    attrs: Vec<Attr>,
}

impl Record {
    /// Create a record stamped with the current local time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: Local::now().fixed_offset(),
            level,
            message: message.into(),
            source: None,
            attrs: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn add_attr(&mut self, attr: Attr) {
        self.attrs.push(attr);
    }

    pub fn add_attrs(&mut self, attrs: impl IntoIterator<Item = Attr>) {
        self.attrs.extend(attrs);
    }

    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    pub fn num_attrs(&self) -> usize {
        self.attrs.len()
    }

    pub(crate) fn into_attrs(self) -> Vec<Attr> {
        self.attrs
    }
}
