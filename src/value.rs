use crate::stack::{StackTracer, TracedError};
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Layout used to render [`Value::Time`] as text before a rewriter sees it,
/// and to parse textual times back.
pub const SOURCE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// A value carried by an [`Attr`].
///
/// The set of variants is closed so that rewriters and encoders can match
/// exhaustively. [`Value::Any`] is the escape hatch for structured data the
/// enrichment layer does not special-case.
#[derive(Clone)]
pub enum Value {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Time(DateTime<FixedOffset>),
    Duration(Duration),
    Error(Arc<dyn Error + Send + Sync + 'static>),
    Group(Vec<Attr>),
    Any(serde_json::Value),
}

impl Value {
    /// Wrap an error. Errors are expanded by the attribute rewriters.
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Value::Error(Arc::new(err))
    }

    /// Wrap an error that carries its own stack, keeping that stack for the
    /// `trace` of the expanded error.
    pub fn traced<E>(err: E) -> Self
    where
        E: Error + StackTracer + Send + Sync + 'static,
    {
        Value::Error(Arc::new(TracedError::from_tracer(err)))
    }

    /// Serialize `value` into an opaque [`Value::Any`].
    ///
    /// Values that fail to serialize become their error text.
    pub fn any<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Value::Any(v),
            Err(e) => Value::String(format!("!ERROR:{e}")),
        }
    }

    /// Short name of the variant, mostly for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Time(_) => "time",
            Value::Duration(_) => "duration",
            Value::Error(_) => "error",
            Value::Group(_) => "group",
            Value::Any(_) => "any",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&[Attr]> {
        match self {
            Value::Group(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Value::Group(_))
    }

    /// Returns the wrapped error, if this value is one.
    pub fn as_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Value::Error(err) => Some(&**err),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Time(t) => write!(f, "{}", t.format(SOURCE_TIME_FORMAT)),
            Value::Duration(d) => write!(f, "{d:?}"),
            Value::Error(err) => write!(f, "{err}"),
            Value::Group(attrs) => {
                f.write_str("[")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}={}", attr.key, attr.value)?;
                }
                f.write_str("]")
            }
            Value::Any(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Group(attrs) => f.debug_tuple("Group").field(attrs).finish(),
            Value::Error(err) => f.debug_tuple("Error").field(&err.to_string()).finish(),
            other => write!(f, "{}({})", other.kind(), other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Uint(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Time(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Duration(d) => {
                serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            }
            Value::Error(err) => serializer.collect_str(err),
            Value::Group(attrs) => AttrMap(attrs).serialize(serializer),
            Value::Any(v) => v.serialize(serializer),
        }
    }
}

/// Serializes a slice of attrs as a JSON object, keeping order and
/// duplicate keys.
pub(crate) struct AttrMap<'a>(pub &'a [Attr]);

impl Serialize for AttrMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for attr in self.0 {
            map.serialize_entry(&attr.key, &attr.value)?;
        }
        map.end()
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v as $target)
                }
            }
        )*
    };
}

value_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    isize => Int as i64,
    u8 => Uint as u64,
    u16 => Uint as u64,
    u32 => Uint as u64,
    u64 => Uint as u64,
    usize => Uint as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::Time(v.fixed_offset())
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<Vec<Attr>> for Value {
    fn from(v: Vec<Attr>) -> Self {
        Value::Group(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Any(v)
    }
}

impl From<TracedError> for Value {
    fn from(v: TracedError) -> Self {
        Value::Error(Arc::new(v))
    }
}

impl From<Arc<dyn Error + Send + Sync + 'static>> for Value {
    fn from(v: Arc<dyn Error + Send + Sync + 'static>) -> Self {
        Value::Error(v)
    }
}

impl From<Box<dyn Error + Send + Sync + 'static>> for Value {
    fn from(v: Box<dyn Error + Send + Sync + 'static>) -> Self {
        Value::Error(Arc::from(v))
    }
}

/// A key/value pair attached to a log record.
#[derive(Clone, Debug)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Value::String(value.into()))
    }

    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, Value::Int(value))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, Value::Bool(value))
    }

    /// An attr holding an error value.
    pub fn error<E>(key: impl Into<String>, err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::new(key, Value::error(err))
    }

    /// An attr holding an error with its own captured stack.
    pub fn traced<E>(key: impl Into<String>, err: E) -> Self
    where
        E: Error + StackTracer + Send + Sync + 'static,
    {
        Self::new(key, Value::traced(err))
    }

    pub fn group(key: impl Into<String>, attrs: Vec<Attr>) -> Self {
        Self::new(key, Value::Group(attrs))
    }

    pub fn any<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> Self {
        Self::new(key, Value::any(value))
    }
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for Attr {
    fn from((key, value): (K, V)) -> Self {
        Attr::new(key, value)
    }
}
