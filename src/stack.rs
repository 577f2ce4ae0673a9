//! Errors that remember where they were created.
//!
//! [`TracedError`] captures the program counters of the current call stack
//! when it is constructed. Symbolization is deferred until the error is
//! logged, see [`format_error`](crate::trace::format_error).

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Program counters of a captured call stack, innermost frame first.
#[derive(Clone)]
pub struct StackTrace {
    pcs: Arc<[usize]>,
}

impl StackTrace {
    /// Capture the current call stack without resolving symbols.
    #[inline(never)]
    pub fn capture() -> Self {
        let mut pcs = Vec::with_capacity(32);
        backtrace::trace(|frame| {
            pcs.push(frame.ip() as usize);
            true
        });
        Self { pcs: pcs.into() }
    }

    /// A stack trace made of known program counters.
    pub fn from_pcs(pcs: Vec<usize>) -> Self {
        Self { pcs: pcs.into() }
    }

    pub fn pcs(&self) -> &[usize] {
        &self.pcs
    }

    pub fn len(&self) -> usize {
        self.pcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcs.is_empty()
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("frames", &self.pcs.len())
            .finish()
    }
}

/// Capability of errors that carry a captured call stack.
///
/// [`TracedError`] is found anywhere in an error's `source()` chain. Other
/// implementors hand their stack over where they are logged, through
/// [`Value::traced`](crate::Value::traced) or
/// [`format_traced`](crate::trace::format_traced).
pub trait StackTracer {
    fn stack_trace(&self) -> &StackTrace;
}

/// An error with a call stack captured at construction.
pub struct TracedError {
    message: Option<String>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
    stack: StackTrace,
}

impl TracedError {
    /// A new error with `message` and the current stack.
    #[inline(never)]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            source: None,
            stack: StackTrace::capture(),
        }
    }

    /// Wrap `err` with a message; displays as `"{message}: {err}"`.
    #[inline(never)]
    pub fn wrap<E>(err: E, message: impl Into<String>) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            message: Some(message.into()),
            source: Some(err.into()),
            stack: StackTrace::capture(),
        }
    }

    /// Keep the stack `err` already carries, without changing its message.
    pub fn from_tracer<E>(err: E) -> Self
    where
        E: Error + StackTracer + Send + Sync + 'static,
    {
        Self {
            message: None,
            stack: err.stack_trace().clone(),
            source: Some(Box::new(err)),
        }
    }

    /// Attach the current stack to `err` without changing its message.
    #[inline(never)]
    pub fn with_stack<E>(err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            message: None,
            source: Some(err.into()),
            stack: StackTrace::capture(),
        }
    }
}

impl StackTracer for TracedError {
    fn stack_trace(&self) -> &StackTrace {
        &self.stack
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, &self.source) {
            (Some(message), Some(source)) => write!(f, "{message}: {source}"),
            (Some(message), None) => f.write_str(message),
            (None, Some(source)) => write!(f, "{source}"),
            (None, None) => Ok(()),
        }
    }
}

impl fmt::Debug for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedError")
            .field("message", &self.to_string())
            .field("stack", &self.stack)
            .finish()
    }
}

impl Error for TracedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}

/// Shorthands for attaching stacks to `Result` errors.
pub trait ResultExt<T> {
    fn traced(self) -> Result<T, TracedError>;
    fn wrap_err(self, message: impl Into<String>) -> Result<T, TracedError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Box<dyn Error + Send + Sync + 'static>>,
{
    #[inline(never)]
    fn traced(self) -> Result<T, TracedError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(TracedError::with_stack(e)),
        }
    }

    #[inline(never)]
    fn wrap_err(self, message: impl Into<String>) -> Result<T, TracedError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(TracedError::wrap(e, message)),
        }
    }
}

const CAPTURE_PREFIXES: &[&str] = &[
    "backtrace::",
    concat!(module_path!(), "::StackTrace::"),
    concat!(module_path!(), "::TracedError::"),
    concat!(module_path!(), "::ResultExt"),
];

/// Whether a symbol name belongs to the stack capture itself rather than
/// to the code that created the error.
pub(crate) fn is_capture_frame(function: &str) -> bool {
    // `<path::Type>::method` and `<T as path::Trait<U>>::method` both reduce
    // to plain paths once the angle brackets are gone.
    let name: String = function.chars().filter(|c| !matches!(c, '<' | '>')).collect();
    CAPTURE_PREFIXES
        .iter()
        .any(|p| name.starts_with(p) || name.contains(&format!(" as {p}")))
}
