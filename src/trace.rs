use crate::stack::{is_capture_frame, StackTrace, StackTracer, TracedError};
use crate::value::{Attr, Value};
use std::error::Error;

/// Key of the error text inside an expanded error group.
pub const ERROR_MESSAGE_KEY: &str = "message";
/// Key of the frame list inside an expanded error group.
pub const ERROR_TRACE_KEY: &str = "trace";

/// A symbolized frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Expand an error into `{message, trace?}`.
///
/// `trace` is present when some error in the `source()` chain is a
/// [`TracedError`]. When several are, the one closest to the root cause
/// wins. Other [`StackTracer`] types are recognized once wrapped with
/// [`Value::traced`] or when passed to [`format_traced`].
pub fn format_error(err: &(dyn Error + 'static)) -> Value {
    expand(err, innermost_stack(err))
}

/// Expand an error that carries its own stack.
///
/// A [`TracedError`] deeper in the `source()` chain still takes precedence.
pub fn format_traced<E>(err: &E) -> Value
where
    E: Error + StackTracer + 'static,
{
    expand(err, innermost_stack(err).or(Some(err.stack_trace())))
}

fn expand(err: &(dyn Error + 'static), stack: Option<&StackTrace>) -> Value {
    let mut group = vec![Attr::string(ERROR_MESSAGE_KEY, err.to_string())];

    if let Some(stack) = stack {
        let lines = trace_lines(stack.pcs(), resolve_frame);
        group.push(Attr::any(ERROR_TRACE_KEY, &lines));
    }

    Value::Group(group)
}

fn innermost_stack<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a StackTrace> {
    let mut found = None;
    let mut cur = Some(err);
    while let Some(e) = cur {
        if let Some(traced) = e.downcast_ref::<TracedError>() {
            found = Some(traced.stack_trace());
        }
        cur = e.source();
    }
    found
}

/// Turn raw program counters (innermost first) into trace lines, outermost
/// call site first.
///
/// Leading capture frames are dropped until the first frame that is not
/// part of the capture; an unresolvable frame prints as `unknown` and also
/// ends the trimming.
pub(crate) fn trace_lines<R>(pcs: &[usize], mut resolve: R) -> Vec<String>
where
    R: FnMut(usize) -> Option<FrameInfo>,
{
    let mut lines = Vec::with_capacity(pcs.len());
    let mut skipping = true;

    for &pc in pcs {
        let Some(frame) = resolve(pc) else {
            lines.push("unknown".to_string());
            skipping = false;
            continue;
        };

        if skipping && is_capture_frame(&frame.function) {
            continue;
        }
        skipping = false;

        lines.push(format!("{} {}:{}", frame.function, frame.file, frame.line));
    }

    lines.reverse();
    lines
}

fn resolve_frame(pc: usize) -> Option<FrameInfo> {
    let mut info = None;
    backtrace::resolve(pc as *mut std::ffi::c_void, |symbol| {
        if info.is_some() {
            return;
        }
        if let Some(name) = symbol.name() {
            info = Some(FrameInfo {
                function: format!("{name:#}"),
                file: symbol
                    .filename()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "?".to_string()),
                line: symbol.lineno().unwrap_or(0),
            });
        }
    });
    info
}
