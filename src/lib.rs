//! Context-scoped structured logging.
//!
//! Attrs attached to a [`Context`] with [`attach`] appear on every record
//! logged through that context. At encode time a [`Rewriter`] normalizes
//! timestamps, renames fields for the target consumer (generic, AWS or GCP)
//! and expands errors into a message plus a stack trace.
//!
//! ```no_run
//! use ctxlog::{attach, Attr, Context, HandlerOptions};
//!
//! ctxlog::init(HandlerOptions::default());
//! let ctx = attach(&Context::background(), "request_id", "r-42");
//! ctxlog::info(&ctx, "request accepted", &[Attr::int("bytes", 512)]);
//! ```

pub mod context;
pub mod discard;
pub mod enrich;
pub mod env;
pub mod error;
pub mod handler;
pub mod init;
pub mod layer;
pub mod logger;
pub mod options;
pub mod platform;
pub mod record;
pub mod rewrite;
pub mod stack;
pub mod stream;
pub mod trace;
pub mod value;
pub mod writer;

pub use context::{attach, lookup, AttrStore, Context};
pub use discard::DiscardHandler;
pub use enrich::ContextHandler;
pub use error::{ConfigError, HandlerError, InitError};
pub use handler::Handler;
pub use init::{init, init_detect, init_from_env, init_tracing};
pub use layer::ContextLayer;
pub use logger::{
    critical, debug, default_logger, error, fatal, info, set_default, warn, Logger,
};
pub use options::{HandlerOptions, LogFormat};
pub use platform::{Platform, PlatformProbe};
pub use record::{Level, Record, Source};
pub use rewrite::{replace_attr, Flavor, ReplaceAttr, Rewriter};
pub use stack::{ResultExt, StackTrace, StackTracer, TracedError};
pub use stream::{StreamHandler, StreamOptions};
pub use trace::{format_error, format_traced};
pub use value::{Attr, Value};
pub use writer::{output, set_output, SharedWriter};
