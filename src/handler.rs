use crate::context::Context;
use crate::error::HandlerError;
use crate::record::{Level, Record};
use crate::value::Attr;
use std::sync::Arc;

/// Destination for [`Record`]s produced by a [`Logger`](crate::Logger).
///
/// Handlers form a chain: decorators such as
/// [`ContextHandler`](crate::enrich::ContextHandler) adjust records and
/// delegate, sinks such as [`StreamHandler`](crate::stream::StreamHandler)
/// encode and write them. All methods run synchronously on the caller's
/// thread.
pub trait Handler: Send + Sync {
    /// Report whether a record at `level` would be handled.
    ///
    /// Called before the record is built, so it must be cheap.
    fn enabled(&self, ctx: &Context, level: Level) -> bool;

    /// Handle a single record.
    ///
    /// **Returns**
    /// - `Ok(())` once the record was written (or deliberately dropped).
    /// - `Err(..)` if encoding or writing failed. Decorators must pass the
    ///   error of the handler they wrap through unchanged.
    fn handle(&self, ctx: &Context, record: Record) -> Result<(), HandlerError>;

    /// A handler whose records all carry `attrs` in addition to their own.
    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn Handler>;

    /// A handler that nests every later attr (from `with_attrs` or from
    /// records) under `name`.
    fn with_group(&self, name: &str) -> Arc<dyn Handler>;
}
