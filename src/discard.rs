use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::record::{Level, Record};
use crate::value::Attr;
use std::sync::Arc;

/// A handler that drops every record.
///
/// Useful for measuring the overhead of the logger itself without any I/O,
/// and for code paths that must accept a logger but should stay silent.
#[derive(Clone, Copy, Default, Debug)]
pub struct DiscardHandler;

impl Handler for DiscardHandler {
    fn enabled(&self, _ctx: &Context, _level: Level) -> bool {
        false
    }

    fn handle(&self, _ctx: &Context, _record: Record) -> Result<(), HandlerError> {
        Ok(())
    }

    fn with_attrs(&self, _attrs: Vec<Attr>) -> Arc<dyn Handler> {
        Arc::new(DiscardHandler)
    }

    fn with_group(&self, _name: &str) -> Arc<dyn Handler> {
        Arc::new(DiscardHandler)
    }
}
