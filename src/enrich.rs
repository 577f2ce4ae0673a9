use crate::context::{lookup, Context};
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::record::{Level, Record};
use crate::value::Attr;
use std::sync::Arc;

/// Decorator that merges the context's attribute store into every record.
///
/// Attrs bound with [`Handler::with_attrs`] are established once on the
/// wrapped handler; attrs from [`attach`](crate::attach) are read from the
/// context on every call. Both end up on the written record.
#[derive(Clone)]
pub struct ContextHandler {
    inner: Arc<dyn Handler>,
}

impl ContextHandler {
    pub fn new(inner: Arc<dyn Handler>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn Handler> {
        &self.inner
    }
}

impl Handler for ContextHandler {
    fn enabled(&self, ctx: &Context, level: Level) -> bool {
        self.inner.enabled(ctx, level)
    }

    fn handle(&self, ctx: &Context, mut record: Record) -> Result<(), HandlerError> {
        if let Some(store) = lookup(ctx) {
            record.add_attrs(store.attrs());
        }
        self.inner.handle(ctx, record)
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn Handler> {
        Arc::new(ContextHandler::new(self.inner.with_attrs(attrs)))
    }

    fn with_group(&self, name: &str) -> Arc<dyn Handler> {
        Arc::new(ContextHandler::new(self.inner.with_group(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::attach;
    use crate::value::Value;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// Records what reaches it, including attrs bound via `with_attrs`.
    #[derive(Clone, Default)]
    struct Recorder {
        bound: Vec<Attr>,
        seen: Arc<Mutex<Vec<Vec<Attr>>>>,
        fail: bool,
    }

    impl Handler for Recorder {
        fn enabled(&self, _ctx: &Context, level: Level) -> bool {
            level >= Level::INFO
        }

        fn handle(&self, _ctx: &Context, record: Record) -> Result<(), HandlerError> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into());
            }
            let mut attrs = self.bound.clone();
            attrs.extend(record.into_attrs());
            self.seen.lock().push(attrs);
            Ok(())
        }

        fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn Handler> {
            let mut next = self.clone();
            next.bound.extend(attrs);
            Arc::new(next)
        }

        fn with_group(&self, _name: &str) -> Arc<dyn Handler> {
            Arc::new(self.clone())
        }
    }

    fn as_map(attrs: &[Attr]) -> BTreeMap<String, String> {
        attrs
            .iter()
            .map(|a| (a.key.clone(), a.value.to_string()))
            .collect()
    }

    #[test]
    fn merges_context_attrs_after_record_attrs() {
        let recorder = Recorder::default();
        let handler = ContextHandler::new(Arc::new(recorder.clone()));

        let ctx = attach(&Context::background(), "user", "ann");
        let ctx = attach(&ctx, "tenant", 7);

        let mut record = Record::new(Level::INFO, "hello");
        record.add_attr(Attr::new("call", true));
        handler.handle(&ctx, record).unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].key, "call");
        let map = as_map(&seen[0]);
        assert_eq!(map.len(), 3);
        assert_eq!(map["user"], "ann");
        assert_eq!(map["tenant"], "7");
    }

    #[test]
    fn with_attrs_keeps_static_and_context_attrs() {
        let recorder = Recorder::default();
        let handler = ContextHandler::new(Arc::new(recorder.clone()))
            .with_attrs(vec![Attr::string("project_id", "p1")]);

        let ctx = attach(&Context::background(), "request", "r1");
        handler.handle(&ctx, Record::new(Level::INFO, "m")).unwrap();

        let map = as_map(&recorder.seen.lock()[0]);
        assert_eq!(map["project_id"], "p1");
        assert_eq!(map["request"], "r1");
    }

    #[test]
    fn enabled_is_delegated() {
        let handler = ContextHandler::new(Arc::new(Recorder::default()));
        let ctx = Context::background();
        assert!(!handler.enabled(&ctx, Level::DEBUG));
        assert!(handler.enabled(&ctx, Level::ERROR));
    }

    #[test]
    fn inner_error_is_propagated() {
        let handler = ContextHandler::new(Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        }));
        let err = handler
            .handle(&Context::background(), Record::new(Level::INFO, "m"))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn context_without_store_passes_record_through() {
        let recorder = Recorder::default();
        let handler = ContextHandler::new(Arc::new(recorder.clone()));
        let mut record = Record::new(Level::INFO, "m");
        record.add_attr(Attr::new("only", Value::Bool(true)));
        handler.handle(&Context::background(), record).unwrap();
        assert_eq!(recorder.seen.lock()[0].len(), 1);
    }
}
