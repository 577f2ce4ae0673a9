use crate::context::Context;
use crate::handler::Handler;
use crate::logger::Logger;
use crate::record::{Level, Record, Source};
use crate::trace::format_error;
use crate::value::{Attr, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record as SpanRecord};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns `tracing` events into [`Record`]s
/// and hands them to a [`Handler`].
///
/// Fields recorded on enclosing spans are added to each event's record,
/// outermost span first, followed by the event's own fields. The `message`
/// field becomes the record message. Records are handled synchronously on
/// the emitting thread with an empty [`Context`].
pub struct ContextLayer {
    handler: Arc<dyn Handler>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events the handler wrote successfully.
    pub written_events: Arc<AtomicU64>,
    /// Events the handler failed to write.
    pub failed_events: Arc<AtomicU64>,
}

impl ContextLayer {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            total_events: Arc::new(AtomicU64::new(0)),
            written_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Route events through `logger`'s handler chain.
    pub fn for_logger(logger: &Logger) -> Self {
        Self::new(Arc::clone(logger.handler()))
    }
}

impl fmt::Debug for ContextLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextLayer")
            .field("total_events", &self.total_events.load(Ordering::Relaxed))
            .field("written_events", &self.written_events.load(Ordering::Relaxed))
            .field("failed_events", &self.failed_events.load(Ordering::Relaxed))
            .finish()
    }
}

/// Span fields, stored in the span's extensions.
struct SpanFields(Vec<Attr>);

impl<S> Layer<S> for ContextLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: LayerContext<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Vec::new();
        let mut message = None;
        attrs.record(&mut FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        });
        if let Some(message) = message {
            fields.push(Attr::string("message", message));
        }
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &SpanRecord<'_>, ctx: LayerContext<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() else {
            return;
        };
        let mut message = None;
        values.record(&mut FieldVisitor {
            fields,
            message: &mut message,
        });
    }

    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let level = Level::from(*meta.level());
        let background = Context::background();
        if !self.handler.enabled(&background, level) {
            return;
        }

        let mut fields = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.iter().cloned());
                }
            }
        }

        let mut message = None;
        event.record(&mut FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        });

        let mut record = Record::new(level, message.unwrap_or_default());
        if let Some(file) = meta.file() {
            record = record.with_source(Source {
                function: meta.module_path().map(str::to_string),
                file: file.to_string(),
                line: meta.line().unwrap_or(0),
            });
        }
        record.add_attrs(fields);

        match self.handler.handle(&background, record) {
            Ok(()) => {
                self.written_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("ctxlog: failed to write tracing event: {}", e);
            }
        }
    }
}

/// Collects `tracing` fields as [`Attr`]s, pulling out `message`.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Vec<Attr>,
    pub message: &'a mut Option<String>,
}

impl FieldVisitor<'_> {
    fn push(&mut self, field: &Field, value: impl Into<Value>) {
        self.fields.push(Attr::new(field.name(), value));
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.push(field, value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, format_error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, format!("{:?}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{HandlerOptions, LogFormat};
    use crate::stack::TracedError;
    use crate::writer::SharedWriter;
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_carry_span_and_event_fields() {
        let buf = Buf::default();
        let logger = Logger::with_writer(
            HandlerOptions {
                format: LogFormat::Json,
                level: Level::DEBUG,
                ..HandlerOptions::default()
            },
            SharedWriter::new(buf.clone()),
        );
        let layer = ContextLayer::for_logger(&logger);
        let written = Arc::clone(&layer.written_events);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", request_id = "r-7", attempt = 2u64);
            let _guard = span.enter();
            tracing::info!(user = "ada", ok = true, "handled");
            tracing::trace!("below minimum");
        });

        let out = String::from_utf8_lossy(&buf.0.lock()).into_owned();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["msg"], "handled");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["request_id"], "r-7");
        assert_eq!(lines[0]["attempt"], 2);
        assert_eq!(lines[0]["user"], "ada");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(written.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn recorded_span_values_are_kept() {
        let buf = Buf::default();
        let logger = Logger::with_writer(
            HandlerOptions {
                format: LogFormat::Json,
                ..HandlerOptions::default()
            },
            SharedWriter::new(buf.clone()),
        );
        let subscriber = tracing_subscriber::registry().with(ContextLayer::for_logger(&logger));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("job", status = tracing::field::Empty);
            span.record("status", "running");
            let _guard = span.enter();
            tracing::warn!("slow");
        });

        let out = String::from_utf8_lossy(&buf.0.lock()).into_owned();
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["status"], "running");
        assert_eq!(line["level"], "WARN");
    }

    #[test]
    fn error_fields_expand_to_message_and_trace() {
        let buf = Buf::default();
        let logger = Logger::with_writer(
            HandlerOptions {
                format: LogFormat::Json,
                ..HandlerOptions::default()
            },
            SharedWriter::new(buf.clone()),
        );
        let subscriber = tracing_subscriber::registry().with(ContextLayer::for_logger(&logger));

        let err = TracedError::new("queue closed");
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(error = &err as &(dyn std::error::Error + 'static), "consumer stopped");
        });

        let out = String::from_utf8_lossy(&buf.0.lock()).into_owned();
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["error"]["message"], "queue closed");
        let trace = line["error"]["trace"].as_array().expect("trace array");
        assert!(!trace.is_empty());
    }
}
