use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::options::LogFormat;
use crate::record::{Level, Record, LEVEL_KEY, MESSAGE_KEY, SOURCE_KEY, TIME_KEY};
use crate::rewrite::ReplaceAttr;
use crate::value::{Attr, AttrMap, Value};
use crate::writer::SharedWriter;
use chrono::SecondsFormat;
use std::fmt::Write as _;
use std::sync::Arc;

/// Settings of a [`StreamHandler`].
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Records below this level are dropped.
    pub level: Level,
    /// Emit the `source` built-in when the record has a call site.
    pub add_source: bool,
    /// Applied to every non-group attr before encoding.
    pub replace_attr: Option<ReplaceAttr>,
}

#[derive(Clone, Default)]
struct State {
    attrs: Vec<Attr>,
    groups: Vec<(String, Vec<Attr>)>,
}

/// Sink that encodes each record as one JSON object or one `key=value`
/// text line and writes it to a [`SharedWriter`].
///
/// Output starts with the built-ins `time`, `level`, `msg` (and `source`),
/// followed by attrs bound with [`Handler::with_attrs`], then the record's
/// own attrs. Open groups nest everything added after them.
#[derive(Clone)]
pub struct StreamHandler {
    format: LogFormat,
    opts: StreamOptions,
    writer: SharedWriter,
    state: Arc<State>,
}

impl StreamHandler {
    pub fn new(format: LogFormat, writer: SharedWriter, opts: StreamOptions) -> Self {
        Self {
            format,
            opts,
            writer,
            state: Arc::new(State::default()),
        }
    }

    pub fn json(writer: SharedWriter, opts: StreamOptions) -> Self {
        Self::new(LogFormat::Json, writer, opts)
    }

    pub fn text(writer: SharedWriter, opts: StreamOptions) -> Self {
        Self::new(LogFormat::Text, writer, opts)
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    fn replace(&self, groups: &[String], attr: Attr) -> Attr {
        match &self.opts.replace_attr {
            Some(replace) => replace(groups, attr),
            None => attr,
        }
    }

    /// Nest record attrs under the open groups, after the bound attrs.
    fn compose(&self, record_attrs: Vec<Attr>) -> Vec<Attr> {
        let mut inner = record_attrs;
        for (name, attrs) in self.state.groups.iter().rev() {
            let mut content = attrs.clone();
            content.append(&mut inner);
            if !content.is_empty() {
                inner = vec![Attr::group(name.clone(), content)];
            }
        }
        let mut all = self.state.attrs.clone();
        all.append(&mut inner);
        all
    }

    /// Apply the rewriter and drop, inline or prune attrs as needed.
    fn resolve(&self, groups: &mut Vec<String>, attrs: Vec<Attr>, rewrite: bool, out: &mut Vec<Attr>) {
        for attr in attrs {
            // Rewrite leaves only; groups produced by the rewriter are final.
            let (attr, rewrite_members) = if attr.value.is_group() {
                (attr, rewrite)
            } else if rewrite {
                (self.replace(groups, attr), false)
            } else {
                (attr, false)
            };

            match attr.value {
                Value::Group(members) if attr.key.is_empty() => {
                    self.resolve(groups, members, rewrite_members, out);
                }
                Value::Group(members) => {
                    groups.push(attr.key);
                    let mut nested = Vec::with_capacity(members.len());
                    self.resolve(groups, members, rewrite_members, &mut nested);
                    let key = groups.pop().unwrap_or_default();
                    if !nested.is_empty() {
                        out.push(Attr::group(key, nested));
                    }
                }
                _ if attr.key.is_empty() => {}
                _ => out.push(attr),
            }
        }
    }

    fn resolve_record(&self, record: Record) -> Vec<Attr> {
        let mut builtins = vec![
            Attr::new(TIME_KEY, record.time),
            Attr::string(LEVEL_KEY, record.level.to_string()),
            Attr::string(MESSAGE_KEY, record.message.clone()),
        ];
        if self.opts.add_source {
            if let Some(source) = &record.source {
                builtins.push(Attr::new(SOURCE_KEY, source.to_value()));
            }
        }

        let mut out = Vec::with_capacity(builtins.len() + record.num_attrs());
        let mut groups = Vec::new();
        let builtins = builtins
            .into_iter()
            .map(|attr| self.replace(&[], attr))
            .collect();
        self.resolve(&mut groups, builtins, false, &mut out);

        let attrs = self.compose(record.into_attrs());
        self.resolve(&mut groups, attrs, true, &mut out);
        out
    }
}

impl Handler for StreamHandler {
    fn enabled(&self, _ctx: &Context, level: Level) -> bool {
        level >= self.opts.level
    }

    fn handle(&self, _ctx: &Context, record: Record) -> Result<(), HandlerError> {
        let attrs = self.resolve_record(record);
        let mut line = match self.format {
            LogFormat::Json => serde_json::to_vec(&AttrMap(&attrs))?,
            LogFormat::Text => encode_text(&attrs).into_bytes(),
        };
        line.push(b'\n');
        self.writer.write_line(&line)?;
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn Handler> {
        if attrs.is_empty() {
            return Arc::new(self.clone());
        }
        let mut state = State::clone(&self.state);
        match state.groups.last_mut() {
            Some((_, group_attrs)) => group_attrs.extend(attrs),
            None => state.attrs.extend(attrs),
        }
        Arc::new(Self {
            state: Arc::new(state),
            ..self.clone()
        })
    }

    fn with_group(&self, name: &str) -> Arc<dyn Handler> {
        if name.is_empty() {
            return Arc::new(self.clone());
        }
        let mut state = State::clone(&self.state);
        state.groups.push((name.to_string(), Vec::new()));
        Arc::new(Self {
            state: Arc::new(state),
            ..self.clone()
        })
    }
}

fn encode_text(attrs: &[Attr]) -> String {
    let mut line = String::new();
    let mut prefix = String::new();
    write_text_attrs(&mut line, &mut prefix, attrs);
    line
}

fn write_text_attrs(line: &mut String, prefix: &mut String, attrs: &[Attr]) {
    for attr in attrs {
        if let Value::Group(members) = &attr.value {
            let len = prefix.len();
            prefix.push_str(&attr.key);
            prefix.push('.');
            write_text_attrs(line, prefix, members);
            prefix.truncate(len);
            continue;
        }

        if !line.is_empty() {
            line.push(' ');
        }
        let key = format!("{prefix}{}", attr.key);
        push_text(line, &key);
        line.push('=');
        match &attr.value {
            Value::String(s) => push_text(line, s),
            Value::Time(t) => line.push_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Error(err) => push_text(line, &err.to_string()),
            Value::Any(serde_json::Value::String(s)) => push_text(line, s),
            Value::Any(v) => push_text(line, &v.to_string()),
            other => {
                let _ = write!(line, "{other}");
            }
        }
    }
}

fn push_text(line: &mut String, s: &str) {
    if needs_quoting(s) {
        let _ = write!(line, "{s:?}");
    } else {
        line.push_str(s);
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '=' || c == '"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Source;
    use crate::rewrite::{passthrough, Rewriter, DATE_ONLY};
    use parking_lot::Mutex;
    use std::io::{self, Write};

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

    impl Buf {
        fn take(&self) -> String {
            String::from_utf8(std::mem::take(&mut *self.0.lock())).unwrap()
        }
    }

    fn handler(format: LogFormat, opts: StreamOptions) -> (StreamHandler, Buf) {
        let buf = Buf::default();
        (StreamHandler::new(format, SharedWriter::new(buf.clone()), opts), buf)
    }

    fn date_opts() -> StreamOptions {
        StreamOptions {
            replace_attr: Some(Rewriter::generic(DATE_ONLY).into_replace_attr()),
            ..StreamOptions::default()
        }
    }

    fn today() -> String {
        chrono::Local::now().format(DATE_ONLY).to_string()
    }

    #[test]
    fn json_line_has_builtins_then_attrs() {
        let (h, buf) = handler(LogFormat::Json, date_opts());
        let mut record = Record::new(Level::WARN, "disk low");
        record.add_attr(Attr::new("free_mb", 12));
        h.handle(&Context::background(), record).unwrap();
        assert_eq!(
            buf.take(),
            format!(
                "{{\"time\":\"{}\",\"level\":\"WARN\",\"msg\":\"disk low\",\"free_mb\":12}}\n",
                today()
            )
        );
    }

    #[test]
    fn text_line_quotes_when_needed() {
        let (h, buf) = handler(LogFormat::Text, date_opts());
        let mut record = Record::new(Level::INFO, "Info message");
        record.add_attr(Attr::string("user", "ann"));
        record.add_attr(Attr::string("path", "a=b"));
        h.handle(&Context::background(), record).unwrap();
        assert_eq!(
            buf.take(),
            format!(
                "time={} level=INFO msg=\"Info message\" user=ann path=\"a=b\"\n",
                today()
            )
        );
    }

    #[test]
    fn groups_nest_bound_and_record_attrs() {
        let (h, buf) = handler(LogFormat::Json, date_opts());
        let h = h
            .with_attrs(vec![Attr::string("svc", "api")])
            .with_group("req")
            .with_attrs(vec![Attr::string("id", "r1")]);
        let mut record = Record::new(Level::INFO, "m");
        record.add_attr(Attr::new("status", 200));
        h.handle(&Context::background(), record).unwrap();

        let v: serde_json::Value = serde_json::from_str(buf.take().trim()).unwrap();
        assert_eq!(v["svc"], "api");
        assert_eq!(v["req"]["id"], "r1");
        assert_eq!(v["req"]["status"], 200);
    }

    #[test]
    fn empty_groups_are_omitted_and_empty_keys_inlined() {
        let (h, buf) = handler(LogFormat::Text, date_opts());
        let h = h.with_group("unused");
        h.handle(&Context::background(), Record::new(Level::INFO, "m"))
            .unwrap();
        assert!(!buf.take().contains("unused"));

        let (h, buf) = handler(LogFormat::Text, date_opts());
        let mut record = Record::new(Level::INFO, "m");
        record.add_attr(Attr::group("", vec![Attr::new("a", 1)]));
        record.add_attr(Attr::group("g", vec![Attr::new("b", 2)]));
        h.handle(&Context::background(), record).unwrap();
        assert!(buf.take().ends_with(" a=1 g.b=2\n"));
    }

    #[test]
    fn rewriter_sees_group_path() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let opts = StreamOptions {
            replace_attr: Some(Arc::new(move |groups: &[String], attr: Attr| {
                seen_in.lock().push((groups.join("."), attr.key.clone()));
                attr
            })),
            ..StreamOptions::default()
        };
        let (h, _buf) = handler(LogFormat::Json, opts);
        let mut record = Record::new(Level::INFO, "m");
        record.add_attr(Attr::group("outer", vec![Attr::new("inner", 1)]));
        h.with_group("g")
            .handle(&Context::background(), record)
            .unwrap();

        let seen = seen.lock();
        assert!(seen.contains(&(String::new(), "time".to_string())));
        assert!(seen.contains(&("g.outer".to_string(), "inner".to_string())));
    }

    #[test]
    fn source_is_emitted_when_requested() {
        let opts = StreamOptions {
            add_source: true,
            replace_attr: Some(passthrough()),
            ..StreamOptions::default()
        };
        let (h, buf) = handler(LogFormat::Json, opts);
        let record = Record::new(Level::INFO, "m").with_source(Source {
            function: Some("app::run".into()),
            file: "src/app.rs".into(),
            line: 9,
        });
        h.handle(&Context::background(), record).unwrap();
        let v: serde_json::Value = serde_json::from_str(buf.take().trim()).unwrap();
        assert_eq!(v["source"]["function"], "app::run");
        assert_eq!(v["source"]["line"], 9);
    }

    #[test]
    fn level_filter() {
        let (h, _) = handler(LogFormat::Text, StreamOptions::default());
        let ctx = Context::background();
        assert!(!h.enabled(&ctx, Level::DEBUG));
        assert!(h.enabled(&ctx, Level::INFO));
    }

    #[test]
    fn write_errors_are_returned() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let h = StreamHandler::json(SharedWriter::new(Broken), StreamOptions::default());
        let err = h
            .handle(&Context::background(), Record::new(Level::INFO, "m"))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Io(_)));
    }
}
