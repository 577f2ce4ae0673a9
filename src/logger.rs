//! The [`Logger`] front end and the process-wide default logger.

use crate::context::Context;
use crate::discard::DiscardHandler;
use crate::enrich::ContextHandler;
use crate::handler::Handler;
use crate::options::HandlerOptions;
use crate::platform::{self, Platform, PlatformProbe};
use crate::record::{Level, Record, Source};
use crate::stream::{StreamHandler, StreamOptions};
use crate::value::Attr;
use crate::writer::{output, SharedWriter};
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Cheap, cloneable front end over a handler chain.
///
/// Every logger built by this crate wraps its sink in a
/// [`ContextHandler`], so attrs attached to the context with
/// [`attach`](crate::attach) show up on each record.
#[derive(Clone)]
pub struct Logger {
    handler: Arc<dyn Handler>,
}

impl Logger {
    /// Generic logger writing to the process-wide [`output`].
    pub fn new(opts: HandlerOptions) -> Self {
        Self::with_writer(opts, output())
    }

    /// Generic logger writing to `writer`.
    pub fn with_writer(opts: HandlerOptions, writer: SharedWriter) -> Self {
        let stream_opts = StreamOptions {
            level: opts.level,
            add_source: opts.add_source,
            replace_attr: Some(opts.generic_replace_attr()),
        };
        let sink = StreamHandler::new(opts.format, writer, stream_opts);
        Self::with_handler(Arc::new(sink))
    }

    /// Wrap an arbitrary handler in a [`ContextHandler`].
    pub fn with_handler(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler: Arc::new(ContextHandler::new(handler)),
        }
    }

    /// JSON logger for a known platform, with its field naming and static
    /// attrs.
    pub fn for_platform(opts: &HandlerOptions, platform: &Platform, writer: SharedWriter) -> Self {
        Self {
            handler: platform.handler(opts, writer),
        }
    }

    /// A logger that writes nothing.
    pub fn discard() -> Self {
        Self::with_handler(Arc::new(DiscardHandler))
    }

    /// Probe for the hosting platform enabled in `opts` and build the
    /// matching logger, or a generic one when none answers.
    pub async fn detect(ctx: &Context, opts: HandlerOptions) -> Self {
        let probes = platform::probes_for(&opts);
        Self::detect_with(ctx, opts, &probes, output()).await
    }

    /// Like [`Logger::detect`] with explicit probes and output.
    pub async fn detect_with(
        ctx: &Context,
        opts: HandlerOptions,
        probes: &[Box<dyn PlatformProbe>],
        writer: SharedWriter,
    ) -> Self {
        match platform::detect(ctx, probes).await {
            Some(platform) => Self::for_platform(&opts, &platform, writer),
            None => Self::with_writer(opts, writer),
        }
    }

    /// The handler chain, outermost first.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// A logger whose records all carry `attrs`.
    pub fn with(&self, attrs: Vec<Attr>) -> Self {
        Self {
            handler: self.handler.with_attrs(attrs),
        }
    }

    /// A logger that nests later attrs under `name`.
    pub fn with_group(&self, name: &str) -> Self {
        Self {
            handler: self.handler.with_group(name),
        }
    }

    pub fn enabled(&self, ctx: &Context, level: Level) -> bool {
        self.handler.enabled(ctx, level)
    }

    /// Emit one record. Handler failures are dropped.
    #[track_caller]
    pub fn log(&self, ctx: &Context, level: Level, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, level, msg, attrs);
    }

    fn log_at(&self, location: &Location<'_>, ctx: &Context, level: Level, msg: &str, attrs: &[Attr]) {
        if !self.enabled(ctx, level) {
            return;
        }
        let mut record = Record::new(level, msg).with_source(Source::from_location(location));
        record.add_attrs(attrs.iter().cloned());
        let _ = self.handler.handle(ctx, record);
    }

    #[track_caller]
    pub fn debug(&self, ctx: &Context, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, Level::DEBUG, msg, attrs);
    }

    #[track_caller]
    pub fn info(&self, ctx: &Context, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, Level::INFO, msg, attrs);
    }

    #[track_caller]
    pub fn warn(&self, ctx: &Context, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, Level::WARN, msg, attrs);
    }

    #[track_caller]
    pub fn error(&self, ctx: &Context, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, Level::ERROR, msg, attrs);
    }

    #[track_caller]
    pub fn critical(&self, ctx: &Context, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, Level::CRITICAL, msg, attrs);
    }

    /// Same level as [`Logger::critical`]. Does not exit the process.
    #[track_caller]
    pub fn fatal(&self, ctx: &Context, msg: &str, attrs: &[Attr]) {
        self.log_at(Location::caller(), ctx, Level::FATAL, msg, attrs);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

static DEFAULT: Lazy<ArcSwap<Logger>> =
    Lazy::new(|| ArcSwap::from_pointee(Logger::new(HandlerOptions::default())));

/// Replace the process-wide default logger.
pub fn set_default(logger: Logger) {
    DEFAULT.store(Arc::new(logger));
}

/// The current process-wide default logger.
pub fn default_logger() -> Logger {
    Logger::clone(&DEFAULT.load())
}

#[track_caller]
pub fn debug(ctx: &Context, msg: &str, attrs: &[Attr]) {
    DEFAULT.load().log_at(Location::caller(), ctx, Level::DEBUG, msg, attrs);
}

#[track_caller]
pub fn info(ctx: &Context, msg: &str, attrs: &[Attr]) {
    DEFAULT.load().log_at(Location::caller(), ctx, Level::INFO, msg, attrs);
}

#[track_caller]
pub fn warn(ctx: &Context, msg: &str, attrs: &[Attr]) {
    DEFAULT.load().log_at(Location::caller(), ctx, Level::WARN, msg, attrs);
}

#[track_caller]
pub fn error(ctx: &Context, msg: &str, attrs: &[Attr]) {
    DEFAULT.load().log_at(Location::caller(), ctx, Level::ERROR, msg, attrs);
}

#[track_caller]
pub fn critical(ctx: &Context, msg: &str, attrs: &[Attr]) {
    DEFAULT.load().log_at(Location::caller(), ctx, Level::CRITICAL, msg, attrs);
}

#[track_caller]
pub fn fatal(ctx: &Context, msg: &str, attrs: &[Attr]) {
    DEFAULT.load().log_at(Location::caller(), ctx, Level::FATAL, msg, attrs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::attach;
    use crate::options::LogFormat;
    use crate::rewrite::passthrough;
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
        fn json_lines(&self) -> Vec<serde_json::Value> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn json_logger(buf: &Buf, opts: HandlerOptions) -> Logger {
        Logger::with_writer(
            HandlerOptions {
                format: LogFormat::Json,
                ..opts
            },
            SharedWriter::new(buf.clone()),
        )
    }

    #[test]
    fn level_methods_filter_below_minimum() {
        let buf = Buf::default();
        let logger = json_logger(&buf, HandlerOptions::default());
        let ctx = Context::background();

        logger.debug(&ctx, "hidden", &[]);
        logger.info(&ctx, "shown", &[]);
        logger.critical(&ctx, "bad", &[]);

        let lines = buf.json_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["msg"], "shown");
        assert_eq!(lines[1]["level"], "CRITICAL");
        assert!(!logger.enabled(&ctx, Level::DEBUG));
    }

    #[test]
    fn source_points_at_the_caller() {
        let buf = Buf::default();
        let logger = json_logger(
            &buf,
            HandlerOptions {
                add_source: true,
                replace_attr: Some(passthrough()),
                ..HandlerOptions::default()
            },
        );

        let line = line!() + 1;
        logger.warn(&Context::background(), "here", &[]);

        let lines = buf.json_lines();
        assert_eq!(lines[0]["source"]["file"], file!());
        assert_eq!(lines[0]["source"]["line"], line);
    }

    #[test]
    fn with_and_context_attrs_land_on_one_record() {
        let buf = Buf::default();
        let logger = json_logger(&buf, HandlerOptions::default())
            .with(vec![Attr::string("service", "billing")])
            .with_group("req");
        let ctx = attach(&Context::background(), "trace_id", "t-1");

        logger.info(&ctx, "charged", &[Attr::int("cents", 250)]);

        let lines = buf.json_lines();
        assert_eq!(lines[0]["service"], "billing");
        assert_eq!(lines[0]["req"]["cents"], 250);
        assert_eq!(lines[0]["req"]["trace_id"], "t-1");
    }

    #[test]
    fn discard_logger_is_silent() {
        let logger = Logger::discard();
        assert!(!logger.enabled(&Context::background(), Level::CRITICAL));
        logger.critical(&Context::background(), "dropped", &[]);
    }

    #[tokio::test]
    async fn detect_without_probes_falls_back_to_generic() {
        let buf = Buf::default();
        let logger = Logger::detect_with(
            &Context::background(),
            HandlerOptions {
                format: LogFormat::Json,
                ..HandlerOptions::default()
            },
            &[],
            SharedWriter::new(buf.clone()),
        )
        .await;

        logger.info(&Context::background(), "generic", &[]);
        let lines = buf.json_lines();
        assert_eq!(lines[0]["msg"], "generic");
        assert!(lines[0].get("message").is_none());
    }
}
