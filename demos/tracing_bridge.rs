use ctxlog::{init_tracing, HandlerOptions, Level, LogFormat, Logger};
use tracing::{info, info_span, warn};

fn main() {
    let logger = Logger::new(HandlerOptions {
        format: LogFormat::Text,
        level: Level::DEBUG,
        ..HandlerOptions::default()
    });
    if let Err(e) = init_tracing(&logger) {
        eprintln!("{e}");
        return;
    }

    let span = info_span!("request", method = "GET", path = "/health");
    let _guard = span.enter();
    info!(latency_ms = 3u64, "served");
    warn!(retries = 2, "upstream slow");
}
