use std::fs;
use std::thread;

use ctxlog::{attach, Attr, Context, HandlerOptions, LogFormat, ResultExt};

fn load_config(path: &str) -> Result<String, ctxlog::TracedError> {
    fs::read_to_string(path).wrap_err(format!("reading {path}"))
}

fn main() {
    let logger = ctxlog::init(HandlerOptions {
        format: LogFormat::Json,
        add_source: true,
        ..HandlerOptions::default()
    });

    let ctx = attach(&Context::background(), "request_id", "r-1001");
    let ctx = attach(&ctx, "tenant", "acme");

    // Workers attach to the same store; the parent sees their fields.
    thread::scope(|s| {
        for worker in 0..3 {
            let ctx = ctx.clone();
            s.spawn(move || {
                attach(&ctx, format!("worker_{worker}"), "done");
            });
        }
    });

    ctxlog::info(&ctx, "request finished", &[Attr::int("status", 200)]);

    let billing = logger.with_group("billing");
    billing.warn(&ctx, "card declined", &[Attr::string("reason", "insufficient_funds")]);

    if let Err(err) = load_config("/nonexistent/ctxlog.toml") {
        logger.error(&ctx, "config unavailable", &[Attr::error("error", err)]);
    }
}
