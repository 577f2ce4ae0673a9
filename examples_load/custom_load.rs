use std::io;
use std::time::Instant;

use ctxlog::{attach, Attr, Context, HandlerOptions, LogFormat, Logger, SharedWriter};

fn main() {
    let opts = HandlerOptions {
        format: LogFormat::Json,
        add_source: true,
        ..HandlerOptions::default()
    };
    let logger = Logger::with_writer(opts, SharedWriter::new(io::sink()));

    let mut ctx = Context::background();
    for i in 0..8 {
        ctx = attach(&ctx, format!("field_{i}"), i);
    }

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger.error(&ctx, "custom load test error", &[Attr::new("iteration", i)]);
    }

    let elapsed = start.elapsed();
    println!("json to io::sink, 8 context attrs: sent {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
