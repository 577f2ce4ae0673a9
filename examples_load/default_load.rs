use std::time::Instant;
use tracing::error;

use ctxlog::{init_tracing, Logger};

#[tokio::main]
async fn main() {
    let logger = Logger::discard();
    init_tracing(&logger).expect("install tracing bridge");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("discard handler: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
