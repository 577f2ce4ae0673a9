use ctxlog::platform::aws::LambdaContext;
use ctxlog::{Attr, Context, HandlerOptions, Logger};

#[tokio::main]
async fn main() {
    let opts = HandlerOptions {
        enable_aws: true,
        enable_gcp: true,
        ..HandlerOptions::default()
    };

    // Outside a cloud host both probes time out or fail and the generic
    // handler is used.
    let ctx = Context::background();
    ctxlog::init_detect(&ctx, opts.clone()).await;
    ctxlog::info(&ctx, "detected", &[]);

    let ctx = LambdaContext::new("arn:aws:lambda:us-east-1:123456789012:function:demo", "c0ffee")
        .attach_to(&ctx);
    let logger = Logger::detect(&ctx, opts).await;
    logger.info(&ctx, "invocation", &[Attr::int("records", 12)]);
}
