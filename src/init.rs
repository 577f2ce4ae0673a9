use crate::context::Context;
use crate::error::InitError;
use crate::layer::ContextLayer;
use crate::logger::{set_default, Logger};
use crate::options::HandlerOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

/// Build a generic logger from `opts` and install it as the process-wide
/// default used by the free functions ([`info`](crate::info) and friends).
///
/// No platform detection happens here. When `enable_aws` or `enable_gcp`
/// is set a warning is emitted and the generic handler is used; call
/// [`init_detect`] to honor those flags.
///
/// **Returns** the installed logger, so callers can derive from it with
/// [`Logger::with`] or bridge it with [`init_tracing`].
pub fn init(opts: HandlerOptions) -> Logger {
    if opts.enable_aws || opts.enable_gcp {
        tracing::warn!(
            enable_aws = opts.enable_aws,
            enable_gcp = opts.enable_gcp,
            "platform detection needs init_detect, using the generic handler"
        );
    }
    let logger = Logger::new(opts);
    set_default(logger.clone());
    logger
}

/// Detect the hosting platform enabled in `opts` with
/// [`Logger::detect`] and install the resulting logger as the process-wide
/// default.
///
/// Falls back to the generic handler when no platform answers.
pub async fn init_detect(ctx: &Context, opts: HandlerOptions) -> Logger {
    let logger = Logger::detect(ctx, opts).await;
    set_default(logger.clone());
    logger
}

/// Like [`init_detect`], with options read from the `CTXLOG_*` environment
/// variables. Invalid values fall back to the defaults and are reported on
/// stderr.
pub async fn init_from_env(ctx: &Context) -> Logger {
    init_detect(ctx, env_options()).await
}

fn env_options() -> HandlerOptions {
    HandlerOptions::from_env().unwrap_or_else(|e| {
        eprintln!("ctxlog: ignoring logging environment: {}", e);
        HandlerOptions::default()
    })
}

/// Install a global `tracing` subscriber that routes every event through
/// `logger`.
///
/// **Effects**
///
/// A [`Registry`] combined with [`ContextLayer`] becomes the global default
/// subscriber, so `tracing` events and span fields from any crate in the
/// process are written by `logger`'s handler chain.
///
/// **Errors** with [`InitError::SubscriberAlreadySet`] when a global
/// subscriber was installed before.
pub fn init_tracing(logger: &Logger) -> Result<(), InitError> {
    Registry::default()
        .with(ContextLayer::for_logger(logger))
        .try_init()?;
    Ok(())
}
