//! Hosting platform detection.
//!
//! Probes run once, when a logger is built with
//! [`Logger::detect`](crate::Logger::detect). Each one is bounded by
//! [`PROBE_TIMEOUT`]; a probe that fails or times out simply reports no
//! platform and the generic handler is used.

pub mod aws;
#[cfg(feature = "gcp")]
pub mod gcp;

use crate::context::Context;
use crate::enrich::ContextHandler;
use crate::handler::Handler;
use crate::options::HandlerOptions;
use crate::rewrite::{Flavor, Rewriter};
use crate::stream::{StreamHandler, StreamOptions};
use crate::value::Attr;
use crate::writer::SharedWriter;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
#[cfg(any(feature = "aws", feature = "gcp"))]
use std::future::Future;
#[cfg(any(feature = "aws", feature = "gcp"))]
use tokio::time::Instant;

/// Upper bound for one probe, all of its metadata requests included.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A detected hosting platform and the identifiers logged with every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    AwsLambda {
        function_arn: String,
        request_id: String,
    },
    AwsEc2 {
        instance_id: String,
    },
    Gcp {
        project_id: String,
        instance_name: String,
    },
}

impl Platform {
    pub fn flavor(&self) -> Flavor {
        match self {
            Platform::AwsLambda { .. } | Platform::AwsEc2 { .. } => Flavor::Aws,
            Platform::Gcp { .. } => Flavor::Gcp,
        }
    }

    /// Attrs bound to the handler at construction.
    pub fn static_attrs(&self) -> Vec<Attr> {
        match self {
            Platform::AwsLambda {
                function_arn,
                request_id,
            } => vec![
                Attr::string("function_arn", function_arn.clone()),
                Attr::string("request_id", request_id.clone()),
            ],
            Platform::AwsEc2 { instance_id } => {
                vec![Attr::string("ec2_instance", instance_id.clone())]
            }
            Platform::Gcp {
                project_id,
                instance_name,
            } => vec![
                Attr::string("project_id", project_id.clone()),
                Attr::string("instance_name", instance_name.clone()),
            ],
        }
    }

    /// JSON handler with this platform's rewriter and static attrs, wrapped
    /// in a [`ContextHandler`].
    pub fn handler(&self, opts: &HandlerOptions, writer: SharedWriter) -> Arc<dyn Handler> {
        let sink = StreamHandler::json(
            writer,
            StreamOptions {
                level: opts.level,
                add_source: opts.add_source,
                replace_attr: Some(Rewriter::for_flavor(self.flavor(), "").into_replace_attr()),
            },
        );
        Arc::new(ContextHandler::new(sink.with_attrs(self.static_attrs())))
    }
}

/// Errors raised inside probes. They are logged at debug level and never
/// leave [`detect`].
#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("metadata request failed: {0}")]
    Http(String),

    #[error("metadata request returned status {0}")]
    Status(u16),

    #[error("metadata request timed out after {0:?}")]
    Timeout(Duration),

    #[error("metadata response was empty")]
    Empty,

    #[error("metadata access is disabled")]
    Disabled,
}

#[cfg(any(feature = "aws", feature = "gcp"))]
impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        PlatformError::Http(err.to_string())
    }
}

/// A hosting platform detector.
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Report the platform, or `None` when not running on it.
    async fn probe(&self, ctx: &Context) -> Option<Platform>;
}

/// Run `probes` in order and return the first platform found.
pub async fn detect(ctx: &Context, probes: &[Box<dyn PlatformProbe>]) -> Option<Platform> {
    for probe in probes {
        if let Some(platform) = probe.probe(ctx).await {
            tracing::info!(probe = probe.name(), ?platform, "hosting platform detected");
            return Some(platform);
        }
        tracing::debug!(probe = probe.name(), "hosting platform not detected");
    }
    None
}

/// The probes enabled by `opts`: GCP first, then AWS Lambda, then EC2.
pub fn probes_for(opts: &HandlerOptions) -> Vec<Box<dyn PlatformProbe>> {
    let mut probes: Vec<Box<dyn PlatformProbe>> = Vec::new();

    #[cfg(feature = "gcp")]
    {
        if opts.enable_gcp {
            probes.push(Box::new(gcp::GcpProbe::new()));
        }
    }

    if opts.enable_aws {
        probes.push(Box::new(aws::LambdaProbe));
        #[cfg(feature = "aws")]
        probes.push(Box::new(aws::Ec2Probe::new()));
    }

    probes
}

/// The instant by which a probe starting now must be done.
#[cfg(any(feature = "aws", feature = "gcp"))]
pub(crate) fn deadline() -> Instant {
    Instant::now() + PROBE_TIMEOUT
}

/// Await `fut` until `deadline`. Every step of one probe shares the same
/// deadline.
#[cfg(any(feature = "aws", feature = "gcp"))]
pub(crate) async fn bounded<F: Future>(deadline: Instant, fut: F) -> Result<F::Output, PlatformError> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| PlatformError::Timeout(PROBE_TIMEOUT))
}

#[cfg(any(feature = "aws", feature = "gcp"))]
pub(crate) fn metadata_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .no_proxy()
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
