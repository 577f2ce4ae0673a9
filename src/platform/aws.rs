//! AWS Lambda and EC2 detection.

use super::{Platform, PlatformProbe};
use crate::context::Context;
use async_trait::async_trait;

/// Invocation metadata for an AWS Lambda request.
///
/// The Lambda runtime glue binds this on the request context with
/// [`LambdaContext::attach_to`]; [`LambdaProbe`] reads it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaContext {
    pub invoked_function_arn: String,
    pub aws_request_id: String,
}

impl LambdaContext {
    pub fn new(invoked_function_arn: impl Into<String>, aws_request_id: impl Into<String>) -> Self {
        Self {
            invoked_function_arn: invoked_function_arn.into(),
            aws_request_id: aws_request_id.into(),
        }
    }

    /// Derive a context carrying this invocation.
    pub fn attach_to(self, ctx: &Context) -> Context {
        ctx.with_value(self)
    }

    pub fn from_context(ctx: &Context) -> Option<&LambdaContext> {
        ctx.value::<LambdaContext>()
    }
}

/// Reports [`Platform::AwsLambda`] when the context carries a
/// [`LambdaContext`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LambdaProbe;

#[async_trait]
impl PlatformProbe for LambdaProbe {
    fn name(&self) -> &'static str {
        "aws-lambda"
    }

    async fn probe(&self, ctx: &Context) -> Option<Platform> {
        LambdaContext::from_context(ctx).map(|lc| Platform::AwsLambda {
            function_arn: lc.invoked_function_arn.clone(),
            request_id: lc.aws_request_id.clone(),
        })
    }
}

#[cfg(feature = "aws")]
pub use ec2::*;

#[cfg(feature = "aws")]
mod ec2 {
    use super::super::{bounded, deadline, metadata_client, Platform, PlatformError, PlatformProbe};
    use crate::context::Context;
    use crate::env::env_opt;
    use async_trait::async_trait;
    use tokio::time::Instant;

    /// Default instance metadata service address.
    pub const EC2_METADATA_ENDPOINT: &str = "http://169.254.169.254";

    /// Overrides [`EC2_METADATA_ENDPOINT`].
    pub const EC2_METADATA_ENDPOINT_ENV: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";

    /// `true` disables the EC2 probe.
    pub const EC2_METADATA_DISABLED_ENV: &str = "AWS_EC2_METADATA_DISABLED";

    const TOKEN_PATH: &str = "/latest/api/token";
    const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
    const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
    const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
    const TOKEN_TTL_SECONDS: &str = "60";

    /// Asks the EC2 instance metadata service for the instance id.
    ///
    /// Uses an IMDSv2 session token when the service hands one out and
    /// falls back to a plain IMDSv1 request when it refuses.
    #[derive(Debug, Clone)]
    pub struct Ec2Probe {
        client: reqwest::Client,
        endpoint: String,
        disabled: bool,
    }

    impl Default for Ec2Probe {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Ec2Probe {
        /// Probe configured from `AWS_EC2_METADATA_SERVICE_ENDPOINT` and
        /// `AWS_EC2_METADATA_DISABLED`.
        pub fn new() -> Self {
            let endpoint = env_opt(EC2_METADATA_ENDPOINT_ENV)
                .unwrap_or_else(|| EC2_METADATA_ENDPOINT.to_string());
            let disabled = env_opt(EC2_METADATA_DISABLED_ENV)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            Self {
                disabled,
                ..Self::with_endpoint(endpoint)
            }
        }

        pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
            Self {
                client: metadata_client(),
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
                disabled: false,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.endpoint, path)
        }

        async fn token(&self, deadline: Instant) -> Result<Option<String>, PlatformError> {
            let resp = bounded(
                deadline,
                self.client
                    .put(self.url(TOKEN_PATH))
                    .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
                    .send(),
            )
            .await??;

            if !resp.status().is_success() {
                tracing::debug!(status = %resp.status(), "imds token refused, using IMDSv1");
                return Ok(None);
            }
            Ok(Some(bounded(deadline, resp.text()).await??))
        }

        /// Fetch the instance id. All requests share one
        /// [`PROBE_TIMEOUT`](super::super::PROBE_TIMEOUT) budget.
        pub async fn instance_id(&self) -> Result<String, PlatformError> {
            let deadline = deadline();
            if self.disabled {
                return Err(PlatformError::Disabled);
            }

            let mut req = self.client.get(self.url(INSTANCE_ID_PATH));
            if let Some(token) = self.token(deadline).await? {
                req = req.header(TOKEN_HEADER, token);
            }

            let resp = bounded(deadline, req.send()).await??;
            if !resp.status().is_success() {
                return Err(PlatformError::Status(resp.status().as_u16()));
            }

            let id = bounded(deadline, resp.text()).await??.trim().to_string();
            if id.is_empty() {
                return Err(PlatformError::Empty);
            }
            Ok(id)
        }
    }

    #[async_trait]
    impl PlatformProbe for Ec2Probe {
        fn name(&self) -> &'static str {
            "aws-ec2"
        }

        async fn probe(&self, _ctx: &Context) -> Option<Platform> {
            match self.instance_id().await {
                Ok(instance_id) => Some(Platform::AwsEc2 { instance_id }),
                Err(e) => {
                    tracing::debug!(error = %e, endpoint = %self.endpoint, "ec2 metadata probe failed");
                    None
                }
            }
        }
    }
}
