use crate::config::AwsConfig;
use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as LambdaClient;
use aws_types::SdkConfig;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Payload sent to the stitcher once both halves of a pair are stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchRequest {
    pub left_side_path: String,
    pub right_side_path: String,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to encode stitch request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Stitcher invocation failed: {0}")]
    Invoke(String),
}

/// At-most-once, best-effort notification of the stitcher.
///
/// `Ok` means the request was handed over, not that stitching happened.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StitchNotifier: Send + Sync {
    async fn notify(&self, request: &StitchRequest) -> Result<(), NotifyError>;
}

/// Asynchronous (`Event`) invocation of the stitcher Lambda
pub struct LambdaStitchNotifier {
    client: LambdaClient,
    function: String,
}

impl LambdaStitchNotifier {
    pub fn new(sdk_config: &SdkConfig, aws: &AwsConfig, function: String) -> Self {
        let mut builder = aws_sdk_lambda::config::Builder::from(sdk_config);

        if let Some(ref endpoint_url) = aws.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        info!(function = %function, "Stitch notifier initialized");

        Self {
            client: LambdaClient::from_conf(builder.build()),
            function,
        }
    }
}

#[async_trait]
impl StitchNotifier for LambdaStitchNotifier {
    #[instrument(skip(self), fields(function = %self.function))]
    async fn notify(&self, request: &StitchRequest) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(request)?;

        let output = self
            .client
            .invoke()
            .function_name(&self.function)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| NotifyError::Invoke(DisplayErrorContext(e).to_string()))?;

        debug!(status = output.status_code, "Stitcher invoked");
        Ok(())
    }
}

/// Used when no stitcher function is configured
pub struct DisabledStitchNotifier;

#[async_trait]
impl StitchNotifier for DisabledStitchNotifier {
    async fn notify(&self, request: &StitchRequest) -> Result<(), NotifyError> {
        info!(
            left = %request.left_side_path,
            right = %request.right_side_path,
            "Stitching disabled, pair not forwarded"
        );
        Ok(())
    }
}
