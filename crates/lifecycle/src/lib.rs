//! Lifecycle manager for externally-provisioned dependent resources:
//! encoder job templates, the packaging group and its configurations, and
//! the delivery-network origin pointing at the packaging domain.
//!
//! Invoked by the provisioning tool on deployment transitions through the
//! callback protocol in [`protocol`]; repeated `Update` calls with the same
//! properties are idempotent.

use serde_json::{Map, Value};
use tracing::error;

pub mod cloudfront;
pub mod mediaconvert;
pub mod packaging;
pub mod protocol;
pub mod registry;

pub use registry::{CommandRegistry, LifecycleCommand, RequestType, ResourceKind};

use protocol::{CustomResourceRequest, CustomResourceResponse};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("at least one valid packaging configuration must be informed")]
    NoValidConfiguration,

    #[error("missing resource property {0}")]
    MissingProperty(String),

    #[error("bundled template asset is invalid: {0}")]
    BadAsset(String),

    #[error("provider call failed: {0}")]
    Provider(#[source] model::Error),
}

pub(crate) fn property<'a>(
    properties: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, LifecycleError> {
    properties
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| LifecycleError::MissingProperty(name.to_string()))
}

pub(crate) fn provider_err(err: impl Into<model::Error>) -> LifecycleError {
    LifecycleError::Provider(err.into())
}

/// Run one lifecycle request and deliver the outcome to the caller's
/// callback URL. A failed command still produces a callback, carrying the
/// failure reason for rollback.
pub async fn handle(
    registry: &CommandRegistry,
    http: &reqwest::Client,
    request: CustomResourceRequest,
) -> Result<(), model::Error> {
    let response = match registry.dispatch(&request).await {
        Ok(data) => CustomResourceResponse::success(&request, data),
        Err(err) => {
            error!("Lifecycle request failed: {err}");

            CustomResourceResponse::failed(&request, err.to_string())
        }
    };

    protocol::respond(http, &request, &response).await
}
