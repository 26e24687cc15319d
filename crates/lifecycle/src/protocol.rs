use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::registry::RequestType;

/// One provisioning lifecycle call. Lives only for the duration of the
/// invocation; the outcome is delivered to `response_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomResourceRequest {
    #[serde(rename = "RequestType")]
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(rename = "StackId")]
    pub stack_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    #[serde(rename = "PhysicalResourceId", default)]
    pub physical_resource_id: Option<String>,
    #[serde(rename = "ResourceProperties", default)]
    pub resource_properties: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomResourceResponse {
    #[serde(rename = "Status")]
    pub status: ResponseStatus,
    #[serde(rename = "Reason", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "PhysicalResourceId")]
    pub physical_resource_id: String,
    #[serde(rename = "StackId")]
    pub stack_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    #[serde(rename = "Data")]
    pub data: Map<String, Value>,
}

impl CustomResourceResponse {
    pub fn success(request: &CustomResourceRequest, data: Map<String, Value>) -> Self {
        Self::build(request, ResponseStatus::Success, None, data)
    }

    pub fn failed(request: &CustomResourceRequest, reason: String) -> Self {
        Self::build(request, ResponseStatus::Failed, Some(reason), Map::new())
    }

    fn build(
        request: &CustomResourceRequest,
        status: ResponseStatus,
        reason: Option<String>,
        data: Map<String, Value>,
    ) -> Self {
        CustomResourceResponse {
            status,
            reason,
            physical_resource_id: request
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| request.logical_resource_id.clone()),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        }
    }
}

/// Deliver the response with a signed HTTP PUT to the caller-supplied URL.
pub async fn respond(
    http: &reqwest::Client,
    request: &CustomResourceRequest,
    response: &CustomResourceResponse,
) -> Result<(), model::Error> {
    let body = serde_json::to_string(response)?;

    info!(
        request_id = request.request_id.as_str(),
        status = ?response.status,
        "Sending lifecycle response"
    );

    http.put(&request.response_url)
        // The presigned callback URL rejects any declared content type.
        .header(CONTENT_TYPE, "")
        .body(body)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}
