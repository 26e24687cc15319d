use crate::require_str;
use async_trait::async_trait;
use aws_sdk_s3::types::{Tag, Tagging};
use graph::{StepTask, TaskError};
use model::config::ArchiveMode;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

/// Tags the source object so the bucket lifecycle rules move it to the
/// requested storage class.
pub struct ArchiveSource {
    s3_client: aws_sdk_s3::Client,
    workflow_name: String,
    mode: ArchiveMode,
}

impl ArchiveSource {
    pub fn new(s3_client: aws_sdk_s3::Client, workflow_name: String, mode: ArchiveMode) -> Self {
        ArchiveSource {
            s3_client,
            workflow_name,
            mode,
        }
    }
}

#[async_trait]
impl StepTask for ArchiveSource {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?;
        let bucket = require_str(&payload, "srcBucket")?;
        let object_key = require_str(&payload, "srcVideo")?;

        let tagging = Tagging::builder()
            .tag_set(
                Tag::builder()
                    .key("guid")
                    .value(guid)
                    .build()
                    .map_err(TaskError::from_source)?,
            )
            .tag_set(
                Tag::builder()
                    .key(&self.workflow_name)
                    .value(self.mode.as_str())
                    .build()
                    .map_err(TaskError::from_source)?,
            )
            .build()
            .map_err(TaskError::from_source)?;

        info!(guid, mode = self.mode.as_str(), "Tagging source for archival");

        self.s3_client
            .put_object_tagging()
            .bucket(bucket)
            .key(object_key)
            .tagging(tagging)
            .send()
            .await
            .map_err(TaskError::from_source)?;

        Ok(payload)
    }
}

/// Ingests the HLS output into the packaging service and rewrites the egress
/// endpoints onto the delivery domain.
pub struct MediaPackageAssets {
    mediapackage_client: aws_sdk_mediapackagevod::Client,
    packaging_group_id: String,
    source_role_arn: String,
}

impl MediaPackageAssets {
    pub fn new(
        mediapackage_client: aws_sdk_mediapackagevod::Client,
        packaging_group_id: String,
        source_role_arn: String,
    ) -> Self {
        MediaPackageAssets {
            mediapackage_client,
            packaging_group_id,
            source_role_arn,
        }
    }
}

pub(crate) fn arn_from_s3_uri(uri: &str) -> Result<String, TaskError> {
    let path = uri
        .strip_prefix("s3://")
        .ok_or_else(|| TaskError::new(format!("unexpected s3 uri: {uri}")))?;

    Ok(format!("arn:aws:s3:::{path}"))
}

/// Swap the packaging host for the public delivery domain, keeping the path.
pub(crate) fn delivery_endpoint(endpoint_url: &str, domain: &str) -> Result<String, TaskError> {
    let url = url::Url::parse(endpoint_url).map_err(TaskError::from_source)?;

    Ok(format!("https://{domain}{}", url.path()))
}

#[async_trait]
impl StepTask for MediaPackageAssets {
    async fn run(&self, mut payload: Value) -> Result<Value, TaskError> {
        let hls_playlist = require_str(&payload, "hlsPlaylist")?;
        let domain = require_str(&payload, "cloudFront")?.to_string();
        let asset_id = hex::encode(rand::random::<[u8; 16]>());

        let asset = self
            .mediapackage_client
            .create_asset()
            .id(&asset_id)
            .packaging_group_id(&self.packaging_group_id)
            .source_arn(arn_from_s3_uri(hls_playlist)?)
            .source_role_arn(&self.source_role_arn)
            .resource_id(&asset_id)
            .send()
            .await
            .map_err(TaskError::from_source)?;

        let mut endpoints: Map<String, Value> = Map::new();
        for endpoint in asset.egress_endpoints() {
            let (Some(configuration), Some(endpoint_url)) =
                (endpoint.packaging_configuration_id(), endpoint.url())
            else {
                continue;
            };

            endpoints.insert(
                configuration.to_string(),
                json!(delivery_endpoint(endpoint_url, &domain)?),
            );
        }

        info!(asset_id = asset_id.as_str(), endpoints = endpoints.len(), "Packaged asset");

        payload["egressEndpoints"] = Value::Object(endpoints);

        Ok(payload)
    }
}
