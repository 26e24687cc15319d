use crate::{require_str, utc_now};
use async_trait::async_trait;
use graph::{StepTask, TaskError};
use model::config::WorkflowConfig;
use model::key;
use model::WorkflowTrigger;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

/// Seeds the workflow record from the deployment configuration and the
/// trigger event. The returned payload replaces the raw storage notification
/// for the rest of the execution.
pub struct InputValidate {
    config: WorkflowConfig,
    s3_client: aws_sdk_s3::Client,
}

impl InputValidate {
    pub fn new(config: WorkflowConfig, s3_client: aws_sdk_s3::Client) -> Self {
        InputValidate { config, s3_client }
    }

    fn base_data(&self, guid: &str) -> Result<Map<String, Value>, TaskError> {
        let mut data = match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            other => {
                return Err(TaskError::new(format!(
                    "configuration did not serialize to an object: {other:?}"
                )))
            }
        };

        data.insert("guid".to_string(), json!(guid));
        data.insert("startTime".to_string(), json!(utc_now()));
        data.insert("workflowStatus".to_string(), json!("Ingest"));

        Ok(data)
    }

    async fn source_json(&self, bucket: &str, object_key: &str) -> Result<Value, TaskError> {
        let object = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(object_key)
            .send()
            .await
            .map_err(TaskError::from_source)?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(TaskError::from_source)?
            .into_bytes();

        serde_json::from_slice(&bytes).map_err(TaskError::from_source)
    }

    async fn check_source_exists(&self, bucket: &str, object_key: &str) -> Result<(), TaskError> {
        self.s3_client
            .head_object()
            .bucket(bucket)
            .key(object_key)
            .send()
            .await
            .map_err(TaskError::from_source)?;

        Ok(())
    }
}

#[async_trait]
impl StepTask for InputValidate {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?;
        let trigger: WorkflowTrigger =
            serde_json::from_value(payload["workflowTrigger"].clone())
                .map_err(|_| TaskError::new("workflowTrigger is not defined"))?;

        let mut data = self.base_data(guid)?;
        data.insert("workflowTrigger".to_string(), json!(trigger));

        // Correlation fields resolved by the dispatcher ride along.
        for field in ["cmsId", "cmsCommandId", "doPurge"] {
            if let Some(value) = payload.get(field) {
                data.insert(field.to_string(), value.clone());
            }
        }

        let object_key = key::decode(
            payload["Records"][0]["s3"]["object"]["key"]
                .as_str()
                .ok_or_else(|| TaskError::new("event has no object key"))?,
        );

        match trigger {
            WorkflowTrigger::Video => {
                data.insert("srcVideo".to_string(), json!(object_key));
            }
            WorkflowTrigger::Metadata => {
                info!(key = object_key.as_str(), "Validating metadata file");
                data.insert("srcMetadataFile".to_string(), json!(object_key));

                let metadata = self
                    .source_json(&self.config.src_bucket, &object_key)
                    .await?;
                let metadata = metadata
                    .as_object()
                    .ok_or_else(|| TaskError::new("metadata file is not a JSON object"))?;

                if !metadata.contains_key("srcVideo") {
                    return Err(TaskError::new("srcVideo is not defined in metadata"));
                }

                // Any configuration default can be overridden per asset.
                for (field, value) in metadata {
                    data.insert(field.clone(), value.clone());
                }

                let src_video = data["srcVideo"]
                    .as_str()
                    .ok_or_else(|| TaskError::new("srcVideo is not a string"))?
                    .to_string();
                self.check_source_exists(&self.config.src_bucket, &src_video)
                    .await?;
            }
        }

        Ok(Value::Object(data))
    }
}

/// Chains one workflow stage into the next by handing `{guid}` back to the
/// dispatcher.
#[async_trait]
pub trait WorkflowChain: Send + Sync {
    async fn start_process(&self, guid: &str) -> Result<(), model::Error>;
}

pub struct ProcessExecute {
    chain: Arc<dyn WorkflowChain>,
}

impl ProcessExecute {
    pub fn new(chain: Arc<dyn WorkflowChain>) -> Self {
        ProcessExecute { chain }
    }
}

#[async_trait]
impl StepTask for ProcessExecute {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?;

        self.chain
            .start_process(guid)
            .await
            .map_err(TaskError::from_source)?;

        Ok(payload)
    }
}
