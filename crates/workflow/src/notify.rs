use crate::{require_object, require_str};
use async_trait::async_trait;
use graph::{StepTask, TaskError};
use serde_json::{json, Map, Value};
use tracing::info;

/// Fields too bulky for a completion notification.
const TRIMMED_FIELDS: &[&str] = &[
    "srcMediainfo",
    "jobTemplate2160p",
    "jobTemplate1080p",
    "jobTemplate720p",
    "encodingJob",
    "encodingOutput",
];

/// Publishes a workflow status notification to the subscriber topic.
pub struct SnsNotification {
    sns_client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsNotification {
    pub fn new(sns_client: aws_sdk_sns::Client, topic_arn: String) -> Self {
        SnsNotification {
            sns_client,
            topic_arn,
        }
    }
}

pub(crate) fn notification_body(payload: &Value) -> Result<Value, TaskError> {
    let status = require_str(payload, "workflowStatus")?;

    match status {
        "Complete" => {
            let mut message: Map<String, Value> = require_object(payload)?.clone();
            for field in TRIMMED_FIELDS {
                message.remove(*field);
            }

            Ok(Value::Object(message))
        }
        "Ingest" => Ok(json!({
            "status": status,
            "guid": payload["guid"],
            "srcVideo": payload["srcVideo"],
        })),
        other => Err(TaskError::new(format!(
            "workflow status {other} is not notifiable"
        ))),
    }
}

#[async_trait]
impl StepTask for SnsNotification {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?;
        let status = require_str(&payload, "workflowStatus")?;
        let subject = format!("Workflow Status:: {status}:: {guid}");

        let message = notification_body(&payload)?;

        info!(guid, status, "Publishing status notification");

        self.sns_client
            .publish()
            .target_arn(&self.topic_arn)
            .subject(subject)
            .message(serde_json::to_string_pretty(&message).map_err(TaskError::from_source)?)
            .send()
            .await
            .map_err(TaskError::from_source)?;

        Ok(payload)
    }
}

/// Queues the full result payload for downstream consumers.
pub struct SqsSendMessage {
    sqs_client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsSendMessage {
    pub fn new(sqs_client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        SqsSendMessage {
            sqs_client,
            queue_url,
        }
    }
}

#[async_trait]
impl StepTask for SqsSendMessage {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        self.sqs_client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(
                serde_json::to_string_pretty(&payload).map_err(TaskError::from_source)?,
            )
            .send()
            .await
            .map_err(TaskError::from_source)?;

        Ok(payload)
    }
}
