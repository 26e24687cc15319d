//! Normalizes the three failure shapes the pipeline produces into one
//! alerting record: handler failures (tagged with the failing state),
//! encoder job errors and workflow-engine terminal events. Side effects are
//! best-effort and independent; classification itself is strict.

use async_trait::async_trait;
use aws_lambda_events::sns::SnsEvent;
use graph::FailureSink;
use lambda_runtime::LambdaEvent;
use model::WorkflowStatus;
use serde_json::{json, Map, Value};
use state::RecordStore;
use std::sync::Arc;
use tracing::{error, info};

mod alert;
mod chat;

pub use alert::{alert_action, AlertAction, AlertApi, HttpAlertApi};
pub use chat::ChatNotifier;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("event shape is not classifiable")]
    UnclassifiableEvent,
}

/// One normalized failure (or recovery) observation.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub guid: String,
    pub stage: String,
    pub message: String,
    pub details: String,
    pub status: WorkflowStatus,
}

/// Branch on the event shape; anything unrecognized is itself a
/// classification failure, never a silent default.
pub fn classify(event: &Value) -> Result<FailureRecord, ClassifyError> {
    let details = serde_json::to_string_pretty(event).unwrap_or_default();

    if let Some(function) = event.get("function").and_then(Value::as_str) {
        let guid = event
            .get("guid")
            .and_then(Value::as_str)
            .ok_or(ClassifyError::UnclassifiableEvent)?;

        return Ok(FailureRecord {
            guid: guid.to_string(),
            stage: function.to_string(),
            message: event
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            details,
            status: WorkflowStatus::Error,
        });
    }

    if let Some(message) = event["detail"]["errorMessage"].as_str() {
        let guid = event["detail"]["userMetadata"]["guid"]
            .as_str()
            .ok_or(ClassifyError::UnclassifiableEvent)?;

        return Ok(FailureRecord {
            guid: guid.to_string(),
            stage: "Encoding".to_string(),
            message: message.to_string(),
            details,
            status: WorkflowStatus::Error,
        });
    }

    if event["source"].as_str() == Some("aws.states") {
        let execution_status = event["detail"]["status"].as_str().unwrap_or("FAILED");

        // The correlation id only lives inside the execution's input.
        let input: Value = event["detail"]["input"]
            .as_str()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .ok_or(ClassifyError::UnclassifiableEvent)?;
        let guid = input["guid"]
            .as_str()
            .ok_or(ClassifyError::UnclassifiableEvent)?;

        let status = if execution_status == "SUCCEEDED" {
            WorkflowStatus::Complete
        } else {
            WorkflowStatus::Error
        };

        return Ok(FailureRecord {
            guid: guid.to_string(),
            stage: "StepFunction".to_string(),
            message: format!("execution {execution_status}"),
            details,
            status,
        });
    }

    Err(ClassifyError::UnclassifiableEvent)
}

pub struct ErrorClassifier {
    store: Arc<dyn RecordStore>,
    sns_client: aws_sdk_sns::Client,
    topic_arn: String,
    alerts: Arc<dyn AlertApi>,
    chat: Option<ChatNotifier>,
}

impl ErrorClassifier {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sns_client: aws_sdk_sns::Client,
        topic_arn: String,
        alerts: Arc<dyn AlertApi>,
        chat: Option<ChatNotifier>,
    ) -> Self {
        ErrorClassifier {
            store,
            sns_client,
            topic_arn,
            alerts,
            chat,
        }
    }

    /// Classify one event, durably record terminal failures and reconcile
    /// the alert lifecycle. Each side effect is attempted independently; a
    /// failure to notify is logged, never raised.
    pub async fn handle(&self, event: Value) -> Result<(), ClassifyError> {
        let failure = classify(&event)?;

        info!(
            guid = failure.guid.as_str(),
            stage = failure.stage.as_str(),
            status = %failure.status,
            "Classified failure event"
        );

        if failure.status.is_terminal_failure() {
            if let Err(err) = self.update_record(&failure).await {
                error!(guid = failure.guid.as_str(), "Record update failed: {err}");
            }

            if let Err(err) = self.notify(&failure).await {
                error!(guid = failure.guid.as_str(), "Notification failed: {err}");
            }

            if let Some(chat) = &self.chat {
                let text = format!(
                    "{} failed for `{}`: {}",
                    failure.stage, failure.guid, failure.message
                );
                if let Err(err) = chat.post(&text).await {
                    error!(guid = failure.guid.as_str(), "Chat post failed: {err}");
                }
            }
        }

        if let Err(err) = self.reconcile_alert(&failure).await {
            error!(guid = failure.guid.as_str(), "Alert reconciliation failed: {err}");
        }

        Ok(())
    }

    async fn update_record(&self, failure: &FailureRecord) -> Result<(), model::Error> {
        let mut fields = Map::new();
        fields.insert("workflowStatus".to_string(), json!("Error"));
        fields.insert("workflowErrorAt".to_string(), json!(failure.stage));
        fields.insert("errorMessage".to_string(), json!(failure.message));
        fields.insert("errorDetails".to_string(), json!(failure.details));

        self.store.update_record(&failure.guid, fields).await?;

        Ok(())
    }

    async fn notify(&self, failure: &FailureRecord) -> Result<(), model::Error> {
        self.sns_client
            .publish()
            .target_arn(&self.topic_arn)
            .subject(format!("Workflow error: {}", failure.guid))
            .message(&failure.details)
            .send()
            .await?;

        Ok(())
    }

    async fn reconcile_alert(&self, failure: &FailureRecord) -> Result<(), model::Error> {
        let open = self.alerts.find_open(&failure.guid).await?;

        match alert_action(open.is_some(), failure.status) {
            Some(AlertAction::Open) => {
                let message = format!("{} failed for {}", failure.stage, failure.guid);
                self.alerts
                    .open(&failure.guid, &message, &failure.details)
                    .await
            }
            Some(AlertAction::Close) => self.alerts.close(&failure.guid).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FailureSink for ErrorClassifier {
    async fn task_failed(&self, event: Value) {
        if let Err(err) = self.handle(event).await {
            error!("Dropping unclassifiable failure event: {err}");
        }
    }
}

/// Lambda-shaped adapter for the notification-topic subscription.
pub async fn handler(
    classifier: &ErrorClassifier,
    event: LambdaEvent<SnsEvent>,
) -> Result<(), model::Error> {
    for record in event.payload.records {
        let message: Value = serde_json::from_str(&record.sns.message)?;

        classifier.handle(message).await?;
    }

    Ok(())
}
