use crate::{require_object, require_str};
use async_trait::async_trait;
use graph::{StepTask, TaskError};
use state::RecordStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Persists every payload field onto the workflow record. Used by all three
/// graphs; the payload passes through unchanged.
pub struct UpdateRecord {
    store: Arc<dyn RecordStore>,
}

impl UpdateRecord {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        UpdateRecord { store }
    }
}

#[async_trait]
impl StepTask for UpdateRecord {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?;
        let fields = require_object(&payload)?.clone();

        debug!(guid, fields = fields.len(), "Updating record");

        self.store
            .update_record(guid, fields)
            .await
            .map_err(TaskError::from_source)?;

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use state_in_memory::InMemoryRecordStore;

    #[tokio::test]
    async fn writes_the_payload_and_passes_it_through() {
        let store = Arc::new(InMemoryRecordStore::default());
        let task = UpdateRecord::new(store.clone());

        let payload = json!({
            "guid": "abc123",
            "workflowStatus": "Encoding",
            "encodeJobId": "123-abc"
        });

        let result = task.run(payload.clone()).await.unwrap();
        assert_eq!(result, payload);

        let record = store.get_record("abc123").await.unwrap();
        assert_eq!(record.encode_job_id.as_deref(), Some("123-abc"));
        assert_eq!(record.workflow_status, Some(model::WorkflowStatus::Encoding));
    }
}
