use async_trait::async_trait;
use model::record::WorkflowRecord;
use serde_json::{Map, Value};
use state::StateErrorReason::{BadRecord, MissingRecord};
use state::StateOperation::{GetRecord, UpdateRecord};
use state::{RecordStore, StateError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Record store holding every record as a JSON object, for use in testing.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<Mutex<HashMap<String, Map<String, Value>>>>,
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_record(&self, guid: &str) -> Result<WorkflowRecord, StateError> {
        let guard = self.records.lock().unwrap();
        let item: Map<String, Value> = guard
            .get(guid)
            .ok_or_else(|| StateError::new(guid.to_string(), GetRecord, MissingRecord))?
            .clone();

        serde_json::from_value(Value::Object(item)).map_err(|err| {
            StateError::new(guid.to_string(), GetRecord, BadRecord(err.to_string()))
        })
    }

    async fn update_record(
        &self,
        guid: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StateError> {
        let mut guard = self.records.lock().unwrap();
        let item = guard.entry(guid.to_string()).or_default();

        item.insert("guid".to_string(), Value::String(guid.to_string()));
        for (key, value) in fields {
            if key == "guid" {
                continue;
            }
            item.insert(key, value);
        }

        Ok(())
    }
}

impl InMemoryRecordStore {
    /// Seed a full record, bypassing the field-merge path.
    pub fn seed(&self, record: &WorkflowRecord) -> Result<(), StateError> {
        let value = serde_json::to_value(record).map_err(|err| {
            StateError::new(record.guid.clone(), UpdateRecord, BadRecord(err.to_string()))
        })?;

        let Value::Object(item) = value else {
            unreachable!("a record always serializes to an object");
        };

        self.records.lock().unwrap().insert(record.guid.clone(), item);
        Ok(())
    }
}
