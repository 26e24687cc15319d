use async_trait::async_trait;
use model::record::WorkflowRecord;
use model::Error;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Store for workflow records, one per asset, keyed by guid.
///
/// Reads and writes are single-item; there are no multi-item transactions.
/// `update_record` is an upsert merging the given fields into the stored
/// record. Last-writer-wins is acceptable because the workflow engine
/// already serializes writers for a given guid.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_record(&self, guid: &str) -> Result<WorkflowRecord, StateError>;

    async fn update_record(
        &self,
        guid: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StateError>;
}

/// Errors arising from the record store.
#[derive(Debug)]
pub struct StateError {
    pub guid: String,

    pub operation: StateOperation,
    pub reason: StateErrorReason,
}

#[derive(Debug)]
pub enum StateErrorReason {
    // The record for this guid does not exist.
    MissingRecord,
    // The stored item could not be converted to a record
    BadRecord(String),
    // An error from the underlying store
    BackendFailure(Error),
}

#[derive(Debug, Clone)]
pub enum StateOperation {
    GetRecord,
    UpdateRecord,
}

impl StateError {
    pub fn new(guid: String, operation: StateOperation, reason: StateErrorReason) -> Self {
        StateError {
            guid,
            operation,
            reason,
        }
    }

    /// True when the failure is the record simply not being there, as
    /// opposed to the store misbehaving.
    pub fn is_missing_record(&self) -> bool {
        matches!(self.reason, StateErrorReason::MissingRecord)
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(format!("{:?}", self).as_str())
    }
}

impl std::error::Error for StateError {}
