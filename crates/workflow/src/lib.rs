//! Task implementations and graph definitions for the three workflow
//! stages: ingest, process and publish.

use graph::TaskError;
use serde_json::{Map, Value};

pub mod definitions;
pub mod ingest;
pub mod mediainfo;
pub mod notify;
pub mod process;
pub mod publish;
pub mod reconcile;
pub mod record;

pub(crate) fn utc_now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.1f").to_string()
}

pub(crate) fn require_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, TaskError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| TaskError::new(format!("{field} is not defined in the payload")))
}

pub(crate) fn require_object(payload: &Value) -> Result<&Map<String, Value>, TaskError> {
    payload
        .as_object()
        .ok_or_else(|| TaskError::new("payload is not an object"))
}
