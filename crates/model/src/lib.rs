use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod config;
pub mod encode;
pub mod key;
pub mod mediainfo;
pub mod record;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// End-to-end status of one asset's run through the three workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Ingest,
    Encoding,
    Complete,
    Error,
}

impl WorkflowStatus {
    /// Statuses that open an incident alert when observed.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, WorkflowStatus::Error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowStatus::Complete)
    }
}

impl Display for WorkflowStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStatus::Ingest => "Ingest",
            WorkflowStatus::Encoding => "Encoding",
            WorkflowStatus::Complete => "Complete",
            WorkflowStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

/// What dropped the source object into the ingest bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowTrigger {
    Video,
    Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_as_bare_string() {
        let json = serde_json::to_string(&WorkflowStatus::Encoding).unwrap();
        assert_eq!(json, "\"Encoding\"");

        let status: WorkflowStatus = serde_json::from_str("\"Complete\"").unwrap();
        assert!(status.is_success());
    }

    #[test]
    fn only_error_is_terminal_failure() {
        assert!(WorkflowStatus::Error.is_terminal_failure());
        assert!(!WorkflowStatus::Ingest.is_terminal_failure());
        assert!(!WorkflowStatus::Complete.is_terminal_failure());
    }
}
