use serde::{Deserialize, Serialize};

/// Storage class the source object is tagged for after a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveMode {
    Disabled,
    Glacier,
    DeepArchive,
}

impl ArchiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMode::Disabled => "DISABLED",
            ArchiveMode::Glacier => "GLACIER",
            ArchiveMode::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

/// Hardware acceleration request forwarded to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccelerationMode {
    Enabled,
    Preferred,
    Disabled,
}

impl AccelerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccelerationMode::Enabled => "ENABLED",
            AccelerationMode::Preferred => "PREFERRED",
            AccelerationMode::Disabled => "DISABLED",
        }
    }
}

/// Deployment-scoped settings seeded into every record at ingest.
/// Supplied by the entry point, passed in explicitly so tests never have to
/// mutate the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub workflow_name: String,
    pub src_bucket: String,
    pub dest_bucket: String,
    /// Public delivery domain fronting the destination bucket.
    pub cloud_front: String,

    pub frame_capture: bool,
    pub archive_source: ArchiveMode,
    pub accelerated_transcoding: AccelerationMode,
    pub enable_sns: bool,
    pub enable_sqs: bool,
    pub enable_media_package: bool,

    pub job_template_2160p: String,
    pub job_template_1080p: String,
    pub job_template_720p: String,
}
