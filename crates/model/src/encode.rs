use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Job state change notification emitted by the encoder on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeCompleteEvent {
    pub detail: EncodeDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeDetail {
    pub status: String,
    pub job_id: String,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    #[serde(default)]
    pub output_group_details: Vec<OutputGroupDetail>,
}

impl EncodeDetail {
    pub fn guid(&self) -> Option<&str> {
        self.user_metadata.get("guid").map(String::as_str)
    }
}

/// One logical rendition bundle (all HLS renditions, the thumbnail file
/// group, ...) produced by an encoding job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputGroupDetail {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub playlist_file_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_details: Vec<OutputDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDetail {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_file_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_completion_event() {
        let event: EncodeCompleteEvent = serde_json::from_value(serde_json::json!({
            "detail": {
                "status": "COMPLETE",
                "jobId": "1635845627440-knb1xf",
                "userMetadata": { "guid": "eJ2Qh0Mfpmm" },
                "outputGroupDetails": [{
                    "type": "HLS_GROUP",
                    "playlistFilePaths": ["s3://bucket/guid/hls/index.m3u8"],
                    "outputDetails": [{
                        "outputFilePaths": ["s3://bucket/guid/hls/index_720.m3u8"],
                        "durationInMs": 93666
                    }]
                }]
            }
        }))
        .unwrap();

        assert_eq!(event.detail.guid(), Some("eJ2Qh0Mfpmm"));
        assert_eq!(event.detail.output_group_details[0].kind, "HLS_GROUP");
    }
}
