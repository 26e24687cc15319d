use crate::{WorkflowStatus, WorkflowTrigger};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row per asset, keyed by guid. Created by the ingest workflow's first
/// record write and mutated by every later step; the core never deletes it.
///
/// Steps attach fields this struct does not enumerate (override flags from
/// metadata sidecars, CMS correlation ids, ...), so unknown members are kept
/// in `extra` rather than dropped on a read-modify-write cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub guid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_status: Option<WorkflowStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_trigger: Option<WorkflowTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_mediainfo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_front: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_capture: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerated_transcoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_sns: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_sqs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_media_package: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_purge: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_profile: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encode_job_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_playlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash_playlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mss_playlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mss_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmaf_dash_playlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmaf_dash_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmaf_hls_playlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmaf_hls_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp4_outputs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp4_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_nail: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_nail_url: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_endpoints: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowRecord {
    pub fn new(guid: impl Into<String>) -> Self {
        WorkflowRecord {
            guid: guid.into(),
            workflow_status: None,
            workflow_trigger: None,
            workflow_name: None,
            start_time: None,
            end_time: None,
            src_bucket: None,
            src_video: None,
            src_mediainfo: None,
            dest_bucket: None,
            cloud_front: None,
            frame_capture: None,
            archive_source: None,
            accelerated_transcoding: None,
            enable_sns: None,
            enable_sqs: None,
            enable_media_package: None,
            do_purge: None,
            job_template: None,
            encoding_profile: None,
            encode_job_id: None,
            hls_playlist: None,
            hls_url: None,
            dash_playlist: None,
            dash_url: None,
            mss_playlist: None,
            mss_url: None,
            cmaf_dash_playlist: None,
            cmaf_dash_url: None,
            cmaf_hls_playlist: None,
            cmaf_hls_url: None,
            mp4_outputs: None,
            mp4_urls: None,
            thumb_nail: None,
            thumb_nail_url: None,
            egress_endpoints: None,
            error_message: None,
            error_details: None,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let json = serde_json::json!({
            "guid": "abc",
            "workflowStatus": "Ingest",
            "cmsId": "4bDSt1XOvNSn",
            "inputRotate": "DEGREE_0"
        });

        let record: WorkflowRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.extra.get("cmsId").unwrap(), "4bDSt1XOvNSn");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["inputRotate"], "DEGREE_0");
        assert_eq!(back["workflowStatus"], "Ingest");
    }

    #[test]
    fn unset_fields_are_not_serialized() {
        let record = WorkflowRecord::new("abc");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value.as_object().unwrap().len(), 1);
        assert_eq!(value["guid"], "abc");
    }
}
