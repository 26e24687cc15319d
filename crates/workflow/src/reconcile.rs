use crate::utc_now;
use async_trait::async_trait;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::types::MetadataDirective;
use futures::future::try_join_all;
use graph::{StepTask, TaskError};
use model::encode::{EncodeCompleteEvent, EncodeDetail};
use model::record::WorkflowRecord;
use serde_json::{json, Map, Value};
use state::RecordStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no record found for {0}")]
    RecordNotFound(String),

    #[error("could not parse encoder output group type {0}")]
    UnparseableOutput(String),

    #[error("no thumbnails found under {0}")]
    NoThumbnails(String),

    #[error("malformed completion event: {0}")]
    BadEvent(String),

    #[error("record store failure: {0}")]
    Store(#[source] model::Error),

    #[error("storage failure: {0}")]
    Storage(#[source] model::Error),
}

/// `s3://bucket/key` -> `https://domain/key`
pub(crate) fn delivery_url(domain: &str, s3_uri: &str) -> Result<String, ReconcileError> {
    let path = s3_uri
        .strip_prefix("s3://")
        .ok_or_else(|| ReconcileError::BadEvent(format!("not an s3 uri: {s3_uri}")))?;
    let (_bucket, object_key) = path
        .split_once('/')
        .ok_or_else(|| ReconcileError::BadEvent(format!("s3 uri has no key: {s3_uri}")))?;

    Ok(format!("https://{domain}/{object_key}"))
}

/// Map each rendition bundle onto the record's playlist and URL fields.
/// Unrecognized group types are fatal, never skipped.
pub(crate) fn apply_output_groups(
    data: &mut Map<String, Value>,
    detail: &EncodeDetail,
    domain: &str,
) -> Result<(), ReconcileError> {
    for group in &detail.output_group_details {
        debug!(kind = group.kind.as_str(), "Reconciling output group");

        let first_playlist = || {
            group.playlist_file_paths.first().cloned().ok_or_else(|| {
                ReconcileError::BadEvent(format!("{} has no playlist", group.kind))
            })
        };

        match group.kind.as_str() {
            "HLS_GROUP" => {
                let playlist = first_playlist()?;
                data.insert("hlsUrl".to_string(), json!(delivery_url(domain, &playlist)?));
                data.insert("hlsPlaylist".to_string(), json!(playlist));
            }
            "DASH_ISO_GROUP" => {
                let playlist = first_playlist()?;
                data.insert("dashUrl".to_string(), json!(delivery_url(domain, &playlist)?));
                data.insert("dashPlaylist".to_string(), json!(playlist));
            }
            "MS_SMOOTH_GROUP" => {
                let playlist = first_playlist()?;
                data.insert("mssUrl".to_string(), json!(delivery_url(domain, &playlist)?));
                data.insert("mssPlaylist".to_string(), json!(playlist));
            }
            "CMAF_GROUP" => {
                let [dash, hls] = group.playlist_file_paths.as_slice() else {
                    return Err(ReconcileError::BadEvent(
                        "CMAF_GROUP did not produce a dash and an hls playlist".to_string(),
                    ));
                };

                data.insert("cmafDashUrl".to_string(), json!(delivery_url(domain, dash)?));
                data.insert("cmafDashPlaylist".to_string(), json!(dash));
                data.insert("cmafHlsUrl".to_string(), json!(delivery_url(domain, hls)?));
                data.insert("cmafHlsPlaylist".to_string(), json!(hls));
            }
            "FILE_GROUP" => {
                let mut files: Vec<String> = Vec::new();
                let mut urls: Vec<String> = Vec::new();

                for output in &group.output_details {
                    if let Some(path) = output.output_file_paths.first() {
                        urls.push(delivery_url(domain, path)?);
                        files.push(path.clone());
                    }
                }

                match files.first().map(|file| file.rsplit('.').next()) {
                    Some(Some("mp4")) => {
                        data.insert("mp4Outputs".to_string(), json!(files));
                        data.insert("mp4Urls".to_string(), json!(urls));
                    }
                    Some(Some("jpg")) => {
                        data.insert("thumbNail".to_string(), json!(files));
                        data.insert("thumbNailUrl".to_string(), json!(urls));
                    }
                    _ => {}
                }
            }
            other => return Err(ReconcileError::UnparseableOutput(other.to_string())),
        }
    }

    Ok(())
}

fn content_type_for(object_key: &str) -> &'static str {
    match object_key.rsplit('.').next() {
        Some("m3u8") => "application/x-mpegURL",
        Some("ts") => "video/MP2T",
        Some("jpg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn encode_copy_source(bucket: &str, object_key: &str) -> String {
    let encoded: Vec<String> = object_key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();

    format!("{bucket}/{}", encoded.join("/"))
}

/// Loads the record, maps the encoder output onto it, resolves the
/// representative thumbnail from storage and propagates the source object's
/// metadata over every output object.
pub struct ValidateEncodingOutput {
    store: Arc<dyn RecordStore>,
    s3_client: aws_sdk_s3::Client,
}

impl ValidateEncodingOutput {
    pub fn new(store: Arc<dyn RecordStore>, s3_client: aws_sdk_s3::Client) -> Self {
        ValidateEncodingOutput { store, s3_client }
    }

    async fn reconcile(&self, payload: &Value) -> Result<Value, ReconcileError> {
        let event: EncodeCompleteEvent = serde_json::from_value(payload.clone())
            .map_err(|err| ReconcileError::BadEvent(err.to_string()))?;
        let guid = event
            .detail
            .guid()
            .ok_or_else(|| ReconcileError::BadEvent("completion event has no guid".to_string()))?
            .to_string();

        let record: WorkflowRecord = self.store.get_record(&guid).await.map_err(|err| {
            if err.is_missing_record() {
                ReconcileError::RecordNotFound(guid.clone())
            } else {
                ReconcileError::Store(err.into())
            }
        })?;

        let domain = record
            .cloud_front
            .clone()
            .ok_or_else(|| ReconcileError::BadEvent("record has no delivery domain".to_string()))?;
        let dest_bucket = record
            .dest_bucket
            .clone()
            .ok_or_else(|| ReconcileError::BadEvent("record has no destination bucket".to_string()))?;
        let frame_capture = record.frame_capture == Some(true);

        let record_value = serde_json::to_value(&record)
            .map_err(|err| ReconcileError::BadEvent(err.to_string()))?;
        let Value::Object(mut data) = record_value else {
            return Err(ReconcileError::BadEvent("record is not an object".to_string()));
        };

        apply_output_groups(&mut data, &event.detail, &domain)?;

        if frame_capture {
            let prefix = format!("{guid}/thumbnails/");
            let thumbnail = self
                .last_thumbnail(&dest_bucket, &prefix)
                .await?
                .ok_or_else(|| ReconcileError::NoThumbnails(prefix))?;

            data.insert(
                "thumbNailUrl".to_string(),
                json!([format!("https://{domain}/{thumbnail}")]),
            );
            data.insert("thumbNail".to_string(), json!([thumbnail]));
        }

        if let (Some(src_bucket), Some(src_video)) = (&record.src_bucket, &record.src_video) {
            self.propagate_metadata(src_bucket, src_video, &dest_bucket, &guid)
                .await?;
        }

        data.insert("encodingOutput".to_string(), payload.clone());
        data.insert("workflowStatus".to_string(), json!("Complete"));
        data.insert("endTime".to_string(), json!(utc_now()));

        info!(guid = guid.as_str(), "Reconciled encoder output");

        Ok(Value::Object(data))
    }

    /// Completion events can omit thumbnails when acceleration is on, so the
    /// listing is the only reliable source. The last key lexicographically is
    /// the last frame captured.
    async fn last_thumbnail(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Option<String>, ReconcileError> {
        let mut pages = self
            .s3_client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut last: Option<String> = None;
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| ReconcileError::Storage(err.into()))?;

            for object in page.contents() {
                if let Some(object_key) = object.key() {
                    if last.as_deref() < Some(object_key) {
                        last = Some(object_key.to_string());
                    }
                }
            }
        }

        Ok(last)
    }

    async fn propagate_metadata(
        &self,
        src_bucket: &str,
        src_video: &str,
        dest_bucket: &str,
        guid: &str,
    ) -> Result<(), ReconcileError> {
        let source: HeadObjectOutput = self
            .s3_client
            .head_object()
            .bucket(src_bucket)
            .key(src_video)
            .send()
            .await
            .map_err(|err| ReconcileError::Storage(err.into()))?;

        let metadata: Option<HashMap<String, String>> = source.metadata.clone();

        let mut pages = self
            .s3_client
            .list_objects_v2()
            .bucket(dest_bucket)
            .prefix(format!("{guid}/"))
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| ReconcileError::Storage(err.into()))?;

            let copies = page.contents().iter().filter_map(|object| {
                let object_key = object.key()?.to_string();

                Some(
                    self.s3_client
                        .copy_object()
                        .bucket(dest_bucket)
                        .key(&object_key)
                        .copy_source(encode_copy_source(dest_bucket, &object_key))
                        .metadata_directive(MetadataDirective::Replace)
                        .content_type(content_type_for(&object_key))
                        .set_metadata(metadata.clone())
                        .set_cache_control(source.cache_control.clone())
                        .set_content_disposition(source.content_disposition.clone())
                        .set_content_encoding(source.content_encoding.clone())
                        .set_content_language(source.content_language.clone())
                        .send(),
                )
            });

            try_join_all(copies)
                .await
                .map_err(|err| ReconcileError::Storage(err.into()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl StepTask for ValidateEncodingOutput {
    async fn run(&self, payload: Value) -> Result<Value, TaskError> {
        self.reconcile(&payload)
            .await
            .map_err(TaskError::from_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_in_memory::InMemoryRecordStore;
    use test_utils::stub_s3_client;

    fn detail(groups: Value) -> EncodeDetail {
        serde_json::from_value(json!({
            "status": "COMPLETE",
            "jobId": "123",
            "userMetadata": { "guid": "guid" },
            "outputGroupDetails": groups
        }))
        .unwrap()
    }

    #[test]
    fn hls_playlist_maps_onto_the_delivery_domain() {
        let mut data = Map::new();
        let detail = detail(json!([{
            "type": "HLS_GROUP",
            "playlistFilePaths": ["s3://bucket/guid/hls/name.m3u8"]
        }]));

        apply_output_groups(&mut data, &detail, "cdn.example").unwrap();

        assert_eq!(data["hlsUrl"], "https://cdn.example/guid/hls/name.m3u8");
        assert_eq!(data["hlsPlaylist"], "s3://bucket/guid/hls/name.m3u8");
    }

    #[test]
    fn file_groups_split_by_extension() {
        let mut data = Map::new();
        let detail = detail(json!([
            {
                "type": "FILE_GROUP",
                "outputDetails": [
                    { "outputFilePaths": ["s3://bucket/guid/mp4/name_720p.mp4"] },
                    { "outputFilePaths": ["s3://bucket/guid/mp4/name_1080p.mp4"] }
                ]
            },
            {
                "type": "FILE_GROUP",
                "outputDetails": [
                    { "outputFilePaths": ["s3://bucket/guid/thumbnails/name_thumb.jpg"] }
                ]
            }
        ]));

        apply_output_groups(&mut data, &detail, "cdn.example").unwrap();

        assert_eq!(
            data["mp4Urls"],
            json!([
                "https://cdn.example/guid/mp4/name_720p.mp4",
                "https://cdn.example/guid/mp4/name_1080p.mp4"
            ])
        );
        assert_eq!(
            data["thumbNail"],
            json!(["s3://bucket/guid/thumbnails/name_thumb.jpg"])
        );
    }

    #[test]
    fn cmaf_produces_both_playlists() {
        let mut data = Map::new();
        let detail = detail(json!([{
            "type": "CMAF_GROUP",
            "playlistFilePaths": [
                "s3://bucket/guid/cmaf/name.mpd",
                "s3://bucket/guid/cmaf/name.m3u8"
            ]
        }]));

        apply_output_groups(&mut data, &detail, "cdn.example").unwrap();

        assert_eq!(data["cmafDashUrl"], "https://cdn.example/guid/cmaf/name.mpd");
        assert_eq!(data["cmafHlsUrl"], "https://cdn.example/guid/cmaf/name.m3u8");
    }

    #[test]
    fn unknown_group_type_always_raises() {
        let mut data = Map::new();
        let detail = detail(json!([{ "type": "TELETEXT_GROUP" }]));

        let err = apply_output_groups(&mut data, &detail, "cdn.example").unwrap_err();

        assert!(matches!(err, ReconcileError::UnparseableOutput(kind) if kind == "TELETEXT_GROUP"));
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for("a/b.m3u8"), "application/x-mpegURL");
        assert_eq!(content_type_for("a/b_00001.ts"), "video/MP2T");
        assert_eq!(content_type_for("a/thumb.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a/b.mpd"), "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_record_is_fatal() {
        let task = ValidateEncodingOutput::new(
            Arc::new(InMemoryRecordStore::default()),
            stub_s3_client(),
        );

        let err = task
            .reconcile(&json!({
                "detail": {
                    "status": "COMPLETE",
                    "jobId": "123",
                    "userMetadata": { "guid": "missing" }
                }
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::RecordNotFound(guid) if guid == "missing"));
    }
}
