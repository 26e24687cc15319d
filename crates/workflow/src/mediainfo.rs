use crate::require_str;
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use graph::{StepTask, TaskError};
use model::mediainfo::{AudioTrack, Container, MediaInfo, VideoTrack};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const PRESIGN_TTL: Duration = Duration::from_secs(900);

/// Extracts container and stream metadata for a source object.
#[async_trait]
pub trait MediaInfoProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<MediaInfo, model::Error>;
}

/// Runs the bundled `mediainfo` binary against a presigned URL and converts
/// its JSON report into our track model.
pub struct MediaInfoCli {
    binary: String,
}

impl MediaInfoCli {
    pub fn new(binary: impl Into<String>) -> Self {
        MediaInfoCli {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaInfoProbe for MediaInfoCli {
    async fn probe(&self, url: &str) -> Result<MediaInfo, model::Error> {
        let output = Command::new(&self.binary)
            .arg("--Output=JSON")
            .arg(url)
            .output()
            .await?;

        if !output.status.success() {
            return Err(format!(
                "mediainfo exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }

        let report: Value = serde_json::from_slice(&output.stdout)?;
        parse_report(&report)
    }
}

/// The raw report nests everything under `media.track` with an `@type`
/// discriminator and every scalar as a string.
fn parse_report(report: &Value) -> Result<MediaInfo, model::Error> {
    let tracks = report["media"]["track"]
        .as_array()
        .ok_or("mediainfo report has no tracks")?;

    let mut filename = String::new();
    let mut container = Container {
        format: None,
        file_size: None,
        duration: None,
        total_bitrate: None,
    };
    let mut video: Vec<VideoTrack> = Vec::new();
    let mut audio: Vec<AudioTrack> = Vec::new();

    for track in tracks {
        match track["@type"].as_str() {
            Some("General") => {
                filename = string_field(track, "CompleteName").unwrap_or_default();
                container = Container {
                    format: string_field(track, "Format"),
                    file_size: number_field(track, "FileSize"),
                    duration: float_field(track, "Duration"),
                    total_bitrate: number_field(track, "OverallBitRate"),
                };
            }
            Some("Video") => video.push(VideoTrack {
                codec: string_field(track, "Format"),
                profile: string_field(track, "Format_Profile"),
                bitrate: number_field(track, "BitRate"),
                duration: float_field(track, "Duration"),
                frame_count: number_field(track, "FrameCount"),
                width: number_field(track, "Width").unwrap_or_default() as u32,
                height: number_field(track, "Height").unwrap_or_default() as u32,
                framerate: float_field(track, "FrameRate"),
                scan_type: string_field(track, "ScanType"),
                aspect_ratio: string_field(track, "DisplayAspectRatio"),
                bit_depth: number_field(track, "BitDepth").map(|depth| depth as u32),
                color_space: string_field(track, "ColorSpace"),
            }),
            Some("Audio") => audio.push(AudioTrack {
                codec: string_field(track, "Format"),
                bitrate: number_field(track, "BitRate"),
                duration: float_field(track, "Duration"),
                frame_count: number_field(track, "FrameCount"),
                bitrate_mode: string_field(track, "BitRate_Mode"),
                channels: number_field(track, "Channels").map(|channels| channels as u32),
                sampling_rate: number_field(track, "SamplingRate"),
                sample_per_frame: number_field(track, "SamplesPerFrame"),
            }),
            _ => {}
        }
    }

    Ok(MediaInfo {
        filename,
        container,
        video,
        audio,
    })
}

fn string_field(track: &Value, field: &str) -> Option<String> {
    track[field].as_str().map(str::to_string)
}

fn number_field(track: &Value, field: &str) -> Option<u64> {
    match &track[field] {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
}

fn float_field(track: &Value, field: &str) -> Option<f64> {
    match &track[field] {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

/// Presigns the source object and stores the probe result on the payload as
/// a JSON string, the shape the profiler reads back.
pub struct Mediainfo {
    s3_client: aws_sdk_s3::Client,
    probe: Arc<dyn MediaInfoProbe>,
}

impl Mediainfo {
    pub fn new(s3_client: aws_sdk_s3::Client, probe: Arc<dyn MediaInfoProbe>) -> Self {
        Mediainfo { s3_client, probe }
    }
}

#[async_trait]
impl StepTask for Mediainfo {
    async fn run(&self, mut payload: Value) -> Result<Value, TaskError> {
        let bucket = require_str(&payload, "srcBucket")?;
        let object_key = require_str(&payload, "srcVideo")?;

        let presigned = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(object_key)
            .presigned(
                PresigningConfig::expires_in(PRESIGN_TTL).map_err(TaskError::from_source)?,
            )
            .await
            .map_err(TaskError::from_source)?;

        let mut info = self
            .probe
            .probe(presigned.uri())
            .await
            .map_err(TaskError::from_source)?;
        info.filename = object_key.to_string();

        info!(
            src_video = object_key,
            tracks = info.video.len() + info.audio.len(),
            "Probed source media"
        );

        let serialized =
            serde_json::to_string_pretty(&info).map_err(TaskError::from_source)?;
        payload["srcMediainfo"] = json!(serialized);

        Ok(payload)
    }
}
