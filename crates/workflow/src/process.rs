use crate::require_str;
use async_trait::async_trait;
use aws_sdk_mediaconvert::types::{
    AccelerationSettings, AudioDefaultSelection, AudioSelector, ColorSpace, ContainerSettings,
    ContainerType, DashIsoGroupSettings, FileGroupSettings, FrameCaptureSettings,
    HlsGroupSettings, Input, InputDeblockFilter, InputDenoiseFilter, InputFilterEnable,
    InputPsiControl, InputTimecodeSource, JobSettings, MsSmoothGroupSettings, Output,
    OutputGroup, OutputGroupSettings, OutputGroupType, VideoCodec, VideoCodecSettings,
    VideoDescription, VideoSelector,
};
use graph::{StepTask, TaskError};
use model::mediainfo::MediaInfo;
use serde_json::{json, Value};
use state::RecordStore;
use std::sync::Arc;
use tracing::info;

const PROFILES: [u32; 3] = [2160, 1080, 720];

/// Match the source height to the nearest rendition tier. Walks the tiers
/// top down and stops once the distance starts growing again, so a tie goes
/// to the lower tier.
pub(crate) fn nearest_profile(height: u32) -> u32 {
    let mut best = PROFILES[0];
    let mut best_distance = height.abs_diff(PROFILES[0]);

    for profile in &PROFILES[1..] {
        let distance = height.abs_diff(*profile);
        if distance > best_distance {
            break;
        }

        best = *profile;
        best_distance = distance;
    }

    best
}

fn frame_capture_width(profile: u32) -> u32 {
    match profile {
        2160 => 3840,
        1080 => 1920,
        _ => 1280,
    }
}

/// Merges the stored record into the payload and computes the encode
/// profile: rendition tier, frame-capture dimensions and the job template to
/// submit with, unless the payload carried a custom template.
pub struct Profiler {
    store: Arc<dyn RecordStore>,
}

impl Profiler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Profiler { store }
    }
}

#[async_trait]
impl StepTask for Profiler {
    async fn run(&self, mut payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?.to_string();

        let record = self
            .store
            .get_record(&guid)
            .await
            .map_err(TaskError::from_source)?;
        let record = serde_json::to_value(&record).map_err(TaskError::from_source)?;

        let Value::Object(fields) = record else {
            return Err(TaskError::new("record did not serialize to an object"));
        };
        for (field, value) in fields {
            payload[field] = value;
        }

        let info: MediaInfo = serde_json::from_str(require_str(&payload, "srcMediainfo")?)
            .map_err(TaskError::from_source)?;
        let video = info
            .video
            .first()
            .ok_or_else(|| TaskError::new("source has no video track"))?;

        payload["srcHeight"] = json!(video.height);
        payload["srcWidth"] = json!(video.width);

        let profile = nearest_profile(video.height);
        payload["encodingProfile"] = json!(profile);

        if payload["frameCapture"] == json!(true) {
            payload["frameCaptureHeight"] = json!(profile);
            payload["frameCaptureWidth"] = json!(frame_capture_width(profile));
        }

        let custom_template = payload
            .get("jobTemplate")
            .and_then(Value::as_str)
            .is_some_and(|template| !template.is_empty());
        payload["isCustomTemplate"] = json!(custom_template);

        if !custom_template {
            let tier_field = format!("jobTemplate{profile}p");
            let template = payload[tier_field.as_str()]
                .as_str()
                .ok_or_else(|| TaskError::new(format!("{tier_field} is not defined")))?
                .to_string();

            info!(guid = guid.as_str(), template = template.as_str(), "Selected job template");
            payload["jobTemplate"] = json!(template);
        }

        Ok(payload)
    }
}

/// Submits the encode job. The job template decides which rendition groups
/// exist; this step only points them at the asset's destination prefix.
pub struct Encode {
    mediaconvert_client: aws_sdk_mediaconvert::Client,
    role_arn: String,
}

impl Encode {
    pub fn new(mediaconvert_client: aws_sdk_mediaconvert::Client, role_arn: String) -> Self {
        Encode {
            mediaconvert_client,
            role_arn,
        }
    }

    fn destination_group(kind: &OutputGroupType, output_path: &str) -> Option<OutputGroup> {
        let settings = match kind {
            OutputGroupType::FileGroupSettings => OutputGroupSettings::builder()
                .r#type(OutputGroupType::FileGroupSettings)
                .file_group_settings(
                    FileGroupSettings::builder()
                        .destination(format!("{output_path}/mp4/"))
                        .build(),
                )
                .build(),
            OutputGroupType::HlsGroupSettings => OutputGroupSettings::builder()
                .r#type(OutputGroupType::HlsGroupSettings)
                .hls_group_settings(
                    HlsGroupSettings::builder()
                        .segment_length(5)
                        .min_segment_length(0)
                        .destination(format!("{output_path}/hls/"))
                        .build(),
                )
                .build(),
            OutputGroupType::DashIsoGroupSettings => OutputGroupSettings::builder()
                .r#type(OutputGroupType::DashIsoGroupSettings)
                .dash_iso_group_settings(
                    DashIsoGroupSettings::builder()
                        .segment_length(30)
                        .fragment_length(3)
                        .destination(format!("{output_path}/dash/"))
                        .build(),
                )
                .build(),
            OutputGroupType::MsSmoothGroupSettings => OutputGroupSettings::builder()
                .r#type(OutputGroupType::MsSmoothGroupSettings)
                .ms_smooth_group_settings(
                    MsSmoothGroupSettings::builder()
                        .fragment_length(2)
                        .destination(format!("{output_path}/mss/"))
                        .build(),
                )
                .build(),
            OutputGroupType::CmafGroupSettings => OutputGroupSettings::builder()
                .r#type(OutputGroupType::CmafGroupSettings)
                .cmaf_group_settings(
                    aws_sdk_mediaconvert::types::CmafGroupSettings::builder()
                        .segment_length(30)
                        .fragment_length(3)
                        .destination(format!("{output_path}/cmaf/"))
                        .build(),
                )
                .build(),
            _ => return None,
        };

        let name = match kind {
            OutputGroupType::FileGroupSettings => "File Group",
            OutputGroupType::HlsGroupSettings => "HLS Group",
            OutputGroupType::DashIsoGroupSettings => "DASH ISO",
            OutputGroupType::MsSmoothGroupSettings => "MS Smooth",
            _ => "CMAF",
        };

        Some(
            OutputGroup::builder()
                .name(name)
                .output_group_settings(settings)
                .build(),
        )
    }

    fn frame_capture_group(output_path: &str, width: i32, height: i32) -> OutputGroup {
        OutputGroup::builder()
            .custom_name("Frame Capture")
            .name("File Group")
            .output_group_settings(
                OutputGroupSettings::builder()
                    .r#type(OutputGroupType::FileGroupSettings)
                    .file_group_settings(
                        FileGroupSettings::builder()
                            .destination(format!("{output_path}/thumbnails/"))
                            .build(),
                    )
                    .build(),
            )
            .outputs(
                Output::builder()
                    .name_modifier("_thumb")
                    .container_settings(
                        ContainerSettings::builder()
                            .container(ContainerType::Raw)
                            .build(),
                    )
                    .video_description(
                        VideoDescription::builder()
                            .width(width)
                            .height(height)
                            .codec_settings(
                                VideoCodecSettings::builder()
                                    .codec(VideoCodec::FrameCapture)
                                    .frame_capture_settings(
                                        FrameCaptureSettings::builder()
                                            .max_captures(10_000_000)
                                            .quality(80)
                                            .framerate_numerator(1)
                                            .framerate_denominator(5)
                                            .build(),
                                    )
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    fn acceleration(payload: &Value) -> Result<Option<AccelerationSettings>, TaskError> {
        let mode = match payload["acceleratedTranscoding"].as_str() {
            Some("ENABLED") => aws_sdk_mediaconvert::types::AccelerationMode::Enabled,
            Some("PREFERRED") => aws_sdk_mediaconvert::types::AccelerationMode::Preferred,
            _ => return Ok(None),
        };

        let settings = AccelerationSettings::builder().mode(mode).build();

        Ok(Some(settings))
    }
}

#[async_trait]
impl StepTask for Encode {
    async fn run(&self, mut payload: Value) -> Result<Value, TaskError> {
        let guid = require_str(&payload, "guid")?.to_string();
        let src_bucket = require_str(&payload, "srcBucket")?;
        let src_video = require_str(&payload, "srcVideo")?;
        let dest_bucket = require_str(&payload, "destBucket")?;
        let template_name = require_str(&payload, "jobTemplate")?.to_string();

        let input_path = format!("s3://{src_bucket}/{src_video}");
        let output_path = format!("s3://{dest_bucket}/{guid}");

        let template = self
            .mediaconvert_client
            .get_job_template()
            .name(&template_name)
            .send()
            .await
            .map_err(TaskError::from_source)?
            .job_template
            .ok_or_else(|| TaskError::new(format!("job template {template_name} not found")))?;

        let mut output_groups: Vec<OutputGroup> = template
            .settings
            .ok_or_else(|| TaskError::new(format!("job template {template_name} has no settings")))?
            .output_groups()
            .iter()
            .filter_map(|group| {
                group
                    .output_group_settings()
                    .and_then(|settings| settings.r#type())
                    .and_then(|kind| Self::destination_group(kind, &output_path))
            })
            .collect();

        if payload["frameCapture"] == json!(true) {
            let width = payload["frameCaptureWidth"].as_i64().unwrap_or(1280) as i32;
            let height = payload["frameCaptureHeight"].as_i64().unwrap_or(720) as i32;
            output_groups.push(Self::frame_capture_group(&output_path, width, height));
        }

        let input = Input::builder()
            .file_input(&input_path)
            .audio_selectors(
                "Audio Selector 1",
                AudioSelector::builder()
                    .default_selection(AudioDefaultSelection::NotDefault)
                    .build(),
            )
            .video_selector(VideoSelector::builder().color_space(ColorSpace::Follow).build())
            .filter_enable(InputFilterEnable::Auto)
            .psi_control(InputPsiControl::UsePsi)
            .deblock_filter(InputDeblockFilter::Disabled)
            .denoise_filter(InputDenoiseFilter::Disabled)
            .timecode_source(InputTimecodeSource::Embedded)
            .build();

        let settings = JobSettings::builder()
            .inputs(input)
            .set_output_groups(Some(output_groups))
            .build();

        let mut request = self
            .mediaconvert_client
            .create_job()
            .job_template(&template_name)
            .role(&self.role_arn)
            .user_metadata("guid", &guid)
            .settings(settings)
            .set_acceleration_settings(Self::acceleration(&payload)?);

        if let Some(workflow_name) = payload["workflowName"].as_str() {
            request = request.user_metadata("workflow", workflow_name);
        }
        for field in ["cmsId", "cmsCommandId"] {
            if let Some(value) = payload[field].as_str() {
                request = request.user_metadata(field, value);
            }
        }

        let job = request
            .send()
            .await
            .map_err(TaskError::from_source)?
            .job
            .ok_or_else(|| TaskError::new("encoder returned no job"))?;
        let job_id = job
            .id
            .ok_or_else(|| TaskError::new("encoder returned a job without an id"))?;

        info!(guid = guid.as_str(), job_id = job_id.as_str(), "Submitted encode job");

        payload["encodeJobId"] = json!(&job_id);
        payload["encodingJob"] = json!({
            "jobId": job_id,
            "jobTemplate": template_name,
            "inputPath": input_path,
            "outputPath": output_path,
        });
        payload["workflowStatus"] = json!("Encoding");

        Ok(payload)
    }
}
