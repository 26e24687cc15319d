//! Shared fixtures: mock SDK clients and configuration samples used by the
//! component test suites.

use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_sns::operation::publish::{PublishError, PublishOutput};
use aws_sdk_sns::types::error::NotFoundException;
use aws_sdk_sqs::operation::send_message::SendMessageOutput;
use aws_smithy_mocks::{mock, mock_client, Rule};
use model::config::{AccelerationMode, ArchiveMode, WorkflowConfig};

/// An SNS client whose publishes always succeed with an empty response.
pub fn create_mock_sns_client() -> aws_sdk_sns::Client {
    let publish_rule: Rule = mock!(aws_sdk_sns::Client::publish)
        .match_requests(|_| true)
        .sequence()
        .output(|| PublishOutput::builder().build())
        .repeatedly()
        .build();

    mock_client!(aws_sdk_sns, [&publish_rule])
}

/// An SNS client whose publishes always fail, for best-effort paths.
pub fn create_failing_sns_client() -> aws_sdk_sns::Client {
    let publish_rule: Rule = mock!(aws_sdk_sns::Client::publish)
        .match_requests(|_| true)
        .sequence()
        .error(|| PublishError::NotFoundException(NotFoundException::builder().build()))
        .repeatedly()
        .build();

    mock_client!(aws_sdk_sns, [&publish_rule])
}

/// An SQS client whose sends always succeed with an empty response.
pub fn create_mock_sqs_client() -> aws_sdk_sqs::Client {
    let send_message_rule: Rule = mock!(aws_sdk_sqs::Client::send_message)
        .match_requests(|_| true)
        .sequence()
        .output(|| SendMessageOutput::builder().build())
        .repeatedly()
        .build();

    mock_client!(aws_sdk_sqs, [&send_message_rule])
}

/// An S3 client with no readable objects; metadata reads degrade and
/// anything else errors.
pub fn stub_s3_client() -> aws_sdk_s3::Client {
    let head_rule: Rule = mock!(aws_sdk_s3::Client::head_object)
        .match_requests(|_| true)
        .sequence()
        .error(|| {
            HeadObjectError::NotFound(aws_sdk_s3::types::error::NotFound::builder().build())
        })
        .repeatedly()
        .build();

    mock_client!(aws_sdk_s3, [&head_rule])
}

pub fn sample_config() -> WorkflowConfig {
    WorkflowConfig {
        workflow_name: "vod".to_string(),
        src_bucket: "master-videos".to_string(),
        dest_bucket: "transcoded-videos".to_string(),
        cloud_front: "cdn.example".to_string(),
        frame_capture: true,
        archive_source: ArchiveMode::DeepArchive,
        accelerated_transcoding: AccelerationMode::Preferred,
        enable_sns: true,
        enable_sqs: true,
        enable_media_package: false,
        job_template_2160p: "vod_Ott_2160p_Avc_Aac_16x9_qvbr".to_string(),
        job_template_1080p: "vod_Ott_1080p_Avc_Aac_16x9_qvbr".to_string(),
        job_template_720p: "vod_Ott_720p_Avc_Aac_16x9_qvbr".to_string(),
    }
}
