use crate::registry::LifecycleCommand;
use crate::{property, provider_err, LifecycleError};
use async_trait::async_trait;
use aws_sdk_mediaconvert::types::{
    DashIsoGroupSettings, FileGroupSettings, HlsGroupSettings, JobTemplateSettings,
    MsSmoothGroupSettings, OutputGroup, OutputGroupSettings, OutputGroupType,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

/// The fixed rendition ladders every deployment provisions.
const TEMPLATE_ASSETS: [&str; 3] = [
    include_str!("../assets/2160p_avc_aac_16x9_qvbr.json"),
    include_str!("../assets/1080p_avc_aac_16x9_qvbr.json"),
    include_str!("../assets/720p_avc_aac_16x9_qvbr.json"),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TemplateDefinition {
    pub name: String,
    pub description: String,
    pub output_groups: Vec<TemplateOutputGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TemplateOutputGroup {
    pub name: String,
    pub kind: String,
}

pub(crate) fn template_definitions() -> Result<Vec<TemplateDefinition>, LifecycleError> {
    TEMPLATE_ASSETS
        .iter()
        .map(|asset| {
            serde_json::from_str(asset).map_err(|err| LifecycleError::BadAsset(err.to_string()))
        })
        .collect()
}

/// Template names are prefixed with the deployment's stack name so parallel
/// stacks in one account never collide.
pub(crate) fn derived_name(stack_name: &str, template_name: &str) -> String {
    format!("{stack_name}{template_name}")
}

fn group_settings(kind: &str) -> Result<OutputGroupSettings, LifecycleError> {
    let settings = match kind {
        "HLS_GROUP_SETTINGS" => OutputGroupSettings::builder()
            .r#type(OutputGroupType::HlsGroupSettings)
            .hls_group_settings(
                HlsGroupSettings::builder()
                    .segment_length(5)
                    .min_segment_length(0)
                    .build(),
            )
            .build(),
        "DASH_ISO_GROUP_SETTINGS" => OutputGroupSettings::builder()
            .r#type(OutputGroupType::DashIsoGroupSettings)
            .dash_iso_group_settings(
                DashIsoGroupSettings::builder()
                    .segment_length(30)
                    .fragment_length(3)
                    .build(),
            )
            .build(),
        "FILE_GROUP_SETTINGS" => OutputGroupSettings::builder()
            .r#type(OutputGroupType::FileGroupSettings)
            .file_group_settings(FileGroupSettings::builder().build())
            .build(),
        "MS_SMOOTH_GROUP_SETTINGS" => OutputGroupSettings::builder()
            .r#type(OutputGroupType::MsSmoothGroupSettings)
            .ms_smooth_group_settings(MsSmoothGroupSettings::builder().fragment_length(2).build())
            .build(),
        other => {
            return Err(LifecycleError::BadAsset(format!(
                "unknown output group kind {other}"
            )))
        }
    };

    Ok(settings)
}

fn template_settings(definition: &TemplateDefinition) -> Result<JobTemplateSettings, LifecycleError> {
    let mut settings = JobTemplateSettings::builder();

    for group in &definition.output_groups {
        settings = settings.output_groups(
            OutputGroup::builder()
                .name(&group.name)
                .output_group_settings(group_settings(&group.kind)?)
                .build(),
        );
    }

    Ok(settings.build())
}

/// Resolves the account-specific encoding endpoint. Nothing is cached here;
/// the provisioning tool persists the URL for every other component.
pub struct ResolveEndpoint {
    mediaconvert_client: aws_sdk_mediaconvert::Client,
}

impl ResolveEndpoint {
    pub fn new(mediaconvert_client: aws_sdk_mediaconvert::Client) -> Self {
        ResolveEndpoint {
            mediaconvert_client,
        }
    }
}

#[async_trait]
impl LifecycleCommand for ResolveEndpoint {
    async fn execute(
        &self,
        _properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let endpoints = self
            .mediaconvert_client
            .describe_endpoints()
            .max_results(1)
            .send()
            .await
            .map_err(provider_err)?;

        let url = endpoints
            .endpoints()
            .first()
            .and_then(|endpoint| endpoint.url())
            .ok_or_else(|| provider_err("account has no encoding endpoint"))?
            .to_string();

        let mut data = Map::new();
        data.insert("EndpointUrl".to_string(), json!(url));

        Ok(data)
    }
}

/// Creates (or upserts, on stack update) every bundled template under its
/// stack-derived name. One failure fails the whole operation; the
/// provisioning tool owns the rollback.
pub struct ProvisionJobTemplates {
    mediaconvert_client: aws_sdk_mediaconvert::Client,
    upsert: bool,
}

impl ProvisionJobTemplates {
    pub fn create(mediaconvert_client: aws_sdk_mediaconvert::Client) -> Self {
        ProvisionJobTemplates {
            mediaconvert_client,
            upsert: false,
        }
    }

    pub fn update(mediaconvert_client: aws_sdk_mediaconvert::Client) -> Self {
        ProvisionJobTemplates {
            mediaconvert_client,
            upsert: true,
        }
    }

    async fn create_template(
        &self,
        name: &str,
        definition: &TemplateDefinition,
    ) -> Result<(), LifecycleError> {
        self.mediaconvert_client
            .create_job_template()
            .name(name)
            .description(&definition.description)
            .settings(template_settings(definition)?)
            .send()
            .await
            .map_err(provider_err)?;

        Ok(())
    }

    async fn upsert_template(
        &self,
        name: &str,
        definition: &TemplateDefinition,
    ) -> Result<(), LifecycleError> {
        let update = self
            .mediaconvert_client
            .update_job_template()
            .name(name)
            .description(&definition.description)
            .settings(template_settings(definition)?)
            .send()
            .await;

        match update {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found_exception()) =>
            {
                self.create_template(name, definition).await
            }
            Err(err) => Err(provider_err(err)),
        }
    }
}

#[async_trait]
impl LifecycleCommand for ProvisionJobTemplates {
    async fn execute(
        &self,
        properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let stack_name = property(properties, "StackName")?;

        for definition in template_definitions()? {
            let name = derived_name(stack_name, &definition.name);
            info!(name = name.as_str(), "Provisioning job template");

            if self.upsert {
                self.upsert_template(&name, &definition).await?;
            } else {
                self.create_template(&name, &definition).await?;
            }
        }

        Ok(Map::new())
    }
}

/// Deletes every bundled template by its stack-derived name on teardown.
/// Regions cap the number of custom templates, so leaking them would
/// eventually block new deployments.
pub struct DeleteJobTemplates {
    mediaconvert_client: aws_sdk_mediaconvert::Client,
}

impl DeleteJobTemplates {
    pub fn new(mediaconvert_client: aws_sdk_mediaconvert::Client) -> Self {
        DeleteJobTemplates {
            mediaconvert_client,
        }
    }
}

#[async_trait]
impl LifecycleCommand for DeleteJobTemplates {
    async fn execute(
        &self,
        properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let stack_name = property(properties, "StackName")?;

        for definition in template_definitions()? {
            let name = derived_name(stack_name, &definition.name);

            let deletion = self
                .mediaconvert_client
                .delete_job_template()
                .name(&name)
                .send()
                .await;

            match deletion {
                Ok(_) => info!(name = name.as_str(), "Deleted job template"),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|service_err| service_err.is_not_found_exception()) =>
                {
                    info!(name = name.as_str(), "Job template already deleted");
                }
                Err(err) => return Err(provider_err(err)),
            }
        }

        Ok(Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_mediaconvert::operation::create_job_template::{
        CreateJobTemplateError, CreateJobTemplateOutput,
    };
    use aws_sdk_mediaconvert::operation::describe_endpoints::DescribeEndpointsOutput;
    use aws_sdk_mediaconvert::types::error::BadRequestException;
    use aws_sdk_mediaconvert::types::Endpoint;
    use aws_smithy_mocks::{mock, mock_client};

    #[test]
    fn bundled_assets_parse_and_derive_names() {
        let definitions = template_definitions().unwrap();

        assert_eq!(definitions.len(), 3);
        assert_eq!(
            derived_name("vod", &definitions[1].name),
            "vod_Ott_1080p_Avc_Aac_16x9_qvbr"
        );
        assert!(definitions
            .iter()
            .all(|definition| !definition.output_groups.is_empty()));
    }

    #[tokio::test]
    async fn endpoint_resolution_returns_the_first_url() {
        let rule = mock!(aws_sdk_mediaconvert::Client::describe_endpoints).then_output(|| {
            DescribeEndpointsOutput::builder()
                .endpoints(
                    Endpoint::builder()
                        .url("https://abcd1234.mediaconvert.eu-west-1.amazonaws.com")
                        .build(),
                )
                .build()
        });
        let client = mock_client!(aws_sdk_mediaconvert, [&rule]);

        let data = ResolveEndpoint::new(client)
            .execute(&Map::new())
            .await
            .unwrap();

        assert_eq!(
            data["EndpointUrl"],
            "https://abcd1234.mediaconvert.eu-west-1.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn one_failed_template_fails_the_whole_operation() {
        let rule = mock!(aws_sdk_mediaconvert::Client::create_job_template)
            .sequence()
            .output(|| CreateJobTemplateOutput::builder().build())
            .error(|| {
                CreateJobTemplateError::BadRequestException(BadRequestException::builder().build())
            })
            .build();
        let client = mock_client!(aws_sdk_mediaconvert, [&rule]);

        let mut properties = Map::new();
        properties.insert("StackName".to_string(), json!("vod"));

        let result = ProvisionJobTemplates::create(client)
            .execute(&properties)
            .await;

        assert!(matches!(result, Err(LifecycleError::Provider(_))));
        assert_eq!(rule.num_calls(), 2);
    }
}
