use crate::cloudfront::inject_packaging_origin;
use crate::registry::LifecycleCommand;
use crate::{property, provider_err, LifecycleError};
use async_trait::async_trait;
use aws_sdk_mediapackagevod::types::{
    AdMarkers, CmafPackage, DashManifest, DashPackage, HlsManifest, HlsPackage, MssManifest,
    MssPackage, Profile,
};
use serde_json::{json, Map, Value};
use std::fmt::{Display, Formatter};
use tracing::{info, warn};

const SEGMENT_LENGTH_SECONDS: i32 = 6;
const PROGRAM_DATETIME_INTERVAL_SECONDS: i32 = 60;
const MANIFEST_NAME: &str = "index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PackagingFormat {
    Hls,
    Dash,
    Mss,
    Cmaf,
}

impl PackagingFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hls" => Some(PackagingFormat::Hls),
            "dash" => Some(PackagingFormat::Dash),
            "mss" => Some(PackagingFormat::Mss),
            "cmaf" => Some(PackagingFormat::Cmaf),
            _ => None,
        }
    }
}

impl Display for PackagingFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PackagingFormat::Hls => "hls",
            PackagingFormat::Dash => "dash",
            PackagingFormat::Mss => "mss",
            PackagingFormat::Cmaf => "cmaf",
        };
        f.write_str(name)
    }
}

/// Parse the requested format list, case-insensitively deduplicated in
/// request order. Unknown formats are logged and skipped.
pub(crate) fn distinct_formats(requested: &str) -> Vec<PackagingFormat> {
    let mut formats: Vec<PackagingFormat> = Vec::new();

    for raw in requested.split(',') {
        match PackagingFormat::parse(raw) {
            Some(format) if !formats.contains(&format) => formats.push(format),
            Some(_) => {}
            None => warn!(format = raw.trim(), "Unknown packaging configuration"),
        }
    }

    formats
}

/// Creates the packaging group, one configuration per distinct requested
/// format, and injects the delivery-network origin for the group's domain.
pub struct CreatePackagingGroup {
    mediapackage_client: aws_sdk_mediapackagevod::Client,
    cloudfront_client: aws_sdk_cloudfront::Client,
}

impl CreatePackagingGroup {
    pub fn new(
        mediapackage_client: aws_sdk_mediapackagevod::Client,
        cloudfront_client: aws_sdk_cloudfront::Client,
    ) -> Self {
        CreatePackagingGroup {
            mediapackage_client,
            cloudfront_client,
        }
    }

    async fn create_configuration(
        &self,
        group_id: &str,
        random_id: &str,
        format: PackagingFormat,
    ) -> Result<(), LifecycleError> {
        let configuration_id = format!("packaging-config-{random_id}-{format}");
        info!(id = configuration_id.as_str(), "Creating packaging configuration");

        let request = self
            .mediapackage_client
            .create_packaging_configuration()
            .id(configuration_id)
            .packaging_group_id(group_id);

        let request = match format {
            PackagingFormat::Hls => request.hls_package(
                HlsPackage::builder()
                    .hls_manifests(
                        HlsManifest::builder()
                            .ad_markers(AdMarkers::Scte35Enhanced)
                            .include_iframe_only_stream(false)
                            .manifest_name(MANIFEST_NAME)
                            .program_date_time_interval_seconds(PROGRAM_DATETIME_INTERVAL_SECONDS)
                            .repeat_ext_x_key(false)
                            .build(),
                    )
                    .segment_duration_seconds(SEGMENT_LENGTH_SECONDS)
                    .use_audio_rendition_group(true)
                    .build(),
            ),
            PackagingFormat::Dash => request.dash_package(
                DashPackage::builder()
                    .dash_manifests(
                        DashManifest::builder()
                            .manifest_name(MANIFEST_NAME)
                            .min_buffer_time_seconds(SEGMENT_LENGTH_SECONDS * 3)
                            .profile(Profile::None)
                            .build(),
                    )
                    .segment_duration_seconds(SEGMENT_LENGTH_SECONDS)
                    .build(),
            ),
            PackagingFormat::Mss => request.mss_package(
                MssPackage::builder()
                    .mss_manifests(MssManifest::builder().manifest_name(MANIFEST_NAME).build())
                    .segment_duration_seconds(SEGMENT_LENGTH_SECONDS)
                    .build(),
            ),
            PackagingFormat::Cmaf => request.cmaf_package(
                CmafPackage::builder()
                    .hls_manifests(
                        HlsManifest::builder()
                            .ad_markers(AdMarkers::Scte35Enhanced)
                            .include_iframe_only_stream(false)
                            .manifest_name(MANIFEST_NAME)
                            .program_date_time_interval_seconds(PROGRAM_DATETIME_INTERVAL_SECONDS)
                            .repeat_ext_x_key(false)
                            .build(),
                    )
                    .segment_duration_seconds(SEGMENT_LENGTH_SECONDS)
                    .build(),
            ),
        };

        request.send().await.map_err(provider_err)?;

        Ok(())
    }
}

#[async_trait]
impl LifecycleCommand for CreatePackagingGroup {
    async fn execute(
        &self,
        properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let group_id = property(properties, "GroupId")?;
        let requested_formats = property(properties, "PackagingConfigurations")?;
        let distribution_id = property(properties, "DistributionId")?;

        let formats = distinct_formats(requested_formats);
        if formats.is_empty() {
            return Err(LifecycleError::NoValidConfiguration);
        }

        let group = self
            .mediapackage_client
            .create_packaging_group()
            .id(group_id)
            .send()
            .await
            .map_err(provider_err)?;

        let random_id = hex::encode(rand::random::<[u8; 8]>());
        for format in formats {
            self.create_configuration(group_id, &random_id, format)
                .await?;
        }

        let domain_name = group
            .domain_name
            .ok_or_else(|| provider_err("packaging group has no domain name"))?;
        inject_packaging_origin(&self.cloudfront_client, distribution_id, &domain_name).await?;

        let mut data = Map::new();
        data.insert("GroupId".to_string(), json!(group_id));
        data.insert("GroupDomainName".to_string(), json!(domain_name));

        Ok(data)
    }
}

/// Re-describes the group and re-runs the origin injection when packaging is
/// enabled. Both halves are idempotent, so repeated updates are safe.
pub struct UpdatePackagingGroup {
    mediapackage_client: aws_sdk_mediapackagevod::Client,
    cloudfront_client: aws_sdk_cloudfront::Client,
}

impl UpdatePackagingGroup {
    pub fn new(
        mediapackage_client: aws_sdk_mediapackagevod::Client,
        cloudfront_client: aws_sdk_cloudfront::Client,
    ) -> Self {
        UpdatePackagingGroup {
            mediapackage_client,
            cloudfront_client,
        }
    }
}

#[async_trait]
impl LifecycleCommand for UpdatePackagingGroup {
    async fn execute(
        &self,
        properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let group_id = property(properties, "GroupId")?;
        let packaging_enabled = properties
            .get("EnableMediaPackage")
            .and_then(Value::as_str)
            .is_some_and(|enabled| enabled.eq_ignore_ascii_case("true"));

        let group = self
            .mediapackage_client
            .describe_packaging_group()
            .id(group_id)
            .send()
            .await
            .map_err(provider_err)?;

        let mut data = Map::new();
        data.insert("GroupId".to_string(), json!(group_id));

        if let Some(domain_name) = group.domain_name {
            if packaging_enabled {
                let distribution_id = property(properties, "DistributionId")?;
                inject_packaging_origin(&self.cloudfront_client, distribution_id, &domain_name)
                    .await?;
            }

            data.insert("GroupDomainName".to_string(), json!(domain_name));
        }

        Ok(data)
    }
}

/// Paginated teardown: assets, then configurations, then the group itself.
/// An already-deleted group is success; everything else propagates.
pub struct DeletePackagingGroup {
    mediapackage_client: aws_sdk_mediapackagevod::Client,
}

impl DeletePackagingGroup {
    pub fn new(mediapackage_client: aws_sdk_mediapackagevod::Client) -> Self {
        DeletePackagingGroup {
            mediapackage_client,
        }
    }

    async fn delete_assets(&self, group_id: &str) -> Result<(), LifecycleError> {
        let mut pages = self
            .mediapackage_client
            .list_assets()
            .packaging_group_id(group_id)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(provider_err)?;

            for asset in page.assets() {
                if let Some(id) = asset.id() {
                    self.mediapackage_client
                        .delete_asset()
                        .id(id)
                        .send()
                        .await
                        .map_err(provider_err)?;

                    info!(id, "Deleted packaging asset");
                }
            }
        }

        Ok(())
    }

    async fn delete_configurations(&self, group_id: &str) -> Result<(), LifecycleError> {
        let mut pages = self
            .mediapackage_client
            .list_packaging_configurations()
            .packaging_group_id(group_id)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(provider_err)?;

            for configuration in page.packaging_configurations() {
                if let Some(id) = configuration.id() {
                    self.mediapackage_client
                        .delete_packaging_configuration()
                        .id(id)
                        .send()
                        .await
                        .map_err(provider_err)?;

                    info!(id, "Deleted packaging configuration");
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LifecycleCommand for DeletePackagingGroup {
    async fn execute(
        &self,
        properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let group_id = property(properties, "GroupId")?;

        self.delete_assets(group_id).await?;
        self.delete_configurations(group_id).await?;

        let deletion = self
            .mediapackage_client
            .delete_packaging_group()
            .id(group_id)
            .send()
            .await;

        match deletion {
            Ok(_) => info!(group_id, "Deleted packaging group"),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found_exception()) =>
            {
                info!(group_id, "Packaging group already deleted");
            }
            Err(err) => return Err(provider_err(err)),
        }

        let mut data = Map::new();
        data.insert("GroupId".to_string(), json!(group_id));

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_mediapackagevod::operation::create_packaging_configuration::CreatePackagingConfigurationOutput;
    use aws_sdk_mediapackagevod::operation::create_packaging_group::CreatePackagingGroupOutput;
    use aws_smithy_mocks::{mock, mock_client, RuleMode};

    #[test]
    fn formats_deduplicate_case_insensitively() {
        assert_eq!(
            distinct_formats("HLS,DASH,HLS"),
            vec![PackagingFormat::Hls, PackagingFormat::Dash]
        );
        assert_eq!(
            distinct_formats("hls, Cmaf ,MSS"),
            vec![
                PackagingFormat::Hls,
                PackagingFormat::Cmaf,
                PackagingFormat::Mss
            ]
        );
        assert!(distinct_formats("bogus").is_empty());
    }

    fn properties(configurations: &str) -> Map<String, Value> {
        let Value::Object(map) = json!({
            "Resource": "MediaPackageVod",
            "GroupId": "vod-packaging-group",
            "PackagingConfigurations": configurations,
            "DistributionId": "DIST1"
        }) else {
            unreachable!()
        };

        map
    }

    #[tokio::test]
    async fn no_valid_format_fails_before_any_call() {
        let group_rule = mock!(aws_sdk_mediapackagevod::Client::create_packaging_group)
            .then_output(|| CreatePackagingGroupOutput::builder().build());
        let mediapackage = mock_client!(aws_sdk_mediapackagevod, [&group_rule]);

        let config_rule = mock!(aws_sdk_cloudfront::Client::get_distribution_config)
            .then_output(|| {
                aws_sdk_cloudfront::operation::get_distribution_config::GetDistributionConfigOutput::builder()
                    .build()
            });
        let cloudfront = mock_client!(aws_sdk_cloudfront, [&config_rule]);

        let command = CreatePackagingGroup::new(mediapackage, cloudfront);
        let err = command.execute(&properties("bogus")).await.unwrap_err();

        assert!(matches!(err, LifecycleError::NoValidConfiguration));
        assert_eq!(group_rule.num_calls(), 0);
    }

    #[tokio::test]
    async fn creates_one_configuration_per_distinct_format() {
        let group_rule = mock!(aws_sdk_mediapackagevod::Client::create_packaging_group)
            .then_output(|| {
                CreatePackagingGroupOutput::builder()
                    .domain_name("https://abc.egress.example.com")
                    .build()
            });
        let configuration_rule =
            mock!(aws_sdk_mediapackagevod::Client::create_packaging_configuration)
                .then_output(|| CreatePackagingConfigurationOutput::builder().build());
        let mediapackage = mock_client!(
            aws_sdk_mediapackagevod,
            RuleMode::MatchAny,
            [&group_rule, &configuration_rule]
        );

        // The group's domain already has its origin, so injection no-ops.
        let get_rule = mock!(aws_sdk_cloudfront::Client::get_distribution_config).then_output(|| {
            use aws_sdk_cloudfront::types::{
                DefaultCacheBehavior, DistributionConfig, Origin, Origins, ViewerProtocolPolicy,
            };

            let origin = Origin::builder()
                .id(crate::cloudfront::PACKAGING_ORIGIN_ID)
                .domain_name("abc.egress.example.com")
                .build()
                .unwrap();

            aws_sdk_cloudfront::operation::get_distribution_config::GetDistributionConfigOutput::builder()
                .distribution_config(
                    DistributionConfig::builder()
                        .caller_reference("vod")
                        .comment("")
                        .enabled(true)
                        .origins(Origins::builder().quantity(1).items(origin).build().unwrap())
                        .default_cache_behavior(
                            DefaultCacheBehavior::builder()
                                .target_origin_id(crate::cloudfront::PACKAGING_ORIGIN_ID)
                                .viewer_protocol_policy(ViewerProtocolPolicy::RedirectToHttps)
                                .build()
                                .unwrap(),
                        )
                        .build()
                        .unwrap(),
                )
                .e_tag("ETAG1")
                .build()
        });
        let cloudfront = mock_client!(aws_sdk_cloudfront, [&get_rule]);

        let command = CreatePackagingGroup::new(mediapackage, cloudfront);
        let data = command
            .execute(&properties("HLS,DASH,HLS"))
            .await
            .unwrap();

        assert_eq!(configuration_rule.num_calls(), 2);
        assert_eq!(data["GroupId"], "vod-packaging-group");
    }
}
