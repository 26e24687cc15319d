use crate::{provider_err, LifecycleError};
use aws_sdk_cloudfront::types::{
    AllowedMethods, CacheBehavior, CacheBehaviors, CachedMethods, CookiePreference,
    CustomHeaders, CustomOriginConfig, DistributionConfig, ForwardedValues, ItemSelection,
    Method, Origin, OriginProtocolPolicy, Origins, OriginSslProtocols, QueryStringCacheKeys,
    SslProtocol, TrustedSigners, ViewerProtocolPolicy,
};
use tracing::info;

/// Well-known id of the packaging origin inside the distribution.
pub const PACKAGING_ORIGIN_ID: &str = "vodMPOrigin";

/// Path prefix the packaging service serves all egress manifests under.
const PACKAGING_PATH_PATTERN: &str = "out/*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginInjection {
    /// The origin was already in place; no mutation was issued.
    AlreadyPresent,
    Added,
    /// A concurrent writer updated the distribution first. The desired end
    /// state is "origin present", so the stale-token rejection is success.
    ConcurrentlyUpdated,
}

/// Add the packaging domain as a custom origin plus a path-scoped cache
/// behavior, guarded by the distribution's version token. Idempotent: an
/// existing origin short-circuits before any mutation, and a version-token
/// conflict is swallowed without retrying.
pub async fn inject_packaging_origin(
    cloudfront_client: &aws_sdk_cloudfront::Client,
    distribution_id: &str,
    domain_name: &str,
) -> Result<OriginInjection, LifecycleError> {
    let current = cloudfront_client
        .get_distribution_config()
        .id(distribution_id)
        .send()
        .await
        .map_err(provider_err)?;

    let etag = current.e_tag.clone();
    let mut config: DistributionConfig = current
        .distribution_config
        .ok_or_else(|| provider_err("distribution has no configuration"))?;

    let origins = config.origins.get_or_insert_with(|| {
        Origins::builder()
            .quantity(0)
            .set_items(Some(Vec::new()))
            .build()
            .expect("origins builder has both required fields set")
    });

    let exists = origins
        .items
        .iter()
        .any(|origin| origin.id == PACKAGING_ORIGIN_ID);
    if exists {
        info!(
            distribution_id,
            origin = PACKAGING_ORIGIN_ID,
            "Origin already present, nothing to do"
        );

        return Ok(OriginInjection::AlreadyPresent);
    }

    info!(distribution_id, domain_name, "Adding packaging origin");

    origins.items.push(packaging_origin(domain_name)?);
    origins.quantity = origins.items.len() as i32;

    if config.cache_behaviors.is_none() {
        config.cache_behaviors = Some(
            CacheBehaviors::builder()
                .quantity(0)
                .build()
                .map_err(provider_err)?,
        );
    }
    if let Some(behaviors) = config.cache_behaviors.as_mut() {
        behaviors
            .items
            .get_or_insert_with(Vec::new)
            .push(packaging_behavior()?);
        behaviors.quantity = behaviors.items.as_ref().map(Vec::len).unwrap_or_default() as i32;
    }

    let update = cloudfront_client
        .update_distribution()
        .id(distribution_id)
        .distribution_config(config)
        .set_if_match(etag)
        .send()
        .await;

    match update {
        Ok(_) => Ok(OriginInjection::Added),
        Err(err)
            if err
                .as_service_error()
                .is_some_and(|service_err| service_err.is_precondition_failed()) =>
        {
            info!(
                distribution_id,
                "Version token went stale under a concurrent writer, treating as success"
            );

            Ok(OriginInjection::ConcurrentlyUpdated)
        }
        Err(err) => Err(provider_err(err)),
    }
}

fn packaging_origin(domain_name: &str) -> Result<Origin, LifecycleError> {
    let host = match url::Url::parse(domain_name) {
        Ok(url) => url
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| domain_name.to_string()),
        Err(_) => domain_name.to_string(),
    };

    Origin::builder()
        .id(PACKAGING_ORIGIN_ID)
        .domain_name(host)
        .origin_path("")
        .custom_headers(CustomHeaders::builder().quantity(0).build().map_err(provider_err)?)
        .custom_origin_config(
            CustomOriginConfig::builder()
                .http_port(80)
                .https_port(443)
                .origin_protocol_policy(OriginProtocolPolicy::HttpsOnly)
                .origin_ssl_protocols(
                    OriginSslProtocols::builder()
                        .quantity(1)
                        .items(SslProtocol::TlSv12)
                        .build()
                        .map_err(provider_err)?,
                )
                .origin_read_timeout(30)
                .origin_keepalive_timeout(5)
                .build()
                .map_err(provider_err)?,
        )
        .build()
        .map_err(provider_err)
}

fn packaging_behavior() -> Result<CacheBehavior, LifecycleError> {
    CacheBehavior::builder()
        .path_pattern(PACKAGING_PATH_PATTERN)
        .target_origin_id(PACKAGING_ORIGIN_ID)
        .viewer_protocol_policy(ViewerProtocolPolicy::RedirectToHttps)
        .forwarded_values(
            ForwardedValues::builder()
                .query_string(true)
                .cookies(
                    CookiePreference::builder()
                        .forward(ItemSelection::None)
                        .build()
                        .map_err(provider_err)?,
                )
                .query_string_cache_keys(
                    QueryStringCacheKeys::builder()
                        .quantity(1)
                        .items("aws.manifestfilter")
                        .build()
                        .map_err(provider_err)?,
                )
                .build()
                .map_err(provider_err)?,
        )
        .trusted_signers(
            TrustedSigners::builder()
                .enabled(false)
                .quantity(0)
                .build()
                .map_err(provider_err)?,
        )
        .allowed_methods(
            AllowedMethods::builder()
                .quantity(2)
                .items(Method::Head)
                .items(Method::Get)
                .cached_methods(
                    CachedMethods::builder()
                        .quantity(2)
                        .items(Method::Head)
                        .items(Method::Get)
                        .build()
                        .map_err(provider_err)?,
                )
                .build()
                .map_err(provider_err)?,
        )
        .min_ttl(0)
        .default_ttl(86_400)
        .max_ttl(31_536_000)
        .smooth_streaming(false)
        .compress(false)
        .build()
        .map_err(provider_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudfront::operation::get_distribution_config::GetDistributionConfigOutput;
    use aws_sdk_cloudfront::operation::update_distribution::{
        UpdateDistributionError, UpdateDistributionOutput,
    };
    use aws_sdk_cloudfront::types::error::{AccessDenied, PreconditionFailed};
    use aws_sdk_cloudfront::types::{DefaultCacheBehavior, Origins};
    use aws_smithy_mocks::{mock, mock_client, Rule, RuleMode};

    fn distribution_config(with_packaging_origin: bool) -> DistributionConfig {
        let mut origins = vec![Origin::builder()
            .id("bucket-origin")
            .domain_name("videos.s3.eu-west-1.amazonaws.com")
            .build()
            .unwrap()];

        if with_packaging_origin {
            origins.push(packaging_origin("https://abc.egress.example.com").unwrap());
        }

        let quantity = origins.len() as i32;

        DistributionConfig::builder()
            .caller_reference("vod")
            .comment("")
            .enabled(true)
            .origins(
                Origins::builder()
                    .quantity(quantity)
                    .set_items(Some(origins))
                    .build()
                    .unwrap(),
            )
            .default_cache_behavior(
                DefaultCacheBehavior::builder()
                    .target_origin_id("bucket-origin")
                    .viewer_protocol_policy(ViewerProtocolPolicy::RedirectToHttps)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn get_rule(with_packaging_origin: bool) -> Rule {
        mock!(aws_sdk_cloudfront::Client::get_distribution_config).then_output(move || {
            GetDistributionConfigOutput::builder()
                .distribution_config(distribution_config(with_packaging_origin))
                .e_tag("ETAG1")
                .build()
        })
    }

    #[tokio::test]
    async fn existing_origin_short_circuits_without_mutation() {
        let get = get_rule(true);
        let update = mock!(aws_sdk_cloudfront::Client::update_distribution)
            .then_output(|| UpdateDistributionOutput::builder().build());
        let client = mock_client!(aws_sdk_cloudfront, RuleMode::MatchAny, [&get, &update]);

        let outcome = inject_packaging_origin(&client, "DIST1", "https://abc.egress.example.com")
            .await
            .unwrap();

        assert_eq!(outcome, OriginInjection::AlreadyPresent);
        assert_eq!(update.num_calls(), 0);
    }

    #[tokio::test]
    async fn adds_origin_and_behavior_under_the_version_token() {
        let get = get_rule(false);
        let update = mock!(aws_sdk_cloudfront::Client::update_distribution)
            .match_requests(|req| {
                let config = req.distribution_config().unwrap();
                let origin_added = config
                    .origins
                    .as_ref()
                    .unwrap()
                    .items
                    .iter()
                    .any(|origin| origin.id == PACKAGING_ORIGIN_ID);

                origin_added && req.if_match() == Some("ETAG1")
            })
            .then_output(|| UpdateDistributionOutput::builder().build());
        let client = mock_client!(aws_sdk_cloudfront, RuleMode::MatchAny, [&get, &update]);

        let outcome = inject_packaging_origin(&client, "DIST1", "https://abc.egress.example.com")
            .await
            .unwrap();

        assert_eq!(outcome, OriginInjection::Added);
        assert_eq!(update.num_calls(), 1);
    }

    #[tokio::test]
    async fn version_token_conflict_is_swallowed() {
        let get = get_rule(false);
        let update = mock!(aws_sdk_cloudfront::Client::update_distribution).then_error(|| {
            UpdateDistributionError::PreconditionFailed(PreconditionFailed::builder().build())
        });
        let client = mock_client!(aws_sdk_cloudfront, RuleMode::MatchAny, [&get, &update]);

        let outcome = inject_packaging_origin(&client, "DIST1", "https://abc.egress.example.com")
            .await
            .unwrap();

        assert_eq!(outcome, OriginInjection::ConcurrentlyUpdated);
    }

    #[tokio::test]
    async fn any_other_error_propagates() {
        let get = get_rule(false);
        let update = mock!(aws_sdk_cloudfront::Client::update_distribution)
            .then_error(|| UpdateDistributionError::AccessDenied(AccessDenied::builder().build()));
        let client = mock_client!(aws_sdk_cloudfront, RuleMode::MatchAny, [&get, &update]);

        let result =
            inject_packaging_origin(&client, "DIST1", "https://abc.egress.example.com").await;

        assert!(matches!(result, Err(LifecycleError::Provider(_))));
    }
}
