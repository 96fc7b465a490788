use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::types::RctAppliedFor;
use aws_sdk_ecr::Client as EcrClient;

use crate::backend::{ApplyOutcome, ProxyBackend};
use crate::error::{format_sdk_error, ApplyError};
use crate::registry::models::{AccountContext, CredentialHandle, Provider, ProxyResource};
use crate::retention;
use crate::settings::AwsSettings;

/// AWS ECR pull-through cache backend.
///
/// Each proxy resource becomes a pull-through cache rule plus a repository
/// creation template scoped to the same prefix, so repositories the cache
/// creates on first pull carry the retention lifecycle policy.
pub struct EcrBackend {
    client: EcrClient,
    context: AccountContext,
}

impl EcrBackend {
    pub async fn new(settings: &AwsSettings) -> Self {
        let config = if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            // Use static credentials if provided
            let creds = aws_sdk_ecr::config::Credentials::new(
                access_key, secret_key, None, None, "static",
            );
            aws_config::defaults(BehaviorVersion::latest())
                .credentials_provider(creds)
                .region(aws_config::Region::new(settings.region.clone()))
                .load()
                .await
        } else {
            // Default credential chain (IAM role, env vars, etc.)
            aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(settings.region.clone()))
                .load()
                .await
        };

        Self {
            client: EcrClient::new(&config),
            context: settings.account_context(),
        }
    }

    /// Whether a pull-through cache rule already exists for the prefix
    async fn rule_exists(&self, prefix: &str) -> Result<bool, ApplyError> {
        let response = self
            .client
            .describe_pull_through_cache_rules()
            .ecr_repository_prefixes(prefix)
            .send()
            .await;

        match response {
            Ok(described) => Ok(!described.pull_through_cache_rules().is_empty()),
            Err(err) => {
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_pull_through_cache_rule_not_found_exception() {
                        return Ok(false);
                    }
                }
                Err(classify_apply_error(&err))
            }
        }
    }

    async fn create_rule(
        &self,
        resource: &ProxyResource,
        credential: Option<&CredentialHandle>,
    ) -> Result<(), ApplyError> {
        let mut request = self
            .client
            .create_pull_through_cache_rule()
            .ecr_repository_prefix(&resource.repository_prefix)
            .upstream_registry_url(&resource.upstream_url);

        if let Some(handle) = credential {
            request = request.credential_arn(&handle.reference);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                // Lost a creation race; the rule is there, which is all we want
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_pull_through_cache_rule_already_exists_exception() {
                        return Ok(());
                    }
                }
                Err(classify_apply_error(&err))
            }
        }
    }

    /// Attach the retention lifecycle policy to repositories the cache will
    /// create under this prefix
    async fn put_creation_template(&self, resource: &ProxyResource) -> Result<(), ApplyError> {
        let response = self
            .client
            .create_repository_creation_template()
            .prefix(&resource.repository_prefix)
            .applied_for(RctAppliedFor::PullThroughCache)
            .lifecycle_policy(retention::policy_json(resource))
            .send()
            .await;

        match response {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_template_already_exists_exception() {
                        return Ok(());
                    }
                }
                Err(classify_apply_error(&err))
            }
        }
    }
}

#[async_trait]
impl ProxyBackend for EcrBackend {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn account_context(&self) -> &AccountContext {
        &self.context
    }

    async fn apply(
        &self,
        resource: &ProxyResource,
        credential: Option<&CredentialHandle>,
    ) -> Result<ApplyOutcome, ApplyError> {
        if self.rule_exists(&resource.repository_prefix).await? {
            tracing::debug!(
                "Pull-through cache rule {} already exists",
                resource.repository_prefix
            );
            return Ok(ApplyOutcome::Unchanged);
        }

        tracing::info!(
            "Creating pull-through cache rule {} -> {}",
            resource.repository_prefix,
            resource.upstream_url
        );
        self.create_rule(resource, credential).await?;
        self.put_creation_template(resource).await?;

        Ok(ApplyOutcome::Created)
    }

    async fn verify(&self, resource: &ProxyResource) -> Result<(), ApplyError> {
        if self.rule_exists(&resource.repository_prefix).await? {
            Ok(())
        } else {
            Err(ApplyError::NotFound(format!(
                "pull-through cache rule {} is not queryable",
                resource.repository_prefix
            )))
        }
    }
}

/// Map an ECR SDK failure onto the apply error taxonomy, falling back to
/// the Debug rendering for transport-level failures.
fn classify_apply_error<E: std::fmt::Debug>(err: &E) -> ApplyError {
    let message = format_sdk_error(err);
    let debug_str = format!("{:?}", err);

    if debug_str.contains("AccessDenied")
        || debug_str.contains("UnrecognizedClient")
        || debug_str.contains("InvalidSignature")
    {
        ApplyError::PermissionDenied(message)
    } else if debug_str.contains("LimitExceeded") {
        ApplyError::QuotaExceeded(message)
    } else if debug_str.contains("Throttling")
        || debug_str.contains("TooManyRequests")
        || debug_str.contains("TimeoutError")
        || debug_str.contains("DispatchFailure")
        || debug_str.contains("ServerException")
    {
        ApplyError::Throttled(message)
    } else {
        ApplyError::Upstream(message)
    }
}
