use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsClient;

use crate::error::{format_sdk_error, StoreError};
use crate::planner::sanitize_prefix;
use crate::registry::models::{CredentialHandle, Provider, RegistrySpec};
use crate::secrets::{secret_payload, CredentialStore};
use crate::settings::AwsSettings;

/// AWS Secrets Manager credential store.
///
/// Secrets are named under the configured prefix (default
/// `ecr-pullthroughcache/`, the only name prefix ECR accepts for
/// pull-through cache credential ARNs).
pub struct AwsSecretsManagerStore {
    client: SecretsClient,
    secret_prefix: String,
}

impl AwsSecretsManagerStore {
    pub async fn new(settings: &AwsSettings) -> Self {
        let config = if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            // Use static credentials if provided
            let creds = aws_sdk_secretsmanager::config::Credentials::new(
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
            client: SecretsClient::new(&config),
            secret_prefix: settings.secret_prefix.clone(),
        }
    }

    fn secret_name(&self, registry_name: &str) -> String {
        format!(
            "{}{}",
            self.secret_prefix,
            sanitize_prefix(Provider::Aws, registry_name)
        )
    }

    async fn create_secret(
        &self,
        secret_name: &str,
        payload: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .create_secret()
            .name(secret_name)
            .secret_string(payload)
            .send()
            .await;

        match response {
            Ok(created) => Ok(created
                .arn()
                .map(str::to_string)
                .unwrap_or_else(|| secret_name.to_string())),
            Err(err) => {
                // Lost a creation race; fall through to an update
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_resource_exists_exception() {
                        return self.put_secret_value(secret_name, payload).await;
                    }
                }
                Err(classify_store_error(&err))
            }
        }
    }

    async fn put_secret_value(
        &self,
        secret_name: &str,
        payload: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .put_secret_value()
            .secret_id(secret_name)
            .secret_string(payload)
            .send()
            .await
            .map_err(|e| classify_store_error(&e))?;

        Ok(response
            .arn()
            .map(str::to_string)
            .unwrap_or_else(|| secret_name.to_string()))
    }
}

#[async_trait]
impl CredentialStore for AwsSecretsManagerStore {
    async fn upsert_credential(
        &self,
        spec: &RegistrySpec,
    ) -> Result<Option<CredentialHandle>, StoreError> {
        let creds = match spec.upstream_credentials() {
            // Anonymous upstream: no secret, no handle, no API call
            None => return Ok(None),
            Some(c) => c,
        };

        let secret_name = self.secret_name(&spec.name);
        let payload = secret_payload(&creds.username, &creds.access_token);

        // Read back first so an unchanged secret is a no-op and repeated
        // runs return the same handle.
        let current = self
            .client
            .get_secret_value()
            .secret_id(&secret_name)
            .send()
            .await;

        let arn = match current {
            Ok(existing) if existing.secret_string() == Some(payload.as_str()) => {
                tracing::debug!("Secret {} already up to date", secret_name);
                existing
                    .arn()
                    .map(str::to_string)
                    .unwrap_or_else(|| secret_name.clone())
            }
            Ok(_) => {
                tracing::info!("Updating credential secret {}", secret_name);
                self.put_secret_value(&secret_name, &payload).await?
            }
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if !not_found {
                    return Err(classify_store_error(&err));
                }
                tracing::info!("Creating credential secret {}", secret_name);
                self.create_secret(&secret_name, &payload).await?
            }
        };

        Ok(Some(CredentialHandle {
            provider: Provider::Aws,
            reference: arn,
        }))
    }

    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn store_name(&self) -> &str {
        "aws-secrets-manager"
    }
}

/// Map an SDK failure onto the store error taxonomy.
///
/// The SDK's typed service errors do not cover transport-level failures, so
/// classification falls back to the Debug rendering, as the rest of the AWS
/// error handling in this crate does.
fn classify_store_error<E: std::fmt::Debug>(err: &E) -> StoreError {
    let message = format_sdk_error(err);
    let debug_str = format!("{:?}", err);

    if debug_str.contains("AccessDenied")
        || debug_str.contains("UnrecognizedClient")
        || debug_str.contains("InvalidSignature")
    {
        StoreError::PermissionDenied(message)
    } else if debug_str.contains("Throttling")
        || debug_str.contains("TooManyRequests")
        || debug_str.contains("LimitExceeded")
        || debug_str.contains("InternalServiceError")
        || debug_str.contains("TimeoutError")
        || debug_str.contains("DispatchFailure")
    {
        StoreError::Transient(message)
    } else {
        // Includes InvalidRequestException (e.g. secret scheduled for
        // deletion): the secret exists under incompatible settings.
        StoreError::Conflict(message)
    }
}
