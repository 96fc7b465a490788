use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::backend::{ApplyOutcome, ProxyBackend};
use crate::error::ApplyError;
use crate::registry::models::{AccountContext, CredentialHandle, Provider, ProxyResource};
use crate::retention;
use crate::settings::GcpSettings;

const ARTIFACT_REGISTRY_ENDPOINT: &str = "https://artifactregistry.googleapis.com/v1";

/// Google Artifact Registry backend, driven over the JSON REST API.
///
/// Each proxy resource becomes a Docker-format remote repository whose
/// remote config points at the upstream; the retention cleanup policy is
/// set on the repository at creation time.
pub struct ArtifactRegistryBackend {
    http: reqwest::Client,
    project_id: String,
    region: String,
    access_token: String,
    context: AccountContext,
}

impl ArtifactRegistryBackend {
    pub fn new(settings: &GcpSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id: settings.project_id.clone(),
            region: settings.region.clone(),
            access_token: settings.access_token.clone(),
            context: settings.account_context(),
        }
    }

    fn repository_url(&self, repository_id: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/repositories/{}",
            ARTIFACT_REGISTRY_ENDPOINT, self.project_id, self.region, repository_id
        )
    }

    fn create_url(&self, repository_id: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/repositories?repositoryId={}",
            ARTIFACT_REGISTRY_ENDPOINT, self.project_id, self.region, repository_id
        )
    }

    fn repository_body(
        &self,
        resource: &ProxyResource,
        credential: Option<&CredentialHandle>,
    ) -> serde_json::Value {
        let policy = retention::policy_document(resource);
        let policy_id = policy["id"].as_str().unwrap_or("expire-stale-images");

        let mut remote_config = json!({
            "description": format!("pull-through cache for {}", resource.upstream_url),
            "dockerRepository": {
                "customRepository": { "uri": resource.upstream_url }
            },
        });

        if let Some(handle) = credential {
            remote_config["upstreamCredentials"] = json!({
                "usernamePasswordCredentials": {
                    // Username travels inside the secret payload as well, but
                    // Artifact Registry wants the secret version reference here.
                    "passwordSecretVersion": handle.reference,
                }
            });
        }

        json!({
            "format": "DOCKER",
            "mode": "REMOTE_REPOSITORY",
            "description": format!("regcache proxy for {}", resource.registry_name),
            "remoteRepositoryConfig": remote_config,
            "cleanupPolicies": { policy_id: policy },
        })
    }

    async fn repository_exists(&self, repository_id: &str) -> Result<bool, ApplyError> {
        let response = self
            .http
            .get(self.repository_url(repository_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ApplyError::Throttled(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(classify_status(status, &format!("get {}", repository_id))),
        }
    }
}

#[async_trait]
impl ProxyBackend for ArtifactRegistryBackend {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn account_context(&self) -> &AccountContext {
        &self.context
    }

    async fn apply(
        &self,
        resource: &ProxyResource,
        credential: Option<&CredentialHandle>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let repository_id = &resource.repository_prefix;

        if self.repository_exists(repository_id).await? {
            tracing::debug!("Remote repository {} already exists", repository_id);
            return Ok(ApplyOutcome::Unchanged);
        }

        tracing::info!(
            "Creating remote repository {} -> {}",
            repository_id,
            resource.upstream_url
        );

        let response = self
            .http
            .post(self.create_url(repository_id))
            .bearer_auth(&self.access_token)
            .json(&self.repository_body(resource, credential))
            .send()
            .await
            .map_err(|e| ApplyError::Throttled(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(ApplyOutcome::Created),
            // Lost a creation race; the repository is there
            StatusCode::CONFLICT => Ok(ApplyOutcome::Unchanged),
            status => Err(classify_status(status, &format!("create {}", repository_id))),
        }
    }

    async fn verify(&self, resource: &ProxyResource) -> Result<(), ApplyError> {
        if self.repository_exists(&resource.repository_prefix).await? {
            Ok(())
        } else {
            Err(ApplyError::NotFound(format!(
                "remote repository {} is not queryable",
                resource.repository_prefix
            )))
        }
    }
}

fn classify_status(status: StatusCode, operation: &str) -> ApplyError {
    let message = format!("{} returned {}", operation, status);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApplyError::PermissionDenied(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ApplyError::Throttled(message)
        }
        status if status.is_server_error() => ApplyError::Throttled(message),
        _ => ApplyError::Upstream(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::Provider;

    fn backend() -> ArtifactRegistryBackend {
        ArtifactRegistryBackend::new(&GcpSettings {
            project_id: "acme-prod".to_string(),
            region: "us".to_string(),
            access_token: "token".to_string(),
        })
    }

    fn resource() -> ProxyResource {
        ProxyResource {
            registry_name: "hub-proxy".to_string(),
            provider: Provider::Gcp,
            repository_prefix: "hub-proxy".to_string(),
            upstream_url: "https://registry-1.docker.io".to_string(),
            retention_days: 90,
        }
    }

    #[test]
    fn anonymous_body_has_no_credential_wiring() {
        let body = backend().repository_body(&resource(), None);
        assert_eq!(body["mode"], "REMOTE_REPOSITORY");
        assert_eq!(
            body["remoteRepositoryConfig"]["dockerRepository"]["customRepository"]["uri"],
            "https://registry-1.docker.io"
        );
        assert!(body["remoteRepositoryConfig"]["upstreamCredentials"].is_null());
    }

    #[test]
    fn credential_body_references_the_secret_version() {
        let handle = CredentialHandle {
            provider: Provider::Gcp,
            reference: "projects/acme-prod/secrets/regcache-hub-proxy/versions/latest".to_string(),
        };
        let body = backend().repository_body(&resource(), Some(&handle));
        assert_eq!(
            body["remoteRepositoryConfig"]["upstreamCredentials"]["usernamePasswordCredentials"]
                ["passwordSecretVersion"],
            "projects/acme-prod/secrets/regcache-hub-proxy/versions/latest"
        );
    }

    #[test]
    fn cleanup_policy_is_attached_at_create() {
        let body = backend().repository_body(&resource(), None);
        assert_eq!(
            body["cleanupPolicies"]["expire-stale-images"]["condition"]["olderThan"],
            "7776000s"
        );
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "create r").kind(),
            "permission-denied"
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "create r").kind(),
            "throttled"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "create r").kind(),
            "throttled"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "create r").kind(),
            "upstream"
        );
    }
}
