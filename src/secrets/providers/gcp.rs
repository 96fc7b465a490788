use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::StatusCode;

use crate::error::StoreError;
use crate::registry::models::{CredentialHandle, Provider, RegistrySpec};
use crate::secrets::{secret_payload, CredentialStore};
use crate::settings::GcpSettings;

const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com/v1";

/// GCP Secret Manager credential store, driven over the JSON REST API.
///
/// The OAuth2 access token is injected through settings; token acquisition
/// is the calling environment's concern. The returned handle is the
/// `versions/latest` resource name, which is what Artifact Registry
/// upstream-credential wiring consumes and stays stable across runs.
pub struct GcpSecretManagerStore {
    http: reqwest::Client,
    project_id: String,
    access_token: String,
}

impl GcpSecretManagerStore {
    pub fn new(settings: &GcpSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id: settings.project_id.clone(),
            access_token: settings.access_token.clone(),
        }
    }

    fn secret_id(registry_name: &str) -> String {
        // Secret ids allow [A-Za-z0-9_-]
        let mapped: String = registry_name
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!("regcache-{}", mapped.trim_matches('-'))
    }

    fn secret_path(&self, secret_id: &str) -> String {
        format!(
            "{}/projects/{}/secrets/{}",
            SECRET_MANAGER_ENDPOINT, self.project_id, secret_id
        )
    }

    fn version_reference(&self, secret_id: &str) -> String {
        format!(
            "projects/{}/secrets/{}/versions/latest",
            self.project_id, secret_id
        )
    }

    /// Current latest payload, or None if the secret or version is missing
    async fn current_payload(&self, secret_id: &str) -> Result<Option<String>, StoreError> {
        let url = format!("{}/versions/latest:access", self.secret_path(secret_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Transient(e.to_string()))?;
                let data = body["payload"]["data"].as_str().unwrap_or_default();
                let decoded = BASE64
                    .decode(data)
                    .map_err(|e| StoreError::Conflict(format!("undecodable payload: {}", e)))?;
                Ok(Some(String::from_utf8_lossy(&decoded).into_owned()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(classify_status(status, &format!("access {}", secret_id))),
        }
    }

    async fn ensure_secret(&self, secret_id: &str) -> Result<(), StoreError> {
        let url = format!(
            "{}/projects/{}/secrets?secretId={}",
            SECRET_MANAGER_ENDPOINT, self.project_id, secret_id
        );
        let body = serde_json::json!({ "replication": { "automatic": {} } });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;

        match response.status() {
            // Already existing is the expected steady state
            StatusCode::OK | StatusCode::CONFLICT => Ok(()),
            status => Err(classify_status(status, &format!("create {}", secret_id))),
        }
    }

    async fn add_version(&self, secret_id: &str, payload: &str) -> Result<(), StoreError> {
        let url = format!("{}:addVersion", self.secret_path(secret_id));
        let body = serde_json::json!({
            "payload": { "data": BASE64.encode(payload.as_bytes()) }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::PRECONDITION_FAILED => {
                Err(StoreError::Conflict(format!(
                    "secret {} rejected a new version",
                    secret_id
                )))
            }
            status => Err(classify_status(status, &format!("addVersion {}", secret_id))),
        }
    }
}

#[async_trait]
impl CredentialStore for GcpSecretManagerStore {
    async fn upsert_credential(
        &self,
        spec: &RegistrySpec,
    ) -> Result<Option<CredentialHandle>, StoreError> {
        let creds = match spec.upstream_credentials() {
            None => return Ok(None),
            Some(c) => c,
        };

        let secret_id = Self::secret_id(&spec.name);
        let payload = secret_payload(&creds.username, &creds.access_token);

        // Skip the write when the stored value already matches, so repeated
        // runs add no versions and return the same handle.
        if self.current_payload(&secret_id).await? == Some(payload.clone()) {
            tracing::debug!("Secret {} already up to date", secret_id);
        } else {
            tracing::info!("Writing credential secret {}", secret_id);
            self.ensure_secret(&secret_id).await?;
            self.add_version(&secret_id, &payload).await?;
        }

        Ok(Some(CredentialHandle {
            provider: Provider::Gcp,
            reference: self.version_reference(&secret_id),
        }))
    }

    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn store_name(&self) -> &str {
        "gcp-secret-manager"
    }
}

fn classify_status(status: StatusCode, operation: &str) -> StoreError {
    let message = format!("{} returned {}", operation, status);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Transient(message)
        }
        status if status.is_server_error() => StoreError::Transient(message),
        StatusCode::CONFLICT => StoreError::Conflict(message),
        _ => StoreError::Conflict(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_id_is_sanitized_and_prefixed() {
        assert_eq!(
            GcpSecretManagerStore::secret_id("hub-proxy"),
            "regcache-hub-proxy"
        );
        assert_eq!(
            GcpSecretManagerStore::secret_id("Team/Hub.Proxy"),
            "regcache-team-hub-proxy"
        );
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "create s").kind(),
            "permission-denied"
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "create s").kind(),
            "transient"
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "create s").kind(),
            "transient"
        );
        assert_eq!(
            classify_status(StatusCode::CONFLICT, "create s").kind(),
            "conflict"
        );
    }
}
