pub mod providers;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::registry::models::{CredentialHandle, Provider, RegistrySpec};

pub use providers::aws::AwsSecretsManagerStore;
pub use providers::gcp::GcpSecretManagerStore;

/// Capability interface over provider-specific secret storage.
///
/// One implementation per provider. Implementations persist upstream
/// credentials and hand back an opaque locator; raw secret values are never
/// logged or returned after creation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create or update the credential secret for a registry.
    ///
    /// Returns `Ok(None)` when the spec carries no complete credential pair
    /// (the anonymous/public upstream case — not a failure). Idempotent:
    /// calling twice with identical values yields the same handle and no
    /// duplicate secret.
    async fn upsert_credential(
        &self,
        spec: &RegistrySpec,
    ) -> Result<Option<CredentialHandle>, StoreError>;

    fn provider(&self) -> Provider;

    /// Short identifier for logging
    fn store_name(&self) -> &str;
}

/// Wire shape of the stored secret. Both providers store the same JSON
/// document; ECR pull-through cache rules require exactly these two keys.
pub(crate) fn secret_payload(username: &str, access_token: &str) -> String {
    serde_json::json!({
        "username": username,
        "accessToken": access_token,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_both_keys() {
        let payload = secret_payload("bob", "tok");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["username"], "bob");
        assert_eq!(value["accessToken"], "tok");
    }

    #[test]
    fn payload_is_stable() {
        assert_eq!(secret_payload("bob", "tok"), secret_payload("bob", "tok"));
    }
}
