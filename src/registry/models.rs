use serde::{Deserialize, Serialize};

/// Cloud providers that can host a pull-through cache proxy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Aws, Provider::Gcp];
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Aws => write!(f, "aws"),
            Provider::Gcp => write!(f, "gcp"),
        }
    }
}

/// Username/token pair for an upstream registry that requires authentication
#[derive(Clone, Deserialize)]
pub struct UpstreamCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub access_token: String,
}

// The access token must never end up in logs, so Debug masks it.
impl std::fmt::Debug for UpstreamCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamCredentials")
            .field("username", &self.username)
            .field("access_token", &"***")
            .finish()
    }
}

impl UpstreamCredentials {
    /// Both fields supplied and non-empty
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.access_token.is_empty()
    }

    /// Exactly one field supplied (a configuration mistake)
    pub fn is_partial(&self) -> bool {
        self.username.is_empty() != self.access_token.is_empty()
    }
}

/// A registry to be proxied, as declared by the operator
///
/// `name` is the proxy resource key across all providers. `upstream_url` is
/// the bare registry host (e.g. "registry-1.docker.io"); provider-specific
/// normalization happens at plan time, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySpec {
    pub name: String,
    pub upstream_url: String,
    #[serde(default)]
    pub credentials: Option<UpstreamCredentials>,
    pub retention_days: u32,
    #[serde(default)]
    pub providers: Vec<Provider>,
}

impl RegistrySpec {
    /// Complete credentials, if the upstream requires authentication.
    ///
    /// A missing credentials block and a block with both fields empty are
    /// the same thing: an anonymous upstream.
    pub fn upstream_credentials(&self) -> Option<&UpstreamCredentials> {
        self.credentials.as_ref().filter(|c| c.is_complete())
    }
}

/// Opaque locator for a credential secret stored in a provider's secret store
///
/// Created exclusively by a `CredentialStore`; everything downstream holds
/// only this reference, never raw secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHandle {
    pub provider: Provider,
    /// ARN (AWS) or secret version resource name (GCP)
    pub reference: String,
}

/// A planned proxy resource for one (registry, provider) pair
///
/// Immutable once planned; re-planning with changed inputs produces a new
/// resource that supersedes this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyResource {
    pub registry_name: String,
    pub provider: Provider,
    /// Path segment used in pull URLs, sanitized per provider naming rules
    pub repository_prefix: String,
    /// Upstream in the provider's target form (bare host for AWS,
    /// https:// qualified for GCP)
    pub upstream_url: String,
    /// Snapshot of the spec's retention at plan time
    pub retention_days: u32,
}

/// Provider account scope a resolved URL is derived against
///
/// Injected by the calling environment; never global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountContext {
    Aws { account_id: String, region: String },
    Gcp { project_id: String, region: String },
}

impl AccountContext {
    pub fn provider(&self) -> Provider {
        match self {
            AccountContext::Aws { .. } => Provider::Aws,
            AccountContext::Gcp { .. } => Provider::Gcp,
        }
    }
}

/// Final rewrite URL for one (registry, provider) pair
///
/// Derived, never persisted; always recomputed from the resource and the
/// account context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub registry_name: String,
    pub provider: Provider,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_masks_access_token() {
        let creds = UpstreamCredentials {
            username: "bob".to_string(),
            access_token: "dckr_pat_supersecret".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("bob"));
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn empty_credentials_block_is_anonymous() {
        let spec = RegistrySpec {
            name: "hub-proxy".to_string(),
            upstream_url: "registry-1.docker.io".to_string(),
            credentials: Some(UpstreamCredentials {
                username: String::new(),
                access_token: String::new(),
            }),
            retention_days: 90,
            providers: vec![Provider::Aws],
        };
        assert!(spec.upstream_credentials().is_none());
    }

    #[test]
    fn complete_credentials_are_exposed() {
        let spec = RegistrySpec {
            name: "hub-proxy".to_string(),
            upstream_url: "registry-1.docker.io".to_string(),
            credentials: Some(UpstreamCredentials {
                username: "bob".to_string(),
                access_token: "token".to_string(),
            }),
            retention_days: 90,
            providers: vec![Provider::Aws],
        };
        assert_eq!(spec.upstream_credentials().unwrap().username, "bob");
    }
}
