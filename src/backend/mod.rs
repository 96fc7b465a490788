pub mod artifact_registry;
pub mod ecr;

use async_trait::async_trait;

use crate::error::ApplyError;
use crate::registry::models::{AccountContext, CredentialHandle, Provider, ProxyResource};

pub use artifact_registry::ArtifactRegistryBackend;
pub use ecr::EcrBackend;

/// What an apply call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    /// Already in the desired state; re-running is a no-op
    Unchanged,
}

/// Capability interface for materializing proxy resources against a
/// provider API.
///
/// One implementation per provider. Apply must be idempotent: a resource
/// already in the desired state yields `Unchanged`, not an error. Verify
/// confirms a previously applied resource is queryable; URL resolution for
/// a resource never runs before its verify has passed.
#[async_trait]
pub trait ProxyBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Account scope this backend applies into, used for URL resolution
    fn account_context(&self) -> &AccountContext;

    /// Materialize the proxy resource, wiring the credential when present.
    ///
    /// `credential` is `None` for anonymous upstreams; the resource is
    /// still created, without credential wiring.
    async fn apply(
        &self,
        resource: &ProxyResource,
        credential: Option<&CredentialHandle>,
    ) -> Result<ApplyOutcome, ApplyError>;

    /// Read back an applied resource
    async fn verify(&self, resource: &ProxyResource) -> Result<(), ApplyError>;
}
