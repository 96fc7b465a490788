//! Provisioning engine for container registry pull-through caches.
//!
//! Takes a declarative list of upstream registries and materializes a
//! provider-local cache proxy for each one (ECR pull-through cache rules,
//! Artifact Registry remote repositories), wiring optional upstream
//! credentials through the provider's secret store and attaching an
//! image-retention policy. The outcome of a run is a per-provider status
//! report plus the canonical proxy URL for every (registry, provider) pair.

pub mod backend;
pub mod error;
pub mod planner;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod retention;
pub mod secrets;
pub mod settings;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use backend::{ArtifactRegistryBackend, EcrBackend, ProxyBackend};
use reconcile::{ProviderRuntime, Reconciler, RetrySettings, RunReport};
use registry::models::Provider;
use secrets::{AwsSecretsManagerStore, CredentialStore, GcpSecretManagerStore};
use settings::Settings;

pub use error::{ApplyError, PlanningError, ResolveError, StoreError, ValidationError};
pub use reconcile::{CancelHandle, ProviderStatus, RunState};
pub use registry::models::{
    AccountContext, CredentialHandle, ProxyResource, RegistrySpec, ResolvedEndpoint,
};

/// Build provider runtimes from settings and run one reconciliation.
///
/// Only providers that some registry enables are instantiated. The caller
/// owns tracing-subscriber installation and, when invoking concurrently,
/// serialization of runs targeting the same (provider, registry) pair.
pub async fn provision(settings: Settings) -> Result<RunReport> {
    let reconciler = build_reconciler(&settings).await?;
    Ok(reconciler.run().await)
}

/// Assemble a `Reconciler` with real provider backends, without running it.
///
/// Useful when the caller needs the cancel handle before starting the run.
pub async fn build_reconciler(settings: &Settings) -> Result<Reconciler> {
    let enabled: Vec<Provider> = Provider::ALL
        .into_iter()
        .filter(|p| {
            settings
                .registries
                .iter()
                .any(|s| s.providers.contains(p))
        })
        .collect();

    let mut runtimes: BTreeMap<Provider, ProviderRuntime> = BTreeMap::new();

    for provider in enabled {
        match provider {
            Provider::Aws => {
                let aws = settings
                    .aws
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("AWS registries declared but [aws] is not configured"))?;
                info!("Configuring ECR backend for account {}", aws.account_id);
                let store = AwsSecretsManagerStore::new(aws).await;
                let backend = EcrBackend::new(aws).await;
                runtimes.insert(
                    provider,
                    ProviderRuntime {
                        store: Arc::new(store) as Arc<dyn CredentialStore>,
                        backend: Arc::new(backend) as Arc<dyn ProxyBackend>,
                    },
                );
            }
            Provider::Gcp => {
                let gcp = settings
                    .gcp
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("GCP registries declared but [gcp] is not configured"))?;
                info!("Configuring Artifact Registry backend for project {}", gcp.project_id);
                let store = GcpSecretManagerStore::new(gcp);
                let backend = ArtifactRegistryBackend::new(gcp);
                runtimes.insert(
                    provider,
                    ProviderRuntime {
                        store: Arc::new(store) as Arc<dyn CredentialStore>,
                        backend: Arc::new(backend) as Arc<dyn ProxyBackend>,
                    },
                );
            }
        }
    }

    let retry = RetrySettings {
        attempts: settings.reconcile.retry_attempts,
        base_delay: Duration::from_secs(settings.reconcile.retry_base_delay_secs),
        max_delay: Duration::from_secs(settings.reconcile.retry_max_delay_secs),
    };

    Ok(Reconciler::new(settings.registries.clone(), runtimes).with_retry(retry))
}
