//! Reconciliation driver: plan -> apply -> verify across providers.
//!
//! Providers are independent and processed in parallel tasks. Within one
//! provider the order is strict: a registry's credential upsert completes
//! before its proxy resource is applied, and URL resolution never runs
//! before the resource's apply has been verified. Concurrent runs targeting
//! the same (provider, registry) pair must be serialized by the caller,
//! e.g. via an external lock.

pub mod report;
pub mod state_machine;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{ApplyOutcome, ProxyBackend};
use crate::planner;
use crate::registry::models::{Provider, ProxyResource, RegistrySpec, ResolvedEndpoint};
use crate::resolver;
use crate::secrets::CredentialStore;

pub use report::{ProviderStatus, RunReport};
pub use state_machine::RunState;

/// Retry tuning for transient store/provider failures
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempts per operation, including the first
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetrySettings {
    /// Exponential backoff: base * 2^attempt, capped
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Everything one provider needs during a run
#[derive(Clone)]
pub struct ProviderRuntime {
    pub store: Arc<dyn CredentialStore>,
    pub backend: Arc<dyn ProxyBackend>,
}

/// Cancels a running reconciliation.
///
/// Cancellation stops new provider API calls from being issued; in-flight
/// calls complete, and the run reports Failed with partial status.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
struct ProviderFailure {
    kind: String,
    error: String,
    registries: Vec<String>,
}

impl ProviderFailure {
    fn cancelled(registry: &str) -> Self {
        Self {
            kind: "cancelled".to_string(),
            error: "run cancelled before this operation was issued".to_string(),
            registries: vec![registry.to_string()],
        }
    }
}

/// Drives one provisioning run over a fixed set of registry declarations.
pub struct Reconciler {
    specs: Vec<RegistrySpec>,
    runtimes: BTreeMap<Provider, ProviderRuntime>,
    retry: RetrySettings,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(specs: Vec<RegistrySpec>, runtimes: BTreeMap<Provider, ProviderRuntime>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            specs,
            runtimes,
            retry: RetrySettings::default(),
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
        }
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Run plan -> apply -> verify once and report per-provider outcomes.
    pub async fn run(self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = RunState::Planning;

        info!(
            "Run {} planning {} registries across {} configured providers",
            run_id,
            self.specs.len(),
            self.runtimes.len()
        );

        // Planning is pure and local; any error here fails the run before a
        // single provider API call.
        let plan = match planner::plan(&self.specs) {
            Ok(plan) => plan,
            Err(err) => {
                error!("Run {} failed in planning: {}", run_id, err);
                advance(&mut state, RunState::Failed);
                let failure = ProviderFailure {
                    kind: err.kind().to_string(),
                    error: err.to_string(),
                    registries: err.registries(),
                };
                let providers = enabled_providers(&self.specs)
                    .into_iter()
                    .map(|p| (p, failure.clone()))
                    .collect();
                return finish(run_id, state, started_at, providers, BTreeMap::new());
            }
        };

        // A provider enabled by some registry but missing its runtime is an
        // operator configuration error; abort before touching anything.
        let missing: Vec<Provider> = plan
            .providers()
            .into_iter()
            .filter(|p| !self.runtimes.contains_key(p))
            .collect();
        if !missing.is_empty() {
            error!(
                "Run {} aborted: no account context for {:?}",
                run_id, missing
            );
            advance(&mut state, RunState::Failed);
            let mut failures = BTreeMap::new();
            for provider in plan.providers() {
                let failure = if missing.contains(&provider) {
                    ProviderFailure {
                        kind: "missing-provider-context".to_string(),
                        error: format!("no {} account context is configured", provider),
                        registries: registries_for(&plan.for_provider(provider)),
                    }
                } else {
                    ProviderFailure {
                        kind: "aborted".to_string(),
                        error: "run aborted before apply".to_string(),
                        registries: vec![],
                    }
                };
                failures.insert(provider, failure);
            }
            return finish(run_id, state, started_at, failures, BTreeMap::new());
        }

        let specs_by_name: Arc<HashMap<String, RegistrySpec>> = Arc::new(
            self.specs
                .iter()
                .map(|s| (s.name.clone(), s.clone()))
                .collect(),
        );

        // Apply phase: one task per provider, isolated failures, no rollback.
        advance(&mut state, RunState::Applying);
        let mut apply_handles = Vec::new();
        for provider in plan.providers() {
            let runtime = self.runtimes[&provider].clone();
            let resources: Vec<ProxyResource> =
                plan.for_provider(provider).into_iter().cloned().collect();
            let specs_by_name = specs_by_name.clone();
            let retry = self.retry.clone();
            let cancel = self.cancel_rx.clone();

            apply_handles.push(tokio::spawn(async move {
                let result =
                    apply_provider(provider, runtime, resources, specs_by_name, retry, cancel)
                        .await;
                (provider, result)
            }));
        }

        let apply_order = plan.providers();
        let mut failures: BTreeMap<Provider, ProviderFailure> = BTreeMap::new();
        let mut applied: Vec<Provider> = Vec::new();
        for (expected, joined) in apply_order
            .into_iter()
            .zip(futures::future::join_all(apply_handles).await)
        {
            match joined {
                Ok((provider, Ok(()))) => applied.push(provider),
                Ok((provider, Err(failure))) => {
                    warn!("Provider {} failed to apply: {}", provider, failure.error);
                    failures.insert(provider, failure);
                }
                Err(join_err) => {
                    error!("Provider {} apply task panicked: {}", expected, join_err);
                    failures.insert(expected, task_panic_failure(&join_err));
                }
            }
        }

        if applied.is_empty() && !failures.is_empty() {
            advance(&mut state, RunState::Failed);
            return finish(run_id, state, started_at, failures, BTreeMap::new());
        }

        // Verify phase: read back each applied resource, then resolve its
        // URL. Resolution never precedes a confirmed apply.
        advance(&mut state, RunState::Verifying);
        let mut verify_handles = Vec::new();
        for provider in &applied {
            let provider = *provider;
            let runtime = self.runtimes[&provider].clone();
            let resources: Vec<ProxyResource> =
                plan.for_provider(provider).into_iter().cloned().collect();
            let retry = self.retry.clone();
            let cancel = self.cancel_rx.clone();

            verify_handles.push(tokio::spawn(async move {
                let result = verify_provider(provider, runtime, resources, retry, cancel).await;
                (provider, result)
            }));
        }

        let mut endpoints: BTreeMap<String, BTreeMap<Provider, String>> = BTreeMap::new();
        let mut statuses: BTreeMap<Provider, ProviderStatus> = BTreeMap::new();
        for (expected, joined) in applied
            .iter()
            .copied()
            .zip(futures::future::join_all(verify_handles).await)
        {
            match joined {
                Ok((provider, Ok(resolved))) => {
                    for endpoint in &resolved {
                        endpoints
                            .entry(endpoint.registry_name.clone())
                            .or_default()
                            .insert(provider, endpoint.url.clone());
                    }
                    statuses.insert(provider, ProviderStatus::Done { endpoints: resolved });
                }
                Ok((provider, Err(failure))) => {
                    warn!("Provider {} failed to verify: {}", provider, failure.error);
                    failures.insert(provider, failure);
                }
                Err(join_err) => {
                    error!("Provider {} verify task panicked: {}", expected, join_err);
                    failures.insert(expected, task_panic_failure(&join_err));
                }
            }
        }

        let all_done = failures.is_empty();
        advance(
            &mut state,
            if all_done { RunState::Done } else { RunState::Failed },
        );

        for (provider, failure) in failures {
            statuses.insert(
                provider,
                ProviderStatus::Failed {
                    kind: failure.kind,
                    error: failure.error,
                    registries: failure.registries,
                },
            );
        }

        info!("Run {} finished: {}", run_id, state);
        RunReport {
            run_id,
            state,
            started_at,
            finished_at: Utc::now(),
            providers: statuses,
            endpoints,
        }
    }
}

/// Apply every planned resource of one provider, in declaration order.
///
/// The credential upsert for a registry strictly precedes its proxy apply.
/// The first fatal error aborts the provider; resources applied before it
/// stay applied, which keeps the run safely re-runnable.
async fn apply_provider(
    provider: Provider,
    runtime: ProviderRuntime,
    resources: Vec<ProxyResource>,
    specs_by_name: Arc<HashMap<String, RegistrySpec>>,
    retry: RetrySettings,
    cancel: watch::Receiver<bool>,
) -> Result<(), ProviderFailure> {
    for resource in &resources {
        if *cancel.borrow() {
            return Err(ProviderFailure::cancelled(&resource.registry_name));
        }

        let spec = match specs_by_name.get(&resource.registry_name) {
            Some(spec) => spec.clone(),
            None => {
                // Planner output and spec set always agree; this is a driver bug
                return Err(ProviderFailure {
                    kind: "internal".to_string(),
                    error: format!("no spec for planned resource {}", resource.registry_name),
                    registries: vec![resource.registry_name.clone()],
                });
            }
        };

        let store = runtime.store.clone();
        let spec_for_call = spec.clone();
        let handle = with_retry(
            &retry,
            &cancel,
            "credential upsert",
            move || {
                let store = store.clone();
                let spec = spec_for_call.clone();
                async move { store.upsert_credential(&spec).await }
            },
            |e| e.is_transient(),
        )
        .await
        .map_err(|e| ProviderFailure {
            kind: e.kind().to_string(),
            error: e.to_string(),
            registries: vec![spec.name.clone()],
        })?;

        if *cancel.borrow() {
            return Err(ProviderFailure::cancelled(&resource.registry_name));
        }

        let backend = runtime.backend.clone();
        let resource_for_call = resource.clone();
        let outcome = with_retry(
            &retry,
            &cancel,
            "proxy apply",
            move || {
                let backend = backend.clone();
                let resource = resource_for_call.clone();
                let handle = handle.clone();
                async move { backend.apply(&resource, handle.as_ref()).await }
            },
            |e| e.is_transient(),
        )
        .await
        .map_err(|e| ProviderFailure {
            kind: e.kind().to_string(),
            error: e.to_string(),
            registries: vec![resource.registry_name.clone()],
        })?;

        match outcome {
            ApplyOutcome::Created => info!(
                "Applied {} proxy for registry {}",
                provider, resource.registry_name
            ),
            ApplyOutcome::Unchanged => debug!(
                "{} proxy for registry {} already in desired state",
                provider, resource.registry_name
            ),
        }
    }

    Ok(())
}

/// Read back each applied resource and resolve its URL.
async fn verify_provider(
    provider: Provider,
    runtime: ProviderRuntime,
    resources: Vec<ProxyResource>,
    retry: RetrySettings,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<ResolvedEndpoint>, ProviderFailure> {
    let mut resolved = Vec::with_capacity(resources.len());

    for resource in &resources {
        if *cancel.borrow() {
            return Err(ProviderFailure::cancelled(&resource.registry_name));
        }

        let backend = runtime.backend.clone();
        let resource_for_call = resource.clone();
        with_retry(
            &retry,
            &cancel,
            "proxy verify",
            move || {
                let backend = backend.clone();
                let resource = resource_for_call.clone();
                async move { backend.verify(&resource).await }
            },
            |e| e.is_transient(),
        )
        .await
        .map_err(|e| ProviderFailure {
            kind: e.kind().to_string(),
            error: e.to_string(),
            registries: vec![resource.registry_name.clone()],
        })?;

        let endpoint = resolver::resolve(resource, runtime.backend.account_context()).map_err(
            |e| ProviderFailure {
                kind: e.kind().to_string(),
                error: e.to_string(),
                registries: vec![resource.registry_name.clone()],
            },
        )?;
        debug!(
            "Resolved {} endpoint for registry {}: {}",
            provider, endpoint.registry_name, endpoint.url
        );
        resolved.push(endpoint);
    }

    Ok(resolved)
}

/// Retry a transient-failing operation with bounded exponential backoff.
///
/// Non-transient errors and cancellation end the loop immediately.
async fn with_retry<T, E, F, Fut, P>(
    retry: &RetrySettings,
    cancel: &watch::Receiver<bool>,
    operation: &str,
    mut call: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt + 1 < retry.attempts && !*cancel.borrow() => {
                let delay = retry.delay_for(attempt);
                warn!(
                    "{} failed ({}), retrying in {:?} (attempt {}/{})",
                    operation,
                    err,
                    delay,
                    attempt + 1,
                    retry.attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn task_panic_failure(join_err: &tokio::task::JoinError) -> ProviderFailure {
    ProviderFailure {
        kind: "internal".to_string(),
        error: format!("provider task panicked: {}", join_err),
        registries: vec![],
    }
}

/// Providers enabled by at least one registry, in fixed order
fn enabled_providers(specs: &[RegistrySpec]) -> Vec<Provider> {
    Provider::ALL
        .into_iter()
        .filter(|p| specs.iter().any(|s| s.providers.contains(p)))
        .collect()
}

fn registries_for(resources: &[&ProxyResource]) -> Vec<String> {
    resources.iter().map(|r| r.registry_name.clone()).collect()
}

fn advance(state: &mut RunState, next: RunState) {
    if let Err(err) = state_machine::validate_transition(state, &next) {
        // Driver bug, not an operator error; record and continue
        error!("{}", err);
    }
    *state = next;
}

fn finish(
    run_id: Uuid,
    state: RunState,
    started_at: chrono::DateTime<Utc>,
    failures: BTreeMap<Provider, ProviderFailure>,
    endpoints: BTreeMap<String, BTreeMap<Provider, String>>,
) -> RunReport {
    let providers = failures
        .into_iter()
        .map(|(provider, failure)| {
            (
                provider,
                ProviderStatus::Failed {
                    kind: failure.kind,
                    error: failure.error,
                    registries: failure.registries,
                },
            )
        })
        .collect();

    RunReport {
        run_id,
        state,
        started_at,
        finished_at: Utc::now(),
        providers,
        endpoints,
    }
}
