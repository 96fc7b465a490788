use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::reconcile::state_machine::RunState;
use crate::registry::models::{Provider, ResolvedEndpoint};

/// Terminal status of one provider within a run.
///
/// A failure always names the specific error kind and the registries
/// implicated — never a bare generic failure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ProviderStatus {
    Done {
        endpoints: Vec<ResolvedEndpoint>,
    },
    Failed {
        kind: String,
        error: String,
        registries: Vec<String>,
    },
}

impl ProviderStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, ProviderStatus::Done { .. })
    }
}

/// Outcome of one provisioning run, surfaced to the operator and consumed
/// by downstream manifest-rewriting tooling.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Per-provider terminal status
    pub providers: BTreeMap<Provider, ProviderStatus>,
    /// registry name -> provider -> resolved proxy URL, for providers that
    /// reached Done
    pub endpoints: BTreeMap<String, BTreeMap<Provider, String>>,
}

impl RunReport {
    /// All enabled providers verified
    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    /// Resolved URL for one (registry, provider) pair, if that provider
    /// reached Done
    pub fn url(&self, registry: &str, provider: Provider) -> Option<&str> {
        self.endpoints
            .get(registry)
            .and_then(|by_provider| by_provider.get(&provider))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_with_string_keys() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("hub-proxy".to_string(), {
            let mut by_provider = BTreeMap::new();
            by_provider.insert(
                Provider::Aws,
                "123456789012.dkr.ecr.us-east-1.amazonaws.com/hub-proxy/".to_string(),
            );
            by_provider
        });

        let mut providers = BTreeMap::new();
        providers.insert(
            Provider::Gcp,
            ProviderStatus::Failed {
                kind: "permission-denied".to_string(),
                error: "provider permission denied: create hub-proxy returned 403".to_string(),
                registries: vec!["hub-proxy".to_string()],
            },
        );

        let report = RunReport {
            run_id: Uuid::new_v4(),
            state: RunState::Failed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            providers,
            endpoints,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value["endpoints"]["hub-proxy"]["aws"],
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/hub-proxy/"
        );
        assert_eq!(value["providers"]["gcp"]["state"], "failed");
        assert_eq!(value["providers"]["gcp"]["kind"], "permission-denied");
    }

    #[test]
    fn url_lookup() {
        let mut endpoints = BTreeMap::new();
        let mut by_provider = BTreeMap::new();
        by_provider.insert(Provider::Gcp, "us-docker.pkg.dev/acme-prod/hub-proxy/".to_string());
        endpoints.insert("hub-proxy".to_string(), by_provider);

        let report = RunReport {
            run_id: Uuid::new_v4(),
            state: RunState::Done,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            providers: BTreeMap::new(),
            endpoints,
        };

        assert_eq!(
            report.url("hub-proxy", Provider::Gcp),
            Some("us-docker.pkg.dev/acme-prod/hub-proxy/")
        );
        assert_eq!(report.url("hub-proxy", Provider::Aws), None);
        assert_eq!(report.url("missing", Provider::Gcp), None);
    }
}
