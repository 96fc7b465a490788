//! Per-provider proxy resource planning.
//!
//! Planning is a pure, local computation: no provider API is touched here.
//! Any error is deterministic and reproducible; it is never retried, only
//! fixed by correcting the input.

use std::collections::HashMap;

use crate::error::PlanningError;
use crate::registry::models::{Provider, ProxyResource, RegistrySpec};
use crate::registry::validate::validate_specs;

/// The set of proxy resources one reconciliation run must materialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Ordered by (provider, declaration order)
    pub resources: Vec<ProxyResource>,
}

impl Plan {
    /// Providers with at least one planned resource, in fixed order
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.resources.iter().any(|r| r.provider == *p))
            .collect()
    }

    /// Resources planned for one provider, in declaration order
    pub fn for_provider(&self, provider: Provider) -> Vec<&ProxyResource> {
        self.resources
            .iter()
            .filter(|r| r.provider == provider)
            .collect()
    }
}

/// Derive the repository prefix for a registry under a provider's naming
/// rules.
///
/// Deterministic: the same name always yields the same prefix. Lowercases
/// and maps disallowed characters to `-`. ECR repository names allow
/// dots, underscores, dashes and path separators; Artifact Registry
/// repository ids only allow lowercase alphanumerics and dashes.
pub fn sanitize_prefix(provider: Provider, name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            let allowed = match provider {
                Provider::Aws => c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'),
                Provider::Gcp => c.is_ascii_alphanumeric() || c == '-',
            };
            if allowed {
                c
            } else {
                '-'
            }
        })
        .collect();

    mapped
        .trim_matches(|c: char| matches!(c, '-' | '.' | '_' | '/'))
        .to_string()
}

/// Normalize an upstream host into the provider's target form
pub fn normalize_upstream(provider: Provider, host: &str) -> String {
    match provider {
        // ECR pull-through cache rules take the bare registry host
        Provider::Aws => host.to_string(),
        // Artifact Registry remote repositories take a qualified URL
        Provider::Gcp => format!("https://{}", host),
    }
}

/// Plan proxy resources for every (spec, enabled provider) pair.
///
/// A resource is planned for each provider the spec enables, regardless of
/// credential presence — anonymous pull-through is legal. Fails on
/// zero retention or on two specs sanitizing to the same prefix under one
/// provider; both are caught here, before any apply.
pub fn plan(specs: &[RegistrySpec]) -> Result<Plan, PlanningError> {
    validate_specs(specs)?;

    for spec in specs {
        if spec.retention_days == 0 {
            return Err(PlanningError::InvalidRetention {
                name: spec.name.clone(),
                days: spec.retention_days,
            });
        }
    }

    let mut resources = Vec::new();

    for provider in Provider::ALL {
        // prefix -> first registry that claimed it
        let mut claimed: HashMap<String, String> = HashMap::new();

        for spec in specs.iter().filter(|s| s.providers.contains(&provider)) {
            let prefix = sanitize_prefix(provider, &spec.name);

            if let Some(first) = claimed.get(&prefix) {
                return Err(PlanningError::PrefixCollision {
                    provider,
                    prefix,
                    first: first.clone(),
                    second: spec.name.clone(),
                });
            }
            claimed.insert(prefix.clone(), spec.name.clone());

            resources.push(ProxyResource {
                registry_name: spec.name.clone(),
                provider,
                repository_prefix: prefix,
                upstream_url: normalize_upstream(provider, &spec.upstream_url),
                retention_days: spec.retention_days,
            });
        }
    }

    Ok(Plan { resources })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, providers: Vec<Provider>) -> RegistrySpec {
        RegistrySpec {
            name: name.to_string(),
            upstream_url: "registry-1.docker.io".to_string(),
            credentials: None,
            retention_days: 90,
            providers,
        }
    }

    #[test]
    fn one_resource_per_spec_and_enabled_provider() {
        let specs = vec![
            spec("hub-proxy", vec![Provider::Aws, Provider::Gcp]),
            spec("ghcr-proxy", vec![Provider::Aws]),
        ];
        let plan = plan(&specs).unwrap();

        assert_eq!(plan.resources.len(), 3);
        assert_eq!(plan.for_provider(Provider::Aws).len(), 2);
        assert_eq!(plan.for_provider(Provider::Gcp).len(), 1);
        assert_eq!(plan.providers(), vec![Provider::Aws, Provider::Gcp]);
    }

    #[test]
    fn disabled_provider_is_never_planned() {
        let specs = vec![spec("hub-proxy", vec![Provider::Aws])];
        let plan = plan(&specs).unwrap();
        assert!(plan.for_provider(Provider::Gcp).is_empty());
    }

    #[test]
    fn sanitization_is_deterministic_and_lowercases() {
        assert_eq!(sanitize_prefix(Provider::Aws, "Hub-Proxy"), "hub-proxy");
        assert_eq!(
            sanitize_prefix(Provider::Aws, "team/hub.proxy"),
            "team/hub.proxy"
        );
        // Artifact Registry ids only allow [a-z0-9-]
        assert_eq!(
            sanitize_prefix(Provider::Gcp, "team/hub.proxy"),
            "team-hub-proxy"
        );
        // Same input, same output
        assert_eq!(
            sanitize_prefix(Provider::Gcp, "team/hub.proxy"),
            sanitize_prefix(Provider::Gcp, "team/hub.proxy")
        );
    }

    #[test]
    fn upstream_normalization_per_provider() {
        assert_eq!(
            normalize_upstream(Provider::Aws, "registry-1.docker.io"),
            "registry-1.docker.io"
        );
        assert_eq!(
            normalize_upstream(Provider::Gcp, "registry-1.docker.io"),
            "https://registry-1.docker.io"
        );
    }

    #[test]
    fn prefix_collision_names_both_specs_and_provider() {
        // Distinct names that collapse to the same Artifact Registry id
        let specs = vec![
            spec("hub.proxy", vec![Provider::Gcp]),
            spec("hub-proxy", vec![Provider::Gcp]),
        ];
        let err = plan(&specs).unwrap_err();
        match err {
            PlanningError::PrefixCollision {
                provider,
                ref prefix,
                ref first,
                ref second,
            } => {
                assert_eq!(provider, Provider::Gcp);
                assert_eq!(prefix, "hub-proxy");
                assert_eq!(first, "hub.proxy");
                assert_eq!(second, "hub-proxy");
            }
            other => panic!("expected PrefixCollision, got {:?}", other),
        }
    }

    #[test]
    fn names_colliding_on_gcp_may_coexist_on_aws() {
        let specs = vec![
            spec("hub.proxy", vec![Provider::Aws]),
            spec("hub-proxy", vec![Provider::Aws]),
        ];
        // ECR keeps the dot, so no collision
        assert!(plan(&specs).is_ok());
    }

    #[test]
    fn zero_retention_rejected_at_plan_time() {
        let mut s = spec("hub-proxy", vec![Provider::Aws]);
        s.retention_days = 0;
        let err = plan(&[s]).unwrap_err();
        assert_eq!(err.kind(), "invalid-retention");
        assert_eq!(err.registries(), vec!["hub-proxy"]);
    }

    #[test]
    fn retention_is_snapshotted_onto_the_resource() {
        let mut s = spec("hub-proxy", vec![Provider::Aws]);
        s.retention_days = 30;
        let plan = plan(&[s]).unwrap();
        assert_eq!(plan.resources[0].retention_days, 30);
    }

    #[test]
    fn validation_errors_surface_through_planning() {
        let err = plan(&[spec("", vec![Provider::Aws])]).unwrap_err();
        assert_eq!(err.kind(), "invalid-name");
    }
}
