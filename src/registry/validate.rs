use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;
use crate::registry::models::RegistrySpec;

lazy_static! {
    // Bare registry host, optionally with a port. No scheme, no path.
    static ref HOST_RE: Regex =
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?(:[0-9]+)?$").unwrap();
}

/// Validate a set of registry declarations before planning.
///
/// Pure function, no side effects. Checks names (non-empty, usable after
/// sanitization, unique within the run), upstream hosts (bare host form;
/// provider-specific normalization happens later in the planner), and
/// credential pairs (either both fields or neither).
pub fn validate_specs(specs: &[RegistrySpec]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for spec in specs {
        if spec.name.is_empty() {
            return Err(ValidationError::InvalidName {
                name: spec.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !spec.name.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidName {
                name: spec.name.clone(),
                reason: "name contains no usable characters".to_string(),
            });
        }
        if !seen.insert(spec.name.clone()) {
            return Err(ValidationError::InvalidName {
                name: spec.name.clone(),
                reason: "name is declared more than once".to_string(),
            });
        }

        validate_upstream(spec)?;

        if let Some(creds) = &spec.credentials {
            if creds.is_partial() {
                return Err(ValidationError::IncompleteCredentials {
                    name: spec.name.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_upstream(spec: &RegistrySpec) -> Result<(), ValidationError> {
    let upstream = &spec.upstream_url;

    if upstream.is_empty() {
        return Err(ValidationError::InvalidUpstream {
            name: spec.name.clone(),
            upstream: upstream.clone(),
            reason: "upstream host must not be empty".to_string(),
        });
    }
    if upstream.contains("://") {
        return Err(ValidationError::InvalidUpstream {
            name: spec.name.clone(),
            upstream: upstream.clone(),
            reason: "upstream must be a bare host without a scheme".to_string(),
        });
    }
    if !HOST_RE.is_match(upstream) {
        return Err(ValidationError::InvalidUpstream {
            name: spec.name.clone(),
            upstream: upstream.clone(),
            reason: "upstream is not a valid registry host".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::{Provider, UpstreamCredentials};

    fn spec(name: &str, upstream: &str) -> RegistrySpec {
        RegistrySpec {
            name: name.to_string(),
            upstream_url: upstream.to_string(),
            credentials: None,
            retention_days: 90,
            providers: vec![Provider::Aws],
        }
    }

    #[test]
    fn accepts_well_formed_specs() {
        let specs = vec![
            spec("hub-proxy", "registry-1.docker.io"),
            spec("ghcr-proxy", "ghcr.io"),
            spec("quay-proxy", "quay.io"),
        ];
        assert!(validate_specs(&specs).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let err = validate_specs(&[spec("", "ghcr.io")]).unwrap_err();
        assert_eq!(err.kind(), "invalid-name");
    }

    #[test]
    fn rejects_duplicate_name() {
        let specs = vec![spec("hub-proxy", "registry-1.docker.io"), spec("hub-proxy", "ghcr.io")];
        let err = validate_specs(&specs).unwrap_err();
        assert_eq!(err.kind(), "invalid-name");
        assert_eq!(err.registries(), vec!["hub-proxy"]);
    }

    #[test]
    fn rejects_scheme_qualified_upstream() {
        let err = validate_specs(&[spec("hub-proxy", "https://registry-1.docker.io")]).unwrap_err();
        assert_eq!(err.kind(), "invalid-upstream");
    }

    #[test]
    fn rejects_malformed_host() {
        for bad in ["", "host with spaces", "-leading.dash", "trailing.dash-"] {
            let err = validate_specs(&[spec("hub-proxy", bad)]).unwrap_err();
            assert_eq!(err.kind(), "invalid-upstream", "upstream {:?}", bad);
        }
    }

    #[test]
    fn accepts_host_with_port() {
        assert!(validate_specs(&[spec("internal", "registry.corp.example:5000")]).is_ok());
    }

    #[test]
    fn rejects_half_supplied_credentials() {
        let mut s = spec("hub-proxy", "registry-1.docker.io");
        s.credentials = Some(UpstreamCredentials {
            username: "bob".to_string(),
            access_token: String::new(),
        });
        let err = validate_specs(&[s]).unwrap_err();
        assert_eq!(err.kind(), "incomplete-credentials");
    }

    #[test]
    fn accepts_complete_credentials() {
        let mut s = spec("hub-proxy", "registry-1.docker.io");
        s.credentials = Some(UpstreamCredentials {
            username: "bob".to_string(),
            access_token: "dckr_pat_token".to_string(),
        });
        assert!(validate_specs(&[s]).is_ok());
    }
}
