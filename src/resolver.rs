//! Canonical proxy endpoint URLs.
//!
//! Pure string templating over (resource, account context); never performs
//! network I/O. Stability matters: downstream manifest rewriting depends on
//! byte-for-byte reproducibility, so identical inputs must always produce
//! an identical string.

use crate::error::ResolveError;
use crate::registry::models::{AccountContext, ProxyResource, ResolvedEndpoint};

/// Derive the rewrite URL for a proxy resource under a provider account.
pub fn resolve(
    resource: &ProxyResource,
    context: &AccountContext,
) -> Result<ResolvedEndpoint, ResolveError> {
    let url = match context {
        AccountContext::Aws { account_id, region } if resource.provider == context.provider() => {
            format!(
                "{}.dkr.ecr.{}.amazonaws.com/{}/",
                account_id, region, resource.repository_prefix
            )
        }
        AccountContext::Gcp { project_id, region } if resource.provider == context.provider() => {
            format!(
                "{}-docker.pkg.dev/{}/{}/",
                region, project_id, resource.repository_prefix
            )
        }
        _ => {
            return Err(ResolveError::ProviderMismatch {
                resource: resource.provider,
                context: context.provider(),
            })
        }
    };

    Ok(ResolvedEndpoint {
        registry_name: resource.registry_name.clone(),
        provider: resource.provider,
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::Provider;

    fn resource(provider: Provider) -> ProxyResource {
        ProxyResource {
            registry_name: "hub-proxy".to_string(),
            provider,
            repository_prefix: "hub-proxy".to_string(),
            upstream_url: "registry-1.docker.io".to_string(),
            retention_days: 90,
        }
    }

    #[test]
    fn aws_url_form() {
        let ctx = AccountContext::Aws {
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
        };
        let endpoint = resolve(&resource(Provider::Aws), &ctx).unwrap();
        assert_eq!(
            endpoint.url,
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/hub-proxy/"
        );
        assert_eq!(endpoint.registry_name, "hub-proxy");
    }

    #[test]
    fn gcp_url_form() {
        let ctx = AccountContext::Gcp {
            project_id: "acme-prod".to_string(),
            region: "us".to_string(),
        };
        let endpoint = resolve(&resource(Provider::Gcp), &ctx).unwrap();
        assert_eq!(endpoint.url, "us-docker.pkg.dev/acme-prod/hub-proxy/");
    }

    #[test]
    fn resolve_is_stable() {
        let ctx = AccountContext::Aws {
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
        };
        let r = resource(Provider::Aws);
        assert_eq!(resolve(&r, &ctx).unwrap(), resolve(&r, &ctx).unwrap());
    }

    #[test]
    fn provider_mismatch_is_an_error() {
        let ctx = AccountContext::Gcp {
            project_id: "acme-prod".to_string(),
            region: "us".to_string(),
        };
        let err = resolve(&resource(Provider::Aws), &ctx).unwrap_err();
        assert_eq!(
            err,
            ResolveError::ProviderMismatch {
                resource: Provider::Aws,
                context: Provider::Gcp,
            }
        );
    }
}
