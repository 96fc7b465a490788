use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::registry::models::{AccountContext, Provider, RegistrySpec};

/// Declarative run configuration: the registry list plus the account
/// context of every provider the run may touch.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registries: Vec<RegistrySpec>,
    #[serde(default)]
    pub aws: Option<AwsSettings>,
    #[serde(default)]
    pub gcp: Option<GcpSettings>,
    #[serde(default)]
    pub reconcile: ReconcileSettings,
}

fn default_secret_prefix() -> String {
    // ECR only accepts pull-through cache credential ARNs under this
    // Secrets Manager name prefix
    "ecr-pullthroughcache/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsSettings {
    /// AWS account ID (e.g., "123456789012")
    pub account_id: String,
    /// AWS region (e.g., "us-east-1")
    pub region: String,
    /// Name prefix for credential secrets in Secrets Manager
    #[serde(default = "default_secret_prefix")]
    pub secret_prefix: String,
    /// Optional: AWS access key ID (if not using IAM role)
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Optional: AWS secret access key (if not using IAM role)
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl AwsSettings {
    pub fn account_context(&self) -> AccountContext {
        AccountContext::Aws {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcpSettings {
    /// GCP project ID (e.g., "acme-prod")
    pub project_id: String,
    /// Artifact Registry location (e.g., "us" or "europe-west4")
    pub region: String,
    /// OAuth2 access token, injected by the calling environment; token
    /// acquisition is out of scope for this engine
    pub access_token: String,
}

impl GcpSettings {
    pub fn account_context(&self) -> AccountContext {
        AccountContext::Gcp {
            project_id: self.project_id.clone(),
            region: self.region.clone(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    2
}

fn default_max_delay_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    /// Total attempts per transient-failing operation (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Initial backoff delay in seconds (default: 2)
    #[serde(default = "default_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    /// Backoff cap in seconds (default: 300)
    #[serde(default = "default_max_delay_secs")]
    pub retry_max_delay_secs: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_secs: default_base_delay_secs(),
            retry_max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Settings {
    /// Load layered configuration: `default` then `$RUN_MODE` then `local`
    /// files under the config directory, then `REGCACHE_`-prefixed
    /// environment overrides (e.g. `REGCACHE_GCP__ACCESS_TOKEN`).
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("REGCACHE_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let settings: Settings = Config::builder()
            .add_source(File::with_name(&format!("{}/default", config_dir)))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            .add_source(Environment::with_prefix("REGCACHE").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load from a single file, mainly for tests and one-off invocations
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Every provider a registry enables must have an account context.
    fn validate(&self) -> Result<(), ConfigError> {
        for spec in &self.registries {
            for provider in &spec.providers {
                let configured = match provider {
                    Provider::Aws => self.aws.is_some(),
                    Provider::Gcp => self.gcp.is_some(),
                };
                if !configured {
                    return Err(ConfigError::Message(format!(
                        "registry '{}' enables provider {} but no [{}] section is configured",
                        spec.name, provider, provider
                    )));
                }
            }
        }
        Ok(())
    }
}
