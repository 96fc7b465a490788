//! Declarative image-retention policies for cached artifacts.
//!
//! The engine only renders and attaches the rule; the provider's own
//! garbage collector executes it. No guarantee is made about the wall-clock
//! moment of deletion, only that the rule is present and correctly
//! parameterized. Positive-days validation happens at plan time.

use serde_json::{json, Value};

use crate::registry::models::{Provider, ProxyResource};

const SECONDS_PER_DAY: u64 = 86_400;

/// Render the provider-native expiry document for a planned resource:
/// "expire any cached image, any tag, not pushed within N days".
pub fn policy_document(resource: &ProxyResource) -> Value {
    match resource.provider {
        Provider::Aws => ecr_lifecycle_policy(resource.retention_days),
        Provider::Gcp => artifact_registry_cleanup_policy(resource.retention_days),
    }
}

/// Same document as a compact JSON string, for APIs that take text
pub fn policy_json(resource: &ProxyResource) -> String {
    policy_document(resource).to_string()
}

/// ECR lifecycle policy, attached via the repository creation template that
/// covers the cache prefix
fn ecr_lifecycle_policy(days: u32) -> Value {
    json!({
        "rules": [
            {
                "rulePriority": 1,
                "description": format!("expire images not pushed within {} days", days),
                "selection": {
                    "tagStatus": "any",
                    "countType": "sinceImagePushed",
                    "countUnit": "days",
                    "countNumber": days,
                },
                "action": { "type": "expire" },
            }
        ]
    })
}

/// Artifact Registry cleanup policy, set on the remote repository itself
fn artifact_registry_cleanup_policy(days: u32) -> Value {
    json!({
        "id": "expire-stale-images",
        "action": "DELETE",
        "condition": {
            "olderThan": format!("{}s", u64::from(days) * SECONDS_PER_DAY),
        },
    })
}
