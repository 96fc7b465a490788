use thiserror::Error;

use crate::registry::models::Provider;

/// Bad operator input. Never retried; fixed by correcting the declaration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid registry name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid upstream host '{upstream}' for registry '{name}': {reason}")]
    InvalidUpstream {
        name: String,
        upstream: String,
        reason: String,
    },

    #[error("registry '{name}' supplies only one of username/access token")]
    IncompleteCredentials { name: String },

    #[error("registry '{name}' enables provider {provider} but no {provider} account context is configured")]
    MissingProviderContext { name: String, provider: Provider },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidName { .. } => "invalid-name",
            ValidationError::InvalidUpstream { .. } => "invalid-upstream",
            ValidationError::IncompleteCredentials { .. } => "incomplete-credentials",
            ValidationError::MissingProviderContext { .. } => "missing-provider-context",
        }
    }

    /// Registry names implicated, for the run report
    pub fn registries(&self) -> Vec<String> {
        match self {
            ValidationError::InvalidName { name, .. }
            | ValidationError::InvalidUpstream { name, .. }
            | ValidationError::IncompleteCredentials { name }
            | ValidationError::MissingProviderContext { name, .. } => vec![name.clone()],
        }
    }
}

/// Credential store failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("secret store permission denied: {0}")]
    PermissionDenied(String),

    /// Network failure or API throttling; eligible for retry with backoff
    #[error("transient secret store failure: {0}")]
    Transient(String),

    /// Secret exists under incompatible settings; surfaced to the operator
    #[error("secret conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::PermissionDenied(_) => "permission-denied",
            StoreError::Transient(_) => "transient",
            StoreError::Conflict(_) => "conflict",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Deterministic planning failure. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("registries '{first}' and '{second}' both sanitize to repository prefix '{prefix}' on {provider}")]
    PrefixCollision {
        provider: Provider,
        prefix: String,
        first: String,
        second: String,
    },

    #[error("registry '{name}' declares a retention of {days} days; retention must be a positive number of days")]
    InvalidRetention { name: String, days: u32 },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PlanningError {
    pub fn kind(&self) -> &'static str {
        match self {
            PlanningError::PrefixCollision { .. } => "prefix-collision",
            PlanningError::InvalidRetention { .. } => "invalid-retention",
            PlanningError::Validation(e) => e.kind(),
        }
    }

    pub fn registries(&self) -> Vec<String> {
        match self {
            PlanningError::PrefixCollision { first, second, .. } => {
                vec![first.clone(), second.clone()]
            }
            PlanningError::InvalidRetention { name, .. } => vec![name.clone()],
            PlanningError::Validation(e) => e.registries(),
        }
    }
}

/// Provider API failure during apply or verify
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("provider permission denied: {0}")]
    PermissionDenied(String),

    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Throttling, timeouts, connection failures; eligible for retry
    #[error("provider throttled or unreachable: {0}")]
    Throttled(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other provider-side failure
    #[error("provider error: {0}")]
    Upstream(String),
}

impl ApplyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::PermissionDenied(_) => "permission-denied",
            ApplyError::QuotaExceeded(_) => "quota-exceeded",
            ApplyError::Throttled(_) => "throttled",
            ApplyError::NotFound(_) => "not-found",
            ApplyError::Upstream(_) => "upstream",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApplyError::Throttled(_))
    }
}

/// Resolution failure; deterministic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("resource for {resource} cannot be resolved against a {context} account context")]
    ProviderMismatch { resource: Provider, context: Provider },
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::ProviderMismatch { .. } => "provider-mismatch",
        }
    }
}

/// Extract a clean message from an AWS SDK error's Debug output
///
/// The SDK errors have verbose Debug output; pull out just the
/// `message: Some("...")` field when present.
pub(crate) fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + 15;
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    if debug_str.len() > 200 {
        format!("{}...", &debug_str[..200])
    } else {
        debug_str
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Transient("throttled".into()).is_transient());
        assert!(!StoreError::PermissionDenied("nope".into()).is_transient());
        assert!(!StoreError::Conflict("exists".into()).is_transient());

        assert!(ApplyError::Throttled("slow down".into()).is_transient());
        assert!(!ApplyError::PermissionDenied("nope".into()).is_transient());
        assert!(!ApplyError::QuotaExceeded("full".into()).is_transient());
    }

    #[test]
    fn collision_error_names_both_registries() {
        let err = PlanningError::PrefixCollision {
            provider: Provider::Gcp,
            prefix: "hub-proxy".to_string(),
            first: "hub.proxy".to_string(),
            second: "hub-proxy".to_string(),
        };
        assert_eq!(err.kind(), "prefix-collision");
        assert_eq!(err.registries(), vec!["hub.proxy", "hub-proxy"]);
        let msg = err.to_string();
        assert!(msg.contains("hub.proxy") && msg.contains("hub-proxy"));
    }

    struct FakeSdkError;

    impl std::fmt::Debug for FakeSdkError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "ServiceError {{ message: Some(\"User is not authorized\"), code: AccessDenied }}"
            )
        }
    }

    #[test]
    fn format_sdk_error_extracts_message() {
        assert_eq!(format_sdk_error(&FakeSdkError), "User is not authorized");
    }
}
