pub mod models;
pub mod validate;

pub use models::{
    AccountContext, CredentialHandle, Provider, ProxyResource, RegistrySpec, ResolvedEndpoint,
    UpstreamCredentials,
};
pub use validate::validate_specs;
