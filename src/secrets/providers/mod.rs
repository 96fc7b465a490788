pub mod aws;
pub mod gcp;

pub use aws::AwsSecretsManagerStore;
pub use gcp::GcpSecretManagerStore;
