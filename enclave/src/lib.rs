pub mod ceremony;
pub mod config;
pub mod issuer;
pub mod mock;
pub mod rng_gate;
pub mod secret;

#[cfg(feature = "production")]
pub mod vsock;

pub use ceremony::EnclaveCeremony;
pub use config::EnclaveConfig;
pub use issuer::{AttestationIssuer, NsmCliIssuer};
