pub mod beacon_client;
pub mod ceremony;
pub mod config;
pub mod mock;
pub mod ptau_fetch;

#[cfg(feature = "production")]
pub mod vsock;

pub use beacon_client::{BeaconSource, DrandHttpClient};
pub use ceremony::HostCeremony;
pub use config::{HostConfig, PcrExpectations};
pub use ptau_fetch::{HttpPtauFetcher, ParameterSource};
