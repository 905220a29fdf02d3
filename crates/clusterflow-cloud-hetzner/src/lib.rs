//! Hetzner Cloud provider for clusterflow.

pub mod api;
pub mod error;
pub mod provider;

pub use error::HetznerError;
pub use provider::HetznerCompute;
