//! Configuration model for a declarative cluster specification.

mod cluster;
mod pool;

pub use cluster::ClusterSpec;
pub use pool::{AutoScaling, KeyValuePair, NodePoolSpec};
