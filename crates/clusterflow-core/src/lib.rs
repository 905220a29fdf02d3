//! clusterflow core
//!
//! Shared building blocks for the clusterflow orchestrator: the
//! declarative cluster configuration model, the embedded template set,
//! and the bounded-wait primitive every convergence check goes through.

pub mod error;
pub mod loader;
pub mod model;
pub mod poll;
pub mod template;

pub use error::{CoreError, Result};
pub use loader::{check_master_count, load_cluster_spec};
pub use model::{AutoScaling, ClusterSpec, KeyValuePair, NodePoolSpec};
pub use poll::{poll_until, PollConfig, PollOutcome};
pub use template::{Context, TemplateProcessor};
