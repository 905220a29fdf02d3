//! Command execution layer for clusterflow.
//!
//! Two seams: [`RemoteExec`] for SSH command execution on cluster nodes
//! and [`LocalExec`] for local tooling such as kubectl. Both are traits
//! so orchestration logic stays testable without a network.

pub mod error;
pub mod shell;
pub mod ssh;

pub use error::{ExecError, Result};
pub use shell::{LocalExec, ProcessRunner, ShellResult};
pub use ssh::{RemoteExec, SshClient};
