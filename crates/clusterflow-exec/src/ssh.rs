//! Remote command execution over SSH.
//!
//! Shells out to the system `ssh` binary in batch mode so the user's
//! agent and known-hosts handling keep working. Tests substitute a fake
//! [`RemoteExec`] implementation instead of opening connections.

use crate::error::{ExecError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// Executes a shell command on a remote host and returns its stdout.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn execute(&self, host: &str, port: u16, command: &str) -> Result<String>;
}

pub struct SshClient {
    private_key_path: PathBuf,
    use_agent: bool,
    user: String,
}

impl SshClient {
    pub fn new(private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            use_agent: false,
            user: "root".to_string(),
        }
    }

    /// Authenticate through the running ssh-agent instead of the key file.
    pub fn use_agent(mut self, use_agent: bool) -> Self {
        self.use_agent = use_agent;
        self
    }
}

#[async_trait]
impl RemoteExec for SshClient {
    async fn execute(&self, host: &str, port: u16, command: &str) -> Result<String> {
        tracing::debug!(host, port, command, "ssh exec");
        let mut cmd = Command::new("ssh");
        if !self.use_agent {
            cmd.arg("-i").arg(&self.private_key_path);
        }
        let output = cmd
            .arg("-p")
            .arg(port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ConnectTimeout=10")
            .arg(format!("{}@{}", self.user, host))
            .arg(command)
            .output()
            .await
            .map_err(|e| ExecError::Spawn {
                program: "ssh".to_string(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ExecError::RemoteFailed {
                host: host.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
