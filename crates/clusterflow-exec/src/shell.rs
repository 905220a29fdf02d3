//! Local process execution, mainly kubectl against the written kubeconfig.

use crate::error::{ExecError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ShellResult {
    pub status: i32,
    pub output: String,
}

impl ShellResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs a local command through `sh -c` with extra environment variables.
#[async_trait]
pub trait LocalExec: Send + Sync {
    async fn run(&self, command: &str, env: &BTreeMap<String, String>) -> Result<ShellResult>;
}

pub struct ProcessRunner;

#[async_trait]
impl LocalExec for ProcessRunner {
    async fn run(&self, command: &str, env: &BTreeMap<String, String>) -> Result<ShellResult> {
        tracing::debug!(command, "local exec");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env)
            .output()
            .await
            .map_err(|e| ExecError::Spawn {
                program: "sh".to_string(),
                message: e.to_string(),
            })?;
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr.trim_end());
        }
        Ok(ShellResult {
            status: output.status.code().unwrap_or(-1),
            output: combined.trim().to_string(),
        })
    }
}
