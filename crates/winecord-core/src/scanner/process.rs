use std::process::Stdio;

use tokio::process::Command;

use super::ProcessLister;
use crate::{Error, Result};

/// Lists command lines with `ps -axo args=`
#[derive(Debug, Clone, Default)]
pub struct PsProcessLister;

impl PsProcessLister {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ProcessLister for PsProcessLister {
    async fn list(&self) -> Result<Vec<String>> {
        let output = Command::new("ps")
            .args(["-axo", "args="])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ProcessList(format!("failed to run ps: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ProcessList(format!("ps exited with {}", output.status)));
        }

        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_ps_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
