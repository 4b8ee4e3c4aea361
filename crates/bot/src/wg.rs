//! External peer-management tool invocation
//!
//! The registry write always happens before the tool runs; a tool failure is
//! surfaced to the caller but never rolls the registry back.

use crate::config::WgConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use wgaccess_common::{Error, Result};

/// Lifecycle verbs understood by the external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAction {
    Add,
    Remove,
    Suspend,
}

impl PeerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PeerAction::Add => "add",
            PeerAction::Remove => "remove",
            PeerAction::Suspend => "suspend",
        }
    }
}

/// Seam over the external peer-management command
#[async_trait]
pub trait PeerBackend: Send + Sync {
    async fn run(&self, action: PeerAction, peer_id: &str) -> Result<()>;

    async fn add_peer(&self, peer_id: &str) -> Result<()> {
        self.run(PeerAction::Add, peer_id).await
    }

    async fn remove_peer(&self, peer_id: &str) -> Result<()> {
        self.run(PeerAction::Remove, peer_id).await
    }

    async fn suspend_peer(&self, peer_id: &str) -> Result<()> {
        self.run(PeerAction::Suspend, peer_id).await
    }

    /// The tool has no resume verb; re-issuing `add` reactivates the peer
    async fn resume_peer(&self, peer_id: &str) -> Result<()> {
        self.run(PeerAction::Add, peer_id).await
    }
}

/// Invokes the configured command, bounded by the configured timeout
pub struct WgTool {
    config: WgConfig,
}

impl WgTool {
    pub fn new(config: WgConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerBackend for WgTool {
    async fn run(&self, action: PeerAction, peer_id: &str) -> Result<()> {
        let (program, leading) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| Error::InvalidConfig("wg.command is empty".to_string()))?;

        debug!(
            "Running peer tool: {} {} {}",
            self.config.command.join(" "),
            action.as_str(),
            peer_id
        );

        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg(action.as_str())
            .arg(peer_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| Error::Timeout {
            seconds: self.config.timeout_secs,
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "Peer tool exited with {} for {} {}: {}",
                output.status,
                action.as_str(),
                peer_id,
                stderr.trim()
            );
            return Err(Error::PeerCommand(format!(
                "{} {} exited with {}: {}",
                action.as_str(),
                peer_id,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(command: Vec<&str>, timeout_secs: u64) -> WgConfig {
        WgConfig {
            command: command.into_iter().map(String::from).collect(),
            config_root: PathBuf::from("/tmp"),
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn successful_invocation() {
        let tool = WgTool::new(config(vec!["true"], 5));
        tool.add_peer("1-laptop").await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_is_surfaced_with_stderr() {
        let tool = WgTool::new(config(vec!["sh", "-c", "echo boom >&2; exit 3", "wg"], 5));
        let err = tool.remove_peer("1-laptop").await.unwrap_err();
        match err {
            Error::PeerCommand(msg) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let tool = WgTool::new(config(vec!["sh", "-c", "sleep 5", "wg"], 1));
        let err = tool.suspend_peer("1-laptop").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { seconds: 1 }));
    }

    #[tokio::test]
    async fn empty_command_is_invalid_config() {
        let tool = WgTool::new(config(vec![], 5));
        let err = tool.add_peer("1-laptop").await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
